//! Role to capability table. Every routed method names the one capability it needs.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Admin,
    Registrar,
    Teacher,
    Student,
}

impl UserRole {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(Self::Admin),
            "registrar" => Some(Self::Registrar),
            "teacher" => Some(Self::Teacher),
            "student" => Some(Self::Student),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Registrar => "registrar",
            Self::Teacher => "teacher",
            Self::Student => "student",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    ManageUsers,
    ManageSettings,
    ViewSettings,
    ManageCalendar,
    ViewCalendar,
    ManageCurriculum,
    ManageStudents,
    ManageSections,
    ManageEnrollment,
    ViewGrades,
    EnterGrades,
    LockGrades,
    UnlockGrades,
    ImportData,
    ViewReports,
    ViewAuditLog,
    ManageTeachers,
    /// A student's own profile, subjects and grades.
    ViewOwnRecords,
    /// A teacher's advised sections and their students.
    ViewAdvisory,
}

impl Capability {
    pub const ALL: [Capability; 19] = [
        Capability::ManageUsers,
        Capability::ManageSettings,
        Capability::ViewSettings,
        Capability::ManageCalendar,
        Capability::ViewCalendar,
        Capability::ManageCurriculum,
        Capability::ManageStudents,
        Capability::ManageSections,
        Capability::ManageEnrollment,
        Capability::ViewGrades,
        Capability::EnterGrades,
        Capability::LockGrades,
        Capability::UnlockGrades,
        Capability::ImportData,
        Capability::ViewReports,
        Capability::ViewAuditLog,
        Capability::ManageTeachers,
        Capability::ViewOwnRecords,
        Capability::ViewAdvisory,
    ];
}

const REGISTRAR_CAPS: &[Capability] = &[
    Capability::ViewSettings,
    Capability::ViewCalendar,
    Capability::ManageCurriculum,
    Capability::ManageStudents,
    Capability::ManageSections,
    Capability::ManageEnrollment,
    Capability::ViewGrades,
    Capability::EnterGrades,
    Capability::LockGrades,
    Capability::ImportData,
    Capability::ViewReports,
    Capability::ManageTeachers,
];

const TEACHER_CAPS: &[Capability] = &[
    Capability::ViewSettings,
    Capability::ViewCalendar,
    Capability::ViewGrades,
    Capability::EnterGrades,
    Capability::LockGrades,
    Capability::ViewAdvisory,
];

const STUDENT_CAPS: &[Capability] = &[Capability::ViewCalendar, Capability::ViewOwnRecords];

pub fn role_capabilities(role: UserRole) -> &'static [Capability] {
    match role {
        UserRole::Admin => &Capability::ALL,
        UserRole::Registrar => REGISTRAR_CAPS,
        UserRole::Teacher => TEACHER_CAPS,
        UserRole::Student => STUDENT_CAPS,
    }
}

pub fn role_has(role: UserRole, cap: Capability) -> bool {
    role_capabilities(role).contains(&cap)
}

/// Who is making the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub role: UserRole,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    Open,
    Needs(Capability),
}

/// `None` means the method is not routed at all.
pub fn method_requirement(method: &str) -> Option<Requirement> {
    use Capability::*;
    let cap = match method {
        "health" | "workspace.select" => return Some(Requirement::Open),

        "settings.get" => ViewSettings,
        "settings.update" => ManageSettings,

        "users.list" | "users.create" | "users.update" | "users.toggleActive" => ManageUsers,

        "calendar.active" | "schoolYears.list" => ViewCalendar,
        "schoolYears.create"
        | "schoolYears.update"
        | "schoolYears.activate"
        | "semesters.activate"
        | "semesters.toggleEnrollment" => ManageCalendar,

        "tracks.list"
        | "tracks.create"
        | "tracks.update"
        | "tracks.toggleActive"
        | "strands.create"
        | "strands.update"
        | "strands.toggleActive"
        | "subjects.list"
        | "subjects.get"
        | "subjects.create"
        | "subjects.update"
        | "subjects.deactivate"
        | "subjects.restore" => ManageCurriculum,

        "students.list"
        | "students.get"
        | "students.create"
        | "students.update"
        | "students.delete"
        | "students.duplicateCheck"
        | "students.linkAccount" => ManageStudents,

        "teachers.list"
        | "teachers.get"
        | "teachers.updateProfile"
        | "teachers.addTraining"
        | "teachers.removeTraining" => ManageTeachers,

        "my.profile" | "my.subjects" | "my.grades" => ViewOwnRecords,
        "my.sections" | "my.students" => ViewAdvisory,

        "audit.list" => ViewAuditLog,

        "sections.list" | "sections.get" | "sections.create" | "sections.update"
        | "sections.delete" => ManageSections,

        "enrollment.list"
        | "enrollment.get"
        | "enrollment.create"
        | "enrollment.updateStatus"
        | "enrollment.subjectLoad"
        | "enrollment.checkPrerequisites"
        | "enrollment.availableSections"
        | "enrollment.setupChecklist" => ManageEnrollment,

        "grades.sections" | "grades.sheet" => ViewGrades,
        "grades.save" => EnterGrades,
        "grades.lock" => LockGrades,
        "grades.unlock" => UnlockGrades,

        "imports.students.upload"
        | "imports.students.confirm"
        | "imports.grades.upload"
        | "imports.grades.confirm"
        | "imports.template" => ImportData,

        "reports.dashboard"
        | "reports.enrollmentSummary"
        | "reports.classList"
        | "reports.masterlist"
        | "reports.gradeSummary"
        | "reports.sf1"
        | "reports.sf5"
        | "reports.sf9"
        | "reports.sf10"
        | "exports.enrollmentSummary"
        | "exports.classList"
        | "exports.masterlist"
        | "exports.sf1"
        | "exports.sf5" => ViewReports,

        _ => return None,
    };
    Some(Requirement::Needs(cap))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlock_is_admin_only() {
        assert!(role_has(UserRole::Admin, Capability::UnlockGrades));
        assert!(!role_has(UserRole::Registrar, Capability::UnlockGrades));
        assert!(!role_has(UserRole::Teacher, Capability::UnlockGrades));
        assert!(!role_has(UserRole::Student, Capability::UnlockGrades));
    }

    #[test]
    fn admin_only_capabilities_are_exclusive() {
        for cap in [
            Capability::ManageUsers,
            Capability::ManageSettings,
            Capability::ManageCalendar,
            Capability::UnlockGrades,
            Capability::ViewAuditLog,
        ] {
            for role in [UserRole::Registrar, UserRole::Teacher, UserRole::Student] {
                assert!(!role_has(role, cap), "{:?} must not have {:?}", role, cap);
            }
        }
    }

    #[test]
    fn teachers_grade_but_do_not_manage_records() {
        assert!(role_has(UserRole::Teacher, Capability::EnterGrades));
        assert!(role_has(UserRole::Teacher, Capability::LockGrades));
        assert!(!role_has(UserRole::Teacher, Capability::ManageStudents));
        assert!(!role_has(UserRole::Teacher, Capability::ViewReports));
    }

    #[test]
    fn portals_are_split_by_role() {
        assert!(role_has(UserRole::Student, Capability::ViewOwnRecords));
        assert!(!role_has(UserRole::Student, Capability::ViewAdvisory));
        assert!(role_has(UserRole::Teacher, Capability::ViewAdvisory));
        assert!(!role_has(UserRole::Teacher, Capability::ViewOwnRecords));
        assert!(role_has(UserRole::Registrar, Capability::ManageTeachers));
        assert!(!role_has(UserRole::Teacher, Capability::ManageTeachers));
    }

    #[test]
    fn method_requirements() {
        assert_eq!(method_requirement("health"), Some(Requirement::Open));
        assert_eq!(
            method_requirement("grades.unlock"),
            Some(Requirement::Needs(Capability::UnlockGrades))
        );
        assert_eq!(
            method_requirement("reports.sf5"),
            Some(Requirement::Needs(Capability::ViewReports))
        );
        assert_eq!(
            method_requirement("audit.list"),
            Some(Requirement::Needs(Capability::ViewAuditLog))
        );
        assert_eq!(
            method_requirement("my.grades"),
            Some(Requirement::Needs(Capability::ViewOwnRecords))
        );
        assert_eq!(method_requirement("grades.recalculate"), None);
    }
}
