//! Closed value sets stored as lowercase text columns.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    Pending,
    Enrolled,
    Dropped,
    Transferred,
}

impl EnrollmentStatus {
    pub const ALL: [EnrollmentStatus; 4] = [
        EnrollmentStatus::Pending,
        EnrollmentStatus::Enrolled,
        EnrollmentStatus::Dropped,
        EnrollmentStatus::Transferred,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "enrolled" => Some(Self::Enrolled),
            "dropped" => Some(Self::Dropped),
            "transferred" => Some(Self::Transferred),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Enrolled => "enrolled",
            Self::Dropped => "dropped",
            Self::Transferred => "transferred",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Enrolled => "Enrolled",
            Self::Dropped => "Dropped",
            Self::Transferred => "Transferred",
        }
    }

    /// Statuses reachable from `self`. Nothing moves back to pending.
    pub fn can_transition_to(self, next: EnrollmentStatus) -> bool {
        match (self, next) {
            (Self::Pending, Self::Enrolled | Self::Dropped | Self::Transferred) => true,
            (Self::Enrolled, Self::Dropped | Self::Transferred) => true,
            (Self::Pending, Self::Pending)
            | (Self::Enrolled, Self::Pending | Self::Enrolled)
            | (Self::Dropped, _)
            | (Self::Transferred, _) => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StudentStatus {
    Active,
    Transferred,
    Dropped,
    Graduated,
}

impl StudentStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Some(Self::Active),
            "transferred" => Some(Self::Transferred),
            "dropped" => Some(Self::Dropped),
            "graduated" => Some(Self::Graduated),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Transferred => "transferred",
            Self::Dropped => "dropped",
            Self::Graduated => "graduated",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Active => "Active",
            Self::Transferred => "Transferred",
            Self::Dropped => "Dropped",
            Self::Graduated => "Graduated",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GradeRemarks {
    Passed,
    Failed,
}

impl GradeRemarks {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "passed" => Some(Self::Passed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Passed => "Passed",
            Self::Failed => "Failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectType {
    Core,
    Specialized,
    Applied,
}

impl SubjectType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "core" => Some(Self::Core),
            "specialized" => Some(Self::Specialized),
            "applied" => Some(Self::Applied),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Core => "core",
            Self::Specialized => "specialized",
            Self::Applied => "applied",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Core => "Core",
            Self::Specialized => "Specialized",
            Self::Applied => "Applied",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "male" => Some(Self::Male),
            "female" => Some(Self::Female),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Male => "Male",
            Self::Female => "Female",
        }
    }

    /// Single-letter form used on the school register.
    pub fn initial(self) -> &'static str {
        match self {
            Self::Male => "M",
            Self::Female => "F",
        }
    }
}

pub fn grade_level_valid(level: i64) -> bool {
    matches!(level, 11 | 12)
}

pub fn grade_level_label(level: i64) -> String {
    format!("Grade {level}")
}

pub fn semester_label(number: i64) -> &'static str {
    match number {
        1 => "1st Semester",
        2 => "2nd Semester",
        _ => "Semester",
    }
}

/// Pages past this are empty anyway; the cap keeps `offset` in range.
pub const MAX_PAGE: i64 = 1_000_000;

/// 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: i64,
    pub per_page: i64,
}

impl Page {
    pub fn new(page: i64, per_page: i64) -> Self {
        Self {
            page: page.clamp(1, MAX_PAGE),
            per_page: per_page.clamp(1, 500),
        }
    }

    pub fn offset(self) -> i64 {
        (self.page - 1).saturating_mul(self.per_page)
    }

    pub fn last_page(self, total: i64) -> i64 {
        ((total + self.per_page - 1) / self.per_page).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enrollment_transitions_never_return_to_pending() {
        for from in EnrollmentStatus::ALL {
            assert!(!from.can_transition_to(EnrollmentStatus::Pending));
        }
        assert!(EnrollmentStatus::Pending.can_transition_to(EnrollmentStatus::Enrolled));
        assert!(EnrollmentStatus::Enrolled.can_transition_to(EnrollmentStatus::Transferred));
        assert!(!EnrollmentStatus::Dropped.can_transition_to(EnrollmentStatus::Enrolled));
        assert!(!EnrollmentStatus::Transferred.can_transition_to(EnrollmentStatus::Dropped));
    }

    #[test]
    fn page_is_clamped_at_both_ends() {
        let huge = Page::new(i64::MAX, 15);
        assert_eq!(huge.page, MAX_PAGE);
        assert_eq!(huge.offset(), (MAX_PAGE - 1) * 15);
        let low = Page::new(-4, 0);
        assert_eq!(low, Page { page: 1, per_page: 1 });
        assert_eq!(low.offset(), 0);
        assert_eq!(Page::new(2, 15).last_page(16), 2);
        assert_eq!(Page::new(1, 15).last_page(0), 1);
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(Gender::parse(" Female "), Some(Gender::Female));
        assert_eq!(SubjectType::parse("CORE"), Some(SubjectType::Core));
        assert_eq!(StudentStatus::parse("unknown"), None);
    }
}
