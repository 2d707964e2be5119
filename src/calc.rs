use crate::domain::{EnrollmentStatus, GradeRemarks};
use serde::Serialize;

/// How midterm and finals combine into a final grade.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GradePolicy {
    /// Percent weights, normally summing to 100 (not enforced).
    Weighted { midterm_weight: f64, finals_weight: f64 },
    /// Plain mean of the two components. Used by spreadsheet grade import.
    SimpleAverage,
}

impl GradePolicy {
    pub fn name(&self) -> &'static str {
        match self {
            GradePolicy::Weighted { .. } => "weighted",
            GradePolicy::SimpleAverage => "simple_average",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeOutcome {
    pub final_grade: Option<f64>,
    pub remarks: Option<GradeRemarks>,
}

/// Half away from zero at two decimals. The nudge keeps values such as 86.005
/// (stored as 86.00499..) rounding the way they are written.
pub fn round_2dp(x: f64) -> f64 {
    ((x * 100.0) + 1e-6_f64.copysign(x)).round() / 100.0
}

pub fn compute_final_grade(
    midterm: Option<f64>,
    finals: Option<f64>,
    policy: GradePolicy,
    passing_grade: f64,
) -> GradeOutcome {
    let (Some(m), Some(f)) = (midterm, finals) else {
        return GradeOutcome {
            final_grade: None,
            remarks: None,
        };
    };

    let raw = match policy {
        GradePolicy::Weighted {
            midterm_weight,
            finals_weight,
        } => m * midterm_weight / 100.0 + f * finals_weight / 100.0,
        GradePolicy::SimpleAverage => (m + f) / 2.0,
    };
    let final_grade = round_2dp(raw);
    GradeOutcome {
        final_grade: Some(final_grade),
        remarks: Some(remarks_for(final_grade, passing_grade)),
    }
}

pub fn remarks_for(final_grade: f64, passing_grade: f64) -> GradeRemarks {
    if final_grade >= passing_grade {
        GradeRemarks::Passed
    } else {
        GradeRemarks::Failed
    }
}

/// Mean of the present final grades, rounded to two decimals.
pub fn general_average<I>(finals: I) -> Option<f64>
where
    I: IntoIterator<Item = Option<f64>>,
{
    let mut sum = 0.0;
    let mut n = 0usize;
    for v in finals.into_iter().flatten() {
        sum += v;
        n += 1;
    }
    if n == 0 {
        None
    } else {
        Some(round_2dp(sum / n as f64))
    }
}

pub fn format_2dp(v: Option<f64>) -> String {
    v.map(|x| format!("{:.2}", x)).unwrap_or_default()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AcademicResult {
    NoGrades,
    Passed,
    Failed,
}

impl AcademicResult {
    pub fn label(self) -> &'static str {
        match self {
            AcademicResult::NoGrades => "No Grades",
            AcademicResult::Passed => "Passed",
            AcademicResult::Failed => "Failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PromotionStatus {
    NotRated,
    Promoted,
    Retained,
    Transferred,
    Dropped,
}

impl PromotionStatus {
    pub fn label(self) -> &'static str {
        match self {
            PromotionStatus::NotRated => "-",
            PromotionStatus::Promoted => "Promoted",
            PromotionStatus::Retained => "Retained",
            PromotionStatus::Transferred => "Transferred",
            PromotionStatus::Dropped => "Dropped",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PromotionOutcome {
    pub general_average: Option<f64>,
    pub result: AcademicResult,
    pub status: PromotionStatus,
}

/// Promotion standing for one enrollment. `finals` holds one entry per grade row,
/// `None` where no final grade exists yet.
pub fn promotion_outcome(
    enrollment_status: EnrollmentStatus,
    finals: &[Option<f64>],
    passing_grade: f64,
) -> PromotionOutcome {
    let general_average = general_average(finals.iter().copied());
    let any_graded = finals.iter().any(|f| f.is_some());
    let all_passed = !finals.is_empty()
        && finals
            .iter()
            .all(|f| matches!(f, Some(v) if *v >= passing_grade));

    let result = if !any_graded {
        AcademicResult::NoGrades
    } else if all_passed {
        AcademicResult::Passed
    } else {
        AcademicResult::Failed
    };

    let status = match enrollment_status {
        EnrollmentStatus::Transferred => PromotionStatus::Transferred,
        EnrollmentStatus::Dropped => PromotionStatus::Dropped,
        EnrollmentStatus::Pending | EnrollmentStatus::Enrolled => match result {
            AcademicResult::NoGrades => PromotionStatus::NotRated,
            AcademicResult::Passed => PromotionStatus::Promoted,
            AcademicResult::Failed => PromotionStatus::Retained,
        },
    };

    PromotionOutcome {
        general_average,
        result,
        status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WEIGHTED_40_60: GradePolicy = GradePolicy::Weighted {
        midterm_weight: 40.0,
        finals_weight: 60.0,
    };

    #[test]
    fn weighted_80_90_is_86_passed() {
        let out = compute_final_grade(Some(80.0), Some(90.0), WEIGHTED_40_60, 75.0);
        assert_eq!(out.final_grade, Some(86.0));
        assert_eq!(out.remarks, Some(GradeRemarks::Passed));
    }

    #[test]
    fn missing_component_yields_no_final() {
        for (m, f) in [(Some(80.0), None), (None, Some(90.0)), (None, None)] {
            let out = compute_final_grade(m, f, WEIGHTED_40_60, 75.0);
            assert_eq!(out.final_grade, None);
            assert_eq!(out.remarks, None);
        }
    }

    #[test]
    fn threshold_is_inclusive() {
        let out = compute_final_grade(Some(75.0), Some(75.0), WEIGHTED_40_60, 75.0);
        assert_eq!(out.remarks, Some(GradeRemarks::Passed));
        let out = compute_final_grade(Some(74.0), Some(75.0), WEIGHTED_40_60, 75.0);
        assert_eq!(out.final_grade, Some(74.6));
        assert_eq!(out.remarks, Some(GradeRemarks::Failed));
    }

    #[test]
    fn simple_average_differs_from_weighted() {
        let avg = compute_final_grade(Some(70.0), Some(81.0), GradePolicy::SimpleAverage, 75.0);
        assert_eq!(avg.final_grade, Some(75.5));
        let weighted = compute_final_grade(Some(70.0), Some(81.0), WEIGHTED_40_60, 75.0);
        assert_eq!(weighted.final_grade, Some(76.6));
    }

    #[test]
    fn round_2dp_rounds_half_away_from_zero() {
        assert_eq!(round_2dp(86.005), 86.01);
        assert_eq!(round_2dp(86.004), 86.0);
        assert_eq!(round_2dp(83.333333), 83.33);
        assert_eq!(round_2dp(-1.005), -1.01);
    }

    #[test]
    fn general_average_ignores_missing() {
        assert_eq!(general_average([Some(80.0), None, Some(91.0)]), Some(85.5));
        assert_eq!(general_average([None, None]), None);
        assert_eq!(format_2dp(Some(85.5)), "85.50");
        assert_eq!(format_2dp(None), "");
    }

    #[test]
    fn promotion_table() {
        let promoted = promotion_outcome(EnrollmentStatus::Enrolled, &[Some(80.0), Some(75.0)], 75.0);
        assert_eq!(promoted.status, PromotionStatus::Promoted);
        assert_eq!(promoted.result, AcademicResult::Passed);
        assert_eq!(promoted.general_average, Some(77.5));

        let retained = promotion_outcome(EnrollmentStatus::Enrolled, &[Some(80.0), Some(74.99)], 75.0);
        assert_eq!(retained.status, PromotionStatus::Retained);
        assert_eq!(retained.result.label(), "Failed");

        let partial = promotion_outcome(EnrollmentStatus::Enrolled, &[Some(90.0), None], 75.0);
        assert_eq!(partial.status, PromotionStatus::Retained);

        let none = promotion_outcome(EnrollmentStatus::Enrolled, &[None, None], 75.0);
        assert_eq!(none.status.label(), "-");
        assert_eq!(none.result.label(), "No Grades");
        assert_eq!(none.general_average, None);

        let transferred = promotion_outcome(EnrollmentStatus::Transferred, &[Some(95.0)], 75.0);
        assert_eq!(transferred.status.label(), "Transferred");
        assert_eq!(transferred.result, AcademicResult::Passed);

        let dropped = promotion_outcome(EnrollmentStatus::Dropped, &[], 75.0);
        assert_eq!(dropped.status.label(), "Dropped");
    }
}
