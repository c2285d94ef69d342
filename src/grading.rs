//! Pure grade and progress computation.
//!
//! Everything in this module is store-free and deterministic: the API layer
//! loads rows, maps them into the plain inputs below and calls into here, so
//! every read path (dashboards, transcripts, recalculation) agrees on the
//! same numbers.

use chrono::{DateTime, Utc};

/// Max score assigned to every provisioned grade item.
pub const DEFAULT_MAX_SCORE: i32 = 100;

/// Human names preferred for the first few exam items, in order. Exams past
/// the end of the list fall back to "Exam {n}".
const EXAM_NAME_PREFERENCES: &[&str] = &["Midterm", "Final", "Quiz 1", "Quiz 2"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradeCategory {
    Attendance,
    Assignment,
    Exam,
}

impl GradeCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            GradeCategory::Attendance => "attendance",
            GradeCategory::Assignment => "assignment",
            GradeCategory::Exam => "exam",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "attendance" => Some(GradeCategory::Attendance),
            "assignment" => Some(GradeCategory::Assignment),
            "exam" => Some(GradeCategory::Exam),
            _ => None,
        }
    }
}

/// Lifecycle of one grade item for one enrollment. The status column is the
/// canonical completion signal: an item counts as completed only once it is
/// `Graded`; a stored submission timestamp alone does not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradeStatus {
    NotSubmitted,
    Submitted,
    Graded,
}

impl GradeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GradeStatus::NotSubmitted => "not_submitted",
            GradeStatus::Submitted => "submitted",
            GradeStatus::Graded => "graded",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "not_submitted" => Some(GradeStatus::NotSubmitted),
            "submitted" => Some(GradeStatus::Submitted),
            "graded" => Some(GradeStatus::Graded),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrollmentStatus {
    Active,
    Dropped,
}

impl EnrollmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrollmentStatus::Active => "active",
            EnrollmentStatus::Dropped => "dropped",
        }
    }
}

/// One row of the catalog plan produced by [`plan_catalog`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogItemPlan {
    pub category: GradeCategory,
    pub display_name: String,
    pub position: i32,
    pub max_score: i32,
}

/// Lays out the full grade item catalog for a course: one attendance item
/// per week, then the assignment block, then the exam block, positions
/// contiguous from 1.
pub fn plan_catalog(
    weeks_count: i32,
    assignment_count: i32,
    exam_count: i32,
) -> Vec<CatalogItemPlan> {
    let mut items = Vec::new();
    let mut position = 1;

    for week in 1..=weeks_count {
        items.push(CatalogItemPlan {
            category: GradeCategory::Attendance,
            display_name: format!("Week {} Attendance", week),
            position,
            max_score: DEFAULT_MAX_SCORE,
        });
        position += 1;
    }

    for assignment in 1..=assignment_count {
        items.push(CatalogItemPlan {
            category: GradeCategory::Assignment,
            display_name: format!("Assignment {}", assignment),
            position,
            max_score: DEFAULT_MAX_SCORE,
        });
        position += 1;
    }

    for exam in 1..=exam_count {
        let display_name = match EXAM_NAME_PREFERENCES.get((exam - 1) as usize) {
            Some(name) => (*name).to_string(),
            None => format!("Exam {}", exam),
        };
        items.push(CatalogItemPlan {
            category: GradeCategory::Exam,
            display_name,
            position,
            max_score: DEFAULT_MAX_SCORE,
        });
        position += 1;
    }

    items
}

/// Category weights must be non-negative percentages summing to exactly 100.
/// Checked at course configuration time only; the aggregator never
/// re-normalizes a misconfigured course.
pub fn weights_valid(attendance: i32, assignment: i32, exam: i32) -> bool {
    attendance >= 0 && assignment >= 0 && exam >= 0 && attendance + assignment + exam == 100
}

/// Scores are accepted on the closed range [0, 100].
pub fn score_valid(score: f64) -> bool {
    (0.0..=100.0).contains(&score)
}

/// A submission is accepted up to and including the due date; only
/// `now > due_date` closes the window. No due date means no deadline.
pub fn submission_window_open(now: DateTime<Utc>, due_date: Option<DateTime<Utc>>) -> bool {
    match due_date {
        Some(due) => now <= due,
        None => true,
    }
}

/// Late flag, derived on every read and never stored.
pub fn is_late(submitted_at: Option<DateTime<Utc>>, due_date: Option<DateTime<Utc>>) -> bool {
    match (submitted_at, due_date) {
        (Some(submitted), Some(due)) => submitted > due,
        _ => false,
    }
}

/// Course configuration consumed by the aggregator: the three category
/// weights plus the expected cardinality of each category.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CourseGradingPlan {
    pub attendance_weight: i32,
    pub assignment_weight: i32,
    pub exam_weight: i32,
    pub weeks_count: i32,
    pub assignment_count: i32,
    pub exam_count: i32,
}

/// One attendance record, reduced to the time actually present and the
/// session length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttendanceSlice {
    pub duration_seconds: i64,
    pub total_duration_seconds: i64,
}

/// One grade item row for the enrollment, reduced to what the aggregator
/// needs. `graded` is true only for rows in the `Graded` status.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ItemGrade {
    pub category: GradeCategory,
    pub score: f64,
    pub graded: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CategoryCompletion {
    pub attendance: f64,
    pub assignment: f64,
    pub exam: f64,
}

/// Aggregated output: the per-category rates, the weighted course grade and
/// the earned-vs-possible progress percentage. The two headline numbers are
/// related but distinct; see [`compute_grade`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GradeReport {
    pub attendance_rate: f64,
    pub assignment_avg: f64,
    pub exam_avg: f64,
    pub weighted_total: f64,
    pub progress_percentage: f64,
    pub completion: CategoryCompletion,
}

/// Computes the full grade report for one enrollment.
///
/// * Attendance rate: sum of attended seconds over sum of scheduled
///   seconds, as a percentage clamped to [0, 100]; 0 when nothing was
///   scheduled.
/// * Category averages: sum of graded scores divided by the *configured*
///   category count, so ungraded items depress the average instead of
///   inflating it.
/// * Weighted total: category values combined by the course weights
///   verbatim. Weights that do not sum to 100 are a configuration bug and
///   are not corrected here.
/// * Progress percentage: graded points earned over
///   `(weeks + assignments + exams) * 100` possible points. This is not the
///   weighted total: progress measures how much of the course is done,
///   the weighted total how well it was done.
pub fn compute_grade(
    plan: &CourseGradingPlan,
    attendance: &[AttendanceSlice],
    grades: &[ItemGrade],
) -> GradeReport {
    let attended: i64 = attendance.iter().map(|a| a.duration_seconds).sum();
    let scheduled: i64 = attendance.iter().map(|a| a.total_duration_seconds).sum();
    let attendance_rate = if scheduled > 0 {
        ((attended as f64 / scheduled as f64) * 100.0).clamp(0.0, 100.0)
    } else {
        0.0
    };

    let mut graded_counts = [0i32; 3];
    let mut graded_sums = [0f64; 3];
    let mut earned_points = 0f64;

    for grade in grades {
        if !grade.graded {
            continue;
        }
        let slot = match grade.category {
            GradeCategory::Attendance => 0,
            GradeCategory::Assignment => 1,
            GradeCategory::Exam => 2,
        };
        graded_counts[slot] += 1;
        graded_sums[slot] += grade.score;
        earned_points += grade.score;
    }

    let category_avg = |sum: f64, expected: i32| -> f64 {
        if expected > 0 { sum / expected as f64 } else { 0.0 }
    };
    let assignment_avg = category_avg(graded_sums[1], plan.assignment_count);
    let exam_avg = category_avg(graded_sums[2], plan.exam_count);

    let weighted_total = attendance_rate * plan.attendance_weight as f64 / 100.0
        + assignment_avg * plan.assignment_weight as f64 / 100.0
        + exam_avg * plan.exam_weight as f64 / 100.0;

    let total_items = plan.weeks_count + plan.assignment_count + plan.exam_count;
    let possible_points = (total_items as f64) * DEFAULT_MAX_SCORE as f64;
    let progress_percentage = if total_items > 0 {
        earned_points / possible_points * 100.0
    } else {
        0.0
    };

    let completion_rate = |graded: i32, expected: i32| -> f64 {
        if expected > 0 {
            (graded as f64 / expected as f64 * 100.0).clamp(0.0, 100.0)
        } else {
            0.0
        }
    };

    GradeReport {
        attendance_rate,
        assignment_avg,
        exam_avg,
        weighted_total,
        progress_percentage,
        completion: CategoryCompletion {
            attendance: completion_rate(graded_counts[0], plan.weeks_count),
            assignment: completion_rate(graded_counts[1], plan.assignment_count),
            exam: completion_rate(graded_counts[2], plan.exam_count),
        },
    }
}
