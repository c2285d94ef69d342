use crate::schema::enrollments;
use crate::schema::grade_summaries;
use crate::schema::student_grades;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(Insertable, Debug)]
#[diesel(table_name = enrollments)]
pub struct NewEnrollment {
    pub student_id: i64,
    pub course_id: i64,
    pub status: String,
    // final_grade starts NULL, enrolled_at has a DB default
}

#[derive(Insertable, Debug)]
#[diesel(table_name = student_grades)]
pub struct NewStudentGrade {
    pub enrollment_id: i64,
    pub grade_item_id: i64,
    pub score: BigDecimal,
    pub status: String,
    pub submission_payload: JsonValue,
    // feedback, submitted_at, graded_at start NULL
}

/// Zeroed summary row doubling as the "not started" progress marker
/// created alongside a fresh enrollment.
#[derive(Insertable, Debug)]
#[diesel(table_name = grade_summaries)]
pub struct NewGradeSummary {
    pub enrollment_id: i64,
    pub weighted_total: BigDecimal,
    pub progress: BigDecimal,
    pub attendance_rate: BigDecimal,
    pub assignment_avg: BigDecimal,
    pub exam_avg: BigDecimal,
    // refreshed_at has a DB default
}

#[derive(Serialize, Deserialize, Debug, Queryable)]
pub struct GradeItemView {
    pub id: i64,
    pub category: String,
    pub display_name: String,
    pub max_score: i32,
    pub due_date: Option<DateTime<Utc>>,
    pub position: i32,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct SubmissionView {
    pub item_id: i64,
    pub display_name: String,
    pub category: String,
    pub status: String,
    pub score: f64,
    pub feedback: Option<String>,
    pub submission_payload: JsonValue,
    pub submitted_at: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    pub has_submitted: bool,
    // derived on every read, never stored
    pub is_late: bool,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct CategoryCompletionResponse {
    pub attendance: f64,
    pub assignment: f64,
    pub exam: f64,
}

/// Full on-demand grade report. `weighted_total` is the authoritative
/// number; `cached_final_grade` is the denormalized snapshot last written
/// by the recalculator and may lag behind it.
#[derive(Serialize, Deserialize, Debug)]
pub struct GradeReportResponse {
    pub student_id: i64,
    pub course_id: i64,
    pub enrollment_id: i64,
    pub attendance_rate: f64,
    pub assignment_avg: f64,
    pub exam_avg: f64,
    pub weighted_total: f64,
    pub progress_percentage: f64,
    pub completion: CategoryCompletionResponse,
    pub cached_final_grade: Option<f64>,
}
