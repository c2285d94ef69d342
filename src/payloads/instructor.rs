use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Serialize, Deserialize, Debug)]
pub struct CreateCoursePayload {
    pub title: String,
    pub attendance_weight: i32,
    pub assignment_weight: i32,
    pub exam_weight: i32,
    pub weeks_count: i32,
    pub assignment_count: i32,
    pub exam_count: i32,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ProvisionCatalogPayload {
    pub course_id: i64,
    /// Applied to assignment and exam items; attendance items carry no due
    /// date.
    pub default_due_date: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct SetItemDueDatePayload {
    pub item_id: i64,
    pub due_date: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct CreateStudentPayload {
    pub email: String,
    pub display_name: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct RecordAttendancePayload {
    pub student_id: i64,
    pub course_id: i64,
    pub session_uuid: Uuid,
    pub week: i32,
    pub duration_seconds: i32,
    pub total_duration_seconds: i32,
    pub session_date: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct GradeSubmissionPayload {
    pub student_id: i64,
    pub item_id: i64,
    pub score: f64,
    pub feedback: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct RecalculateFinalGradePayload {
    pub student_id: i64,
    pub course_id: i64,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct GetStudentGradeReportParams {
    pub student_id: i64,
    pub course_id: i64,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct GetCourseGradebookParams {
    pub course_id: i64,
}
