use crate::schema::attendance_records;
use crate::schema::courses;
use crate::schema::grade_items;
use crate::schema::students;
use chrono::{DateTime, Utc};
use diesel::Insertable;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Insertable, Debug)]
#[diesel(table_name = courses)]
pub struct NewCourse {
    pub title: String,
    pub attendance_weight: i32,
    pub assignment_weight: i32,
    pub exam_weight: i32,
    pub weeks_count: i32,
    pub assignment_count: i32,
    pub exam_count: i32,
    // created_at, updated_at have DB defaults
}

#[derive(Insertable, Debug)]
#[diesel(table_name = grade_items)]
pub struct NewGradeItem {
    pub course_id: i64,
    pub category: String,
    pub display_name: String,
    pub max_score: i32,
    pub due_date: Option<DateTime<Utc>>,
    pub position: i32,
    // created_at has a DB default
}

#[derive(Insertable, Debug)]
#[diesel(table_name = students)]
pub struct NewStudent {
    pub email: String,
    pub display_name: String,
    // created_at has a DB default
}

#[derive(Insertable, Debug)]
#[diesel(table_name = attendance_records)]
pub struct NewAttendanceRecord {
    pub student_id: i64,
    pub course_id: i64,
    pub session_uuid: Uuid,
    pub week: i32,
    pub duration_seconds: i32,
    pub total_duration_seconds: i32,
    pub session_date: DateTime<Utc>,
    // recorded_at has a DB default
}

/// Outcome of a grading call. The grade itself is committed before the
/// final-grade refresh is attempted; `final_grade_refreshed` tells the
/// caller whether that second, best-effort step also went through.
#[derive(Serialize, Deserialize, Debug)]
pub struct GradeSubmissionResponse {
    pub item_id: i64,
    pub student_id: i64,
    pub score: f64,
    pub status: String,
    pub final_grade_refreshed: bool,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct RecalculationResponse {
    pub enrollment_id: i64,
    pub weighted_total: f64,
    pub progress_percentage: f64,
    pub summary_refreshed: bool,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct GradebookRowResponse {
    pub enrollment_id: i64,
    pub student_id: i64,
    pub weighted_total: f64,
    pub progress_percentage: f64,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct CourseGradebookResponse {
    pub course_id: i64,
    pub rows: Vec<GradebookRowResponse>,
}
