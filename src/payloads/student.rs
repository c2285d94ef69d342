use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(Serialize, Deserialize, Debug)]
pub struct EnrollPayload {
    pub student_id: i64,
    pub course_id: i64,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct DropCoursePayload {
    pub student_id: i64,
    pub course_id: i64,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct SubmitPayload {
    pub student_id: i64,
    pub item_id: i64,
    /// Opaque submission content (attached file references, quiz answers).
    pub payload: JsonValue,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct GetSubmissionParams {
    pub student_id: i64,
    pub item_id: i64,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct GetGradeItemsParams {
    pub course_id: i64,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct GetGradeReportParams {
    pub student_id: i64,
    pub course_id: i64,
}
