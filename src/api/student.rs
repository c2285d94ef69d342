use super::helper;
use crate::errors::{AppError, GradingError};
use crate::grading::{self, EnrollmentStatus, GradeStatus};
use crate::model::student::{
    GradeItemView, GradeReportResponse, NewEnrollment, NewGradeSummary, NewStudentGrade,
    SubmissionView,
};
use crate::payloads::student::{
    DropCoursePayload, EnrollPayload, GetGradeItemsParams, GetGradeReportParams,
    GetSubmissionParams, SubmitPayload,
};
use crate::response::ApiResponse;
use crate::schema::{
    courses::dsl as courses_dsl, enrollments::dsl as enr_dsl, grade_items::dsl as items_dsl,
    grade_summaries::dsl as summaries_dsl, student_grades::dsl as sg_dsl,
};
use anyhow::anyhow;
use axum::Json;
use axum::extract::{Query, State};
use bigdecimal::{BigDecimal, ToPrimitive};
use chrono::{DateTime, Utc};
use deadpool_diesel::postgres::Pool;
use diesel::dsl::exists;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use serde_json::Value as JsonValue;
use serde_json::json;
use tracing::log::warn;
use tracing::{debug, error, info, instrument};

/// Enrolls a student into a course and materializes one zeroed grade
/// record per catalog item, so later computations can assume a dense
/// record set. Enrollment row, progress marker and placeholders are
/// created in one transaction — a duplicate enrollment performs no writes
/// at all.
///
/// Request Body: `EnrollPayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `i64`: The new enrollment ID (200 OK).
/// * `404 Not Found`: If the student or course does not exist.
/// * `409 Conflict`: If the student already has an active enrollment in
///   the course.
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(pool, payload))]
pub async fn enroll(
    State(pool): State<Pool>,
    Json(payload): Json<EnrollPayload>,
) -> Result<ApiResponse<i64>, AppError> {
    let student_id = payload.student_id;
    let course_id = payload.course_id;
    info!(
        "Attempting to enroll student {} into course {}",
        student_id, course_id
    );
    debug!("Enroll payload: {:?}", payload);

    if helper::find_active_enrollment(&pool, student_id, course_id)
        .await?
        .is_some()
    {
        warn!(
            "Student {} is already actively enrolled in course {}.",
            student_id, course_id
        );
        return Err(GradingError::AlreadyEnrolled {
            student_id,
            course_id,
        }
        .into());
    }

    let conn = pool.get().await?;
    let enrollment_result: Result<i64, AppError> = conn
        .interact(move |conn_sync| {
            conn_sync.transaction(|transaction_conn| {
                let new_enrollment = NewEnrollment {
                    student_id,
                    course_id,
                    status: EnrollmentStatus::Active.as_str().to_string(),
                };
                let enrollment_id = diesel::insert_into(enr_dsl::enrollments)
                    .values(&new_enrollment)
                    .returning(enr_dsl::id)
                    .get_result::<i64>(transaction_conn)
                    .map_err(|e| match e {
                        DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, _) => {
                            AppError::NotFound(format!(
                                "Student with ID {} or Course with ID {} not found.",
                                student_id, course_id
                            ))
                        }
                        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                            AppError::Conflict(format!(
                                "Student {} is already enrolled in course {} (race condition).",
                                student_id, course_id
                            ))
                        }
                        _ => AppError::from(e),
                    })?;

                // "not started" progress marker
                let new_summary = NewGradeSummary {
                    enrollment_id,
                    weighted_total: BigDecimal::from(0),
                    progress: BigDecimal::from(0),
                    attendance_rate: BigDecimal::from(0),
                    assignment_avg: BigDecimal::from(0),
                    exam_avg: BigDecimal::from(0),
                };
                diesel::insert_into(summaries_dsl::grade_summaries)
                    .values(&new_summary)
                    .execute(transaction_conn)
                    .map_err(AppError::from)?;

                let item_ids = items_dsl::grade_items
                    .filter(items_dsl::course_id.eq(course_id))
                    .select(items_dsl::id)
                    .load::<i64>(transaction_conn)
                    .map_err(AppError::from)?;

                // An unprovisioned course simply has no gradable items yet.
                if !item_ids.is_empty() {
                    let placeholders: Vec<NewStudentGrade> = item_ids
                        .into_iter()
                        .map(|grade_item_id| NewStudentGrade {
                            enrollment_id,
                            grade_item_id,
                            score: BigDecimal::from(0),
                            status: GradeStatus::NotSubmitted.as_str().to_string(),
                            submission_payload: json!({}),
                        })
                        .collect();
                    diesel::insert_into(sg_dsl::student_grades)
                        .values(&placeholders)
                        .execute(transaction_conn)
                        .map_err(AppError::from)?;
                }

                Ok(enrollment_id)
            })
        })
        .await?;
    let enrollment_id = enrollment_result?;

    info!(
        "Student {} enrolled in course {} with enrollment ID {}",
        student_id, course_id, enrollment_id
    );
    Ok(ApiResponse::ok(enrollment_id))
}

/// Marks a student's active enrollment in a course as dropped. Grade rows
/// and attendance records are kept; the enrollment just stops counting as
/// active.
///
/// Request Body: `DropCoursePayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `bool`: true if the enrollment was dropped (200 OK).
/// * `404 Not Found`: If no active enrollment links the student to the
///   course.
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(pool, payload))]
pub async fn drop_course(
    State(pool): State<Pool>,
    Json(payload): Json<DropCoursePayload>,
) -> Result<ApiResponse<bool>, AppError> {
    let student_id = payload.student_id;
    let course_id = payload.course_id;
    info!(
        "Attempting to drop student {} from course {}",
        student_id, course_id
    );

    let rows_affected = helper::run_query(&pool, move |conn| {
        let target = enr_dsl::enrollments
            .filter(enr_dsl::student_id.eq(student_id))
            .filter(enr_dsl::course_id.eq(course_id))
            .filter(enr_dsl::status.eq(EnrollmentStatus::Active.as_str()));

        diesel::update(target)
            .set(enr_dsl::status.eq(EnrollmentStatus::Dropped.as_str()))
            .execute(conn)
    })
    .await?;

    match rows_affected {
        0 => {
            warn!(
                "No active enrollment found for student {} in course {}. Nothing to drop.",
                student_id, course_id
            );
            Err(AppError::NotFound(format!(
                "No active enrollment found for student {} in course {}.",
                student_id, course_id
            )))
        }
        1 => {
            info!("Student {} dropped course {}", student_id, course_id);
            Ok(ApiResponse::ok(true))
        }
        n => {
            error!(
                "Expected 1 row to be affected by drop update, but {} rows were affected for student {} course {}",
                n, student_id, course_id
            );
            Err(AppError::InternalServerError(anyhow!(
                "Update affected {} rows, expected 1",
                n
            )))
        }
    }
}

/// Accepts (or overwrites) a student's submission for a grade item.
/// Accepted up to and including the due date; a previously graded item
/// returns to the submitted state and must be re-graded, keeping its old
/// score on the row.
///
/// Request Body: `SubmitPayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `bool`: true when the submission was stored (200 OK).
/// * `403 Forbidden`: If the student has no active enrollment in the
///   item's course.
/// * `404 Not Found`: If the item does not exist.
/// * `422 Unprocessable Entity`: If the due date has passed.
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(pool, payload))]
pub async fn submit(
    State(pool): State<Pool>,
    Json(payload): Json<SubmitPayload>,
) -> Result<ApiResponse<bool>, AppError> {
    let student_id = payload.student_id;
    let item_id = payload.item_id;
    info!(
        "Attempting submission for item {} by student {}",
        item_id, student_id
    );
    debug!("Submit payload: {:?}", payload);

    type ItemTuple = (i64, Option<DateTime<Utc>>);
    let item = helper::run_query(&pool, move |conn| {
        items_dsl::grade_items
            .find(item_id)
            .select((items_dsl::course_id, items_dsl::due_date))
            .first::<ItemTuple>(conn)
            .optional()
    })
    .await?;

    let Some((course_id, due_date)) = item else {
        error!("Grade item with ID {} not found.", item_id);
        return Err(GradingError::ItemNotFound { item_id }.into());
    };

    let enrollment_id = helper::find_active_enrollment(&pool, student_id, course_id)
        .await?
        .ok_or_else(|| {
            warn!(
                "Student {} has no active enrollment in course {}. Cannot submit item {}.",
                student_id, course_id, item_id
            );
            AppError::from(GradingError::NotEnrolled {
                student_id,
                course_id,
            })
        })?;

    let now = Utc::now();
    if let Some(due) = due_date {
        if !grading::submission_window_open(now, Some(due)) {
            warn!(
                "Rejected late submission for item {} by student {} ({} > {})",
                item_id, student_id, now, due
            );
            return Err(GradingError::PastDueDate { due_date: due }.into());
        }
    }

    let submission_payload = payload.payload.clone();
    let rows_affected = helper::run_query(&pool, move |conn| {
        diesel::update(
            sg_dsl::student_grades
                .filter(sg_dsl::enrollment_id.eq(enrollment_id))
                .filter(sg_dsl::grade_item_id.eq(item_id)),
        )
        .set((
            sg_dsl::submission_payload.eq(submission_payload),
            sg_dsl::submitted_at.eq(Some(now)),
            // the score of a previously graded attempt is preserved
            sg_dsl::status.eq(GradeStatus::Submitted.as_str()),
        ))
        .execute(conn)
    })
    .await?;

    match rows_affected {
        1 => {
            info!(
                "Stored submission for item {} by student {} (enrollment {})",
                item_id, student_id, enrollment_id
            );
            Ok(ApiResponse::ok(true))
        }
        0 => {
            error!(
                "No grade row exists for enrollment {} and item {}; enrollment initialization is incomplete.",
                enrollment_id, item_id
            );
            Err(AppError::NotFound(format!(
                "No grade record exists for student {} on item {}.",
                student_id, item_id
            )))
        }
        n => {
            error!(
                "Expected 1 row to be affected by submission update, but {} rows were affected for enrollment {} item {}",
                n, enrollment_id, item_id
            );
            Err(AppError::InternalServerError(anyhow!(
                "Update affected {} rows, expected 1",
                n
            )))
        }
    }
}

/// Retrieves a student's record for one grade item, with the late flag
/// derived from the timestamps on every read.
///
/// Query Parameters:
/// * `student_id`, `item_id`
///
/// Returns (wrapped in `ApiResponse`)
/// * `SubmissionView` (200 OK).
/// * `404 Not Found`: If the item, the enrollment or the grade record does
///   not exist.
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(pool, params))]
pub async fn get_submission(
    State(pool): State<Pool>,
    Query(params): Query<GetSubmissionParams>,
) -> Result<ApiResponse<SubmissionView>, AppError> {
    let student_id = params.student_id;
    let item_id = params.item_id;
    info!(
        "Fetching submission view for item {} and student {}",
        item_id, student_id
    );

    type ItemTuple = (i64, String, String, Option<DateTime<Utc>>);
    let item = helper::run_query(&pool, move |conn| {
        items_dsl::grade_items
            .find(item_id)
            .select((
                items_dsl::course_id,
                items_dsl::display_name,
                items_dsl::category,
                items_dsl::due_date,
            ))
            .first::<ItemTuple>(conn)
            .optional()
    })
    .await?;
    let Some((course_id, display_name, category, due_date)) = item else {
        error!("Grade item with ID {} not found.", item_id);
        return Err(GradingError::ItemNotFound { item_id }.into());
    };

    let enrollment_id = helper::run_query(&pool, move |conn| {
        enr_dsl::enrollments
            .filter(enr_dsl::student_id.eq(student_id))
            .filter(enr_dsl::course_id.eq(course_id))
            .order(enr_dsl::enrolled_at.desc())
            .select(enr_dsl::id)
            .first::<i64>(conn)
            .optional()
    })
    .await?
    .ok_or_else(|| {
        warn!(
            "No enrollment found for student {} in course {}.",
            student_id, course_id
        );
        AppError::NotFound(format!(
            "No enrollment found for student {} in course {}.",
            student_id, course_id
        ))
    })?;

    type GradeRowTuple = (
        BigDecimal,
        String,
        JsonValue,
        Option<String>,
        Option<DateTime<Utc>>,
    );
    let grade_row = helper::run_query(&pool, move |conn| {
        sg_dsl::student_grades
            .filter(sg_dsl::enrollment_id.eq(enrollment_id))
            .filter(sg_dsl::grade_item_id.eq(item_id))
            .select((
                sg_dsl::score,
                sg_dsl::status,
                sg_dsl::submission_payload,
                sg_dsl::feedback,
                sg_dsl::submitted_at,
            ))
            .first::<GradeRowTuple>(conn)
            .optional()
    })
    .await?;
    let Some((score, status, submission_payload, feedback, submitted_at)) = grade_row else {
        error!(
            "No grade row exists for enrollment {} and item {}.",
            enrollment_id, item_id
        );
        return Err(AppError::NotFound(format!(
            "No grade record exists for student {} on item {}.",
            student_id, item_id
        )));
    };

    let view = SubmissionView {
        item_id,
        display_name,
        category,
        status,
        score: score.to_f64().unwrap_or(0.0),
        feedback,
        submission_payload,
        submitted_at,
        due_date,
        has_submitted: submitted_at.is_some(),
        is_late: grading::is_late(submitted_at, due_date),
    };

    info!(
        "Fetched submission view for item {} and student {} (late: {})",
        item_id, student_id, view.is_late
    );
    Ok(ApiResponse::ok(view))
}

/// Lists a course's grade item catalog in position order.
///
/// Query Parameters:
/// * `course_id`
///
/// Returns (wrapped in `ApiResponse`)
/// * `Vec<GradeItemView>` (200 OK); empty for an unprovisioned course.
/// * `404 Not Found`: If the course does not exist.
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(pool, params))]
pub async fn get_grade_items(
    State(pool): State<Pool>,
    Query(params): Query<GetGradeItemsParams>,
) -> Result<ApiResponse<Vec<GradeItemView>>, AppError> {
    let course_id = params.course_id;
    info!("Fetching grade item catalog for course {}", course_id);

    let course_exists = helper::run_query(&pool, move |conn| {
        diesel::select(exists(courses_dsl::courses.find(course_id))).get_result::<bool>(conn)
    })
    .await?;
    if !course_exists {
        error!("Course with ID {} not found.", course_id);
        return Err(AppError::NotFound(format!(
            "Course with ID {} not found.",
            course_id
        )));
    }

    let items = helper::run_query(&pool, move |conn| {
        items_dsl::grade_items
            .filter(items_dsl::course_id.eq(course_id))
            .order(items_dsl::position.asc())
            .select((
                items_dsl::id,
                items_dsl::category,
                items_dsl::display_name,
                items_dsl::max_score,
                items_dsl::due_date,
                items_dsl::position,
            ))
            .load::<GradeItemView>(conn)
    })
    .await?;

    info!(
        "Fetched {} grade items for course {}",
        items.len(),
        course_id
    );
    Ok(ApiResponse::ok(items))
}

/// On-demand grade report for the student's own dashboard. Runs the same
/// loader and aggregator as the instructor read path, so both views agree.
///
/// Query Parameters:
/// * `student_id`, `course_id`
///
/// Returns (wrapped in `ApiResponse`)
/// * `GradeReportResponse` (200 OK).
/// * `404 Not Found`: If the course or enrollment does not exist.
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(pool, params))]
pub async fn get_grade_report(
    State(pool): State<Pool>,
    Query(params): Query<GetGradeReportParams>,
) -> Result<ApiResponse<GradeReportResponse>, AppError> {
    info!(
        "Fetching grade report for student {} in course {}",
        params.student_id, params.course_id
    );

    let computation =
        helper::compute_grade_report(&pool, params.student_id, params.course_id).await?;

    Ok(ApiResponse::ok(helper::report_response(
        params.student_id,
        params.course_id,
        computation,
    )))
}
