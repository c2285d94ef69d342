use super::helper;
use crate::errors::{AppError, GradingError};
use crate::grading::{self, EnrollmentStatus, GradeCategory, GradeStatus};
use crate::model::instructor::{
    CourseGradebookResponse, GradeSubmissionResponse, GradebookRowResponse, NewAttendanceRecord,
    NewCourse, NewGradeItem, NewStudent, RecalculationResponse,
};
use crate::model::student::GradeReportResponse;
use crate::payloads::instructor::{
    CreateCoursePayload, CreateStudentPayload, GetCourseGradebookParams,
    GetStudentGradeReportParams, GradeSubmissionPayload, ProvisionCatalogPayload,
    RecalculateFinalGradePayload, RecordAttendancePayload, SetItemDueDatePayload,
};
use crate::response::ApiResponse;
use crate::schema::{
    attendance_records::dsl as ar_dsl, courses::dsl as courses_dsl,
    enrollments::dsl as enr_dsl, grade_items::dsl as items_dsl,
    student_grades::dsl as sg_dsl, students::dsl as students_dsl,
};
use anyhow::anyhow;
use axum::Json;
use axum::extract::{Query, State};
use bigdecimal::{BigDecimal, ToPrimitive};
use chrono::Utc;
use deadpool_diesel::postgres::Pool;
use diesel::dsl::exists;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use std::collections::HashMap;
use tracing::log::warn;
use tracing::{debug, error, info, instrument};

/// Creates a course with its category weights and expected item counts.
///
/// Request Body: `CreateCoursePayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `i64`: The new course ID (200 OK).
/// * `422 Unprocessable Entity`: If the weights do not sum to 100 or a
///   count is negative.
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(pool, payload))]
pub async fn create_course(
    State(pool): State<Pool>,
    Json(payload): Json<CreateCoursePayload>,
) -> Result<ApiResponse<i64>, AppError> {
    info!("Attempting to create course '{}'", payload.title);
    debug!("Create course payload: {:?}", payload);

    if !grading::weights_valid(
        payload.attendance_weight,
        payload.assignment_weight,
        payload.exam_weight,
    ) {
        warn!(
            "Rejected course '{}' with weights ({}, {}, {})",
            payload.title,
            payload.attendance_weight,
            payload.assignment_weight,
            payload.exam_weight
        );
        return Err(GradingError::InvalidWeights {
            attendance: payload.attendance_weight,
            assignment: payload.assignment_weight,
            exam: payload.exam_weight,
        }
        .into());
    }
    if payload.weeks_count < 0 || payload.assignment_count < 0 || payload.exam_count < 0 {
        return Err(AppError::UnprocessableEntity(
            "Category counts must be non-negative.".to_string(),
        ));
    }

    let new_course = NewCourse {
        title: payload.title.clone(),
        attendance_weight: payload.attendance_weight,
        assignment_weight: payload.assignment_weight,
        exam_weight: payload.exam_weight,
        weeks_count: payload.weeks_count,
        assignment_count: payload.assignment_count,
        exam_count: payload.exam_count,
    };

    let course_id = helper::run_query(&pool, move |conn| {
        diesel::insert_into(courses_dsl::courses)
            .values(&new_course)
            .returning(courses_dsl::id)
            .get_result::<i64>(conn)
    })
    .await?;

    info!("Created course '{}' with ID {}", payload.title, course_id);
    Ok(ApiResponse::ok(course_id))
}

/// Provisions the grade item catalog for a course: one attendance item per
/// week, then the assignment block, then the exam block. All inserts run
/// in one transaction — a partial catalog is never committed.
///
/// Request Body: `ProvisionCatalogPayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `Vec<i64>`: IDs of the created grade items, in position order (200 OK).
/// * `404 Not Found`: If the course does not exist.
/// * `409 Conflict`: If the course already has a catalog.
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(pool, payload))]
pub async fn provision_catalog(
    State(pool): State<Pool>,
    Json(payload): Json<ProvisionCatalogPayload>,
) -> Result<ApiResponse<Vec<i64>>, AppError> {
    let course_id = payload.course_id;
    info!("Provisioning grade item catalog for course {}", course_id);
    debug!("Provision catalog payload: {:?}", payload);

    type CourseCountsTuple = (i32, i32, i32);
    let course_counts = helper::run_query(&pool, move |conn| {
        courses_dsl::courses
            .find(course_id)
            .select((
                courses_dsl::weeks_count,
                courses_dsl::assignment_count,
                courses_dsl::exam_count,
            ))
            .first::<CourseCountsTuple>(conn)
            .optional()
    })
    .await?;

    let Some((weeks, assignments, exams)) = course_counts else {
        error!("Course with ID {} not found.", course_id);
        return Err(AppError::NotFound(format!(
            "Course with ID {} not found.",
            course_id
        )));
    };

    let already_provisioned = helper::run_query(&pool, move |conn| {
        diesel::select(exists(
            items_dsl::grade_items.filter(items_dsl::course_id.eq(course_id)),
        ))
        .get_result::<bool>(conn)
    })
    .await?;
    if already_provisioned {
        warn!("Course {} already has a grade item catalog.", course_id);
        return Err(AppError::Conflict(format!(
            "Course {} already has a grade item catalog.",
            course_id
        )));
    }

    let default_due_date = payload.default_due_date;
    let conn = pool.get().await?;
    let item_ids: Result<Vec<i64>, AppError> = conn
        .interact(move |conn_sync| {
            conn_sync.transaction(|transaction_conn| {
                let rows: Vec<NewGradeItem> = grading::plan_catalog(weeks, assignments, exams)
                    .into_iter()
                    .map(|item| NewGradeItem {
                        course_id,
                        category: item.category.as_str().to_string(),
                        display_name: item.display_name,
                        max_score: item.max_score,
                        // attendance items have no deadline
                        due_date: match item.category {
                            GradeCategory::Attendance => None,
                            _ => default_due_date,
                        },
                        position: item.position,
                    })
                    .collect();

                let ids = diesel::insert_into(items_dsl::grade_items)
                    .values(&rows)
                    .returning(items_dsl::id)
                    .get_results::<i64>(transaction_conn)
                    .map_err(AppError::from)?;

                Ok(ids)
            })
        })
        .await?;
    let item_ids = item_ids?;

    info!(
        "Provisioned {} grade items for course {}",
        item_ids.len(),
        course_id
    );
    Ok(ApiResponse::ok(item_ids))
}

/// Administrative edit of a single grade item's due date.
///
/// Request Body: `SetItemDueDatePayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `bool`: true if the item was updated (200 OK).
/// * `404 Not Found`: If the item does not exist.
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(pool, payload))]
pub async fn set_item_due_date(
    State(pool): State<Pool>,
    Json(payload): Json<SetItemDueDatePayload>,
) -> Result<ApiResponse<bool>, AppError> {
    let item_id = payload.item_id;
    info!(
        "Setting due date of grade item {} to {:?}",
        item_id, payload.due_date
    );

    let rows_affected = helper::run_query(&pool, move |conn| {
        diesel::update(items_dsl::grade_items.find(item_id))
            .set(items_dsl::due_date.eq(payload.due_date))
            .execute(conn)
    })
    .await?;

    match rows_affected {
        1 => Ok(ApiResponse::ok(true)),
        0 => {
            error!("Grade item with ID {} not found.", item_id);
            Err(GradingError::ItemNotFound { item_id }.into())
        }
        n => {
            error!(
                "Expected 1 row to be affected by due date update, but {} rows were affected for item_id: {}",
                n, item_id
            );
            Err(AppError::InternalServerError(anyhow!(
                "Update affected {} rows, expected 1",
                n
            )))
        }
    }
}

/// Creates a student directory row. Identity itself lives in Keycloak;
/// this row only anchors enrollments and attendance records.
///
/// Request Body: `CreateStudentPayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `i64`: The new student ID (200 OK).
/// * `409 Conflict`: If the email is already registered.
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(pool, payload))]
pub async fn create_student(
    State(pool): State<Pool>,
    Json(payload): Json<CreateStudentPayload>,
) -> Result<ApiResponse<i64>, AppError> {
    info!(
        "Attempting to create student with email '{}'",
        payload.email
    );

    let new_student = NewStudent {
        email: payload.email.clone(),
        display_name: payload.display_name,
    };

    let insert_result = helper::run_query(&pool, move |conn| {
        diesel::insert_into(students_dsl::students)
            .values(&new_student)
            .returning(students_dsl::id)
            .get_result::<i64>(conn)
    })
    .await;

    match insert_result {
        Ok(student_id) => {
            info!("Created student {} for '{}'", student_id, payload.email);
            Ok(ApiResponse::ok(student_id))
        }
        Err(AppError::InternalServerError(ref err)) => {
            if let Some(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) =
                err.downcast_ref::<DieselError>()
            {
                warn!("Student email '{}' is already registered.", payload.email);
                return Err(AppError::Conflict(
                    "Student email is already registered.".to_string(),
                ));
            }
            Err(insert_result.unwrap_err())
        }
        Err(e) => Err(e),
    }
}

/// Ingests one conferencing session's attendance for a student: upserts the
/// raw record (vendor webhook replays are idempotent) and, when the week
/// ordinal maps to a catalog attendance item, scores that item with the
/// presence ratio and marks it graded.
///
/// Request Body: `RecordAttendancePayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `bool`: true if a week attendance item was scored, false if the week
///   lies outside the catalog (200 OK).
/// * `400 Bad Request`: If the week ordinal or durations are invalid.
/// * `403 Forbidden`: If the student has no active enrollment in the course.
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(pool, payload))]
pub async fn record_attendance(
    State(pool): State<Pool>,
    Json(payload): Json<RecordAttendancePayload>,
) -> Result<ApiResponse<bool>, AppError> {
    let student_id = payload.student_id;
    let course_id = payload.course_id;
    info!(
        "Recording attendance for student {} in course {}, week {}, session {}",
        student_id, course_id, payload.week, payload.session_uuid
    );
    debug!("Record attendance payload: {:?}", payload);

    if payload.week < 1 {
        return Err(AppError::BadRequest(
            "Week ordinal must be at least 1.".to_string(),
        ));
    }
    if payload.duration_seconds < 0 || payload.total_duration_seconds <= 0 {
        return Err(AppError::BadRequest(
            "Durations must be non-negative and the session length positive.".to_string(),
        ));
    }

    let enrollment_id = helper::find_active_enrollment(&pool, student_id, course_id)
        .await?
        .ok_or_else(|| {
            warn!(
                "Student {} has no active enrollment in course {}. Cannot record attendance.",
                student_id, course_id
            );
            AppError::from(GradingError::NotEnrolled {
                student_id,
                course_id,
            })
        })?;

    let week = payload.week;
    let presence_ratio =
        (payload.duration_seconds as f64 / payload.total_duration_seconds as f64).clamp(0.0, 1.0);
    let week_score = helper::to_decimal(presence_ratio * 100.0);

    let conn = pool.get().await?;
    let synced: Result<bool, AppError> = conn
        .interact(move |conn_sync| {
            conn_sync.transaction(|transaction_conn| {
                let new_record = NewAttendanceRecord {
                    student_id,
                    course_id,
                    session_uuid: payload.session_uuid,
                    week,
                    duration_seconds: payload.duration_seconds,
                    total_duration_seconds: payload.total_duration_seconds,
                    session_date: payload.session_date,
                };
                diesel::insert_into(ar_dsl::attendance_records)
                    .values(&new_record)
                    .on_conflict((ar_dsl::student_id, ar_dsl::course_id, ar_dsl::session_uuid))
                    .do_update()
                    .set((
                        ar_dsl::week.eq(week),
                        ar_dsl::duration_seconds.eq(payload.duration_seconds),
                        ar_dsl::total_duration_seconds.eq(payload.total_duration_seconds),
                        ar_dsl::session_date.eq(payload.session_date),
                        ar_dsl::recorded_at.eq(Utc::now()),
                    ))
                    .execute(transaction_conn)
                    .map_err(AppError::from)?;

                let week_item = items_dsl::grade_items
                    .filter(items_dsl::course_id.eq(course_id))
                    .filter(items_dsl::category.eq(GradeCategory::Attendance.as_str()))
                    .filter(items_dsl::position.eq(week))
                    .select(items_dsl::id)
                    .first::<i64>(transaction_conn)
                    .optional()
                    .map_err(AppError::from)?;

                let Some(item_id) = week_item else {
                    warn!(
                        "Week {} has no attendance item in the catalog of course {}; raw record kept, nothing scored.",
                        week, course_id
                    );
                    return Ok(false);
                };

                let rows_affected = diesel::update(
                    sg_dsl::student_grades
                        .filter(sg_dsl::enrollment_id.eq(enrollment_id))
                        .filter(sg_dsl::grade_item_id.eq(item_id)),
                )
                .set((
                    sg_dsl::score.eq(week_score),
                    sg_dsl::status.eq(GradeStatus::Graded.as_str()),
                    sg_dsl::graded_at.eq(Some(Utc::now())),
                ))
                .execute(transaction_conn)
                .map_err(AppError::from)?;

                if rows_affected != 1 {
                    error!(
                        "Expected exactly one grade row for enrollment {} and item {}, found {}",
                        enrollment_id, item_id, rows_affected
                    );
                    return Err(AppError::InternalServerError(anyhow!(
                        "Grade placeholder rows are inconsistent for enrollment {}",
                        enrollment_id
                    )));
                }

                Ok(true)
            })
        })
        .await?;
    let synced = synced?;

    refresh_final_grade_best_effort(&pool, student_id, course_id).await;

    info!(
        "Recorded attendance for student {} in course {} (week item scored: {})",
        student_id, course_id, synced
    );
    Ok(ApiResponse::ok(synced))
}

/// Grades one student's work on a grade item: stores score and feedback,
/// marks the item completed, then refreshes the enrollment's final grade
/// on a best-effort basis. The grade write is authoritative — a failed
/// refresh is logged and reported via `final_grade_refreshed`, never as a
/// failure of the grading call.
///
/// Request Body: `GradeSubmissionPayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `GradeSubmissionResponse` (200 OK).
/// * `403 Forbidden`: If the student has no active enrollment in the
///   item's course.
/// * `404 Not Found`: If the item does not exist.
/// * `422 Unprocessable Entity`: If the score is outside [0, 100].
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(pool, payload))]
pub async fn grade_submission(
    State(pool): State<Pool>,
    Json(payload): Json<GradeSubmissionPayload>,
) -> Result<ApiResponse<GradeSubmissionResponse>, AppError> {
    let student_id = payload.student_id;
    let item_id = payload.item_id;
    info!(
        "Grading item {} for student {} with score {}",
        item_id, student_id, payload.score
    );
    debug!("Grade submission payload: {:?}", payload);

    if !grading::score_valid(payload.score) {
        warn!(
            "Rejected score {} for item {} (student {})",
            payload.score, item_id, student_id
        );
        return Err(GradingError::InvalidScore {
            score: payload.score,
        }
        .into());
    }

    let course_id = helper::run_query(&pool, move |conn| {
        items_dsl::grade_items
            .find(item_id)
            .select(items_dsl::course_id)
            .first::<i64>(conn)
            .optional()
    })
    .await?
    .ok_or_else(|| {
        error!("Grade item with ID {} not found.", item_id);
        AppError::from(GradingError::ItemNotFound { item_id })
    })?;

    let enrollment_id = helper::find_active_enrollment(&pool, student_id, course_id)
        .await?
        .ok_or_else(|| {
            warn!(
                "Student {} has no active enrollment in course {}. Cannot grade item {}.",
                student_id, course_id, item_id
            );
            AppError::from(GradingError::NotEnrolled {
                student_id,
                course_id,
            })
        })?;

    let score = payload.score;
    let feedback = payload.feedback.clone();
    let rows_affected = helper::run_query(&pool, move |conn| {
        diesel::update(
            sg_dsl::student_grades
                .filter(sg_dsl::enrollment_id.eq(enrollment_id))
                .filter(sg_dsl::grade_item_id.eq(item_id)),
        )
        .set((
            sg_dsl::score.eq(helper::to_decimal(score)),
            sg_dsl::status.eq(GradeStatus::Graded.as_str()),
            sg_dsl::feedback.eq(feedback),
            sg_dsl::graded_at.eq(Some(Utc::now())),
        ))
        .execute(conn)
    })
    .await?;

    match rows_affected {
        1 => {}
        0 => {
            error!(
                "No grade row exists for enrollment {} and item {}; enrollment initialization is incomplete.",
                enrollment_id, item_id
            );
            return Err(AppError::NotFound(format!(
                "No grade record exists for student {} on item {}.",
                student_id, item_id
            )));
        }
        n => {
            error!(
                "Expected 1 row to be affected by grading update, but {} rows were affected for enrollment {} item {}",
                n, enrollment_id, item_id
            );
            return Err(AppError::InternalServerError(anyhow!(
                "Update affected {} rows, expected 1",
                n
            )));
        }
    }

    let final_grade_refreshed = refresh_final_grade_best_effort(&pool, student_id, course_id).await;

    info!(
        "Graded item {} for student {} (final grade refreshed: {})",
        item_id, student_id, final_grade_refreshed
    );
    Ok(ApiResponse::ok(GradeSubmissionResponse {
        item_id,
        student_id,
        score,
        status: GradeStatus::Graded.as_str().to_string(),
        final_grade_refreshed,
    }))
}

/// Explicit recalculation trigger for one enrollment's final grade.
/// Idempotent: repeated calls with unchanged data write the same numbers.
///
/// Request Body: `RecalculateFinalGradePayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `RecalculationResponse` (200 OK).
/// * `404 Not Found`: If the course or enrollment does not exist.
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(pool, payload))]
pub async fn recalculate_final_grade(
    State(pool): State<Pool>,
    Json(payload): Json<RecalculateFinalGradePayload>,
) -> Result<ApiResponse<RecalculationResponse>, AppError> {
    info!(
        "Recalculating final grade for student {} in course {}",
        payload.student_id, payload.course_id
    );

    let outcome =
        helper::recalculate_and_persist(&pool, payload.student_id, payload.course_id).await?;

    info!(
        "Recalculated final grade for enrollment {}: weighted total {:.2}, progress {:.2}% (summary refreshed: {})",
        outcome.enrollment_id,
        outcome.report.weighted_total,
        outcome.report.progress_percentage,
        outcome.summary_refreshed
    );
    Ok(ApiResponse::ok(RecalculationResponse {
        enrollment_id: outcome.enrollment_id,
        weighted_total: outcome.report.weighted_total,
        progress_percentage: outcome.report.progress_percentage,
        summary_refreshed: outcome.summary_refreshed,
    }))
}

/// On-demand grade report for one student in one course — the
/// authoritative read path, recomputed from raw rows on every call.
///
/// Query Parameters:
/// * `student_id`, `course_id`
///
/// Returns (wrapped in `ApiResponse`)
/// * `GradeReportResponse` (200 OK).
/// * `404 Not Found`: If the course or enrollment does not exist.
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(pool, params))]
pub async fn get_student_grade_report(
    State(pool): State<Pool>,
    Query(params): Query<GetStudentGradeReportParams>,
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

/// Recomputes the grade report for every active enrollment of a course
/// from one set of bulk reads.
///
/// Query Parameters:
/// * `course_id`
///
/// Returns (wrapped in `ApiResponse`)
/// * `CourseGradebookResponse`: one row per active enrollment, ordered by
///   student ID (200 OK).
/// * `404 Not Found`: If the course does not exist.
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(pool, params))]
pub async fn get_course_gradebook(
    State(pool): State<Pool>,
    Query(params): Query<GetCourseGradebookParams>,
) -> Result<ApiResponse<CourseGradebookResponse>, AppError> {
    let course_id = params.course_id;
    info!("Building gradebook for course {}", course_id);

    type CourseConfigTuple = (i32, i32, i32, i32, i32, i32);
    let course_config = helper::run_query(&pool, move |conn| {
        courses_dsl::courses
            .find(course_id)
            .select((
                courses_dsl::attendance_weight,
                courses_dsl::assignment_weight,
                courses_dsl::exam_weight,
                courses_dsl::weeks_count,
                courses_dsl::assignment_count,
                courses_dsl::exam_count,
            ))
            .first::<CourseConfigTuple>(conn)
            .optional()
    })
    .await?;
    let Some((aw, sw, ew, weeks, assignments, exams)) = course_config else {
        error!("Course with ID {} not found.", course_id);
        return Err(AppError::NotFound(format!(
            "Course with ID {} not found.",
            course_id
        )));
    };
    let plan = grading::CourseGradingPlan {
        attendance_weight: aw,
        assignment_weight: sw,
        exam_weight: ew,
        weeks_count: weeks,
        assignment_count: assignments,
        exam_count: exams,
    };

    let enrollments = helper::run_query(&pool, move |conn| {
        enr_dsl::enrollments
            .filter(enr_dsl::course_id.eq(course_id))
            .filter(enr_dsl::status.eq(EnrollmentStatus::Active.as_str()))
            .select((enr_dsl::id, enr_dsl::student_id))
            .load::<(i64, i64)>(conn)
    })
    .await?;

    let grade_rows = helper::run_query(&pool, move |conn| {
        sg_dsl::student_grades
            .inner_join(items_dsl::grade_items.on(sg_dsl::grade_item_id.eq(items_dsl::id)))
            .filter(items_dsl::course_id.eq(course_id))
            .select((
                sg_dsl::enrollment_id,
                items_dsl::category,
                sg_dsl::score,
                sg_dsl::status,
            ))
            .load::<(i64, String, BigDecimal, String)>(conn)
    })
    .await?;

    let attendance_rows = helper::run_query(&pool, move |conn| {
        ar_dsl::attendance_records
            .filter(ar_dsl::course_id.eq(course_id))
            .select((
                ar_dsl::student_id,
                ar_dsl::duration_seconds,
                ar_dsl::total_duration_seconds,
            ))
            .load::<(i64, i32, i32)>(conn)
    })
    .await?;

    let mut grades_by_enrollment: HashMap<i64, Vec<grading::ItemGrade>> = HashMap::new();
    for (enrollment_id, category_raw, score, status_raw) in grade_rows {
        let (Some(category), Some(status)) = (
            GradeCategory::parse(&category_raw),
            grading::GradeStatus::parse(&status_raw),
        ) else {
            warn!(
                "Skipping grade row with unknown category '{}' or status '{}' for enrollment {}",
                category_raw, status_raw, enrollment_id
            );
            continue;
        };
        grades_by_enrollment
            .entry(enrollment_id)
            .or_default()
            .push(grading::ItemGrade {
                category,
                score: score.to_f64().unwrap_or(0.0),
                graded: status == GradeStatus::Graded,
            });
    }

    let mut attendance_by_student: HashMap<i64, Vec<grading::AttendanceSlice>> = HashMap::new();
    for (student_id, duration, total) in attendance_rows {
        attendance_by_student
            .entry(student_id)
            .or_default()
            .push(grading::AttendanceSlice {
                duration_seconds: duration as i64,
                total_duration_seconds: total as i64,
            });
    }

    let mut rows: Vec<GradebookRowResponse> = enrollments
        .into_iter()
        .map(|(enrollment_id, student_id)| {
            let grades = grades_by_enrollment
                .get(&enrollment_id)
                .map(|list| list.as_slice())
                .unwrap_or(&[]);
            let attendance = attendance_by_student
                .get(&student_id)
                .map(|list| list.as_slice())
                .unwrap_or(&[]);
            let report = grading::compute_grade(&plan, attendance, grades);
            GradebookRowResponse {
                enrollment_id,
                student_id,
                weighted_total: report.weighted_total,
                progress_percentage: report.progress_percentage,
            }
        })
        .collect();
    rows.sort_by_key(|row| row.student_id);

    info!(
        "Built gradebook for course {} with {} rows",
        course_id,
        rows.len()
    );
    Ok(ApiResponse::ok(CourseGradebookResponse { course_id, rows }))
}

/// Runs the recalculator after a committed grading event. Failures are
/// logged and swallowed: the grade itself is already recorded and the
/// next on-demand report self-corrects.
async fn refresh_final_grade_best_effort(pool: &Pool, student_id: i64, course_id: i64) -> bool {
    match helper::recalculate_and_persist(pool, student_id, course_id).await {
        Ok(outcome) => {
            if !outcome.summary_refreshed {
                warn!(
                    "Final grade cache updated for enrollment {} but the summary store refresh failed.",
                    outcome.enrollment_id
                );
            }
            true
        }
        Err(err) => {
            warn!(
                "Recalculation unavailable for student {} in course {}: {}. Grade write stands.",
                student_id, course_id, err
            );
            false
        }
    }
}
