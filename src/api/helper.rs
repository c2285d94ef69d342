use crate::errors::AppError;
use crate::grading::{
    self, AttendanceSlice, CourseGradingPlan, EnrollmentStatus, GradeCategory, GradeReport,
    GradeStatus, ItemGrade,
};
use crate::model::student::{CategoryCompletionResponse, GradeReportResponse};
use crate::schema::{
    attendance_records::dsl as ar_dsl, courses::dsl as courses_dsl,
    enrollments::dsl as enr_dsl, grade_items::dsl as items_dsl,
    grade_summaries::dsl as summaries_dsl, student_grades::dsl as sg_dsl,
};
use bigdecimal::{BigDecimal, FromPrimitive, ToPrimitive};
use chrono::Utc;
use deadpool_diesel::postgres::Pool;
use diesel::prelude::*;
use tracing::log::{debug, error, warn};

pub(super) async fn run_query<T, F>(pool: &Pool, query: F) -> Result<T, AppError>
where
    F: FnOnce(&mut diesel::PgConnection) -> Result<T, diesel::result::Error> + Send + 'static,
    T: Send + 'static,
{
    let conn = pool.get().await.map_err(AppError::from)?;
    debug!("DB connection object obtained from pool for interaction");

    let res = conn.interact(query).await;

    match res {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(diesel_err)) => {
            error!("Diesel query failed within interaction: {:?}", diesel_err);
            Err(AppError::from(diesel_err))
        }
        Err(interact_err) => {
            error!("Deadpool interact error: {:?}", interact_err);
            Err(AppError::from(interact_err))
        }
    }
}

/// Numeric columns carry two decimal places; computed floats are scaled to
/// match before persisting.
pub(super) fn to_decimal(value: f64) -> BigDecimal {
    BigDecimal::from_f64(value)
        .unwrap_or_else(|| BigDecimal::from(0))
        .with_scale(2)
}

/// Looks up the active enrollment linking a student to a course, if any.
pub(super) async fn find_active_enrollment(
    pool: &Pool,
    student_id: i64,
    course_id: i64,
) -> Result<Option<i64>, AppError> {
    run_query(pool, move |conn| {
        enr_dsl::enrollments
            .filter(enr_dsl::student_id.eq(student_id))
            .filter(enr_dsl::course_id.eq(course_id))
            .filter(enr_dsl::status.eq(EnrollmentStatus::Active.as_str()))
            .select(enr_dsl::id)
            .first::<i64>(conn)
            .optional()
    })
    .await
}

/// Everything a read path needs: the enrollment the report belongs to, the
/// freshly computed report and the possibly stale cached final grade.
pub(super) struct GradeComputation {
    pub enrollment_id: i64,
    pub report: GradeReport,
    pub cached_final_grade: Option<f64>,
}

/// Loads the enrollment's raw attendance and grade rows and runs the
/// aggregator over them. Shared by every read path and by the
/// recalculator so the numbers always agree.
pub(super) async fn compute_grade_report(
    pool: &Pool,
    student_id: i64,
    course_id: i64,
) -> Result<GradeComputation, AppError> {
    type CourseConfigTuple = (i32, i32, i32, i32, i32, i32);

    let course_config = run_query(pool, move |conn| {
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
        warn!("Course with ID {} not found.", course_id);
        return Err(AppError::NotFound(format!(
            "Course with ID {} not found.",
            course_id
        )));
    };
    let plan = CourseGradingPlan {
        attendance_weight: aw,
        assignment_weight: sw,
        exam_weight: ew,
        weeks_count: weeks,
        assignment_count: assignments,
        exam_count: exams,
    };

    // Latest enrollment regardless of status: transcripts for dropped
    // students remain readable.
    let enrollment = run_query(pool, move |conn| {
        enr_dsl::enrollments
            .filter(enr_dsl::student_id.eq(student_id))
            .filter(enr_dsl::course_id.eq(course_id))
            .order(enr_dsl::enrolled_at.desc())
            .select((enr_dsl::id, enr_dsl::final_grade))
            .first::<(i64, Option<BigDecimal>)>(conn)
            .optional()
    })
    .await?;

    let Some((enrollment_id, cached)) = enrollment else {
        warn!(
            "No enrollment found for student {} in course {}.",
            student_id, course_id
        );
        return Err(AppError::NotFound(format!(
            "No enrollment found for student {} in course {}.",
            student_id, course_id
        )));
    };

    let attendance_rows = run_query(pool, move |conn| {
        ar_dsl::attendance_records
            .filter(ar_dsl::student_id.eq(student_id))
            .filter(ar_dsl::course_id.eq(course_id))
            .select((ar_dsl::duration_seconds, ar_dsl::total_duration_seconds))
            .load::<(i32, i32)>(conn)
    })
    .await?;
    let attendance: Vec<AttendanceSlice> = attendance_rows
        .into_iter()
        .map(|(duration, total)| AttendanceSlice {
            duration_seconds: duration as i64,
            total_duration_seconds: total as i64,
        })
        .collect();

    let grade_rows = run_query(pool, move |conn| {
        sg_dsl::student_grades
            .inner_join(items_dsl::grade_items.on(sg_dsl::grade_item_id.eq(items_dsl::id)))
            .filter(sg_dsl::enrollment_id.eq(enrollment_id))
            .select((items_dsl::category, sg_dsl::score, sg_dsl::status))
            .load::<(String, BigDecimal, String)>(conn)
    })
    .await?;

    let mut grades = Vec::with_capacity(grade_rows.len());
    for (category_raw, score, status_raw) in grade_rows {
        let (Some(category), Some(status)) = (
            GradeCategory::parse(&category_raw),
            GradeStatus::parse(&status_raw),
        ) else {
            warn!(
                "Skipping grade row with unknown category '{}' or status '{}' for enrollment {}",
                category_raw, status_raw, enrollment_id
            );
            continue;
        };
        grades.push(ItemGrade {
            category,
            score: score.to_f64().unwrap_or(0.0),
            graded: status == GradeStatus::Graded,
        });
    }

    let report = grading::compute_grade(&plan, &attendance, &grades);

    Ok(GradeComputation {
        enrollment_id,
        report,
        cached_final_grade: cached.and_then(|value| value.to_f64()),
    })
}

/// Shapes a computation into the wire response. Both the student and the
/// instructor read paths go through here.
pub(super) fn report_response(
    student_id: i64,
    course_id: i64,
    computation: GradeComputation,
) -> GradeReportResponse {
    let report = computation.report;
    GradeReportResponse {
        student_id,
        course_id,
        enrollment_id: computation.enrollment_id,
        attendance_rate: report.attendance_rate,
        assignment_avg: report.assignment_avg,
        exam_avg: report.exam_avg,
        weighted_total: report.weighted_total,
        progress_percentage: report.progress_percentage,
        completion: CategoryCompletionResponse {
            attendance: report.completion.attendance,
            assignment: report.completion.assignment,
            exam: report.completion.exam,
        },
        cached_final_grade: computation.cached_final_grade,
    }
}

pub(super) struct RecalcOutcome {
    pub enrollment_id: i64,
    pub report: GradeReport,
    pub summary_refreshed: bool,
}

/// Recomputes an enrollment's grade report and persists it: the
/// denormalized summary row first, then the enrollment's `final_grade`
/// cache. A summary write failure is logged and reported through
/// `summary_refreshed`, never raised — the cache write is the fallback
/// that must land. Safe to call redundantly; last write wins.
pub(super) async fn recalculate_and_persist(
    pool: &Pool,
    student_id: i64,
    course_id: i64,
) -> Result<RecalcOutcome, AppError> {
    let computation = compute_grade_report(pool, student_id, course_id).await?;
    let enrollment_id = computation.enrollment_id;
    let report = computation.report;

    let summary_result = run_query(pool, move |conn| {
        let now = Utc::now();
        diesel::insert_into(summaries_dsl::grade_summaries)
            .values((
                summaries_dsl::enrollment_id.eq(enrollment_id),
                summaries_dsl::weighted_total.eq(to_decimal(report.weighted_total)),
                summaries_dsl::progress.eq(to_decimal(report.progress_percentage)),
                summaries_dsl::attendance_rate.eq(to_decimal(report.attendance_rate)),
                summaries_dsl::assignment_avg.eq(to_decimal(report.assignment_avg)),
                summaries_dsl::exam_avg.eq(to_decimal(report.exam_avg)),
                summaries_dsl::refreshed_at.eq(now),
            ))
            .on_conflict(summaries_dsl::enrollment_id)
            .do_update()
            .set((
                summaries_dsl::weighted_total.eq(to_decimal(report.weighted_total)),
                summaries_dsl::progress.eq(to_decimal(report.progress_percentage)),
                summaries_dsl::attendance_rate.eq(to_decimal(report.attendance_rate)),
                summaries_dsl::assignment_avg.eq(to_decimal(report.assignment_avg)),
                summaries_dsl::exam_avg.eq(to_decimal(report.exam_avg)),
                summaries_dsl::refreshed_at.eq(now),
            ))
            .execute(conn)
    })
    .await;

    let summary_refreshed = match summary_result {
        Ok(_) => true,
        Err(err) => {
            warn!(
                "Summary store refresh failed for enrollment {}: {}. Falling back to the enrollment cache only.",
                enrollment_id, err
            );
            false
        }
    };

    run_query(pool, move |conn| {
        diesel::update(enr_dsl::enrollments.find(enrollment_id))
            .set(enr_dsl::final_grade.eq(Some(to_decimal(report.weighted_total))))
            .execute(conn)
    })
    .await?;

    Ok(RecalcOutcome {
        enrollment_id,
        report,
        summary_refreshed,
    })
}
