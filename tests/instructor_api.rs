use axum::http::StatusCode;
use chrono::{Duration, Utc};
use diesel::prelude::*;
use float_cmp::approx_eq;
use lms_grading_server::model::instructor::{
    CourseGradebookResponse, GradeSubmissionResponse, RecalculationResponse,
};
use lms_grading_server::model::student::GradeReportResponse;
use lms_grading_server::payloads::instructor::{
    CreateCoursePayload, CreateStudentPayload, GradeSubmissionPayload, ProvisionCatalogPayload,
    RecalculateFinalGradePayload, RecordAttendancePayload, SetItemDueDatePayload,
};
use lms_grading_server::response::ApiResponse;
use lms_grading_server::schema;
use uuid::Uuid;

mod helpers;
use helpers::{
    count_attendance_records, create_test_course, create_test_enrollment, create_test_grade_item,
    create_test_student, get_enrollment_final_grade, get_grade_row, get_summary_totals,
    setup_test_environment,
};

// create_course

#[tokio::test]
async fn test_create_course_success() {
    let (server, _pool) = setup_test_environment().await;

    let payload = CreateCoursePayload {
        title: "Distributed Systems".to_string(),
        attendance_weight: 20,
        assignment_weight: 50,
        exam_weight: 30,
        weeks_count: 12,
        assignment_count: 4,
        exam_count: 2,
    };
    let response = server.post("/instructor/create_course").json(&payload).await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let body: ApiResponse<i64> = response.json();
    assert_eq!(body.status_code, 200);
    assert!(body.data.is_some());
}

#[tokio::test]
async fn test_create_course_rejects_weights_not_summing_to_one_hundred() {
    let (server, _pool) = setup_test_environment().await;

    for weights in [(19, 50, 30), (20, 50, 31), (-10, 60, 50)] {
        let payload = CreateCoursePayload {
            title: "Broken Weights".to_string(),
            attendance_weight: weights.0,
            assignment_weight: weights.1,
            exam_weight: weights.2,
            weeks_count: 2,
            assignment_count: 1,
            exam_count: 1,
        };
        let response = server.post("/instructor/create_course").json(&payload).await;
        assert_eq!(response.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}

#[tokio::test]
async fn test_create_course_rejects_negative_counts() {
    let (server, _pool) = setup_test_environment().await;

    let payload = CreateCoursePayload {
        title: "Negative Counts".to_string(),
        attendance_weight: 20,
        assignment_weight: 50,
        exam_weight: 30,
        weeks_count: -1,
        assignment_count: 1,
        exam_count: 1,
    };
    let response = server.post("/instructor/create_course").json(&payload).await;
    assert_eq!(response.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
}

// provision_catalog

#[tokio::test]
async fn test_provision_catalog_lays_out_all_three_blocks() {
    let (server, pool) = setup_test_environment().await;
    let course_id = create_test_course(&pool, "Provision Course", (20, 50, 30), (2, 2, 3)).await;
    let due = Utc::now() + Duration::days(30);

    let payload = ProvisionCatalogPayload {
        course_id,
        default_due_date: Some(due),
    };
    let response = server
        .post("/instructor/provision_catalog")
        .json(&payload)
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let item_ids = response.json::<ApiResponse<Vec<i64>>>().data.unwrap();
    assert_eq!(item_ids.len(), 7);

    let conn = pool.get().await.unwrap();
    let rows: Vec<(String, String, i32, i32, Option<chrono::DateTime<Utc>>)> = conn
        .interact(move |conn| {
            schema::grade_items::table
                .filter(schema::grade_items::course_id.eq(course_id))
                .order(schema::grade_items::position.asc())
                .select((
                    schema::grade_items::category,
                    schema::grade_items::display_name,
                    schema::grade_items::position,
                    schema::grade_items::max_score,
                    schema::grade_items::due_date,
                ))
                .load(conn)
        })
        .await
        .unwrap()
        .unwrap();

    let names: Vec<&str> = rows.iter().map(|r| r.1.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "Week 1 Attendance",
            "Week 2 Attendance",
            "Assignment 1",
            "Assignment 2",
            "Midterm",
            "Final",
            "Quiz 1",
        ]
    );
    let positions: Vec<i32> = rows.iter().map(|r| r.2).collect();
    assert_eq!(positions, vec![1, 2, 3, 4, 5, 6, 7]);
    assert!(rows.iter().all(|r| r.3 == 100));
    // attendance items carry no deadline; the default applies to the rest
    assert!(rows.iter().take(2).all(|r| r.4.is_none()));
    assert!(rows.iter().skip(2).all(|r| r.4.is_some()));
}

#[tokio::test]
async fn test_provision_catalog_twice_is_conflict() {
    let (server, pool) = setup_test_environment().await;
    let course_id = create_test_course(&pool, "Double Provision", (20, 50, 30), (1, 1, 1)).await;

    let payload = ProvisionCatalogPayload {
        course_id,
        default_due_date: None,
    };
    let first = server
        .post("/instructor/provision_catalog")
        .json(&payload)
        .await;
    assert_eq!(first.status_code(), StatusCode::OK);

    let second = server
        .post("/instructor/provision_catalog")
        .json(&payload)
        .await;
    assert_eq!(second.status_code(), StatusCode::CONFLICT);

    let conn = pool.get().await.unwrap();
    let item_count: i64 = conn
        .interact(move |conn| {
            schema::grade_items::table
                .filter(schema::grade_items::course_id.eq(course_id))
                .count()
                .get_result(conn)
        })
        .await
        .unwrap()
        .unwrap();
    assert_eq!(item_count, 3);
}

#[tokio::test]
async fn test_provision_catalog_unknown_course_is_not_found() {
    let (server, _pool) = setup_test_environment().await;

    let payload = ProvisionCatalogPayload {
        course_id: 99999,
        default_due_date: None,
    };
    let response = server
        .post("/instructor/provision_catalog")
        .json(&payload)
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_provision_catalog_with_zero_counts_creates_nothing() {
    let (server, pool) = setup_test_environment().await;
    let course_id = create_test_course(&pool, "Zero Course", (20, 50, 30), (0, 0, 0)).await;

    let payload = ProvisionCatalogPayload {
        course_id,
        default_due_date: None,
    };
    let response = server
        .post("/instructor/provision_catalog")
        .json(&payload)
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let item_ids = response.json::<ApiResponse<Vec<i64>>>().data.unwrap();
    assert!(item_ids.is_empty());
}

// set_item_due_date

#[tokio::test]
async fn test_set_item_due_date_success_and_unknown_item() {
    let (server, pool) = setup_test_environment().await;
    let course_id = create_test_course(&pool, "DueDate Course", (20, 50, 30), (0, 1, 0)).await;
    let item_id =
        create_test_grade_item(&pool, course_id, "assignment", "Assignment 1", 1, None).await;

    let payload = SetItemDueDatePayload {
        item_id,
        due_date: Some(Utc::now() + Duration::days(10)),
    };
    let response = server
        .post("/instructor/set_item_due_date")
        .json(&payload)
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let payload = SetItemDueDatePayload {
        item_id: 99999,
        due_date: None,
    };
    let response = server
        .post("/instructor/set_item_due_date")
        .json(&payload)
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

// create_student

#[tokio::test]
async fn test_create_student_success_and_duplicate_email() {
    let (server, _pool) = setup_test_environment().await;

    let payload = CreateStudentPayload {
        email: "new.student@test.com".to_string(),
        display_name: "New Student".to_string(),
    };
    let response = server
        .post("/instructor/create_student")
        .json(&payload)
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert!(response.json::<ApiResponse<i64>>().data.is_some());

    let duplicate = server
        .post("/instructor/create_student")
        .json(&payload)
        .await;
    assert_eq!(duplicate.status_code(), StatusCode::CONFLICT);
}

// record_attendance

#[tokio::test]
async fn test_record_attendance_scores_week_item() {
    let (server, pool) = setup_test_environment().await;
    let student_id = create_test_student(&pool, 201, "att@test.com", "Attendance Student").await;
    let course_id = create_test_course(&pool, "Attendance Course", (100, 0, 0), (2, 0, 0)).await;
    let week1_item =
        create_test_grade_item(&pool, course_id, "attendance", "Week 1 Attendance", 1, None).await;
    create_test_grade_item(&pool, course_id, "attendance", "Week 2 Attendance", 2, None).await;
    let enrollment_id = create_test_enrollment(&pool, student_id, course_id).await;

    let session = Uuid::new_v4();
    let payload = RecordAttendancePayload {
        student_id,
        course_id,
        session_uuid: session,
        week: 1,
        duration_seconds: 2700,
        total_duration_seconds: 3600,
        session_date: Utc::now(),
    };
    let response = server
        .post("/instructor/record_attendance")
        .json(&payload)
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.json::<ApiResponse<bool>>().data, Some(true));

    let row = get_grade_row(&pool, enrollment_id, week1_item).await;
    assert_eq!(row.status, "graded");
    assert!(approx_eq!(f64, row.score, 75.0, ulps = 2));

    // replaying the vendor webhook for the same session is idempotent
    let replay = server
        .post("/instructor/record_attendance")
        .json(&payload)
        .await;
    assert_eq!(replay.status_code(), StatusCode::OK);
    assert_eq!(count_attendance_records(&pool, student_id, course_id).await, 1);
}

#[tokio::test]
async fn test_record_attendance_week_beyond_catalog_keeps_raw_record() {
    let (server, pool) = setup_test_environment().await;
    let student_id = create_test_student(&pool, 202, "att2@test.com", "Attendance Student 2").await;
    let course_id = create_test_course(&pool, "Short Course", (100, 0, 0), (1, 0, 0)).await;
    create_test_grade_item(&pool, course_id, "attendance", "Week 1 Attendance", 1, None).await;
    create_test_enrollment(&pool, student_id, course_id).await;

    let payload = RecordAttendancePayload {
        student_id,
        course_id,
        session_uuid: Uuid::new_v4(),
        week: 5,
        duration_seconds: 3600,
        total_duration_seconds: 3600,
        session_date: Utc::now(),
    };
    let response = server
        .post("/instructor/record_attendance")
        .json(&payload)
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.json::<ApiResponse<bool>>().data, Some(false));
    assert_eq!(count_attendance_records(&pool, student_id, course_id).await, 1);
}

#[tokio::test]
async fn test_record_attendance_without_enrollment_is_forbidden() {
    let (server, pool) = setup_test_environment().await;
    let student_id = create_test_student(&pool, 203, "att3@test.com", "Attendance Student 3").await;
    let course_id = create_test_course(&pool, "Closed Course", (100, 0, 0), (1, 0, 0)).await;

    let payload = RecordAttendancePayload {
        student_id,
        course_id,
        session_uuid: Uuid::new_v4(),
        week: 1,
        duration_seconds: 3600,
        total_duration_seconds: 3600,
        session_date: Utc::now(),
    };
    let response = server
        .post("/instructor/record_attendance")
        .json(&payload)
        .await;
    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
}

// grade_submission

#[tokio::test]
async fn test_grade_submission_boundary_scores() {
    let (server, pool) = setup_test_environment().await;
    let student_id = create_test_student(&pool, 204, "bounds@test.com", "Bounds Student").await;
    let course_id = create_test_course(&pool, "Bounds Course", (0, 100, 0), (0, 2, 0)).await;
    let item1 =
        create_test_grade_item(&pool, course_id, "assignment", "Assignment 1", 1, None).await;
    let item2 =
        create_test_grade_item(&pool, course_id, "assignment", "Assignment 2", 2, None).await;
    let enrollment_id = create_test_enrollment(&pool, student_id, course_id).await;

    for (item_id, score) in [(item1, 0.0), (item2, 100.0)] {
        let payload = GradeSubmissionPayload {
            student_id,
            item_id,
            score,
            feedback: None,
        };
        let response = server
            .post("/instructor/grade_submission")
            .json(&payload)
            .await;
        assert_eq!(response.status_code(), StatusCode::OK);

        let row = get_grade_row(&pool, enrollment_id, item_id).await;
        assert_eq!(row.status, "graded");
        assert!(approx_eq!(f64, row.score, score, ulps = 2));
        assert!(row.graded_at.is_some());
    }
}

#[tokio::test]
async fn test_grade_submission_rejects_out_of_range_scores() {
    let (server, pool) = setup_test_environment().await;
    let student_id = create_test_student(&pool, 205, "range@test.com", "Range Student").await;
    let course_id = create_test_course(&pool, "Range Course", (0, 100, 0), (0, 1, 0)).await;
    let item_id =
        create_test_grade_item(&pool, course_id, "assignment", "Assignment 1", 1, None).await;
    let enrollment_id = create_test_enrollment(&pool, student_id, course_id).await;

    for score in [101.0, -1.0] {
        let payload = GradeSubmissionPayload {
            student_id,
            item_id,
            score,
            feedback: None,
        };
        let response = server
            .post("/instructor/grade_submission")
            .json(&payload)
            .await;
        assert_eq!(response.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    let row = get_grade_row(&pool, enrollment_id, item_id).await;
    assert_eq!(row.status, "not_submitted");
}

#[tokio::test]
async fn test_grade_submission_stores_feedback_and_refreshes_final_grade() {
    let (server, pool) = setup_test_environment().await;
    let student_id = create_test_student(&pool, 206, "fb@test.com", "Feedback Student").await;
    let course_id = create_test_course(&pool, "Feedback Course", (0, 100, 0), (0, 1, 0)).await;
    let item_id =
        create_test_grade_item(&pool, course_id, "assignment", "Assignment 1", 1, None).await;
    let enrollment_id = create_test_enrollment(&pool, student_id, course_id).await;

    let payload = GradeSubmissionPayload {
        student_id,
        item_id,
        score: 88.0,
        feedback: Some("Well argued".to_string()),
    };
    let response = server
        .post("/instructor/grade_submission")
        .json(&payload)
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let graded = response
        .json::<ApiResponse<GradeSubmissionResponse>>()
        .data
        .unwrap();
    assert!(graded.final_grade_refreshed);
    assert_eq!(graded.status, "graded");

    let row = get_grade_row(&pool, enrollment_id, item_id).await;
    assert_eq!(row.feedback.as_deref(), Some("Well argued"));

    // the denormalized snapshot caught up with the grading event
    let final_grade = get_enrollment_final_grade(&pool, enrollment_id).await;
    assert!(approx_eq!(f64, final_grade.unwrap(), 88.0, ulps = 2));
    let (weighted_total, _) = get_summary_totals(&pool, enrollment_id).await.unwrap();
    assert!(approx_eq!(f64, weighted_total, 88.0, ulps = 2));
}

#[tokio::test]
async fn test_grade_submission_unknown_item_is_not_found() {
    let (server, _pool) = setup_test_environment().await;

    let payload = GradeSubmissionPayload {
        student_id: 1,
        item_id: 99999,
        score: 50.0,
        feedback: None,
    };
    let response = server
        .post("/instructor/grade_submission")
        .json(&payload)
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_grade_submission_without_enrollment_is_forbidden() {
    let (server, pool) = setup_test_environment().await;
    let student_id = create_test_student(&pool, 207, "noone@test.com", "NoOne Student").await;
    let course_id = create_test_course(&pool, "NoOne Course", (0, 100, 0), (0, 1, 0)).await;
    let item_id =
        create_test_grade_item(&pool, course_id, "assignment", "Assignment 1", 1, None).await;

    let payload = GradeSubmissionPayload {
        student_id,
        item_id,
        score: 50.0,
        feedback: None,
    };
    let response = server
        .post("/instructor/grade_submission")
        .json(&payload)
        .await;
    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
}

// recalculate_final_grade

#[tokio::test]
async fn test_recalculation_is_idempotent() {
    let (server, pool) = setup_test_environment().await;
    let student_id = create_test_student(&pool, 208, "idem@test.com", "Idem Student").await;
    let course_id = create_test_course(&pool, "Idem Course", (20, 50, 30), (2, 1, 1)).await;
    let assignment_item =
        create_test_grade_item(&pool, course_id, "assignment", "Assignment 1", 3, None).await;
    create_test_grade_item(&pool, course_id, "attendance", "Week 1 Attendance", 1, None).await;
    create_test_grade_item(&pool, course_id, "attendance", "Week 2 Attendance", 2, None).await;
    create_test_grade_item(&pool, course_id, "exam", "Midterm", 4, None).await;
    let enrollment_id = create_test_enrollment(&pool, student_id, course_id).await;

    let grade_payload = GradeSubmissionPayload {
        student_id,
        item_id: assignment_item,
        score: 80.0,
        feedback: None,
    };
    let graded = server
        .post("/instructor/grade_submission")
        .json(&grade_payload)
        .await;
    assert_eq!(graded.status_code(), StatusCode::OK);

    let recalc_payload = RecalculateFinalGradePayload {
        student_id,
        course_id,
    };
    let first = server
        .post("/instructor/recalculate_final_grade")
        .json(&recalc_payload)
        .await;
    assert_eq!(first.status_code(), StatusCode::OK);
    let first = first
        .json::<ApiResponse<RecalculationResponse>>()
        .data
        .unwrap();

    let second = server
        .post("/instructor/recalculate_final_grade")
        .json(&recalc_payload)
        .await;
    assert_eq!(second.status_code(), StatusCode::OK);
    let second = second
        .json::<ApiResponse<RecalculationResponse>>()
        .data
        .unwrap();

    assert_eq!(first.enrollment_id, enrollment_id);
    assert!(first.summary_refreshed);
    assert!(second.summary_refreshed);
    assert!(approx_eq!(
        f64,
        first.weighted_total,
        second.weighted_total,
        ulps = 2
    ));
    assert!(approx_eq!(
        f64,
        first.progress_percentage,
        second.progress_percentage,
        ulps = 2
    ));
    assert!(approx_eq!(f64, first.weighted_total, 40.0, ulps = 2));
}

#[tokio::test]
async fn test_recalculation_unknown_enrollment_is_not_found() {
    let (server, pool) = setup_test_environment().await;
    let student_id = create_test_student(&pool, 209, "norec@test.com", "NoRec Student").await;
    let course_id = create_test_course(&pool, "NoRec Course", (20, 50, 30), (1, 1, 1)).await;

    let payload = RecalculateFinalGradePayload {
        student_id,
        course_id,
    };
    let response = server
        .post("/instructor/recalculate_final_grade")
        .json(&payload)
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

// get_student_grade_report

#[tokio::test]
async fn test_grade_report_partial_course_scenario() {
    // Weights (20, 50, 30), two weeks, one assignment, one exam. One of
    // two sessions attended in full, assignment graded 80, exam never
    // sat: weighted total 50.0, progress 45%.
    let (server, pool) = setup_test_environment().await;
    let student_id = create_test_student(&pool, 210, "scenario@test.com", "Scenario Student").await;
    let course_id = create_test_course(&pool, "Scenario Course", (20, 50, 30), (2, 1, 1)).await;
    create_test_grade_item(&pool, course_id, "attendance", "Week 1 Attendance", 1, None).await;
    create_test_grade_item(&pool, course_id, "attendance", "Week 2 Attendance", 2, None).await;
    let assignment_item =
        create_test_grade_item(&pool, course_id, "assignment", "Assignment 1", 3, None).await;
    create_test_grade_item(&pool, course_id, "exam", "Midterm", 4, None).await;
    create_test_enrollment(&pool, student_id, course_id).await;

    // the vendor reports both scheduled sessions, one attended in full and
    // one missed outright
    for (week, duration) in [(1, 3600), (2, 0)] {
        let payload = RecordAttendancePayload {
            student_id,
            course_id,
            session_uuid: Uuid::new_v4(),
            week,
            duration_seconds: duration,
            total_duration_seconds: 3600,
            session_date: Utc::now(),
        };
        let response = server
            .post("/instructor/record_attendance")
            .json(&payload)
            .await;
        assert_eq!(response.status_code(), StatusCode::OK);
    }

    let grade_payload = GradeSubmissionPayload {
        student_id,
        item_id: assignment_item,
        score: 80.0,
        feedback: None,
    };
    let graded = server
        .post("/instructor/grade_submission")
        .json(&grade_payload)
        .await;
    assert_eq!(graded.status_code(), StatusCode::OK);

    let response = server
        .get(&format!(
            "/instructor/get_student_grade_report?student_id={}&course_id={}",
            student_id, course_id
        ))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let report = response
        .json::<ApiResponse<GradeReportResponse>>()
        .data
        .unwrap();

    assert!(approx_eq!(f64, report.attendance_rate, 50.0, ulps = 2));
    assert!(approx_eq!(f64, report.assignment_avg, 80.0, ulps = 2));
    assert!(approx_eq!(f64, report.exam_avg, 0.0, ulps = 2));
    assert!(approx_eq!(f64, report.weighted_total, 50.0, ulps = 2));
    // 100 + 0 + 80 + 0 earned points out of 400 possible
    assert!(approx_eq!(f64, report.progress_percentage, 45.0, ulps = 2));
    assert!(approx_eq!(f64, report.completion.assignment, 100.0, ulps = 2));
    assert!(approx_eq!(f64, report.completion.exam, 0.0, ulps = 2));
}

// get_course_gradebook

#[tokio::test]
async fn test_course_gradebook_recomputes_every_active_enrollment() {
    let (server, pool) = setup_test_environment().await;
    let alice = create_test_student(&pool, 211, "alice@test.com", "Alice").await;
    let bob = create_test_student(&pool, 212, "bob@test.com", "Bob").await;
    let course_id = create_test_course(&pool, "Gradebook Course", (0, 100, 0), (0, 1, 0)).await;
    let item_id =
        create_test_grade_item(&pool, course_id, "assignment", "Assignment 1", 1, None).await;
    create_test_enrollment(&pool, alice, course_id).await;
    create_test_enrollment(&pool, bob, course_id).await;

    let grade_payload = GradeSubmissionPayload {
        student_id: alice,
        item_id,
        score: 95.0,
        feedback: None,
    };
    let graded = server
        .post("/instructor/grade_submission")
        .json(&grade_payload)
        .await;
    assert_eq!(graded.status_code(), StatusCode::OK);

    let response = server
        .get(&format!(
            "/instructor/get_course_gradebook?course_id={}",
            course_id
        ))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let gradebook = response
        .json::<ApiResponse<CourseGradebookResponse>>()
        .data
        .unwrap();

    assert_eq!(gradebook.course_id, course_id);
    assert_eq!(gradebook.rows.len(), 2);
    assert_eq!(gradebook.rows[0].student_id, alice);
    assert!(approx_eq!(f64, gradebook.rows[0].weighted_total, 95.0, ulps = 2));
    assert_eq!(gradebook.rows[1].student_id, bob);
    assert!(approx_eq!(f64, gradebook.rows[1].weighted_total, 0.0, ulps = 2));
}

#[tokio::test]
async fn test_course_gradebook_unknown_course_is_not_found() {
    let (server, _pool) = setup_test_environment().await;

    let response = server
        .get("/instructor/get_course_gradebook?course_id=99999")
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}
