use axum::http::{Method, StatusCode};
use serde_json::json;
use tower::ServiceExt;

use crate::store::GradingStore;
use crate::test_support::{self, recognition, TEACHER_ID};

const JPEG_BYTES: &[u8] = b"\xff\xd8\xff\xe0 fake jpeg page";

async fn upload_paper(ctx: &test_support::TestContext, student_id: &str) -> String {
    let response = ctx
        .app
        .clone()
        .oneshot(test_support::multipart_request(
            &format!("/api/v1/exams/exam-1/students/{student_id}/papers"),
            TEACHER_ID,
            "paper",
            "page1.jpg",
            "image/jpeg",
            JPEG_BYTES,
        ))
        .await
        .expect("upload paper");

    assert_eq!(response.status(), StatusCode::CREATED);
    let json = test_support::read_json(response).await;
    assert_eq!(json["student_id"], student_id);
    json["id"].as_str().expect("paper id").to_string()
}

#[tokio::test]
async fn upload_analyze_and_report_round_trip() {
    let ctx = test_support::setup_test_context().await;
    let paper_id = upload_paper(&ctx, "stu-1").await;
    ctx.recognizer.script(&paper_id, Ok(recognition("S1", &[("1", 7.0), ("2", 9.0)])));

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            "/api/v1/exams/exam-1/analysis",
            Some(TEACHER_ID),
            Some(json!({ "student_ids": ["stu-1"] })),
        ))
        .await
        .expect("run analysis");

    assert_eq!(response.status(), StatusCode::OK);
    let summary = test_support::read_json(response).await;
    assert_eq!(summary["scores_saved"], 2);
    assert_eq!(summary["papers_accepted"], 1);

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::GET,
            "/api/v1/exams/exam-1/scores",
            Some(TEACHER_ID),
            None,
        ))
        .await
        .expect("list scores");
    assert_eq!(response.status(), StatusCode::OK);
    let scores = test_support::read_json(response).await;
    assert_eq!(scores, json!({ "stu-1_q1": 5.0, "stu-1_q2": 9.0 }));

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::GET,
            "/api/v1/exams/exam-1/report",
            Some(TEACHER_ID),
            None,
        ))
        .await
        .expect("report");
    assert_eq!(response.status(), StatusCode::OK);
    let report = test_support::read_json(response).await;
    assert_eq!(report["perStudent"][0]["total"], 14.0);
    assert_eq!(report["perStudent"][0]["status"], "pass");
    assert_eq!(report["perStudent"][1]["status"], "not_taken");
    assert_eq!(report["stats"]["participatingStudents"], 1);
    assert_eq!(report["stats"]["maxTotal"], 15.0);
}

#[tokio::test]
async fn analysis_finishes_after_client_disconnects() {
    let ctx = test_support::setup_test_context().await;
    let paper_id = upload_paper(&ctx, "stu-1").await;
    ctx.recognizer.script(&paper_id, Ok(recognition("S1", &[("1", 4.0), ("2", 6.0)])));
    ctx.recognizer.delay(std::time::Duration::from_millis(300));

    let disconnected = tokio::time::timeout(
        std::time::Duration::from_millis(50),
        ctx.app.clone().oneshot(test_support::json_request(
            Method::POST,
            "/api/v1/exams/exam-1/analysis",
            Some(TEACHER_ID),
            Some(json!({})),
        )),
    )
    .await;
    assert!(disconnected.is_err(), "request should still be running");

    tokio::time::sleep(std::time::Duration::from_millis(800)).await;
    assert_eq!(ctx.store.scores_for_exam("exam-1").await.expect("scores").len(), 2);

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            "/api/v1/exams/exam-1/analysis",
            Some(TEACHER_ID),
            Some(json!({ "student_ids": ["stu-1"] })),
        ))
        .await
        .expect("second run");
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn analysis_with_nothing_usable_returns_summary() {
    let ctx = test_support::setup_test_context().await;
    let paper_id = upload_paper(&ctx, "stu-1").await;
    ctx.recognizer.script(&paper_id, Ok(recognition("S2", &[("1", 3.0)])));

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            "/api/v1/exams/exam-1/analysis",
            Some(TEACHER_ID),
            Some(json!({ "student_ids": ["stu-1"] })),
        ))
        .await
        .expect("run analysis");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let json = test_support::read_json(response).await;
    assert_eq!(json["status"], 422);
    assert_eq!(json["summary"]["papers_discarded"], 1);
    assert_eq!(json["summary"]["diagnostics"][0]["kind"], "identity_mismatch");
    assert!(ctx.store.scores_for_exam("exam-1").await.expect("scores").is_empty());
}

#[tokio::test]
async fn analysis_requires_questions_and_ownership() {
    let ctx = test_support::setup_test_context().await;

    let cases = [
        ("exam-empty", Some(TEACHER_ID), StatusCode::BAD_REQUEST),
        ("exam-other", Some(TEACHER_ID), StatusCode::FORBIDDEN),
        ("missing", Some(TEACHER_ID), StatusCode::NOT_FOUND),
        ("exam-1", None, StatusCode::UNAUTHORIZED),
    ];

    for (exam_id, teacher, expected) in cases {
        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::POST,
                &format!("/api/v1/exams/{exam_id}/analysis"),
                teacher,
                Some(json!({})),
            ))
            .await
            .expect("run analysis");
        assert_eq!(response.status(), expected, "exam {exam_id}");
    }
    assert_eq!(ctx.recognizer.calls(), 0);
}

#[tokio::test]
async fn empty_student_selection_is_rejected() {
    let ctx = test_support::setup_test_context().await;

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            "/api/v1/exams/exam-1/analysis",
            Some(TEACHER_ID),
            Some(json!({ "student_ids": [] })),
        ))
        .await
        .expect("run analysis");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn manual_score_edits_distinguish_zero_and_null() {
    let ctx = test_support::setup_test_context().await;

    let put = |score: serde_json::Value| {
        test_support::json_request(
            Method::PUT,
            "/api/v1/exams/exam-1/scores",
            Some(TEACHER_ID),
            Some(json!({ "student_id": "stu-2", "question_id": "q2", "score": score })),
        )
    };

    let response = ctx.app.clone().oneshot(put(json!(0))).await.expect("save zero");
    assert_eq!(response.status(), StatusCode::OK);
    let json = test_support::read_json(response).await;
    assert_eq!(json["status"], "saved");
    assert_eq!(json["score"], 0.0);

    let stored = ctx.store.scores_for_exam("exam-1").await.expect("scores");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].score, 0.0);
    assert_eq!(stored[0].id, "exam-1_stu-2_q2");

    let response = ctx.app.clone().oneshot(put(json!(null))).await.expect("remove");
    assert_eq!(test_support::read_json(response).await["status"], "removed");
    assert!(ctx.store.scores_for_exam("exam-1").await.expect("scores").is_empty());

    let response = ctx.app.clone().oneshot(put(json!(null))).await.expect("remove again");
    assert_eq!(test_support::read_json(response).await["status"], "absent");

    let response = ctx.app.clone().oneshot(put(json!(11))).await.expect("over max");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn score_update_without_score_field_is_rejected() {
    let ctx = test_support::setup_test_context().await;

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::PUT,
            "/api/v1/exams/exam-1/scores",
            Some(TEACHER_ID),
            Some(json!({ "student_id": "stu-1", "question_id": "q1" })),
        ))
        .await
        .expect("update score");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(ctx.store.scores_for_exam("exam-1").await.expect("scores").is_empty());
}

#[tokio::test]
async fn clearing_one_student_keeps_the_others() {
    let ctx = test_support::setup_test_context().await;

    for (student, question, score) in [("stu-1", "q1", 4), ("stu-1", "q2", 8), ("stu-2", "q1", 2)] {
        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::PUT,
                "/api/v1/exams/exam-1/scores",
                Some(TEACHER_ID),
                Some(json!({ "student_id": student, "question_id": question, "score": score })),
            ))
            .await
            .expect("seed score");
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::DELETE,
            "/api/v1/exams/exam-1/students/stu-1/scores",
            Some(TEACHER_ID),
            None,
        ))
        .await
        .expect("clear scores");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(test_support::read_json(response).await["removed"], 2);

    let remaining = ctx.store.scores_for_exam("exam-1").await.expect("scores");
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].student_id, "stu-2");
}

#[tokio::test]
async fn upload_rejects_bad_files() {
    let ctx = test_support::setup_test_context().await;

    let cases = [
        ("paper", "notes.pdf", "application/pdf", JPEG_BYTES.to_vec(), StatusCode::BAD_REQUEST),
        ("paper", "page.png", "image/jpeg", JPEG_BYTES.to_vec(), StatusCode::BAD_REQUEST),
        ("paper", "page.jpg", "image/jpeg", Vec::new(), StatusCode::BAD_REQUEST),
        ("paper", "page.jpg", "image/jpeg", vec![0u8; 5000], StatusCode::PAYLOAD_TOO_LARGE),
        ("other", "page.jpg", "image/jpeg", JPEG_BYTES.to_vec(), StatusCode::BAD_REQUEST),
    ];

    for (field, filename, content_type, bytes, expected) in cases {
        let response = ctx
            .app
            .clone()
            .oneshot(test_support::multipart_request(
                "/api/v1/exams/exam-1/students/stu-1/papers",
                TEACHER_ID,
                field,
                filename,
                content_type,
                &bytes,
            ))
            .await
            .expect("upload");
        assert_eq!(response.status(), expected, "{field} {filename}");
    }

    let papers = ctx.store.papers_for_student("exam-1", "stu-1").await.expect("papers");
    assert!(papers.is_empty());
}

#[tokio::test]
async fn upload_requires_roster_student() {
    let ctx = test_support::setup_test_context().await;

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::multipart_request(
            "/api/v1/exams/exam-1/students/stranger/papers",
            TEACHER_ID,
            "paper",
            "page.jpg",
            "image/jpeg",
            JPEG_BYTES,
        ))
        .await
        .expect("upload");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn deleting_a_paper_keeps_its_scores() {
    let ctx = test_support::setup_test_context().await;
    let paper_id = upload_paper(&ctx, "stu-1").await;
    ctx.recognizer.script(&paper_id, Ok(recognition("S1", &[("1", 3.0)])));

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            "/api/v1/exams/exam-1/analysis",
            Some(TEACHER_ID),
            Some(json!({})),
        ))
        .await
        .expect("run analysis");
    assert_eq!(response.status(), StatusCode::OK);

    let delete = || {
        test_support::json_request(
            Method::DELETE,
            &format!("/api/v1/exams/exam-1/papers/{paper_id}"),
            Some(TEACHER_ID),
            None,
        )
    };

    let response = ctx.app.clone().oneshot(delete()).await.expect("delete paper");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = ctx.app.clone().oneshot(delete()).await.expect("delete again");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    assert!(ctx.store.papers_for_student("exam-1", "stu-1").await.expect("papers").is_empty());
    assert_eq!(ctx.store.scores_for_exam("exam-1").await.expect("scores").len(), 1);
}

#[tokio::test]
async fn deleting_an_exam_cascades() {
    let ctx = test_support::setup_test_context().await;
    upload_paper(&ctx, "stu-2").await;

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::DELETE,
            "/api/v1/exams/exam-other",
            Some(TEACHER_ID),
            None,
        ))
        .await
        .expect("delete foreign exam");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::DELETE,
            "/api/v1/exams/exam-1",
            Some(TEACHER_ID),
            None,
        ))
        .await
        .expect("delete exam");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    assert!(ctx.store.exam("exam-1").await.expect("exam").is_none());
    assert!(ctx.store.questions_for_exam("exam-1").await.expect("questions").is_empty());
    assert!(ctx.store.papers_for_student("exam-1", "stu-2").await.expect("papers").is_empty());
}

#[tokio::test]
async fn report_for_exam_without_questions_is_rejected() {
    let ctx = test_support::setup_test_context().await;

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::GET,
            "/api/v1/exams/exam-empty/report",
            Some(TEACHER_ID),
            None,
        ))
        .await
        .expect("report");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
