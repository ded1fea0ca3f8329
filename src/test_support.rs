use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request},
    Router,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tempfile::TempDir;

use crate::api;
use crate::core::{config::Settings, redis::RedisHandle, state::AppState, time::now_utc};
use crate::db::models::{Exam, Question, Student};
use crate::services::recognition::{
    Recognition, RecognitionFailure, RecognitionRequest, Recognizer,
};
use crate::services::run_lease::LocalRunLease;
use crate::store::MemoryStore;

pub(crate) const TEACHER_ID: &str = "teacher-1";

type Hook = Box<dyn Fn() + Send + Sync>;

/// Recognizer answering from a per-paper script. Unscripted papers fail.
#[derive(Default)]
pub(crate) struct FakeRecognizer {
    script: Mutex<HashMap<String, Result<Recognition, RecognitionFailure>>>,
    hooks: Mutex<HashMap<usize, Hook>>,
    calls: Mutex<usize>,
    delay: Mutex<Option<Duration>>,
}

impl FakeRecognizer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn script(&self, paper_id: &str, result: Result<Recognition, RecognitionFailure>) {
        self.script.lock().expect("script lock").insert(paper_id.to_string(), result);
    }

    /// Runs `hook` right before answering the call with zero-based index `index`.
    pub(crate) fn on_call(&self, index: usize, hook: impl Fn() + Send + Sync + 'static) {
        self.hooks.lock().expect("hook lock").insert(index, Box::new(hook));
    }

    /// Every call sleeps for `delay` before answering.
    pub(crate) fn delay(&self, delay: Duration) {
        *self.delay.lock().expect("delay lock") = Some(delay);
    }

    pub(crate) fn calls(&self) -> usize {
        *self.calls.lock().expect("calls lock")
    }
}

#[async_trait]
impl Recognizer for FakeRecognizer {
    async fn analyze(
        &self,
        request: RecognitionRequest<'_>,
    ) -> Result<Recognition, RecognitionFailure> {
        let index = {
            let mut calls = self.calls.lock().expect("calls lock");
            *calls += 1;
            *calls - 1
        };
        if let Some(hook) = self.hooks.lock().expect("hook lock").get(&index) {
            hook();
        }

        let delay = *self.delay.lock().expect("delay lock");
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.script
            .lock()
            .expect("script lock")
            .get(request.paper_id)
            .cloned()
            .unwrap_or_else(|| Err(RecognitionFailure::Transport("unscripted paper".to_string())))
    }
}

pub(crate) fn recognition(identity: &str, scores: &[(&str, f64)]) -> Recognition {
    Recognition {
        scores: scores.iter().map(|(key, value)| (key.to_string(), *value)).collect::<BTreeMap<_, _>>(),
        identity: identity.to_string(),
        note: "scripted".to_string(),
    }
}

pub(crate) fn paper_payload(bytes: &[u8]) -> String {
    format!("data:image/jpeg;base64,{}", STANDARD.encode(bytes))
}

/// `exam-1` (questions 1:5pts Algebra, 2:10pts Geometry) and `exam-empty`
/// (no questions), both owned by [`TEACHER_ID`] for class `class-1` with
/// students `stu-1` (S1) and `stu-2` (S2). `exam-other` belongs to another teacher.
pub(crate) async fn seeded_store() -> MemoryStore {
    let store = MemoryStore::new();

    for (id, teacher) in [("exam-1", TEACHER_ID), ("exam-empty", TEACHER_ID), ("exam-other", "teacher-2")] {
        store
            .put_exam(Exam {
                id: id.to_string(),
                title: format!("Exam {id}"),
                teacher_id: teacher.to_string(),
                class_id: "class-1".to_string(),
                created_at: now_utc(),
            })
            .await;
    }

    for (id, number, points, outcome) in [("q1", 1, 5.0, "Algebra"), ("q2", 2, 10.0, "Geometry")] {
        store
            .put_question(Question {
                id: id.to_string(),
                exam_id: "exam-1".to_string(),
                number,
                points,
                outcome: Some(outcome.to_string()),
            })
            .await;
    }

    for (id, name, roster) in [("stu-1", "Ada Lovelace", "S1"), ("stu-2", "Grace Hopper", "S2")] {
        store
            .put_student(Student {
                id: id.to_string(),
                class_id: "class-1".to_string(),
                name: name.to_string(),
                roster_number: roster.to_string(),
            })
            .await;
    }

    store
}

pub(crate) fn test_settings(scratch_dir: &Path) -> Settings {
    let scratch = scratch_dir.display().to_string();
    let values: HashMap<&str, String> = HashMap::from([
        ("MARKSCAN_ENV", "test".to_string()),
        ("STORE_BACKEND", "memory".to_string()),
        ("ANALYSIS_COOLDOWN_SECONDS", "0".to_string()),
        ("RECOGNITION_RETRY_DELAY_SECONDS", "0".to_string()),
        ("SCRATCH_DIR", scratch),
        ("MAX_PAPER_BYTES", "4096".to_string()),
        ("PROMETHEUS_ENABLED", "0".to_string()),
    ]);

    Settings::from_lookup(&|key: &str| values.get(key).cloned()).expect("test settings")
}

pub(crate) struct TestContext {
    pub(crate) store: Arc<MemoryStore>,
    pub(crate) recognizer: Arc<FakeRecognizer>,
    pub(crate) app: Router,
    pub(crate) scratch: TempDir,
}

pub(crate) async fn setup_test_context() -> TestContext {
    let scratch = tempfile::tempdir().expect("scratch dir");
    let settings = test_settings(scratch.path());
    let store = Arc::new(seeded_store().await);
    let recognizer = Arc::new(FakeRecognizer::new());
    let redis = RedisHandle::new(settings.redis().redis_url());

    let state = AppState::new(
        settings,
        store.clone(),
        recognizer.clone(),
        Arc::new(LocalRunLease::new()),
        redis,
    );
    let app = api::router::router(state);

    TestContext { store, recognizer, app, scratch }
}

pub(crate) fn json_request(
    method: Method,
    uri: &str,
    teacher_id: Option<&str>,
    body: Option<serde_json::Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);

    if let Some(teacher_id) = teacher_id {
        builder = builder.header("x-teacher-id", teacher_id);
    }

    if let Some(body) = body {
        let bytes = serde_json::to_vec(&body).expect("serialize body");
        builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(bytes))
            .expect("request body")
    } else {
        builder.body(Body::empty()).expect("request body")
    }
}

/// Single-field multipart upload as sent by a browser form.
pub(crate) fn multipart_request(
    uri: &str,
    teacher_id: &str,
    field: &str,
    filename: &str,
    content_type: &str,
    bytes: &[u8],
) -> Request<Body> {
    let boundary = "markscan-test-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n\
             Content-Type: {content_type}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("x-teacher-id", teacher_id)
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={boundary}"))
        .body(Body::from(body))
        .expect("multipart request")
}

pub(crate) async fn read_json(response: axum::response::Response<Body>) -> serde_json::Value {
    let body = to_bytes(response.into_body(), usize::MAX).await.expect("response body");
    serde_json::from_slice(&body).unwrap_or_else(|err| {
        let body_text = String::from_utf8_lossy(&body);
        panic!("json parse: {err}; body: {body_text}");
    })
}
