//! Supabase attempt recorder.
//!
//! Talks to PostgREST directly: attempts live in `quiz_attempts`, answers in
//! `question_responses`, and each step is mirrored to the user activity log
//! through the `log_user_activity` RPC.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Method, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::instrument;
use uuid::Uuid;

use secquiz_core::error::RecorderError;
use secquiz_core::model::{
    ActivityKind, AttemptId, AttemptResult, AttemptSummary, QuestionRecord, StoredResponse,
};
use secquiz_core::scoring::PassPolicy;
use secquiz_core::traits::{
    AnswerRequest, AttemptRecorder, CompleteRequest, SkipRequest, StartAttemptRequest,
};

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const ATTEMPTS: &str = "quiz_attempts";
const RESPONSES: &str = "question_responses";

/// Supabase (PostgREST) recorder.
pub struct SupabaseRecorder {
    base_url: String,
    api_key: String,
    access_token: Option<String>,
    policy: PassPolicy,
    client: reqwest::Client,
}

impl SupabaseRecorder {
    pub fn new(
        base_url: &str,
        api_key: &str,
        access_token: Option<String>,
        pass_threshold: u32,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .expect("failed to build HTTP client");

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            access_token,
            policy: PassPolicy::new(pass_threshold),
            client,
        }
    }

    fn url(&self, path: &str, query: &[(&str, String)]) -> Result<Url, RecorderError> {
        let mut url = Url::parse(&format!("{}/rest/v1/{path}", self.base_url))
            .map_err(|e| RecorderError::Unavailable(format!("invalid Supabase URL: {e}")))?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let bearer = self.access_token.as_deref().unwrap_or(&self.api_key);
        self.client
            .request(method, url)
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {bearer}"))
            .header("Prefer", "return=representation")
    }

    async fn execute(&self, builder: RequestBuilder) -> Result<reqwest::Response, RecorderError> {
        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                RecorderError::Timeout(DEFAULT_TIMEOUT_SECS)
            } else {
                RecorderError::Unavailable(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        if status == 404 {
            let body = response.text().await.unwrap_or_default();
            return Err(RecorderError::NotFound(body));
        }
        if status >= 400 {
            let body = response.text().await.unwrap_or_default();
            return Err(RecorderError::Rejected {
                status,
                message: body,
            });
        }
        Ok(response)
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, RecorderError> {
        self.execute(builder)
            .await?
            .json()
            .await
            .map_err(|e| RecorderError::InvalidResponse(format!("failed to parse response: {e}")))
    }

    /// Insert one row and return it as stored.
    async fn insert<B: Serialize, T: DeserializeOwned>(
        &self,
        table: &str,
        body: &B,
    ) -> Result<T, RecorderError> {
        let url = self.url(table, &[])?;
        let rows: Vec<T> = self.send(self.request(Method::POST, url).json(body)).await?;
        rows.into_iter().next().ok_or_else(|| {
            RecorderError::InvalidResponse(format!("insert into {table} returned no row"))
        })
    }

    /// Owner of an attempt, for the activity log. Failures are logged only.
    async fn attempt_owner(&self, attempt_id: AttemptId) -> Option<String> {
        let lookup = async {
            let url = self.url(
                ATTEMPTS,
                &[
                    ("id", format!("eq.{attempt_id}")),
                    ("select", "user_id".into()),
                ],
            )?;
            let rows: Vec<OwnerRow> = self.send(self.request(Method::GET, url)).await?;
            Ok::<_, RecorderError>(rows.into_iter().next().map(|r| r.user_id))
        };
        match lookup.await {
            Ok(owner) => owner,
            Err(e) => {
                tracing::warn!(attempt = %attempt_id, "could not look up attempt owner: {e}");
                None
            }
        }
    }

    /// Write to the user activity log. Failures never fail the caller.
    async fn log_activity(
        &self,
        user_id: &str,
        kind: ActivityKind,
        mut details: serde_json::Value,
    ) {
        if let Some(map) = details.as_object_mut() {
            map.insert("timestamp".into(), json!(Utc::now()));
        }
        let body = json!({
            "p_user_id": user_id,
            "p_activity_type": kind.as_str(),
            "p_details": details,
        });
        let result = async {
            let url = self.url("rpc/log_user_activity", &[])?;
            self.execute(self.request(Method::POST, url).json(&body))
                .await
                .map(|_| ())
        };
        if let Err(e) = result.await {
            tracing::warn!(user = user_id, activity = kind.as_str(), "activity log failed: {e}");
        }
    }
}

#[derive(Serialize)]
struct NewAttemptRow<'a> {
    id: Uuid,
    user_id: &'a str,
    started_at: DateTime<Utc>,
    total_questions: u32,
    questions_data: Vec<&'a QuestionRecord>,
}

#[derive(Debug, Deserialize)]
struct AttemptRow {
    id: Uuid,
    user_id: String,
    started_at: DateTime<Utc>,
    #[serde(default)]
    completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    score: Option<u32>,
    #[serde(default)]
    total_questions: u32,
    #[serde(default)]
    passed: Option<bool>,
    #[serde(default)]
    time_taken: Option<u32>,
}

impl From<AttemptRow> for AttemptSummary {
    fn from(row: AttemptRow) -> Self {
        AttemptSummary {
            attempt_id: row.id,
            user_id: row.user_id,
            started_at: row.started_at,
            completed_at: row.completed_at,
            score: row.score.unwrap_or(0),
            total_questions: row.total_questions,
            passed: row.passed.unwrap_or(false),
            total_time_seconds: row.time_taken,
        }
    }
}

#[derive(Serialize)]
struct NewResponseRow<'a> {
    attempt_id: Uuid,
    question_id: u32,
    question_text: &'a str,
    user_answer: Option<&'a str>,
    correct_answer: &'a str,
    is_correct: bool,
    time_taken: u32,
}

#[derive(Debug, Deserialize)]
struct ResponseRow {
    attempt_id: Uuid,
    question_id: u32,
    question_text: String,
    #[serde(default)]
    user_answer: Option<String>,
    correct_answer: String,
    is_correct: bool,
    #[serde(default)]
    time_taken: Option<u32>,
    answered_at: DateTime<Utc>,
}

impl From<ResponseRow> for StoredResponse {
    fn from(row: ResponseRow) -> Self {
        StoredResponse {
            attempt_id: row.attempt_id,
            question_id: row.question_id,
            question_text: row.question_text,
            submitted_option: row.user_answer,
            correct_option: row.correct_answer,
            is_correct: row.is_correct,
            response_time_seconds: row.time_taken,
            answered_at: row.answered_at,
        }
    }
}

#[derive(Deserialize)]
struct OwnerRow {
    user_id: String,
}

#[derive(Deserialize)]
struct CorrectRow {
    is_correct: bool,
}

#[async_trait]
impl AttemptRecorder for SupabaseRecorder {
    fn name(&self) -> &str {
        "supabase"
    }

    #[instrument(skip(self, request), fields(attempt = %request.attempt_id))]
    async fn start_attempt(&self, request: &StartAttemptRequest) -> anyhow::Result<AttemptId> {
        let body = NewAttemptRow {
            id: request.attempt_id,
            user_id: &request.user_id,
            started_at: request.started_at,
            total_questions: request.questions.len() as u32,
            questions_data: request.questions.iter().map(|q| q.as_ref()).collect(),
        };
        let row: AttemptRow = self.insert(ATTEMPTS, &body).await?;

        self.log_activity(
            &request.user_id,
            ActivityKind::QuizStart,
            json!({
                "attempt_id": row.id,
                "total_questions": request.questions.len(),
            }),
        )
        .await;
        Ok(row.id)
    }

    #[instrument(
        skip(self, request),
        fields(attempt = %request.attempt_id, question = request.question_id)
    )]
    async fn record_answer(&self, request: &AnswerRequest) -> anyhow::Result<()> {
        let is_correct = request.is_correct();
        let body = NewResponseRow {
            attempt_id: request.attempt_id,
            question_id: request.question_id,
            question_text: &request.question_text,
            user_answer: Some(&request.submitted_option),
            correct_answer: &request.correct_option,
            is_correct,
            time_taken: request.response_time_seconds,
        };
        let _: ResponseRow = self.insert(RESPONSES, &body).await?;

        if let Some(user_id) = self.attempt_owner(request.attempt_id).await {
            self.log_activity(
                &user_id,
                ActivityKind::QuestionAnswer,
                json!({
                    "attempt_id": request.attempt_id,
                    "question_id": request.question_id,
                    "is_correct": is_correct,
                    "time_taken": request.response_time_seconds,
                }),
            )
            .await;
        }
        Ok(())
    }

    #[instrument(
        skip(self, request),
        fields(attempt = %request.attempt_id, question = request.question_id)
    )]
    async fn record_skip(&self, request: &SkipRequest) -> anyhow::Result<()> {
        let body = NewResponseRow {
            attempt_id: request.attempt_id,
            question_id: request.question_id,
            question_text: &request.question_text,
            user_answer: None,
            correct_answer: &request.correct_option,
            is_correct: false,
            time_taken: request.response_time_seconds,
        };
        let _: ResponseRow = self.insert(RESPONSES, &body).await?;

        if let Some(user_id) = self.attempt_owner(request.attempt_id).await {
            self.log_activity(
                &user_id,
                ActivityKind::QuestionSkip,
                json!({
                    "attempt_id": request.attempt_id,
                    "question_id": request.question_id,
                    "outcome": request.outcome,
                }),
            )
            .await;
        }
        Ok(())
    }

    #[instrument(skip(self, request), fields(attempt = %request.attempt_id))]
    async fn complete_attempt(&self, request: &CompleteRequest) -> anyhow::Result<AttemptResult> {
        let url = self.url(
            RESPONSES,
            &[
                ("attempt_id", format!("eq.{}", request.attempt_id)),
                ("select", "is_correct".into()),
            ],
        )?;
        let responses: Vec<CorrectRow> = self.send(self.request(Method::GET, url)).await?;
        let score = responses.iter().filter(|r| r.is_correct).count() as u32;
        let passed = self.policy.passed(score);

        let url = self.url(ATTEMPTS, &[("id", format!("eq.{}", request.attempt_id))])?;
        let body = json!({
            "completed_at": Utc::now(),
            "score": score,
            "passed": passed,
            "time_taken": request.total_time_seconds,
        });
        let rows: Vec<AttemptRow> = self
            .send(self.request(Method::PATCH, url).json(&body))
            .await?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| RecorderError::NotFound(request.attempt_id.to_string()))?;

        self.log_activity(
            &row.user_id,
            ActivityKind::QuizComplete,
            json!({
                "attempt_id": request.attempt_id,
                "score": score,
                "total_questions": row.total_questions,
                "passed": passed,
                "time_taken": request.total_time_seconds,
            }),
        )
        .await;

        tracing::debug!(score, passed, "attempt completed in store");
        Ok(AttemptResult { score, passed })
    }

    #[instrument(skip(self))]
    async fn list_attempts(&self, user_id: Option<&str>) -> anyhow::Result<Vec<AttemptSummary>> {
        let mut query = vec![
            ("select", "*".to_string()),
            ("order", "created_at.desc".to_string()),
        ];
        if let Some(user) = user_id {
            query.push(("user_id", format!("eq.{user}")));
        }
        let url = self.url(ATTEMPTS, &query)?;
        let rows: Vec<AttemptRow> = self.send(self.request(Method::GET, url)).await?;
        Ok(rows.into_iter().map(AttemptSummary::from).collect())
    }

    #[instrument(skip(self))]
    async fn attempt_responses(
        &self,
        attempt_id: AttemptId,
    ) -> anyhow::Result<Vec<StoredResponse>> {
        let url = self.url(
            RESPONSES,
            &[
                ("attempt_id", format!("eq.{attempt_id}")),
                ("select", "*".into()),
                ("order", "question_id.asc".into()),
            ],
        )?;
        let rows: Vec<ResponseRow> = self.send(self.request(Method::GET, url)).await?;
        Ok(rows.into_iter().map(StoredResponse::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use secquiz_core::model::OutcomeKind;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn recorder(server: &MockServer) -> SupabaseRecorder {
        SupabaseRecorder::new(&server.uri(), "anon-key", None, 14)
    }

    fn attempt_row(id: Uuid, completed: bool) -> serde_json::Value {
        let (completed_at, score, time_taken) = if completed {
            (json!("2025-03-01T10:06:00+00:00"), 14, json!(360))
        } else {
            (json!(null), 0, json!(null))
        };
        json!({
            "id": id,
            "user_id": "alice",
            "started_at": "2025-03-01T10:00:00+00:00",
            "completed_at": completed_at,
            "score": score,
            "total_questions": 15,
            "passed": completed,
            "time_taken": time_taken,
            "created_at": "2025-03-01T10:00:00+00:00"
        })
    }

    fn response_row(id: Uuid, question_id: u32, answer: Option<&str>) -> serde_json::Value {
        json!({
            "id": Uuid::new_v4(),
            "attempt_id": id,
            "question_id": question_id,
            "question_text": "What should you do?",
            "user_answer": answer,
            "correct_answer": "Report it",
            "is_correct": answer == Some("Report it"),
            "time_taken": 12,
            "answered_at": "2025-03-01T10:01:00+00:00"
        })
    }

    async fn mount_activity(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/rest/v1/rpc/log_user_activity"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!(null)))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn start_inserts_attempt_with_headers() {
        let server = MockServer::start().await;
        let id = Uuid::new_v4();

        Mock::given(method("POST"))
            .and(path("/rest/v1/quiz_attempts"))
            .and(header("apikey", "anon-key"))
            .and(header("Authorization", "Bearer anon-key"))
            .and(header("Prefer", "return=representation"))
            .and(body_partial_json(json!({
                "id": id,
                "user_id": "alice",
                "total_questions": 1
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([attempt_row(id, false)])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/rpc/log_user_activity"))
            .and(body_partial_json(json!({
                "p_user_id": "alice",
                "p_activity_type": "quiz_start"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!(null)))
            .expect(1)
            .mount(&server)
            .await;

        let request = StartAttemptRequest {
            attempt_id: id,
            user_id: "alice".into(),
            started_at: Utc::now(),
            questions: vec![Arc::new(QuestionRecord {
                id: 3,
                prompt: "What should you do?".into(),
                options: vec!["Report it".into(), "Ignore it".into()],
                correct_option: "Report it".into(),
                category: None,
                explanation: None,
            })],
        };
        let stored = recorder(&server).start_attempt(&request).await.unwrap();
        assert_eq!(stored, id);
    }

    #[tokio::test]
    async fn access_token_replaces_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/quiz_attempts"))
            .and(header("Authorization", "Bearer user-jwt"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let recorder =
            SupabaseRecorder::new(&server.uri(), "anon-key", Some("user-jwt".into()), 14);
        assert!(recorder.list_attempts(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn skip_stores_null_answer() {
        let server = MockServer::start().await;
        let id = Uuid::new_v4();
        mount_activity(&server).await;

        Mock::given(method("POST"))
            .and(path("/rest/v1/question_responses"))
            .and(body_partial_json(json!({
                "user_answer": null,
                "is_correct": false,
                "time_taken": 30
            })))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(json!([response_row(id, 4, None)])),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/quiz_attempts"))
            .and(query_param("select", "user_id"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "user_id": "alice" }])))
            .mount(&server)
            .await;

        let request = SkipRequest {
            attempt_id: id,
            question_id: 4,
            question_text: "What should you do?".into(),
            correct_option: "Report it".into(),
            outcome: OutcomeKind::Skipped,
            response_time_seconds: 30,
        };
        recorder(&server).record_skip(&request).await.unwrap();
    }

    #[tokio::test]
    async fn activity_log_failure_does_not_fail_answer() {
        let server = MockServer::start().await;
        let id = Uuid::new_v4();

        Mock::given(method("POST"))
            .and(path("/rest/v1/question_responses"))
            .respond_with(
                ResponseTemplate::new(201)
                    .set_body_json(json!([response_row(id, 2, Some("Report it"))])),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/quiz_attempts"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "user_id": "alice" }])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/rpc/log_user_activity"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .expect(1)
            .mount(&server)
            .await;

        let request = AnswerRequest {
            attempt_id: id,
            question_id: 2,
            question_text: "What should you do?".into(),
            submitted_option: "Report it".into(),
            correct_option: "Report it".into(),
            response_time_seconds: 12,
        };
        assert!(recorder(&server).record_answer(&request).await.is_ok());
    }

    #[tokio::test]
    async fn complete_counts_correct_responses() {
        let server = MockServer::start().await;
        let id = Uuid::new_v4();
        mount_activity(&server).await;

        let mut rows = vec![json!({ "is_correct": false })];
        rows.extend((0..14).map(|_| json!({ "is_correct": true })));
        Mock::given(method("GET"))
            .and(path("/rest/v1/question_responses"))
            .and(query_param("attempt_id", format!("eq.{id}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!(rows)))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/quiz_attempts"))
            .and(query_param("id", format!("eq.{id}")))
            .and(body_partial_json(json!({ "score": 14, "passed": true, "time_taken": 360 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([attempt_row(id, true)])))
            .expect(1)
            .mount(&server)
            .await;

        let result = recorder(&server)
            .complete_attempt(&CompleteRequest {
                attempt_id: id,
                total_time_seconds: 360,
            })
            .await
            .unwrap();
        assert_eq!(result, AttemptResult { score: 14, passed: true });
    }

    #[tokio::test]
    async fn list_filters_by_user_newest_first() {
        let server = MockServer::start().await;
        let id = Uuid::new_v4();
        Mock::given(method("GET"))
            .and(path("/rest/v1/quiz_attempts"))
            .and(query_param("user_id", "eq.alice"))
            .and(query_param("order", "created_at.desc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([attempt_row(id, true)])))
            .expect(1)
            .mount(&server)
            .await;

        let attempts = recorder(&server).list_attempts(Some("alice")).await.unwrap();
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].attempt_id, id);
        assert_eq!(attempts[0].score, 14);
        assert!(attempts[0].passed);
        assert_eq!(attempts[0].total_time_seconds, Some(360));
    }

    #[tokio::test]
    async fn responses_are_mapped() {
        let server = MockServer::start().await;
        let id = Uuid::new_v4();
        Mock::given(method("GET"))
            .and(path("/rest/v1/question_responses"))
            .and(query_param("order", "question_id.asc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                response_row(id, 1, Some("Report it")),
                response_row(id, 5, None)
            ])))
            .mount(&server)
            .await;

        let responses = recorder(&server).attempt_responses(id).await.unwrap();
        assert_eq!(responses.len(), 2);
        assert!(responses[0].is_correct);
        assert_eq!(responses[1].submitted_option, None);
    }

    #[tokio::test]
    async fn error_statuses_are_classified() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/question_responses"))
            .respond_with(ResponseTemplate::new(401).set_body_string("JWT expired"))
            .mount(&server)
            .await;

        let request = AnswerRequest {
            attempt_id: Uuid::new_v4(),
            question_id: 1,
            question_text: "q".into(),
            submitted_option: "a".into(),
            correct_option: "a".into(),
            response_time_seconds: 1,
        };
        let err = recorder(&server).record_answer(&request).await.unwrap_err();
        match err.downcast_ref::<RecorderError>() {
            Some(RecorderError::Rejected { status, message }) => {
                assert_eq!(*status, 401);
                assert!(message.contains("JWT expired"));
            }
            other => panic!("expected Rejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_server_is_unavailable() {
        let recorder = SupabaseRecorder::new("http://127.0.0.1:1", "k", None, 14);
        let err = recorder.list_attempts(None).await.unwrap_err();
        let err = err.downcast_ref::<RecorderError>().unwrap();
        assert!(err.is_unavailable());
    }
}
