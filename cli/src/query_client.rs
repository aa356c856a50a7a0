use anyhow::{anyhow, Context, Result};
use coql_core::{ErrorResponse, HealthStatus, QueryRequest, QueryResponse, SubmissionOutcome};
use log::{debug, info};
use reqwest::Client;
use std::time::Duration;

/// Requests are bounded only by the server's own upstream timeouts
const REQUEST_TIMEOUT: Duration = Duration::from_secs(180);

/// HTTP client for the query server
#[derive(Debug, Clone)]
pub struct QueryClient {
    base_url: String,
    http_client: Client,
}

impl QueryClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        let base_url = base_url.trim_end_matches('/').to_string();
        info!("Using query server at {}", base_url);
        Ok(Self {
            base_url,
            http_client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Sends one `POST /query` with the text exactly as given and classifies the reply
    pub async fn submit(&self, natural_query: &str) -> SubmissionOutcome {
        let url = format!("{}/query", self.base_url);
        debug!("Submitting query to {}", url);

        let response = match self
            .http_client
            .post(&url)
            .json(&QueryRequest::new(natural_query))
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return SubmissionOutcome::Failed(format!("Request failed: {}", e)),
        };

        let status = response.status();
        if status.is_success() {
            match response.json::<QueryResponse>().await {
                Ok(body) => SubmissionOutcome::Success(body),
                Err(e) => SubmissionOutcome::Failed(format!("Unreadable response body: {}", e)),
            }
        } else {
            debug!("Server rejected query with status {}", status);
            SubmissionOutcome::Rejected {
                status: status.as_u16(),
                body: response.json::<ErrorResponse>().await.ok(),
            }
        }
    }

    /// Probes `GET /health`
    pub async fn health(&self) -> Result<HealthStatus> {
        let url = format!("{}/health", self.base_url);
        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", url))?;

        if !response.status().is_success() {
            return Err(anyhow!("Health check returned {}", response.status()));
        }
        response
            .json::<HealthStatus>()
            .await
            .context("Failed to parse health response")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::State,
        http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
        response::IntoResponse,
        routing::{get, post},
        Json, Router,
    };
    use coql_core::{QueryView, ViewState};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;

    async fn spawn_stub(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn success_body(coql: &str) -> Value {
        json!({
            "status": "success",
            "query": { "natural": "q", "coql": coql },
            "analysis": { "narrative": "One deal found.", "tabular": "<table></table>" }
        })
    }

    #[derive(Default)]
    struct Captured {
        content_type: Mutex<Option<String>>,
        body: Mutex<Option<String>>,
    }

    async fn capture(
        State(captured): State<Arc<Captured>>,
        headers: HeaderMap,
        body: String,
    ) -> Json<Value> {
        *captured.content_type.lock().unwrap() = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        *captured.body.lock().unwrap() = Some(body);
        Json(success_body("select Last_Name from Leads"))
    }

    #[tokio::test]
    async fn test_sends_verbatim_text_as_json() {
        let captured = Arc::new(Captured::default());
        let url = spawn_stub(
            Router::new()
                .route("/query", post(capture))
                .with_state(captured.clone()),
        )
        .await;
        let client = QueryClient::new(&format!("{}/", url)).unwrap();

        let outcome = client.submit("  Show me all leads  ").await;

        assert_eq!(
            captured.content_type.lock().unwrap().as_deref(),
            Some("application/json")
        );
        let sent: Value =
            serde_json::from_str(captured.body.lock().unwrap().as_deref().unwrap()).unwrap();
        assert_eq!(sent, json!({ "natural_query": "  Show me all leads  " }));

        match outcome {
            SubmissionOutcome::Success(response) => {
                assert_eq!(response.query.coql, "select Last_Name from Leads");
                assert_eq!(response.analysis.narrative, "One deal found.");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        // Empty input goes out unchanged too
        client.submit("").await;
        let sent: Value =
            serde_json::from_str(captured.body.lock().unwrap().as_deref().unwrap()).unwrap();
        assert_eq!(sent, json!({ "natural_query": "" }));
    }

    #[tokio::test]
    async fn test_rejection_with_error_message() {
        let url = spawn_stub(Router::new().route(
            "/query",
            post(|| async {
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "error": "Invalid query" })),
                )
            }),
        ))
        .await;
        let client = QueryClient::new(&url).unwrap();

        let outcome = client.submit("x").await;
        assert_eq!(
            ViewState::from_outcome(outcome).error_message(),
            Some("Invalid query")
        );
    }

    #[tokio::test]
    async fn test_rejection_without_error_field_uses_fallback() {
        let url = spawn_stub(Router::new().route(
            "/query",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({}))).into_response() }),
        ))
        .await;
        let client = QueryClient::new(&url).unwrap();

        let outcome = client.submit("x").await;
        assert!(matches!(
            outcome,
            SubmissionOutcome::Rejected { status: 500, .. }
        ));
        assert_eq!(
            ViewState::from_outcome(outcome).error_message(),
            Some("An error occurred")
        );
    }

    #[tokio::test]
    async fn test_network_failure_is_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let client = QueryClient::new(&format!("http://{}", addr)).unwrap();

        let outcome = client.submit("x").await;
        assert!(matches!(outcome, SubmissionOutcome::Failed(_)));
        assert_eq!(
            ViewState::from_outcome(outcome).error_message(),
            Some("An error occurred while processing your request")
        );
    }

    #[tokio::test]
    async fn test_malformed_success_body_is_transport_error() {
        let url = spawn_stub(Router::new().route("/query", post(|| async { "not json" })))
            .await;
        let client = QueryClient::new(&url).unwrap();

        let outcome = client.submit("x").await;
        assert!(matches!(outcome, SubmissionOutcome::Failed(_)));
    }

    #[tokio::test]
    async fn test_partial_success_body_renders_empty_fields() {
        let url = spawn_stub(Router::new().route(
            "/query",
            post(|| async { Json(json!({ "query": { "coql": "select Email from Contacts" } })) }),
        ))
        .await;
        let client = QueryClient::new(&url).unwrap();

        match client.submit("emails").await {
            SubmissionOutcome::Success(response) => {
                assert_eq!(response.query.coql, "select Email from Contacts");
                assert_eq!(response.analysis.narrative, "");
                assert_eq!(response.analysis.tabular, "");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_null_fields_and_partial_metadata_still_succeed() {
        let url = spawn_stub(Router::new().route(
            "/query",
            post(|| async {
                Json(json!({
                    "query": { "coql": null },
                    "analysis": { "narrative": "Nothing to add.", "tabular": null },
                    "metadata": { "timestamp": "2024-05-01T10:00:00+05:30" }
                }))
            }),
        ))
        .await;
        let client = QueryClient::new(&url).unwrap();

        match client.submit("deals").await {
            SubmissionOutcome::Success(response) => {
                assert_eq!(response.query.coql, "");
                assert_eq!(response.analysis.narrative, "Nothing to add.");
                assert_eq!(response.metadata.unwrap().record_count, 0);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_overlapping_submissions_latest_wins() {
        let hits = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route(
                "/query",
                post(
                    |State(hits): State<Arc<AtomicUsize>>, Json(body): Json<Value>| async move {
                        hits.fetch_add(1, Ordering::SeqCst);
                        let text = body["natural_query"].as_str().unwrap_or_default().to_string();
                        if text == "first" {
                            tokio::time::sleep(Duration::from_millis(300)).await;
                        }
                        Json(success_body(&text))
                    },
                ),
            )
            .with_state(hits.clone());
        let client = QueryClient::new(&spawn_stub(router).await).unwrap();
        let view = Arc::new(tokio::sync::Mutex::new(QueryView::new()));

        let first = crate::app::submit(&client, &view, "first");
        let second = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            crate::app::submit(&client, &view, "second").await
        };
        let (first_applied, second_applied) = tokio::join!(first, second);

        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert!(!first_applied);
        assert!(second_applied);
        let current = view.lock().await;
        match current.state() {
            ViewState::Results(response) => assert_eq!(response.query.coql, "second"),
            other => panic!("unexpected state: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_health_probe() {
        let url = spawn_stub(Router::new().route(
            "/health",
            get(|| async {
                Json(json!({
                    "status": "healthy",
                    "services": { "converter": true, "executor": true, "processor": true }
                }))
            }),
        ))
        .await;
        let client = QueryClient::new(&url).unwrap();
        let health = client.health().await.unwrap();
        assert_eq!(health.status, "healthy");
        assert!(health.services.executor);
    }
}
