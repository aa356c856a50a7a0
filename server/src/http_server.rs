use axum::{
    async_trait,
    extract::{FromRequest, Request, State},
    http::{header::CONTENT_TYPE, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use coql_core::{ErrorResponse, HealthStatus, QueryError, QueryPipeline, QueryRequest, QueryResponse};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn, Instrument};
use uuid::Uuid;

use crate::page;

/// Application state shared with all routes
#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<QueryPipeline>,
}

impl AppState {
    pub fn new(pipeline: QueryPipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
        }
    }
}

/// Error type for HTTP server
#[derive(Debug)]
pub enum ApiError {
    InvalidBody(String),
    Query(QueryError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::InvalidBody(reason) => {
                warn!(reason = %reason, "Rejected request body");
                (
                    StatusCode::BAD_REQUEST,
                    Json(ErrorResponse::new("Invalid request body")),
                )
                    .into_response()
            }
            Self::Query(e) => {
                let status =
                    StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::BAD_REQUEST);
                (status, Json(e.to_response())).into_response()
            }
        }
    }
}

/// `POST /query` body, accepted as JSON or as an urlencoded form
pub struct QueryPayload(pub QueryRequest);

#[async_trait]
impl<S> FromRequest<S> for QueryPayload
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_form = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("application/x-www-form-urlencoded"));

        if is_form {
            let Form(request) = Form::<QueryRequest>::from_request(req, state)
                .await
                .map_err(|e| ApiError::InvalidBody(e.body_text()))?;
            Ok(Self(request))
        } else {
            let Json(request) = Json::<QueryRequest>::from_request(req, state)
                .await
                .map_err(|e| ApiError::InvalidBody(e.body_text()))?;
            Ok(Self(request))
        }
    }
}

/// Build the router with all routes and layers
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(index))
        .route("/query", post(handle_query))
        .route("/health", get(health))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server
pub async fn run_server(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind {}: {}", addr, e))?;
    info!("Starting HTTP server on {}", addr);

    axum::serve(listener, build_router(state))
        .await
        .map_err(|e| anyhow::anyhow!("Failed to start HTTP server: {}", e))
}

async fn index() -> Html<String> {
    Html(page::index_html())
}

/// Health check handler
async fn health(State(state): State<AppState>) -> Json<HealthStatus> {
    Json(state.pipeline.health())
}

/// Handler for query requests
async fn handle_query(
    State(state): State<AppState>,
    QueryPayload(request): QueryPayload,
) -> Result<Json<QueryResponse>, ApiError> {
    let span = tracing::info_span!("query", request_id = %Uuid::new_v4());

    async move {
        match state.pipeline.handle(&request.natural_query).await {
            Ok(response) => Ok(Json(response)),
            Err(e) => {
                error!(error = %e, status = e.status_code(), "Failed to process query");
                Err(ApiError::Query(e))
            }
        }
    }
    .instrument(span)
    .await
}

async fn not_found() -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse::new("Resource not found")),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;
    use coql_core::llm::{ChatMessage, CompletionOptions, LlmClient};
    use coql_core::{
        CoqlConverter, CoqlError, CoqlResult, CrmExecutor, CrmResponse, ResponseProcessor,
    };
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use std::sync::Mutex;
    use tower::ServiceExt;

    /// Replies to COQL conversion and analysis prompts by inspecting the system prompt
    struct ScriptedLlm {
        coql: String,
        analysis: CoqlResult<String>,
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(
            &self,
            messages: &[ChatMessage],
            _options: CompletionOptions,
        ) -> CoqlResult<String> {
            if messages.iter().any(|m| m.role == "system") {
                return Ok(json!({ "select_query": self.coql }).to_string());
            }
            match &self.analysis {
                Ok(text) => Ok(text.clone()),
                Err(e) => Err(CoqlError::RequestError(e.to_string())),
            }
        }

        fn provider_name(&self) -> &str {
            "scripted"
        }

        fn model_name(&self) -> String {
            "scripted-1".to_string()
        }
    }

    struct StubCrm {
        rows: Vec<Value>,
        queries: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CrmExecutor for StubCrm {
        async fn execute(&self, select_query: &str) -> CoqlResult<CrmResponse> {
            self.queries.lock().unwrap().push(select_query.to_string());
            Ok(CrmResponse {
                data: self
                    .rows
                    .iter()
                    .filter_map(|row| row.as_object().cloned())
                    .collect(),
                info: None,
            })
        }
    }

    fn app(rows: Vec<Value>, analysis: CoqlResult<String>) -> (Router, Arc<StubCrm>) {
        let llm = Arc::new(ScriptedLlm {
            coql: "select Deal_Name, Amount from Deals where Amount > 1000 limit 10".to_string(),
            analysis,
        });
        let crm = Arc::new(StubCrm {
            rows,
            queries: Mutex::new(Vec::new()),
        });
        let pipeline = QueryPipeline::new(
            CoqlConverter::new(llm.clone()),
            crm.clone(),
            ResponseProcessor::new(llm),
        );
        (build_router(AppState::new(pipeline)), crm)
    }

    fn deals() -> Vec<Value> {
        vec![json!({ "Deal_Name": "Acme Renewal", "Amount": 12500.5 })]
    }

    async fn send(router: Router, request: HttpRequest<Body>) -> (StatusCode, Value) {
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn post_json(body: &str) -> HttpRequest<Body> {
        HttpRequest::builder()
            .method("POST")
            .uri("/query")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_query_success_returns_full_response() {
        let table = "| Deal | Amount |\n|---|---|\n| Acme | $12,500.50 |";
        let (router, crm) = app(deals(), Ok(table.to_string()));

        let (status, body) = send(router, post_json(r#"{"natural_query":"big deals"}"#)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
        assert_eq!(body["query"]["natural"], "big deals");
        assert_eq!(
            body["query"]["coql"],
            "select Deal_Name, Amount from Deals where Amount > 1000 limit 10"
        );
        assert!(body["analysis"]["tabular"]
            .as_str()
            .unwrap()
            .contains("<table>"));
        assert_eq!(body["analysis"]["table"]["columns"], json!(["Deal_Name", "Amount"]));
        assert_eq!(body["metadata"]["record_count"], 1);
        assert_eq!(crm.queries.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_form_encoded_body_is_accepted() {
        let (router, _) = app(deals(), Ok("ok".to_string()));
        let request = HttpRequest::builder()
            .method("POST")
            .uri("/query")
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("natural_query=big+deals"))
            .unwrap();

        let (status, body) = send(router, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["query"]["natural"], "big deals");
    }

    #[tokio::test]
    async fn test_missing_or_empty_query_is_rejected() {
        for payload in [r#"{}"#, r#"{"natural_query":""}"#] {
            let (router, crm) = app(deals(), Ok("ok".to_string()));
            let (status, body) = send(router, post_json(payload)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body, json!({ "error": "No query provided" }));
            assert!(crm.queries.lock().unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn test_malformed_body_is_rejected() {
        let (router, _) = app(deals(), Ok("ok".to_string()));
        let (status, body) = send(router, post_json("{not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid request body");
    }

    #[tokio::test]
    async fn test_no_rows_maps_to_unprocessable() {
        let (router, _) = app(vec![], Ok("ok".to_string()));
        let (status, body) = send(router, post_json(r#"{"natural_query":"deals"}"#)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "No data found in Zoho response");
    }

    #[tokio::test]
    async fn test_analysis_failure_maps_to_bad_gateway() {
        let (router, _) = app(deals(), Err(CoqlError::RequestError("timeout".to_string())));
        let (status, body) = send(router, post_json(r#"{"natural_query":"deals"}"#)).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body, json!({ "error": "Failed to generate analysis" }));
    }

    #[tokio::test]
    async fn test_health_and_not_found() {
        let (router, _) = app(deals(), Ok("ok".to_string()));
        let request = HttpRequest::get("/health").body(Body::empty()).unwrap();
        let (status, body) = send(router.clone(), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["services"]["executor"], true);

        let request = HttpRequest::get("/nowhere").body(Body::empty()).unwrap();
        let (status, body) = send(router, request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({ "error": "Resource not found" }));
    }

    #[tokio::test]
    async fn test_index_serves_page() {
        let (router, _) = app(deals(), Ok("ok".to_string()));
        let request = HttpRequest::get("/").body(Body::empty()).unwrap();
        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let html = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(html.contains(r#"name="natural_query""#));
        assert!(html.contains(r#"<div id="results" hidden>"#));
    }
}
