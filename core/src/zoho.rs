use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument, warn};

use crate::config::ZohoConfig;
use crate::errors::{CoqlError, CoqlResult};
use crate::types::CrmResponse;

/// Executes COQL against a CRM backend
#[async_trait]
pub trait CrmExecutor: Send + Sync {
    async fn execute(&self, select_query: &str) -> CoqlResult<CrmResponse>;
}

#[derive(Debug, Clone)]
struct Credentials {
    client_id: String,
    client_secret: String,
    refresh_token: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Zoho CRM COQL client with OAuth refresh-token handling
#[derive(Debug)]
pub struct ZohoCoqlExecutor {
    credentials: Credentials,
    api_base_url: String,
    accounts_url: String,
    http_client: Client,
    access_token: RwLock<Option<String>>,
}

impl ZohoCoqlExecutor {
    pub fn new(config: &ZohoConfig) -> CoqlResult<Self> {
        let require = |value: &Option<String>, name: &str| {
            value
                .clone()
                .filter(|v| !v.is_empty())
                .ok_or_else(|| CoqlError::ConfigError(format!("Zoho {} is not configured", name)))
        };

        let credentials = Credentials {
            client_id: require(&config.client_id, "client_id")?,
            client_secret: require(&config.client_secret, "client_secret")?,
            refresh_token: require(&config.refresh_token, "refresh_token")?,
        };

        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        info!(api = %config.api_base_url, "Zoho executor initialized");

        Ok(Self {
            credentials,
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            accounts_url: config.accounts_url.trim_end_matches('/').to_string(),
            http_client,
            access_token: RwLock::new(None),
        })
    }

    fn coql_url(&self) -> String {
        format!("{}/crm/v4/coql", self.api_base_url)
    }

    /// Exchanges the refresh token for a new access token and caches it
    #[instrument(skip(self))]
    async fn refresh_access_token(&self) -> CoqlResult<String> {
        info!("Refreshing Zoho access token");
        let url = format!("{}/oauth/v2/token", self.accounts_url);

        let response = self
            .http_client
            .post(&url)
            .query(&[
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
                ("refresh_token", self.credentials.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| CoqlError::RequestError(format!("Error refreshing token: {}", e)))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            CoqlError::ResponseError(format!("Failed to read token response: {}", e))
        })?;

        if !status.is_success() {
            error!(status = status.as_u16(), body = %body, "Token refresh rejected");
            return Err(CoqlError::HttpError {
                status_code: status.as_u16(),
                message: format!("Token refresh failed: {}", body),
            });
        }

        let token: TokenResponse = serde_json::from_str(&body)?;
        let access_token = match (token.access_token, token.error) {
            (Some(access_token), _) => access_token,
            (None, Some(error)) => {
                return Err(CoqlError::ApiError(format!("Token refresh failed: {}", error)))
            }
            (None, None) => {
                return Err(CoqlError::ResponseError(
                    "Token response missing access_token".to_string(),
                ))
            }
        };

        *self.access_token.write().await = Some(access_token.clone());
        info!("Access token refreshed successfully");
        Ok(access_token)
    }

    async fn current_token(&self) -> CoqlResult<String> {
        if let Some(token) = self.access_token.read().await.clone() {
            return Ok(token);
        }
        self.refresh_access_token().await
    }

    async fn post_query(&self, token: &str, payload: &Value) -> CoqlResult<reqwest::Response> {
        debug!(
            url = %self.coql_url(),
            authorization = "REDACTED",
            payload = %payload,
            "Sending COQL request"
        );
        self.http_client
            .post(self.coql_url())
            .header("Authorization", format!("Zoho-oauthtoken {}", token))
            .json(payload)
            .send()
            .await
            .map_err(|e| CoqlError::RequestError(format!("Error executing query: {}", e)))
    }
}

/// Pulls `code`, `message` and `details` out of a Zoho error body for logging
fn log_zoho_error(status: StatusCode, query: &str, body: &str) {
    match serde_json::from_str::<Value>(body) {
        Ok(parsed) => {
            let null = Value::Null;
            let field = |key: &str| parsed.get(key).unwrap_or(&null).clone();
            let (code, message, details) = (field("code"), field("message"), field("details"));
            error!(
                status = status.as_u16(),
                code = %code,
                message = %message,
                details = %details,
                query,
                "Zoho rejected COQL query"
            )
        }
        Err(_) => error!(status = status.as_u16(), body, query, "Zoho rejected COQL query"),
    }
}

#[async_trait]
impl CrmExecutor for ZohoCoqlExecutor {
    #[instrument(skip(self))]
    async fn execute(&self, select_query: &str) -> CoqlResult<CrmResponse> {
        let query = select_query.trim();
        if query.is_empty() {
            error!("Missing select_query");
            return Err(CoqlError::ValidationError(
                "Select query is required".to_string(),
            ));
        }

        let payload = json!({ "select_query": query });
        let token = self.current_token().await?;
        let mut response = self.post_query(&token, &payload).await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            warn!("Token expired, refreshing and retrying");
            let token = self.refresh_access_token().await?;
            response = self.post_query(&token, &payload).await?;
        }

        let status = response.status();
        debug!(status = status.as_u16(), "COQL response received");

        if status == StatusCode::NO_CONTENT {
            info!("Query executed successfully, no records matched");
            return Ok(CrmResponse::default());
        }

        let body = response.text().await.map_err(|e| {
            CoqlError::ResponseError(format!("Failed to read COQL response: {}", e))
        })?;

        if !status.is_success() {
            log_zoho_error(status, query, &body);
            return Err(CoqlError::HttpError {
                status_code: status.as_u16(),
                message: body,
            });
        }

        let result: CrmResponse = serde_json::from_str(&body)?;
        info!(records = result.data.len(), "Query executed successfully");
        Ok(result)
    }
}
