use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// One CRM record as returned by the COQL API
pub type CrmRecord = Map<String, Value>;

/// Body of `POST /query`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub natural_query: String,
}

impl QueryRequest {
    pub fn new(natural_query: impl Into<String>) -> Self {
        Self {
            natural_query: natural_query.into(),
        }
    }
}

/// Successful `POST /query` response.
///
/// Every field defaults when absent or `null` so a partial body still renders.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryResponse {
    #[serde(deserialize_with = "null_as_default")]
    pub status: String,
    #[serde(deserialize_with = "null_as_default")]
    pub query: GeneratedQuery,
    #[serde(deserialize_with = "null_as_default")]
    pub analysis: Analysis,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ResponseMetadata>,
}

/// The natural-language input and the COQL generated from it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratedQuery {
    #[serde(deserialize_with = "null_as_default")]
    pub natural: String,
    #[serde(deserialize_with = "null_as_default")]
    pub coql: String,
}

/// LLM analysis of the returned rows
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Analysis {
    #[serde(deserialize_with = "null_as_default")]
    pub narrative: String,
    /// Sanitized HTML fragment
    #[serde(deserialize_with = "null_as_default")]
    pub tabular: String,
    /// The markdown `tabular` was rendered from, for non-HTML clients
    #[serde(
        deserialize_with = "null_as_default",
        skip_serializing_if = "String::is_empty"
    )]
    pub tabular_markdown: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<TableModel>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseMetadata {
    #[serde(deserialize_with = "null_as_default")]
    pub timestamp: String,
    #[serde(deserialize_with = "null_as_default")]
    pub record_count: usize,
}

/// Reads `null` as the type's default instead of failing
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Structured rows behind the tabular fragment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableModel {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Body of a non-2xx `POST /query` response
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Output of the natural-language converter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoqlQuery {
    pub select_query: String,
}

/// Rows returned by the COQL endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrmResponse {
    #[serde(default)]
    pub data: Vec<CrmRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub services: ServiceHealth,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub converter: bool,
    pub executor: bool,
    pub processor: bool,
}
