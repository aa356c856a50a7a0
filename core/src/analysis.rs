use chrono::Local;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{error, info};

use crate::errors::CoqlResult;
use crate::html::markdown_to_safe_html;
use crate::llm::{ChatMessage, CompletionOptions, LlmClient};
use crate::types::{
    Analysis, CrmRecord, CrmResponse, GeneratedQuery, QueryResponse, ResponseMetadata, TableModel,
};

const ANALYSIS_OPTIONS: CompletionOptions = CompletionOptions {
    temperature: 0.1,
    max_tokens: 1000,
};

/// Column names containing one of these are rendered as currency
const CURRENCY_KEYS: &[&str] = &["amount", "value", "price", "revenue"];

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("No data found in response")]
    NoData,

    #[error("Failed to generate analysis: {0}")]
    Generation(#[source] crate::errors::CoqlError),
}

/// Summarises CRM rows into narrative and tabular form
#[derive(Clone)]
pub struct ResponseProcessor {
    llm: Arc<dyn LlmClient>,
}

impl ResponseProcessor {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    pub async fn process(
        &self,
        crm_response: &CrmResponse,
        natural_query: &str,
        coql_query: &str,
    ) -> Result<QueryResponse, AnalysisError> {
        info!(query = natural_query, "Processing CRM response");

        if crm_response.data.is_empty() {
            return Err(AnalysisError::NoData);
        }

        let formatted = format_records(&crm_response.data);
        let results = Value::Array(formatted.iter().cloned().map(Value::Object).collect());

        let narrative = self
            .ask(narrative_prompt(natural_query, coql_query, &results))
            .await
            .map_err(|e| {
                error!(error = %e, "Narrative analysis failed");
                AnalysisError::Generation(e)
            })?;
        let tabular_markdown = self
            .ask(tabular_prompt(natural_query, coql_query, &results))
            .await
            .map_err(|e| {
                error!(error = %e, "Tabular analysis failed");
                AnalysisError::Generation(e)
            })?;

        Ok(QueryResponse {
            status: "success".to_string(),
            query: GeneratedQuery {
                natural: natural_query.to_string(),
                coql: coql_query.to_string(),
            },
            analysis: Analysis {
                narrative,
                tabular: markdown_to_safe_html(&tabular_markdown),
                tabular_markdown,
                table: Some(table_from_records(&formatted)),
            },
            metadata: Some(ResponseMetadata {
                timestamp: Local::now().to_rfc3339(),
                record_count: crm_response.data.len(),
            }),
        })
    }

    async fn ask(&self, prompt: String) -> CoqlResult<String> {
        self.llm
            .complete(&[ChatMessage::user(prompt)], ANALYSIS_OPTIONS)
            .await
    }
}

fn narrative_prompt(natural_query: &str, coql_query: &str, results: &Value) -> String {
    format!(
        r#"Please analyze this query and its results, and provide a clear explanation in natural language.
Focus on telling the story of what the data shows in complete sentences.

Query: {natural_query}
COQL Query: {coql_query}
Results: {results}

Provide a response that:
1. Summarizes what was queried
2. Describes the results found
3. Includes specific details like names, amounts where relevant
4. Uses complete sentences and natural language
5. Does not open with a preamble such as "Here is the analysis of the query and its results".

Example style of response:
"The query retrieved deals in the 'Value Proposition' stage. There is one deal in this stage: a deal named 'Example Corp' with a value of $50,000. This indicates that Example Corp is actively engaged in discussions about the product's value proposition.""#
    )
}

fn tabular_prompt(natural_query: &str, coql_query: &str, results: &Value) -> String {
    format!(
        r#"Please analyze this query and its results, and organize the information in a clear, tabular format.
Present the key data points in a structured way that's easy to read.

Query: {natural_query}
COQL Query: {coql_query}
Results: {results}

Format the response as a markdown table with headers and properly aligned columns."#
    )
}

/// Applies currency formatting to money-like columns
pub fn format_records(records: &[CrmRecord]) -> Vec<CrmRecord> {
    records
        .iter()
        .map(|record| {
            record
                .iter()
                .map(|(key, value)| {
                    let lowered = key.to_lowercase();
                    let value = if CURRENCY_KEYS.iter().any(|k| lowered.contains(k)) {
                        format_currency(value)
                    } else {
                        value.clone()
                    };
                    (key.clone(), value)
                })
                .collect::<Map<String, Value>>()
        })
        .collect()
}

/// `50000` -> `"$50,000.00"`; non-numeric values are returned unchanged
pub fn format_currency(value: &Value) -> Value {
    let amount = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    match amount.filter(|a| a.is_finite()) {
        Some(amount) => Value::String(currency_string(amount)),
        None => value.clone(),
    }
}

fn currency_string(amount: f64) -> String {
    let fixed = format!("{:.2}", amount.abs());
    let (whole, cents) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if amount < 0.0 { "-" } else { "" };
    format!("{}${}.{}", sign, grouped, cents)
}

/// Builds a table whose columns follow the order keys first appear in
pub fn table_from_records(records: &[CrmRecord]) -> TableModel {
    let mut columns: Vec<String> = Vec::new();
    for record in records {
        for key in record.keys() {
            if !columns.contains(key) {
                columns.push(key.clone());
            }
        }
    }

    let rows = records
        .iter()
        .map(|record| {
            columns
                .iter()
                .map(|column| record.get(column).map(cell_text).unwrap_or_default())
                .collect()
        })
        .collect();

    TableModel { columns, rows }
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        // Lookup fields come back as `{"name": ..., "id": ...}`
        Value::Object(map) => match map.get("name") {
            Some(Value::String(name)) => name.clone(),
            _ => value.to_string(),
        },
        other => other.to_string(),
    }
}
