//! Natural language to COQL conversion.
//!
//! The translation itself is delegated to an [`LlmClient`]; this module owns
//! the prompt, the tolerant parsing of the model output and the structural
//! checks a generated query must pass before it is sent to the CRM.

use regex::Regex;
use serde_json::Value;
use std::sync::{Arc, OnceLock};
use tracing::{debug, error, info};

use crate::errors::{CoqlError, CoqlResult};
use crate::llm::{ChatMessage, CompletionOptions, LlmClient};
use crate::types::CoqlQuery;

pub const MAX_SELECT_FIELDS: usize = 50;
pub const MAX_WHERE_CRITERIA: usize = 25;
pub const MAX_LIMIT: u64 = 2000;
pub const MAX_JOIN_DEPTH: usize = 2;

const CONVERSION_OPTIONS: CompletionOptions = CompletionOptions {
    temperature: 0.1,
    max_tokens: 500,
};

const SYSTEM_PROMPT: &str = r#"You are a Zoho CRM COQL expert. Convert natural language to COQL (CRM Object Query Language) queries.

Always return a JSON object with a "select_query" key containing the COQL query string.

Key COQL rules to follow:
1. SELECT can specify up to 50 field API names
2. WHERE can include up to 25 criteria
3. Maximum LIMIT is 2000
4. JOINs through lookup fields MUST use dot notation
5. Maximum of two JOINs allowed (e.g., field.lookup1.lookup2)
6. Keywords are not case-sensitive except for aggregate functions
7. Default sorting is by record ID ascending
8. Special characters and SQL reserved words must be enclosed in quotes
9. When using lookup fields:
   - Account_Name returns just the ID
   - Account_Name.Account_Name returns the actual name
10. For simple queries without specific fields, use common fields like:
    - Contacts: Last_Name, First_Name, Email, Phone, Account_Name.Account_Name
    - Leads: Last_Name, Company, Email, Phone, Lead_Status
    - Deals: Deal_Name, Amount, Stage, Closing_Date, Account_Name.Account_Name

Example response format:
{"select_query": "select Last_Name, Email from Contacts where Last_Name is not null limit 100"}"#;

/// Turns user questions into validated COQL via an LLM
#[derive(Clone)]
pub struct CoqlConverter {
    llm: Arc<dyn LlmClient>,
}

impl CoqlConverter {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    pub async fn convert(&self, natural_query: &str) -> CoqlResult<CoqlQuery> {
        let messages = [
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(format!(
                "Convert this natural language query to Zoho COQL. Return ONLY valid JSON with the COQL query, no other text: {}",
                natural_query
            )),
        ];

        let raw = self.llm.complete(&messages, CONVERSION_OPTIONS).await?;
        info!(
            provider = self.llm.provider_name(),
            model = %self.llm.model_name(),
            "Received conversion from LLM"
        );
        debug!(raw = %raw, "Raw LLM conversion output");

        let query = parse_llm_response(&raw)?;
        if query.select_query.is_empty() {
            return Ok(query);
        }
        validate_coql_query(&query.select_query).map_err(|e| {
            error!(error = %e, query = %query.select_query, "Generated COQL failed validation");
            e
        })?;

        Ok(query)
    }
}

/// Extracts `select_query` from model output that may be fenced or wrapped in an array
pub fn parse_llm_response(response: &str) -> CoqlResult<CoqlQuery> {
    let cleaned = response.replace("```json", "").replace("```", "");
    let parsed: Value = serde_json::from_str(cleaned.trim())
        .map_err(|e| CoqlError::ParsingError(format!("Invalid JSON response: {}", e)))?;

    let object = match parsed {
        Value::Array(items) => items
            .into_iter()
            .next()
            .ok_or_else(|| CoqlError::ParsingError("Empty response array".to_string()))?,
        other => other,
    };

    let Value::Object(map) = object else {
        return Err(CoqlError::ParsingError(format!(
            "Expected a JSON object, got {}",
            json_type_name(&object)
        )));
    };

    match map.get("select_query") {
        Some(Value::String(query)) => Ok(CoqlQuery {
            select_query: query.trim().to_string(),
        }),
        Some(other) => Err(CoqlError::ParsingError(format!(
            "'select_query' must be a string, got {}",
            json_type_name(other)
        ))),
        None => Err(CoqlError::ParsingError(
            "Response missing required 'select_query' field".to_string(),
        )),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn keyword(name: &str) -> Regex {
    // Keywords are case-insensitive and must stand alone as words.
    Regex::new(&format!(r"(?i)\b{}\b", name.replace(' ', r"\s+"))).expect("static keyword regex")
}

struct Keywords {
    from: Regex,
    where_: Regex,
    clause_end: Regex,
    limit: Regex,
    connective: Regex,
}

fn keywords() -> &'static Keywords {
    static KEYWORDS: OnceLock<Keywords> = OnceLock::new();
    KEYWORDS.get_or_init(|| Keywords {
        from: keyword("from"),
        where_: keyword("where"),
        clause_end: Regex::new(r"(?i)\b(order\s+by|group\s+by|limit|offset)\b")
            .expect("static clause regex"),
        limit: Regex::new(r"(?i)\blimit\s+([^\s,;]+)(?:\s*,\s*([^\s,;]+))?")
            .expect("static limit regex"),
        connective: Regex::new(r"(?i)\b(and|or)\b").expect("static connective regex"),
    })
}

/// Checks a COQL query against the API's structural limits
pub fn validate_coql_query(query: &str) -> CoqlResult<()> {
    let query = query.trim();
    let kw = keywords();

    if !query.to_lowercase().starts_with("select") {
        return Err(CoqlError::ValidationError(
            "Query must start with SELECT".to_string(),
        ));
    }

    let from = kw
        .from
        .find(query)
        .ok_or_else(|| CoqlError::ValidationError("Query must contain FROM clause".to_string()))?;

    let select_part = query["select".len()..from.start()].trim();
    let fields: Vec<&str> = select_part.split(',').map(str::trim).collect();
    if fields.len() > MAX_SELECT_FIELDS {
        return Err(CoqlError::ValidationError(format!(
            "SELECT clause cannot have more than {} fields",
            MAX_SELECT_FIELDS
        )));
    }

    let rest = &query[from.end()..];
    if let Some(where_kw) = kw.where_.find(rest) {
        let where_body = &rest[where_kw.end()..];
        let where_body = match kw.clause_end.find(where_body) {
            Some(end) => &where_body[..end.start()],
            None => where_body,
        };
        let criteria = kw.connective.find_iter(where_body).count() + 1;
        if criteria > MAX_WHERE_CRITERIA {
            return Err(CoqlError::ValidationError(format!(
                "WHERE clause cannot have more than {} criteria",
                MAX_WHERE_CRITERIA
            )));
        }
    }

    if let Some(captures) = kw.limit.captures(rest) {
        // `limit offset, count` puts the row count second
        let count = captures
            .get(2)
            .or_else(|| captures.get(1))
            .map(|m| m.as_str())
            .unwrap_or_default();
        let limit: u64 = count
            .parse()
            .map_err(|_| CoqlError::ValidationError(format!("Invalid LIMIT value '{}'", count)))?;
        if limit > MAX_LIMIT {
            return Err(CoqlError::ValidationError(format!(
                "LIMIT cannot exceed {}",
                MAX_LIMIT
            )));
        }
    }

    let deepest = fields
        .iter()
        .map(|field| field.matches('.').count())
        .max()
        .unwrap_or(0);
    if deepest > MAX_JOIN_DEPTH {
        return Err(CoqlError::ValidationError(format!(
            "Maximum of {} JOINs allowed",
            MAX_JOIN_DEPTH
        )));
    }

    Ok(())
}
