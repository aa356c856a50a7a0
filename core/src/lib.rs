// Core of the COQL query suite:
// - Request/response data structures shared by server and clients
// - Configuration loading
// - Shared error types
// - LLM, COQL and Zoho clients plus the query pipeline
// - The query submission view model

// Export types module - Request/response data structures
pub mod types;
pub use types::*;

// Export config module - Configuration loading
pub mod config;
pub use self::config::*;

// Export errors module - Shared error types
pub mod errors;
pub use errors::*;

pub mod analysis;
pub mod coql;
pub mod html;
pub mod llm;
pub mod pipeline;
pub mod view;
pub mod zoho;

pub use analysis::ResponseProcessor;
pub use coql::CoqlConverter;
pub use llm::{ChatCompletionClient, LlmClient};
pub use pipeline::{QueryError, QueryPipeline};
pub use view::{QueryView, RequestToken, SubmissionOutcome, TabularTrust, ViewState};
pub use zoho::{CrmExecutor, ZohoCoqlExecutor};
