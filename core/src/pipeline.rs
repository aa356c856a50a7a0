use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, instrument};

use crate::analysis::{AnalysisError, ResponseProcessor};
use crate::coql::CoqlConverter;
use crate::errors::CoqlError;
use crate::types::{ErrorResponse, HealthStatus, QueryResponse, ServiceHealth};
use crate::zoho::CrmExecutor;

/// Failures of one `POST /query`, each with its HTTP status and public message
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("No query provided")]
    EmptyQuery,

    #[error("Failed to convert natural language to COQL")]
    Conversion(#[source] CoqlError),

    #[error("Failed to generate COQL query")]
    MissingCoql,

    #[error("Failed to execute query in Zoho CRM")]
    Execution(#[source] CoqlError),

    #[error("No data found in Zoho response")]
    NoData,

    #[error("Failed to generate analysis")]
    Analysis(#[source] CoqlError),

    #[error("Failed to process query response")]
    Processing(String),
}

impl QueryError {
    pub fn status_code(&self) -> u16 {
        match self {
            QueryError::NoData => 422,
            QueryError::Analysis(_) => 502,
            _ => 400,
        }
    }

    /// Body sent to the client; upstream causes stay in the logs
    pub fn to_response(&self) -> ErrorResponse {
        let response = ErrorResponse::new(self.to_string());
        match self {
            QueryError::Processing(details) => response.with_details(details.clone()),
            _ => response,
        }
    }
}

impl From<AnalysisError> for QueryError {
    fn from(err: AnalysisError) -> Self {
        match err {
            AnalysisError::NoData => QueryError::NoData,
            AnalysisError::Generation(cause) => QueryError::Analysis(cause),
        }
    }
}

/// Natural language in, analysed CRM rows out
#[derive(Clone)]
pub struct QueryPipeline {
    converter: CoqlConverter,
    executor: Arc<dyn CrmExecutor>,
    processor: ResponseProcessor,
}

impl QueryPipeline {
    pub fn new(
        converter: CoqlConverter,
        executor: Arc<dyn CrmExecutor>,
        processor: ResponseProcessor,
    ) -> Self {
        Self {
            converter,
            executor,
            processor,
        }
    }

    #[instrument(skip(self))]
    pub async fn handle(&self, natural_query: &str) -> Result<QueryResponse, QueryError> {
        // Only a truly empty string is refused; whitespace goes to the converter
        if natural_query.is_empty() {
            return Err(QueryError::EmptyQuery);
        }
        info!("Received natural language query");

        let converted = self.converter.convert(natural_query).await.map_err(|e| {
            error!(error = %e, "Error during query conversion");
            QueryError::Conversion(e)
        })?;

        let coql = converted.select_query;
        if coql.is_empty() {
            return Err(QueryError::MissingCoql);
        }
        info!(coql = %coql, "Generated COQL query");

        let crm_response = self.executor.execute(&coql).await.map_err(|e| {
            error!(error = %e, "Error during query execution");
            QueryError::Execution(e)
        })?;

        if crm_response.data.is_empty() {
            info!("CRM returned no rows");
            return Err(QueryError::NoData);
        }

        let response = self
            .processor
            .process(&crm_response, natural_query, &coql)
            .await?;

        if response.analysis.narrative.is_empty() && response.analysis.tabular.is_empty() {
            return Err(QueryError::Processing(
                "Analysis produced no narrative or tabular output".to_string(),
            ));
        }

        info!(
            records = crm_response.data.len(),
            "Successfully processed response with analysis"
        );
        Ok(response)
    }

    pub fn health(&self) -> HealthStatus {
        HealthStatus {
            status: "healthy".to_string(),
            services: ServiceHealth {
                converter: true,
                executor: true,
                processor: true,
            },
        }
    }
}
