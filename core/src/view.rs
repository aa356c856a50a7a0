//! The query submission view.
//!
//! A submission moves the view through an explicit state machine:
//!
//! ```text
//! Idle -> Loading -> Results | Error -> Loading -> ...
//! ```
//!
//! [`QueryView`] owns the current [`ViewState`] and hands out a
//! [`RequestToken`] per submission. Only the outcome carrying the most
//! recently issued token may replace the state, so an earlier request that
//! resolves late can never overwrite a newer one. Rendering is a pure
//! function of the state ([`render_html`]).

use std::fmt::Write as _;

use crate::html::{escape_html, table_to_html};
use crate::types::{ErrorResponse, QueryResponse};

/// Shown when the server rejects a request without an `error` message
pub const GENERIC_ERROR_MESSAGE: &str = "An error occurred";

/// Shown when the request could not be sent or the reply could not be read
pub const TRANSPORT_ERROR_MESSAGE: &str = "An error occurred while processing your request";

/// Everything the page can show; exactly one variant is visible at a time
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ViewState {
    #[default]
    Idle,
    Loading,
    Results(QueryResponse),
    Error(String),
}

/// Classified result of one `POST /query`
#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionOutcome {
    /// 2xx with a readable body
    Success(QueryResponse),
    /// Non-2xx; `body` is `None` when it was not a JSON error object
    Rejected {
        status: u16,
        body: Option<ErrorResponse>,
    },
    /// Transport or decoding failure; the cause is for logs only
    Failed(String),
}

impl ViewState {
    pub fn from_outcome(outcome: SubmissionOutcome) -> Self {
        match outcome {
            SubmissionOutcome::Success(response) => ViewState::Results(response),
            SubmissionOutcome::Rejected { body, .. } => ViewState::Error(
                body.and_then(|b| b.error)
                    .filter(|message| !message.is_empty())
                    .unwrap_or_else(|| GENERIC_ERROR_MESSAGE.to_string()),
            ),
            SubmissionOutcome::Failed(_) => ViewState::Error(TRANSPORT_ERROR_MESSAGE.to_string()),
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, ViewState::Loading)
    }

    pub fn results_visible(&self) -> bool {
        matches!(self, ViewState::Results(_))
    }

    pub fn error_visible(&self) -> bool {
        matches!(self, ViewState::Error(_))
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            ViewState::Error(message) => Some(message),
            _ => None,
        }
    }
}

/// Sequence number of a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestToken(u64);

impl RequestToken {
    pub fn value(self) -> u64 {
        self.0
    }
}

/// Current state plus the token of the newest submission
#[derive(Debug, Default)]
pub struct QueryView {
    state: ViewState,
    latest: u64,
}

impl QueryView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    /// Starts a submission: hides results and error and shows the loading state
    pub fn begin_submission(&mut self) -> RequestToken {
        self.latest += 1;
        self.state = ViewState::Loading;
        RequestToken(self.latest)
    }

    pub fn is_current(&self, token: RequestToken) -> bool {
        token.0 == self.latest
    }

    /// Applies an outcome if it belongs to the newest submission.
    ///
    /// Returns `false` when the outcome is stale and was dropped.
    pub fn complete(&mut self, token: RequestToken, outcome: SubmissionOutcome) -> bool {
        if !self.is_current(token) {
            tracing::debug!(
                token = token.0,
                latest = self.latest,
                "Dropping stale submission outcome"
            );
            return false;
        }
        if let SubmissionOutcome::Failed(cause) = &outcome {
            tracing::warn!(cause = %cause, "Query submission failed");
        }
        self.state = ViewState::from_outcome(outcome);
        true
    }
}

/// How far the server's tabular markup is trusted when no table model is present
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TabularTrust {
    /// Markup is escaped and shown as text
    #[default]
    Untrusted,
    /// Markup came from our own server, which sanitizes it
    FirstParty,
}

fn hidden(visible: bool) -> &'static str {
    if visible {
        ""
    } else {
        " hidden"
    }
}

/// Renders the loading, results and error regions for `state`
pub fn render_html(state: &ViewState, trust: TabularTrust) -> String {
    let mut out = String::new();

    let _ = writeln!(
        out,
        r#"<div id="loading" class="loading"{}>Processing your query...</div>"#,
        hidden(state.is_loading())
    );

    let (coql, narrative, tabular) = match state {
        ViewState::Results(response) => (
            escape_html(&response.query.coql),
            escape_html(&response.analysis.narrative),
            render_tabular(response, trust),
        ),
        _ => Default::default(),
    };

    let _ = writeln!(out, r#"<div id="results"{}>"#, hidden(state.results_visible()));
    let _ = writeln!(
        out,
        r#"<section class="panel"><h2>Generated COQL Query</h2><pre id="coql">{}</pre></section>"#,
        coql
    );
    let _ = writeln!(
        out,
        r#"<section class="panel"><h2>Analysis</h2><p id="narrative">{}</p></section>"#,
        narrative
    );
    let _ = writeln!(
        out,
        r#"<section class="panel"><h2>Results</h2><div id="tabular">{}</div></section>"#,
        tabular
    );
    out.push_str("</div>\n");

    let _ = writeln!(
        out,
        r#"<div id="error" class="error"{}>{}</div>"#,
        hidden(state.error_visible()),
        escape_html(state.error_message().unwrap_or_default())
    );

    out
}

/// First-party markup is shown as sent; otherwise the escaped table model is used
/// and untrusted markup without one is shown as text.
fn render_tabular(response: &QueryResponse, trust: TabularTrust) -> String {
    let tabular = &response.analysis.tabular;
    let table = response
        .analysis
        .table
        .as_ref()
        .filter(|table| !table.columns.is_empty());
    match (trust, table) {
        (TabularTrust::FirstParty, _) if !tabular.is_empty() => tabular.clone(),
        (_, Some(table)) => table_to_html(table),
        (TabularTrust::FirstParty, None) => String::new(),
        (TabularTrust::Untrusted, None) => escape_html(tabular),
    }
}
