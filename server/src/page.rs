//! The query page served at `/`.

use coql_core::view::{
    render_html, TabularTrust, ViewState, GENERIC_ERROR_MESSAGE, TRANSPORT_ERROR_MESSAGE,
};
use serde_json::Value;

const TEMPLATE: &str = include_str!("../assets/index.html");

/// Marker replaced by the loading, results and error regions
const VIEW_MARKER: &str = "<!-- view -->";

/// Script placeholders and the messages they become, as JS string literals
const SCRIPT_MESSAGES: [(&str, &str); 2] = [
    ("__GENERIC_ERROR__", GENERIC_ERROR_MESSAGE),
    ("__TRANSPORT_ERROR__", TRANSPORT_ERROR_MESSAGE),
];

/// Page with the view regions rendered in their initial `Idle` state
pub fn index_html() -> String {
    let page = TEMPLATE.replace(
        VIEW_MARKER,
        &render_html(&ViewState::Idle, TabularTrust::FirstParty),
    );
    SCRIPT_MESSAGES
        .into_iter()
        .fold(page, |page, (placeholder, message)| {
            page.replace(placeholder, &Value::String(message.to_string()).to_string())
        })
}
