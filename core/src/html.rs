//! HTML helpers shared by the server and the view model.
//!
//! Everything that reaches a page goes through here: plain text is escaped,
//! LLM markdown is rendered with raw HTML, links and images neutralised.

use pulldown_cmark::{escape, html, Event, Options, Parser, Tag};

use crate::types::TableModel;

/// Escapes text for use in element content and double-quoted attribute values
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    // Writing into a String cannot fail
    let _ = escape::escape_html(&mut out, text);
    out
}

/// Renders markdown to HTML, treating embedded markup as literal text
pub fn markdown_to_safe_html(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let events = Parser::new_ext(markdown, options).filter_map(|event| match event {
        Event::Html(raw) => Some(Event::Text(raw)),
        Event::Start(Tag::Link(..) | Tag::Image(..)) | Event::End(Tag::Link(..) | Tag::Image(..)) => {
            None
        }
        other => Some(other),
    });

    let mut out = String::with_capacity(markdown.len() * 2);
    html::push_html(&mut out, events);
    out
}

/// Renders a table model as an HTML table with escaped cells
pub fn table_to_html(table: &TableModel) -> String {
    let mut out = String::from("<table>\n<thead>\n<tr>");
    for column in &table.columns {
        out.push_str("<th>");
        out.push_str(&escape_html(column));
        out.push_str("</th>");
    }
    out.push_str("</tr>\n</thead>\n<tbody>\n");
    for row in &table.rows {
        out.push_str("<tr>");
        for cell in row {
            out.push_str("<td>");
            out.push_str(&escape_html(cell));
            out.push_str("</td>");
        }
        out.push_str("</tr>\n");
    }
    out.push_str("</tbody>\n</table>\n");
    out
}
