use anyhow::{Context, Result};
use coql_core::{QueryResponse, TableModel, ViewState};
use colored::*;
use pulldown_cmark::{Event as MdEvent, Options, Parser as MdParser, Tag};
use std::fmt::Write as _;

/// Renders the visible region of `state` for the terminal
pub fn render_view(state: &ViewState) -> String {
    let mut output = String::new();
    match state {
        ViewState::Idle => {}
        ViewState::Loading => {
            let _ = writeln!(output, "{}", "Processing your query...".dimmed());
        }
        ViewState::Results(response) => render_results(&mut output, response),
        ViewState::Error(message) => {
            let _ = writeln!(output, "{} {}", "Error:".red().bold(), message.red());
        }
    }
    output
}

fn render_results(output: &mut String, response: &QueryResponse) {
    let _ = writeln!(output, "{}", "Generated COQL Query".cyan().bold());
    let _ = writeln!(output, "{}", response.query.coql.bright_white());
    output.push('\n');

    let _ = writeln!(output, "{}", "Analysis".cyan().bold());
    let _ = writeln!(output, "{}", response.analysis.narrative);
    output.push('\n');

    let _ = writeln!(output, "{}", "Results".cyan().bold());
    let analysis = &response.analysis;
    let table = analysis
        .table
        .as_ref()
        .filter(|table| !table.columns.is_empty());
    if !analysis.tabular_markdown.trim().is_empty() {
        output.push_str(&render_markdown(&analysis.tabular_markdown));
    } else if let Some(table) = table {
        output.push_str(&render_table(table));
    } else if !analysis.tabular.is_empty() {
        let _ = writeln!(
            output,
            "{}",
            "(tabular view is only available as HTML, use --json to see it)".dimmed()
        );
    }
}

/// Renders markdown for the terminal; tables are laid out by `render_table`
pub fn render_markdown(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    let parser = MdParser::new_ext(markdown, options);

    let mut output = String::new();
    let mut table: Option<TableModel> = None;
    let mut current_row: Vec<String> = Vec::new();

    for event in parser {
        match event {
            MdEvent::Start(Tag::Table(_)) => table = Some(TableModel::default()),
            MdEvent::End(Tag::Table(_)) => {
                if let Some(table) = table.take() {
                    output.push_str(&render_table(&table));
                }
            }
            MdEvent::Start(Tag::TableHead) | MdEvent::Start(Tag::TableRow) => current_row.clear(),
            // Header cells are not wrapped in a row
            MdEvent::End(Tag::TableHead) => {
                if let Some(table) = table.as_mut() {
                    table.columns = std::mem::take(&mut current_row);
                }
            }
            MdEvent::End(Tag::TableRow) => {
                if let Some(table) = table.as_mut() {
                    table.rows.push(std::mem::take(&mut current_row));
                }
            }
            MdEvent::Start(Tag::TableCell) => current_row.push(String::new()),
            MdEvent::Text(text) | MdEvent::Code(text) | MdEvent::Html(text) => {
                if table.is_none() {
                    output.push_str(&text);
                } else if let Some(cell) = current_row.last_mut() {
                    cell.push_str(&text);
                }
            }
            MdEvent::SoftBreak => output.push(' '),
            MdEvent::HardBreak
            | MdEvent::End(Tag::Paragraph)
            | MdEvent::End(Tag::Heading(..))
            | MdEvent::End(Tag::Item) => output.push('\n'),
            _ => {}
        }
    }
    output
}

/// Aligns columns to the widest cell, header in bold with a rule beneath
pub fn render_table(table: &TableModel) -> String {
    let mut col_widths: Vec<usize> = table.columns.iter().map(|c| c.chars().count()).collect();
    for row in &table.rows {
        for (i, cell) in row.iter().enumerate() {
            if i < col_widths.len() {
                col_widths[i] = col_widths[i].max(cell.chars().count());
            }
        }
    }

    let mut output = String::new();
    for (j, column) in table.columns.iter().enumerate() {
        let padding = col_widths[j].saturating_sub(column.chars().count());
        let _ = write!(output, "{}{} ", column.bold(), " ".repeat(padding));
    }
    output.push('\n');

    let rule: Vec<String> = col_widths
        .iter()
        .map(|width| "─".repeat(*width).dimmed().to_string())
        .collect();
    output.push_str(&rule.join(" "));
    output.push('\n');

    for row in &table.rows {
        for (j, width) in col_widths.iter().enumerate() {
            let cell = row.get(j).map(String::as_str).unwrap_or_default();
            let padding = width.saturating_sub(cell.chars().count());
            let _ = write!(output, "{}{} ", cell, " ".repeat(padding));
        }
        output.push('\n');
    }
    output
}

pub fn print_json(response: &QueryResponse) -> Result<()> {
    let body = serde_json::to_string_pretty(response).context("Failed to serialize response")?;
    println!("{}", body);
    Ok(())
}

/// Show usage instructions when no prompt or action is provided
pub fn print_usage_instructions() {
    println!("{}", "Usage:".yellow().bold());
    println!("  {}", "coql-cli \"your question\"".green().bold());
    println!("    Send a single query to the server");
    println!();
    println!("  {}", "coql-cli -i".green().bold());
    println!("    Start an interactive session");
    println!();
    println!("{}", "Options:".cyan());
    println!("  --server-url <URL>  Query server base URL");
    println!("  --json              Print the response body as JSON");
    println!("  --config <PATH>     Config file");
    println!("  --help              Show this help message");
    println!();
}
