use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use rnsnow_link::LinkEvent;
use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// Print a flat record: one JSON line, a two-column table or `key=value` lines.
pub fn print_record<T: Serialize>(title: &str, value: &T, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec![title.to_uppercase(), "VALUE".to_string()]);
            for (key, value) in fields(value) {
                table.add_row(vec![key, render(&value)]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("{title}");
            for (key, value) in fields(value) {
                println!("  {key}={}", render(&value));
            }
        }
    }
}

/// Print a bridge event on one line.
pub fn print_event(event: &LinkEvent, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table | OutputFormat::Pretty => println!("{}", describe_event(event)),
    }
}

/// `event_name key=value ...` for logs and terminals.
pub fn describe_event(event: &LinkEvent) -> String {
    let mut fields = fields(event);
    let name = fields
        .iter()
        .position(|(key, _)| key == "event")
        .map(|i| render(&fields.remove(i).1))
        .unwrap_or_default();
    let rest: Vec<String> = fields
        .into_iter()
        .map(|(key, value)| format!("{key}={}", render(&value)))
        .collect();
    if rest.is_empty() {
        name
    } else {
        format!("{name} {}", rest.join(" "))
    }
}

fn fields<T: Serialize>(value: &T) -> Vec<(String, Value)> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => map.into_iter().collect(),
        Ok(other) => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            map.into_iter().collect()
        }
        Err(_) => Vec::new(),
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "-".to_string(),
        other => other.to_string(),
    }
}
