use std::io::IsTerminal;
use std::time::{SystemTime, UNIX_EPOCH};

use bitsipc_client::StatsSnapshot;
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use serde_json::Value;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
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

#[derive(Serialize)]
struct EventOutput<'a> {
    kind: &'static str,
    event: &'a str,
    params: &'a [Value],
    timestamp: String,
}

#[derive(Serialize)]
struct ResultOutput<'a> {
    kind: &'static str,
    event: &'a str,
    result: &'a Value,
    timestamp: String,
}

/// Print an event routed to this process by the message center.
pub fn print_event(event: &str, params: &[Value], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = EventOutput {
                kind: "event",
                event,
                params,
                timestamp: now_unix_seconds(),
            };
            print_json_line(&out);
        }
        OutputFormat::Table => {
            let mut table = new_table(vec!["EVENT", "PARAMS"]);
            table.add_row(vec![event.to_string(), compact(&Value::from(params.to_vec()))]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let rendered: Vec<String> = params.iter().map(compact).collect();
            println!("event {event} ({})", rendered.join(", "));
        }
    }
}

/// Print the value a request resolved to.
pub fn print_result(event: &str, result: &Value, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = ResultOutput {
                kind: "response",
                event,
                result,
                timestamp: now_unix_seconds(),
            };
            print_json_line(&out);
        }
        OutputFormat::Table => {
            let mut table = new_table(vec!["REQUEST", "RESULT"]);
            table.add_row(vec![event.to_string(), compact(result)]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("{event} -> {}", compact(result));
        }
    }
}

/// Print dispatch counters collected over a session.
pub fn print_stats(stats: &StatsSnapshot, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json_line(stats),
        OutputFormat::Table => {
            let mut table = new_table(vec!["COUNTER", "VALUE"]);
            for (name, value) in stats_rows(stats) {
                table.add_row(vec![name.to_string(), value.to_string()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let rendered: Vec<String> = stats_rows(stats)
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect();
            println!("stats {}", rendered.join(" "));
        }
    }
}

fn stats_rows(stats: &StatsSnapshot) -> [(&'static str, u64); 9] {
    [
        ("events_dispatched", stats.events_dispatched),
        ("requests_handled", stats.requests_handled),
        ("responses_delivered", stats.responses_delivered),
        ("parse_errors", stats.parse_errors),
        ("oversized_frames", stats.oversized_frames),
        ("unmatched_responses", stats.unmatched_responses),
        ("unhandled_requests", stats.unhandled_requests),
        ("ignored_messages", stats.ignored_messages),
        ("callback_panics", stats.callback_panics),
    ]
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

fn print_json_line<T: Serialize + ?Sized>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn compact(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
