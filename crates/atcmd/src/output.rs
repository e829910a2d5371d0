use std::io::{IsTerminal, Write};

use atcmd::template::{Captures, Value};
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
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

/// One expected response and what it captured.
#[derive(Debug, Serialize)]
pub struct ResponseOutput {
    pub template: String,
    pub captures: Captures,
}

/// Result of a `send` session.
#[derive(Debug, Serialize)]
pub struct SessionOutput {
    pub command: String,
    pub responses: Vec<ResponseOutput>,
    pub oob: Vec<String>,
}

pub fn print_session(session: &SessionOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(session).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["TEMPLATE", "INDEX", "KIND", "VALUE"]);
            for response in &session.responses {
                for (index, value) in response.captures.iter().enumerate() {
                    table.add_row(vec![
                        escape(&response.template),
                        index.to_string(),
                        value.kind().to_string(),
                        value.to_string(),
                    ]);
                }
            }
            for prefix in &session.oob {
                table.add_row(vec![escape(prefix), "-".to_string(), "oob".to_string(), String::new()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("> {}", escape(&session.command));
            for response in &session.responses {
                println!(
                    "< {} => [{}]",
                    escape(&response.template),
                    join_values(response.captures.values())
                );
            }
            for prefix in &session.oob {
                println!("! {}", escape(prefix));
            }
        }
        OutputFormat::Raw => {
            let mut data = Vec::new();
            for value in session.responses.iter().flat_map(|r| r.captures.iter()) {
                data.extend_from_slice(value.to_string().as_bytes());
                data.push(b'\n');
            }
            print_raw(&data);
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn join_values(values: &[Value]) -> String {
    values
        .iter()
        .map(|v| match v {
            Value::Str(s) => format!("{s:?}"),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn escape(text: &str) -> String {
    text.as_bytes().escape_ascii().to_string()
}
