//! Output formatting utilities for starctl
//!
//! Supports multiple output formats:
//! - Table: ASCII tables with borders (default)
//! - JSON: Machine-readable JSON
//! - Text: Plain text, one item per line

use anyhow::Result;
use clap::ValueEnum;
use serde::Serialize;
use starhouse_core::{Record, Value};
use tabled::builder::Builder;
use tabled::settings::{object::Rows, Alignment, Modify, Style};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
    Text,
}

/// Renders command output in the configured format.
pub struct Formatter {
    format: OutputFormat,
}

impl Formatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Render records with `columns` in order.
    pub fn records(&self, columns: &[String], records: &[Record]) -> Result<String> {
        match self.format {
            OutputFormat::Table => {
                if records.is_empty() {
                    return Ok("No records found".to_string());
                }
                let mut builder = Builder::default();
                builder.push_record(columns.iter().cloned());
                for record in records {
                    builder.push_record(columns.iter().map(|c| cell(record.get(c))));
                }
                Ok(styled(builder))
            }
            OutputFormat::Json => Ok(serde_json::to_string_pretty(records)?),
            OutputFormat::Text => Ok(records
                .iter()
                .map(|record| {
                    columns
                        .iter()
                        .map(|c| format!("{c}={}", cell(record.get(c))))
                        .collect::<Vec<_>>()
                        .join(" ")
                })
                .collect::<Vec<_>>()
                .join("\n")),
        }
    }

    /// Render ordered key/value pairs, such as catalog properties.
    pub fn pairs(&self, pairs: &[(String, String)]) -> Result<String> {
        match self.format {
            OutputFormat::Table => {
                let mut builder = Builder::default();
                builder.push_record(["property", "value"]);
                for (key, value) in pairs {
                    builder.push_record([key.as_str(), value.as_str()]);
                }
                Ok(styled(builder))
            }
            OutputFormat::Json => {
                let map: serde_json::Map<String, serde_json::Value> = pairs
                    .iter()
                    .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
                    .collect();
                Ok(serde_json::to_string_pretty(&map)?)
            }
            OutputFormat::Text => Ok(pairs
                .iter()
                .map(|(k, v)| format!("{k}: {v}"))
                .collect::<Vec<_>>()
                .join("\n")),
        }
    }

    /// Render a report: JSON when asked for, its `Display` form otherwise.
    pub fn report<T: Serialize + std::fmt::Display>(&self, report: &T) -> Result<String> {
        match self.format {
            OutputFormat::Json => Ok(serde_json::to_string_pretty(report)?),
            OutputFormat::Table | OutputFormat::Text => Ok(report.to_string()),
        }
    }
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(v) => v.to_string(),
    }
}

fn styled(builder: Builder) -> String {
    let mut table = builder.build();
    table
        .with(Style::rounded())
        .with(Modify::new(Rows::first()).with(Alignment::center()));
    table.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns() -> Vec<String> {
        vec!["pk".to_string(), "name".to_string(), "magnitude".to_string()]
    }

    fn records() -> Vec<Record> {
        vec![
            Record::new()
                .with("pk", 1)
                .with("name", "Sirius")
                .with("magnitude", -1.44),
            Record::new()
                .with("pk", 2)
                .with("name", Value::Null)
                .with("magnitude", 0.5),
        ]
    }

    #[test]
    fn test_table_format() {
        let out = Formatter::new(OutputFormat::Table)
            .records(&columns(), &records())
            .unwrap();
        assert!(out.contains("magnitude"));
        assert!(out.contains("Sirius"));
        assert!(out.contains("-1.44"));
        assert!(!out.contains("null"));
    }

    #[test]
    fn test_empty_table() {
        let out = Formatter::new(OutputFormat::Table)
            .records(&columns(), &[])
            .unwrap();
        assert_eq!(out, "No records found");
    }

    #[test]
    fn test_json_format() {
        let out = Formatter::new(OutputFormat::Json)
            .records(&columns(), &records())
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed[0]["name"], "Sirius");
        assert_eq!(parsed[1]["name"], serde_json::Value::Null);
        assert_eq!(parsed[1]["pk"], 2);
    }

    #[test]
    fn test_text_format() {
        let out = Formatter::new(OutputFormat::Text)
            .records(&columns(), &records())
            .unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "pk=1 name=Sirius magnitude=-1.44");
        assert_eq!(lines[1], "pk=2 name= magnitude=0.5");
    }

    #[test]
    fn test_pairs() {
        let pairs = vec![
            ("records".to_string(), "16".to_string()),
            ("resolution".to_string(), "8".to_string()),
        ];
        let text = Formatter::new(OutputFormat::Text).pairs(&pairs).unwrap();
        assert_eq!(text, "records: 16\nresolution: 8");

        let json = Formatter::new(OutputFormat::Json).pairs(&pairs).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["records"], "16");

        let table = Formatter::new(OutputFormat::Table).pairs(&pairs).unwrap();
        assert!(table.contains("property"));
        assert!(table.contains("resolution"));
    }
}
