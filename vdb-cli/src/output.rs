use clap::ValueEnum;
use serde_json::json;
use tabled::settings::Style;
use tabled::{Table, Tabled};
use vdb::vector::payload_summary;
use vdb::{QueryResult, TableMeta, TableStats, VectorRecord};

/// Output format for CLI results.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table.
    Table,
    /// JSON output.
    Json,
}

fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(_) => println!("{value}"),
    }
}

/// Print knn results.
pub fn print_results(results: &[QueryResult], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&json!(results)),
        OutputFormat::Table => {
            if results.is_empty() {
                println!("No results found.");
                return;
            }
            let rows: Vec<ResultRow> = results
                .iter()
                .map(|r| ResultRow {
                    id: r.id,
                    distance: format!("{:.6}", r.distance),
                    payload: payload_summary(r.payload.as_deref()),
                })
                .collect();
            println!("{}", Table::new(&rows).with(Style::rounded()));
        }
    }
}

pub fn print_record(record: &VectorRecord, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&json!({
            "id": record.id,
            "vector": record.vector,
            "payload": payload_summary(record.payload.as_deref()),
        })),
        OutputFormat::Table => {
            let row = RecordRow {
                id: record.id,
                dimension: record.vector.len(),
                vector: format_vector(&record.vector),
                payload: payload_summary(record.payload.as_deref()),
            };
            println!("{}", Table::new([row]).with(Style::rounded()));
        }
    }
}

pub fn print_tables(names: &[String], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&json!(names)),
        OutputFormat::Table => {
            if names.is_empty() {
                println!("No tables.");
            }
            for name in names {
                println!("{name}");
            }
        }
    }
}

pub fn print_meta(meta: &TableMeta, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&json!(meta)),
        OutputFormat::Table => println!(
            "Table '{}' created ({}, {} index).",
            meta.name,
            meta.metric,
            meta.index.kind()
        ),
    }
}

/// Print table statistics.
pub fn print_stats(stats: &TableStats, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&json!(stats)),
        OutputFormat::Table => {
            let dimension = stats
                .dimension
                .map(|d| d.to_string())
                .unwrap_or_else(|| "-".to_string());
            let rows = vec![
                StatRow::new("Table", &stats.name),
                StatRow::new("Dimension", dimension),
                StatRow::new("Metric", stats.metric),
                StatRow::new("Index", stats.index),
                StatRow::new("Records", stats.records),
                StatRow::new("Indexed", stats.indexed),
                StatRow::new("Next id", stats.next_id),
                StatRow::new("Log seq", stats.log_seq),
                StatRow::new("Log bytes", stats.log_bytes),
                StatRow::new("Created", stats.created_at.to_rfc3339()),
            ];
            println!("{}", Table::new(&rows).with(Style::rounded()));
        }
    }
}

#[derive(Tabled)]
struct ResultRow {
    #[tabled(rename = "ID")]
    id: u64,
    #[tabled(rename = "Distance")]
    distance: String,
    #[tabled(rename = "Payload")]
    payload: String,
}

#[derive(Tabled)]
struct RecordRow {
    #[tabled(rename = "ID")]
    id: u64,
    #[tabled(rename = "Dim")]
    dimension: usize,
    #[tabled(rename = "Vector")]
    vector: String,
    #[tabled(rename = "Payload")]
    payload: String,
}

#[derive(Tabled)]
struct StatRow {
    #[tabled(rename = "Stat")]
    name: &'static str,
    #[tabled(rename = "Value")]
    value: String,
}

impl StatRow {
    fn new(name: &'static str, value: impl ToString) -> Self {
        Self {
            name,
            value: value.to_string(),
        }
    }
}

/// Show at most eight components.
fn format_vector(vector: &[f32]) -> String {
    let shown: Vec<String> = vector.iter().take(8).map(|x| format!("{x:.4}")).collect();
    if vector.len() > 8 {
        format!("[{}, ...]", shown.join(", "))
    } else {
        format!("[{}]", shown.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_vector_truncates() {
        assert_eq!(format_vector(&[1.0, 0.5]), "[1.0000, 0.5000]");
        let long = vec![0.0; 10];
        assert!(format_vector(&long).ends_with(", ...]"));
    }
}
