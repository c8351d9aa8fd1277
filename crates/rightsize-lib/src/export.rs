//! Tabular export of scan and resize results

use crate::models::{ResizeOutcome, ThresholdFlag};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

/// One utilization scan result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UtilizationRow {
    #[serde(rename = "Resource id")]
    pub resource_id: String,
    #[serde(rename = "Average CPU")]
    pub average_cpu: f64,
    #[serde(rename = "Maximum CPU")]
    pub maximum_cpu: f64,
    #[serde(rename = "Average Memory")]
    pub average_memory: f64,
    #[serde(rename = "Maximum Memory")]
    pub maximum_memory: f64,
    #[serde(rename = "Total Memory(MB)")]
    pub total_memory_mb: u64,
    #[serde(rename = "Vm Size")]
    pub vm_size: String,
    #[serde(rename = "Region")]
    pub region: String,
    #[serde(rename = "LT 50%")]
    pub below_threshold: ThresholdFlag,
}

/// One resize pass result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResizeRow {
    #[serde(rename = "Subscription Name")]
    pub subscription_name: Option<String>,
    #[serde(rename = "ResourceGroup")]
    pub resource_group: Option<String>,
    #[serde(rename = "Location")]
    pub location: Option<String>,
    #[serde(rename = "Resource id")]
    pub resource_id: String,
    #[serde(rename = "Previous Size")]
    pub previous_size: Option<String>,
    #[serde(rename = "Current Size")]
    pub current_size: String,
    #[serde(rename = "Tags")]
    pub tags: Option<String>,
    #[serde(rename = "Outcome")]
    pub outcome: ResizeOutcome,
}

/// Render tags as `key=value` pairs separated by `;`
pub fn format_tags(tags: &BTreeMap<String, String>) -> String {
    tags.iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(";")
}

/// Destination for result rows
pub trait RowSink<R> {
    fn record(&mut self, row: &R) -> Result<()>;

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// In-memory sink
impl<R: Clone> RowSink<R> for Vec<R> {
    fn record(&mut self, row: &R) -> Result<()> {
        self.push(row.clone());
        Ok(())
    }
}

/// Fan each row out to both sinks
impl<R, A: RowSink<R>, B: RowSink<R>> RowSink<R> for (A, B) {
    fn record(&mut self, row: &R) -> Result<()> {
        self.0.record(row)?;
        self.1.record(row)
    }

    fn flush(&mut self) -> Result<()> {
        self.0.flush()?;
        self.1.flush()
    }
}

/// CSV sink over any writer
pub struct CsvSink<W: Write> {
    writer: csv::Writer<W>,
    rows: usize,
}

impl CsvSink<File> {
    /// Append to `path`, writing the header only if the file is new or empty
    pub fn append(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open export file {}", path.display()))?;

        let is_empty = file
            .metadata()
            .with_context(|| format!("Failed to stat export file {}", path.display()))?
            .len()
            == 0;

        let writer = csv::WriterBuilder::new()
            .has_headers(is_empty)
            .from_writer(file);

        Ok(Self { writer, rows: 0 })
    }
}

impl<W: Write> CsvSink<W> {
    pub fn from_writer(writer: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(writer),
            rows: 0,
        }
    }

    pub fn rows_written(&self) -> usize {
        self.rows
    }

    /// Flush and return the underlying writer
    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| anyhow::anyhow!("Failed to flush CSV writer: {}", e.error()))
    }
}

impl<R: Serialize, W: Write> RowSink<R> for CsvSink<W> {
    fn record(&mut self, row: &R) -> Result<()> {
        self.writer
            .serialize(row)
            .context("Failed to write CSV row")?;
        self.rows += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush().context("Failed to flush CSV output")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utilization_row(id: &str, flag: ThresholdFlag) -> UtilizationRow {
        UtilizationRow {
            resource_id: id.to_string(),
            average_cpu: 4.5,
            maximum_cpu: 20.0,
            average_memory: 12.5,
            maximum_memory: 30.0,
            total_memory_mb: 16384,
            vm_size: "Standard_D4s_v3".to_string(),
            region: "westeurope".to_string(),
            below_threshold: flag,
        }
    }

    #[test]
    fn test_utilization_header_and_sentinel() {
        let mut sink = CsvSink::from_writer(Vec::new());
        sink.record(&utilization_row("/vm/a", ThresholdFlag::Spot))
            .unwrap();
        RowSink::<UtilizationRow>::flush(&mut sink).unwrap();

        let output = String::from_utf8(sink.into_inner().unwrap()).unwrap();
        let mut lines = output.lines();
        assert_eq!(
            lines.next().unwrap(),
            "Resource id,Average CPU,Maximum CPU,Average Memory,Maximum Memory,Total Memory(MB),Vm Size,Region,LT 50%"
        );
        assert_eq!(
            lines.next().unwrap(),
            "/vm/a,4.5,20.0,12.5,30.0,16384,Standard_D4s_v3,westeurope,SPOT"
        );
    }

    #[test]
    fn test_no_candidate_row_leaves_columns_empty() {
        let row = ResizeRow {
            subscription_name: None,
            resource_group: None,
            location: None,
            resource_id: "/vm/b".to_string(),
            previous_size: None,
            current_size: "Standard_B1s".to_string(),
            tags: None,
            outcome: ResizeOutcome::NoCandidate,
        };

        let mut sink = CsvSink::from_writer(Vec::new());
        sink.record(&row).unwrap();
        let output = String::from_utf8(sink.into_inner().unwrap()).unwrap();

        assert_eq!(output.lines().nth(1).unwrap(), ",,,/vm/b,,Standard_B1s,,no_candidate");
    }

    #[test]
    fn test_append_writes_header_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("utilization.csv");

        for id in ["/vm/a", "/vm/b"] {
            let mut sink = CsvSink::append(&path).unwrap();
            sink.record(&utilization_row(id, ThresholdFlag::True))
                .unwrap();
            RowSink::<UtilizationRow>::flush(&mut sink).unwrap();
        }

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.matches("Resource id").count(), 1);

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let rows: Vec<UtilizationRow> = reader.deserialize().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].resource_id, "/vm/b");
        assert_eq!(rows[1].below_threshold, ThresholdFlag::True);
    }

    #[test]
    fn test_tags_are_quoted() {
        let mut tags = BTreeMap::new();
        tags.insert("candidate".to_string(), "right_size".to_string());
        tags.insert("owner".to_string(), "ops, infra".to_string());
        assert_eq!(format_tags(&tags), "candidate=right_size;owner=ops, infra");

        let row = ResizeRow {
            subscription_name: Some("Production".to_string()),
            resource_group: Some("rg".to_string()),
            location: Some("westeurope".to_string()),
            resource_id: "/vm/c".to_string(),
            previous_size: Some("Standard_D4s_v3".to_string()),
            current_size: "Standard_D2s_v3".to_string(),
            tags: Some(format_tags(&tags)),
            outcome: ResizeOutcome::Resized,
        };
        let mut sink = CsvSink::from_writer(Vec::new());
        sink.record(&row).unwrap();
        let output = String::from_utf8(sink.into_inner().unwrap()).unwrap();
        assert!(output.contains("\"candidate=right_size;owner=ops, infra\""));
    }

    #[test]
    fn test_vec_sink() {
        let mut sink: Vec<UtilizationRow> = Vec::new();
        sink.record(&utilization_row("/vm/a", ThresholdFlag::False))
            .unwrap();
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_tee_sink_writes_both() {
        let mut sink = (CsvSink::from_writer(Vec::new()), Vec::<UtilizationRow>::new());
        sink.record(&utilization_row("/vm/a", ThresholdFlag::True))
            .unwrap();
        RowSink::<UtilizationRow>::flush(&mut sink).unwrap();

        assert_eq!(sink.1.len(), 1);
        assert_eq!(sink.0.rows_written(), 1);
    }
}
