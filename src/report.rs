//! CSV report sink.
//!
//! Header: `IP`, optional `Country`, one column per list short name in
//! registry order, then the reputation columns when lookups are enabled.
//! Membership cells are `Y` or `N`.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::annotator::Record;
use crate::error::InformerError;
use crate::registry::Registry;

const REPUTATION_COLUMNS: [&str; 4] = ["KnownURLs", "MalwareSamples", "MalwareComms", "Hostnames"];

/// Receives flagged records in feed order
pub trait RecordSink {
    fn emit(&mut self, record: &Record) -> Result<()>;
}

impl RecordSink for Vec<Record> {
    fn emit(&mut self, record: &Record) -> Result<()> {
        self.push(record.clone());
        Ok(())
    }
}

/// Streaming CSV writer
pub struct CsvReport<W: Write> {
    writer: csv::Writer<W>,
    list_columns: usize,
    country: bool,
    reputation: bool,
    rows: usize,
}

impl<W: Write> CsvReport<W> {
    /// Create the report and write its header row
    pub fn new(inner: W, registry: &Registry, country: bool, reputation: bool) -> Result<Self> {
        let mut writer = csv::Writer::from_writer(inner);

        let mut header = vec!["IP"];
        if country {
            header.push("Country");
        }
        header.extend(registry.short_names());
        if reputation {
            header.extend(REPUTATION_COLUMNS);
        }
        writer
            .write_record(&header)
            .context("Failed to write report header")?;

        Ok(Self {
            writer,
            list_columns: registry.source_count(),
            country,
            reputation,
            rows: 0,
        })
    }

    /// Data rows written so far
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Flush and return the underlying writer
    pub fn finish(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| InformerError::Output(format!("failed to flush report: {}", e.error())).into())
    }

    fn row(&self, record: &Record) -> Vec<String> {
        let mut row = Vec::with_capacity(2 + self.list_columns + REPUTATION_COLUMNS.len());
        row.push(record.ip.clone());

        if self.country {
            row.push(record.country.clone().unwrap_or_default());
        }

        row.extend((0..self.list_columns).map(|i| {
            if record.membership.get(i) { "Y" } else { "N" }.to_string()
        }));

        if self.reputation {
            match &record.reputation {
                Some(rep) => {
                    row.push(match rep.has_known_malicious_urls {
                        Some(true) => "Y".to_string(),
                        Some(false) => "N".to_string(),
                        None => String::new(),
                    });
                    row.push(optional_count(rep.malware_sample_count));
                    row.push(optional_count(rep.malware_communication_count));
                    row.push(rep.associated_hostnames.clone().unwrap_or_default());
                }
                None => row.extend(std::iter::repeat(String::new()).take(REPUTATION_COLUMNS.len())),
            }
        }

        row
    }
}

impl<W: Write> RecordSink for CsvReport<W> {
    fn emit(&mut self, record: &Record) -> Result<()> {
        let row = self.row(record);
        self.writer
            .write_record(&row)
            .map_err(|e| InformerError::Output(format!("failed to write row for {}: {}", record.ip, e)))?;
        self.rows += 1;
        Ok(())
    }
}

fn optional_count(count: Option<usize>) -> String {
    count.map(|c| c.to_string()).unwrap_or_default()
}

/// Create the report destination; `-` writes to standard output
pub fn create_output(path: &Path) -> Result<Box<dyn Write + Send>> {
    if path == Path::new("-") {
        return Ok(Box::new(io::stdout()));
    }
    let file = File::create(path)
        .map_err(|e| InformerError::Output(format!("unable to create {:?} ({})", path, e)))?;
    Ok(Box::new(BufWriter::new(file)))
}
