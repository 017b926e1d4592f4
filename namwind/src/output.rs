//! CSV files written and read by the two stages.

use crate::wind::OutputRow;
use anyhow::{bail, Context, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

const URL_COLUMN: &str = "url_paths";

pub const OUTPUT_COLUMNS: [&str; 9] = [
    "time",
    "lat",
    "lon",
    "dist_to_pnt_interest",
    "pressure_height",
    "u",
    "v",
    "wnd_spd",
    "wnd_dir",
];

/// Write the URL list as a single column CSV.
pub fn write_url_list(path: &Path, urls: &[String]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    writer.write_record([URL_COLUMN])?;
    for url in urls {
        writer.write_record([url])?;
    }
    writer.flush()?;
    Ok(())
}

pub fn read_url_list(path: &Path) -> Result<Vec<String>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open URL list {}", path.display()))?;

    let column = match reader.headers()?.iter().position(|h| h == URL_COLUMN) {
        Some(column) => column,
        None => bail!("{} has no {} column", path.display(), URL_COLUMN),
    };

    let mut urls = Vec::new();
    for record in reader.records() {
        let record = record?;
        if let Some(url) = record.get(column).map(str::trim).filter(|u| !u.is_empty()) {
            urls.push(url.to_string());
        }
    }
    Ok(urls)
}

/// Gzip compressed CSV of output rows.
pub struct RowWriter {
    writer: csv::Writer<GzEncoder<BufWriter<File>>>,
    rows: usize,
}

impl RowWriter {
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
        let encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(encoder);
        writer.write_record(OUTPUT_COLUMNS)?;
        Ok(Self { writer, rows: 0 })
    }

    pub fn write_rows(&mut self, rows: &[OutputRow]) -> Result<()> {
        for row in rows {
            self.writer.serialize(row)?;
        }
        self.rows += rows.len();
        Ok(())
    }

    /// Flush and close the gzip stream. Returns the number of rows written.
    pub fn finish(self) -> Result<usize> {
        let encoder = self
            .writer
            .into_inner()
            .map_err(|e| anyhow::anyhow!("Failed to flush CSV: {}", e.error()))?;
        let mut inner = encoder.finish()?;
        std::io::Write::flush(&mut inner)?;
        Ok(self.rows)
    }
}
