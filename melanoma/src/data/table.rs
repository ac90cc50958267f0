use std::{fmt, path::Path, str::FromStr};

use csv::StringRecord;
use log::info;

use crate::{PipelineErr, Result};

const IMAGE_COLUMN: &str = "image_name";
const TARGET_COLUMN: &str = "target";

/// The binary class of a lesion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Label {
    Benign,
    Malignant,
}

impl Label {
    /// The label as it appears in the tables.
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Benign => "0",
            Label::Malignant => "1",
        }
    }

    /// The training target of this label.
    pub fn value(&self) -> f32 {
        match self {
            Label::Benign => 0.,
            Label::Malignant => 1.,
        }
    }
}

impl FromStr for Label {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            "0" => Ok(Label::Benign),
            "1" => Ok(Label::Malignant),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A row of a metadata table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub image_name: String,
    pub target: Option<Label>,
}

/// Reads a table with `image_name` and `target` columns, ignoring any other column.
pub fn read_labeled<P: AsRef<Path>>(path: P) -> Result<Vec<Record>> {
    read(path.as_ref(), true)
}

/// Reads a table with an `image_name` column, ignoring any other column.
pub fn read_unlabeled<P: AsRef<Path>>(path: P) -> Result<Vec<Record>> {
    read(path.as_ref(), false)
}

/// The first `n` rows of a table.
pub fn head(records: &[Record], n: usize) -> &[Record] {
    &records[..n.min(records.len())]
}

/// Logs the size and first rows of a loaded table.
pub fn log_head(name: &str, records: &[Record]) {
    info!(table = name, rows = records.len(); "loaded table");
    for record in head(records, 5) {
        let target = record.target.map_or("-", |t| t.as_str());
        info!("  {}  {}", record.image_name, target);
    }
}

fn read(path: &Path, labeled: bool) -> Result<Vec<Record>> {
    let csv_err = |source| PipelineErr::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::Reader::from_path(path).map_err(csv_err)?;
    let headers = reader.headers().map_err(csv_err)?.clone();
    let image_idx = column(path, &headers, IMAGE_COLUMN)?;
    let target_idx = labeled
        .then(|| column(path, &headers, TARGET_COLUMN))
        .transpose()?;

    let mut records = Vec::new();
    for (row, result) in reader.records().enumerate() {
        let fields = result.map_err(csv_err)?;
        let image_name = fields.get(image_idx).unwrap_or_default().to_string();

        let target = match target_idx {
            Some(idx) => {
                let raw = fields.get(idx).unwrap_or_default();
                let label = raw.parse().map_err(|_| PipelineErr::UnknownLabel {
                    path: path.to_path_buf(),
                    row,
                    label: raw.to_string(),
                })?;
                Some(label)
            }
            None => None,
        };

        records.push(Record { image_name, target });
    }

    Ok(records)
}

fn column(path: &Path, headers: &StringRecord, name: &'static str) -> Result<usize> {
    headers
        .iter()
        .position(|h| h.trim() == name)
        .ok_or_else(|| PipelineErr::MissingColumn {
            path: path.to_path_buf(),
            column: name,
        })
}
