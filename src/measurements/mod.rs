//! Tabular measurement files.
//!
//! A measurement file is tab-separated with a header row. Four columns are
//! required (protein accession, modified sequence, p-value and a numeric
//! value); their header names come from [`ColumnNames`] and are matched
//! case-insensitively, in any order. Extra columns are ignored.
//!
//! ```text
//! accession        modified_sequence    p_value   value
//! P06213;P06213-2  _S(ph)PEPTIDE_       0.001     2.5
//! ```
//!
//! Protein groups list several accessions separated by `;`; the first one is
//! used.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tracing::{debug, info, warn};

use crate::config::ColumnNames;
use crate::model::*;
use crate::storage::StorageBackend;
use crate::tx::TxMode;
use crate::{Error, Result};

/// One measured peptide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementRecord {
    pub modified_sequence: String,
    pub p_value: f64,
    pub value: f64,
}

/// Measurements grouped by protein accession.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeasurementTable {
    records: BTreeMap<String, SmallVec<[MeasurementRecord; 4]>>,
}

/// Column positions resolved from the header row.
struct ColumnIndex {
    accession: usize,
    modified_sequence: usize,
    p_value: usize,
    value: usize,
}

impl ColumnIndex {
    fn resolve(headers: &csv::StringRecord, names: &ColumnNames) -> Result<Self> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
                .ok_or_else(|| Error::DataFile(format!("missing required column '{name}'")))
        };
        Ok(Self {
            accession: find(&names.accession)?,
            modified_sequence: find(&names.modified_sequence)?,
            p_value: find(&names.p_value)?,
            value: find(&names.value)?,
        })
    }
}

impl MeasurementTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a measurement file from disk.
    pub fn from_path(path: impl AsRef<Path>, columns: &ColumnNames) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| {
            Error::DataFile(format!("cannot open measurement file {}: {e}", path.display()))
        })?;
        let table = Self::from_reader(file, columns)?;
        info!(
            path = %path.display(),
            proteins = table.len(),
            measurements = table.measurement_count(),
            "measurement file loaded"
        );
        Ok(table)
    }

    pub fn from_reader<R: Read>(reader: R, columns: &ColumnNames) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .trim(csv::Trim::All)
            .from_reader(reader);
        let index = ColumnIndex::resolve(reader.headers()?, columns)?;

        let mut table = Self::new();
        for record in reader.records() {
            let record = record?;
            let row = record.position().map_or(0, |p| p.line());
            let cell = |i: usize, name: &str| {
                record.get(i).ok_or_else(|| {
                    Error::DataFile(format!("row {row}: missing value for column '{name}'"))
                })
            };
            let number = |i: usize, name: &str| -> Result<f64> {
                let raw = cell(i, name)?;
                match raw.parse::<f64>() {
                    Ok(v) if v.is_finite() => Ok(v),
                    _ => Err(Error::DataFile(format!(
                        "row {row}: column '{name}' is not a finite number: '{raw}'"
                    ))),
                }
            };
            let p_value = number(index.p_value, &columns.p_value)?;
            if !(0.0..=1.0).contains(&p_value) {
                return Err(Error::DataFile(format!(
                    "row {row}: column '{}' must lie in [0, 1], got {p_value}",
                    columns.p_value
                )));
            }

            let accession = cell(index.accession, &columns.accession)?
                .split(';')
                .next()
                .map(str::trim)
                .unwrap_or_default();
            if accession.is_empty() {
                return Err(Error::DataFile(format!("row {row}: empty accession")));
            }
            table.push(
                accession,
                MeasurementRecord {
                    modified_sequence: cell(index.modified_sequence, &columns.modified_sequence)?
                        .to_owned(),
                    p_value,
                    value: number(index.value, &columns.value)?,
                },
            );
        }
        Ok(table)
    }

    pub fn push(&mut self, accession: impl Into<String>, record: MeasurementRecord) {
        self.records.entry(accession.into()).or_default().push(record);
    }

    /// Number of distinct accessions.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Total number of measurement rows.
    pub fn measurement_count(&self) -> usize {
        self.records.values().map(|r| r.len()).sum()
    }

    pub fn get(&self, accession: &str) -> Option<&[MeasurementRecord]> {
        self.records.get(accession).map(|r| r.as_slice())
    }

    /// Accessions in ascending order.
    pub fn accessions(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[MeasurementRecord])> {
        self.records.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Copy of the table keeping only accessions accepted by `keep`.
    pub fn restrict_to(&self, keep: impl Fn(&str) -> bool) -> Self {
        Self {
            records: self
                .records
                .iter()
                .filter(|(acc, _)| keep(acc))
                .map(|(acc, r)| (acc.clone(), r.clone()))
                .collect(),
        }
    }
}

/// Summary of one per-protein measurement.
pub fn summarize(records: &[MeasurementRecord], threshold: f64) -> Option<Measurement> {
    if records.is_empty() {
        return None;
    }
    let mean = records.iter().map(|r| r.value).sum::<f64>() / records.len() as f64;
    let min_p = records.iter().map(|r| r.p_value).fold(f64::INFINITY, f64::min);
    Some(Measurement {
        abundance: Some(mean),
        support: Some(records.len() as f64),
        p_value: Some(min_p),
        significant: Some(min_p < threshold),
    })
}

// ============================================================================
// Annotation
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotationSummary {
    pub experiment: String,
    /// Proteins that received measurements.
    pub annotated: usize,
    /// Annotated proteins flagged significant.
    pub significant: usize,
    /// Accessions with no matching protein, ascending.
    pub unmatched: Vec<String>,
}

/// Write per-protein measurement summaries for `experiment`:
/// abundance = mean value, support = number of rows, pValue = smallest
/// p-value, significant = pValue below `threshold`.
///
/// All writes go through one transaction. Proteins marked deleted are
/// treated as unmatched.
pub async fn annotate_measurements<B: StorageBackend>(
    backend: &B,
    table: &MeasurementTable,
    experiment: &str,
    threshold: f64,
) -> Result<AnnotationSummary> {
    let mut tx = backend.begin_tx(TxMode::ReadWrite).await?;
    let result = async {
        let mut summary = AnnotationSummary {
            experiment: experiment.to_owned(),
            ..Default::default()
        };
        let mut writes = Vec::new();
        for (accession, records) in table.iter() {
            let node = backend
                .find_node(&tx, NodeKind::Protein, ACCESSION_KEY, &Value::from(accession))
                .await?
                .filter(|n| n.status() != NodeStatus::Deleted);
            let (Some(node), Some(m)) = (node, summarize(records, threshold)) else {
                summary.unmatched.push(accession.to_owned());
                continue;
            };
            summary.annotated += 1;
            summary.significant += usize::from(m.significant == Some(true));
            writes.extend(m.to_properties(experiment).into_iter().map(|(k, v)| (node.id, k, v)));
        }
        backend.set_node_properties_batch(&mut tx, writes).await?;
        Ok::<_, Error>(summary)
    }
    .await;

    let summary = match result {
        Ok(summary) => {
            backend.commit_tx(tx).await?;
            summary
        }
        Err(e) => {
            backend.rollback_tx(tx).await?;
            return Err(e);
        }
    };

    if !summary.unmatched.is_empty() {
        warn!(
            experiment,
            unmatched = summary.unmatched.len(),
            "accessions without a matching protein"
        );
        debug!(accessions = ?summary.unmatched, "unmatched accessions");
    }
    info!(
        experiment,
        annotated = summary.annotated,
        significant = summary.significant,
        "measurements annotated"
    );
    Ok(summary)
}
