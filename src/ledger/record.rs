//! Ledger rows and their CSV encoding
//!
//! ```text
//! feature_0,feature_1,...,proba_0,proba_1,...,date
//! 0.25,1,...,0.8,0.2,...,2024-03-09 17:45:02
//! ```
//!
//! Floats use Rust's shortest round-trip formatting, so a decoded row holds
//! exactly the values that were written.

use super::LedgerError;
use chrono::{DateTime, NaiveDateTime, Utc};

/// Timestamp format of the `date` column (UTC)
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const FEATURE_COLUMN: &str = "feature_";
const PROBA_COLUMN: &str = "proba_";
const DATE_COLUMN: &str = "date";

/// Shape of a ledger: how many feature and probability columns it has
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerSchema {
    pub features: usize,
    pub classes: usize,
}

impl LedgerSchema {
    pub fn header(&self) -> Vec<String> {
        let mut columns = Vec::with_capacity(self.features + self.classes + 1);
        columns.extend((0..self.features).map(|i| format!("{}{}", FEATURE_COLUMN, i)));
        columns.extend((0..self.classes).map(|i| format!("{}{}", PROBA_COLUMN, i)));
        columns.push(DATE_COLUMN.to_string());
        columns
    }

    /// Recover the schema from a header row
    pub fn from_header<'h, I>(columns: I) -> Result<Self, LedgerError>
    where
        I: IntoIterator<Item = &'h str>,
    {
        let columns: Vec<&str> = columns.into_iter().collect();
        let features = columns
            .iter()
            .take_while(|c| c.starts_with(FEATURE_COLUMN))
            .count();
        let classes = columns[features..]
            .iter()
            .take_while(|c| c.starts_with(PROBA_COLUMN))
            .count();
        let schema = LedgerSchema { features, classes };

        if columns != schema.header() {
            return Err(LedgerError::Encoding(format!(
                "unrecognised ledger header: {}",
                columns.join(",")
            )));
        }
        Ok(schema)
    }

    fn width(&self) -> usize {
        self.features + self.classes + 1
    }
}

impl std::fmt::Display for LedgerSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} features / {} classes", self.features, self.classes)
    }
}

/// One inference call: scaled inputs, predicted probabilities, when
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerRecord {
    pub features: Vec<f64>,
    pub probabilities: Vec<f64>,
    pub timestamp: DateTime<Utc>,
}

impl LedgerRecord {
    pub fn new(features: Vec<f64>, probabilities: Vec<f64>, timestamp: DateTime<Utc>) -> Self {
        LedgerRecord {
            features,
            probabilities,
            timestamp,
        }
    }

    pub fn schema(&self) -> LedgerSchema {
        LedgerSchema {
            features: self.features.len(),
            classes: self.probabilities.len(),
        }
    }

    fn to_fields(&self) -> Vec<String> {
        self.features
            .iter()
            .chain(self.probabilities.iter())
            .map(|v| v.to_string())
            .chain(std::iter::once(
                self.timestamp.format(DATE_FORMAT).to_string(),
            ))
            .collect()
    }

    fn from_fields(schema: LedgerSchema, row: &csv::StringRecord) -> Result<Self, LedgerError> {
        if row.len() != schema.width() {
            return Err(LedgerError::Encoding(format!(
                "row has {} fields, header has {}",
                row.len(),
                schema.width()
            )));
        }

        let parse = |text: &str| -> Result<f64, LedgerError> {
            text.trim()
                .parse::<f64>()
                .map_err(|e| LedgerError::Encoding(format!("bad number {:?}: {}", text, e)))
        };

        let mut features = Vec::with_capacity(schema.features);
        let mut probabilities = Vec::with_capacity(schema.classes);
        for (i, field) in row.iter().enumerate().take(schema.features + schema.classes) {
            if i < schema.features {
                features.push(parse(field)?);
            } else {
                probabilities.push(parse(field)?);
            }
        }

        let date = row.get(schema.width() - 1).unwrap_or_default();
        let timestamp = NaiveDateTime::parse_from_str(date, DATE_FORMAT)
            .map_err(|e| LedgerError::Encoding(format!("bad date {:?}: {}", date, e)))?
            .and_utc();

        Ok(LedgerRecord {
            features,
            probabilities,
            timestamp,
        })
    }
}

/// Common schema of a batch; every record must agree
pub fn batch_schema(records: &[LedgerRecord]) -> Result<Option<LedgerSchema>, LedgerError> {
    let Some(first) = records.first() else {
        return Ok(None);
    };
    let schema = first.schema();
    if let Some(other) = records.iter().map(LedgerRecord::schema).find(|s| *s != schema) {
        return Err(LedgerError::SchemaMismatch {
            key: String::new(),
            expected: schema,
            found: other,
        });
    }
    Ok(Some(schema))
}

/// Encode rows, optionally preceded by the header
pub fn encode(records: &[LedgerRecord], with_header: bool) -> Result<Vec<u8>, LedgerError> {
    let Some(schema) = batch_schema(records)? else {
        return Ok(Vec::new());
    };

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    if with_header {
        writer.write_record(schema.header())?;
    }
    for record in records {
        writer.write_record(record.to_fields())?;
    }
    writer
        .flush()
        .map_err(|e| LedgerError::Encoding(format!("failed to flush CSV buffer: {}", e)))?;
    writer
        .into_inner()
        .map_err(|e| LedgerError::Encoding(format!("failed to finish CSV buffer: {}", e)))
}

/// Schema declared by a stored ledger's header row
pub fn read_schema(data: &[u8]) -> Result<LedgerSchema, LedgerError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(data);
    let headers = reader.headers()?;
    LedgerSchema::from_header(headers.iter())
}

/// Decode a full ledger (header plus rows)
pub fn decode(data: &[u8]) -> Result<(LedgerSchema, Vec<LedgerRecord>), LedgerError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(data);
    let schema = LedgerSchema::from_header(reader.headers()?.iter())?;

    let mut records = Vec::new();
    for row in reader.records() {
        records.push(LedgerRecord::from_fields(schema, &row?)?);
    }
    Ok((schema, records))
}
