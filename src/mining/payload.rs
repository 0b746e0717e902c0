//! Tagged payload shapes and whitelist projection.
//!
//! Endpoints return either a list of objects (most resources) or one object
//! (`/license`, `/community/profile`). Downstream code matches on an explicit
//! tag instead of inspecting runtime types, and hard-failed repositories are
//! recorded as [`RecordSet::Empty`] so "no data" stays distinct from "not
//! attempted".

use serde::de::Error as _;
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

const LOG_TARGET: &str = "   payload";

/// One projected item: a JSON object reduced to whitelisted fields.
pub type Record = Map<String, Value>;

/// A fetched payload in one of its two legal shapes, or nothing.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordSet {
    /// A list-typed payload.
    Collection(Vec<Record>),
    /// A single-object payload.
    Singleton(Record),
    /// No data for this repository.
    Empty,
}

impl RecordSet {
    /// Classify a raw JSON body into its tagged shape.
    ///
    /// A body that is neither list nor object is a data-integrity error:
    /// logged and treated as no data, never a crash. Non-object items inside
    /// a list are skipped individually, also logged.
    #[must_use]
    pub fn classify(value: Value, context: &str) -> Self {
        match value {
            Value::Array(items) => {
                let mut records = Vec::with_capacity(items.len());
                for item in items {
                    if let Value::Object(record) = item {
                        records.push(record);
                    } else {
                        log::warn!(target: LOG_TARGET, "Skipping non-object item in {context}");
                    }
                }
                Self::Collection(records)
            }
            Value::Object(record) => Self::Singleton(record),
            Value::Null => Self::Empty,
            _ => {
                log::warn!(target: LOG_TARGET, "Expected a list or object for {context}; treating as no data");
                Self::Empty
            }
        }
    }

    /// Reduce every record to the whitelisted fields. An empty whitelist
    /// passes the data through unprojected.
    #[must_use]
    pub fn project<S: AsRef<str>>(self, fields: &[S]) -> Self {
        if fields.is_empty() {
            return self;
        }

        match self {
            Self::Collection(records) => Self::Collection(records.iter().map(|record| project_record(record, fields)).collect()),
            Self::Singleton(record) => Self::Singleton(project_record(&record, fields)),
            Self::Empty => Self::Empty,
        }
    }

    /// Number of records carried.
    #[must_use]
    pub fn record_count(&self) -> usize {
        match self {
            Self::Collection(records) => records.len(),
            Self::Singleton(_) => 1,
            Self::Empty => 0,
        }
    }

    /// Whether this set carries no records. An empty collection and `Empty`
    /// are equivalent here.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.record_count() == 0
    }

    /// The records as a slice; a singleton exposes itself as one element.
    #[must_use]
    pub fn records(&self) -> &[Record] {
        match self {
            Self::Collection(records) => records,
            Self::Singleton(record) => core::slice::from_ref(record),
            Self::Empty => &[],
        }
    }

    /// Consume into a flat record list.
    #[must_use]
    pub fn into_records(self) -> Vec<Record> {
        match self {
            Self::Collection(records) => records,
            Self::Singleton(record) => vec![record],
            Self::Empty => Vec::new(),
        }
    }
}

/// Project one raw object onto a field whitelist.
///
/// The output's key set is exactly the whitelist; fields absent from the
/// source appear as `null`. Never fails on a missing field, and running the
/// projection twice yields the same record.
#[must_use]
pub fn project_record<S: AsRef<str>>(record: &Record, fields: &[S]) -> Record {
    if fields.is_empty() {
        return record.clone();
    }

    let mut projected = Record::new();
    for field in fields {
        let field = field.as_ref();
        let value = record.get(field).cloned().unwrap_or(Value::Null);
        let _ = projected.insert(field.to_owned(), value);
    }
    projected
}

/// Snapshots store a `RecordSet` as its natural JSON shape: a collection as
/// an array, a singleton as an object, `Empty` as an empty array (matching
/// the empty-but-present convention for hard-failed repositories).
impl Serialize for RecordSet {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Collection(records) => records.serialize(serializer),
            Self::Singleton(record) => record.serialize(serializer),
            Self::Empty => serializer.serialize_seq(Some(0))?.end(),
        }
    }
}

/// An empty array deserializes to `Empty`; the two spellings of "no records"
/// are interchangeable downstream.
impl<'de> Deserialize<'de> for RecordSet {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        match value {
            Value::Array(items) if items.is_empty() => Ok(Self::Empty),
            Value::Array(items) => {
                let records = items
                    .into_iter()
                    .map(|item| {
                        if let Value::Object(record) = item {
                            Ok(record)
                        } else {
                            Err(D::Error::custom("expected an array of objects"))
                        }
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Self::Collection(records))
            }
            Value::Object(record) => Ok(Self::Singleton(record)),
            _ => Err(D::Error::custom("expected an array or object")),
        }
    }
}
