//! Engine-agnostic rows returned by table reads.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::HistoryResult;

/// A lazily produced sequence of rows. Reads over large snapshot ranges are streamed through this
/// type rather than materialized.
pub type RowStream = Box<dyn Iterator<Item = HistoryResult<Row>> + Send>;

/// A stream that yields nothing.
pub fn empty_stream() -> RowStream {
    Box::new(std::iter::empty())
}

/// Streams rows out of shared batches, cloning one row at a time.
pub fn stream_batches(batches: Vec<Arc<Vec<Row>>>) -> RowStream {
    Box::new(batches.into_iter().flat_map(|batch| {
        let len = batch.len();
        (0..len).map(move |i| Ok(batch[i].clone()))
    }))
}

/// A single column value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Boolean(bool),
    Long(i64),
    Double(f64),
    String(String),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Long(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::String(s) => write!(f, "{s}"),
        }
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<i32> for Scalar {
    fn from(v: i32) -> Self {
        Self::Long(v.into())
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Self::Long(v)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl<T: Into<Scalar>> From<Option<T>> for Scalar {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// A record keyed by column name.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row(BTreeMap<String, Scalar>);

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Scalar>) -> Self {
        self.set(column, value);
        self
    }

    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Scalar>) {
        self.0.insert(column.into(), value.into());
    }

    pub fn get(&self, column: &str) -> Option<&Scalar> {
        self.0.get(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<Scalar>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (column, value)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{column}: {value}")?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_and_display() {
        let row = Row::new()
            .with("model", "Model S")
            .with("price", 79_990)
            .with("discount", None::<f64>);
        assert_eq!(row.len(), 3);
        assert_eq!(row.get("price"), Some(&Scalar::Long(79_990)));
        assert_eq!(row.to_string(), "{discount: null, model: Model S, price: 79990}");
    }

    #[test]
    fn rows_round_trip_as_plain_json_objects() {
        let row: Row = [("id", Scalar::Long(3)), ("vin", Scalar::from("5YJ3"))]
            .into_iter()
            .collect();
        let json = serde_json::to_string(&row).unwrap();
        assert_eq!(json, r#"{"id":3,"vin":"5YJ3"}"#);
        let parsed: Row = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, row);
    }

    #[test]
    fn stream_batches_is_lazy_and_ordered() {
        let a = Arc::new(vec![Row::new().with("n", 1), Row::new().with("n", 2)]);
        let b = Arc::new(vec![Row::new().with("n", 3)]);
        let mut stream = stream_batches(vec![a, Arc::new(vec![]), b]);
        let first = stream.next().unwrap().unwrap();
        assert_eq!(first.get("n"), Some(&Scalar::Long(1)));
        assert_eq!(stream.count(), 2);
        assert_eq!(empty_stream().count(), 0);
    }
}
