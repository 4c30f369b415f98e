/// Record: one row of a partitioned table
///
/// A record is a flat mapping from field name to scalar value plus the two
/// key fields. Rows read back from a store also carry the store's
/// concurrency handle (etag), which the delete primitive requires.

use crate::error::{Result, TableStoreError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub const PARTITION_KEY: &str = "PartitionKey";
pub const ROW_KEY: &str = "RowKey";

const ETAG: &str = "odata.etag";
const TIMESTAMP: &str = "Timestamp";
const ODATA_TYPE_SUFFIX: &str = "@odata.type";

const EDM_INT64: &str = "Edm.Int64";
const EDM_DOUBLE: &str = "Edm.Double";

/// Scalar field value
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Int(value.into())
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Double(value)
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::String(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}

impl FieldValue {
    /// `edm_type` is the value's `@odata.type` annotation, if the payload had one.
    /// Int64 and special doubles travel as strings and are parsed back here;
    /// other annotated types (Guid, DateTime, Binary) stay strings.
    fn from_json(name: &str, value: Value, edm_type: Option<&str>) -> Result<Option<Self>> {
        match (edm_type, value) {
            (Some(EDM_INT64), Value::String(s)) => match s.parse::<i64>() {
                Ok(i) => Ok(Some(FieldValue::Int(i))),
                Err(_) => Err(TableStoreError::InvalidRecord(format!(
                    "field {} is not an {}: {:?}",
                    name, EDM_INT64, s
                ))),
            },
            (Some(EDM_DOUBLE), Value::String(s)) => match s.parse::<f64>() {
                Ok(f) => Ok(Some(FieldValue::Double(f))),
                Err(_) => Err(TableStoreError::InvalidRecord(format!(
                    "field {} is not an {}: {:?}",
                    name, EDM_DOUBLE, s
                ))),
            },
            (_, value) => Self::from_plain_json(name, value),
        }
    }

    fn from_plain_json(name: &str, value: Value) -> Result<Option<Self>> {
        match value {
            Value::Null => Ok(None),
            Value::Bool(b) => Ok(Some(FieldValue::Bool(b))),
            Value::String(s) => Ok(Some(FieldValue::String(s))),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Ok(Some(FieldValue::Int(i))),
                None => n.as_f64().map(|f| Some(FieldValue::Double(f))).ok_or_else(|| {
                    TableStoreError::InvalidRecord(format!("field {} is out of range: {}", name, n))
                }),
            },
            Value::Array(_) | Value::Object(_) => Err(TableStoreError::InvalidRecord(format!(
                "field {} is not a scalar",
                name
            ))),
        }
    }

    fn to_json(&self) -> Value {
        match self {
            FieldValue::Bool(b) => Value::Bool(*b),
            FieldValue::Int(i) => Value::from(*i),
            FieldValue::Double(f) => Value::from(*f),
            FieldValue::String(s) => Value::String(s.clone()),
        }
    }

    /// Wire form for the table service, with the type annotation it needs.
    /// Untyped JSON integers are read as Edm.Int32 by the service, so Int64
    /// is sent as an annotated string.
    fn to_odata(&self) -> (Value, Option<&'static str>) {
        match self {
            FieldValue::Int(i) => (Value::String(i.to_string()), Some(EDM_INT64)),
            FieldValue::Double(f) if f.is_finite() => (Value::from(*f), Some(EDM_DOUBLE)),
            FieldValue::Double(f) => (Value::String(odata_special_double(*f)), Some(EDM_DOUBLE)),
            other => (other.to_json(), None),
        }
    }
}

fn odata_special_double(f: f64) -> String {
    if f.is_nan() {
        "NaN".to_string()
    } else if f > 0.0 {
        "Infinity".to_string()
    } else {
        "-Infinity".to_string()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    partition_key: String,
    row_key: String,
    fields: BTreeMap<String, FieldValue>,
    etag: Option<String>,
}

impl Record {
    pub fn new(partition_key: impl Into<String>, row_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            row_key: row_key.into(),
            fields: BTreeMap::new(),
            etag: None,
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn partition_key(&self) -> &str {
        &self.partition_key
    }

    pub fn row_key(&self) -> &str {
        &self.row_key
    }

    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    /// Concurrency handle assigned by the store, `None` for records not yet written
    pub fn etag(&self) -> Option<&str> {
        self.etag.as_deref()
    }

    pub(crate) fn with_etag(mut self, etag: impl Into<String>) -> Self {
        self.etag = Some(etag.into());
        self
    }

    /// Build a record from any serializable entity with `PartitionKey` and
    /// `RowKey` string fields (use `#[serde(rename = "PartitionKey")]`).
    pub fn from_entity<T: Serialize>(entity: &T) -> Result<Self> {
        Self::from_json(serde_json::to_value(entity)?)
    }

    pub fn to_entity<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(Value::Object(self.to_json_map()))?)
    }

    /// Parse a store payload. Store metadata (`odata.*`, `Timestamp`) is
    /// dropped except the etag, which is kept as the concurrency handle.
    /// `@odata.type` annotations decide how string-encoded values are read.
    pub fn from_json(value: Value) -> Result<Self> {
        let Value::Object(map) = value else {
            return Err(TableStoreError::InvalidRecord("entity is not a JSON object".to_string()));
        };

        let edm_types: BTreeMap<String, String> = map
            .iter()
            .filter_map(|(name, value)| {
                let field = name.strip_suffix(ODATA_TYPE_SUFFIX)?;
                Some((field.to_string(), value.as_str()?.to_string()))
            })
            .collect();

        let mut partition_key = None;
        let mut row_key = None;
        let mut etag = None;
        let mut fields = BTreeMap::new();

        for (name, value) in map {
            match name.as_str() {
                PARTITION_KEY => partition_key = Some(key_string(PARTITION_KEY, value)?),
                ROW_KEY => row_key = Some(key_string(ROW_KEY, value)?),
                ETAG => etag = value.as_str().map(str::to_string),
                TIMESTAMP => {}
                _ if name.starts_with("odata.") || name.contains("@odata.") => {}
                _ => {
                    let edm_type = edm_types.get(&name).map(String::as_str);
                    if let Some(field) = FieldValue::from_json(&name, value, edm_type)? {
                        fields.insert(name, field);
                    }
                }
            }
        }

        let (Some(partition_key), Some(row_key)) = (partition_key, row_key) else {
            return Err(TableStoreError::InvalidRecord(format!(
                "entity must have string {} and {} fields",
                PARTITION_KEY, ROW_KEY
            )));
        };

        Ok(Self {
            partition_key,
            row_key,
            fields,
            etag,
        })
    }

    pub fn to_json_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert(PARTITION_KEY.to_string(), Value::String(self.partition_key.clone()));
        map.insert(ROW_KEY.to_string(), Value::String(self.row_key.clone()));
        for (name, value) in &self.fields {
            map.insert(name.clone(), value.to_json());
        }
        map
    }

    /// Payload for the table service: keys plus every field with the
    /// `@odata.type` annotation its type needs to survive a round trip.
    pub fn to_odata_json(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert(PARTITION_KEY.to_string(), Value::String(self.partition_key.clone()));
        map.insert(ROW_KEY.to_string(), Value::String(self.row_key.clone()));
        for (name, value) in &self.fields {
            let (json, edm_type) = value.to_odata();
            if let Some(edm_type) = edm_type {
                map.insert(
                    format!("{}{}", name, ODATA_TYPE_SUFFIX),
                    Value::String(edm_type.to_string()),
                );
            }
            map.insert(name.clone(), json);
        }
        map
    }
}

fn key_string(field: &str, value: Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s),
        other => Err(TableStoreError::InvalidRecord(format!(
            "{} must be a string, got {}",
            field, other
        ))),
    }
}
