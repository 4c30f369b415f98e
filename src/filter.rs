/// Equality filters over the two key fields
///
/// A filter is a conjunction of `field eq 'value'` conditions. It renders to
/// the OData `$filter` syntax the table service expects and can also be
/// evaluated locally against a record.

use crate::record::{Record, PARTITION_KEY, ROW_KEY};
use crate::sanitize::is_valid_key;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyField {
    PartitionKey,
    RowKey,
}

impl KeyField {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyField::PartitionKey => PARTITION_KEY,
            KeyField::RowKey => ROW_KEY,
        }
    }

    fn value_of<'a>(&self, record: &'a Record) -> &'a str {
        match self {
            KeyField::PartitionKey => record.partition_key(),
            KeyField::RowKey => record.row_key(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Condition {
    field: KeyField,
    value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    pub fn field_eq(field: KeyField, value: impl Into<String>) -> Self {
        Self {
            conditions: vec![Condition {
                field,
                value: value.into(),
            }],
        }
    }

    pub fn partition(partition_key: &str) -> Self {
        Self::field_eq(KeyField::PartitionKey, partition_key)
    }

    /// `PartitionKey eq pk and RowKey eq rk`
    pub fn key(partition_key: &str, row_key: &str) -> Self {
        Self::partition(partition_key).and(Self::field_eq(KeyField::RowKey, row_key))
    }

    pub fn and(mut self, other: Filter) -> Self {
        self.conditions.extend(other.conditions);
        self
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.conditions
            .iter()
            .all(|c| c.field.value_of(record) == c.value)
    }

    /// True if every compared value is legal in a key field
    pub fn has_valid_keys(&self) -> bool {
        self.conditions.iter().all(|c| is_valid_key(&c.value))
    }

    pub fn to_odata(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let single = self.conditions.len() == 1;
        for (i, condition) in self.conditions.iter().enumerate() {
            if i > 0 {
                write!(f, " and ")?;
            }
            // OData string literals escape a quote by doubling it
            let literal = condition.value.replace('\'', "''");
            if single {
                write!(f, "{} eq '{}'", condition.field.as_str(), literal)?;
            } else {
                write!(f, "({} eq '{}')", condition.field.as_str(), literal)?;
            }
        }
        Ok(())
    }
}
