/// Configuration: storage account credentials and runtime knobs
///
/// Credentials come from an Azure-style connection string
/// (`AccountName=...;AccountKey=...`), normally taken from the
/// `AZURE_STORAGE_CONNECTION_STRING` environment variable.

use crate::error::{Result, TableStoreError};
use std::env;

pub const CONNECTION_STRING_VAR: &str = "AZURE_STORAGE_CONNECTION_STRING";
pub const SEGMENT_SIZE_VAR: &str = "TABLESTORE_SEGMENT_SIZE";

/// Azure Table service returns at most 1000 entities per segment
pub const DEFAULT_SEGMENT_SIZE: usize = 1000;

/// Storage account credentials parsed from a connection string
#[derive(Debug, Clone, PartialEq)]
pub struct StorageAccount {
    pub name: String,
    pub key: String,
    pub table_endpoint: Option<String>,
}

impl StorageAccount {
    pub fn from_connection_string(connection_string: &str) -> Result<Self> {
        let mut name = String::new();
        let mut key = String::new();
        let mut table_endpoint = None;

        for part in connection_string.split(';') {
            // Keys are base64 and may end in '=', so split on the first one only
            if let Some((field, value)) = part.trim().split_once('=') {
                match field {
                    "AccountName" => name = value.to_string(),
                    "AccountKey" => key = value.to_string(),
                    "TableEndpoint" => table_endpoint = Some(value.to_string()),
                    _ => {}
                }
            }
        }

        if name.is_empty() || key.is_empty() {
            return Err(TableStoreError::Config(
                "Invalid connection string: missing AccountName or AccountKey".to_string(),
            ));
        }

        Ok(Self {
            name,
            key,
            table_endpoint,
        })
    }
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub connection_string: Option<String>,
    pub segment_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            connection_string: None,
            segment_size: DEFAULT_SEGMENT_SIZE,
        }
    }
}

impl StoreConfig {
    pub fn from_env() -> Result<Self> {
        let connection_string = env::var(CONNECTION_STRING_VAR).ok();
        let segment_size = match env::var(SEGMENT_SIZE_VAR) {
            Ok(raw) => parse_segment_size(&raw)?,
            Err(_) => DEFAULT_SEGMENT_SIZE,
        };

        Ok(Self {
            connection_string,
            segment_size,
        })
    }

    /// Account credentials, if a connection string was configured
    pub fn account(&self) -> Result<Option<StorageAccount>> {
        self.connection_string
            .as_deref()
            .map(StorageAccount::from_connection_string)
            .transpose()
    }
}

fn parse_segment_size(raw: &str) -> Result<usize> {
    match raw.trim().parse::<usize>() {
        Ok(size) if size > 0 => Ok(size),
        _ => Err(TableStoreError::Config(format!(
            "{} must be a positive integer, got {:?}",
            SEGMENT_SIZE_VAR, raw
        ))),
    }
}
