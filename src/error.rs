use thiserror::Error;

#[derive(Error, Debug)]
pub enum TableStoreError {
    #[error("Table store unavailable: {reason}")]
    StoreUnavailable { reason: String },

    #[error("Store rejected filter: {filter}")]
    MalformedFilter { filter: String },

    #[error("Key ({partition_key}, {row_key}) matched {matches} rows, expected at most one")]
    AmbiguousKey {
        partition_key: String,
        row_key: String,
        matches: usize,
    },

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TableStoreError {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        TableStoreError::StoreUnavailable {
            reason: reason.into(),
        }
    }

    /// Classify a failed store call by its HTTP status, if the store answered.
    /// 400 means the store refused the request text itself, usually a filter
    /// built from unsanitized keys; everything else is the store being unusable.
    pub fn from_store_failure(status: Option<u16>, message: impl Into<String>) -> Self {
        match status {
            Some(400) => TableStoreError::MalformedFilter {
                filter: message.into(),
            },
            _ => TableStoreError::unavailable(message),
        }
    }

    /// Transport and credential failures; everything else is a caller or data problem.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, TableStoreError::StoreUnavailable { .. })
    }
}

pub type Result<T> = std::result::Result<T, TableStoreError>;

/// HTTP status of a failed Azure call, `None` for transport failures
#[cfg(feature = "azure")]
pub(crate) fn azure_http_status(err: &azure_core::Error) -> Option<u16> {
    match err.kind() {
        azure_core::error::ErrorKind::HttpResponse { status, .. } => Some(u16::from(*status)),
        _ => None,
    }
}

#[cfg(feature = "azure")]
impl From<azure_core::Error> for TableStoreError {
    fn from(err: azure_core::Error) -> Self {
        TableStoreError::from_store_failure(azure_http_status(&err), err.to_string())
    }
}
