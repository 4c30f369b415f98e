/// AzureTableBackend: Azure Table Storage over the REST API
///
/// Compiled with the `azure` feature. Continuation tokens issued here hold
/// the keys of the last row returned; resuming narrows the same filter to
/// rows strictly after that key, which the service walks in key order.

use crate::backend::{
    outcome_status, ContinuationToken, Mutation, ResultSegment, Table, TableBackend,
    STATUS_BAD_REQUEST, STATUS_CONFLICT, STATUS_NO_CONTENT,
};
use crate::config::StorageAccount;
use crate::error::{azure_http_status, Result, TableStoreError};
use crate::filter::Filter;
use crate::record::Record;
use async_trait::async_trait;
use azure_core::Continuable;
use azure_data_tables::operations::InsertEntityResponse;
use azure_data_tables::prelude::*;
use azure_storage::prelude::*;
use azure_storage::CloudLocation;
use futures::StreamExt;
use serde_json::Value;
use tracing::{debug, info};

pub struct AzureTableBackend {
    service: TableServiceClient,
}

impl AzureTableBackend {
    pub fn new(account: &StorageAccount) -> Self {
        info!("Initializing AzureTableBackend: account={}", account.name);

        let credentials = StorageCredentials::access_key(account.name.clone(), account.key.clone());
        let service = match &account.table_endpoint {
            Some(uri) => {
                info!("Using custom table endpoint {}", uri);
                let location = CloudLocation::Custom {
                    account: account.name.clone(),
                    uri: uri.clone(),
                };
                ClientBuilder::with_location(location, credentials).table_service_client()
            }
            None => TableServiceClient::new(account.name.clone(), credentials),
        };

        Self { service }
    }
}

/// Map a failed mutation to its outcome status, or to an error when the
/// failure is not one the caller treats as a plain `false`.
fn mutation_result(op: Mutation, err: azure_core::Error) -> Result<u16> {
    match azure_http_status(&err).and_then(|status| outcome_status(op, status)) {
        Some(status) => Ok(status),
        None => Err(err.into()),
    }
}

/// Token for the segment after `records`, when the service reported more
fn next_token(more: bool, records: &[Record]) -> Option<ContinuationToken> {
    match (more, records.last()) {
        (true, Some(last)) => Some(ContinuationToken::new(last.partition_key(), last.row_key())),
        _ => None,
    }
}

fn resume_filter(filter: &Filter, token: &ContinuationToken) -> String {
    let pk = token.next_partition_key().replace('\'', "''");
    let rk = token.next_row_key().replace('\'', "''");
    format!(
        "({}) and ((PartitionKey gt '{}') or ((PartitionKey eq '{}') and (RowKey gt '{}')))",
        filter, pk, pk, rk
    )
}

#[async_trait]
impl TableBackend for AzureTableBackend {
    async fn create_table_if_not_exists(&self, name: &str) -> Result<()> {
        match self.service.table_client(name).create().await {
            Ok(_) => {
                info!("Created table {}", name);
                Ok(())
            }
            Err(err) if azure_http_status(&err) == Some(STATUS_CONFLICT) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    async fn query_segment(
        &self,
        table: &Table,
        filter: &Filter,
        continuation: Option<&ContinuationToken>,
    ) -> Result<ResultSegment> {
        let odata = match continuation {
            Some(token) => resume_filter(filter, token),
            None => filter.to_odata(),
        };
        debug!("Querying {} with {}", table.name(), odata);

        let mut pages = self
            .service
            .table_client(table.name())
            .query()
            .filter(odata.clone())
            .into_stream::<Value>();

        // The service may hand back empty pages that still carry a token;
        // those are followed here so every segment returned makes progress.
        while let Some(page) = pages.next().await {
            let page = match page {
                Ok(page) => page,
                Err(err) if azure_http_status(&err) == Some(STATUS_BAD_REQUEST) => {
                    return Err(TableStoreError::MalformedFilter { filter: odata });
                }
                Err(err) => return Err(err.into()),
            };

            let more = page.continuation().is_some();
            if page.entities.is_empty() && more {
                continue;
            }

            let records = page
                .entities
                .into_iter()
                .map(Record::from_json)
                .collect::<Result<Vec<_>>>()?;

            let continuation = next_token(more, &records);

            return Ok(ResultSegment {
                records,
                continuation,
            });
        }

        Ok(ResultSegment::last(Vec::new()))
    }

    async fn insert_entity(&self, table: &Table, record: &Record) -> Result<u16> {
        let body = Value::Object(record.to_odata_json());
        let client = self.service.table_client(table.name());

        let outcome: azure_core::Result<InsertEntityResponse<Value>> = match client.insert(&body) {
            Ok(builder) => builder.await,
            Err(err) => Err(err),
        };

        match outcome {
            Ok(_) => Ok(STATUS_NO_CONTENT),
            Err(err) => mutation_result(Mutation::Insert, err),
        }
    }

    async fn delete_entity(&self, table: &Table, record: &Record) -> Result<u16> {
        let entity = self
            .service
            .table_client(table.name())
            .partition_key_client(record.partition_key())
            .entity_client(record.row_key());

        let mut request = entity.delete();
        if let Some(etag) = record.etag() {
            request = request.if_match(IfMatchCondition::Etag(etag.to_string().into()));
        }

        match request.await {
            Ok(_) => Ok(STATUS_NO_CONTENT),
            Err(err) => mutation_result(Mutation::Delete, err),
        }
    }
}
