//! BigQuery Client Abstractions
//!
//! クライアントの抽象化と実装

use async_trait::async_trait;
use google_cloud_bigquery::client::Client;
use google_cloud_bigquery::http::dataset::Dataset;
use google_cloud_bigquery::http::error::Error as BqError;
use google_cloud_bigquery::http::job::get::GetJobRequest;
use google_cloud_bigquery::http::job::Job;
use google_cloud_bigquery::http::table::Table;

#[cfg(test)]
use mockall::automock;

use crate::error::{Result, TransferError};

/// Trait for the warehouse job and metadata operations this crate needs.
/// This enables mocking in tests while using the real client in production.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait WarehouseService: Send + Sync {
    /// Project the service is bound to.
    fn project_id(&self) -> &str;

    /// Begin an asynchronous job.
    async fn create_job(&self, job: Job) -> Result<Job>;

    /// Reload the status of a previously created job.
    async fn get_job<'a>(&self, job_id: &str, location: Option<&'a str>) -> Result<Job>;

    /// Look up a dataset; absence is data, not an error.
    async fn get_dataset(&self, dataset_id: &str) -> Result<Option<Dataset>>;

    /// Create a dataset.
    async fn create_dataset(&self, dataset: Dataset) -> Result<Dataset>;

    /// Look up a table; absence is data, not an error.
    async fn get_table(&self, dataset_id: &str, table_id: &str) -> Result<Option<Table>>;

    /// Create a table.
    async fn create_table(&self, table: Table) -> Result<Table>;
}

fn is_not_found(e: &BqError) -> bool {
    matches!(e, BqError::Response(resp) if resp.code == 404)
}

fn remote(e: BqError) -> TransferError {
    TransferError::Remote(e.to_string())
}

/// Real BigQuery service wrapper owning the SDK client.
pub struct BigQueryService {
    client: Client,
    project_id: String,
}

impl BigQueryService {
    pub fn new(client: Client, project_id: impl Into<String>) -> Self {
        Self {
            client,
            project_id: project_id.into(),
        }
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[async_trait]
impl WarehouseService for BigQueryService {
    fn project_id(&self) -> &str {
        &self.project_id
    }

    async fn create_job(&self, job: Job) -> Result<Job> {
        self.client.job().create(&job).await.map_err(remote)
    }

    async fn get_job<'a>(&self, job_id: &str, location: Option<&'a str>) -> Result<Job> {
        let request = GetJobRequest {
            location: location.map(|l| l.to_string()),
        };
        self.client
            .job()
            .get(&self.project_id, job_id, &request)
            .await
            .map_err(remote)
    }

    async fn get_dataset(&self, dataset_id: &str) -> Result<Option<Dataset>> {
        match self.client.dataset().get(&self.project_id, dataset_id).await {
            Ok(dataset) => Ok(Some(dataset)),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(remote(e)),
        }
    }

    async fn create_dataset(&self, dataset: Dataset) -> Result<Dataset> {
        self.client.dataset().create(&dataset).await.map_err(remote)
    }

    async fn get_table(&self, dataset_id: &str, table_id: &str) -> Result<Option<Table>> {
        match self
            .client
            .table()
            .get(&self.project_id, dataset_id, table_id)
            .await
        {
            Ok(table) => Ok(Some(table)),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(remote(e)),
        }
    }

    async fn create_table(&self, table: Table) -> Result<Table> {
        self.client.table().create(&table).await.map_err(remote)
    }
}
