//! GCP Authentication
//!
//! Google Cloud Platform認証機能

use anyhow::{Context, Result};
use google_cloud_bigquery::client::{Client as BigQueryClient, ClientConfig as BigQueryConfig};
use google_cloud_storage::client::{Client as StorageClient, ClientConfig as StorageConfig};

/// Expands tilde in path and returns the full path
pub fn expand_key_path(key_path: &str) -> String {
    shellexpand::tilde(key_path).to_string()
}

/// Creates a BigQuery client with service account authentication
pub async fn create_bigquery_client(key_path: &str) -> Result<BigQueryClient> {
    let expanded_path = expand_key_path(key_path);
    std::env::set_var("GOOGLE_APPLICATION_CREDENTIALS", &expanded_path);

    let (config, _project_id) = BigQueryConfig::new_with_auth()
        .await
        .context("Failed to authenticate with service account")?;

    let client = BigQueryClient::new(config)
        .await
        .context("Failed to create BigQuery client")?;

    Ok(client)
}

/// Creates a Cloud Storage client with service account authentication
pub async fn create_storage_client(key_path: &str) -> Result<StorageClient> {
    let expanded_path = expand_key_path(key_path);
    std::env::set_var("GOOGLE_APPLICATION_CREDENTIALS", &expanded_path);

    let config = StorageConfig::default()
        .with_auth()
        .await
        .context("Failed to authenticate with service account")?;

    Ok(StorageClient::new(config))
}
