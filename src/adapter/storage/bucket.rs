//! Object Storage Bucket
//!
//! オブジェクトストレージバケットの抽象化とGCS実装
//!
//! The staging area used to move delimited files between systems that
//! cannot exchange data directly.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use google_cloud_storage::client::Client;
use google_cloud_storage::http::objects::delete::DeleteObjectRequest;
use google_cloud_storage::http::objects::download::Range;
use google_cloud_storage::http::objects::get::GetObjectRequest;
use google_cloud_storage::http::objects::list::ListObjectsRequest;
use google_cloud_storage::http::objects::upload::{Media, UploadObjectRequest, UploadType};
use log::debug;

#[cfg(test)]
use mockall::automock;

use crate::error::{Result, TransferError};

/// Trait for the staging-bucket operations this crate needs.
/// This enables mocking in tests while using the real client in production.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Name of the bucket this handle is bound to.
    fn bucket_name(&self) -> &str;

    /// Upload a local file to a named object; returns the object URI.
    async fn upload_file(&self, path: &Path, object: &str) -> Result<String>;

    /// List object names under a prefix.
    async fn list_objects(&self, prefix: &str) -> Result<Vec<String>>;

    /// Download every object under a prefix into a directory; returns the
    /// local paths in listing order.
    async fn download_to_dir(&self, prefix: &str, dir: &Path) -> Result<Vec<PathBuf>>;

    /// Delete a single object.
    async fn delete_object(&self, object: &str) -> Result<()>;
}

/// Render the canonical URI of an object in a bucket.
pub fn object_uri(bucket: &str, object: &str) -> String {
    format!("gs://{}/{}", bucket, object)
}

/// Google Cloud Storage bucket handle.
pub struct GcsBucket {
    client: Client,
    name: String,
}

impl GcsBucket {
    pub fn new(client: Client, name: impl Into<String>) -> Self {
        Self {
            client,
            name: name.into(),
        }
    }

    fn remote(e: impl std::fmt::Display) -> TransferError {
        TransferError::Remote(e.to_string())
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[async_trait]
impl ObjectStorage for GcsBucket {
    fn bucket_name(&self) -> &str {
        &self.name
    }

    async fn upload_file(&self, path: &Path, object: &str) -> Result<String> {
        let data = tokio::fs::read(path).await?;
        let request = UploadObjectRequest {
            bucket: self.name.clone(),
            ..Default::default()
        };
        let media = Media::new(object.to_string());
        self.client
            .upload_object(&request, data, &UploadType::Simple(media))
            .await
            .map_err(Self::remote)?;

        let uri = object_uri(&self.name, object);
        debug!("uploaded {} to {}", path.display(), uri);
        Ok(uri)
    }

    async fn list_objects(&self, prefix: &str) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let request = ListObjectsRequest {
                bucket: self.name.clone(),
                prefix: Some(prefix.to_string()),
                page_token: page_token.take(),
                ..Default::default()
            };
            let response = self
                .client
                .list_objects(&request)
                .await
                .map_err(Self::remote)?;

            if let Some(items) = response.items {
                names.extend(items.into_iter().map(|o| o.name));
            }
            match response.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        Ok(names)
    }

    async fn download_to_dir(&self, prefix: &str, dir: &Path) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        for object in self.list_objects(prefix).await? {
            let request = GetObjectRequest {
                bucket: self.name.clone(),
                object: object.clone(),
                ..Default::default()
            };
            let data = self
                .client
                .download_object(&request, &Range::default())
                .await
                .map_err(Self::remote)?;

            // Object names may carry pseudo-directories; keep the basename.
            let file_name = object.rsplit('/').next().unwrap_or(&object);
            let path = dir.join(file_name);
            tokio::fs::write(&path, data).await?;
            debug!("downloaded {} to {}", object, path.display());
            paths.push(path);
        }
        Ok(paths)
    }

    async fn delete_object(&self, object: &str) -> Result<()> {
        let request = DeleteObjectRequest {
            bucket: self.name.clone(),
            object: object.to_string(),
            ..Default::default()
        };
        self.client
            .delete_object(&request)
            .await
            .map_err(Self::remote)
    }
}
