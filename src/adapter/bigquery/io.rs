//! Warehouse Bulk I/O
//!
//! オブジェクトストレージ経由のウェアハウス入出力
//!
//! Load and export follow the behaviour of PostgreSQL's COPY commands:
//! local delimited files are staged into the import bucket for loading, and
//! exports land in the export bucket as one or more shards before being
//! downloaded. Staged objects are removed on every exit path.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{info, warn};
use tokio_util::sync::CancellationToken;

use google_cloud_bigquery::http::dataset::{Dataset, DatasetReference};
use google_cloud_bigquery::http::job::{
    Job, JobConfiguration, JobConfigurationExtract, JobConfigurationExtractSource,
    JobConfigurationLoad, JobConfigurationQuery, JobReference, JobType, WriteDisposition,
};
use google_cloud_bigquery::http::table::{
    DestinationFormat, SourceFormat, Table, TableReference,
};

use crate::adapter::bigquery::client::WarehouseService;
use crate::adapter::bigquery::poller::{random_job_id, JobPoller, DEFAULT_POLL_INTERVAL};
use crate::adapter::bigquery::schema::{to_table_schema, FieldSpec};
use crate::adapter::storage::bucket::ObjectStorage;
use crate::domain::entities::transfer_config::TransferConfig;
use crate::domain::repositories::bulk_transfer::{BulkExtractor, BulkLoader};
use crate::error::{Result, TransferError};

/// 参照先が存在しない場合の扱い
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IfMissing {
    /// 作成する（テーブルの場合はスキーマ必須）
    Create,
    /// エラーにする
    Fail,
}

/// ウェアハウス入出力
///
/// ジョブサービスとステージングバケットを束ね、ロード・エクスポート・
/// クエリ実行をジョブ送信+ポーリングとして合成する。
pub struct WarehouseIo {
    service: Arc<dyn WarehouseService>,
    import_bucket: Arc<dyn ObjectStorage>,
    export_bucket: Arc<dyn ObjectStorage>,
    poll_interval: Duration,
    cancel: CancellationToken,
}

impl WarehouseIo {
    /// 新しいウェアハウス入出力を作成
    pub fn new(
        service: Arc<dyn WarehouseService>,
        import_bucket: Arc<dyn ObjectStorage>,
        export_bucket: Arc<dyn ObjectStorage>,
    ) -> Self {
        Self {
            service,
            import_bucket,
            export_bucket,
            poll_interval: DEFAULT_POLL_INTERVAL,
            cancel: CancellationToken::new(),
        }
    }

    /// ポーリング間隔を変更する
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// キャンセルトークンを差し替える
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn poller(&self) -> JobPoller<'_, dyn WarehouseService> {
        JobPoller::new(self.service.as_ref(), self.poll_interval)
            .with_cancellation(self.cancel.clone())
    }

    fn job_reference(&self) -> JobReference {
        JobReference {
            project_id: self.service.project_id().to_string(),
            job_id: random_job_id(),
            location: None,
        }
    }

    fn table_reference(&self, dataset_id: &str, table_id: &str) -> TableReference {
        TableReference {
            project_id: self.service.project_id().to_string(),
            dataset_id: dataset_id.to_string(),
            table_id: table_id.to_string(),
        }
    }

    /// Look up a dataset, creating it when asked to.
    pub async fn get_or_create_dataset(
        &self,
        dataset_id: &str,
        if_missing: IfMissing,
    ) -> Result<Dataset> {
        match self.service.get_dataset(dataset_id).await? {
            Some(dataset) => Ok(dataset),
            None => match if_missing {
                IfMissing::Create => {
                    info!("creating dataset {}", dataset_id);
                    self.service
                        .create_dataset(Dataset {
                            dataset_reference: DatasetReference {
                                project_id: self.service.project_id().to_string(),
                                dataset_id: dataset_id.to_string(),
                            },
                            ..Default::default()
                        })
                        .await
                }
                IfMissing::Fail => Err(TransferError::Configuration(format!(
                    "dataset {}:{} does not exist",
                    self.service.project_id(),
                    dataset_id
                ))),
            },
        }
    }

    /// Look up a table, creating it when asked to. Creating requires a
    /// schema; requesting creation without one is a configuration error.
    pub async fn get_or_create_table(
        &self,
        dataset_id: &str,
        table_id: &str,
        schema: Option<&[FieldSpec]>,
        if_missing: IfMissing,
    ) -> Result<Table> {
        match self.service.get_table(dataset_id, table_id).await? {
            Some(table) => Ok(table),
            None => match if_missing {
                IfMissing::Create => {
                    let specs = schema.ok_or_else(|| {
                        TransferError::Configuration(
                            "table does not exist and would be created, \
                             but no schema was provided"
                                .to_string(),
                        )
                    })?;
                    info!("creating table {}.{}", dataset_id, table_id);
                    self.service
                        .create_table(Table {
                            table_reference: self.table_reference(dataset_id, table_id),
                            schema: Some(to_table_schema(specs)?),
                            ..Default::default()
                        })
                        .await
                }
                IfMissing::Fail => Err(TransferError::Configuration(format!(
                    "table {}:{}.{} does not exist",
                    self.service.project_id(),
                    dataset_id,
                    table_id
                ))),
            },
        }
    }

    /// Load local delimited files into a table through the import bucket,
    /// as one multi-source load job. Designed to follow the behaviour of
    /// PostgreSQL's `COPY FROM`. Staged objects are deleted on every exit
    /// path.
    pub async fn load_csv_paths(
        &self,
        dataset_id: &str,
        table_id: &str,
        paths: &[PathBuf],
        config: &TransferConfig,
        write_disposition: WriteDisposition,
        if_missing: IfMissing,
        schema: Option<&[FieldSpec]>,
    ) -> Result<Job> {
        if paths.is_empty() {
            return Err(TransferError::Configuration(
                "no source files to load".to_string(),
            ));
        }
        let delimiter = config.delimiter_byte()? as char;

        self.get_or_create_table(dataset_id, table_id, schema, if_missing)
            .await?;

        let reference = self.job_reference();
        let staging_prefix = format!("load-{}", reference.job_id);

        // Stage the shards; remember what was uploaded so cleanup covers
        // partial failures too.
        let mut staged: Vec<String> = Vec::with_capacity(paths.len());
        let mut source_uris = Vec::with_capacity(paths.len());
        let mut upload_result = Ok(());
        for path in paths {
            let file_name = path
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| {
                    TransferError::Configuration(format!(
                        "source path {} has no usable file name",
                        path.display()
                    ))
                })?;
            let object = format!("{}/{}", staging_prefix, file_name);
            match self.import_bucket.upload_file(path, &object).await {
                Ok(uri) => {
                    staged.push(object);
                    source_uris.push(uri);
                }
                Err(e) => {
                    upload_result = Err(e);
                    break;
                }
            }
        }

        let result = match upload_result {
            Ok(()) => {
                let job = Job {
                    job_reference: reference,
                    configuration: JobConfiguration {
                        job: JobType::Load(JobConfigurationLoad {
                            source_uris,
                            source_format: Some(SourceFormat::Csv),
                            field_delimiter: Some(delimiter.to_string()),
                            null_marker: Some(config.null_token.clone()),
                            encoding: Some(config.encoding.clone()),
                            skip_leading_rows: Some(if config.header { 1 } else { 0 }),
                            write_disposition: Some(write_disposition),
                            destination_table: self.table_reference(dataset_id, table_id),
                            ..Default::default()
                        }),
                        ..Default::default()
                    },
                    ..Default::default()
                };
                self.poller().run(job).await
            }
            Err(e) => Err(e),
        };

        self.delete_staged(self.import_bucket.as_ref(), &staged).await;
        result
    }

    /// Execute a query job and return the reference of the table holding
    /// its result.
    pub async fn execute_query(&self, query: &str) -> Result<TableReference> {
        let job = Job {
            job_reference: self.job_reference(),
            configuration: JobConfiguration {
                job: JobType::Query(JobConfigurationQuery {
                    query: query.to_string(),
                    use_legacy_sql: Some(false),
                    ..Default::default()
                }),
                ..Default::default()
            },
            ..Default::default()
        };
        let finished = self.poller().run(job).await?;

        match finished.configuration.job {
            JobType::Query(query_config) => query_config.destination_table.ok_or_else(|| {
                TransferError::Remote("query job reported no destination table".to_string())
            }),
            _ => Err(TransferError::Remote(
                "query job came back with a non-query configuration".to_string(),
            )),
        }
    }

    /// Export a table to the export bucket as delimited text. Large tables
    /// split across several shard objects; the shard names are returned in
    /// listing order.
    pub async fn export_table_csv(
        &self,
        table: TableReference,
        prefix: &str,
        config: &TransferConfig,
    ) -> Result<Vec<String>> {
        let delimiter = config.delimiter_byte()? as char;
        let destination_uri = format!(
            "gs://{}/{}-*",
            self.export_bucket.bucket_name(),
            prefix
        );

        let job = Job {
            job_reference: self.job_reference(),
            configuration: JobConfiguration {
                job: JobType::Extract(JobConfigurationExtract {
                    source: JobConfigurationExtractSource::SourceTable(table),
                    destination_uris: vec![destination_uri],
                    destination_format: Some(DestinationFormat::Csv),
                    field_delimiter: Some(delimiter.to_string()),
                    print_header: Some(config.header),
                    ..Default::default()
                }),
                ..Default::default()
            },
            ..Default::default()
        };
        self.poller().run(job).await?;

        self.export_bucket.list_objects(prefix).await
    }

    /// Copy a query result to a local directory: query, export, download.
    /// Designed to follow the behaviour of PostgreSQL's `COPY TO`. The
    /// exported staging objects are deleted on every exit path; the local
    /// shard paths are returned in download order.
    pub async fn copy_query_to_dir(
        &self,
        query: &str,
        dir: &Path,
        config: &TransferConfig,
    ) -> Result<Vec<PathBuf>> {
        let destination = self.execute_query(query).await?;
        let prefix = format!("export-{}", destination.table_id);

        let objects = self.export_table_csv(destination, &prefix, config).await?;
        let downloaded = self.export_bucket.download_to_dir(&prefix, dir).await;

        self.delete_staged(self.export_bucket.as_ref(), &objects).await;
        downloaded
    }

    /// Best-effort deletion of staged objects; failures are logged, not
    /// propagated, so cleanup cannot mask the operation's own result.
    async fn delete_staged(&self, bucket: &dyn ObjectStorage, objects: &[String]) {
        for object in objects {
            if let Err(e) = bucket.delete_object(object).await {
                warn!(
                    "failed to delete staged object gs://{}/{}: {}",
                    bucket.bucket_name(),
                    object,
                    e
                );
            }
        }
    }
}

fn split_table_path(table: &str) -> Result<(&str, &str)> {
    table.split_once('.').ok_or_else(|| {
        TransferError::Configuration(format!(
            "warehouse table must be qualified as dataset.table, got {}",
            table
        ))
    })
}

#[async_trait]
impl BulkExtractor for WarehouseIo {
    async fn extract_to_dir(
        &self,
        source: &str,
        dir: &Path,
        config: &TransferConfig,
    ) -> Result<Vec<PathBuf>> {
        self.copy_query_to_dir(source, dir, config).await
    }
}

#[async_trait]
impl BulkLoader for WarehouseIo {
    async fn load_paths(
        &self,
        table: &str,
        paths: &[PathBuf],
        config: &TransferConfig,
    ) -> Result<()> {
        let (dataset_id, table_id) = split_table_path(table)?;
        let write_disposition = if config.truncate_destination {
            WriteDisposition::WriteTruncate
        } else {
            WriteDisposition::WriteAppend
        };
        self.load_csv_paths(
            dataset_id,
            table_id,
            paths,
            config,
            write_disposition,
            IfMissing::Fail,
            None,
        )
        .await?;
        Ok(())
    }
}
