//! PostgreSQL Store Handle
//!
//! PostgreSQLストアハンドル
//!
//! Owns one `tokio_postgres::Client` behind an async mutex so a connection
//! is never shared across concurrent operations; each bulk operation holds
//! it for exactly one scoped transaction or query.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::error;
use tokio::sync::Mutex;
use tokio_postgres::{Client, NoTls};

use crate::adapter::postgres::bulk_copy;
use crate::domain::entities::record_set::RecordSet;
use crate::domain::entities::transfer_config::TransferConfig;
use crate::domain::repositories::bulk_transfer::{BulkExtractor, BulkLoader};
use crate::error::{Result, TransferError};

/// PostgreSQLストアハンドル
pub struct PostgresStore {
    client: Mutex<Client>,
}

impl PostgresStore {
    /// 既存のクライアントからハンドルを作成
    pub fn new(client: Client) -> Self {
        Self {
            client: Mutex::new(client),
        }
    }

    /// 接続設定からハンドルを作成
    ///
    /// The connection task is driven in the background for the lifetime of
    /// the client.
    pub async fn connect(config: &tokio_postgres::Config) -> Result<Self> {
        let (client, connection) = config
            .connect(NoTls)
            .await
            .map_err(|e| TransferError::Remote(e.to_string()))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("postgres connection error: {}", e);
            }
        });

        Ok(Self::new(client))
    }

    /// クエリ結果をファイルへ抽出する
    pub async fn extract_to_path(
        &self,
        query: &str,
        path: &Path,
        config: &TransferConfig,
    ) -> Result<u64> {
        let client = self.client.lock().await;
        bulk_copy::extract_to_path(&client, query, path, config).await
    }

    /// テーブルをファイルへダンプする
    pub async fn dump_to_path(
        &self,
        table: &str,
        path: &Path,
        config: &TransferConfig,
    ) -> Result<u64> {
        let client = self.client.lock().await;
        bulk_copy::dump_to_path(&client, table, path, config).await
    }

    /// ファイルをテーブルへロードする
    pub async fn load_from_path(
        &self,
        table: &str,
        path: &Path,
        config: &TransferConfig,
    ) -> Result<u64> {
        let mut client = self.client.lock().await;
        bulk_copy::load_from_path(&mut client, table, path, config).await
    }

    /// レコードセットをテーブルへロードする
    pub async fn load_records(
        &self,
        table: &str,
        records: &RecordSet,
        config: &TransferConfig,
    ) -> Result<u64> {
        let mut client = self.client.lock().await;
        bulk_copy::load_records(&mut client, table, records, config).await
    }

    /// テーブルをTRUNCATEする
    pub async fn truncate(&self, table: &str) -> Result<()> {
        let client = self.client.lock().await;
        bulk_copy::truncate(&client, table).await
    }
}

#[async_trait]
impl BulkExtractor for PostgresStore {
    async fn extract_to_dir(
        &self,
        source: &str,
        dir: &Path,
        config: &TransferConfig,
    ) -> Result<Vec<PathBuf>> {
        // A single COPY produces exactly one shard.
        let path = dir.join("part-000000000000.csv");
        self.extract_to_path(source, &path, config).await?;
        Ok(vec![path])
    }
}

#[async_trait]
impl BulkLoader for PostgresStore {
    async fn load_paths(
        &self,
        table: &str,
        paths: &[PathBuf],
        config: &TransferConfig,
    ) -> Result<()> {
        let mut client = self.client.lock().await;
        let append_config = config.clone().with_truncate(false);
        for (i, path) in paths.iter().enumerate() {
            // Only the first shard may truncate; later shards append.
            let shard_config = if i == 0 { config } else { &append_config };
            bulk_copy::load_from_path(&mut client, table, path, shard_config).await?;
        }
        Ok(())
    }
}
