//! # Cross-Store Copy Use Case
//!
//! クロスストアコピーユースケース
//!
//! Moves a query result from one store into a table of another when the two
//! are not directly connectable, via a scoped local staging directory. The
//! staging directory and every intermediate shard in it are removed on
//! every exit path.

use std::sync::Arc;

use log::info;

use crate::domain::entities::transfer_config::TransferConfig;
use crate::domain::repositories::bulk_transfer::{BulkExtractor, BulkLoader};
use crate::error::{Result, TransferError};

/// コピー結果のサマリー
#[derive(Debug, Clone)]
pub struct CopySummary {
    /// 中間シャードファイルの数
    pub shard_count: usize,
    /// コピー元（クエリまたはテーブル）
    pub source: String,
    /// コピー先テーブル
    pub destination: String,
}

/// クロスストアコピーユースケース
///
/// 抽出ポートとロードポートを合成し、中間ファイル経由でデータを移動する
pub struct CrossCopyUseCase<E: BulkExtractor, L: BulkLoader> {
    extractor: Arc<E>,
    loader: Arc<L>,
}

impl<E: BulkExtractor, L: BulkLoader> CrossCopyUseCase<E, L> {
    /// 新しいユースケースを作成
    ///
    /// # Arguments
    ///
    /// * `extractor` - コピー元の抽出ポート
    /// * `loader` - コピー先のロードポート
    pub fn new(extractor: Arc<E>, loader: Arc<L>) -> Self {
        Self { extractor, loader }
    }

    /// コピーを実行する
    ///
    /// # Arguments
    ///
    /// * `source` - コピー元のクエリまたはテーブル
    /// * `destination` - コピー先テーブル
    /// * `config` - 転送フォーマット設定
    ///
    /// # Returns
    ///
    /// コピー結果のサマリー
    ///
    /// # Errors
    ///
    /// 抽出またはロードに失敗した場合にエラーを返す。中間ファイルは
    /// 失敗時にも削除される。
    pub async fn execute(
        &self,
        source: &str,
        destination: &str,
        config: &TransferConfig,
    ) -> Result<CopySummary> {
        // Scoped staging area; dropped (and deleted) on every exit path
        let staging = tempfile::tempdir()?;

        let shards = self
            .extractor
            .extract_to_dir(source, staging.path(), config)
            .await?;
        if shards.is_empty() {
            return Err(TransferError::Configuration(
                "extractor produced no shard files".to_string(),
            ));
        }
        info!("extracted {} shard(s) for {}", shards.len(), source);

        self.loader.load_paths(destination, &shards, config).await?;
        info!("loaded {} shard(s) into {}", shards.len(), destination);

        Ok(CopySummary {
            shard_count: shards.len(),
            source: source.to_string(),
            destination: destination.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    struct FakeExtractor {
        shard_count: usize,
        seen_dir: Mutex<Option<PathBuf>>,
    }

    impl FakeExtractor {
        fn new(shard_count: usize) -> Self {
            Self {
                shard_count,
                seen_dir: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl BulkExtractor for FakeExtractor {
        async fn extract_to_dir(
            &self,
            _source: &str,
            dir: &Path,
            _config: &TransferConfig,
        ) -> Result<Vec<PathBuf>> {
            *self.seen_dir.lock().unwrap() = Some(dir.to_path_buf());
            let mut shards = Vec::new();
            for i in 0..self.shard_count {
                let path = dir.join(format!("part-{:012}.csv", i));
                std::fs::write(&path, format!("{}\n", i))?;
                shards.push(path);
            }
            Ok(shards)
        }
    }

    struct FakeLoader {
        loaded: Mutex<Vec<(String, Vec<PathBuf>)>>,
        fail: bool,
    }

    impl FakeLoader {
        fn new(fail: bool) -> Self {
            Self {
                loaded: Mutex::new(Vec::new()),
                fail,
            }
        }
    }

    #[async_trait]
    impl BulkLoader for FakeLoader {
        async fn load_paths(
            &self,
            table: &str,
            paths: &[PathBuf],
            _config: &TransferConfig,
        ) -> Result<()> {
            if self.fail {
                return Err(TransferError::load(table, "constraint violation"));
            }
            self.loaded
                .lock()
                .unwrap()
                .push((table.to_string(), paths.to_vec()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_copy_single_shard() {
        let extractor = Arc::new(FakeExtractor::new(1));
        let loader = Arc::new(FakeLoader::new(false));
        let use_case = CrossCopyUseCase::new(extractor.clone(), loader.clone());

        let summary = use_case
            .execute("SELECT * FROM events", "warehouse.events", &TransferConfig::new())
            .await
            .unwrap();

        assert_eq!(summary.shard_count, 1);
        let loaded = loader.loaded.lock().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].0, "warehouse.events");
    }

    #[tokio::test]
    async fn test_copy_multiple_shards_in_order() {
        let extractor = Arc::new(FakeExtractor::new(3));
        let loader = Arc::new(FakeLoader::new(false));
        let use_case = CrossCopyUseCase::new(extractor.clone(), loader.clone());

        let summary = use_case
            .execute("events", "replica.events", &TransferConfig::new())
            .await
            .unwrap();

        assert_eq!(summary.shard_count, 3);
        let loaded = loader.loaded.lock().unwrap();
        let names: Vec<String> = loaded[0]
            .1
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "part-000000000000.csv",
                "part-000000000001.csv",
                "part-000000000002.csv"
            ]
        );
    }

    #[tokio::test]
    async fn test_staging_dir_removed_on_success() {
        let extractor = Arc::new(FakeExtractor::new(2));
        let loader = Arc::new(FakeLoader::new(false));
        let use_case = CrossCopyUseCase::new(extractor.clone(), loader);

        use_case
            .execute("events", "replica.events", &TransferConfig::new())
            .await
            .unwrap();

        let dir = extractor.seen_dir.lock().unwrap().clone().unwrap();
        assert!(!dir.exists(), "staging dir should be removed");
    }

    #[tokio::test]
    async fn test_staging_dir_removed_on_load_failure() {
        let extractor = Arc::new(FakeExtractor::new(1));
        let loader = Arc::new(FakeLoader::new(true));
        let use_case = CrossCopyUseCase::new(extractor.clone(), loader);

        let result = use_case
            .execute("events", "replica.events", &TransferConfig::new())
            .await;

        assert!(matches!(result, Err(TransferError::Load { .. })));
        let dir = extractor.seen_dir.lock().unwrap().clone().unwrap();
        assert!(!dir.exists(), "staging dir should be removed after failure");
    }
}
