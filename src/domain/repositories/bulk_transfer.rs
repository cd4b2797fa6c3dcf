//! # Bulk Transfer Ports
//!
//! クロスストアコピーが依存する抽出・ロードの抽象

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::domain::entities::transfer_config::TransferConfig;
use crate::error::Result;

/// バルク抽出ポート
///
/// クエリまたはテーブルの内容を、指定ディレクトリ配下の1つ以上の
/// シャードファイル（区切りテキスト）として書き出す。
#[async_trait]
pub trait BulkExtractor: Send + Sync {
    /// `source`（クエリ文字列）を `dir` 配下へ抽出し、生成した
    /// シャードファイルのパスをソート順で返す
    async fn extract_to_dir(
        &self,
        source: &str,
        dir: &Path,
        config: &TransferConfig,
    ) -> Result<Vec<PathBuf>>;
}

/// バルクロードポート
///
/// シャードファイル群を宛先テーブルへ取り込む。シャードごとに1回の
/// ロードでも、複数ソースを受け付ける単一ロードでもよい。
#[async_trait]
pub trait BulkLoader: Send + Sync {
    /// `paths` のシャードファイル群を `table` へロードする
    async fn load_paths(
        &self,
        table: &str,
        paths: &[PathBuf],
        config: &TransferConfig,
    ) -> Result<()>;
}
