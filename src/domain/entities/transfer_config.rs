//! # TransferConfig Value Object
//!
//! 転送フォーマット設定のバリューオブジェクト

use serde::{Deserialize, Serialize};

use crate::error::{Result, TransferError};

/// デフォルト区切り文字（タブ）
pub const DEFAULT_DELIMITER: char = '\t';
/// デフォルト文字エンコーディング
pub const DEFAULT_ENCODING: &str = "UTF8";

/// 転送フォーマット設定
///
/// 1回の転送呼び出しに適用される不変のフォーマット設定。
/// プロセス全体の可変デフォルトは持たず、呼び出しごとに値として渡す。
///
/// 区切り文字とNULLトークンが実データと衝突しないことは呼び出し側の
/// 責任であり、このクレートでは強制しない。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferConfig {
    /// フィールド区切り文字（ASCII 1バイト）
    pub delimiter: char,
    /// 文字エンコーディング名（ネイティブに変換するサービスへ渡す）
    pub encoding: String,
    /// NULL値を表すトークン
    pub null_token: String,
    /// 先頭行がカラム名ヘッダかどうか
    pub header: bool,
    /// 対象カラムの順序付きリスト（省略時は全カラム）
    pub columns: Option<Vec<String>>,
    /// ロード前に宛先テーブルをTRUNCATEするかどうか
    pub truncate_destination: bool,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER,
            encoding: DEFAULT_ENCODING.to_string(),
            null_token: String::new(),
            header: true,
            columns: None,
            truncate_destination: false,
        }
    }
}

impl TransferConfig {
    /// デフォルト設定を作成
    pub fn new() -> Self {
        Self::default()
    }

    /// 区切り文字を変更した設定を返す
    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// エンコーディングを変更した設定を返す
    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = encoding.into();
        self
    }

    /// NULLトークンを変更した設定を返す
    pub fn with_null_token(mut self, null_token: impl Into<String>) -> Self {
        self.null_token = null_token.into();
        self
    }

    /// ヘッダ有無を変更した設定を返す
    pub fn with_header(mut self, header: bool) -> Self {
        self.header = header;
        self
    }

    /// 対象カラムを指定した設定を返す
    pub fn with_columns(mut self, columns: Vec<String>) -> Self {
        self.columns = Some(columns);
        self
    }

    /// TRUNCATE指定を変更した設定を返す
    pub fn with_truncate(mut self, truncate: bool) -> Self {
        self.truncate_destination = truncate;
        self
    }

    /// Validate the configuration and return the delimiter as a single byte.
    ///
    /// The csv writer/reader and the COPY options both need a one-byte
    /// delimiter, so anything outside ASCII is rejected here.
    pub fn delimiter_byte(&self) -> Result<u8> {
        if self.delimiter.is_ascii() {
            Ok(self.delimiter as u8)
        } else {
            Err(TransferError::Configuration(format!(
                "delimiter must be a single ASCII character, got {:?}",
                self.delimiter
            )))
        }
    }

    /// カラム数を返す（未指定時はNone）
    pub fn column_count(&self) -> Option<usize> {
        self.columns.as_ref().map(|c| c.len())
    }
}
