//! # Bulksync
//!
//! サードパーティのデータサービスを橋渡しする薄いアダプターユーティリティ集
//!
//! PostgreSQLのバルクCOPY、BigQueryの非同期ジョブ（ロード/エクスポート/
//! クエリ）、Cloud Storageのステージングバケット、Slack通知シンクを、
//! ひとつの転送パイプラインとして合成します：
//! 区切りテキストコーデック → バルクコピー → 非同期ジョブポーリング →
//! クロスストアコピー。
//!
//! このプロジェクトはクリーンアーキテクチャを採用しており、以下の3層で
//! 構成されています：
//!
//! - **Domain層**: 転送モデルとコーデック（外部サービス依存なし）
//! - **Application層**: ユースケース（クロスストアコピー）
//! - **Adapter層**: 外部システムとの統合（PostgreSQL, BigQuery, GCS, Slack）

// coverage_nightly cfg が設定されている場合のみ coverage_attribute を有効化
// カバレッジ計測時に外部サービス依存コードを除外するために使用
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

// Domain層（純粋な転送モデル）
pub mod domain;

// Application層（ユースケース）
pub mod application;

// Adapter層（Infrastructure）
pub mod adapter;

// エラー型
pub mod error;

pub use error::{Result, TransferError};
