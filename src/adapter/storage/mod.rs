//! Object Storage Adapter Modules
//!
//! オブジェクトストレージ統合のためのアダプターモジュール

pub mod bucket;

pub use bucket::{GcsBucket, ObjectStorage};
