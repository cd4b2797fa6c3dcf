//! # Use Cases
//!
//! ユースケース（アプリケーションのビジネスフロー）

pub mod cross_copy;

pub use cross_copy::{CopySummary, CrossCopyUseCase};
