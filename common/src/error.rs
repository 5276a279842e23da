//! エラー型定義

use thiserror::Error;

use crate::types::{ItemId, SubmissionStatus};

/// 共通エラー型
#[derive(Error, Debug)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown item: {0}")]
    UnknownItem(ItemId),

    #[error("Invalid status transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: SubmissionStatus,
        to: SubmissionStatus,
    },
}

/// Result型エイリアス
pub type Result<T> = std::result::Result<T, Error>;
