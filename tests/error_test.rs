//! エラーケーステスト
//!
//! 各種エラー条件でのエラーハンドリングを検証

use photo_upload_common::{
    FilePayload, ItemId, RemoteFailure, Staging, StagingLimits, SubmissionStatus,
};
use photo_upload_rust::config::Config;
use photo_upload_rust::error::UploadError;
use photo_upload_rust::scanner;
use std::path::Path;
use tempfile::tempdir;

/// 存在しないフォルダをスキャンした場合
#[test]
fn test_scan_nonexistent_folder() {
    let result = scanner::scan_folder(Path::new("/nonexistent/path/12345"), false);
    assert!(result.is_err());

    let err = result.unwrap_err();
    assert!(matches!(err, UploadError::FolderNotFound(_)));
}

/// 空のフォルダをスキャンした場合
#[test]
fn test_scan_empty_folder() {
    let dir = tempdir().expect("Failed to create temp dir");
    let result = scanner::scan_folder(dir.path(), true);

    // 空フォルダはエラーではなく空のVecを返す
    assert!(result.is_ok());
    assert!(result.unwrap().is_empty());
}

/// 壊れた設定ファイル
#[test]
fn test_load_invalid_config() {
    let dir = tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("config.json");
    std::fs::write(&path, "{ not json").unwrap();

    let err = Config::load_from(&path).unwrap_err();
    assert!(matches!(err, UploadError::JsonParse(_)));
}

/// トークン・URL未設定
#[test]
fn test_missing_credentials() {
    let config = Config::default();

    assert!(matches!(config.access_token(), Err(UploadError::MissingAccessToken)));
    assert!(matches!(config.api_url(), Err(UploadError::Config(_))));
}

/// ステージングのエラーはそのまま表示される
#[test]
fn test_staging_errors_are_transparent() {
    let mut staging = Staging::new(StagingLimits::default());

    let unknown = ItemId::new();
    let err: UploadError = staging.set_caption(unknown, None).unwrap_err().into();
    assert_eq!(err.to_string(), format!("Unknown item: {}", unknown));
    assert!(!err.is_validation());

    let id = staging
        .add(FilePayload::new("a.jpg", vec![1], "image/jpeg"))
        .unwrap();
    let err: UploadError = staging
        .transition(id, SubmissionStatus::Submitted)
        .unwrap_err()
        .into();
    assert!(err.to_string().starts_with("Invalid status transition"));

    let err: UploadError = staging
        .add(FilePayload::new("a.gif.exe", vec![1], "application/octet-stream"))
        .unwrap_err()
        .into();
    assert!(err.is_validation());
}

/// リモートの失敗理由は送信結果の文言になる
#[test]
fn test_remote_failure_message() {
    let err = UploadError::from(RemoteFailure::Status {
        status: 500,
        message: "HTTP 500".into(),
    });
    assert_eq!(err.to_string(), "HTTP 500");

    let err = UploadError::from(RemoteFailure::Rpc {
        code: 422,
        message: "caption: too long".into(),
    });
    assert_eq!(err.to_string(), "caption: too long");
}
