use photo_upload_common::RemoteFailure;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("設定エラー: {0}")]
    Config(String),

    #[error("アクセストークンが設定されていません。`photo-upload config --set-access-token TOKEN` で設定してください")]
    MissingAccessToken,

    #[error("入力エラー: {0}")]
    Validation(String),

    #[error(transparent)]
    Remote(#[from] RemoteFailure),

    #[error("Failed to fetch games")]
    FetchGames,

    #[error("Rate limit exceeded, try again in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("CDNエラー: {0}")]
    Cdn(String),

    #[error("フォルダが見つかりません: {0}")]
    FolderNotFound(String),

    #[error("アップロード対象のファイルが見つかりません: {0}")]
    NoMediaFound(String),

    #[error("HTTPエラー: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON解析エラー: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IOエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Common(#[from] photo_upload_common::Error),
}

impl UploadError {
    /// 400相当の入力エラーか（リモート呼び出し前に弾くもの）
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            UploadError::Validation(_)
                | UploadError::Common(photo_upload_common::Error::Validation(_))
        )
    }
}

pub type Result<T> = std::result::Result<T, UploadError>;
