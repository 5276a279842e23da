use crate::error::{Result, UploadError};
use crate::remote::LookupStrategy;
use photo_upload_common::StagingLimits;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

/// CDN接続設定
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CdnConfig {
    pub cloud_name: Option<String>,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub base_url: String,
}

impl Default for CdnConfig {
    fn default() -> Self {
        Self {
            cloud_name: None,
            api_key: None,
            api_secret: None,
            base_url: "https://api.cloudinary.com/v1_1".into(),
        }
    }
}

impl CdnConfig {
    pub fn is_configured(&self) -> bool {
        [&self.cloud_name, &self.api_key, &self.api_secret]
            .iter()
            .all(|v| v.as_deref().is_some_and(|s| !s.trim().is_empty()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// スコアリングサービスのRPCエンドポイント
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub access_token: Option<String>,
    pub cdn: CdnConfig,
    pub port: u16,
    /// バッチ送信の間隔（ミリ秒）
    pub upload_cooldown_ms: u64,
    pub request_timeout_secs: u64,
    pub rate_limit_window_secs: u64,
    pub lookup_strategy: LookupStrategy,
    pub max_photo_bytes: u64,
    pub max_video_bytes: u64,
}

impl Default for Config {
    fn default() -> Self {
        let limits = StagingLimits::default();
        Self {
            api_url: None,
            api_key: None,
            access_token: None,
            cdn: CdnConfig::default(),
            port: 3000,
            upload_cooldown_ms: 1000,
            request_timeout_secs: 60,
            rate_limit_window_secs: 60,
            lookup_strategy: LookupStrategy::default(),
            max_photo_bytes: limits.max_photo_bytes,
            max_video_bytes: limits.max_video_bytes,
        }
    }
}

impl Config {
    /// 設定ファイル + 環境変数で読み込み
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// 設定ファイルのみ読み込み（無ければデフォルト）
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| UploadError::Config("ホームディレクトリが見つかりません".into()))?;
        Ok(home.join(".config").join("photo-upload").join("config.json"))
    }

    /// 環境変数を優先して上書き
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = text("SCORING_API_URL") {
            self.api_url = Some(v);
        }
        if let Some(v) = text("SCORING_API_KEY") {
            self.api_key = Some(v);
        }
        if let Some(v) = text("SCORING_ACCESS_TOKEN") {
            self.access_token = Some(v);
        }
        if let Some(v) = text("CDN_CLOUD_NAME") {
            self.cdn.cloud_name = Some(v);
        }
        if let Some(v) = text("CDN_API_KEY") {
            self.cdn.api_key = Some(v);
        }
        if let Some(v) = text("CDN_API_SECRET") {
            self.cdn.api_secret = Some(v);
        }
        if let Some(v) = text("CDN_BASE_URL") {
            self.cdn.base_url = v;
        }

        parse_override(&lookup, "PORT", &mut self.port);
        parse_override(&lookup, "UPLOAD_COOLDOWN_MS", &mut self.upload_cooldown_ms);
        parse_override(&lookup, "RATE_LIMIT_WINDOW_SECS", &mut self.rate_limit_window_secs);
    }

    pub fn api_url(&self) -> Result<&str> {
        self.api_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| UploadError::Config("SCORING_API_URL が設定されていません".into()))
    }

    pub fn access_token(&self) -> Result<String> {
        self.access_token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .ok_or(UploadError::MissingAccessToken)
    }

    pub fn set_api_key(&mut self, key: String) -> Result<()> {
        self.api_key = Some(key);
        self.save()
    }

    pub fn set_access_token(&mut self, token: String) -> Result<()> {
        self.access_token = Some(token);
        self.save()
    }

    pub fn set_api_url(&mut self, url: String) -> Result<()> {
        self.api_url = Some(url);
        self.save()
    }

    pub fn staging_limits(&self) -> StagingLimits {
        StagingLimits {
            max_photo_bytes: self.max_photo_bytes,
            max_video_bytes: self.max_video_bytes,
        }
    }

    pub fn upload_cooldown(&self) -> Duration {
        Duration::from_millis(self.upload_cooldown_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }
}

/// 数値の環境変数（不正値は警告して現在値を維持）
fn parse_override<F, T>(lookup: &F, key: &str, target: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Display,
    T::Err: Display,
{
    let Some(raw) = lookup(key) else {
        return;
    };

    match raw.trim().parse::<T>() {
        Ok(value) => {
            info!("{key} set from environment: {value}");
            *target = value;
        }
        Err(e) => warn!("Invalid {key} value {raw:?}: {e}, keeping {target}"),
    }
}
