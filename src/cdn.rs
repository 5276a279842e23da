//! CDN（画像ホスティング）連携
//!
//! アップロード・一覧・タグ更新をCDNのREST APIへ転送する。
//! フォルダは `photos/{userId}/{gameNumber}`、ユーザーが保存できるメタデータはタグのみ。

use crate::config::CdnConfig;
use crate::error::{Result, UploadError};
use cmov::Cmov;
use lazy_static::lazy_static;
use photo_upload_common::FilePayload;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::{debug, info};

lazy_static! {
    static ref UNSAFE_SEGMENT: Regex = Regex::new(r"[^A-Za-z0-9_-]").unwrap();
}

const MAX_TAGS: usize = 20;
const MAX_TAG_LEN: usize = 64;
/// 通知タイムスタンプの許容ずれ（秒）
pub const NOTIFICATION_TOLERANCE_SECS: i64 = 7200;

/// CDN上のアセット
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CdnAsset {
    pub public_id: String,
    pub secure_url: String,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ResourceList {
    #[serde(default)]
    resources: Vec<CdnAsset>,
}

#[derive(Debug, Deserialize)]
struct CdnErrorBody {
    error: CdnErrorMessage,
}

#[derive(Debug, Deserialize)]
struct CdnErrorMessage {
    message: String,
}

/// フォルダパス（各セグメントは英数字・_・- のみ）
pub fn folder_for(user_id: &str, game_number: &str) -> String {
    format!(
        "photos/{}/{}",
        sanitize_segment(user_id),
        sanitize_segment(game_number)
    )
}

fn sanitize_segment(segment: &str) -> String {
    let cleaned = UNSAFE_SEGMENT.replace_all(segment.trim(), "_");
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned.into_owned()
    }
}

/// カンマ区切りのタグを整形（空要素・重複を除去）
pub fn parse_tags(raw: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for tag in raw.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let tag: String = tag.chars().take(MAX_TAG_LEN).collect();
        if !tags.contains(&tag) {
            tags.push(tag);
        }
        if tags.len() == MAX_TAGS {
            break;
        }
    }
    tags
}

/// パラメータ署名（キー順に `k=v` を & で連結し、シークレットを付けてSHA-256）
pub fn sign_params(params: &[(&str, String)], secret: &str) -> String {
    let mut sorted: Vec<&(&str, String)> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));

    let joined = sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha256::new();
    hasher.update(joined.as_bytes());
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone)]
pub struct CdnClient {
    http: reqwest::Client,
    base_url: String,
    cloud_name: String,
    api_key: String,
    api_secret: String,
}

impl CdnClient {
    pub fn from_config(config: &CdnConfig, timeout: Duration) -> Result<Self> {
        let required = |value: &Option<String>, name: &str| {
            value
                .clone()
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| UploadError::Config(format!("{} が設定されていません", name)))
        };

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| UploadError::Cdn(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            cloud_name: required(&config.cloud_name, "CDN_CLOUD_NAME")?,
            api_key: required(&config.api_key, "CDN_API_KEY")?,
            api_secret: required(&config.api_secret, "CDN_API_SECRET")?,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}/{}", self.base_url, self.cloud_name, path)
    }

    /// 署名付きアップロード
    pub async fn upload(&self, file: &FilePayload, folder: &str, tags: &[String]) -> Result<CdnAsset> {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let mut params: Vec<(&str, String)> = vec![
            ("folder", folder.to_string()),
            ("timestamp", timestamp),
        ];
        if !tags.is_empty() {
            params.push(("tags", tags.join(",")));
        }
        let signature = sign_params(&params, &self.api_secret);

        let part = reqwest::multipart::Part::bytes(file.bytes.clone())
            .file_name(file.name.clone())
            .mime_str(&file.mime_type)
            .map_err(|e| UploadError::Cdn(e.to_string()))?;

        let mut form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("api_key", self.api_key.clone())
            .text("signature", signature)
            .text("signature_algorithm", "sha256");
        for (key, value) in params {
            form = form.text(key, value);
        }

        debug!(file = %file.name, folder, "Uploading to CDN");
        let response = self
            .http
            .post(self.url("auto/upload"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| UploadError::Cdn(e.to_string()))?;

        let asset: CdnAsset = read_json(response).await?;
        info!(public_id = %asset.public_id, "Uploaded to CDN");
        Ok(asset)
    }

    /// フォルダ内のアセット一覧
    pub async fn list(&self, folder: &str) -> Result<Vec<CdnAsset>> {
        let prefix = format!("{}/", folder.trim_end_matches('/'));
        let response = self
            .http
            .get(self.url("resources/image/upload"))
            .basic_auth(&self.api_key, Some(&self.api_secret))
            .query(&[
                ("prefix", prefix.as_str()),
                ("tags", "true"),
                ("max_results", "100"),
            ])
            .send()
            .await
            .map_err(|e| UploadError::Cdn(e.to_string()))?;

        let list: ResourceList = read_json(response).await?;
        Ok(list.resources)
    }

    /// タグの更新（既存タグは置き換え）
    pub async fn update_tags(&self, public_id: &str, tags: &[String]) -> Result<CdnAsset> {
        if public_id.trim().is_empty() || public_id.contains("..") {
            return Err(UploadError::Validation(format!("invalid public_id: {:?}", public_id)));
        }

        let response = self
            .http
            .post(self.url(&format!("resources/image/upload/{}", public_id)))
            .basic_auth(&self.api_key, Some(&self.api_secret))
            .form(&[("tags", tags.join(","))])
            .send()
            .await
            .map_err(|e| UploadError::Cdn(e.to_string()))?;

        read_json(response).await
    }

    /// Webhook通知の署名検証（SHA-256(body + timestamp + secret)）
    ///
    /// `now` から [`NOTIFICATION_TOLERANCE_SECS`] 以上ずれた通知は拒否する
    pub fn verify_notification(
        &self,
        body: &[u8],
        timestamp: &str,
        signature: &str,
        now: i64,
    ) -> bool {
        let Ok(sent_at) = timestamp.trim().parse::<i64>() else {
            return false;
        };
        if (now - sent_at).abs() > NOTIFICATION_TOLERANCE_SECS {
            return false;
        }
        let Ok(provided) = hex::decode(signature.trim()) else {
            return false;
        };

        let mut hasher = Sha256::new();
        hasher.update(body);
        hasher.update(timestamp.as_bytes());
        hasher.update(self.api_secret.as_bytes());

        ct_eq(hasher.finalize().as_slice(), &provided)
    }
}

/// 定数時間のバイト比較（長さ違いは即false）
fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut equal = 1u8;
    for (x, y) in a.iter().zip(b) {
        equal.cmovz(&0u8, u8::from(x == y));
    }
    equal != 0
}

async fn read_json<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| UploadError::Cdn(e.to_string()))?;

    if !status.is_success() {
        let message = serde_json::from_str::<CdnErrorBody>(&body)
            .map(|b| b.error.message)
            .unwrap_or_else(|_| format!("HTTP {}", status.as_u16()));
        return Err(UploadError::Cdn(message));
    }

    serde_json::from_str(&body).map_err(|e| UploadError::Cdn(format!("unexpected response: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> CdnClient {
        let config = CdnConfig {
            cloud_name: Some("demo".into()),
            api_key: Some("key".into()),
            api_secret: Some("secret".into()),
            base_url: "http://localhost:1/v1_1/".into(),
        };
        CdnClient::from_config(&config, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_folder_for() {
        assert_eq!(folder_for("123", "7"), "photos/123/7");
        assert_eq!(folder_for("12/../3", "game 7"), "photos/12____3/game_7");
        assert_eq!(folder_for("", "1"), "photos/_/1");
    }

    #[test]
    fn test_parse_tags() {
        assert_eq!(parse_tags("goal, home ,,goal,  "), vec!["goal", "home"]);
        assert!(parse_tags("").is_empty());

        let many = (0..50).map(|i| i.to_string()).collect::<Vec<_>>().join(",");
        assert_eq!(parse_tags(&many).len(), MAX_TAGS);
    }

    #[test]
    fn test_sign_params_is_order_independent() {
        let a = sign_params(
            &[("timestamp", "1".into()), ("folder", "photos/1/2".into())],
            "secret",
        );
        let b = sign_params(
            &[("folder", "photos/1/2".into()), ("timestamp", "1".into())],
            "secret",
        );
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, sign_params(&[("folder", "photos/1/2".into())], "secret"));
    }

    #[test]
    fn test_from_config_requires_credentials() {
        let err = CdnClient::from_config(&CdnConfig::default(), Duration::from_secs(5)).unwrap_err();
        assert!(matches!(err, UploadError::Config(_)));

        assert_eq!(client().url("auto/upload"), "http://localhost:1/v1_1/demo/auto/upload");
    }

    #[test]
    fn test_verify_notification() {
        let client = client();
        let body = br#"{"notification_type":"upload"}"#;

        let mut hasher = Sha256::new();
        hasher.update(body);
        hasher.update(b"1700000000");
        hasher.update(b"secret");
        let signature = hex::encode(hasher.finalize());

        let now = 1_700_000_060;
        assert!(client.verify_notification(body, "1700000000", &signature, now));
        assert!(client.verify_notification(body, "1700000000", &signature.to_uppercase(), now));
        assert!(!client.verify_notification(body, "1700000001", &signature, now));
        assert!(!client.verify_notification(b"tampered", "1700000000", &signature, now));
        assert!(!client.verify_notification(body, "1700000000", &signature[..62], now));
        assert!(!client.verify_notification(body, "1700000000", "not-hex", now));
        assert!(!client.verify_notification(body, "soon", &signature, now));
    }

    /// 古い通知の再送は署名が正しくても拒否
    #[test]
    fn test_verify_notification_rejects_stale_timestamp() {
        let client = client();
        let body = br#"{"notification_type":"upload"}"#;

        let mut hasher = Sha256::new();
        hasher.update(body);
        hasher.update(b"1700000000");
        hasher.update(b"secret");
        let signature = hex::encode(hasher.finalize());

        let sent_at = 1_700_000_000;
        let verify = |now: i64| client.verify_notification(body, "1700000000", &signature, now);
        assert!(verify(sent_at + NOTIFICATION_TOLERANCE_SECS));
        assert!(verify(sent_at - NOTIFICATION_TOLERANCE_SECS));
        assert!(!verify(sent_at + NOTIFICATION_TOLERANCE_SECS + 1));
        assert!(!verify(sent_at - NOTIFICATION_TOLERANCE_SECS - 1));
    }

    #[test]
    fn test_ct_eq() {
        assert!(ct_eq(b"abc", b"abc"));
        assert!(!ct_eq(b"abc", b"abd"));
        assert!(!ct_eq(b"abc", b"ab"));
        assert!(ct_eq(b"", b""));
    }
}
