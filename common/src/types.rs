//! アップロード対象の型定義
//!
//! CLIとHTTPサーバで共有される型:
//! - MediaItem: ステージング中の写真・動画
//! - SubmissionRequest / SubmissionResult: 1件ごとの送信と結果
//! - BatchResult: バッチ送信の集計
//! - GameRecord: スコアリングサービスから取得した試合

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// ステージング時に割り当てるローカルID
///
/// 送信結果にも引き継がれ、再送時の突き合わせに使う
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(Uuid);

impl ItemId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// チーム紐付け
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TeamAssociation {
    Home,
    Away,
    None,
    #[default]
    Unset,
}

impl TeamAssociation {
    pub fn as_str(&self) -> &'static str {
        match self {
            TeamAssociation::Home => "home",
            TeamAssociation::Away => "away",
            TeamAssociation::None => "none",
            TeamAssociation::Unset => "unset",
        }
    }
}

impl FromStr for TeamAssociation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "home" => Ok(TeamAssociation::Home),
            "away" => Ok(TeamAssociation::Away),
            "none" => Ok(TeamAssociation::None),
            "" | "unset" => Ok(TeamAssociation::Unset),
            other => Err(Error::Validation(format!("unknown team association: {}", other))),
        }
    }
}

/// メディア種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Photo,
    Video,
}

impl MediaKind {
    /// MIMEタイプから種別を判定（画像・動画以外はNone）
    pub fn from_mime(mime_type: &str) -> Option<Self> {
        let top = mime_type.split('/').next()?.trim().to_ascii_lowercase();
        match top.as_str() {
            "image" => Some(MediaKind::Photo),
            "video" => Some(MediaKind::Video),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Photo => "photo",
            MediaKind::Video => "video",
        }
    }
}

/// 送信ステータス
///
/// pending → ready → submitting → {submitted | failed}、failed → submitting のみ許可
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    #[default]
    Pending,
    Ready,
    Submitting,
    Submitted,
    Failed,
}

impl SubmissionStatus {
    pub fn can_transition_to(&self, next: SubmissionStatus) -> bool {
        use SubmissionStatus::*;
        matches!(
            (self, next),
            (Pending, Ready)
                | (Ready, Submitting)
                | (Submitting, Submitted)
                | (Submitting, Failed)
                | (Failed, Submitting)
        )
    }
}

/// ファイル本体（名前・バイト列・MIMEタイプ）
#[derive(Clone, PartialEq, Eq)]
pub struct FilePayload {
    pub name: String,
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl FilePayload {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bytes,
            mime_type: mime_type.into(),
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

impl fmt::Debug for FilePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilePayload")
            .field("name", &self.name)
            .field("size", &self.bytes.len())
            .field("mime_type", &self.mime_type)
            .finish()
    }
}

/// ステージング中のメディア
#[derive(Debug, Clone)]
pub struct MediaItem {
    pub id: ItemId,
    pub file: FilePayload,
    pub caption: Option<String>,
    pub team: TeamAssociation,
    pub kind: MediaKind,
    pub status: SubmissionStatus,
}

/// 1件分の送信リクエスト
#[derive(Debug, Clone)]
pub struct SubmissionRequest {
    pub item_id: ItemId,
    pub file: FilePayload,
    pub game_id: u64,
    pub caption: Option<String>,
    pub team: TeamAssociation,
    pub kind: MediaKind,
}

/// 1件分の送信結果（生成後は変更しない）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionResult {
    pub item_id: ItemId,
    pub succeeded: bool,
    pub source_file_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl SubmissionResult {
    pub fn success(item_id: ItemId, file_name: impl Into<String>, remote_id: impl Into<String>) -> Self {
        Self {
            item_id,
            succeeded: true,
            source_file_name: file_name.into(),
            remote_id: Some(remote_id.into()),
            error_message: None,
        }
    }

    pub fn failure(item_id: ItemId, file_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            item_id,
            succeeded: false,
            source_file_name: file_name.into(),
            remote_id: None,
            error_message: Some(message.into()),
        }
    }
}

/// バッチ全体の結果区分（UI表示用）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    Empty,
    AllSucceeded,
    Partial,
    AllFailed,
}

/// バッチ送信の集計
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    pub successes: Vec<SubmissionResult>,
    pub failures: Vec<SubmissionResult>,
    pub total: usize,
    pub success_count: usize,
    pub failure_count: usize,
}

impl BatchResult {
    /// 結果列を成功・失敗に振り分ける（順序は維持）
    pub fn from_results(results: Vec<SubmissionResult>) -> Self {
        let total = results.len();
        let (successes, failures): (Vec<_>, Vec<_>) =
            results.into_iter().partition(|r| r.succeeded);

        Self {
            success_count: successes.len(),
            failure_count: failures.len(),
            successes,
            failures,
            total,
        }
    }

    pub fn outcome(&self) -> BatchOutcome {
        match (self.success_count, self.failure_count) {
            (0, 0) => BatchOutcome::Empty,
            (_, 0) => BatchOutcome::AllSucceeded,
            (0, _) => BatchOutcome::AllFailed,
            _ => BatchOutcome::Partial,
        }
    }

    pub fn failed_file_names(&self) -> Vec<&str> {
        self.failures
            .iter()
            .map(|r| r.source_file_name.as_str())
            .collect()
    }
}

/// 試合情報（チーム名は解決済み）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameRecord {
    pub game_id: u64,
    pub home_team_id: u64,
    pub away_team_id: u64,
    pub home_team_name: String,
    pub away_team_name: String,
    pub sport_name: String,
    /// 開始時刻（UNIX秒）
    pub start_time: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_score: Option<String>,
}

impl GameRecord {
    pub fn title(&self) -> String {
        format!("{} vs {}", self.home_team_name, self.away_team_name)
    }
}
