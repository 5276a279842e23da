//! スコアリングサービスのRPCエンベロープ
//!
//! リクエストは `{jsonrpc, method, params, id}` 形式。
//! 既知のメソッドは `RpcCall` で型付けし、レスポンスは境界で検証する。

use crate::types::{MediaKind, TeamAssociation};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub const JSONRPC_VERSION: &str = "2.0";

/// 既知のリモートメソッド
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "method", content = "params")]
pub enum RpcCall {
    #[serde(rename = "user.games")]
    UserGames { user_id: u64 },

    #[serde(rename = "user.teams")]
    UserTeams { user_id: u64 },

    #[serde(rename = "team.games")]
    TeamGames { team_id: u64 },

    #[serde(rename = "media.upload")]
    UploadMedia(UploadParams),
}

impl RpcCall {
    pub fn method(&self) -> &'static str {
        match self {
            RpcCall::UserGames { .. } => "user.games",
            RpcCall::UserTeams { .. } => "user.teams",
            RpcCall::TeamGames { .. } => "team.games",
            RpcCall::UploadMedia(_) => "media.upload",
        }
    }
}

/// media.upload のパラメータ（ファイル本体はmultipartで別送）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadParams {
    pub game_id: u64,
    pub file_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    pub team: TeamAssociation,
    pub kind: MediaKind,
}

/// 任意メソッド呼び出し（プロキシ用）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawCall {
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// リクエストエンベロープ
#[derive(Debug, Clone, Serialize)]
pub struct RpcEnvelope<C> {
    pub jsonrpc: &'static str,
    #[serde(flatten)]
    pub call: C,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    pub id: u64,
}

impl<C: Serialize> RpcEnvelope<C> {
    pub fn new(call: C, access_token: Option<String>, id: u64) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            call,
            access_token,
            id,
        }
    }
}

/// フィールド単位のエラー
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RpcErrorData {
    #[serde(default)]
    pub fields: Vec<FieldError>,
}

/// レスポンスのerrorオブジェクト
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RpcErrorObject {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Option<RpcErrorData>,
}

impl RpcErrorObject {
    /// フィールドエラー → トップレベルmessage の順で表示文字列を作る
    pub fn summary(&self) -> Option<String> {
        let field_error = self
            .data
            .as_ref()
            .and_then(|d| d.fields.iter().find(|f| !f.message.trim().is_empty()));

        if let Some(f) = field_error {
            return Some(format!("{}: {}", f.field, f.message.trim()));
        }

        let message = self.message.trim();
        if message.is_empty() {
            None
        } else {
            Some(message.to_string())
        }
    }
}

/// レスポンスエンベロープ
#[derive(Debug, Clone, Deserialize)]
pub struct RpcResponse<T> {
    #[serde(default = "Option::default")]
    pub result: Option<T>,
    #[serde(default)]
    pub error: Option<RpcErrorObject>,
}

/// リモート呼び出しの失敗（表示文字列は正規化済み）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteFailure {
    #[error("{message}")]
    Status { status: u16, message: String },

    #[error("{message}")]
    Rpc { code: i64, message: String },

    #[error("Malformed response: {0}")]
    Malformed(String),
}

/// 失敗時の表示文字列
///
/// 優先順位:
/// 1. フィールド単位のエラー
/// 2. トップレベルの error.message
/// 3. "HTTP {status}"
pub fn describe_failure(status: u16, body: &str) -> String {
    serde_json::from_str::<RpcResponse<serde_json::Value>>(body)
        .ok()
        .and_then(|r| r.error)
        .and_then(|e| e.summary())
        .unwrap_or_else(|| format!("HTTP {}", status))
}

/// HTTPステータスとボディからresultを取り出す
pub fn decode_response<T: DeserializeOwned>(
    status: u16,
    body: &str,
) -> std::result::Result<T, RemoteFailure> {
    if !(200..300).contains(&status) {
        return Err(RemoteFailure::Status {
            status,
            message: describe_failure(status, body),
        });
    }

    let response: RpcResponse<T> =
        serde_json::from_str(body).map_err(|e| RemoteFailure::Malformed(e.to_string()))?;

    if let Some(error) = response.error {
        let message = error
            .summary()
            .unwrap_or_else(|| format!("Remote error {}", error.code));
        return Err(RemoteFailure::Rpc {
            code: error.code,
            message,
        });
    }

    response
        .result
        .ok_or_else(|| RemoteFailure::Malformed("response has neither result nor error".into()))
}

// =============================================
// メソッドごとのレスポンス型
// =============================================

/// リモートの試合（チームはIDのみ）
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteGame {
    pub id: u64,
    pub home_team_id: u64,
    pub away_team_id: u64,
    #[serde(default)]
    pub sport_name: Option<String>,
    pub start_time: i64,
    #[serde(default)]
    pub last_score: Option<String>,
}

/// リモートのチーム
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteTeam {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub short_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GameCollections {
    #[serde(default)]
    pub games: Vec<RemoteGame>,
    #[serde(default)]
    pub teams: Vec<RemoteTeam>,
}

/// user.games / team.games のresult
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GamesPayload {
    #[serde(default)]
    pub game_ids: Vec<u64>,
    #[serde(default)]
    pub collections: GameCollections,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TeamCollections {
    #[serde(default)]
    pub teams: Vec<RemoteTeam>,
}

/// user.teams のresult
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamsPayload {
    #[serde(default)]
    pub team_ids: Vec<u64>,
    #[serde(default)]
    pub collections: TeamCollections,
}

/// リモートが採番したID（数値・文字列どちらも受ける）
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RemoteId {
    Number(u64),
    Text(String),
}

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteId::Number(n) => write!(f, "{}", n),
            RemoteId::Text(s) => f.write_str(s),
        }
    }
}

/// media.upload のresult
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReceipt {
    pub media_id: RemoteId,
}
