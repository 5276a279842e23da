//! スコアリングサービスのRPCクライアント
//!
//! 通常のメソッドはJSONでPOSTし、ファイルを伴うメソッドは
//! `request` フィールド（JSONエンベロープ）+ ファイルのmultipartで送る。

use crate::config::Config;
use crate::error::Result;
use crate::pipeline::MediaUploader;
use async_trait::async_trait;
use photo_upload_common::{
    decode_response, describe_failure, FilePayload, RawCall, RpcCall, RpcEnvelope,
    SubmissionRequest, UploadParams, UploadReceipt,
};
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const API_KEY_HEADER: &str = "X-Api-Key";

#[derive(Debug, Clone)]
pub struct ScoringClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    access_token: Option<String>,
    next_id: Arc<AtomicU64>,
}

impl ScoringClient {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        access_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            endpoint: endpoint.into(),
            api_key,
            access_token,
            next_id: Arc::new(AtomicU64::new(1)),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            config.api_url()?,
            config.api_key.clone(),
            config.access_token.clone(),
            config.request_timeout(),
        )
    }

    /// アクセストークンだけ差し替えたクライアント（HTTP接続は共有）
    pub fn with_access_token(&self, access_token: Option<String>) -> Self {
        Self {
            access_token,
            ..self.clone()
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn envelope<C: Serialize>(&self, call: C) -> RpcEnvelope<C> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        RpcEnvelope::new(call, self.access_token.clone(), id)
    }

    fn post(&self) -> reqwest::RequestBuilder {
        let builder = self.http.post(&self.endpoint);
        match &self.api_key {
            Some(key) => builder.header(API_KEY_HEADER, key),
            None => builder,
        }
    }

    /// 既知メソッドの呼び出し（resultを型付きで返す）
    pub async fn call<T: DeserializeOwned>(&self, call: RpcCall) -> Result<T> {
        let method = call.method();
        let envelope = self.envelope(call);
        debug!(method, id = envelope.id, "RPC call");

        let response = self.post().json(&envelope).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        debug!(method, status, "RPC response");

        Ok(decode_response(status, &body)?)
    }

    /// 任意メソッドの呼び出し（プロキシ用、ステータスとJSONをそのまま返す）
    pub async fn call_raw(&self, call: RawCall) -> Result<(u16, Value)> {
        debug!(method = %call.method, "RPC proxy call");
        let envelope = self.envelope(call);

        let response = self.post().json(&envelope).send().await?;
        read_raw(response).await
    }

    /// 任意メソッドのmultipart呼び出し（プロキシ用）
    pub async fn call_raw_multipart(
        &self,
        call: RawCall,
        files: Vec<(String, FilePayload)>,
    ) -> Result<(u16, Value)> {
        debug!(method = %call.method, files = files.len(), "RPC proxy multipart call");
        let envelope = self.envelope(call);

        let mut form = Form::new().text("request", serde_json::to_string(&envelope)?);
        for (field, file) in files {
            form = form.part(field, file_part(file)?);
        }

        let response = self.post().multipart(form).send().await?;
        read_raw(response).await
    }

    /// media.upload（1ファイル）
    pub async fn upload_media(&self, request: &SubmissionRequest) -> Result<UploadReceipt> {
        let envelope = self.envelope(RpcCall::UploadMedia(UploadParams {
            game_id: request.game_id,
            file_name: request.file.name.clone(),
            caption: request.caption.clone(),
            team: request.team,
            kind: request.kind,
        }));
        debug!(
            file = %request.file.name,
            size = request.file.size(),
            game_id = request.game_id,
            "Uploading media"
        );

        let form = Form::new()
            .text("request", serde_json::to_string(&envelope)?)
            .part("file", file_part(request.file.clone())?);

        let response = self.post().multipart(form).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        Ok(decode_response(status, &body)?)
    }
}

#[async_trait]
impl MediaUploader for ScoringClient {
    async fn upload(&self, request: &SubmissionRequest) -> Result<UploadReceipt> {
        self.upload_media(request).await
    }
}

fn file_part(file: FilePayload) -> Result<Part> {
    let part = Part::bytes(file.bytes)
        .file_name(file.name)
        .mime_str(&file.mime_type)?;
    Ok(part)
}

/// レスポンスをJSONとして読む（JSONでなければerrorオブジェクトに包む）
async fn read_raw(response: reqwest::Response) -> Result<(u16, Value)> {
    let status = response.status().as_u16();
    let body = response.text().await?;

    let value = serde_json::from_str::<Value>(&body).unwrap_or_else(|_| {
        json!({ "error": { "message": describe_failure(status, &body) } })
    });

    Ok((status, value))
}
