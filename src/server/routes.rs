use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{FromRequest, Multipart, Path, Query, Request, State},
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::CookieJar;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use photo_upload_common::{BatchResult, FilePayload, RawCall, Staging, TeamAssociation};

use super::state::AppState;
use crate::{
    cdn::{folder_for, parse_tags, CdnAsset},
    error::{Result, UploadError},
    pipeline::BatchPipeline,
    rate_limiter::buckets,
    remote::{fetch_games, parse_user_id},
};

const SIGNATURE_HEADER: &str = "x-cld-signature";
const TIMESTAMP_HEADER: &str = "x-cld-timestamp";

#[derive(Serialize)]
pub struct HealthChecks {
    pub remote_api: bool,
    pub cdn: bool,
    pub access_token: bool,
}

#[derive(Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub checks: HealthChecks,
}

pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let checks = HealthChecks {
        remote_api: state.scoring.is_some(),
        cdn: state.cdn.is_some(),
        access_token: state.config.access_token.is_some(),
    };
    let healthy = checks.remote_api && checks.cdn && checks.access_token;

    let report = HealthReport {
        status: if healthy { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.started_at.elapsed().as_secs(),
        checks,
    };
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(report))
}

/// multipartのテキスト項目とファイル項目
#[derive(Default)]
struct MultipartForm {
    texts: HashMap<String, String>,
    files: Vec<(String, FilePayload)>,
}

impl MultipartForm {
    fn text(&self, name: &str) -> Option<&str> {
        self.texts.get(name).map(|v| v.trim()).filter(|v| !v.is_empty())
    }

    fn required(&self, name: &str) -> Result<&str> {
        self.text(name)
            .ok_or_else(|| UploadError::Validation(format!("{} is required", name)))
    }
}

async fn read_multipart(multipart: &mut Multipart) -> Result<MultipartForm> {
    let malformed = |e: axum::extract::multipart::MultipartError| {
        UploadError::Validation(format!("malformed multipart body: {}", e.body_text()))
    };

    let mut form = MultipartForm::default();
    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        let name = field.name().unwrap_or_default().to_string();

        match field.file_name().map(str::to_string) {
            Some(file_name) => {
                let mime_type = field
                    .content_type()
                    .map(str::to_string)
                    .filter(|m| m != "application/octet-stream")
                    .or_else(|| mime_guess::from_path(&file_name).first_raw().map(str::to_string))
                    .unwrap_or_default();
                let bytes = field.bytes().await.map_err(malformed)?;
                form.files
                    .push((name, FilePayload::new(file_name, bytes.to_vec(), mime_type)));
            }
            None => {
                let value = field.text().await.map_err(malformed)?;
                form.texts.insert(name, value);
            }
        }
    }

    Ok(form)
}

#[derive(Serialize)]
pub struct AssetsResponse {
    pub folder: String,
    pub assets: Vec<CdnAsset>,
}

/// CDNへの直接アップロード
pub async fn upload(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<AssetsResponse>> {
    state.limit(&headers, buckets::UPLOAD).await?;
    let form = read_multipart(&mut multipart).await?;

    let user_id = form.required("user_id")?;
    parse_user_id(user_id)?;
    let game_number = form.required("game_number")?;
    let tags = parse_tags(form.text("tags").unwrap_or_default());

    if form.files.is_empty() {
        return Err(UploadError::Validation("no files were uploaded".into()));
    }
    let limits = state.config.staging_limits();
    for (_, file) in &form.files {
        photo_upload_common::validate_file(file, &limits)?;
    }

    let cdn = state.cdn()?;
    let folder = folder_for(user_id, game_number);
    let mut assets = Vec::with_capacity(form.files.len());
    for (_, file) in &form.files {
        assets.push(cdn.upload(file, &folder, &tags).await?);
    }

    info!(folder = %folder, count = assets.len(), "CDN upload complete");
    Ok(Json(AssetsResponse { folder, assets }))
}

#[derive(Deserialize)]
pub struct ListQuery {
    pub user_id: String,
    pub game_number: String,
}

pub async fn list_photos(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Json<AssetsResponse>> {
    state.limit(&headers, buckets::LIST).await?;
    parse_user_id(&query.user_id)?;
    if query.game_number.trim().is_empty() {
        return Err(UploadError::Validation("game_number is required".into()));
    }

    let folder = folder_for(&query.user_id, &query.game_number);
    let assets = state.cdn()?.list(&folder).await?;
    Ok(Json(AssetsResponse { folder, assets }))
}

#[derive(Deserialize)]
pub struct UpdateRequest {
    pub public_id: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

pub async fn update_photo(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<UpdateRequest>,
) -> Result<Json<CdnAsset>> {
    state.limit(&headers, buckets::UPDATE).await?;
    let tags = parse_tags(&request.tags.join(","));
    let asset = state.cdn()?.update_tags(&request.public_id, &tags).await?;
    Ok(Json(asset))
}

#[derive(Deserialize)]
pub struct GamesQuery {
    pub user_id: String,
}

pub async fn games(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    jar: CookieJar,
    Query(query): Query<GamesQuery>,
) -> Result<Json<Vec<photo_upload_common::GameRecord>>> {
    state.limit(&headers, buckets::GAMES).await?;
    parse_user_id(&query.user_id)?;

    let client = state.scoring()?.with_access_token(state.access_token(&jar));
    let games = fetch_games(&client, &query.user_id, state.config.lookup_strategy).await?;
    Ok(Json(games))
}

/// 試合へのメディア一括送信（ステージング → 送信パイプライン）
pub async fn submit_media(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    jar: CookieJar,
    Path(game_id): Path<u64>,
    mut multipart: Multipart,
) -> Result<Json<BatchResult>> {
    state.limit(&headers, buckets::UPLOAD).await?;
    let form = read_multipart(&mut multipart).await?;

    let team: TeamAssociation = form.text("team").unwrap_or_default().parse()?;
    let caption = form.text("caption").map(str::to_string);

    // 全ファイルを検証してから送信を始める
    let mut staging = Staging::new(state.config.staging_limits());
    for (_, file) in form.files {
        let id = staging.add(file)?;
        staging.set_caption(id, caption.clone())?;
        staging.set_team(id, team)?;
    }
    if staging.mark_all_ready() == 0 {
        return Err(UploadError::Validation("no files were uploaded".into()));
    }

    let client = state.scoring()?.with_access_token(state.access_token(&jar));
    let pipeline = BatchPipeline::new(client, state.config.upload_cooldown());
    let requests = staging.submission_requests(game_id);

    let batch = pipeline
        .submit_all(&requests, |done, total, result| {
            debug!(done, total, file = %result.source_file_name, succeeded = result.succeeded, "Submitted");
        })
        .await;

    info!(
        game_id,
        succeeded = batch.success_count,
        failed = batch.failure_count,
        "Batch submission finished"
    );
    Ok(Json(batch))
}

/// スコアリングサービスへのRPCプロキシ
///
/// JSON `{method, params}` と、`request` 項目＋ファイルのmultipartを受け付ける。
/// 上流のステータスとJSONをそのまま返す。
pub async fn rpc_proxy(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    jar: CookieJar,
    request: Request,
) -> Result<Response> {
    state.limit(&headers, buckets::RPC).await?;
    let client = state.scoring()?.with_access_token(state.access_token(&jar));

    let is_multipart = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("multipart/form-data"));

    let (status, body) = if is_multipart {
        let mut multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|e| UploadError::Validation(e.body_text()))?;
        let form = read_multipart(&mut multipart).await?;
        let call: RawCall = serde_json::from_str(form.required("request")?)
            .map_err(|e| UploadError::Validation(format!("invalid request field: {}", e)))?;
        validate_method(&call)?;
        client.call_raw_multipart(call, form.files).await?
    } else {
        let Json(call) = Json::<RawCall>::from_request(request, &state)
            .await
            .map_err(|e| UploadError::Validation(e.body_text()))?;
        validate_method(&call)?;
        client.call_raw(call).await?
    };

    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
    Ok((status, Json(body)).into_response())
}

fn validate_method(call: &RawCall) -> Result<()> {
    if call.method.trim().is_empty() {
        return Err(UploadError::Validation("method is required".into()));
    }
    Ok(())
}

/// CDNからの通知（署名検証のみ行いログに残す）
pub async fn cdn_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    let cdn = state.cdn()?;

    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).unwrap_or_default();
    let signature = header(SIGNATURE_HEADER);
    let timestamp = header(TIMESTAMP_HEADER);

    let now = chrono::Utc::now().timestamp();
    if signature.is_empty() || !cdn.verify_notification(&body, timestamp, signature, now) {
        warn!(timestamp, "Rejected CDN notification with invalid signature or stale timestamp");
        return Ok((
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "invalid signature" })),
        )
            .into_response());
    }

    let notification: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    info!(
        notification_type = notification["notification_type"].as_str().unwrap_or("unknown"),
        public_id = notification["public_id"].as_str().unwrap_or_default(),
        "CDN notification received"
    );

    Ok(Json(json!({ "received": true })).into_response())
}
