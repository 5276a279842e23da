//! スコアリングサービス連携のテスト
//!
//! ローカルに立てたフェイクのRPCサーバーに対して、試合一覧の取得と
//! メディアの一括送信を検証

use axum::{
    extract::{FromRequest, Multipart, Request, State},
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use photo_upload_common::{FilePayload, RawCall, Staging};
use photo_upload_rust::error::UploadError;
use photo_upload_rust::pipeline::BatchPipeline;
use photo_upload_rust::remote::{fetch_games, LookupStrategy, ScoringClient};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

#[derive(Default)]
struct FakeScoring {
    fail_lookup: bool,
    envelopes: Mutex<Vec<Value>>,
    api_keys: Mutex<Vec<Option<String>>>,
    uploaded: Mutex<Vec<(String, usize)>>,
}

async fn handle(State(fake): State<Arc<FakeScoring>>, request: Request) -> Response {
    let api_key = request
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    fake.api_keys.lock().unwrap().push(api_key);

    let is_multipart = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("multipart/"));

    let envelope: Value = if is_multipart {
        let mut multipart = Multipart::from_request(request, &fake).await.unwrap();
        let mut envelope = Value::Null;
        while let Some(field) = multipart.next_field().await.unwrap() {
            let name = field.name().unwrap_or_default().to_string();
            if name == "request" {
                envelope = serde_json::from_str(&field.text().await.unwrap()).unwrap();
            } else {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let size = field.bytes().await.unwrap().len();
                fake.uploaded.lock().unwrap().push((file_name, size));
            }
        }
        envelope
    } else {
        Json::<Value>::from_request(request, &fake).await.unwrap().0
    };
    fake.envelopes.lock().unwrap().push(envelope.clone());

    let id = envelope["id"].clone();
    let params = &envelope["params"];
    let ok = |result: Value| Json(json!({ "jsonrpc": "2.0", "id": id, "result": result })).into_response();

    match envelope["method"].as_str().unwrap_or_default() {
        _ if fake.fail_lookup => (StatusCode::SERVICE_UNAVAILABLE, "down").into_response(),
        "user.games" => ok(json!({
            "gameIds": [1, 3, 2],
            "collections": {
                "games": [
                    game(1, 10, 20, 100),
                    game(3, 10, 30, 300),
                    game(2, 20, 30, 200),
                    game(99, 10, 20, 999)
                ],
                "teams": [
                    { "id": 10, "name": "Eagles" },
                    { "id": 20, "shortName": "HWK" }
                ]
            }
        })),
        "user.teams" => ok(json!({
            "teamIds": [10, 20],
            "collections": {
                "teams": [
                    { "id": 10, "name": "Eagles" },
                    { "id": 20, "name": "Hawks" }
                ]
            }
        })),
        "team.games" => {
            let games = match params["team_id"].as_u64() {
                Some(10) => vec![game(1, 10, 30, 100), game(2, 10, 20, 200)],
                Some(20) => vec![game(2, 10, 20, 200), game(3, 20, 30, 300)],
                _ => vec![],
            };
            ok(json!({ "gameIds": [], "collections": { "games": games } }))
        }
        "media.upload" => match params["file_name"].as_str().unwrap_or_default() {
            "file2.jpg" => (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response(),
            "bad.jpg" => Json(json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": {
                    "code": 422,
                    "message": "Invalid params",
                    "data": { "fields": [{ "field": "caption", "message": "too long" }] }
                }
            }))
            .into_response(),
            _ => {
                let count = fake.uploaded.lock().unwrap().len();
                ok(json!({ "mediaId": 1000 + count }))
            }
        },
        other => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": { "message": format!("unknown method {}", other) } })),
        )
            .into_response(),
    }
}

fn game(id: u64, home: u64, away: u64, start: i64) -> Value {
    json!({
        "id": id,
        "homeTeamId": home,
        "awayTeamId": away,
        "sportName": "Soccer",
        "startTime": start
    })
}

async fn spawn_fake(fake: Arc<FakeScoring>) -> String {
    let app = Router::new().route("/rpc", post(handle)).with_state(fake);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}/rpc", addr)
}

fn client(endpoint: String) -> ScoringClient {
    ScoringClient::new(
        endpoint,
        Some("test-key".into()),
        Some("test-token".into()),
        Duration::from_secs(5),
    )
    .unwrap()
}

/// user.games: game_idsで絞り込み、開始時刻の新しい順、名前が無いチームは "Team {id}"
#[tokio::test]
async fn test_fetch_games_direct() {
    let fake = Arc::new(FakeScoring::default());
    let client = client(spawn_fake(fake.clone()).await);

    let games = fetch_games(&client, "42", LookupStrategy::Direct).await.unwrap();

    let ids: Vec<u64> = games.iter().map(|g| g.game_id).collect();
    assert_eq!(ids, vec![3, 2, 1]);
    assert_eq!(games[2].title(), "Eagles vs HWK");
    assert_eq!(games[0].away_team_name, "Team 30");

    let envelope = &fake.envelopes.lock().unwrap()[0];
    assert_eq!(envelope["jsonrpc"], "2.0");
    assert_eq!(envelope["method"], "user.games");
    assert_eq!(envelope["params"]["user_id"], 42);
    assert_eq!(envelope["access_token"], "test-token");
    assert_eq!(fake.api_keys.lock().unwrap()[0].as_deref(), Some("test-key"));
}

/// チームごとの取得は試合IDで重複除去してマージ
#[tokio::test]
async fn test_fetch_games_per_team_dedupes() {
    let fake = Arc::new(FakeScoring::default());
    let client = client(spawn_fake(fake.clone()).await);

    let games = fetch_games(&client, "42", LookupStrategy::PerTeam).await.unwrap();

    let ids: Vec<u64> = games.iter().map(|g| g.game_id).collect();
    assert_eq!(ids, vec![3, 2, 1]);
    assert_eq!(games[1].title(), "Eagles vs Hawks");
    assert_eq!(games[2].away_team_name, "Team 30");

    let methods: Vec<String> = fake
        .envelopes
        .lock()
        .unwrap()
        .iter()
        .map(|e| e["method"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(methods, vec!["user.teams", "team.games", "team.games"]);
}

/// 取得失敗は途中結果を返さず FetchGames にまとめる
#[tokio::test]
async fn test_fetch_games_failure() {
    let fake = Arc::new(FakeScoring {
        fail_lookup: true,
        ..Default::default()
    });
    let client = client(spawn_fake(fake).await);

    let err = fetch_games(&client, "42", LookupStrategy::Direct).await.unwrap_err();
    assert!(matches!(err, UploadError::FetchGames));
    assert_eq!(err.to_string(), "Failed to fetch games");

    let err = fetch_games(&client, "42", LookupStrategy::PerTeam).await.unwrap_err();
    assert!(matches!(err, UploadError::FetchGames));
}

/// 不正なユーザーIDは通信せずに入力エラー
#[tokio::test]
async fn test_fetch_games_rejects_invalid_user_id() {
    let fake = Arc::new(FakeScoring::default());
    let client = client(spawn_fake(fake.clone()).await);

    let err = fetch_games(&client, "abc", LookupStrategy::Direct).await.unwrap_err();
    assert!(err.is_validation());
    assert!(fake.envelopes.lock().unwrap().is_empty());
}

/// 3件送信して2件目がHTTP 500
#[tokio::test]
async fn test_batch_upload_end_to_end() {
    let fake = Arc::new(FakeScoring::default());
    let client = client(spawn_fake(fake.clone()).await);

    let mut staging = Staging::default();
    for name in ["file1.jpg", "file2.jpg", "file3.jpg"] {
        staging
            .add(FilePayload::new(name, vec![0xFF; 32], "image/jpeg"))
            .unwrap();
    }
    staging.mark_all_ready();
    let requests = staging.submission_requests(7);

    let pipeline = BatchPipeline::new(client, Duration::ZERO);
    let batch = pipeline.submit_all(&requests, |_, _, _| {}).await;

    assert_eq!(batch.success_count, 2);
    assert_eq!(batch.failure_count, 1);
    assert_eq!(batch.failures[0].source_file_name, "file2.jpg");
    assert_eq!(batch.failures[0].error_message.as_deref(), Some("HTTP 500"));

    let uploaded = fake.uploaded.lock().unwrap().clone();
    assert_eq!(uploaded.len(), 3);
    assert!(uploaded.iter().all(|(_, size)| *size == 32));

    let envelopes = fake.envelopes.lock().unwrap();
    assert!(envelopes.iter().all(|e| e["method"] == "media.upload"));
    assert!(envelopes.iter().all(|e| e["params"]["game_id"] == 7));
    assert_eq!(envelopes[0]["params"]["file_name"], "file1.jpg");
}

/// 接続できない場合も1件ずつ失敗として記録し、バッチは最後まで進む
#[tokio::test]
async fn test_batch_upload_unreachable_endpoint() {
    let client = client("http://127.0.0.1:1/rpc".to_string());

    let mut staging = Staging::default();
    for name in ["a.jpg", "b.jpg", "c.jpg"] {
        staging
            .add(FilePayload::new(name, vec![1; 8], "image/jpeg"))
            .unwrap();
    }
    staging.mark_all_ready();

    let mut attempted = Vec::new();
    let batch = BatchPipeline::new(client, Duration::ZERO)
        .submit_all(&staging.submission_requests(7), |done, total, result| {
            attempted.push((done, total, result.source_file_name.clone()));
        })
        .await;

    assert_eq!(batch.total, 3);
    assert_eq!(batch.success_count, 0);
    assert_eq!(batch.failure_count, batch.total);
    assert!(batch
        .failures
        .iter()
        .all(|f| f.error_message.as_deref().is_some_and(|m| !m.is_empty())));

    let names: Vec<&str> = attempted.iter().map(|(_, _, name)| name.as_str()).collect();
    assert_eq!(names, vec!["a.jpg", "b.jpg", "c.jpg"]);
    assert_eq!(attempted.last().map(|(done, total, _)| (*done, *total)), Some((3, 3)));
}

/// RPCエラーのフィールドメッセージを失敗理由にする
#[tokio::test]
async fn test_upload_rpc_field_error() {
    let fake = Arc::new(FakeScoring::default());
    let client = client(spawn_fake(fake).await);

    let mut staging = Staging::default();
    staging
        .add(FilePayload::new("bad.jpg", vec![1; 8], "image/jpeg"))
        .unwrap();
    staging.mark_all_ready();

    let batch = BatchPipeline::new(client, Duration::ZERO)
        .submit_all(&staging.submission_requests(1), |_, _, _| {})
        .await;

    assert_eq!(batch.failures[0].error_message.as_deref(), Some("caption: too long"));
}

/// プロキシ呼び出しは上流のステータスとJSONをそのまま返す
#[tokio::test]
async fn test_call_raw_passthrough() {
    let fake = Arc::new(FakeScoring::default());
    let client = client(spawn_fake(fake).await);

    let (status, body) = client
        .call_raw(RawCall {
            method: "user.teams".into(),
            params: json!({ "user_id": 1 }),
        })
        .await
        .unwrap();
    assert_eq!(status, 200);
    assert_eq!(body["result"]["teamIds"], json!([10, 20]));

    let (status, body) = client
        .call_raw(RawCall {
            method: "nope".into(),
            params: Value::Null,
        })
        .await
        .unwrap();
    assert_eq!(status, 400);
    assert_eq!(body["error"]["message"], "unknown method nope");
}
