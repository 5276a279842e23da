//! レート制限のテスト
//!
//! ウィンドウ内の上限、ウィンドウ経過後の回復、スイープを検証

use photo_upload_rust::error::UploadError;
use photo_upload_rust::rate_limiter::{buckets, RateLimiter};
use std::time::Duration;

const WINDOW: Duration = Duration::from_secs(60);

/// 上限までは通り、上限+1件目で拒否、ウィンドウ経過後は再び通る
#[tokio::test(start_paused = true)]
async fn test_limit_then_recover_after_window() {
    let limiter = RateLimiter::new(WINDOW);
    let limit = 5;

    for _ in 0..limit {
        limiter.check("upload", "10.0.0.1", limit).await.unwrap();
    }

    let err = limiter.check("upload", "10.0.0.1", limit).await.unwrap_err();
    match err {
        UploadError::RateLimited { retry_after_secs } => {
            assert!(retry_after_secs >= 1 && retry_after_secs <= 60);
        }
        other => panic!("unexpected error: {other}"),
    }

    tokio::time::advance(WINDOW).await;
    assert!(limiter.check("upload", "10.0.0.1", limit).await.is_ok());
}

/// 拒否されたリクエストはウィンドウに数えない
#[tokio::test(start_paused = true)]
async fn test_rejected_requests_are_not_recorded() {
    let limiter = RateLimiter::new(WINDOW);

    limiter.check("list", "a", 1).await.unwrap();
    for _ in 0..10 {
        assert!(limiter.check("list", "a", 1).await.is_err());
    }

    // 最初の1件だけが期限切れになれば通る
    tokio::time::advance(WINDOW).await;
    assert!(limiter.check("list", "a", 1).await.is_ok());
}

/// バケットとクライアントごとに独立
#[tokio::test(start_paused = true)]
async fn test_keys_are_independent() {
    let limiter = RateLimiter::new(WINDOW);

    limiter.check("upload", "a", 1).await.unwrap();
    assert!(limiter.check("upload", "a", 1).await.is_err());
    assert!(limiter.check("upload", "b", 1).await.is_ok());
    assert!(limiter.check("update", "a", 1).await.is_ok());
}

/// 時刻が少しずつずれて入った場合は古いものから順に枠が空く
#[tokio::test(start_paused = true)]
async fn test_sliding_window() {
    let limiter = RateLimiter::new(WINDOW);

    limiter.check("rpc", "a", 2).await.unwrap();
    tokio::time::advance(Duration::from_secs(30)).await;
    limiter.check("rpc", "a", 2).await.unwrap();
    assert!(limiter.check("rpc", "a", 2).await.is_err());

    tokio::time::advance(Duration::from_secs(30)).await;
    assert!(limiter.check("rpc", "a", 2).await.is_ok());
    assert!(limiter.check("rpc", "a", 2).await.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_sweep_removes_expired_keys() {
    let limiter = RateLimiter::new(WINDOW);

    limiter.check("upload", "a", 10).await.unwrap();
    limiter.check("upload", "b", 10).await.unwrap();
    assert_eq!(limiter.tracked_keys().await, 2);
    assert_eq!(limiter.sweep().await, 0);

    tokio::time::advance(Duration::from_secs(30)).await;
    limiter.check("upload", "b", 10).await.unwrap();

    tokio::time::advance(Duration::from_secs(30)).await;
    assert_eq!(limiter.sweep().await, 1);
    assert_eq!(limiter.tracked_keys().await, 1);
}

/// バックグラウンドのスイープタスク
#[tokio::test(start_paused = true)]
async fn test_spawned_sweeper() {
    let limiter = RateLimiter::new(Duration::from_secs(10));
    limiter.check("games", "a", 10).await.unwrap();

    let handle = limiter.spawn_sweeper(Duration::from_secs(5));
    tokio::time::sleep(Duration::from_secs(16)).await;

    assert_eq!(limiter.tracked_keys().await, 0);
    handle.abort();
}

#[test]
fn test_bucket_limits() {
    assert_eq!(buckets::UPLOAD, ("upload", 30));
    assert_eq!(buckets::LIST.1, 120);
    assert_eq!(buckets::UPDATE.1, 60);
    assert_eq!(buckets::RPC.1, 120);
    assert_eq!(buckets::GAMES.1, 60);
}
