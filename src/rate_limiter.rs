//! スライディングウィンドウ方式のレート制限
//!
//! キーは `{バケット名}:{クライアントアドレス}`。状態はプロセス内のみで、
//! 複数インスタンス間では共有しない。空になったキーは定期スイープで削除する。

use crate::error::{Result, UploadError};
use axum::http::HeaderMap;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

/// アドレスが取れない場合の共通バケット
pub const ANONYMOUS_CLIENT: &str = "anonymous";

/// HTTPエンドポイントごとのバケットと上限（ウィンドウあたり）
pub mod buckets {
    pub const UPLOAD: (&str, usize) = ("upload", 30);
    pub const LIST: (&str, usize) = ("list", 120);
    pub const UPDATE: (&str, usize) = ("update", 60);
    pub const RPC: (&str, usize) = ("rpc", 120);
    pub const GAMES: (&str, usize) = ("games", 60);
}

/// 1キー分のリクエスト時刻（古い順）
#[derive(Debug, Clone, Default)]
pub struct RateWindowEntry {
    timestamps: VecDeque<Instant>,
}

impl RateWindowEntry {
    /// ウィンドウ外の時刻を捨てる
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(&oldest) = self.timestamps.front() {
            if now.saturating_duration_since(oldest) >= window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct RateLimiter {
    window: Duration,
    entries: Arc<Mutex<HashMap<String, RateWindowEntry>>>,
}

impl RateLimiter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// 1リクエスト分をチェックして記録
    ///
    /// 上限に達していれば RateLimited を返し、そのリクエストは記録しない
    pub async fn check(&self, bucket: &str, client: &str, limit: usize) -> Result<()> {
        let key = format!("{}:{}", bucket, client);
        let now = Instant::now();

        let mut entries = self.entries.lock().await;
        let entry = entries.entry(key).or_default();
        entry.prune(now, self.window);

        if entry.timestamps.len() >= limit {
            let retry_after = entry
                .timestamps
                .front()
                .map(|&oldest| (oldest + self.window).saturating_duration_since(now))
                .unwrap_or(self.window);
            debug!(bucket, client, limit, "Rate limit exceeded");

            return Err(UploadError::RateLimited {
                retry_after_secs: retry_after.as_secs().max(1),
            });
        }

        entry.timestamps.push_back(now);
        Ok(())
    }

    /// 全キーを掃除し、空になったキーを削除（削除数を返す）
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();
        let window = self.window;

        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| {
            entry.prune(now, window);
            !entry.is_empty()
        });
        before - entries.len()
    }

    /// 追跡中のキー数
    pub async fn tracked_keys(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// 一定間隔でスイープするタスクを起動
    pub fn spawn_sweeper(&self, every: Duration) -> JoinHandle<()> {
        let limiter = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let removed = limiter.sweep().await;
                if removed > 0 {
                    debug!(removed, "Rate limiter sweep");
                }
            }
        })
    }
}

/// クライアントアドレスの解決
///
/// X-Forwarded-For の先頭 → X-Real-IP → "anonymous"
pub fn client_address(headers: &HeaderMap) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    forwarded
        .or_else(real_ip)
        .unwrap_or(ANONYMOUS_CLIENT)
        .to_string()
}
