use std::sync::Arc;
use std::time::Instant;

use axum::http::HeaderMap;
use axum_extra::extract::CookieJar;
use tracing::warn;

use crate::{
    cdn::CdnClient,
    config::Config,
    error::{Result, UploadError},
    rate_limiter::{client_address, RateLimiter},
    remote::ScoringClient,
};

/// ブラウザから送られるアクセストークンのCookie名
pub const ACCESS_TOKEN_COOKIE: &str = "access_token";

pub struct AppState {
    pub config: Config,
    pub scoring: Option<ScoringClient>,
    pub cdn: Option<CdnClient>,
    pub limiter: RateLimiter,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: Config) -> Arc<Self> {
        let scoring = ScoringClient::from_config(&config)
            .map_err(|e| warn!("Scoring service disabled: {e}"))
            .ok();

        let cdn = CdnClient::from_config(&config.cdn, config.request_timeout())
            .map_err(|e| warn!("CDN disabled: {e}"))
            .ok();

        let limiter = RateLimiter::new(config.rate_limit_window());

        Arc::new(Self {
            config,
            scoring,
            cdn,
            limiter,
            started_at: Instant::now(),
        })
    }

    pub fn scoring(&self) -> Result<&ScoringClient> {
        self.scoring
            .as_ref()
            .ok_or_else(|| UploadError::Config("scoring service is not configured".into()))
    }

    pub fn cdn(&self) -> Result<&CdnClient> {
        self.cdn
            .as_ref()
            .ok_or_else(|| UploadError::Config("CDN is not configured".into()))
    }

    /// リクエスト元アドレス単位でレート制限
    pub async fn limit(&self, headers: &HeaderMap, (bucket, limit): (&str, usize)) -> Result<()> {
        let client = client_address(headers);
        self.limiter.check(bucket, &client, limit).await
    }

    /// Cookieのトークンを優先し、無ければ設定値
    pub fn access_token(&self, jar: &CookieJar) -> Option<String> {
        jar.get(ACCESS_TOKEN_COOKIE)
            .map(|c| c.value().trim().to_string())
            .filter(|t| !t.is_empty())
            .or_else(|| self.config.access_token.clone())
    }
}
