//! バッチ送信パイプライン
//!
//! - 1件ずつ順番に送信（同時に送るのは常に1件まで）
//! - 最後の1件を除き、送信ごとにクールダウンを挟む
//! - 1件の失敗でバッチは止めない
//! - 再送は前回の失敗分だけをIDで突き合わせて送り直す

use crate::error::Result;
use async_trait::async_trait;
use photo_upload_common::{BatchResult, ItemId, SubmissionRequest, SubmissionResult, UploadReceipt};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// 送信間隔のデフォルト
pub const DEFAULT_COOLDOWN: Duration = Duration::from_millis(1000);

/// 1件分のアップロード先
#[async_trait]
pub trait MediaUploader: Send + Sync {
    async fn upload(&self, request: &SubmissionRequest) -> Result<UploadReceipt>;
}

#[async_trait]
impl<U: MediaUploader + ?Sized> MediaUploader for Arc<U> {
    async fn upload(&self, request: &SubmissionRequest) -> Result<UploadReceipt> {
        (**self).upload(request).await
    }
}

pub struct BatchPipeline<U> {
    uploader: U,
    cooldown: Duration,
}

impl<U: MediaUploader> BatchPipeline<U> {
    pub fn new(uploader: U, cooldown: Duration) -> Self {
        Self { uploader, cooldown }
    }

    pub fn uploader(&self) -> &U {
        &self.uploader
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// 全件を順番に送信して集計を返す
    ///
    /// # Arguments
    /// * `requests` - 送信順のリクエスト
    /// * `on_progress` - 1件終わるごとに (完了数, 総数, その結果) で呼ばれる
    pub async fn submit_all<F>(&self, requests: &[SubmissionRequest], mut on_progress: F) -> BatchResult
    where
        F: FnMut(usize, usize, &SubmissionResult),
    {
        let total = requests.len();
        let mut results = Vec::with_capacity(total);
        info!(total, cooldown_ms = self.cooldown.as_millis() as u64, "Starting batch submission");

        for (index, request) in requests.iter().enumerate() {
            let result = self.submit_one(request).await;
            on_progress(index + 1, total, &result);
            results.push(result);

            if index + 1 < total && !self.cooldown.is_zero() {
                tokio::time::sleep(self.cooldown).await;
            }
        }

        let batch = BatchResult::from_results(results);
        info!(
            total = batch.total,
            succeeded = batch.success_count,
            failed = batch.failure_count,
            "Batch submission finished"
        );
        batch
    }

    /// 前回失敗した分だけを再送
    pub async fn retry_failed<F>(
        &self,
        previous: &BatchResult,
        requests: &[SubmissionRequest],
        on_progress: F,
    ) -> BatchResult
    where
        F: FnMut(usize, usize, &SubmissionResult),
    {
        let subset = select_failed(previous, requests);
        debug!(
            failures = previous.failure_count,
            matched = subset.len(),
            "Retrying failed submissions"
        );
        self.submit_all(&subset, on_progress).await
    }

    async fn submit_one(&self, request: &SubmissionRequest) -> SubmissionResult {
        match self.uploader.upload(request).await {
            Ok(receipt) => {
                debug!(file = %request.file.name, media_id = %receipt.media_id, "Submitted");
                SubmissionResult::success(request.item_id, &request.file.name, receipt.media_id.to_string())
            }
            Err(e) => {
                warn!(file = %request.file.name, error = %e, "Submission failed");
                SubmissionResult::failure(request.item_id, &request.file.name, e.to_string())
            }
        }
    }
}

/// 失敗結果のIDと一致するリクエストを元の順序で抜き出す
///
/// 対応するリクエストが無い失敗は無視する
pub fn select_failed(previous: &BatchResult, requests: &[SubmissionRequest]) -> Vec<SubmissionRequest> {
    let failed: HashSet<ItemId> = previous.failures.iter().map(|r| r.item_id).collect();

    requests
        .iter()
        .filter(|r| failed.contains(&r.item_id))
        .cloned()
        .collect()
}
