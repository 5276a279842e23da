//! アップロード操作のセッション
//!
//! 試合取得 → ステージング → 送信 の各段階で使う状態をまとめて持ち、
//! 呼び出し側から明示的に受け渡す（グローバルな状態は使わない）。

use crate::error::{Result, UploadError};
use crate::pipeline::{select_failed, BatchPipeline, MediaUploader};
use crate::remote::{fetch_games, parse_user_id, LookupStrategy, ScoringClient};
use photo_upload_common::{
    BatchResult, GameRecord, Staging, StagingLimits, SubmissionRequest, SubmissionResult,
    SubmissionStatus,
};
use tracing::info;

pub struct SessionContext {
    user_id: u64,
    access_token: String,
    games: Vec<GameRecord>,
    selected_game: Option<GameRecord>,
    staging: Staging,
    last_requests: Vec<SubmissionRequest>,
    last_batch: Option<BatchResult>,
}

impl SessionContext {
    pub fn new(user_id: &str, access_token: impl Into<String>, limits: StagingLimits) -> Result<Self> {
        Ok(Self {
            user_id: parse_user_id(user_id)?,
            access_token: access_token.into(),
            games: Vec::new(),
            selected_game: None,
            staging: Staging::new(limits),
            last_requests: Vec::new(),
            last_batch: None,
        })
    }

    pub fn user_id(&self) -> u64 {
        self.user_id
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// 試合一覧を取得して保持
    pub async fn load_games(
        &mut self,
        client: &ScoringClient,
        strategy: LookupStrategy,
    ) -> Result<&[GameRecord]> {
        let client = client.with_access_token(Some(self.access_token.clone()));
        self.games = fetch_games(&client, &self.user_id.to_string(), strategy).await?;
        Ok(&self.games)
    }

    pub fn set_games(&mut self, games: Vec<GameRecord>) {
        self.games = games;
    }

    pub fn games(&self) -> &[GameRecord] {
        &self.games
    }

    /// 取得済みの一覧から試合を選ぶ
    pub fn select_game(&mut self, game_id: u64) -> Result<&GameRecord> {
        let game = self
            .games
            .iter()
            .find(|g| g.game_id == game_id)
            .cloned()
            .ok_or_else(|| UploadError::Validation(format!("game {} is not available", game_id)))?;

        Ok(self.selected_game.insert(game))
    }

    pub fn selected_game(&self) -> Option<&GameRecord> {
        self.selected_game.as_ref()
    }

    pub fn staging(&self) -> &Staging {
        &self.staging
    }

    pub fn staging_mut(&mut self) -> &mut Staging {
        &mut self.staging
    }

    pub fn last_batch(&self) -> Option<&BatchResult> {
        self.last_batch.as_ref()
    }

    /// ステージング中の全件を送信
    ///
    /// 成功した項目はステージングから取り除き、失敗した項目は再送用に残す
    pub async fn submit<U, F>(&mut self, pipeline: &BatchPipeline<U>, mut on_progress: F) -> Result<BatchResult>
    where
        U: MediaUploader,
        F: FnMut(usize, usize, &SubmissionResult),
    {
        let game_id = self
            .selected_game
            .as_ref()
            .map(|g| g.game_id)
            .ok_or_else(|| UploadError::Validation("no game selected".into()))?;

        self.staging.mark_all_ready();
        let requests = self.staging.submission_requests(game_id);
        if requests.is_empty() {
            return Err(UploadError::Validation("nothing to submit".into()));
        }

        info!(game_id, count = requests.len(), "Submitting staged media");
        self.begin(&requests)?;

        let staging = &mut self.staging;
        let mut apply_error = None;
        let batch = pipeline
            .submit_all(&requests, |done, total, result| {
                if let Err(e) = staging.apply_result(result) {
                    apply_error.get_or_insert(e);
                }
                on_progress(done, total, result);
            })
            .await;
        self.finish(apply_error)?;

        self.last_requests = requests;
        self.last_batch = Some(batch.clone());
        Ok(batch)
    }

    /// 直前のバッチで失敗した項目だけを再送
    pub async fn retry<U, F>(&mut self, pipeline: &BatchPipeline<U>, mut on_progress: F) -> Result<BatchResult>
    where
        U: MediaUploader,
        F: FnMut(usize, usize, &SubmissionResult),
    {
        let previous = self
            .last_batch
            .clone()
            .ok_or_else(|| UploadError::Validation("no previous batch to retry".into()))?;

        // ユーザーが削除した項目は再送しない
        let still_staged: Vec<SubmissionRequest> = self
            .last_requests
            .iter()
            .filter(|r| {
                self.staging
                    .get(r.item_id)
                    .is_some_and(|item| item.status == SubmissionStatus::Failed)
            })
            .cloned()
            .collect();

        let subset = select_failed(&previous, &still_staged);
        if subset.is_empty() {
            return Ok(BatchResult::default());
        }

        info!(count = subset.len(), "Retrying failed media");
        self.begin(&subset)?;

        let staging = &mut self.staging;
        let mut apply_error = None;
        let batch = pipeline
            .retry_failed(&previous, &still_staged, |done, total, result| {
                if let Err(e) = staging.apply_result(result) {
                    apply_error.get_or_insert(e);
                }
                on_progress(done, total, result);
            })
            .await;
        self.finish(apply_error)?;

        self.last_batch = Some(batch.clone());
        Ok(batch)
    }

    /// 送信対象を送信中にする
    fn begin(&mut self, requests: &[SubmissionRequest]) -> Result<()> {
        for request in requests {
            self.staging
                .transition(request.item_id, SubmissionStatus::Submitting)?;
        }
        Ok(())
    }

    /// 結果反映のエラー確認と送信済み項目の削除
    fn finish(&mut self, apply_error: Option<photo_upload_common::Error>) -> Result<()> {
        if let Some(e) = apply_error {
            return Err(e.into());
        }

        let removed = self.staging.remove_submitted();
        info!(removed, remaining = self.staging.len(), "Applied batch result to staging");
        Ok(())
    }
}
