//! 対話式アップロード
//!
//! フォルダのスキャン → ステージング → 試合選択 → 送信 → 失敗分の再送 を
//! ターミナル上で順に行う。

use crate::config::Config;
use crate::error::{Result, UploadError};
use crate::pipeline::BatchPipeline;
use crate::remote::{LookupStrategy, ScoringClient};
use crate::scanner;
use crate::session::SessionContext;
use dialoguer::{Confirm, Select};
use indicatif::{ProgressBar, ProgressStyle};
use photo_upload_common::{BatchOutcome, BatchResult, GameRecord, TeamAssociation};
use std::path::PathBuf;

/// `upload` サブコマンドの指定内容
pub struct UploadOptions {
    pub folder: PathBuf,
    pub user_id: String,
    pub game_id: Option<u64>,
    pub caption: Option<String>,
    pub team: TeamAssociation,
    pub recursive: bool,
    pub retry_prompt: bool,
    pub strategy: LookupStrategy,
}

/// 試合開始時刻の表示（UTC）
pub fn format_start_time(start_time: i64) -> String {
    chrono::DateTime::from_timestamp(start_time, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// 一覧表示用の1行
pub fn game_label(game: &GameRecord) -> String {
    let mut label = format!("{}  {}", format_start_time(game.start_time), game.title());
    if !game.sport_name.is_empty() {
        label.push_str(&format!(" [{}]", game.sport_name));
    }
    if let Some(score) = &game.last_score {
        label.push_str(&format!(" ({})", score));
    }
    label
}

/// 送信結果の要約
pub fn summarize(batch: &BatchResult) -> String {
    match batch.outcome() {
        BatchOutcome::Empty => "送信対象がありませんでした".to_string(),
        BatchOutcome::AllSucceeded => format!("✅ {}件すべてアップロードしました", batch.success_count),
        BatchOutcome::Partial => format!(
            "⚠ {}件中{}件成功、{}件失敗: {}",
            batch.total,
            batch.success_count,
            batch.failure_count,
            batch.failed_file_names().join(", ")
        ),
        BatchOutcome::AllFailed => format!("❌ {}件すべて失敗しました", batch.total),
    }
}

pub async fn run_interactive_upload(config: &Config, options: UploadOptions) -> Result<()> {
    let access_token = config.access_token()?;
    let client = ScoringClient::from_config(config)?.with_access_token(Some(access_token.clone()));
    let mut session = SessionContext::new(&options.user_id, access_token, config.staging_limits())?;

    // 1. スキャンとステージング
    println!("[1/3] 写真・動画をスキャン中...");
    let files = scanner::scan_folder(&options.folder, options.recursive)?;
    let (staged, rejected) = scanner::stage_files(session.staging_mut(), &files);

    for (name, e) in &rejected {
        println!("  ⚠ {}: {}", name, e);
    }
    if staged.is_empty() {
        return Err(UploadError::NoMediaFound(options.folder.display().to_string()));
    }
    for id in &staged {
        session.staging_mut().set_caption(*id, options.caption.clone())?;
        session.staging_mut().set_team(*id, options.team)?;
    }
    println!("✔ {}件をステージング\n", staged.len());

    // 2. 試合選択
    println!("[2/3] 試合一覧を取得中...");
    let games = session.load_games(&client, options.strategy).await?;
    if games.is_empty() {
        return Err(UploadError::Validation("アップロードできる試合がありません".into()));
    }
    let game_id = match options.game_id {
        Some(id) => id,
        None => prompt_game(games)?,
    };
    let game = session.select_game(game_id)?;
    println!("✔ {}\n", game.title());

    // 3. 送信
    println!("[3/3] アップロード中...");
    let pipeline = BatchPipeline::new(client, config.upload_cooldown());
    let bar = progress_bar(session.staging().len());
    let mut batch = session
        .submit(&pipeline, |done, _total, result| {
            bar.set_message(result.source_file_name.clone());
            bar.set_position(done as u64);
        })
        .await?;
    bar.finish_and_clear();
    println!("{}", summarize(&batch));

    while batch.failure_count > 0 && options.retry_prompt && confirm_retry(batch.failure_count)? {
        let bar = progress_bar(batch.failure_count);
        batch = session
            .retry(&pipeline, |done, _total, result| {
                bar.set_message(result.source_file_name.clone());
                bar.set_position(done as u64);
            })
            .await?;
        bar.finish_and_clear();

        if batch.total == 0 {
            break;
        }
        println!("{}", summarize(&batch));
    }

    Ok(())
}

fn progress_bar(len: usize) -> ProgressBar {
    let bar = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}") {
        bar.set_style(style);
    }
    bar
}

/// 試合選択プロンプト
fn prompt_game(games: &[GameRecord]) -> Result<u64> {
    let labels: Vec<String> = games.iter().map(game_label).collect();

    let index = Select::new()
        .with_prompt("アップロード先の試合")
        .items(&labels)
        .default(0)
        .interact()
        .map_err(|e| UploadError::Validation(e.to_string()))?;

    Ok(games[index].game_id)
}

fn confirm_retry(failures: usize) -> Result<bool> {
    Confirm::new()
        .with_prompt(format!("失敗した{}件を再送しますか？", failures))
        .default(true)
        .interact()
        .map_err(|e| UploadError::Validation(e.to_string()))
}
