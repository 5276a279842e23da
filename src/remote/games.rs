//! ユーザーの試合一覧取得
//!
//! user.games を1回呼ぶ方式と、user.teams → team.games をチームごとに
//! 呼んでマージする方式がある。どちらも試合IDで重複除去し、
//! 開始時刻の新しい順に並べる。

use super::ScoringClient;
use crate::error::{Result, UploadError};
use clap::ValueEnum;
use photo_upload_common::{
    join_games, sort_games, GameRecord, GamesPayload, RpcCall, TeamsPayload,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{info, warn};

/// 取得方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum LookupStrategy {
    /// user.games を1回
    #[default]
    Direct,
    /// チームごとに team.games を呼んでマージ
    PerTeam,
}

/// ユーザーIDの検証（数字のみ）
pub fn parse_user_id(user_id: &str) -> Result<u64> {
    let trimmed = user_id.trim();
    if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_digit()) {
        return Err(UploadError::Validation(format!(
            "user_id must be numeric: {:?}",
            user_id
        )));
    }

    trimmed
        .parse()
        .map_err(|_| UploadError::Validation(format!("user_id out of range: {}", trimmed)))
}

/// 試合一覧を取得
///
/// 通信・パース失敗は FetchGames に集約し、途中までの結果は返さない
pub async fn fetch_games(
    client: &ScoringClient,
    user_id: &str,
    strategy: LookupStrategy,
) -> Result<Vec<GameRecord>> {
    let user_id = parse_user_id(user_id)?;

    match collect_games(client, user_id, strategy).await {
        Ok(mut games) => {
            sort_games(&mut games);
            info!(user_id, count = games.len(), ?strategy, "Fetched games");
            Ok(games)
        }
        Err(e) => {
            warn!(user_id, error = %e, "Game lookup failed");
            Err(UploadError::FetchGames)
        }
    }
}

async fn collect_games(
    client: &ScoringClient,
    user_id: u64,
    strategy: LookupStrategy,
) -> Result<Vec<GameRecord>> {
    let mut seen = HashSet::new();

    match strategy {
        LookupStrategy::Direct => {
            let payload: GamesPayload = client.call(RpcCall::UserGames { user_id }).await?;
            Ok(join_games(&payload, &[], &mut seen))
        }
        LookupStrategy::PerTeam => {
            let teams: TeamsPayload = client.call(RpcCall::UserTeams { user_id }).await?;

            let team_ids: Vec<u64> = if teams.team_ids.is_empty() {
                teams.collections.teams.iter().map(|t| t.id).collect()
            } else {
                teams.team_ids.clone()
            };

            let mut games = Vec::new();
            for team_id in team_ids {
                let payload: GamesPayload = client.call(RpcCall::TeamGames { team_id }).await?;
                games.extend(join_games(&payload, &teams.collections.teams, &mut seen));
            }
            Ok(games)
        }
    }
}
