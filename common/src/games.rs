//! 試合一覧の結合処理
//!
//! RPCレスポンスの正規化コレクション（games / teams）をIDで結合し、
//! 重複除去・開始時刻順の並べ替えを行う

use crate::rpc::{GamesPayload, RemoteTeam};
use crate::types::GameRecord;
use std::collections::{HashMap, HashSet};

/// チーム表示名
///
/// name → short_name → "Team {id}" の順に解決し、空文字は返さない
pub fn team_display_name(id: u64, team: Option<&RemoteTeam>) -> String {
    team.and_then(|t| {
        [t.name.as_deref(), t.short_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|name| !name.is_empty())
            .map(str::to_string)
    })
    .unwrap_or_else(|| format!("Team {}", id))
}

/// games と teams を結合して GameRecord を作る
///
/// # Arguments
/// * `payload` - user.games / team.games のresult
/// * `extra_teams` - 別の呼び出しで取得済みのチーム（user.teams など）
/// * `seen` - 取得済みの試合ID（複数回の呼び出しをまたいで重複除去する）
///
/// # Returns
/// 新規の試合のみ。`game_ids` が空でない場合はそこに含まれる試合に限定する
pub fn join_games(
    payload: &GamesPayload,
    extra_teams: &[RemoteTeam],
    seen: &mut HashSet<u64>,
) -> Vec<GameRecord> {
    let teams: HashMap<u64, &RemoteTeam> = extra_teams
        .iter()
        .chain(payload.collections.teams.iter())
        .map(|t| (t.id, t))
        .collect();

    let wanted: HashSet<u64> = payload.game_ids.iter().copied().collect();

    payload
        .collections
        .games
        .iter()
        .filter(|g| wanted.is_empty() || wanted.contains(&g.id))
        .filter(|g| seen.insert(g.id))
        .map(|g| GameRecord {
            game_id: g.id,
            home_team_id: g.home_team_id,
            away_team_id: g.away_team_id,
            home_team_name: team_display_name(g.home_team_id, teams.get(&g.home_team_id).copied()),
            away_team_name: team_display_name(g.away_team_id, teams.get(&g.away_team_id).copied()),
            sport_name: g.sport_name.clone().unwrap_or_default(),
            start_time: g.start_time,
            last_score: g.last_score.clone(),
        })
        .collect()
}

/// 開始時刻の新しい順（同時刻は入力順を維持）
pub fn sort_games(games: &mut [GameRecord]) {
    games.sort_by(|a, b| b.start_time.cmp(&a.start_time));
}
