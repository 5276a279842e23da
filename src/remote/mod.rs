//! スコアリングサービス連携
//!
//! - client: JSON-RPC / multipart 呼び出し
//! - games: ユーザーの試合一覧取得

pub mod client;
pub mod games;

pub use client::ScoringClient;
pub use games::{fetch_games, parse_user_id, LookupStrategy};
