use crate::remote::LookupStrategy;
use clap::{Parser, Subcommand};
use photo_upload_common::TeamAssociation;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "photo-upload")]
#[command(about = "試合の写真・動画アップロードツール", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// 詳細ログを出力
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// 試合一覧の取得方法（設定値を上書き）
    #[arg(long, value_enum, global = true)]
    pub lookup: Option<LookupStrategy>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// HTTPサーバーを起動
    Serve {
        /// 待ち受けポート（デフォルト: 設定値）
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// 参加できる試合の一覧を表示
    Games {
        /// ユーザーID
        #[arg(short, long)]
        user_id: String,
    },

    /// フォルダ内の写真・動画を試合にアップロード
    Upload {
        /// 写真フォルダのパス
        #[arg(required = true)]
        folder: PathBuf,

        /// ユーザーID
        #[arg(short, long)]
        user_id: String,

        /// 試合ID（省略時は一覧から選択）
        #[arg(short, long)]
        game_id: Option<u64>,

        /// 全ファイル共通のキャプション
        #[arg(short, long)]
        caption: Option<String>,

        /// チーム紐付け (home/away/none)
        #[arg(short, long, default_value = "unset")]
        team: TeamAssociation,

        /// サブフォルダも再帰的にスキャン
        #[arg(short = 'r', long)]
        recursive: bool,

        /// 失敗時に再送を確認しない
        #[arg(long)]
        no_retry_prompt: bool,
    },

    /// 設定を表示/編集
    Config {
        /// APIキーを設定
        #[arg(long)]
        set_api_key: Option<String>,

        /// アクセストークンを設定
        #[arg(long)]
        set_access_token: Option<String>,

        /// スコアリングサービスのURLを設定
        #[arg(long)]
        set_api_url: Option<String>,

        /// 設定を表示
        #[arg(long)]
        show: bool,
    },
}
