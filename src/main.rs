use clap::Parser;
use photo_upload_rust::{cli, config, interactive, remote, server};
use cli::{Cli, Commands};
use config::Config;
use interactive::UploadOptions;
use remote::{fetch_games, ScoringClient};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = Config::load()?;
    let strategy = cli.lookup.unwrap_or(config.lookup_strategy);

    match cli.command {
        Commands::Serve { port } => {
            let mut config = config;
            if let Some(port) = port {
                config.port = port;
            }
            server::run(config).await?;
        }

        Commands::Games { user_id } => {
            println!("📋 photo-upload - 試合一覧\n");

            let client = ScoringClient::from_config(&config)?
                .with_access_token(Some(config.access_token()?));
            let games = fetch_games(&client, &user_id, strategy).await?;

            if games.is_empty() {
                println!("参加できる試合がありません");
            }
            for game in &games {
                println!("  {:>8}  {}", game.game_id, interactive::game_label(game));
            }
        }

        Commands::Upload {
            folder,
            user_id,
            game_id,
            caption,
            team,
            recursive,
            no_retry_prompt,
        } => {
            println!("📸 photo-upload - アップロード\n");

            let options = UploadOptions {
                folder,
                user_id,
                game_id,
                caption,
                team,
                recursive,
                retry_prompt: !no_retry_prompt,
                strategy,
            };
            interactive::run_interactive_upload(&config, options).await?;
        }

        Commands::Config {
            set_api_key,
            set_access_token,
            set_api_url,
            show,
        } => {
            // 環境変数の上書きを保存しないようファイルの値だけを使う
            let mut config = Config::load_from(&Config::config_path()?)?;

            if let Some(key) = set_api_key {
                config.set_api_key(key)?;
                println!("✔ APIキーを設定しました");
            }

            if let Some(token) = set_access_token {
                config.set_access_token(token)?;
                println!("✔ アクセストークンを設定しました");
            }

            if let Some(url) = set_api_url {
                config.set_api_url(url)?;
                println!("✔ APIのURLを設定しました");
            }

            if show {
                let configured = |set: bool| if set { "設定済み" } else { "未設定" };
                println!("設定: {}", Config::config_path()?.display());
                println!("  API URL: {}", config.api_url.as_deref().unwrap_or("未設定"));
                println!("  APIキー: {}", configured(config.api_key.is_some()));
                println!("  アクセストークン: {}", configured(config.access_token.is_some()));
                println!("  CDN: {}", configured(config.cdn.is_configured()));
                println!("  ポート: {}", config.port);
                println!("  送信間隔: {}ms", config.upload_cooldown_ms);
                println!("  試合の取得方法: {:?}", config.lookup_strategy);
            }
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "photo_upload_rust=debug,tower_http=debug"
    } else {
        "photo_upload_rust=info,tower_http=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .init();
}
