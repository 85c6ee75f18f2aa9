use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use video_stats_bot::config::{self, AppConfig};
use video_stats_bot::loader::{self, DEFAULT_BATCH_SIZE};
use video_stats_bot::logging::init_logging;
use video_stats_bot::provision;
use video_stats_bot::schema::SCHEMA;
use video_stats_bot::telegram::{ChatBot, TelegramClient};
use video_stats_bot::{sanitize, AppContext};

#[derive(Parser)]
#[command(name = "video-stats-bot", version)]
#[command(about = "Answers questions about video statistics with a single number (LLM text-to-SQL)")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the Telegram bot
    Bot,

    /// Ask a single question (non-interactive)
    Ask {
        question: String,
    },

    /// Interactive question prompt
    Query,

    /// Sanitize and execute a SQL statement directly
    Sql {
        statement: String,
    },

    /// Create tables and indexes
    InitDb,

    /// Import a videos JSON export
    LoadData {
        file: PathBuf,
        #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
        batch_size: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let log_dir = init_logging();

    let cli = Cli::parse();
    let cfg = config::load_config().unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });

    let ctx = AppContext::build(&cfg).context("building LLM client")?;
    let result = run(cli.command, &ctx, &cfg, log_dir).await;
    ctx.shutdown();
    result
}

async fn run(command: Command, ctx: &AppContext, cfg: &AppConfig, log_dir: Option<&Path>) -> Result<()> {
    match command {
        Command::Bot => {
            let client = TelegramClient::from_config(&cfg.telegram)?;
            ctx.db().connect().await.context("opening database")?;
            print_startup_info(cfg, ctx, log_dir);

            let bot = ChatBot::new(client, ctx.pipeline().clone());
            bot.run(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!("Cannot listen for Ctrl+C: {}", e);
                    std::future::pending::<()>().await;
                }
                info!("Ctrl+C received");
            })
            .await;
        }

        Command::Ask { question } => {
            println!("{}", ctx.pipeline().reply(&question).await);
        }

        Command::Query => {
            ctx.pipeline().repl().await;
        }

        Command::Sql { statement } => {
            let sql = sanitize(&statement)?;
            println!("SQL: {}", sql);
            let value = ctx.pipeline().executor().execute(&sql).await?;
            println!("{}", value);
        }

        Command::InitDb => {
            let conn = ctx.db().acquire().await.context("opening database")?;
            provision::create_schema(&conn, &SCHEMA)?;
            println!("Tables in {}:", ctx.db().path().display());
            for table in provision::list_tables(&conn)? {
                println!("  • {}", table);
            }
        }

        Command::LoadData { file, batch_size } => {
            let summary = loader::load_file(ctx.db(), &file, batch_size)
                .await
                .with_context(|| format!("loading {}", file.display()))?;
            println!("Loaded {} videos, {} snapshots", summary.videos, summary.snapshots);
        }
    }
    Ok(())
}

fn print_startup_info(cfg: &AppConfig, ctx: &AppContext, log_dir: Option<&Path>) {
    let llm = ctx.pipeline().translator_name();

    println!("╔══════════════════════════════════════════════════════════╗");
    println!("║            VIDEO STATS BOT v{:<29}║", env!("CARGO_PKG_VERSION"));
    println!("╠══════════════════════════════════════════════════════════╣");
    println!("  Database:  {}", ctx.db().path().display());
    println!("  Pool:      {} connection(s)", cfg.database.max_connections);
    println!("  LLM:       {}", llm);
    println!("  Telegram:  {}", cfg.telegram.api_base);
    match log_dir {
        Some(dir) => println!("  Logs:      {}", dir.display()),
        None => println!("  Logs:      stdout only"),
    }
    println!("╚══════════════════════════════════════════════════════════╝");
}
