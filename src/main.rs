use asorank_lib::commands::dashboard::{get_app_dashboard, get_overview, get_rank_history};
use asorank_lib::commands::db::app_crud;
use asorank_lib::commands::settings::get_settings;
use asorank_lib::commands::workspace::open_workspace;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(name = "asorank", author, version, about)]
struct Args {
    /// Workspace directory holding the tracking database
    #[clap(short, long, default_value = ".")]
    workspace: PathBuf,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Summary across every tracked app
    Overview,
    /// List registered apps
    Apps,
    /// Stats, leaderboard and rank series for one app
    Dashboard {
        app_id: String,
        /// Chart window: 1d, 7d, 30d or 90d
        #[clap(short, long)]
        range: Option<String>,
    },
    /// Long-run rank summary for one keyword
    History { keyword_id: String },
    /// Print the effective workspace settings
    Settings,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if let Err(e) = run(args).await {
        log::error!("{e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), String> {
    let workspace = args.workspace.to_string_lossy().to_string();
    open_workspace(workspace.clone()).await?;

    match args.command {
        Command::Overview => print_json(&get_overview(workspace).await?),
        Command::Apps => print_json(&app_crud(workspace, "list".to_string(), None, None).await?),
        Command::Dashboard { app_id, range } => {
            print_json(&get_app_dashboard(workspace, app_id, range).await?)
        }
        Command::History { keyword_id } => print_json(&get_rank_history(workspace, keyword_id).await?),
        Command::Settings => print_json(&get_settings(workspace).await?),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), String> {
    let raw = serde_json::to_string_pretty(value).map_err(|e| format!("Failed to serialize output: {e}"))?;
    println!("{raw}");
    Ok(())
}
