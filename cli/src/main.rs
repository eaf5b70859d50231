mod auth;
mod commands;
mod config;
mod server;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process;

use crate::commands::{
    cmd_delete, cmd_export, cmd_history, cmd_import, cmd_log, cmd_stats, cmd_user_add,
    cmd_user_list, cmd_weekly, resolve_cli_user,
};
use crate::config::Config;
use doze_core::db::Database;

#[derive(Parser)]
#[command(
    name = "doze",
    version,
    about = "A simple sleep tracker CLI",
    long_about = "\n\n  ██████╗  ██████╗ ███████╗███████╗
  ██╔══██╗██╔═══██╗╚══███╔╝██╔════╝
  ██║  ██║██║   ██║  ███╔╝ █████╗
  ██║  ██║██║   ██║ ███╔╝  ██╔══╝
  ██████╔╝╚██████╔╝███████╗███████╗
  ╚═════╝  ╚═════╝ ╚══════╝╚══════╝
        know how you're sleeping.
"
)]
struct Cli {
    /// Local account to record against
    #[arg(long, global = true, default_value = "default")]
    user: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log one night of sleep
    Log {
        /// Sleep score, 0-100
        score: f64,
        /// Bed time (H:MM or HH:MM)
        bed: String,
        /// Wake-up time (H:MM or HH:MM)
        wake: String,
        /// Date the night belongs to (YYYY-MM-DD, today, yesterday; default: today)
        #[arg(long)]
        date: Option<String>,
        /// Sleep duration (minutes or H:MM; default: derived from bed/wake)
        #[arg(long)]
        duration: Option<String>,
        /// Number of mid-sleep awakenings
        #[arg(long, default_value = "0")]
        wakeups: i64,
        /// Deep-sleep continuity score, 0-100
        #[arg(long, default_value = "0")]
        continuity: f64,
        /// Deep sleep percentage
        #[arg(long)]
        deep: f64,
        /// Light sleep percentage
        #[arg(long)]
        light: f64,
        /// REM sleep percentage
        #[arg(long)]
        rem: f64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show recent entries
    History {
        /// Number of entries to show
        #[arg(short, long, default_value = "14")]
        limit: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show overall statistics and trends
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show per-weekday averages
    Weekly {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete an entry by ID
    Delete {
        /// Entry ID to delete
        entry_id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Import entries from a CSV file
    Import {
        /// Path to the CSV file
        file: std::path::PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Export entries as CSV (stdout unless --out is given)
    Export {
        /// Write to this file instead of stdout
        #[arg(long, value_name = "PATH")]
        out: Option<std::path::PathBuf>,
        /// Output summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Start the REST API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Address to bind to (default: 127.0.0.1, use 0.0.0.0 to expose to network)
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
    },
    /// Manage accounts
    User {
        #[command(subcommand)]
        command: UserCommands,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    /// Create an account that can log in over the API
    Add {
        /// Username (at least 3 characters)
        username: String,
        /// Password (at least 6 characters)
        #[arg(long)]
        password: String,
        /// Allow other accounts to view this account's records
        #[arg(long)]
        public: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List accounts
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let db = Database::open(&config.db_path)?;

    match cli.command {
        Commands::Log {
            score,
            bed,
            wake,
            date,
            duration,
            wakeups,
            continuity,
            deep,
            light,
            rem,
            json,
        } => {
            let user = resolve_cli_user(&db, &cli.user)?;
            cmd_log(
                &db,
                &user,
                date.as_deref(),
                score,
                &bed,
                &wake,
                duration.as_deref(),
                wakeups,
                continuity,
                deep,
                light,
                rem,
                json,
            )
        }
        Commands::History { limit, json } => {
            let user = resolve_cli_user(&db, &cli.user)?;
            cmd_history(&db, &user, limit, json)
        }
        Commands::Stats { json } => {
            let user = resolve_cli_user(&db, &cli.user)?;
            cmd_stats(&db, &user, json)
        }
        Commands::Weekly { json } => {
            let user = resolve_cli_user(&db, &cli.user)?;
            cmd_weekly(&db, &user, json)
        }
        Commands::Delete { entry_id, json } => {
            let user = resolve_cli_user(&db, &cli.user)?;
            cmd_delete(&db, &user, entry_id, json)
        }
        Commands::Import { file, json } => {
            let user = resolve_cli_user(&db, &cli.user)?;
            cmd_import(&db, &user, &file, json)
        }
        Commands::Export { out, json } => {
            let user = resolve_cli_user(&db, &cli.user)?;
            cmd_export(&db, &user, out.as_deref(), json)
        }
        Commands::Serve { port, bind } => server::start_server(db, port, &bind).await,
        Commands::User { command } => match command {
            UserCommands::Add {
                username,
                password,
                public,
                json,
            } => cmd_user_add(&db, &username, &password, public, json),
            UserCommands::List { json } => cmd_user_list(&db, json),
        },
    }
}
