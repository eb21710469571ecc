use anyhow::Result;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::backup::Mode;

#[derive(Parser, Debug)]
#[command(name = "daybook")]
#[command(about = "Daybook CLI - worklog backups, migration and administration")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    account: Account,

    #[command(subcommand)]
    command: Commands,
}

/// Where and as whom to connect.
#[derive(Args, Debug)]
pub struct Account {
    /// Daybook API URL
    #[arg(long, global = true, env = "DAYBOOK_API_URL", default_value = "http://localhost:8080")]
    pub api_url: String,

    /// Account email
    #[arg(long, global = true, env = "DAYBOOK_EMAIL")]
    pub email: Option<String>,

    /// Account password
    #[arg(long, global = true, env = "DAYBOOK_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check credentials and show the account
    Login,

    /// List workspace items
    Items {
        /// Keyword filter on title and content
        #[arg(short, long)]
        query: Option<String>,

        /// Only items due on this date (YYYY-MM-DD)
        #[arg(short, long)]
        date: Option<NaiveDate>,
    },

    /// Create a workspace item
    Add {
        title: String,

        /// Due date (YYYY-MM-DD)
        #[arg(short, long)]
        date: Option<NaiveDate>,

        /// free, worklog or meeting
        #[arg(short, long)]
        template: Option<String>,
    },

    /// Show the monthly board
    Board {
        /// Month as YYYY-MM
        month: String,
    },

    /// Download a backup archive
    Export {
        /// Output file
        #[arg(short, long, default_value = "backup.zip")]
        output: PathBuf,
    },

    /// Restore a backup archive
    Restore {
        /// Archive produced by `export`
        input: PathBuf,

        #[arg(short, long, value_enum, default_value_t = Mode::Merge)]
        mode: Mode,
    },

    /// Import a third-party export archive
    Migrate {
        /// ZIP archive (may contain nested archives)
        input: PathBuf,
    },

    /// Administrator commands
    Admin {
        #[command(subcommand)]
        command: AdminCommands,
    },
}

#[derive(Subcommand, Debug)]
enum AdminCommands {
    /// Totals across all accounts
    Stats,
    /// List accounts
    Users,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let client = commands::connect(&cli.account).await?;

    match cli.command {
        Commands::Login => commands::items::run_login(&client).await?,
        Commands::Items { query, date } => {
            commands::items::run_list(&client, query.as_deref(), date).await?
        }
        Commands::Add {
            title,
            date,
            template,
        } => commands::items::run_add(&client, title, date, template).await?,
        Commands::Board { month } => commands::items::run_board(&client, &month).await?,
        Commands::Export { output } => commands::backup::run_export(&client, &output).await?,
        Commands::Restore { input, mode } => {
            commands::backup::run_restore(&client, &input, mode).await?
        }
        Commands::Migrate { input } => commands::migrate::run_migrate(&client, &input).await?,
        Commands::Admin { command } => match command {
            AdminCommands::Stats => commands::admin::run_stats(&client).await?,
            AdminCommands::Users => commands::admin::run_users(&client).await?,
        },
    }

    Ok(())
}
