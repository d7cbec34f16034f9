//! # znc-search CLI
//!
//! ## Usage
//!
//! ```bash
//! znc-search --config ./config/znc-search.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `init` | Create the SQLite database and schema |
//! | `import` | Import ZNC logs (all networks, or `--network`) |
//! | `import --dry-run` | Report which log files would be imported |
//! | `search "<query>" --network N` | Search one network's logs |
//! | `context --network N --channel C --date D --line L` | Show lines around a hit |
//! | `stats` | Database overview |
//! | `user add <name> --password P` | Create or update an API user |
//! | `user list` / `user info <name>` | Show API users |
//! | `user password <name> --password P` | Reset an existing user's password |
//! | `user delete <name>` | Remove an API user |
//! | `serve` | Start the HTTP API |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use znc_search::config;
use znc_search::context::{run_context, ContextRequest};
use znc_search::search::{run_search, SearchRequest};
use znc_search::{auth, ingest, logging, migrate, server, stats};

/// Import ZNC IRC logs into SQLite and search them.
///
/// All commands read a TOML configuration file given by `--config`.
#[derive(Parser)]
#[command(name = "znc-search", version, about = "Import and search ZNC IRC logs")]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/znc-search.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Import logs from the ZNC base directory.
    ///
    /// Files already represented in the database are skipped unless
    /// `--force` is given, in which case their entries are replaced.
    Import {
        /// Only import this network (directory name under the base path).
        #[arg(long)]
        network: Option<String>,

        /// Re-import files that were already imported.
        #[arg(long)]
        force: bool,

        /// Walk the log tree and report what would be imported, without
        /// opening the database.
        #[arg(long, conflicts_with = "force")]
        dry_run: bool,
    },

    /// Search a network's logs.
    ///
    /// A single word uses the full-text index; anything else is matched as
    /// a literal substring.
    Search {
        query: String,

        #[arg(long)]
        network: String,

        #[arg(long)]
        channel: Option<String>,

        /// Earliest date, YYYY-MM-DD (inclusive).
        #[arg(long)]
        from: Option<String>,

        /// Latest date, YYYY-MM-DD (inclusive).
        #[arg(long)]
        to: Option<String>,
    },

    /// Show the lines around one log line.
    Context {
        #[arg(long)]
        network: String,

        #[arg(long)]
        channel: String,

        /// Log date, YYYY-MM-DD.
        #[arg(long)]
        date: String,

        #[arg(long)]
        line: i64,

        #[arg(long)]
        before: Option<i64>,

        #[arg(long)]
        after: Option<i64>,
    },

    /// Show database statistics.
    Stats,

    /// Manage API users.
    User {
        #[command(subcommand)]
        action: UserAction,
    },

    /// Start the HTTP API on `[server] bind`.
    Serve,
}

#[derive(Subcommand)]
enum UserAction {
    /// Create a user, or reset the password of an existing one.
    Add {
        username: String,

        #[arg(long)]
        password: String,
    },

    /// List all users.
    List,

    /// Show one user.
    Info { username: String },

    /// Reset the password of an existing user.
    Password {
        username: String,

        #[arg(long)]
        password: String,
    },

    /// Delete a user.
    Delete { username: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_logging();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Import {
            network,
            force,
            dry_run,
        } => {
            if dry_run {
                ingest::run_scan(&cfg, network.as_deref())?;
            } else {
                ingest::run_import(&cfg, network.as_deref(), force).await?;
            }
        }
        Commands::Search {
            query,
            network,
            channel,
            from,
            to,
        } => {
            let req = SearchRequest {
                network,
                query,
                channel,
                start_date: from,
                end_date: to,
            };
            run_search(&cfg, &req).await?;
        }
        Commands::Context {
            network,
            channel,
            date,
            line,
            before,
            after,
        } => {
            let req = ContextRequest {
                network,
                channel,
                date,
                line,
                lines_before: before,
                lines_after: after,
            };
            run_context(&cfg, &req).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::User { action } => match action {
            UserAction::Add { username, password } => {
                auth::run_user_add(&cfg, &username, &password).await?;
            }
            UserAction::List => auth::run_user_list(&cfg).await?,
            UserAction::Info { username } => auth::run_user_info(&cfg, &username).await?,
            UserAction::Password { username, password } => {
                auth::run_user_password(&cfg, &username, &password).await?;
            }
            UserAction::Delete { username } => auth::run_user_delete(&cfg, &username).await?,
        },
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
