mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gptmem_config::ConfigLoader;
use gptmem_db::Database;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "gptmem",
    version,
    about = "gptmem - local conversational memory store"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Store file (overrides the configured path)
    #[arg(long, env = "GPTMEM_DB", global = true)]
    db: Option<PathBuf>,

    /// Directory holding config.yml or config.toml
    #[arg(long, env = "GPTMEM_CONFIG_DIR", global = true)]
    config_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a message record
    Add {
        /// Message text
        text: String,

        /// Owner of the record (defaults to the configured user)
        #[arg(long)]
        user: Option<String>,

        #[arg(long, default_value = "user")]
        role: String,

        /// Timestamp (defaults to now, ISO-8601 UTC)
        #[arg(long)]
        ts: Option<String>,

        #[arg(long, default_value = "")]
        categories: String,

        #[arg(long, default_value = "")]
        labels: String,

        /// Mark the record as continuing the previous turn
        #[arg(long)]
        continued: bool,

        #[arg(long, default_value = "")]
        level1: String,

        #[arg(long, default_value = "")]
        level2: String,

        #[arg(long, default_value = "")]
        level3: String,

        /// Embedding values, e.g. "0.1,0.2,0.3"
        #[arg(long)]
        embedding: Option<String>,
    },

    /// List recent message records, newest first
    Show {
        #[arg(long)]
        user: Option<String>,

        #[arg(long)]
        limit: Option<usize>,

        /// Print full records, embeddings included, as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete message records by id, e.g. `delete 1, 2 3`
    Delete {
        #[arg(required = true, num_args = 1..)]
        ids: Vec<String>,
    },

    /// Manage learning-log entries
    Log {
        #[command(subcommand)]
        action: LogCommands,
    },
}

#[derive(Subcommand)]
enum LogCommands {
    /// Record a log entry
    Add {
        #[arg(long)]
        ts: Option<String>,

        #[arg(long)]
        feedback: Option<String>,

        /// JSON value (plain text is stored as a string)
        #[arg(long)]
        decay_weights: Option<String>,

        #[arg(long)]
        inputs: Option<String>,

        #[arg(long)]
        outputs: Option<String>,
    },

    /// Change named fields of a log entry
    Update {
        id: i64,

        /// Field assignment, repeatable: --set feedback=good
        #[arg(long = "set", value_name = "FIELD=VALUE", required = true)]
        assignments: Vec<String>,
    },

    /// Print a log entry as JSON
    Show { id: i64 },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let loader = match &cli.config_dir {
        Some(dir) => ConfigLoader::with_dir(dir),
        None => ConfigLoader::new(),
    };
    let config = loader.load()?;

    let level = config.log_level_or(cli.log_level.as_deref());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();

    let db_path = cli.db.unwrap_or_else(|| config.resolve_db_path());
    debug!("using store {}", db_path.display());

    let db = Database::open(&db_path)
        .with_context(|| format!("cannot open memory store {}", db_path.display()))?;

    match cli.command {
        Commands::Add {
            text,
            user,
            role,
            ts,
            categories,
            labels,
            continued,
            level1,
            level2,
            level3,
            embedding,
        } => {
            let embedding = embedding
                .as_deref()
                .map(commands::parse_embedding)
                .transpose()?;
            let record = gptmem_db::NewMemoryRecord {
                text,
                role,
                ts: ts.unwrap_or_else(gptmem_common::now_timestamp),
                categories,
                labels,
                embedding,
                continued,
                level1,
                level2,
                level3,
                user_id: user.unwrap_or_else(|| config.default_user.clone()),
            };
            let id = db.memories().insert(&record)?;
            println!("{id}");
        }
        Commands::Show { user, limit, json } => {
            let user = user.unwrap_or_else(|| config.default_user.clone());
            let limit = limit.unwrap_or(config.read_limit);
            if json {
                let records = db.memories().read(&user, limit)?;
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                let summaries = db.memories().project(&user, limit)?;
                commands::print_summary_table(&summaries);
            }
        }
        Commands::Delete { ids } => {
            let ids = gptmem_db::parse_id_list(&ids.join(" "))?;
            let deleted = db.memories().delete(&ids)?;
            println!("Deleted {deleted} record(s).");
        }
        Commands::Log { action } => match action {
            LogCommands::Add {
                ts,
                feedback,
                decay_weights,
                inputs,
                outputs,
            } => {
                let entry = gptmem_db::NewLogEntry {
                    ts: ts.unwrap_or_else(gptmem_common::now_timestamp),
                    decay_weights: commands::parse_json_arg(decay_weights.as_deref()),
                    feedback,
                    inputs: commands::parse_json_arg(inputs.as_deref()),
                    outputs: commands::parse_json_arg(outputs.as_deref()),
                };
                let id = db.logs().insert(&entry)?;
                println!("{id}");
            }
            LogCommands::Update { id, assignments } => {
                let update = commands::build_log_update(&assignments)?;
                db.logs().update(id, &update)?;
                println!("Updated log {id}: {}", commands::field_list(&update));
            }
            LogCommands::Show { id } => match db.logs().get(id)? {
                Some(entry) => println!("{}", serde_json::to_string_pretty(&entry)?),
                None => anyhow::bail!("log entry {id} not found"),
            },
        },
    }

    db.close()?;
    Ok(())
}
