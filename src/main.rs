//! # Suite Forge CLI (`sforge`)
//!
//! The `sforge` binary is the request-layer stand-in for Suite Forge. It
//! creates entities, triggers the asynchronous handlers inline, and reads
//! back persisted state.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `sforge init` | Create the SQLite database and the file store root |
//! | `sforge sources` | Show storage backend status and entity counts |
//! | `sforge source add` | Register an origin source (file set or git repo) |
//! | `sforge source prepare <id>` | Derive and prepare a copy of an origin source |
//! | `sforge suite add` | Create (or fetch) a suite for a source |
//! | `sforge suite serialize <suite-id>` | Request and run serialization of a suite |
//! | `sforge status <id>` | Show an entity's state, including failure detail |
//! | `sforge serialize <dir>` | One-shot: assemble a local directory to stdout |

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use suite_forge::assembler::assemble_documents;
use suite_forge::config::{load_config, Config};
use suite_forge::messages::{PrepareMessage, SerializeSuiteMessage};
use suite_forge::models::{Parameters, RunState, SerializedSuite, Source, SourceKind};
use suite_forge::persistence::{Persistence, SqlitePersistence};
use suite_forge::prepare::prepare_source;
use suite_forge::reader::ReaderProvider;
use suite_forge::reader_fs::FileStoreReader;
use suite_forge::reader_git::GitCheckoutReader;
use suite_forge::serialize::serialize_suite;
use suite_forge::store::FileStore;
use suite_forge::{db, migrate};

/// Suite Forge — serialize YAML test suites into reproducible bundles.
#[derive(Parser)]
#[command(name = "sforge", about = "Suite Forge — YAML suite serialization", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/forge.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema and the file store root.
    Init,

    /// Show storage backend status and entity counts.
    Sources,

    /// Manage sources.
    Source {
        #[command(subcommand)]
        action: SourceAction,
    },

    /// Manage suites.
    Suite {
        #[command(subcommand)]
        action: SuiteAction,
    },

    /// Show the persisted state of a source, suite, or serialized suite.
    Status {
        /// Entity id.
        id: String,
    },

    /// Assemble a local directory into a concatenated document stream on
    /// stdout, without touching the database.
    Serialize {
        /// Directory holding YAML files.
        dir: PathBuf,
    },
}

#[derive(Subcommand)]
enum SourceAction {
    /// Register an origin source.
    Add {
        /// Source kind: `file` or `git`.
        #[arg(long)]
        kind: String,

        /// Base storage path for file sources. Defaults to the new id.
        #[arg(long)]
        path: Option<String>,

        /// Source parameters as `key=value` (e.g. `url=...`, `ref=...`).
        #[arg(long = "param")]
        params: Vec<String>,
    },

    /// Create a derived copy of an origin source and run preparation.
    Prepare {
        /// Origin source id.
        id: String,

        /// Run parameters as `key=value`, overlaid on the origin's.
        #[arg(long = "param")]
        params: Vec<String>,
    },
}

#[derive(Subcommand)]
enum SuiteAction {
    /// Create a suite, or return the existing one for an identical
    /// (source, label, tests) triple.
    Add {
        /// Source id the suite selects from.
        #[arg(long)]
        source: String,

        /// Human label, unique per source.
        #[arg(long)]
        label: String,

        /// Test file selectors, in order. Empty means all files.
        #[arg(long = "test")]
        tests: Vec<String>,
    },

    /// Create a serialized suite in `requested` state and run serialization.
    Serialize {
        /// Suite id.
        id: String,

        /// Run parameters as `key=value`, echoed onto the bundle.
        #[arg(long = "param")]
        params: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Init => init(&config).await,
        Commands::Sources => sources(&config).await,
        Commands::Source { action } => match action {
            SourceAction::Add { kind, path, params } => source_add(&config, &kind, path, params).await,
            SourceAction::Prepare { id, params } => source_prepare(&config, &id, params).await,
        },
        Commands::Suite { action } => match action {
            SuiteAction::Add {
                source,
                label,
                tests,
            } => suite_add(&config, &source, &label, tests).await,
            SuiteAction::Serialize { id, params } => suite_serialize(&config, &id, params).await,
        },
        Commands::Status { id } => status(&config, &id).await,
        Commands::Serialize { dir } => serialize_dir(&config, &dir),
    }
}

async fn open_persistence(config: &Config) -> Result<SqlitePersistence> {
    let pool = db::connect(&config.db.path).await?;
    Ok(SqlitePersistence::new(pool))
}

fn file_store(config: &Config) -> FileStore {
    FileStore::new(&config.storage.file_store_root)
}

fn build_provider(config: &Config) -> Result<ReaderProvider> {
    let exclude = &config.serialization.exclude_globs;
    Ok(ReaderProvider::new(vec![
        Arc::new(FileStoreReader::new(file_store(config), exclude)?),
        Arc::new(GitCheckoutReader::new(
            FileStore::new(config.storage.git_cache_dir()),
            exclude,
        )?),
    ]))
}

fn parse_params(raw: Vec<String>) -> Result<Parameters> {
    let mut parameters = Parameters::new();
    for entry in raw {
        let Some((key, value)) = entry.split_once('=') else {
            bail!("parameter '{entry}' is not in key=value form");
        };
        parameters.insert(key.to_string(), value.to_string());
    }
    Ok(parameters)
}

async fn init(config: &Config) -> Result<()> {
    let pool = db::connect(&config.db.path).await?;
    migrate::run_migrations(&pool).await?;
    std::fs::create_dir_all(&config.storage.file_store_root).with_context(|| {
        format!(
            "Failed to create file store root: {}",
            config.storage.file_store_root.display()
        )
    })?;
    println!("initialized {}", config.db.path.display());
    Ok(())
}

async fn sources(config: &Config) -> Result<()> {
    let root = &config.storage.file_store_root;
    let cache = config.storage.git_cache_dir();

    println!("{:<16} {:<40} HEALTHY", "BACKEND", "LOCATION");
    println!("{:<16} {:<40} {}", "file-store", root.display().to_string(), root.exists());
    println!("{:<16} {:<40} {}", "git-cache", cache.display().to_string(), cache.exists());

    let pool = db::connect(&config.db.path).await?;
    for (label, table) in [
        ("sources", "sources"),
        ("suites", "suites"),
        ("serialized suites", "serialized_suites"),
    ] {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&pool)
            .await?;
        println!("{label}: {count}");
    }

    Ok(())
}

async fn source_add(
    config: &Config,
    kind: &str,
    path: Option<String>,
    params: Vec<String>,
) -> Result<()> {
    let Some(kind) = SourceKind::from_str(kind) else {
        bail!("unknown source kind '{kind}'; expected 'file' or 'git'");
    };
    let parameters = parse_params(params)?;
    if kind == SourceKind::Git && !parameters.contains_key("url") {
        bail!("git sources need a url parameter (--param url=...)");
    }

    let id = Uuid::new_v4().to_string();
    let source = Source {
        path: path.unwrap_or_else(|| id.clone()),
        id: id.clone(),
        kind,
        state: RunState::Requested,
        parent_id: None,
        parameters,
        created_at: chrono::Utc::now().timestamp(),
    };

    let persistence = open_persistence(config).await?;
    persistence.save_source(&source).await?;
    println!("{id}");
    Ok(())
}

async fn source_prepare(config: &Config, origin_id: &str, params: Vec<String>) -> Result<()> {
    let persistence = open_persistence(config).await?;
    let Some(origin) = persistence.find_source(origin_id).await? else {
        bail!("source '{origin_id}' not found");
    };

    let id = Uuid::new_v4().to_string();
    let derived = Source {
        path: id.clone(),
        id: id.clone(),
        kind: SourceKind::File,
        state: RunState::Requested,
        parent_id: Some(origin.id.clone()),
        parameters: parse_params(params)?,
        created_at: chrono::Utc::now().timestamp(),
    };
    persistence.save_source(&derived).await?;
    println!("{id}");

    let provider = build_provider(config)?;
    let store = file_store(config);
    let message = PrepareMessage::new(id);
    prepare_source(
        &persistence,
        &provider,
        &store,
        &config.serialization.extensions,
        &message,
    )
    .await?;

    println!("prepared");
    Ok(())
}

async fn suite_add(
    config: &Config,
    source_id: &str,
    label: &str,
    tests: Vec<String>,
) -> Result<()> {
    let persistence = open_persistence(config).await?;
    if persistence.find_source(source_id).await?.is_none() {
        bail!("source '{source_id}' not found");
    }

    let suite = persistence
        .get_or_create_suite(source_id, label, &tests)
        .await?;
    println!("{}", suite.id);
    Ok(())
}

async fn suite_serialize(config: &Config, suite_id: &str, params: Vec<String>) -> Result<()> {
    let persistence = open_persistence(config).await?;
    if persistence.find_suite(suite_id).await?.is_none() {
        bail!("suite '{suite_id}' not found");
    }

    let id = Uuid::new_v4().to_string();
    let serialized = SerializedSuite {
        id: id.clone(),
        suite_id: suite_id.to_string(),
        parameters: parse_params(params)?,
        state: RunState::Requested,
        failure_reason: None,
        failure_message: None,
        created_at: chrono::Utc::now().timestamp(),
    };
    persistence.save_serialized_suite(&serialized).await?;
    println!("{id}");

    let provider = build_provider(config)?;
    let store = file_store(config);
    let message = SerializeSuiteMessage::new(id);
    serialize_suite(
        &persistence,
        &provider,
        &store,
        &config.serialization.extensions,
        &message,
    )
    .await?;

    println!("serialized");
    Ok(())
}

async fn status(config: &Config, id: &str) -> Result<()> {
    let persistence = open_persistence(config).await?;

    if let Some(source) = persistence.find_source(id).await? {
        println!("source {}", source.id);
        println!("  kind: {}", source.kind);
        println!("  path: {}", source.path);
        println!("  state: {}", source.state.as_str());
        if let Some(parent) = &source.parent_id {
            println!("  parent: {parent}");
        }
        return Ok(());
    }

    if let Some(suite) = persistence.find_suite(id).await? {
        println!("suite {}", suite.id);
        println!("  source: {}", suite.source_id);
        println!("  label: {}", suite.label);
        println!("  tests: {}", suite.tests.len());
        return Ok(());
    }

    if let Some(serialized) = persistence.find_serialized_suite(id).await? {
        println!("serialized suite {}", serialized.id);
        println!("  suite: {}", serialized.suite_id);
        println!("  state: {}", serialized.state.as_str());
        if let Some(reason) = serialized.failure_reason {
            println!("  failure reason: {reason}");
        }
        if let Some(message) = &serialized.failure_message {
            println!("  failure message: {message}");
        }
        return Ok(());
    }

    bail!("no entity with id '{id}'");
}

fn serialize_dir(config: &Config, dir: &std::path::Path) -> Result<()> {
    let dir = dir
        .canonicalize()
        .with_context(|| format!("Directory not found: {}", dir.display()))?;
    let parent = dir
        .parent()
        .with_context(|| "Cannot serialize the filesystem root")?;
    let name = dir
        .file_name()
        .with_context(|| "Cannot serialize the filesystem root")?
        .to_string_lossy()
        .to_string();

    let reader = FileStoreReader::new(
        FileStore::new(parent),
        &config.serialization.exclude_globs,
    )?;
    let source = Source {
        id: name.clone(),
        kind: SourceKind::File,
        path: name,
        state: RunState::Requested,
        parent_id: None,
        parameters: Parameters::new(),
        created_at: chrono::Utc::now().timestamp(),
    };

    let documents = assemble_documents(&reader, &source, &config.serialization.extensions)?;
    println!("{documents}");
    Ok(())
}
