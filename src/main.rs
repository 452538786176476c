//! Proofkb CLI - argumentative knowledge base and its interchange bundles

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use proofkb::config;
use proofkb::outcome::Outcome;
use proofkb::storage::SqliteStore;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;

#[derive(Parser)]
#[command(name = "proofkb")]
#[command(version)]
#[command(about = "Argumentative knowledge base - references, evidence, statements and documents")]
#[command(long_about = r#"
Proofkb keeps references, evidence, statements and documents in a local
SQLite database and moves them in and out of JSON bundles:
  • Full backups (export, destructive restore, additive merge)
  • Shareable single-document bundles (share, import)
  • Markdown rendering of a document's argument

Example usage:
  proofkb init
  proofkb export --out backup.json
  proofkb share --document 3 --out essay.json
  proofkb import --file essay.json
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print the structured outcome as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Path to the database file (overrides proof.toml)
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// Path to the config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write proof.toml and create the database
    Init {
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },

    /// Show row counts and dangling links
    Stats,

    /// Print the version
    Version,

    /// Export a full backup
    Export {
        /// Output file
        #[arg(short, long)]
        out: PathBuf,
    },

    /// Replace the whole database with a backup
    Restore {
        /// Backup file (asked for when omitted)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Add the entities of a backup without touching existing rows
    Merge {
        /// Backup file (asked for when omitted)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Export one document and everything it cites
    Share {
        /// Document id
        #[arg(long)]
        document: i64,

        /// Output file
        #[arg(short, long)]
        out: PathBuf,
    },

    /// Import a shared document under fresh ids
    Import {
        /// Shared document file (asked for when omitted)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Render a document as Markdown
    Render {
        /// Document id
        #[arg(long)]
        document: i64,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Add a bibliographic reference
    AddReference {
        #[arg(long)]
        title: String,
        #[arg(long)]
        author: Option<String>,
        #[arg(long)]
        year: Option<i64>,
        #[arg(long)]
        entry_type: Option<String>,
        #[arg(long)]
        journal: Option<String>,
        #[arg(long)]
        publisher: Option<String>,
        #[arg(long)]
        doi: Option<String>,
        #[arg(long)]
        url: Option<String>,
    },

    /// Add a piece of evidence
    AddEvidence {
        #[arg(long)]
        content: String,

        /// Reference the evidence is taken from
        #[arg(long)]
        reference: Option<i64>,

        #[arg(long)]
        page: Option<String>,
    },

    /// Add a statement
    AddStatement {
        #[arg(long)]
        content: String,
    },

    /// Add a document
    AddDocument {
        #[arg(long)]
        title: String,
        #[arg(long)]
        excerpt: Option<String>,
    },

    /// Set the evidence supporting a statement
    LinkEvidence {
        #[arg(long)]
        statement: i64,

        /// Evidence ids, comma separated
        #[arg(long, value_delimiter = ',')]
        evidence: Vec<i64>,
    },

    /// Set the ordered statements of a document
    LinkStatements {
        #[arg(long)]
        document: i64,

        /// Statement ids in document order, comma separated
        #[arg(long, value_delimiter = ',')]
        statements: Vec<i64>,
    },

    /// Set the tags on a piece of evidence
    TagEvidence {
        #[arg(long)]
        evidence: i64,

        /// Tag names, comma separated
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,
    },
}

impl Commands {
    /// Command name as reported in JSON outcomes
    fn name(&self) -> &'static str {
        match self {
            Commands::Init { .. } => "init",
            Commands::Stats => "stats",
            Commands::Version => "version",
            Commands::Export { .. } => "export",
            Commands::Restore { .. } => "restore",
            Commands::Merge { .. } => "merge",
            Commands::Share { .. } => "share",
            Commands::Import { .. } => "import",
            Commands::Render { .. } => "render",
            Commands::AddReference { .. } => "add-reference",
            Commands::AddEvidence { .. } => "add-evidence",
            Commands::AddStatement { .. } => "add-statement",
            Commands::AddDocument { .. } => "add-document",
            Commands::LinkEvidence { .. } => "link-evidence",
            Commands::LinkStatements { .. } => "link-statements",
            Commands::TagEvidence { .. } => "tag-evidence",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

impl OutputMode {
    pub fn is_human(&self) -> bool {
        *self == OutputMode::Human
    }
}

/// Print a successful result in JSON mode; human output is the caller's job
pub fn emit_success(output_mode: OutputMode, command: &str, data: serde_json::Value) -> anyhow::Result<()> {
    if !output_mode.is_human() {
        let mut outcome = Outcome::success(data).to_json();
        outcome["command"] = serde_json::Value::from(command);
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    }
    Ok(())
}

/// Print an outcome and report whether the command should exit cleanly
pub fn emit_outcome(output_mode: OutputMode, command: &str, outcome: &Outcome) -> anyhow::Result<bool> {
    if output_mode.is_human() {
        match outcome {
            Outcome::Success(_) => {}
            Outcome::Failure { error, kind } => proofkb::ui::error(&format!("{} failed ({}): {}", command, kind, error)),
            Outcome::Cancelled => proofkb::ui::warn(&format!("{} cancelled", command)),
        }
    } else {
        let mut value = outcome.to_json();
        value["command"] = serde_json::Value::from(command);
        println!("{}", serde_json::to_string_pretty(&value)?);
    }
    Ok(outcome.is_success() || outcome.is_cancelled())
}

fn open_store(database: Option<&Path>, config_path: Option<&Path>) -> anyhow::Result<SqliteStore> {
    let proof_config = config::load_config(config_path)?;
    let db_path = config::resolve_database_path(database, proof_config.as_ref());
    config::ensure_db_dir(&db_path)?;
    tracing::debug!("Opening database {}", db_path.display());
    Ok(SqliteStore::open(&db_path)?)
}

fn main() -> anyhow::Result<()> {
    let Cli { verbose, json, database, config, command } = Cli::parse();

    // Logs go to stderr so JSON on stdout stays parseable
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let output_mode = if json { OutputMode::Json } else { OutputMode::Human };
    let name = command.name();

    let result = match command {
        Commands::Version => commands::run_version(output_mode).map(|()| true),
        Commands::Init { force } => {
            commands::run_init(output_mode, config.as_deref(), database.as_deref(), force).map(|()| true)
        }
        command => open_store(database.as_deref(), config.as_deref())
            .and_then(|mut store| run_with_store(command, &mut store, output_mode)),
    };

    // In JSON mode every failure still prints an outcome on stdout
    let ok = match (result, output_mode) {
        (Ok(ok), _) => ok,
        (Err(e), OutputMode::Json) => {
            tracing::debug!("{} failed: {:#}", name, e);
            emit_outcome(output_mode, name, &Outcome::from_anyhow(&e))?;
            false
        }
        (Err(e), OutputMode::Human) => return Err(e),
    };

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

fn run_with_store(command: Commands, store: &mut SqliteStore, output_mode: OutputMode) -> anyhow::Result<bool> {
    match command {
        Commands::Stats => {
            commands::run_stats(store, output_mode)?;
            Ok(true)
        }
        Commands::Export { out } => commands::run_export(store, output_mode, &out),
        Commands::Restore { file } => commands::run_restore(store, output_mode, file),
        Commands::Merge { file } => commands::run_merge(store, output_mode, file),
        Commands::Share { document, out } => commands::run_share(store, output_mode, document, &out),
        Commands::Import { file } => commands::run_import(store, output_mode, file),
        Commands::Render { document, out } => commands::run_render(store, output_mode, document, out.as_deref()),
        Commands::AddReference { title, author, year, entry_type, journal, publisher, doi, url } => {
            let mut reference = proofkb::Reference::new(title);
            reference.author = author;
            reference.year = year;
            reference.entry_type = entry_type;
            reference.journal = journal;
            reference.publisher = publisher;
            reference.doi = doi;
            reference.url = url;
            commands::run_add(store, output_mode, "add-reference", &reference)
        }
        Commands::AddEvidence { content, reference, page } => {
            let mut evidence = proofkb::Evidence::new(content, reference);
            evidence.page_number = page;
            commands::run_add(store, output_mode, "add-evidence", &evidence)
        }
        Commands::AddStatement { content } => {
            commands::run_add(store, output_mode, "add-statement", &proofkb::Statement::new(content))
        }
        Commands::AddDocument { title, excerpt } => {
            let mut document = proofkb::Document::new(title);
            document.excerpt = excerpt;
            commands::run_add(store, output_mode, "add-document", &document)
        }
        Commands::LinkEvidence { statement, evidence } => {
            commands::run_link_evidence(store, output_mode, statement, &evidence)
        }
        Commands::LinkStatements { document, statements } => {
            commands::run_link_statements(store, output_mode, document, &statements)
        }
        Commands::TagEvidence { evidence, tags } => {
            commands::run_tag_evidence(store, output_mode, evidence, &tags)
        }
        Commands::Version | Commands::Init { .. } => Ok(true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure_json(name: &str, error: &anyhow::Error) -> serde_json::Value {
        let mut value = Outcome::from_anyhow(error).to_json();
        value["command"] = serde_json::Value::from(name);
        value
    }

    #[test]
    fn test_open_store_failures_become_outcomes() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("proof.toml");
        std::fs::write(&config_path, "database = [").unwrap();

        let err = open_store(None, Some(&config_path)).err().unwrap();
        let value = failure_json("stats", &err);
        assert_eq!(value["success"], false);
        assert_eq!(value["kind"], "InvalidFormatError");
        assert_eq!(value["command"], "stats");

        let not_a_dir = dir.path().join("notes.txt");
        std::fs::write(&not_a_dir, "plain file").unwrap();
        let missing_config = dir.path().join("absent.toml");
        let err = open_store(Some(&not_a_dir.join("proof.db")), Some(&missing_config)).err().unwrap();
        let value = failure_json("export", &err);
        assert_eq!(value["success"], false);
        assert_eq!(value["kind"], "StoreError");
        assert!(value["error"].as_str().is_some_and(|e| !e.is_empty()));
    }

    #[test]
    fn test_command_names_match_cli() {
        let cli = Cli::parse_from(["proofkb", "--json", "add-reference", "--title", "On Liberty"]);
        assert_eq!(cli.command.name(), "add-reference");
        let cli = Cli::parse_from(["proofkb", "import", "--file", "essay.json"]);
        assert_eq!(cli.command.name(), "import");
    }
}
