//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use notemerge_core::dupes::DuplicateGroup;
use notemerge_core::ops::{self, MergeSummary, ProgressReporter};
use notemerge_core::ordering::SortOrder;
use notemerge_core::import;
use notemerge_shared::{
    AppConfig, CardId, MergeConfig, NoteId, collection_path, init_config, load_config,
    load_config_from,
};
use notemerge_storage::Collection;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// notemerge: merge fields of flashcard notes and clean up duplicates.
#[derive(Parser)]
#[command(
    name = "notemerge",
    version,
    about = "Merge fields of flashcard notes, find and merge duplicates, copy notes.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Collection database (overrides the config file).
    #[arg(long, env = "NOTEMERGE_COLLECTION", global = true)]
    pub collection: Option<PathBuf>,

    /// Config file to use instead of ~/.notemerge/notemerge.toml.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Import notes and cards from a JSON file.
    Import {
        /// Path to the JSON file.
        file: PathBuf,
    },

    /// List every note in the collection.
    List,

    /// Merge the notes behind the given cards.
    Merge {
        /// Card ids (comma-separated).
        #[arg(long, value_delimiter = ',', required = true)]
        cards: Vec<CardId>,

        #[command(flatten)]
        overrides: MergeOverrides,
    },

    /// Report groups of notes whose field holds the same content.
    FindDupes {
        /// Field to compare.
        #[arg(long)]
        field: String,

        /// Only consider notes containing this text.
        #[arg(long, default_value = "")]
        search: String,
    },

    /// Find duplicate groups and merge each of them.
    MergeDupes {
        /// Field to compare.
        #[arg(long)]
        field: String,

        /// Only consider notes containing this text.
        #[arg(long, default_value = "")]
        search: String,

        #[command(flatten)]
        overrides: MergeOverrides,
    },

    /// Create copies of notes.
    Duplicate {
        /// Note ids (comma-separated).
        #[arg(long, value_delimiter = ',', required = true)]
        notes: Vec<NoteId>,
    },

    /// Show recently applied operations.
    History {
        /// Number of entries to show.
        #[arg(long, default_value = "10")]
        limit: u32,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Per-invocation overrides of the `[merge]` config section.
#[derive(Args, Debug, Default)]
pub(crate) struct MergeOverrides {
    /// Text inserted between merged values (`\n`, `\t` escapes allowed).
    #[arg(long)]
    pub separator: Option<String>,

    /// Ordering name, e.g. "Due" or "Sort Field (numeric)".
    #[arg(long)]
    pub ordering: Option<String>,

    /// Reverse the ordering.
    #[arg(long)]
    pub reverse: bool,

    /// Keep only the last note of each group.
    #[arg(long)]
    pub delete_originals: bool,

    /// Only fill empty fields.
    #[arg(long)]
    pub only_empty: bool,

    /// Leave tags alone.
    #[arg(long)]
    pub no_merge_tags: bool,
}

impl MergeOverrides {
    fn apply(&self, config: &mut MergeConfig) -> Result<()> {
        if let Some(separator) = &self.separator {
            config.field_separator = separator.clone();
        }
        if let Some(ordering) = &self.ordering {
            if SortOrder::from_name(ordering).is_none() {
                let known: Vec<_> = SortOrder::ALL.iter().map(|o| o.name()).collect();
                return Err(eyre!(
                    "unknown ordering '{ordering}': expected one of {}",
                    known.join(", ")
                ));
            }
            config.ordering = ordering.clone();
        }
        config.reverse_order |= self.reverse;
        config.delete_original_notes |= self.delete_originals;
        config.only_empty |= self.only_empty;
        if self.no_merge_tags {
            config.merge_tags = false;
        }
        Ok(())
    }
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "notemerge=info",
        1 => "notemerge=debug",
        _ => "notemerge=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    if let Some(path) = &cli.collection {
        config.collection.path = path.to_string_lossy().into_owned();
    }

    match cli.command {
        Command::Import { file } => cmd_import(&config, &file).await,
        Command::List => cmd_list(&config).await,
        Command::Merge { cards, overrides } => cmd_merge(config, &cards, &overrides).await,
        Command::FindDupes { field, search } => cmd_find_dupes(&config, &field, &search).await,
        Command::MergeDupes {
            field,
            search,
            overrides,
        } => cmd_merge_dupes(config, &field, &search, &overrides).await,
        Command::Duplicate { notes } => cmd_duplicate(&config, &notes).await,
        Command::History { limit } => cmd_history(&config, limit).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(&config),
        },
    }
}

async fn open_collection(config: &AppConfig) -> Result<Collection> {
    let path = collection_path(config)?;
    info!(path = %path.display(), "opening collection");
    Ok(Collection::open(&path).await?)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_import(config: &AppConfig, file: &Path) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .map_err(|e| eyre!("cannot read '{}': {e}", file.display()))?;
    let parsed = import::parse_import(&content)?;

    let collection = open_collection(config).await?;
    let ids = import::import_notes(&collection, &parsed).await?;

    println!("Imported {} notes.", ids.len());
    Ok(())
}

async fn cmd_list(config: &AppConfig) -> Result<()> {
    let collection = open_collection(config).await?;
    let notes = collection.list_notes().await?;

    for note in &notes {
        let cards = collection.cards_of_note(note.id).await?;
        let card_ids: Vec<String> = cards.iter().map(|c| c.id.to_string()).collect();
        println!(
            "{}  {:<12} {:<40} cards=[{}] tags=[{}]",
            note.id,
            note.notetype,
            preview(note.sort_field_value(), 40),
            card_ids.join(","),
            note.tags.join(" "),
        );
    }
    println!("{} notes", notes.len());
    Ok(())
}

async fn cmd_merge(
    mut config: AppConfig,
    cards: &[CardId],
    overrides: &MergeOverrides,
) -> Result<()> {
    overrides.apply(&mut config.merge)?;
    let collection = open_collection(&config).await?;

    let summary = ops::merge_selected(&collection, cards, &config.merge).await?;
    println!("{} notes merged.", summary.notes_merged);
    if summary.removed > 0 {
        println!("{} notes deleted.", summary.removed);
    }
    Ok(())
}

async fn cmd_find_dupes(config: &AppConfig, field: &str, search: &str) -> Result<()> {
    let collection = open_collection(config).await?;
    let groups = ops::find_duplicates(&collection, field, search, &config.merge).await?;

    if groups.is_empty() {
        println!("No duplicates found.");
        return Ok(());
    }
    print_groups(&groups);
    Ok(())
}

async fn cmd_merge_dupes(
    mut config: AppConfig,
    field: &str,
    search: &str,
    overrides: &MergeOverrides,
) -> Result<()> {
    overrides.apply(&mut config.merge)?;
    let collection = open_collection(&config).await?;

    let groups = ops::find_duplicates(&collection, field, search, &config.merge).await?;
    if groups.is_empty() {
        println!("Nothing to do.");
        return Ok(());
    }

    let reporter = CliProgress::new(groups.len());
    let summary = ops::merge_duplicates(&collection, &groups, &config.merge, &reporter).await?;

    println!("Merged {} groups of notes.", summary.groups);
    if summary.removed > 0 {
        println!("{} notes deleted.", summary.removed);
    }
    Ok(())
}

async fn cmd_duplicate(config: &AppConfig, notes: &[NoteId]) -> Result<()> {
    let collection = open_collection(config).await?;
    let summary = ops::duplicate_notes(&collection, notes).await?;

    match summary.created.len() {
        1 => println!("Note duplicated."),
        n => println!("{n} notes duplicated."),
    }
    for id in &summary.created {
        println!("  {id}");
    }
    Ok(())
}

async fn cmd_history(config: &AppConfig, limit: u32) -> Result<()> {
    let collection = open_collection(config).await?;
    for op in collection.recent_ops(limit).await? {
        println!(
            "#{:<5} {}  {:<32} updated={} removed={} added={}",
            op.id,
            op.applied_at.format("%Y-%m-%d %H:%M:%S"),
            op.label,
            op.updated,
            op.removed,
            op.added,
        );
    }
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Output helpers
// ---------------------------------------------------------------------------

fn print_groups(groups: &[DuplicateGroup]) {
    for group in groups {
        let ids: Vec<String> = group.note_ids.iter().map(|id| id.to_string()).collect();
        println!("{:<40} {}", preview(&group.key, 40), ids.join(","));
    }
    println!("{} groups", groups.len());
}

/// First `max` characters of `s` on a single line.
fn preview(s: &str, max: usize) -> String {
    let flat: String = s.chars().map(|c| if c.is_control() { ' ' } else { c }).collect();
    if flat.chars().count() > max {
        let cut: String = flat.chars().take(max.saturating_sub(1)).collect();
        format!("{cut}…")
    } else {
        flat
    }
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// Progress bar over duplicate groups.
struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    fn new(total: usize) -> Self {
        let bar = ProgressBar::new(total as u64);
        let style = ProgressStyle::with_template("{bar:30.cyan/blue} {pos}/{len} groups {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);
        Self { bar }
    }
}

impl ProgressReporter for CliProgress {
    fn group_merged(&self, current: usize, _total: usize) {
        self.bar.set_position(current as u64);
    }

    fn done(&self, _summary: &MergeSummary) {
        self.bar.finish_and_clear();
    }
}
