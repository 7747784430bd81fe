use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

use image_session::app::write_history_item;
use image_session::codec::{self, LIBRARY_FILE_NAME};
use image_session::pipeline::{compress_bytes, DEFAULT_QUALITY};
use image_session::state::library;
use image_session::state::{LocatorRegistry, SessionEvent, SessionStore};
use image_session::storage::{PersistenceBinding, SqliteStore};
use image_session::{Config, Result, SessionError};

/// Headless companion for the image editor's session files and durable store
#[derive(Parser, Debug)]
#[command(name = "image-session", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decode a saved session file and print a summary
    Inspect {
        #[arg(value_name = "ARCHIVE.json")]
        archive: PathBuf,
    },
    /// Re-encode an image as JPEG the way generation results are stored
    Compress {
        image: PathBuf,
        /// Quality between 0.0 and 1.0 (default from configuration)
        #[arg(short, long)]
        quality: Option<f32>,
        /// Defaults to <input stem>.jpg next to the input
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Saved prompt library
    Library {
        #[command(subcommand)]
        action: LibraryAction,
    },
    /// Persisted generation history
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
}

#[derive(Subcommand, Debug)]
enum LibraryAction {
    /// Write the library as JSON
    Export {
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Merge prompts from an exported file (existing ids are kept)
    Import {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
enum HistoryAction {
    List,
    /// Write one result's image as <prompt slug>-<timestamp>.<ext>
    Export {
        id: String,
        #[arg(short, long, value_name = "DIR", default_value = ".")]
        dir: PathBuf,
    },
    Clear,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    match run(cli.command, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("❌ {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command, config: &Config) -> Result<()> {
    match command {
        Command::Inspect { archive } => inspect(&archive).await,
        Command::Compress { image, quality, output } => {
            compress(&image, quality.unwrap_or(config.jpeg_quality), output).await
        }
        Command::Library { action } => {
            let (mut binding, mut store) = open_durable(config)?;
            match action {
                LibraryAction::Export { output } => {
                    let text = codec::export_library(&store.state().saved_prompts)?;
                    let path = output.unwrap_or_else(|| PathBuf::from(LIBRARY_FILE_NAME));
                    tokio::fs::write(&path, text).await?;
                    println!(
                        "📚 Exported {} prompts to {}",
                        store.state().saved_prompts.len(),
                        path.display()
                    );
                }
                LibraryAction::Import { file } => {
                    let text = tokio::fs::read_to_string(&file).await?;
                    let imported = codec::import_library(&text)?;
                    let before = store.state().saved_prompts.len();
                    let merged = library::merge(&store.state().saved_prompts, imported);
                    let added = merged.len() - before;

                    store.dispatch(SessionEvent::SetSavedPrompts(merged));
                    binding.sync(store.state());
                    println!("📚 Imported {} new prompts ({} total)", added, store.state().saved_prompts.len());
                }
            }
            Ok(())
        }
        Command::History { action } => {
            let (mut binding, mut store) = open_durable(config)?;
            match action {
                HistoryAction::List => {
                    for item in &store.state().history {
                        let when = chrono::DateTime::from_timestamp_millis(item.timestamp)
                            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                            .unwrap_or_else(|| item.timestamp.to_string());
                        println!("{}  {}  {}", when, item.id, item.prompt);
                    }
                    println!("{} items", store.state().history.len());
                }
                HistoryAction::Export { id, dir } => {
                    let item = store
                        .state()
                        .find_history(&id)
                        .ok_or_else(|| SessionError::validation(format!("No history item with id {}", id)))?;
                    let path = write_history_item(store.locators(), item, &dir).await?;
                    println!("🖼️  Wrote {}", path.display());
                }
                HistoryAction::Clear => {
                    let count = store.state().history.len();
                    store.dispatch(SessionEvent::ClearHistory);
                    binding.sync(store.state());
                    println!("🗑️  Cleared {} history items", count);
                }
            }
            Ok(())
        }
    }
}

/// Open the durable store and load its slices into a session
fn open_durable(config: &Config) -> Result<(PersistenceBinding, SessionStore)> {
    let sqlite = SqliteStore::open_default(config)?;
    let mut binding = PersistenceBinding::new(Box::new(sqlite));
    let rehydrated = binding.rehydrate();

    let mut store = SessionStore::new(LocatorRegistry::new());
    store.dispatch(SessionEvent::SetHistory(rehydrated.history));
    store.dispatch(SessionEvent::SetSavedPrompts(rehydrated.saved_prompts));
    Ok((binding, store))
}

async fn inspect(path: &Path) -> Result<()> {
    let text = tokio::fs::read_to_string(path).await?;
    let registry = LocatorRegistry::new();
    let mut store = SessionStore::new(registry.clone());
    store.dispatch(SessionEvent::RestoreSession(codec::decode_session(&text, &registry)?));

    let state = store.state();
    println!("📂 {}", path.display());
    println!("Prompt: {:?} (creativity {})", state.prompt, state.creativity_level);
    for image in &state.uploaded_images {
        let marker = if state.active_image.as_ref() == Some(&image.locator) { "*" } else { " " };
        println!(" {} {}  {}  {} bytes", marker, image.name, image.mime, image.bytes.len());
    }
    if let Some(reference) = &state.reference_image {
        println!("Reference: {}  {}  {} bytes", reference.name, reference.mime, reference.bytes.len());
    }
    println!("History: {} items", state.history.len());
    println!("Saved prompts: {}", state.saved_prompts.len());
    Ok(())
}

async fn compress(input: &Path, quality: f32, output: Option<PathBuf>) -> Result<()> {
    let quality = if quality.is_finite() { quality.clamp(0.0, 1.0) } else { DEFAULT_QUALITY };
    let bytes = tokio::fs::read(input).await?;

    let jpeg = tokio::task::spawn_blocking(move || compress_bytes(&bytes, quality))
        .await
        .map_err(|e| SessionError::Task(e.to_string()))??;

    let output = output.unwrap_or_else(|| input.with_extension("jpg"));
    if output == input {
        return Err(SessionError::validation(format!(
            "Refusing to overwrite the input {}; pass --output",
            input.display()
        )));
    }
    tokio::fs::write(&output, &jpeg).await?;
    println!("📸 Wrote {} ({} bytes)", output.display(), jpeg.len());
    Ok(())
}
