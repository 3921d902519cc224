use std::io::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chook_core::{
    APP_URL, ChookConfig, EnvOverrides, Phase, RoastRecord, RoastSessionController, RoastStore,
    SaveState, Session, SessionDeps, SessionEvent, SessionHandle, SupabaseStore, grammar_for,
    load_file_config, share_intent_url,
};
use clap::{Parser, Subcommand};
use tokio::io::AsyncReadExt as _;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info};

/// Shown when the gallery fails without a message of its own.
const GALLERY_FAILURE: &str = "Failed to fetch roasts. The ancestors are not happy.";

#[derive(Debug, Parser)]
#[command(name = "chook", version, about = "I go chook my eye for your code.")]
pub struct Cli {
    /// Path to the YAML configuration file
    #[arg(long, global = true, default_value = "chook.yaml")]
    pub config: PathBuf,

    /// Directory that holds the `logs/` tree
    #[arg(long, global = true, default_value = ".chook")]
    pub log_root: PathBuf,

    /// Generation model to use instead of the configured one
    #[arg(short, long, global = true)]
    pub model: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Stream a roast of a file (or stdin)
    Roast {
        /// Source file to roast; reads stdin when omitted
        file: Option<PathBuf>,

        /// What the code is supposed to do
        #[arg(short = 'x', long)]
        context: Option<String>,

        /// Store the finished roast in the Hall of Yàb
        #[arg(short, long)]
        save: bool,

        /// Print a share link for the finished roast
        #[arg(long)]
        share: bool,

        /// Viewport width in px, for front ends that switch panels
        #[arg(long)]
        viewport_width: Option<u32>,
    },

    /// List the most recent roasts, newest first
    Hall {
        /// Number of roasts to show
        #[arg(short, long)]
        limit: Option<usize>,
    },
}

impl Cli {
    pub fn log_root(&self) -> &Path {
        &self.log_root
    }

    /// Name of the per-command log directory, for commands that log to a file.
    pub fn file_log_command(&self) -> Option<&'static str> {
        match self.command {
            Commands::Roast { .. } => Some("roast"),
            Commands::Hall { .. } => None,
        }
    }

    pub async fn run(self) -> Result<()> {
        let config = self.load_config()?;
        match self.command {
            Commands::Roast {
                file,
                context,
                save,
                share,
                viewport_width,
            } => {
                let source = read_source(file.as_deref()).await?;
                let options = RoastOptions {
                    context,
                    save,
                    share,
                    viewport_width,
                };
                roast(config, source, options).await
            }
            Commands::Hall { limit } => hall(&config, limit).await,
        }
    }

    /// CLI flags override the environment, which overrides the file.
    fn load_config(&self) -> Result<ChookConfig> {
        let file = load_file_config(&self.config)
            .with_context(|| format!("failed to load config: {}", self.config.display()))?;
        let mut config = file.resolve(EnvOverrides::from_env());
        if let Some(model) = &self.model {
            config = config.with_model(model.clone());
        }
        debug!(?config, "configuration resolved");
        Ok(config)
    }
}

async fn read_source(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {}", path.display())),
        None => {
            let mut source = String::new();
            tokio::io::stdin()
                .read_to_string(&mut source)
                .await
                .context("failed to read stdin")?;
            Ok(source)
        }
    }
}

#[derive(Debug)]
struct RoastOptions {
    context: Option<String>,
    save: bool,
    share: bool,
    viewport_width: Option<u32>,
}

async fn roast(config: ChookConfig, source: String, options: RoastOptions) -> Result<()> {
    let deps = SessionDeps::from_config(&config)?;
    let handle = RoastSessionController::spawn(config, deps);

    let mut events = handle.subscribe();
    let has_source = !source.trim().is_empty();
    handle.edit_source(source)?;
    if let Some(context) = options.context.as_deref() {
        handle.edit_context(context)?;
    }
    // A blank editor is never classified; the submission below rejects it.
    if has_source {
        tokio::select! {
            settled = wait_for_classification(&mut events) => {
                settled?;
            }
            () = handle.closed() => bail!("session controller stopped unexpectedly"),
        }
    }
    drop(events);
    eprintln!("Language: {}", handle.snapshot().detected_language());

    let result = stream_roast(&handle, options.viewport_width).await;
    let outcome = match result {
        Ok(session) => finish_roast(&handle, &session, &options).await,
        Err(e) => Err(e),
    };

    handle.dispose();
    handle.closed().await;
    outcome
}

/// Wait for the debounced classification pass to finish.
async fn wait_for_classification(
    events: &mut broadcast::Receiver<SessionEvent>,
) -> Result<String> {
    loop {
        match events.recv().await {
            Ok(SessionEvent::ClassificationSettled { language }) => return Ok(language),
            Ok(_) | Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => bail!("session controller stopped unexpectedly"),
        }
    }
}

/// Submit the roast and echo the buffer as it grows. Returns the final snapshot.
async fn stream_roast(handle: &SessionHandle, viewport_width: Option<u32>) -> Result<Session> {
    let mut state = handle.watch();
    let mut events = handle.subscribe();
    handle.submit_roast(viewport_width)?;

    let mut stdout = std::io::stdout();
    let mut printed = 0;
    loop {
        state
            .changed()
            .await
            .context("session controller stopped unexpectedly")?;
        let session = state.borrow_and_update().clone();

        while let Ok(event) = events.try_recv() {
            if let SessionEvent::NarrowViewportRoastStarted { token } = event {
                info!(%token, "narrow viewport, output panel takes focus");
            }
        }

        // No request was started: the submission was rejected.
        if session.active_request().value() == 0 {
            if session.error_message().is_some() {
                return Ok(session);
            }
            continue;
        }

        let buffer = session.roast_buffer();
        if buffer.len() > printed {
            stdout.write_all(&buffer.as_bytes()[printed..])?;
            stdout.flush()?;
            printed = buffer.len();
        }
        if !session.phase().is_in_flight() {
            if printed > 0 {
                writeln!(stdout)?;
            }
            return Ok(session);
        }
    }
}

async fn finish_roast(
    handle: &SessionHandle,
    session: &Session,
    options: &RoastOptions,
) -> Result<()> {
    if session.phase() != Phase::Complete {
        let message = session
            .error_message()
            .unwrap_or("roast did not finish")
            .to_owned();
        bail!(message);
    }

    if options.save {
        if session.can_save() {
            handle.save()?;
            let saved = handle
                .wait_for(|s| !s.is_saving() && s.save_state() != SaveState::Unsaved)
                .await?;
            match saved.save_state() {
                SaveState::Saved => eprintln!("Saved to the Hall of Yàb."),
                _ => eprintln!(
                    "Save failed: {}",
                    saved.save_error().unwrap_or("Failed to save roast.")
                ),
            }
        } else {
            eprintln!("Nothing to save: Chook had no words.");
        }
    }

    if options.share && session.can_share() {
        println!("{}", share_intent_url(APP_URL)?);
    }
    Ok(())
}

async fn hall(config: &ChookConfig, limit: Option<usize>) -> Result<()> {
    let store = SupabaseStore::from_config(config)?;
    let limit = limit.unwrap_or_else(|| config.recent_limit());

    let records = match store.list_recent(limit).await {
        Ok(records) => records,
        Err(e) => {
            let message = e.to_string();
            if message.trim().is_empty() {
                bail!(GALLERY_FAILURE);
            }
            bail!(message);
        }
    };

    println!("Hall of Yàb\nThe most brutal roasts, immortalized.\n");
    if records.is_empty() {
        println!("No roasts yet. Go and write some bad code.");
    }
    for record in &records {
        println!("{}", format_record(record));
    }
    Ok(())
}

/// Language shown for a gallery entry: the grammar name, else the raw tag.
fn gallery_language(record: &RoastRecord) -> String {
    let tag = record
        .detected_language
        .as_deref()
        .map(str::to_lowercase)
        .unwrap_or_else(|| "text".to_owned());
    grammar_for(&tag).map(str::to_owned).unwrap_or(tag)
}

fn format_record(record: &RoastRecord) -> String {
    let context = record
        .context
        .as_deref()
        .filter(|c| !c.trim().is_empty())
        .map(|c| format!(" - {}", c.trim()))
        .unwrap_or_default();
    format!(
        "#{} · {} · {}{context}\n\nThe Code Wey Vex Chook:\n{}\n\nThe Yàb:\n{}\n",
        record.id,
        record.created_at.format("%Y-%m-%d %H:%M UTC"),
        gallery_language(record),
        record.code_snippet.trim_end(),
        record.roast_markdown.trim_end(),
    )
}
