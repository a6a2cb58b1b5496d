use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, anyhow};
use clap::{Parser, Subcommand};
use filemon::config::RouterConfig;
use filemon::{
    Event, EventKind, Logger, RouterMode, Settings, SignalRouter, TracingLogger, Tracker,
    WorkError, Worker, log_event, logging, warn_event,
};
use tokio::sync::broadcast::error::RecvError;

#[derive(Parser)]
#[command(name = "filemon", version)]
#[command(about = "Watch directories and dispatch file events to workers")]
struct Cli {
    /// Settings file (defaults to the nearest .filemon/settings.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch directories and report file activity
    Watch {
        /// Directories to watch (defaults to tracker.watch_paths)
        dirs: Vec<PathBuf>,

        /// Track each file from creation until removal
        #[arg(long)]
        accumulate: bool,

        /// Keep tracking a file after its removal was reported
        #[arg(long)]
        keep: bool,
    },

    /// Show the effective settings
    Config,
}

/// A file leaves the directory by removal or by being renamed away.
const GONE: EventKind = EventKind::REMOVE.union(EventKind::RENAME);

/// Reports events. When accumulating, follows one file from CREATE until it
/// is removed or renamed away.
struct LifecycleWorker {
    mode: RouterMode,
    path: Option<PathBuf>,
    created: Option<Instant>,
    last: EventKind,
}

impl LifecycleWorker {
    fn new(mode: RouterMode) -> Self {
        Self {
            mode,
            path: None,
            created: None,
            last: EventKind::empty(),
        }
    }
}

impl Worker for LifecycleWorker {
    fn open(&mut self, event: &Event) -> bool {
        self.path = event.path().map(|p| p.to_path_buf());
        self.last = event.kind();
        if event.has_kind(EventKind::CREATE) && self.created.is_none() {
            self.created = Some(Instant::now());
        }
        event.has_kind(EventKind::CREATE)
    }

    fn work(&mut self) -> Result<(), WorkError> {
        let path = self
            .path
            .as_ref()
            .ok_or_else(|| WorkError::failed("worker opened without a path"))?;

        match (self.mode, self.created) {
            (RouterMode::Immediate, _) => {
                log_event!("watch", self.last, "{}", path.display());
                Ok(())
            }
            (RouterMode::Accumulating, Some(created)) if self.last.intersects(GONE) => {
                log_event!(
                    "watch",
                    "lifetime",
                    "{} existed for {}ms",
                    path.display(),
                    created.elapsed().as_millis()
                );
                Ok(())
            }
            (RouterMode::Accumulating, _) => Err(WorkError::NotReady),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    }
    .map_err(|e| anyhow!("failed to load settings: {e}"))?;

    logging::init_with_config(&settings.logging);

    match cli.command {
        Commands::Config => {
            println!("{}", settings.to_toml()?);
        }
        Commands::Watch {
            dirs,
            accumulate,
            keep,
        } => {
            let mut router_config = settings.router.clone();
            if accumulate {
                router_config.mode = RouterMode::Accumulating;
            }
            if keep {
                router_config.free_on_completion = false;
            }
            let dirs = if dirs.is_empty() {
                settings.tracker.watch_paths.clone()
            } else {
                dirs
            };
            watch(&settings, &router_config, dirs).await?;
        }
    }

    Ok(())
}

async fn watch(
    settings: &Settings,
    router_config: &RouterConfig,
    dirs: Vec<PathBuf>,
) -> anyhow::Result<()> {
    anyhow::ensure!(!dirs.is_empty(), "no directories to watch");

    let logger: Arc<dyn Logger> = Arc::new(TracingLogger::new("watch"));
    let tracker = Arc::new(
        Tracker::builder()
            .config(&settings.tracker)
            .logger(Arc::clone(&logger))
            .build()?,
    );

    for dir in dirs {
        let dir = dir
            .canonicalize()
            .with_context(|| format!("cannot resolve {}", dir.display()))?;
        tracker.add_path(&dir)?;

        let mode = router_config.mode;
        let router = SignalRouter::builder()
            .watching(&dir)
            .config(router_config)
            .logger(Arc::clone(&logger))
            .spawner(move || LifecycleWorker::new(mode))
            .build()?;
        let tag = tracker.register(Arc::new(router))?;
        log_event!("watch", "registered", "{} as {tag}", dir.display());
    }

    let mut events = tracker.subscribe();
    let runner = Arc::clone(&tracker);
    let dispatch = std::thread::spawn(move || runner.run());

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            received = events.recv() => match received {
                Ok(event) => println!("{event}"),
                Err(RecvError::Lagged(n)) => warn_event!("watch", "lagged", "skipped {n} events"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    tracker.stop();
    dispatch
        .join()
        .map_err(|_| anyhow!("dispatch thread panicked"))??;
    Ok(())
}
