use std::fs::File;
use std::io::stdout;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use log::{error, info};
use ratatui::{Terminal, backend::CrosstermBackend};
use simplelog::{Config, LevelFilter, WriteLogger};

use bookstream::app::{App, run_app_with_event_source};
use bookstream::event_source::KeyboardEventSource;
use bookstream::panic_handler::initialize_panic_handler;
use bookstream::progress_store::ProgressStore;
use bookstream::service::ReaderService;
use bookstream::settings::{get_engine_settings, get_reader_config, load_settings};
use bookstream::source::{BookSource, HttpBookSource, LocalBookSource};

#[derive(Parser, Debug)]
#[command(name = "bookstream", version, about = "Streaming terminal reader for large plain-text books")]
struct Args {
    /// Path to a .txt file, or the http(s) base URL of a book server
    source: String,

    /// Book id on the server (required for http sources)
    #[arg(long)]
    book_id: Option<String>,

    /// Chapters to preload on each side of a jump target
    #[arg(long)]
    buffer: Option<usize>,

    /// Where local reading progress is kept
    #[arg(long)]
    progress_file: Option<PathBuf>,

    #[arg(long, default_value = "bookstream.log")]
    log_file: PathBuf,
}

fn default_progress_file() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("bookstream").join("progress.json"))
}

fn open_source(args: &Args) -> Result<(Box<dyn BookSource>, String)> {
    if args.source.starts_with("http://") || args.source.starts_with("https://") {
        let book_id = args
            .book_id
            .as_deref()
            .context("--book-id is required when reading from a server")?;
        let source = HttpBookSource::new(&args.source, book_id)?;
        return Ok((Box::new(source), book_id.to_string()));
    }

    let path = Path::new(&args.source);
    let progress_file = args.progress_file.clone().or_else(default_progress_file);
    let store = ProgressStore::load_or_ephemeral(progress_file.as_deref());
    let source = LocalBookSource::open(path, store)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let title = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| args.source.clone());
    Ok((Box::new(source), title))
}

fn main() -> Result<()> {
    let args = Args::parse();

    WriteLogger::init(
        LevelFilter::Debug,
        Config::default(),
        File::create(&args.log_file)?,
    )?;
    initialize_panic_handler();

    info!("Starting bookstream on {}", args.source);
    load_settings();

    let (source, title) = open_source(&args)?;
    let mut engine = get_engine_settings();
    if let Some(buffer) = args.buffer {
        engine.buffer = buffer;
    }
    let service = ReaderService::spawn(source, get_reader_config(), &engine);
    let mut app = App::new(service, title);

    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut event_source = KeyboardEventSource;
    let res = run_app_with_event_source(&mut terminal, &mut app, &mut event_source);

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        error!("Application error: {err:?}");
        println!("{err:?}");
    }

    info!("Shutting down bookstream");
    Ok(())
}
