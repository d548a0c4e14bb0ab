mod app;
mod ui;

use std::fs::OpenOptions;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, bail};
use clap::Parser;
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use rag::{Config, Pipeline, Session};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use tracing_subscriber::EnvFilter;

use crate::app::{App, run_app};

/// Ask questions about a PDF document.
///
/// Without arguments an interactive terminal UI starts. With `--file` the
/// document is searched once and the answer is printed.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// PDF document to search in one-shot mode
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Question to answer from --file
    #[arg(short, long, requires = "file")]
    query: Option<String>,

    /// Print the fields worth tracking in --file instead of answering a question
    #[arg(long, requires = "file", conflicts_with = "query")]
    insights: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let one_shot = cli.file.is_some();
    init_tracing(one_shot)?;

    // Credentials are checked before the terminal is touched so failures stay readable.
    let cfg = Config::from_env().context("cannot start without model credentials")?;
    let pipeline = Arc::new(Pipeline::from_config(cfg)?);

    if let Some(file) = cli.file {
        return run_once(pipeline, file, cli.query, cli.insights).await;
    }

    let session = Session::new(pipeline.config().upload_path.clone());
    let mut app = App::new(pipeline, session);

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, &mut app).await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    let abandoned = match app.shutdown() {
        Ok(abandoned) => abandoned,
        Err(err) => {
            tracing::warn!("could not remove staged upload: {}", err);
            app.is_loading()
        }
    };
    res?;
    if abandoned {
        // The runtime would otherwise wait for the blocking request to time out.
        tracing::info!("exiting without waiting for the running request");
        std::process::exit(0);
    }
    Ok(())
}

async fn run_once(
    pipeline: Arc<Pipeline>,
    file: PathBuf,
    query: Option<String>,
    insights: bool,
) -> anyhow::Result<()> {
    if query.is_none() && !insights {
        bail!("--file needs either --query or --insights");
    }
    let answer = tokio::task::spawn_blocking(move || match query {
        Some(question) => pipeline.search_result(&file, &question),
        None => pipeline
            .ingest(&file)
            .and_then(|chunks| pipeline.build_index(chunks))
            .and_then(|index| pipeline.recommend_fields(&index)),
    })
    .await?;

    match answer {
        Ok(answer) if answer.is_empty() => println!("No answer found for your query."),
        Ok(answer) => println!("{}", answer.text.trim_end()),
        Err(err) => bail!(err.user_message()),
    }
    Ok(())
}

fn init_tracing(to_stderr: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "portfolio_navigator=info,rag=info".into());
    if to_stderr {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .init();
    } else {
        // The terminal belongs to the UI, so logs go to a file.
        let path = log_path();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("cannot open log file {}", path.display()))?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .init();
        // Panics on worker threads would otherwise print over the alternate screen.
        std::panic::set_hook(Box::new(|info| tracing::error!("panic: {}", info)));
    }
    Ok(())
}

fn log_path() -> PathBuf {
    std::env::temp_dir().join("portfolio-navigator.log")
}
