mod app;
mod theme;
mod transport;
mod ui;

use anyhow::{anyhow, Context, Result};
use app::App;
use clap::Parser;
use crossterm::{
    event::{Event, EventStream},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures_util::StreamExt;
use printwall_core::{GroupClosePolicy, ViewConfig, DEFAULT_COLUMN_CAPACITY, DEFAULT_GROUP_CAPACITY};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::{
    fs::OpenOptions,
    io::{self, Write},
    path::PathBuf,
    sync::Arc,
};
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::{fmt::writer::BoxMakeWriter, EnvFilter};
use url::Url;

const DEFAULT_URL: &str = "ws://127.0.0.1:8092/ws";
const STREAM_QUEUE_CAPACITY: usize = 1024;

#[derive(Clone, Debug)]
struct Config {
    url: Url,
    view: ViewConfig,
    log_dir: String,
}

#[derive(Parser, Debug)]
#[command(name = "printwall-viewer")]
struct Args {
    #[arg(long, default_value = "")]
    url: String,
    /// Live groups kept per column.
    #[arg(long)]
    max_groups: Option<usize>,
    #[arg(long)]
    column_capacity: Option<usize>,
    #[arg(long)]
    group_capacity: Option<usize>,
    /// What `close_group` does: keep (mark finished) or evict.
    #[arg(long, default_value = "")]
    close_policy: String,
    #[arg(long, default_value = "")]
    log_dir: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config(Args::parse())?;
    init_logging(&config);
    info!(
        "viewer_start: url={} max_groups={} close_policy={}",
        config.url, config.view.max_groups, config.view.close_policy
    );

    let (stream_tx, mut stream_rx) = mpsc::channel(STREAM_QUEUE_CAPACITY);
    let (outbound_tx, outbound_rx) = mpsc::channel(16);
    let mut app = App::new(config.url.clone(), config.view.clone(), outbound_tx);
    tokio::spawn(transport::stream_loop(config.url.clone(), stream_tx, outbound_rx));

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    let mut events = EventStream::new();

    loop {
        terminal.draw(|frame| ui::render(frame, &app))?;
        tokio::select! {
            Some(event) = stream_rx.recv() => {
                app.apply_stream_event(event);
                // Drain what already arrived so bursts cost one redraw.
                while let Ok(event) = stream_rx.try_recv() {
                    app.apply_stream_event(event);
                }
            }
            maybe_event = events.next() => {
                if let Some(Ok(Event::Key(key))) = maybe_event {
                    if app.handle_key(key) {
                        break;
                    }
                }
            }
        }
    }

    app.connection.close();
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

fn load_config(args: Args) -> Result<Config> {
    let url = resolve_url(&args.url)?;
    let max_groups = match args.max_groups {
        Some(value) => value,
        None => resolve_usize_env("PRINTWALL_MAX_GROUPS")?
            .ok_or_else(|| anyhow!("--max-groups or PRINTWALL_MAX_GROUPS is required"))?,
    };
    let column_capacity = match args.column_capacity {
        Some(value) => value,
        None => resolve_usize_env("PRINTWALL_COLUMN_CAPACITY")?.unwrap_or(DEFAULT_COLUMN_CAPACITY),
    };
    let group_capacity = match args.group_capacity {
        Some(value) => value,
        None => resolve_usize_env("PRINTWALL_GROUP_CAPACITY")?.unwrap_or(DEFAULT_GROUP_CAPACITY),
    };
    let close_policy = resolve_close_policy(&args.close_policy)?;
    let view = ViewConfig::new(max_groups)?
        .with_capacities(column_capacity, group_capacity)?
        .with_close_policy(close_policy);
    Ok(Config {
        url,
        view,
        log_dir: resolve_log_dir(&args.log_dir),
    })
}

/// Full-screen UI: logs go to a file under the log dir, or stdout when
/// `PRINTWALL_LOG_STDOUT` is set, and are discarded otherwise.
fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if let Some(file) = open_log_file(&config.log_dir) {
        let file = Arc::new(file);
        let writer = BoxMakeWriter::new(move || LogFile(file.clone()));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(writer)
            .try_init();
        return;
    }
    let stdout_enabled = std::env::var("PRINTWALL_LOG_STDOUT")
        .map(|value| parse_bool_flag(&value))
        .unwrap_or(false);
    if stdout_enabled {
        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
    } else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::sink)
            .try_init();
    }
}

struct LogFile(Arc<std::fs::File>);

impl Write for LogFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        (&*self.0).write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        (&*self.0).flush()
    }
}

fn open_log_file(log_dir: &str) -> Option<std::fs::File> {
    if log_dir.trim().is_empty() {
        return None;
    }
    let dir = PathBuf::from(log_dir);
    std::fs::create_dir_all(&dir).ok()?;
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join("printwall-viewer.log"))
        .ok()
}

fn parse_bool_flag(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn resolve_url(arg: &str) -> Result<Url> {
    let raw = if !arg.trim().is_empty() {
        arg.trim().to_string()
    } else {
        match std::env::var("PRINTWALL_URL") {
            Ok(value) if !value.trim().is_empty() => value.trim().to_string(),
            _ => DEFAULT_URL.to_string(),
        }
    };
    let url = Url::parse(&raw).with_context(|| format!("invalid websocket url {raw}"))?;
    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => Err(anyhow!("unsupported url scheme {other}, expected ws or wss")),
    }
}

fn resolve_usize_env(key: &str) -> Result<Option<usize>> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse::<usize>()
            .map(Some)
            .with_context(|| format!("{key} must be a non-negative integer")),
        _ => Ok(None),
    }
}

fn resolve_close_policy(arg: &str) -> Result<GroupClosePolicy> {
    let raw = if !arg.trim().is_empty() {
        arg.to_string()
    } else {
        std::env::var("PRINTWALL_CLOSE_POLICY").unwrap_or_default()
    };
    if raw.trim().is_empty() {
        return Ok(GroupClosePolicy::default());
    }
    Ok(raw.parse::<GroupClosePolicy>()?)
}

fn resolve_log_dir(arg: &str) -> String {
    if !arg.trim().is_empty() {
        return arg.to_string();
    }
    std::env::var("PRINTWALL_LOG_DIR").unwrap_or_default()
}
