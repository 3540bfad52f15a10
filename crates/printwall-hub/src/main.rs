mod pipe_server;
mod ws;

use clap::Parser;
use std::{
    fs::OpenOptions,
    io::{self, Write},
    net::SocketAddr,
    path::PathBuf,
    sync::{Arc, Mutex},
};
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt::writer::BoxMakeWriter, EnvFilter};

const DEFAULT_PIPE_ADDR: &str = "127.0.0.1:8091";
const DEFAULT_WS_ADDR: &str = "127.0.0.1:8092";
const FEED_CAPACITY: usize = 4096;
const HUB_LOG_FILE: &str = "printwall-hub.log";

#[derive(Clone, Debug)]
struct Config {
    pipe_addr: String,
    ws_addr: String,
    columns: Vec<String>,
    debug: bool,
    log_dir: String,
}

#[derive(Parser, Debug)]
#[command(name = "printwall-hub")]
struct Args {
    #[arg(long, default_value = "")]
    pipe_addr: String,
    #[arg(long, default_value = "")]
    ws_addr: String,
    /// Column label, repeat once per worker column.
    #[arg(long = "column")]
    columns: Vec<String>,
    #[arg(long, default_value_t = false)]
    debug: bool,
    #[arg(long, default_value = "")]
    log_dir: String,
}

#[tokio::main]
async fn main() {
    let config = load_config();
    init_logging(&config);

    let pipe_addr: SocketAddr = match config.pipe_addr.parse() {
        Ok(value) => value,
        Err(err) => {
            error!(event = "invalid_addr", error = %err, addr = %config.pipe_addr);
            return;
        }
    };
    let ws_addr: SocketAddr = match config.ws_addr.parse() {
        Ok(value) => value,
        Err(err) => {
            error!(event = "invalid_addr", error = %err, addr = %config.ws_addr);
            return;
        }
    };
    if config.columns.is_empty() {
        warn!(event = "no_columns", "viewers will reject every print until columns are configured");
    }

    let (feed, _) = broadcast::channel(FEED_CAPACITY);
    let pipe_listener = match tokio::net::TcpListener::bind(pipe_addr).await {
        Ok(value) => value,
        Err(err) => {
            error!(event = "hub_error", error = %err, addr = %pipe_addr);
            return;
        }
    };
    tokio::spawn(pipe_server::serve_pipe(pipe_listener, feed.clone()));

    let hub = Arc::new(ws::HubState::new(config.columns.clone(), feed));
    let app = ws::router(hub);

    let listener = match tokio::net::TcpListener::bind(ws_addr).await {
        Ok(value) => value,
        Err(err) => {
            error!(event = "hub_error", error = %err, addr = %ws_addr);
            return;
        }
    };

    info!(
        event = "hub_start",
        pipe_addr = %pipe_addr,
        ws_addr = %ws_addr,
        columns = config.columns.len()
    );

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    if let Err(err) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
    {
        error!(event = "hub_error", error = %err);
    }
}

fn load_config() -> Config {
    let args = Args::parse();
    Config {
        pipe_addr: resolve_addr(&args.pipe_addr, "PRINTWALL_PIPE_ADDR", DEFAULT_PIPE_ADDR),
        ws_addr: resolve_addr(&args.ws_addr, "PRINTWALL_WS_ADDR", DEFAULT_WS_ADDR),
        columns: resolve_columns(args.columns),
        debug: args.debug || env_true("PRINTWALL_HUB_DEBUG"),
        log_dir: resolve_log_dir(&args.log_dir),
    }
}

fn init_logging(config: &Config) {
    let level = if config.debug {
        "debug".to_string()
    } else {
        std::env::var("PRINTWALL_LOG_LEVEL").unwrap_or_else(|_| "info".to_string())
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let writer = HubLogWriter::open(&config.log_dir);
    let ansi = !writer.has_file();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(ansi)
        .with_writer(BoxMakeWriter::new(move || writer.clone()))
        .try_init();
}

/// Log lines go to stdout and, with a log dir, also to `printwall-hub.log`.
#[derive(Clone, Default)]
struct HubLogWriter {
    file: Option<Arc<Mutex<std::fs::File>>>,
}

impl HubLogWriter {
    fn open(log_dir: &str) -> Self {
        if log_dir.trim().is_empty() {
            return Self::default();
        }
        let path = PathBuf::from(log_dir).join(HUB_LOG_FILE);
        let opened = std::fs::create_dir_all(log_dir).and_then(|_| {
            OpenOptions::new().create(true).append(true).open(&path)
        });
        match opened {
            Ok(file) => Self {
                file: Some(Arc::new(Mutex::new(file))),
            },
            Err(err) => {
                eprintln!("log_file_error: path={} err={err}", path.display());
                Self::default()
            }
        }
    }

    fn has_file(&self) -> bool {
        self.file.is_some()
    }

    fn with_file(&self, op: impl FnOnce(&mut std::fs::File) -> io::Result<()>) {
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = op(&mut file);
            }
        }
    }
}

impl Write for HubLogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stdout().write_all(buf)?;
        self.with_file(|file| file.write_all(buf));
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.with_file(|file| file.flush());
        io::stdout().flush()
    }
}

fn env_true(key: &str) -> bool {
    match std::env::var(key) {
        Ok(value) => parse_bool_flag(&value),
        Err(_) => false,
    }
}

fn parse_bool_flag(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn resolve_addr(arg: &str, env_key: &str, default: &str) -> String {
    if !arg.trim().is_empty() {
        return arg.trim().to_string();
    }
    if let Ok(value) = std::env::var(env_key) {
        if !value.trim().is_empty() {
            return value.trim().to_string();
        }
    }
    default.to_string()
}

/// Falls back to the comma separated `PRINTWALL_COLUMNS` list.
fn resolve_columns(args: Vec<String>) -> Vec<String> {
    if !args.is_empty() {
        return args;
    }
    std::env::var("PRINTWALL_COLUMNS")
        .map(|value| split_labels(&value))
        .unwrap_or_default()
}

fn split_labels(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|label| !label.is_empty())
        .map(str::to_string)
        .collect()
}

fn resolve_log_dir(arg: &str) -> String {
    if !arg.trim().is_empty() {
        return arg.to_string();
    }
    std::env::var("PRINTWALL_LOG_DIR").unwrap_or_default()
}
