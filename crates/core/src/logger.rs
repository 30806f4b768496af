use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{mpsc, Mutex, OnceLock};

use anyhow::{Context, Result};
use chrono::Local;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context as LayerContext, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

struct Sinks {
    tui_tx: Option<mpsc::Sender<String>>,
    prefixes: HashMap<String, u8>, // prefix -> color index
}

static SINKS: OnceLock<Mutex<Sinks>> = OnceLock::new();

fn sinks() -> &'static Mutex<Sinks> {
    SINKS.get_or_init(|| Mutex::new(Sinks { tui_tx: None, prefixes: HashMap::new() }))
}

// Color indices for TUI rendering (mapped in ui.rs)
pub const COLOR_GRAY: u8 = 1;
pub const COLOR_BLUE: u8 = 2;

/// Install the global subscriber. Clears `log_dir/app.log`.
/// `RUST_LOG` overrides the default `info` filter.
pub fn init(log_dir: &Path) -> Result<()> {
    fs::create_dir_all(log_dir).with_context(|| format!("creating {}", log_dir.display()))?;
    let log_path = log_dir.join("app.log");
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&log_path)
        .with_context(|| format!("opening {}", log_path.display()))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(SinkLayer { file: Some(Mutex::new(file)) })
        .try_init()
        .context("installing tracing subscriber")?;
    Ok(())
}

/// Wire the TUI log channel.
pub fn set_tui_sender(tx: mpsc::Sender<String>) {
    if let Ok(mut s) = sinks().lock() {
        s.tui_tx = Some(tx);
    }
}

/// Register a color for a log prefix. The prefix of an event is the last
/// segment of its target, e.g. `hunter_core::tracker` logs as `tracker`.
pub fn register_prefix(prefix: &str, color: u8) {
    if let Ok(mut s) = sinks().lock() {
        s.prefixes.insert(prefix.to_string(), color);
    }
}

fn prefix_of(target: &str) -> &str {
    match target.rsplit_once("::") {
        Some((_, last)) => last,
        None => "",
    }
}

/// Writes plain lines to the log file and structured lines to the TUI.
struct SinkLayer {
    file: Option<Mutex<File>>,
}

impl<S: Subscriber> Layer<S> for SinkLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: LayerContext<'_, S>) {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        let meta = event.metadata();
        self.write_log(meta.level().as_str(), prefix_of(meta.target()), &visitor.finish());
    }
}

impl SinkLayer {
    /// TUI format uses \x1f as field separator:
    /// level\x1fprefix\x1fcolor\x1ftimestamp\x1fmessage
    fn write_log(&self, level: &str, prefix: &str, msg: &str) {
        let ts = Local::now().format("%H:%M:%S").to_string();

        if let Some(file) = &self.file {
            let file_line = if prefix.is_empty() {
                format!("[{}] [{}] {}", ts, level, msg)
            } else {
                format!("[{}] [{}] [{}] {}", ts, level, prefix, msg)
            };
            if let Ok(mut f) = file.lock() {
                writeln!(f, "{}", file_line).ok();
            }
        }

        if let Ok(s) = sinks().lock() {
            if let Some(tx) = &s.tui_tx {
                let color = s.prefixes.get(prefix).copied().unwrap_or(0);
                tx.send(format!("{}\x1f{}\x1f{}\x1f{}\x1f{}", level, prefix, color, ts, msg)).ok();
            }
        }
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl MessageVisitor {
    fn finish(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else {
            format!("{}{}", self.message, self.fields)
        }
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            write!(self.fields, " {}={}", field.name(), value).ok();
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            write!(self.message, "{:?}", value).ok();
        } else {
            write!(self.fields, " {}={:?}", field.name(), value).ok();
        }
    }
}
