use std::io;
use std::path::PathBuf;
use std::sync::mpsc;

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::{
    execute,
    event::{EnableMouseCapture, DisableMouseCapture},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use tracing::{info, warn};

use hunter_core::config::{Config, DeathResponse, ZonePreset};
use hunter_core::control::{Collaborators, ControlLoop};
use hunter_core::detect::{Detector, PipeDetector, StubDetector};
use hunter_core::logger;
use hunter_core::platform::{create_platform, hotkey};
use hunter_core::probes::{PixelProbes, ProbeRegions};
use hunter_core::state::SharedState;
use hunter_core::switch::HotkeySwitch;
use hunter_core::worker::RepetitiveInputWorker;

#[derive(Parser, Debug)]
#[command(name = "hunter", version, about = "Detect, engage and explore on a fixed screen region")]
struct Cli {
    /// Use the stub platform and random detector (no screen or input access)
    #[arg(long)]
    stub: bool,

    /// Config file; missing means defaults
    #[arg(long, default_value = "hunter.json")]
    config: PathBuf,

    /// Zone preset: sword, spear, bow or custom
    #[arg(long)]
    zone: Option<ZonePreset>,

    /// Custom zone radius in pixels, 0 disables hunting
    #[arg(long)]
    radius: Option<u32>,

    /// Control loop rate
    #[arg(long)]
    fps: Option<f64>,

    /// Death response: respawn_town, wait_help or manual
    #[arg(long)]
    death: Option<DeathResponse>,

    /// External detector process speaking the JSON line protocol
    #[arg(long)]
    detector_cmd: Option<String>,
}

impl Cli {
    fn apply(&self, config: &mut Config) -> Result<()> {
        if let Some(zone) = self.zone {
            config.zone.preset = zone;
        }
        if let Some(radius) = self.radius {
            config.set_custom_radius(radius)?;
        }
        if let Some(fps) = self.fps {
            config.tick.target_fps = fps;
        }
        if let Some(death) = self.death {
            config.death.response = death;
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    logger::init(&cwd.join("logs"))?;

    let mut config = Config::load(&cli.config)?;
    cli.apply(&mut config)?;
    config.validate()?;

    let platform = create_platform(cli.stub);
    info!("platform {}, zone {} ({:.0}px), death response {}",
        platform.name(), config.zone.preset, config.zone.radius(), config.death.response);

    let detector: Box<dyn Detector> = match &cli.detector_cmd {
        Some(cmd) => Box::new(PipeDetector::spawn(cmd).context("starting detector")?),
        None => {
            if !cli.stub {
                warn!("no --detector-cmd given, using random detections");
            }
            Box::new(StubDetector::new(rand::random()))
        }
    };

    // Shared state
    let (state, writers) = SharedState::new();
    let run = writers.run.clone();

    // Channels
    let (log_tx, log_rx) = mpsc::channel::<String>();
    let (cmd_tx, cmd_rx) = mpsc::channel();

    // Wire logger to TUI
    logger::set_tui_sender(log_tx);
    logger::register_prefix("tracker", logger::COLOR_BLUE);
    logger::register_prefix("death", logger::COLOR_BLUE);
    logger::register_prefix("worker", logger::COLOR_GRAY);
    info!("hunter started");

    let collaborators = Collaborators {
        frames: platform.frame_source(),
        detector,
        probes: Box::new(PixelProbes::new(platform.frame_source(), ProbeRegions::around(config.center()))),
        actions: platform.action_sink(),
    };
    let control = ControlLoop::new(&config, collaborators, writers, cmd_rx);
    let worker = RepetitiveInputWorker::new(&config.keys, state.clone(), platform.action_sink());
    let switch = HotkeySwitch::new(run, cmd_tx, control, worker);

    // Start global hotkey listener
    let hotkeys = hotkey::HotkeyFlags::new();
    hotkey::start_hotkey_listener(hotkeys.clone());

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = hunter_tui::App::new(switch, hotkeys, log_rx);

    // Run TUI event loop on main thread
    let result = hunter_tui::event::run(&mut terminal, &mut app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;

    // Stops and joins the hunt and key threads.
    drop(app);

    if let Some(preset) = state.telemetry().zone_preset {
        if preset != config.zone.preset || cli.radius.is_some() {
            config.zone.preset = preset;
            config.save(&cli.config);
        }
    }

    result
}
