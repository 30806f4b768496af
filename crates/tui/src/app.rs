use std::sync::{mpsc, Arc};

use hunter_core::platform::hotkey::HotkeyFlags;
use hunter_core::state::SharedState;
use hunter_core::switch::HotkeySwitch;
use hunter_core::types::{Command, RunState};

use crate::confirm::ConfirmDialog;

const MAX_LOG_LINES: usize = 2000;

pub struct App {
    pub switch: HotkeySwitch,
    pub hotkeys: Arc<HotkeyFlags>,
    pub log_visible: bool,
    pub log_messages: Vec<String>,
    pub log_scroll: usize, // scroll offset from bottom (0 = latest)
    pub log_rx: mpsc::Receiver<String>,
    pub confirm: Option<ConfirmDialog>,
    pub should_quit: bool,
}

impl App {
    pub fn new(switch: HotkeySwitch, hotkeys: Arc<HotkeyFlags>, log_rx: mpsc::Receiver<String>) -> Self {
        Self {
            switch,
            hotkeys,
            log_visible: true,
            log_messages: Vec::new(),
            log_scroll: 0,
            log_rx,
            confirm: None,
            should_quit: false,
        }
    }

    pub fn state(&self) -> &Arc<SharedState> {
        self.switch.state()
    }

    pub fn drain_logs(&mut self) {
        self.log_messages.extend(self.log_rx.try_iter());
        if self.log_messages.len() > MAX_LOG_LINES {
            let excess = self.log_messages.len() - MAX_LOG_LINES;
            self.log_messages.drain(..excess);
        }
    }

    /// Forward global hotkey presses as if they were typed here.
    pub fn poll_hotkeys(&mut self) {
        let hotkeys = Arc::clone(&self.hotkeys);
        self.switch.poll_hotkeys(&hotkeys);
    }

    pub fn scroll_log_up(&mut self, n: usize) {
        self.log_scroll = self.log_scroll.saturating_add(n);
    }

    pub fn scroll_log_down(&mut self, n: usize) {
        self.log_scroll = self.log_scroll.saturating_sub(n);
    }

    pub fn toggle_run(&mut self) {
        self.switch.handle(Command::Toggle);
    }

    pub fn cycle_zone(&mut self) {
        self.switch.handle(Command::CycleZone);
    }

    pub fn test_death(&mut self) {
        self.switch.handle(Command::TestDeath);
    }

    pub fn toggle_log(&mut self) {
        self.log_visible = !self.log_visible;
    }

    /// Quit right away unless a hunt is running, in which case ask first.
    pub fn request_quit(&mut self) {
        if self.state().run_state() == RunState::Running {
            self.confirm = Some(ConfirmDialog::new("Hunt is running. Quit?"));
        } else {
            self.quit();
        }
    }

    pub fn answer_confirm(&mut self, yes: bool) {
        self.confirm = None;
        if yes {
            self.quit();
        }
    }

    pub fn quit(&mut self) {
        self.switch.handle(Command::Quit);
        self.should_quit = true;
    }
}
