use std::{collections::VecDeque, fmt::Display, sync::Mutex};

use godot::prelude::godot_print;
use log::{Level, LevelFilter, Log, Metadata, Record};
use once_cell::sync::Lazy;

/// How many messages are kept around for [recent_logs].
const LOG_STORE_CAPACITY: usize = 256;

static LOG_STORE: Lazy<Mutex<VecDeque<String>>> =
    Lazy::new(|| Mutex::new(VecDeque::with_capacity(LOG_STORE_CAPACITY)));

fn add_to_log_store(message: String) {
    if let Ok(mut store) = LOG_STORE.lock() {
        if store.len() >= LOG_STORE_CAPACITY {
            store.pop_front();
        }
        store.push_back(message);
    }
}

/// The most recent log messages, oldest first.
pub fn recent_logs() -> Vec<String> {
    LOG_STORE
        .lock()
        .map(|store| store.iter().cloned().collect())
        .unwrap_or_default()
}

/// A named logger. The name is used as the `log` target.
#[derive(Debug, Clone)]
pub struct Logger {
    name: String,
}

impl Logger {
    pub fn create(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn log(&self, level: Level, message: impl Display) {
        let message = message.to_string();

        log::log!(target: self.name.as_str(), level, "{message}");
        add_to_log_store(format!("[{level}] [{}] {message}", self.name));
    }

    pub fn debug(&self, message: impl Display) {
        self.log(Level::Debug, message);
    }

    pub fn info(&self, message: impl Display) {
        self.log(Level::Info, message);
    }

    pub fn warn(&self, message: impl Display) {
        self.log(Level::Warn, message);
    }

    pub fn error(&self, message: impl Display) {
        self.log(Level::Error, message);
    }
}

/// Routes `log` records to the Godot output panel.
struct GodotLogBackend;

static GODOT_LOG_BACKEND: GodotLogBackend = GodotLogBackend;

impl Log for GodotLogBackend {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        godot_print!("[{}] [{}] {}", record.level(), record.target(), record.args());
    }

    fn flush(&self) {}
}

/// Install the Godot backend. Only the first call installs the backend, later calls
/// just adjust the level.
pub fn init_godot_backend(level: LevelFilter) {
    let _ = log::set_logger(&GODOT_LOG_BACKEND);
    log::set_max_level(level);
}
