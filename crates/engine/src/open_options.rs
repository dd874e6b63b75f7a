//! Database open options

use std::sync::Arc;
use terrace_core::{Clock, DurabilityLevel};

/// Controls whether the database allows writes or is read-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessMode {
    /// Allow both reads and writes (default).
    #[default]
    ReadWrite,
    /// Read-only mode — all write operations return an error.
    ReadOnly,
}

/// Options for opening a database.
///
/// Any field set here overrides the corresponding value in `terrace.toml`.
///
/// ```ignore
/// use terrace_engine::{AccessMode, Engine, OpenOptions};
///
/// let engine = Engine::open_with("./data", OpenOptions::new().access_mode(AccessMode::ReadOnly))?;
/// ```
#[derive(Clone, Default)]
pub struct OpenOptions {
    /// The access mode for the database.
    pub access_mode: AccessMode,
    /// Override timeline durability; `None` uses the config file value.
    pub durability: Option<DurabilityLevel>,
    /// Inject a clock; `None` uses the system clock. Tests drive time
    /// through this.
    pub clock: Option<Arc<dyn Clock>>,
}

impl OpenOptions {
    /// Default options: read-write, config-file durability, system clock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the access mode.
    pub fn access_mode(mut self, mode: AccessMode) -> Self {
        self.access_mode = mode;
        self
    }

    /// Override the timeline durability level.
    pub fn durability(mut self, level: DurabilityLevel) -> Self {
        self.durability = Some(level);
        self
    }

    /// Inject a clock.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }
}
