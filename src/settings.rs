//! Startup settings
//!
//! Read from a plain-text file, one `key = value` per line. `#` starts a
//! comment. Unknown keys and unparsable values are logged and skipped;
//! numbers are clamped into range. A missing file means defaults.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::consts::*;
use crate::error::{Result, SimError};
use crate::schedule::runner::{DEFAULT_MAX_PHYSICS_RUNS, MAX_PHYSICS_RUNS};

/// Default settings file name, looked up in the working directory
pub const SETTINGS_FILE: &str = "gravity-sandbox.conf";

pub const DEFAULT_FRAMES: u64 = 600;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    // === Scheduling ===
    /// Workers per physics pass
    pub concurrency: usize,
    /// Physics chain runs per frame while the renderer is busy
    pub max_physics_runs: usize,

    // === Simulation ===
    /// Seed of the body placement RNG
    pub seed: u64,
    /// Initial population
    pub bodies: usize,
    /// Initial physics fidelity (0.0 - 1.0)
    pub fidelity: f64,

    // === Headless runner ===
    /// Frames to run before closing
    pub frames: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_physics_runs: DEFAULT_MAX_PHYSICS_RUNS,

            seed: clock_seed(),
            bodies: DEFAULT_BODIES,
            fidelity: DEFAULT_PHYSICS_FIDELITY,

            frames: DEFAULT_FRAMES,
        }
    }
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(MIN_CONCURRENCY)
        .clamp(MIN_CONCURRENCY, MAX_CONCURRENCY)
}

fn clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

impl Settings {
    /// Load from `path`; a missing file yields defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(text) => {
                log::info!("Loaded settings from {}", path.display());
                Ok(Self::parse(&text))
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                log::info!("{} not found, using default settings", path.display());
                Ok(Self::default())
            }
            Err(source) => Err(SimError::SettingsIo {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Defaults overridden by every valid line of `text`
    pub fn parse(text: &str) -> Self {
        let mut settings = Self::default();
        for (number, raw) in text.lines().enumerate() {
            let line = raw.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                log::warn!("settings line {}: expected `key = value`, got {:?}", number + 1, raw);
                continue;
            };
            if let Err(reason) = settings.apply(key.trim(), value.trim()) {
                log::warn!("settings line {}: {}", number + 1, reason);
            }
        }
        settings
    }

    /// Set one key; values are clamped into range
    pub fn apply(&mut self, key: &str, value: &str) -> std::result::Result<(), String> {
        match key {
            "concurrency" => {
                self.concurrency = parse_int(key, value)?.clamp(MIN_CONCURRENCY as i64, MAX_CONCURRENCY as i64) as usize;
            }
            "max_physics_runs" => {
                self.max_physics_runs = parse_int(key, value)?.clamp(1, MAX_PHYSICS_RUNS as i64) as usize;
            }
            "seed" => {
                self.seed = value
                    .parse()
                    .map_err(|_| format!("{key}: {value:?} is not an unsigned integer"))?;
            }
            "bodies" => {
                self.bodies = parse_int(key, value)?.clamp(MIN_BODIES as i64, MAX_BODIES as i64) as usize;
            }
            "fidelity" => {
                let fidelity: f64 = value
                    .parse()
                    .map_err(|_| format!("{key}: {value:?} is not a number"))?;
                if fidelity.is_nan() {
                    return Err(format!("{key}: NaN"));
                }
                self.fidelity = fidelity.clamp(MIN_PHYSICS_FIDELITY, MAX_PHYSICS_FIDELITY);
            }
            "frames" => {
                self.frames = parse_int(key, value)?.max(1) as u64;
            }
            _ => return Err(format!("unknown key {key:?}")),
        }
        Ok(())
    }

    /// Pretty JSON dump for diagnostics
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn parse_int(key: &str, value: &str) -> std::result::Result<i64, String> {
    value
        .parse::<i64>()
        .map_err(|_| format!("{key}: {value:?} is not an integer"))
}
