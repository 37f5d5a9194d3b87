//! Runtime settings for the dev server, HMR bridge, watcher, supervisor and
//! build reports.
//!
//! Priority: `GAFFER_` environment variables > `[settings]` in `gaffer.toml`
//! > defaults. Nested keys use a double underscore, e.g.
//! `GAFFER_DEV_SERVER__PORT=4000`.

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format as _, Serialized, Toml},
    Figment,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub dev_server: DevServerSettings,
    pub hmr: HmrSettings,
    pub watch: WatchSettings,
    pub supervisor: SupervisorSettings,
    pub report: ReportSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DevServerSettings {
    pub host: String,
    pub port: u16,
    /// URL prefix the frontend output is served under.
    pub public_path: String,
}

impl Default for DevServerSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 3000,
            public_path: "/build/".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HmrSettings {
    pub host: String,
    pub port: u16,
    /// Wait between a server start and opening the channel to it.
    pub connect_delay_ms: u64,
}

impl Default for HmrSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 3567,
            connect_delay_ms: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchSettings {
    pub debounce_ms: u64,
    /// Path prefixes (relative to the project root) or `*.ext` patterns.
    pub ignore: Vec<String>,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            debounce_ms: 100,
            ignore: vec![
                "node_modules".to_string(),
                "build".to_string(),
                "static/build".to_string(),
                "*.swp".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorSettings {
    pub interpreter: String,
    pub args: Vec<String>,
    /// Server script, relative to the project root.
    pub script: PathBuf,
    /// Added on top of the inherited environment.
    pub env: IndexMap<String, String>,
    /// Recorded on the supervised process; no watch is installed for it.
    pub watch: Vec<PathBuf>,
    /// Pause between stopping the old process and starting the new one.
    pub restart_delay_ms: u64,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            interpreter: "node".to_string(),
            args: Vec::new(),
            script: PathBuf::from("build/backend.js"),
            env: IndexMap::new(),
            watch: vec![PathBuf::from("bin/")],
            restart_delay_ms: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportSettings {
    pub show_cached_assets: bool,
    pub show_modules: bool,
    pub colors: bool,
    pub show_chunk_reasons: bool,
    /// Glob patterns of module paths collapsed in the module listing.
    pub exclude: Vec<String>,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            show_cached_assets: false,
            show_modules: true,
            colors: true,
            show_chunk_reasons: false,
            exclude: vec![
                "**/node_modules/**".to_string(),
                "**/components/**".to_string(),
            ],
        }
    }
}

impl Settings {
    /// Load settings from the `[settings]` table of `config_file` (if any)
    /// and the environment.
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(Settings::default()));

        if let Some(path) = config_file {
            figment = figment.merge(Figment::from(Toml::file(path)).focus("settings"));
        }

        figment = figment.merge(Env::prefixed("GAFFER_").split("__"));

        Ok(figment.extract()?)
    }
}
