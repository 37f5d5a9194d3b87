//! # gaffer-config
//!
//! Configuration model for the gaffer build orchestrator.
//!
//! A project is described by a shared `base` configuration, per-target
//! overrides and optional per-mode profiles. Each target's effective
//! configuration is produced by [`merge`], a pure structural merge over the
//! tagged [`ConfigValue`] tree, and then parsed into an immutable
//! [`BuildTarget`].
//!
//! ```
//! use gaffer_config::{merge, ConfigValue};
//!
//! let base: ConfigValue = toml::from_str(r#"plugins = ["a", "b"]"#).unwrap();
//! let overrides: ConfigValue = toml::from_str(r#"plugins = ["c"]"#).unwrap();
//!
//! let merged = merge(&base, &overrides);
//! assert_eq!(merged.to_canonical_json(), r#"{"plugins":["a","b","c"]}"#);
//! ```

pub mod discovery;
pub mod error;
pub mod merge;
pub mod mode;
pub mod presets;
pub mod project;
pub mod settings;
pub mod target;
pub mod value;

pub use discovery::{ConfigDiscovery, ConfigSource, LoadedConfig, CONFIG_FILE_NAME};
pub use error::{ConfigError, Result};
pub use merge::{merge, merge_values, MergedConfig};
pub use mode::Mode;
pub use project::{ProfileConfig, ProjectConfig, ResolvedProject};
pub use settings::{
    DevServerSettings, HmrSettings, ReportSettings, Settings, SupervisorSettings, WatchSettings,
};
pub use target::{BuildTarget, ModuleRule, Platform, PluginSpec, SourceMapStrategy, TargetKind};
pub use value::{ConfigValue, Scalar};
