//! Built-in project presets.

use std::path::Path;

use crate::error::Result;
use crate::project::ProjectConfig;

/// Source of the built-in presets.
pub const PRESETS_TOML: &str = include_str!("presets.toml");

/// The default frontend/backend/bin layout.
pub fn builtin() -> Result<ProjectConfig> {
    ProjectConfig::from_toml_str(PRESETS_TOML, Path::new("<presets>"))
}
