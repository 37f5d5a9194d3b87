//! File-based config discovery for CLI use
//!
//! Finds `gaffer.toml` in the project root and layers it on the built-in
//! presets.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, Result};
use crate::presets;
use crate::project::ProjectConfig;
use crate::settings::Settings;

pub const CONFIG_FILE_NAME: &str = "gaffer.toml";

/// Where the project configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    Presets,
}

/// A loaded project configuration together with its settings.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub project: ProjectConfig,
    pub settings: Settings,
    pub source: ConfigSource,
}

/// File-based configuration discovery
///
/// # Example
///
/// ```no_run
/// use gaffer_config::{ConfigDiscovery, Mode};
/// use std::path::Path;
///
/// let loaded = ConfigDiscovery::new(".").load().unwrap();
/// let project = loaded.project.resolve(Mode::Development, Path::new(".")).unwrap();
/// ```
pub struct ConfigDiscovery {
    root: PathBuf,
}

impl ConfigDiscovery {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `gaffer.toml` in the root directory, if present.
    pub fn find(&self) -> Option<PathBuf> {
        let path = self.root.join(CONFIG_FILE_NAME);
        path.is_file().then_some(path)
    }

    /// Load the discovered config file, or the presets when there is none.
    pub fn load(&self) -> Result<LoadedConfig> {
        match self.find() {
            Some(path) => self.load_from(&path),
            None => {
                tracing::debug!(root = %self.root.display(), "no gaffer.toml, using presets");
                Ok(LoadedConfig {
                    project: presets::builtin()?,
                    settings: Settings::load(None)?,
                    source: ConfigSource::Presets,
                })
            }
        }
    }

    /// Load an explicit config file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::FileNotFound` if `path` does not exist.
    pub fn load_from(&self, path: &Path) -> Result<LoadedConfig> {
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };
        if !path.is_file() {
            return Err(ConfigError::FileNotFound(path));
        }

        let content = fs::read_to_string(&path)?;
        let user = ProjectConfig::from_toml_str(&content, &path)?;
        let project = if user.presets {
            presets::builtin()?.layered(&user)
        } else {
            user
        };

        tracing::debug!(path = %path.display(), "loaded config file");
        Ok(LoadedConfig {
            project,
            settings: Settings::load(Some(&path))?,
            source: ConfigSource::File(path),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::Mode;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn find_returns_none_when_no_config() {
        let dir = TempDir::new().unwrap();
        assert!(ConfigDiscovery::new(dir.path()).find().is_none());
    }

    #[test]
    #[serial]
    fn load_falls_back_to_presets() {
        let dir = TempDir::new().unwrap();
        let loaded = ConfigDiscovery::new(dir.path()).load().unwrap();
        assert_eq!(loaded.source, ConfigSource::Presets);
        assert!(loaded.project.targets.contains_key("backend"));
    }

    #[test]
    #[serial]
    fn config_file_layers_on_presets() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            r#"
[targets.frontend]
externals = ["react"]

[targets.frontend.output]
filename = "app.js"
"#,
        )
        .unwrap();

        let loaded = ConfigDiscovery::new(dir.path()).load().unwrap();
        assert!(matches!(loaded.source, ConfigSource::File(_)));

        let project = loaded.project.resolve(Mode::Development, dir.path()).unwrap();
        let frontend = project.single("frontend").unwrap();
        assert_eq!(frontend.externals, vec!["react"]);
        assert_eq!(frontend.output_file(), dir.path().join("static/build/app.js"));
    }

    #[test]
    #[serial]
    fn presets_can_be_disabled() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            r#"
presets = false

[targets.app]
entry = "src/main.js"
output = { path = "dist" }
"#,
        )
        .unwrap();

        let loaded = ConfigDiscovery::new(dir.path()).load().unwrap();
        let names: Vec<_> = loaded.project.targets.keys().cloned().collect();
        assert_eq!(names, vec!["app"]);
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = ConfigDiscovery::new(dir.path())
            .load_from(Path::new("custom.toml"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    #[test]
    fn invalid_toml_is_reported_with_path() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(CONFIG_FILE_NAME), "[targets\n").unwrap();
        let err = ConfigDiscovery::new(dir.path()).load().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidToml { .. }));
    }
}
