//! Project-level configuration and per-target resolution.
//!
//! A project holds a shared `base`, per-target tables and per-mode profiles.
//! The effective configuration of a target is
//!
//! ```text
//! merge(merge(merge(base, profile.base), target), profile.targets[name])
//! ```
//!
//! where a target with `extends = "<parent>"` uses the parent's effective
//! configuration in place of `merge(base, profile.base)`.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::merge::{merge, merge_values, MergedConfig};
use crate::mode::Mode;
use crate::target::{BuildTarget, TargetKind};
use crate::value::ConfigValue;

const EXTENDS_KEY: &str = "extends";
const SCRIPTS_DIR_KEY: &str = "scripts_dir";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// When false, the built-in presets are not layered underneath.
    #[serde(default = "default_presets")]
    pub presets: bool,

    #[serde(default)]
    pub base: ConfigValue,

    #[serde(default)]
    pub targets: IndexMap<String, ConfigValue>,

    #[serde(default)]
    pub profiles: IndexMap<String, ProfileConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileConfig {
    #[serde(default)]
    pub base: Option<ConfigValue>,

    #[serde(default)]
    pub targets: IndexMap<String, ConfigValue>,
}

fn default_presets() -> bool {
    true
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            presets: true,
            base: ConfigValue::mapping(),
            targets: IndexMap::new(),
            profiles: IndexMap::new(),
        }
    }
}

impl ProjectConfig {
    pub fn from_toml_str(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|err| ConfigError::InvalidToml {
            path: path.to_path_buf(),
            message: err.to_string(),
        })
    }

    /// Layer `other` on top of `self` with the usual merge rules.
    pub fn layered(&self, other: &ProjectConfig) -> ProjectConfig {
        let mut targets = self.targets.clone();
        for (name, table) in &other.targets {
            let next = match self.targets.get(name) {
                Some(existing) => merge_values(existing, table),
                None => table.clone(),
            };
            targets.insert(name.clone(), next);
        }

        let mut profiles = self.profiles.clone();
        for (mode, profile) in &other.profiles {
            let next = match self.profiles.get(mode) {
                Some(existing) => existing.layered(profile),
                None => profile.clone(),
            };
            profiles.insert(mode.clone(), next);
        }

        ProjectConfig {
            presets: other.presets,
            base: merge_values(&self.base, &other.base),
            targets,
            profiles,
        }
    }

    /// Resolve every target for `mode`, with paths relative to `root`.
    pub fn resolve(&self, mode: Mode, root: &Path) -> Result<ResolvedProject> {
        let profile = self.profiles.get(mode.as_str());
        let mut resolver = Resolver {
            project: self,
            profile,
            memo: HashMap::new(),
        };

        let mut targets = IndexMap::new();
        for name in self.targets.keys() {
            let config = Arc::new(merge(
                &ConfigValue::mapping(),
                &resolver.effective(name, &mut Vec::new())?,
            ));
            let scripts_dir = config
                .get(SCRIPTS_DIR_KEY)
                .map(|raw| {
                    raw.as_str().ok_or_else(|| ConfigError::InvalidValue {
                        target: name.clone(),
                        field: SCRIPTS_DIR_KEY.to_string(),
                        hint: "expected a string".to_string(),
                    })
                })
                .transpose()?;

            let built = match scripts_dir {
                Some(dir) => {
                    let template =
                        BuildTarget::from_config(name, Arc::clone(&config), mode, root, true)?;
                    scripts_in(&root.join(dir))?
                        .iter()
                        .map(|script| Arc::new(template.with_script(script)))
                        .collect()
                }
                None => vec![Arc::new(BuildTarget::from_config(
                    name,
                    Arc::clone(&config),
                    mode,
                    root,
                    false,
                )?)],
            };

            tracing::debug!(target_name = %name, count = built.len(), "resolved target");
            targets.insert(
                name.clone(),
                ResolvedTarget {
                    name: name.clone(),
                    config,
                    targets: built,
                },
            );
        }

        Ok(ResolvedProject {
            mode,
            root: root.to_path_buf(),
            targets,
        })
    }
}

impl ProfileConfig {
    fn layered(&self, other: &ProfileConfig) -> ProfileConfig {
        let base = match (&self.base, &other.base) {
            (Some(a), Some(b)) => Some(merge_values(a, b)),
            (a, b) => b.clone().or_else(|| a.clone()),
        };
        let mut targets = self.targets.clone();
        for (name, table) in &other.targets {
            let next = match self.targets.get(name) {
                Some(existing) => merge_values(existing, table),
                None => table.clone(),
            };
            targets.insert(name.clone(), next);
        }
        ProfileConfig { base, targets }
    }
}

struct Resolver<'a> {
    project: &'a ProjectConfig,
    profile: Option<&'a ProfileConfig>,
    memo: HashMap<String, ConfigValue>,
}

impl Resolver<'_> {
    fn effective(&mut self, name: &str, chain: &mut Vec<String>) -> Result<ConfigValue> {
        if let Some(done) = self.memo.get(name) {
            return Ok(done.clone());
        }
        if chain.iter().any(|seen| seen == name) {
            return Err(ConfigError::CyclicExtends(name.to_string()));
        }

        let project = self.project;
        let profile = self.profile;
        let table = match project.targets.get(name) {
            Some(table) => table,
            None => {
                return Err(match chain.last() {
                    Some(child) => ConfigError::UnknownParent {
                        target: child.clone(),
                        parent: name.to_string(),
                    },
                    None => ConfigError::UnknownTarget(name.to_string()),
                });
            }
        };

        let parent = match table.get(EXTENDS_KEY) {
            Some(raw) => Some(raw.as_str().ok_or_else(|| ConfigError::InvalidValue {
                target: name.to_string(),
                field: EXTENDS_KEY.to_string(),
                hint: "expected a target name".to_string(),
            })?),
            None => None,
        };

        let start = match parent {
            Some(parent) => {
                chain.push(name.to_string());
                let inherited = self.effective(parent, chain)?;
                chain.pop();
                inherited
            }
            None => match profile.and_then(|p| p.base.as_ref()) {
                Some(profile_base) => merge_values(&project.base, profile_base),
                None => project.base.clone(),
            },
        };

        let own = without_key(table, EXTENDS_KEY);
        let mut merged = merge_values(&start, &own);
        if let Some(overrides) = profile.and_then(|p| p.targets.get(name)) {
            merged = merge_values(&merged, overrides);
        }

        self.memo.insert(name.to_string(), merged.clone());
        Ok(merged)
    }
}

fn without_key(value: &ConfigValue, key: &str) -> ConfigValue {
    match value {
        ConfigValue::Mapping(map) => {
            let mut map = map.clone();
            map.shift_remove(key);
            ConfigValue::Mapping(map)
        }
        other => other.clone(),
    }
}

/// `*.js` files directly inside `dir`, sorted by file name.
fn scripts_in(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        tracing::warn!(dir = %dir.display(), "scripts directory does not exist");
        return Ok(Vec::new());
    }

    let mut scripts: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "js"))
        .collect();
    scripts.sort();
    Ok(scripts)
}

/// Every target of a project, resolved for one mode.
#[derive(Debug, Clone)]
pub struct ResolvedProject {
    pub mode: Mode,
    pub root: PathBuf,
    targets: IndexMap<String, ResolvedTarget>,
}

/// One configured target and the build targets it expands to.
///
/// Targets with a scripts directory expand to one build target per script;
/// all others expand to exactly one.
#[derive(Debug, Clone)]
pub struct ResolvedTarget {
    pub name: String,
    pub config: Arc<MergedConfig>,
    pub targets: Vec<Arc<BuildTarget>>,
}

impl ResolvedProject {
    pub fn get(&self, name: &str) -> Result<&ResolvedTarget> {
        self.targets
            .get(name)
            .ok_or_else(|| ConfigError::UnknownTarget(name.to_string()))
    }

    /// The only build target configured under `name`.
    pub fn single(&self, name: &str) -> Result<Arc<BuildTarget>> {
        let resolved = self.get(name)?;
        match resolved.targets.as_slice() {
            [only] => Ok(Arc::clone(only)),
            _ => Err(ConfigError::InvalidValue {
                target: name.to_string(),
                field: SCRIPTS_DIR_KEY.to_string(),
                hint: format!("expected one build target, found {}", resolved.targets.len()),
            }),
        }
    }

    /// All build targets of the given kind, in configuration order.
    pub fn of_kind(&self, kind: TargetKind) -> Vec<Arc<BuildTarget>> {
        self.targets
            .values()
            .flat_map(|resolved| resolved.targets.iter())
            .filter(|target| target.kind == kind)
            .cloned()
            .collect()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.targets.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project(src: &str) -> ProjectConfig {
        ProjectConfig::from_toml_str(src, Path::new("gaffer.toml")).unwrap()
    }

    #[test]
    fn target_overrides_base_and_profile_overrides_target() {
        let project = project(
            r#"
[base]
cache = true
plugins = ["a"]

[targets.app]
entry = "main.js"
output = { path = "out" }
plugins = ["b"]

[profiles.production.base]
plugins = ["p"]

[profiles.production.targets.app]
cache = false
plugins = ["c"]
"#,
        );

        let resolved = project.resolve(Mode::Production, Path::new("/w")).unwrap();
        let app = resolved.get("app").unwrap();
        assert_eq!(
            app.config.to_canonical_json(),
            r#"{"cache":false,"plugins":["a","p","b","c"],"entry":"main.js","output":{"path":"out"}}"#
        );
        assert!(!app.targets[0].cache);

        let dev = project.resolve(Mode::Development, Path::new("/w")).unwrap();
        let names: Vec<_> = dev.single("app").unwrap().plugins.iter().map(|p| p.name.clone()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn extends_uses_parent_effective_config() {
        let project = project(
            r#"
[targets.server]
entry = "server.js"
output = { path = "build" }
externals = ["pg"]

[targets.tool]
extends = "server"
output = { path = "build/tool" }
externals = ["yargs"]
"#,
        );

        let resolved = project.resolve(Mode::Development, Path::new("/w")).unwrap();
        let tool = resolved.single("tool").unwrap();
        assert_eq!(tool.externals, vec!["pg", "yargs"]);
        assert_eq!(tool.output_path, PathBuf::from("/w/build/tool"));
        assert!(tool.config().get("extends").is_none());
    }

    #[test]
    fn cyclic_extends_is_rejected() {
        let project = project(
            r#"
[targets.a]
extends = "b"
[targets.b]
extends = "a"
"#,
        );
        let err = project.resolve(Mode::Development, Path::new("/w")).unwrap_err();
        assert!(matches!(err, ConfigError::CyclicExtends(_)));
    }

    #[test]
    fn unknown_parent_is_rejected() {
        let project = project("[targets.a]\nextends = \"ghost\"\n");
        let err = project.resolve(Mode::Development, Path::new("/w")).unwrap_err();
        assert!(
            matches!(err, ConfigError::UnknownParent { ref target, ref parent } if target == "a" && parent == "ghost")
        );
    }

    #[test]
    fn layering_merges_targets_and_profiles() {
        let lower = project(
            r#"
[targets.app]
entry = ["a.js"]
[profiles.production.targets.app]
plugins = ["minify"]
"#,
        );
        let upper = project(
            r#"
[targets.app]
entry = ["b.js"]
[profiles.production.targets.app]
plugins = ["banner"]
"#,
        );

        let layered = lower.layered(&upper);
        assert_eq!(
            serde_json::to_string(&layered.targets["app"]).unwrap(),
            r#"{"entry":["a.js","b.js"]}"#
        );
        assert_eq!(
            serde_json::to_string(&layered.profiles["production"].targets["app"]).unwrap(),
            r#"{"plugins":["minify","banner"]}"#
        );
    }

    #[test]
    fn unknown_target_lookup() {
        let resolved = project("").resolve(Mode::Development, Path::new("/w")).unwrap();
        assert!(matches!(
            resolved.get("frontend"),
            Err(ConfigError::UnknownTarget(_))
        ));
    }
}
