//! Immutable build targets parsed from a merged configuration.
//!
//! Recognised keys of a target configuration:
//!
//! | key | shape |
//! |---|---|
//! | `kind` | `"frontend" \| "backend" \| "bin"` (defaults from the name) |
//! | `entry` | string or list of paths relative to the project root |
//! | `output.path`, `output.filename`, `output.public_path` | strings |
//! | `module_rules` | list of `{ test, exclude?, loaders \| loader }` |
//! | `plugins` | list of plugin names or `{ name, ... }` tables |
//! | `platform` | `"web"` / `"browser"` / `"node"` |
//! | `devtool` | `"eval-source-map"`, `"eval"`, `"source-map"`, `"none"` |
//! | `resolve.alias` | table of request prefix to path |
//! | `externals` | list of bare module names kept out of the bundle |
//! | `records_path` | path of the persisted module id map |
//! | `watch` | extra paths to watch |
//! | `cache` | bool, reuse unchanged modules between passes |
//! | `node.__dirname`, `node.__filename` | bools, inline module paths |
//! | `mode` | overrides the project mode for this target |

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::merge::MergedConfig;
use crate::mode::Mode;
use crate::value::ConfigValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Frontend,
    Backend,
    Bin,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::Frontend => "frontend",
            TargetKind::Backend => "backend",
            TargetKind::Bin => "bin",
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Web,
    Node,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceMapStrategy {
    None,
    /// Each module is evaluated with an inline `sourceURL`.
    Eval,
    /// A separate `.map` file next to the bundle.
    External,
}

/// Matches modules by path and names the loaders applied to them.
#[derive(Debug, Clone)]
pub struct ModuleRule {
    pub test: Regex,
    pub exclude: Option<Regex>,
    pub loaders: Vec<String>,
}

impl ModuleRule {
    pub fn matches(&self, path: &str) -> bool {
        self.test.is_match(path) && !self.exclude.as_ref().is_some_and(|ex| ex.is_match(path))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PluginSpec {
    pub name: String,
    pub options: IndexMap<String, ConfigValue>,
}

impl PluginSpec {
    pub fn option(&self, key: &str) -> Option<&ConfigValue> {
        self.options.get(key)
    }
}

/// One independently compiled output.
///
/// All paths are absolute (joined onto the project root). Constructed once
/// per resolution and shared as `Arc<BuildTarget>`.
#[derive(Debug, Clone)]
pub struct BuildTarget {
    pub name: String,
    pub kind: TargetKind,
    pub mode: Mode,
    pub platform: Platform,
    pub root: PathBuf,
    pub entry_points: Vec<PathBuf>,
    pub output_path: PathBuf,
    pub output_filename: String,
    pub public_path: Option<String>,
    pub module_rules: Vec<ModuleRule>,
    pub plugins: Vec<PluginSpec>,
    pub source_maps: SourceMapStrategy,
    pub defines: IndexMap<String, String>,
    pub aliases: IndexMap<String, PathBuf>,
    pub externals: Vec<String>,
    pub ignore: Vec<Regex>,
    pub records_path: Option<PathBuf>,
    pub watch_paths: Vec<PathBuf>,
    pub cache: bool,
    pub inline_dirname: bool,
    pub inline_filename: bool,
    config: Arc<MergedConfig>,
}

impl BuildTarget {
    /// Parse a target out of its merged configuration.
    ///
    /// `allow_empty_entry` is set for targets whose entries come from a
    /// scripts directory rather than the `entry` key.
    pub fn from_config(
        name: &str,
        config: Arc<MergedConfig>,
        mode: Mode,
        root: &Path,
        allow_empty_entry: bool,
    ) -> Result<Self> {
        let parser = FieldParser { target: name };
        let value = config.as_value();

        let mode = match value.get("mode") {
            Some(raw) => parser
                .string(raw, "mode")?
                .parse()
                .map_err(|_| parser.invalid("mode", "expected 'development' or 'production'"))?,
            None => mode,
        };

        let kind = match value.get("kind") {
            Some(raw) => parse_kind(parser.string(raw, "kind")?)
                .ok_or_else(|| parser.invalid("kind", "expected 'frontend', 'backend' or 'bin'"))?,
            None => parse_kind(name).unwrap_or(TargetKind::Frontend),
        };

        let platform = match value.get("platform") {
            Some(raw) => match parser.string(raw, "platform")? {
                "web" | "browser" => Platform::Web,
                "node" => Platform::Node,
                _ => return Err(parser.invalid("platform", "expected 'web' or 'node'")),
            },
            None if kind == TargetKind::Frontend => Platform::Web,
            None => Platform::Node,
        };

        let entry_points: Vec<PathBuf> = match value.get("entry") {
            Some(raw) => parser
                .strings(raw, "entry")?
                .into_iter()
                .map(|entry| join_root(root, entry))
                .collect(),
            None => Vec::new(),
        };
        if entry_points.is_empty() && !allow_empty_entry {
            return Err(ConfigError::MissingField {
                target: name.to_string(),
                field: "entry".to_string(),
            });
        }

        let output_path = value
            .get_path("output.path")
            .map(|raw| parser.string(raw, "output.path"))
            .transpose()?
            .map(|path| join_root(root, path))
            .ok_or_else(|| ConfigError::MissingField {
                target: name.to_string(),
                field: "output.path".to_string(),
            })?;

        let output_filename = value
            .get_path("output.filename")
            .map(|raw| parser.string(raw, "output.filename").map(str::to_string))
            .transpose()?
            .unwrap_or_else(|| "[name].js".to_string());

        let public_path = value
            .get_path("output.public_path")
            .map(|raw| parser.string(raw, "output.public_path").map(str::to_string))
            .transpose()?;

        let module_rules = match value.get("module_rules") {
            Some(raw) => parser.module_rules(raw)?,
            None => Vec::new(),
        };

        let plugins = match value.get("plugins") {
            Some(raw) => parser.plugins(raw)?,
            None => Vec::new(),
        };

        let source_maps = match value.get("devtool") {
            None => SourceMapStrategy::None,
            Some(raw) if raw.as_bool() == Some(false) => SourceMapStrategy::None,
            Some(raw) => parse_devtool(parser.string(raw, "devtool")?).ok_or_else(|| {
                parser.invalid("devtool", "expected 'eval-source-map', 'source-map' or 'none'")
            })?,
        };

        let mut defines = IndexMap::new();
        let mut ignore = Vec::new();
        for plugin in &plugins {
            match plugin.name.as_str() {
                "define" => {
                    for (key, raw) in &plugin.options {
                        defines.insert(key.clone(), raw.to_literal());
                    }
                }
                "ignore" => {
                    let pattern = plugin
                        .option("pattern")
                        .ok_or_else(|| ConfigError::MissingField {
                            target: name.to_string(),
                            field: "plugins.ignore.pattern".to_string(),
                        })
                        .and_then(|raw| parser.string(raw, "plugins.ignore.pattern"))?;
                    ignore.push(parser.regex(pattern)?);
                }
                _ => {}
            }
        }

        let mut aliases = IndexMap::new();
        if let Some(raw) = value.get_path("resolve.alias") {
            let table = raw
                .as_mapping()
                .ok_or_else(|| parser.invalid("resolve.alias", "expected a table"))?;
            for (request, target) in table {
                let path = parser.string(target, "resolve.alias")?;
                aliases.insert(request.clone(), join_root(root, path));
            }
        }

        let externals = match value.get("externals") {
            Some(raw) => parser
                .strings(raw, "externals")?
                .into_iter()
                .map(str::to_string)
                .collect(),
            None => Vec::new(),
        };

        let records_path = value
            .get("records_path")
            .map(|raw| parser.string(raw, "records_path"))
            .transpose()?
            .map(|path| join_root(root, path));

        let cache = match value.get("cache") {
            Some(raw) => raw
                .as_bool()
                .ok_or_else(|| parser.invalid("cache", "expected a boolean"))?,
            None => true,
        };

        let flag = |path: &str| -> Result<bool> {
            match value.get_path(path) {
                Some(raw) => raw
                    .as_bool()
                    .ok_or_else(|| parser.invalid(path, "expected a boolean")),
                None => Ok(false),
            }
        };
        let inline_dirname = flag("node.__dirname")?;
        let inline_filename = flag("node.__filename")?;

        let mut watch_paths: Vec<PathBuf> = Vec::new();
        let mut add_watch = |path: PathBuf| {
            if !watch_paths.contains(&path) {
                watch_paths.push(path);
            }
        };
        for entry in &entry_points {
            if let Some(parent) = entry.parent() {
                add_watch(parent.to_path_buf());
            }
        }
        for path in aliases.values() {
            add_watch(path.clone());
        }
        if let Some(raw) = value.get("watch") {
            for path in parser.strings(raw, "watch")? {
                add_watch(join_root(root, path));
            }
        }

        Ok(Self {
            name: name.to_string(),
            kind,
            mode,
            platform,
            root: root.to_path_buf(),
            entry_points,
            output_path,
            output_filename,
            public_path,
            module_rules,
            plugins,
            source_maps,
            defines,
            aliases,
            externals,
            ignore,
            records_path,
            watch_paths,
            cache,
            inline_dirname,
            inline_filename,
            config,
        })
    }

    /// A copy of this target that compiles a single script.
    ///
    /// Used for targets with a scripts directory: each script becomes its own
    /// target named `<name>/<stem>` whose output file name substitutes
    /// `[name]` with the script stem.
    pub fn with_script(&self, script: &Path) -> Self {
        let stem = script
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut target = self.clone();
        target.name = format!("{}/{}", self.name, stem);
        target.entry_points = vec![script.to_path_buf()];
        target.output_filename = self.output_filename.replace("[name]", &stem);
        // scripts build concurrently, so each keeps its own records file
        target.records_path = self.records_path.as_ref().map(|path| {
            let file = path
                .file_name()
                .map(|f| f.to_string_lossy().into_owned())
                .unwrap_or_default();
            path.with_file_name(format!("{file}.{stem}"))
        });
        if let Some(parent) = script.parent() {
            if !target.watch_paths.iter().any(|p| p == parent) {
                target.watch_paths.insert(0, parent.to_path_buf());
            }
        }
        target
    }

    /// Absolute path of the emitted bundle.
    pub fn output_file(&self) -> PathBuf {
        self.output_path
            .join(self.output_filename.replace("[name]", &self.name))
    }

    pub fn config(&self) -> &Arc<MergedConfig> {
        &self.config
    }

    pub fn has_plugin(&self, name: &str) -> bool {
        self.plugins.iter().any(|p| p.name == name)
    }

    pub fn plugin(&self, name: &str) -> Option<&PluginSpec> {
        self.plugins.iter().find(|p| p.name == name)
    }

    pub fn minify(&self) -> bool {
        self.has_plugin("minify")
    }

    pub fn no_errors(&self) -> bool {
        self.has_plugin("no-errors")
    }

    /// Text prepended to the emitted bundle by the `banner` plugin.
    pub fn banner(&self) -> Option<&str> {
        self.plugin("banner")
            .and_then(|p| p.option("banner"))
            .and_then(ConfigValue::as_str)
    }

    /// False when the `process.env.NO_SERVER_RENDERING` define is `true`.
    pub fn server_rendering(&self) -> bool {
        self.defines
            .get("process.env.NO_SERVER_RENDERING")
            .is_none_or(|value| value != "true")
    }

    pub fn is_external(&self, request: &str) -> bool {
        let package = request.split('/').next().unwrap_or(request);
        self.externals.iter().any(|ext| ext == request || ext == package)
    }

    pub fn is_ignored(&self, request: &str) -> bool {
        self.ignore.iter().any(|re| re.is_match(request))
    }

    /// Path relative to the project root, with forward slashes.
    pub fn relative_path(&self, path: &Path) -> String {
        let rel = path.strip_prefix(&self.root).unwrap_or(path);
        rel.to_string_lossy().replace('\\', "/")
    }
}

fn join_root(root: &Path, path: &str) -> PathBuf {
    root.join(path.trim_start_matches("./"))
}

fn parse_kind(raw: &str) -> Option<TargetKind> {
    match raw {
        "frontend" => Some(TargetKind::Frontend),
        "backend" => Some(TargetKind::Backend),
        "bin" => Some(TargetKind::Bin),
        _ => None,
    }
}

fn parse_devtool(raw: &str) -> Option<SourceMapStrategy> {
    match raw.trim_start_matches(['#', '@']) {
        "none" | "" => Some(SourceMapStrategy::None),
        "eval" | "eval-source-map" | "cheap-eval-source-map" => Some(SourceMapStrategy::Eval),
        "source-map" | "sourcemap" => Some(SourceMapStrategy::External),
        _ => None,
    }
}

struct FieldParser<'a> {
    target: &'a str,
}

impl<'a> FieldParser<'a> {
    fn invalid(&self, field: &str, hint: &str) -> ConfigError {
        ConfigError::InvalidValue {
            target: self.target.to_string(),
            field: field.to_string(),
            hint: hint.to_string(),
        }
    }

    fn string<'v>(&self, value: &'v ConfigValue, field: &str) -> Result<&'v str> {
        value
            .as_str()
            .ok_or_else(|| self.invalid(field, "expected a string"))
    }

    /// A string or a list of strings.
    fn strings<'v>(&self, value: &'v ConfigValue, field: &str) -> Result<Vec<&'v str>> {
        match value {
            ConfigValue::Sequence(items) => items
                .iter()
                .map(|item| self.string(item, field))
                .collect(),
            other => Ok(vec![self.string(other, field)?]),
        }
    }

    fn regex(&self, pattern: &str) -> Result<Regex> {
        Regex::new(pattern).map_err(|err| ConfigError::InvalidPattern {
            target: self.target.to_string(),
            pattern: pattern.to_string(),
            message: err.to_string(),
        })
    }

    fn module_rules(&self, value: &ConfigValue) -> Result<Vec<ModuleRule>> {
        let items = value
            .as_sequence()
            .ok_or_else(|| self.invalid("module_rules", "expected a list of tables"))?;

        items
            .iter()
            .map(|item| {
                let test = item
                    .get("test")
                    .ok_or_else(|| ConfigError::MissingField {
                        target: self.target.to_string(),
                        field: "module_rules.test".to_string(),
                    })
                    .and_then(|raw| self.string(raw, "module_rules.test"))?;
                let exclude = item
                    .get("exclude")
                    .map(|raw| self.string(raw, "module_rules.exclude"))
                    .transpose()?
                    .map(|pattern| self.regex(pattern))
                    .transpose()?;

                let loaders = match (item.get("loaders"), item.get("loader")) {
                    (Some(list), _) => self
                        .strings(list, "module_rules.loaders")?
                        .into_iter()
                        .map(str::to_string)
                        .collect(),
                    (None, Some(chain)) => self
                        .string(chain, "module_rules.loader")?
                        .split('!')
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect(),
                    (None, None) => Vec::new(),
                };

                Ok(ModuleRule {
                    test: self.regex(test)?,
                    exclude,
                    loaders,
                })
            })
            .collect()
    }

    fn plugins(&self, value: &ConfigValue) -> Result<Vec<PluginSpec>> {
        let items = value
            .as_sequence()
            .ok_or_else(|| self.invalid("plugins", "expected a list"))?;

        items
            .iter()
            .map(|item| match item {
                ConfigValue::Mapping(table) => {
                    let name = table
                        .get("name")
                        .ok_or_else(|| ConfigError::MissingField {
                            target: self.target.to_string(),
                            field: "plugins.name".to_string(),
                        })
                        .and_then(|raw| self.string(raw, "plugins.name"))?
                        .to_string();
                    let options = table
                        .iter()
                        .filter(|(key, _)| key.as_str() != "name")
                        .map(|(key, value)| (key.clone(), value.clone()))
                        .collect();
                    Ok(PluginSpec { name, options })
                }
                other => Ok(PluginSpec {
                    name: self.string(other, "plugins")?.to_string(),
                    options: IndexMap::new(),
                }),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::merge;

    fn target(src: &str) -> Result<BuildTarget> {
        let value: ConfigValue = toml::from_str(src).unwrap();
        let config = Arc::new(merge(&ConfigValue::mapping(), &value));
        BuildTarget::from_config("frontend", config, Mode::Development, Path::new("/app"), false)
    }

    #[test]
    fn parses_full_target() {
        let target = target(
            r##"
entry = ["./static/js/main.js"]
devtool = "#eval-source-map"
externals = ["react"]

[output]
path = "static/build"
filename = "frontend.js"

[resolve.alias]
impl = "static/js/impl"

[[module_rules]]
test = '\.js$'
exclude = "node_modules"
loaders = ["react-hot", "6to5"]

[[module_rules]]
test = '\.less$'
loader = "style!css!less"

[[plugins]]
name = "define"
"process.env.NODE_ENV" = '"development"'

[[plugins]]
name = "ignore"
pattern = '\.(css|less)$'
"##,
        )
        .unwrap();

        assert_eq!(target.kind, TargetKind::Frontend);
        assert_eq!(target.platform, Platform::Web);
        assert_eq!(target.source_maps, SourceMapStrategy::Eval);
        assert_eq!(target.output_file(), PathBuf::from("/app/static/build/frontend.js"));
        assert_eq!(target.module_rules[1].loaders, vec!["style", "css", "less"]);
        assert!(target.module_rules[0].matches("static/js/main.js"));
        assert!(!target.module_rules[0].matches("node_modules/x/index.js"));
        assert_eq!(
            target.defines.get("process.env.NODE_ENV").map(String::as_str),
            Some("\"development\"")
        );
        assert!(target.is_ignored("./style.less"));
        assert!(target.is_external("react/addons"));
        assert!(target.watch_paths.contains(&PathBuf::from("/app/static/js")));
        assert!(target.watch_paths.contains(&PathBuf::from("/app/static/js/impl")));
    }

    #[test]
    fn missing_entry_is_rejected() {
        let err = target("[output]\npath = \"build\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::MissingField { ref field, .. } if field == "entry"));
    }

    #[test]
    fn invalid_regex_is_reported() {
        let err = target(
            r#"
entry = "a.js"
output = { path = "build" }
module_rules = [{ test = "(" }]
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPattern { .. }));
    }

    #[test]
    fn server_rendering_follows_define() {
        let on = target("entry = \"a.js\"\noutput = { path = \"b\" }\n").unwrap();
        assert!(on.server_rendering());

        let off = target(
            r#"
entry = "a.js"
output = { path = "b" }
plugins = [{ name = "define", "process.env.NO_SERVER_RENDERING" = true }]
"#,
        )
        .unwrap();
        assert!(!off.server_rendering());
    }

    #[test]
    fn with_script_renames_output() {
        let base = target(
            "entry = \"bin/a.js\"\noutput = { path = \"build/bin\", filename = \"[name].js\" }\n",
        )
        .unwrap();
        let script = base.with_script(Path::new("/app/bin/populate.js"));
        assert_eq!(script.name, "frontend/populate");
        assert_eq!(script.output_file(), PathBuf::from("/app/build/bin/populate.js"));
        assert_eq!(script.entry_points, vec![PathBuf::from("/app/bin/populate.js")]);
    }
}
