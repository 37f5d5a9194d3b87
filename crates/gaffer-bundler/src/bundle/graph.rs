//! Dependency walk from a target's entry points.
//!
//! Only `require(...)`, `import ... from` and `export ... from` requests with
//! string literals are followed. Relative, absolute and aliased requests are
//! bundled; bare requests stay external.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use gaffer_config::{BuildTarget, Platform};
use indexmap::IndexMap;
use path_clean::PathClean;
use regex::Regex;

use crate::stats::{Diagnostic, ModuleReason};

static REQUEST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?:\brequire\s*\(\s*|\bimport\s+(?:[\w$*{}\s,]+?\s+from\s+)?|\bexport\s+(?:\*|\{[^}]*\})\s+from\s+)['"]([^'"\n]+)['"]"#,
    )
    .expect("request pattern should always compile")
});

const EXTENSIONS: &[&str] = &["js", "json"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ModuleKind {
    Script,
    Json,
    /// Any other file type handled by a module rule; exported as a string.
    Raw,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Request {
    pub specifier: String,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Dependency {
    Module(PathBuf),
    External,
    Ignored,
}

#[derive(Debug, Clone)]
pub(crate) struct GraphModule {
    pub path: PathBuf,
    pub name: String,
    pub kind: ModuleKind,
    pub source: String,
    pub loaders: Vec<String>,
    pub content_hash: blake3::Hash,
    pub cached: bool,
    pub dependencies: IndexMap<String, Dependency>,
    pub reasons: Vec<ModuleReason>,
}

/// Sources seen by the previous pass of a target, keyed by path.
#[derive(Debug, Default)]
pub(crate) struct SourceCache {
    entries: HashMap<PathBuf, CachedSource>,
}

#[derive(Debug, Clone)]
struct CachedSource {
    hash: blake3::Hash,
    requests: Vec<Request>,
}

#[derive(Debug, Default)]
pub(crate) struct Graph {
    pub modules: IndexMap<PathBuf, GraphModule>,
    pub entries: Vec<PathBuf>,
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
}

/// Walk the module graph of `target`.
///
/// Entry points must exist; the caller checks them before walking. Problems
/// found in modules become diagnostics on the returned graph.
pub(crate) fn walk(target: &BuildTarget, cache: &mut SourceCache) -> Graph {
    let mut graph = Graph::default();
    let mut queue: VecDeque<PathBuf> = VecDeque::new();
    let mut next_cache = SourceCache::default();

    for entry in &target.entry_points {
        let entry = entry.clean();
        if !graph.entries.contains(&entry) {
            graph.entries.push(entry.clone());
            queue.push_back(entry);
        }
    }

    let mut seen: Vec<PathBuf> = graph.entries.clone();
    while let Some(path) = queue.pop_front() {
        let name = module_name(target, &path);

        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) => {
                graph
                    .errors
                    .push(Diagnostic::at(format!("Module build failed: {err}"), &name, None));
                continue;
            }
        };
        let source = match String::from_utf8(bytes) {
            Ok(source) => source,
            Err(_) => {
                graph.errors.push(Diagnostic::at(
                    "Module build failed: file is not valid UTF-8",
                    &name,
                    None,
                ));
                continue;
            }
        };
        let hash = blake3::hash(source.as_bytes());

        let loaders: Vec<String> = target
            .module_rules
            .iter()
            .filter(|rule| rule.matches(&name))
            .flat_map(|rule| rule.loaders.iter().cloned())
            .collect();
        let has_rule = target.module_rules.iter().any(|rule| rule.matches(&name));

        let kind = match path.extension().and_then(|ext| ext.to_str()) {
            Some("js") | Some("mjs") | Some("cjs") => ModuleKind::Script,
            Some("json") => ModuleKind::Json,
            _ => ModuleKind::Raw,
        };
        if kind != ModuleKind::Script && !has_rule {
            graph.errors.push(Diagnostic::at(
                "Module parse failed: no module rule matches this file type",
                &name,
                None,
            ));
            continue;
        }
        if kind == ModuleKind::Json {
            if let Err(err) = serde_json::from_str::<serde_json::Value>(&source) {
                graph.errors.push(Diagnostic::at(
                    format!("Module parse failed: {err}"),
                    &name,
                    Some(err.line() as u32),
                ));
                continue;
            }
        }

        let previous = cache.entries.get(&path);
        let cached = target.cache && previous.is_some_and(|prev| prev.hash == hash);
        let requests = match previous {
            Some(prev) if prev.hash == hash => prev.requests.clone(),
            _ if kind == ModuleKind::Script => scan_requests(&source),
            _ => Vec::new(),
        };
        next_cache.entries.insert(
            path.clone(),
            CachedSource {
                hash,
                requests: requests.clone(),
            },
        );

        let from_dir = path.parent().unwrap_or(Path::new("")).to_path_buf();
        let mut dependencies = IndexMap::new();
        for request in &requests {
            if dependencies.contains_key(&request.specifier) {
                continue;
            }
            let dependency = match resolve(target, &from_dir, &request.specifier) {
                Resolved::Module(dep) => {
                    if !seen.contains(&dep) {
                        seen.push(dep.clone());
                        queue.push_back(dep.clone());
                    }
                    Dependency::Module(dep)
                }
                Resolved::Ignored => Dependency::Ignored,
                Resolved::External => {
                    if target.platform == Platform::Web && !target.is_external(&request.specifier) {
                        graph.warnings.push(Diagnostic::at(
                            format!(
                                "'{}' is not bundled and must be provided at runtime",
                                request.specifier
                            ),
                            &name,
                            Some(request.line),
                        ));
                    }
                    Dependency::External
                }
                Resolved::Missing => {
                    graph.errors.push(Diagnostic::at(
                        format!(
                            "Module not found: cannot resolve '{}' in {}",
                            request.specifier,
                            module_name(target, &from_dir)
                        ),
                        &name,
                        Some(request.line),
                    ));
                    continue;
                }
            };
            dependencies.insert(request.specifier.clone(), dependency);
        }

        graph.modules.insert(
            path.clone(),
            GraphModule {
                path,
                name,
                kind,
                source,
                loaders,
                content_hash: hash,
                cached,
                dependencies,
                reasons: Vec::new(),
            },
        );
    }

    // reasons point from each dependency back at its importers
    let mut reasons: HashMap<PathBuf, Vec<ModuleReason>> = HashMap::new();
    for module in graph.modules.values() {
        for (request, dependency) in &module.dependencies {
            if let Dependency::Module(dep) = dependency {
                reasons.entry(dep.clone()).or_default().push(ModuleReason {
                    module: module.name.clone(),
                    request: request.clone(),
                });
            }
        }
    }
    for (path, list) in reasons {
        if let Some(module) = graph.modules.get_mut(&path) {
            module.reasons = list;
        }
    }

    *cache = next_cache;
    graph
}

/// `./`-prefixed path relative to the project root.
pub(crate) fn module_name(target: &BuildTarget, path: &Path) -> String {
    let rel = target.relative_path(path);
    if rel.is_empty() {
        ".".to_string()
    } else if Path::new(&rel).is_absolute() {
        rel
    } else {
        format!("./{rel}")
    }
}

/// String-literal requests in a script, skipping `//` comment lines.
pub(crate) fn scan_requests(source: &str) -> Vec<Request> {
    REQUEST
        .captures_iter(source)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let line_start = source[..whole.start()].rfind('\n').map_or(0, |i| i + 1);
            let prefix = &source[line_start..whole.start()];
            if prefix.contains("//") || prefix.trim_start().starts_with('*') {
                return None;
            }
            let line = source[..whole.start()].matches('\n').count() as u32 + 1;
            Some(Request {
                specifier: caps[1].to_string(),
                line,
            })
        })
        .collect()
}

#[derive(Debug, PartialEq, Eq)]
enum Resolved {
    Module(PathBuf),
    External,
    Ignored,
    Missing,
}

fn resolve(target: &BuildTarget, from_dir: &Path, specifier: &str) -> Resolved {
    if target.is_ignored(specifier) {
        return Resolved::Ignored;
    }

    let base = if specifier == "."
        || specifier == ".."
        || specifier.starts_with("./")
        || specifier.starts_with("../")
    {
        from_dir.join(specifier)
    } else if Path::new(specifier).is_absolute() {
        PathBuf::from(specifier)
    } else {
        match alias_path(target, specifier) {
            Some(path) => path,
            None => return Resolved::External,
        }
    };

    candidates(&base.clean())
        .into_iter()
        .find(|candidate| candidate.is_file())
        .map_or(Resolved::Missing, Resolved::Module)
}

fn alias_path(target: &BuildTarget, specifier: &str) -> Option<PathBuf> {
    target.aliases.iter().find_map(|(key, path)| {
        if specifier == key {
            Some(path.clone())
        } else {
            specifier
                .strip_prefix(key.as_str())
                .and_then(|rest| rest.strip_prefix('/'))
                .map(|rest| path.join(rest))
        }
    })
}

fn candidates(base: &Path) -> Vec<PathBuf> {
    let mut out = vec![base.to_path_buf()];
    let file_name = base
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    for ext in EXTENSIONS {
        out.push(base.with_file_name(format!("{file_name}.{ext}")));
    }
    out.push(base.join("index.js"));
    out
}
