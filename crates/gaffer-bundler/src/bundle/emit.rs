//! Bundle emission.
//!
//! Every module is wrapped in a CommonJS-style function and registered by id
//! with a small runtime that loads the entries in order. Requests that were
//! bundled map to module ids; external requests fall through to the host
//! `require`; ignored or unresolved requests throw when evaluated.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use gaffer_config::{BuildTarget, SourceMapStrategy};
use regex::Regex;
use serde_json::json;

use super::graph::{Dependency, Graph, GraphModule, ModuleKind};

const RUNTIME: &[&str] = &[
    "(function (modules, entries, externalRequire) {",
    "  var installed = {};",
    "  function load(id) {",
    "    if (installed[id]) return installed[id].exports;",
    "    var module = installed[id] = { id: id, exports: {} };",
    "    var definition = modules[id];",
    "    definition[0].call(module.exports, module, module.exports, function (request) {",
    "      var dep = definition[1][request];",
    "      if (typeof dep === \"number\") return load(dep);",
    "      if (dep === false) return externalRequire(request);",
    "      throw new Error(\"Cannot find module '\" + request + \"'\");",
    "    });",
    "    return module.exports;",
    "  }",
    "  for (var i = 0; i < entries.length; i++) load(entries[i]);",
    "})({",
];

const MISSING_REQUIRE: &str = "typeof require === \"function\" ? require : function (request) { throw new Error(\"Cannot find module '\" + request + \"'\"); }";

/// An output file, not yet written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct EmittedAsset {
    pub name: String,
    pub content: String,
}

/// One output line and the source line it came from.
struct Line {
    text: String,
    origin: Option<(usize, u32)>,
}

struct Output {
    lines: Vec<Line>,
    minify: bool,
}

impl Output {
    fn push(&mut self, text: impl Into<String>) {
        let text = text.into();
        let text = if self.minify {
            text.trim_start().to_string()
        } else {
            text
        };
        self.lines.push(Line { text, origin: None });
    }

    fn push_mapped(&mut self, text: String, source: usize, line: u32) {
        self.lines.push(Line {
            text,
            origin: Some((source, line)),
        });
    }
}

/// Render the bundle (and its source map, if configured) for a walked graph.
pub(crate) fn emit(
    target: &BuildTarget,
    graph: &Graph,
    ids: &HashMap<PathBuf, u32>,
) -> Vec<EmittedAsset> {
    let minify = target.minify();
    let defines = compile_defines(target);
    let mut out = Output {
        lines: Vec::new(),
        minify,
    };

    if let Some(banner) = target.banner() {
        let raw = target
            .plugin("banner")
            .and_then(|p| p.option("raw"))
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        for line in banner.lines() {
            if raw {
                out.push(line);
            } else {
                out.push(format!("/*! {line} */"));
            }
        }
    }

    for line in RUNTIME {
        out.push(*line);
    }

    let mut ordered: Vec<&GraphModule> = graph.modules.values().collect();
    ordered.sort_by_key(|module| ids.get(&module.path).copied().unwrap_or(u32::MAX));

    let mut sources: Vec<(&str, &str)> = Vec::new();
    for (index, module) in ordered.iter().enumerate() {
        let Some(id) = ids.get(&module.path) else {
            continue;
        };
        let body = module_body(module, &defines);
        let last = index + 1 == ordered.len();

        let mut header = format!("/* {} */ {id}: [function (module, exports, require) {{", module.name);
        if target.inline_filename || target.inline_dirname {
            let rel = module.name.trim_start_matches("./");
            if target.inline_filename {
                header.push_str(&format!(" var __filename = {};", json!(rel)));
            }
            if target.inline_dirname {
                let dir = Path::new(rel)
                    .parent()
                    .map(|p| p.to_string_lossy().replace('\\', "/"))
                    .unwrap_or_default();
                header.push_str(&format!(" var __dirname = {};", json!(dir)));
            }
        }
        out.push(header);

        match (module.kind, target.source_maps) {
            (ModuleKind::Script, SourceMapStrategy::Eval) => {
                let url = module.name.trim_start_matches("./");
                let code = format!("{body}\n//# sourceURL=gaffer:///{url}");
                out.push(format!("eval({});", json!(code)));
            }
            (ModuleKind::Script, strategy) => {
                let source_index = sources.len();
                if strategy == SourceMapStrategy::External {
                    sources.push((module.name.as_str(), module.source.as_str()));
                }
                for (number, line) in body.lines().enumerate() {
                    if minify && is_droppable(line) {
                        continue;
                    }
                    let text = if minify {
                        line.trim_start().to_string()
                    } else {
                        line.to_string()
                    };
                    if strategy == SourceMapStrategy::External {
                        out.push_mapped(text, source_index, number as u32);
                    } else {
                        out.push(text);
                    }
                }
            }
            (ModuleKind::Json, _) => {
                out.push(format!("module.exports = {};", body.trim()));
            }
            (ModuleKind::Raw, _) => {
                out.push(format!("module.exports = {};", json!(body)));
            }
        }

        let deps = dependency_map(module, ids);
        out.push(format!("}}, {deps}]{}", if last { "" } else { "," }));
    }

    let entries: Vec<u32> = graph
        .entries
        .iter()
        .filter_map(|entry| ids.get(entry).copied())
        .collect();
    out.push(format!("}}, {}, {MISSING_REQUIRE});", json!(entries)));

    let bundle_name = target.output_filename.replace("[name]", &target.name);
    let mut assets = Vec::new();

    if target.source_maps == SourceMapStrategy::External {
        let map_name = format!("{bundle_name}.map");
        let map_file = Path::new(&map_name)
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_else(|| map_name.clone());
        let map = source_map(&bundle_name, &out.lines, &sources);
        out.push(format!("//# sourceMappingURL={map_file}"));
        assets.push(EmittedAsset {
            name: bundle_name.clone(),
            content: join(&out.lines),
        });
        assets.push(EmittedAsset {
            name: map_name,
            content: map,
        });
    } else {
        assets.push(EmittedAsset {
            name: bundle_name,
            content: join(&out.lines),
        });
    }

    assets
}

/// First 20 hex characters of the BLAKE3 digest over all assets.
pub(crate) fn content_hash(assets: &[EmittedAsset]) -> String {
    let mut sorted: Vec<&EmittedAsset> = assets.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));

    let mut hasher = blake3::Hasher::new();
    for asset in sorted {
        hasher.update(asset.name.as_bytes());
        hasher.update(b"\0");
        hasher.update(asset.content.as_bytes());
        hasher.update(b"\0");
    }
    hasher.finalize().to_hex()[..20].to_string()
}

fn join(lines: &[Line]) -> String {
    let mut text = lines
        .iter()
        .map(|line| line.text.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    text.push('\n');
    text
}

fn is_droppable(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty() || trimmed.starts_with("//")
}

fn module_body(module: &GraphModule, defines: &[(Regex, String)]) -> String {
    if module.kind != ModuleKind::Script || defines.is_empty() {
        return module.source.clone();
    }
    defines.iter().fold(module.source.clone(), |source, (pattern, value)| {
        pattern
            .replace_all(&source, |caps: &regex::Captures<'_>| format!("{}{value}", &caps[1]))
            .into_owned()
    })
}

/// One pattern per define; group 1 keeps the preceding character.
fn compile_defines(target: &BuildTarget) -> Vec<(Regex, String)> {
    target
        .defines
        .iter()
        .filter_map(|(key, value)| {
            let pattern = format!(r"(^|[^\w.$]){}\b", regex::escape(key));
            match Regex::new(&pattern) {
                Ok(re) => Some((re, value.clone())),
                Err(err) => {
                    tracing::warn!(define = %key, error = %err, "skipping define");
                    None
                }
            }
        })
        .collect()
}

fn dependency_map(module: &GraphModule, ids: &HashMap<PathBuf, u32>) -> String {
    let mut map = serde_json::Map::new();
    for (request, dependency) in &module.dependencies {
        let value = match dependency {
            Dependency::Module(path) => match ids.get(path) {
                Some(id) => json!(id),
                None => serde_json::Value::Null,
            },
            Dependency::External => json!(false),
            Dependency::Ignored => serde_json::Value::Null,
        };
        map.insert(request.clone(), value);
    }
    serde_json::Value::Object(map).to_string()
}

fn source_map(file: &str, lines: &[Line], sources: &[(&str, &str)]) -> String {
    let mut mappings = String::new();
    let (mut prev_source, mut prev_line) = (0_i64, 0_i64);
    for (index, line) in lines.iter().enumerate() {
        if index > 0 {
            mappings.push(';');
        }
        if let Some((source, source_line)) = line.origin {
            let (source, source_line) = (source as i64, source_line as i64);
            encode_vlq(0, &mut mappings);
            encode_vlq(source - prev_source, &mut mappings);
            encode_vlq(source_line - prev_line, &mut mappings);
            encode_vlq(0, &mut mappings);
            prev_source = source;
            prev_line = source_line;
        }
    }

    json!({
        "version": 3,
        "file": file,
        "sources": sources.iter().map(|(name, _)| *name).collect::<Vec<_>>(),
        "sourcesContent": sources.iter().map(|(_, content)| *content).collect::<Vec<_>>(),
        "names": [],
        "mappings": mappings,
    })
    .to_string()
}

fn encode_vlq(value: i64, out: &mut String) {
    const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
    let mut vlq = if value < 0 {
        ((-value) << 1) | 1
    } else {
        value << 1
    };
    loop {
        let mut digit = (vlq & 0b11111) as usize;
        vlq >>= 5;
        if vlq > 0 {
            digit |= 0b100000;
        }
        out.push(ALPHABET[digit] as char);
        if vlq == 0 {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vlq(value: i64) -> String {
        let mut out = String::new();
        encode_vlq(value, &mut out);
        out
    }

    #[test]
    fn vlq_encoding() {
        assert_eq!(vlq(0), "A");
        assert_eq!(vlq(1), "C");
        assert_eq!(vlq(-1), "D");
        assert_eq!(vlq(16), "gB");
        assert_eq!(vlq(123), "2H");
    }

    #[test]
    fn hash_is_order_independent() {
        let a = EmittedAsset {
            name: "a.js".into(),
            content: "1".into(),
        };
        let b = EmittedAsset {
            name: "a.js.map".into(),
            content: "2".into(),
        };
        let first = content_hash(&[a.clone(), b.clone()]);
        assert_eq!(first, content_hash(&[b, a]));
        assert_eq!(first.len(), 20);
    }

    #[test]
    fn droppable_lines() {
        assert!(is_droppable("   "));
        assert!(is_droppable("  // note"));
        assert!(!is_droppable("var x = 1; // trailing"));
    }
}
