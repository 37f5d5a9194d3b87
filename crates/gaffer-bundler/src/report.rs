//! Human-readable build reports.
//!
//! The reporter is pure: it renders [`BuildStats`] into a [`Report`] and the
//! caller decides where to print it.

use std::fmt;

use gaffer_config::ReportSettings;
use glob::Pattern;
use owo_colors::OwoColorize;

use crate::stats::{AssetStats, BuildStats, Diagnostic, ModuleStats};

#[derive(Debug, Clone)]
pub struct ReportOptions {
    pub show_cached_assets: bool,
    pub show_modules: bool,
    pub use_color: bool,
    /// Modules whose path matches are collapsed into a `+ N hidden modules` line.
    pub exclude: Vec<Pattern>,
    pub show_chunk_reasons: bool,
}

impl ReportOptions {
    pub fn from_settings(settings: &ReportSettings) -> Self {
        let exclude = settings
            .exclude
            .iter()
            .filter_map(|raw| match Pattern::new(raw) {
                Ok(pattern) => Some(pattern),
                Err(err) => {
                    tracing::warn!(pattern = %raw, error = %err, "ignoring invalid exclude pattern");
                    None
                }
            })
            .collect();

        Self {
            show_cached_assets: settings.show_cached_assets,
            show_modules: settings.show_modules,
            use_color: settings.colors,
            exclude,
            show_chunk_reasons: settings.show_chunk_reasons,
        }
    }

    pub fn with_color(mut self, use_color: bool) -> Self {
        self.use_color = use_color;
        self
    }

    fn is_excluded(&self, name: &str) -> bool {
        let path = name.trim_start_matches("./");
        self.exclude.iter().any(|pattern| pattern.matches(path))
    }
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self::from_settings(&ReportSettings::default())
    }
}

/// A rendered report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    lines: Vec<String>,
}

impl Report {
    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.lines.join("\n"))
    }
}

pub struct BuildReporter;

impl BuildReporter {
    pub fn format(stats: &BuildStats, options: &ReportOptions) -> Report {
        let paint = Painter {
            enabled: options.use_color,
        };
        let mut lines = Vec::new();

        let hash = if stats.hash.is_empty() { "-" } else { stats.hash.as_str() };
        lines.push(format!(
            "{}  Hash: {}  Time: {}ms  Modules: {}",
            paint.bold(&stats.target_name),
            paint.bold(hash),
            stats.timing_ms,
            stats.module_count
        ));

        let assets: Vec<&AssetStats> = stats
            .assets
            .iter()
            .filter(|asset| options.show_cached_assets || !asset.cached)
            .collect();
        if !assets.is_empty() {
            lines.extend(asset_table(&assets, &paint));
        }

        if options.show_modules {
            lines.extend(module_listing(&stats.modules, options, &paint));
        }

        for error in &stats.errors {
            lines.extend(diagnostic("ERROR", error, &paint));
        }
        for warning in &stats.warnings {
            lines.extend(diagnostic("WARNING", warning, &paint));
        }

        Report { lines }
    }
}

fn asset_table(assets: &[&AssetStats], paint: &Painter) -> Vec<String> {
    let sizes: Vec<String> = assets
        .iter()
        .map(|asset| format_size(asset.size as u64))
        .collect();
    let name_width = assets
        .iter()
        .map(|asset| asset.name.len())
        .chain(std::iter::once("Asset".len()))
        .max()
        .unwrap_or(0);
    let size_width = sizes
        .iter()
        .map(String::len)
        .chain(std::iter::once("Size".len()))
        .max()
        .unwrap_or(0);

    let mut lines = vec![format!(
        "{:>name_width$}  {:>size_width$}",
        "Asset", "Size"
    )];
    for (asset, size) in assets.iter().zip(&sizes) {
        let status = if asset.emitted {
            format!("  {}", paint.green("[emitted]"))
        } else if asset.cached {
            format!("  {}", paint.dimmed("[cached]"))
        } else {
            String::new()
        };
        lines.push(format!(
            "{}  {size:>size_width$}{status}",
            paint.green(&format!("{:>name_width$}", asset.name)),
        ));
    }
    lines
}

fn module_listing(modules: &[ModuleStats], options: &ReportOptions, paint: &Painter) -> Vec<String> {
    let mut lines = Vec::new();
    let mut hidden = 0;

    for module in modules {
        if options.is_excluded(&module.name) {
            hidden += 1;
            continue;
        }
        let mut line = format!(
            "{:>6} {} {}",
            format!("[{}]", module.id),
            module.name,
            format_size(module.size as u64)
        );
        if module.cached {
            line.push(' ');
            line.push_str(&paint.dimmed("{cached}"));
        }
        lines.push(line);

        if options.show_chunk_reasons {
            for reason in &module.reasons {
                lines.push(paint.cyan(&format!(
                    "       require {} from {}",
                    reason.request, reason.module
                )));
            }
        }
    }

    if hidden > 0 {
        let noun = if hidden == 1 { "module" } else { "modules" };
        lines.push(format!("    + {hidden} hidden {noun}"));
    }
    lines
}

fn diagnostic(label: &str, diagnostic: &Diagnostic, paint: &Painter) -> Vec<String> {
    let heading = match diagnostic.location() {
        Some(location) => format!("{label} in {location}"),
        None => label.to_string(),
    };
    let heading = if label == "ERROR" {
        paint.red(&heading)
    } else {
        paint.yellow(&heading)
    };
    vec![String::new(), heading, diagnostic.message.clone()]
}

/// Applies colors only when enabled.
struct Painter {
    enabled: bool,
}

impl Painter {
    fn apply(&self, text: &str, styled: impl FnOnce(&str) -> String) -> String {
        if self.enabled {
            styled(text)
        } else {
            text.to_string()
        }
    }

    fn bold(&self, text: &str) -> String {
        self.apply(text, |t| t.bold().to_string())
    }

    fn green(&self, text: &str) -> String {
        self.apply(text, |t| t.green().to_string())
    }

    fn red(&self, text: &str) -> String {
        self.apply(text, |t| t.red().bold().to_string())
    }

    fn yellow(&self, text: &str) -> String {
        self.apply(text, |t| t.yellow().bold().to_string())
    }

    fn cyan(&self, text: &str) -> String {
        self.apply(text, |t| t.cyan().to_string())
    }

    fn dimmed(&self, text: &str) -> String {
        self.apply(text, |t| t.dimmed().to_string())
    }
}

/// Format file size in human-readable format.
///
/// ```
/// use gaffer_bundler::format_size;
///
/// assert_eq!(format_size(0), "0 B");
/// assert_eq!(format_size(500), "500 B");
/// assert_eq!(format_size(1024), "1.00 KB");
/// assert_eq!(format_size(1_048_576), "1.00 MB");
/// ```
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];

    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", size as u64, UNITS[unit_idx])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::ModuleReason;

    fn module(id: u32, name: &str, cached: bool) -> ModuleStats {
        ModuleStats {
            id,
            name: name.to_string(),
            size: 120,
            cached,
            loaders: Vec::new(),
            reasons: vec![ModuleReason {
                module: "./static/js/main.js".to_string(),
                request: "./app".to_string(),
            }],
        }
    }

    fn stats() -> BuildStats {
        BuildStats {
            target_name: "frontend".to_string(),
            hash: "0123456789abcdef0123".to_string(),
            errors: Vec::new(),
            warnings: Vec::new(),
            module_count: 3,
            timing_ms: 42,
            modules: vec![
                module(0, "./static/js/main.js", false),
                module(1, "./static/js/components/button.js", true),
                module(2, "./node_modules/lib/index.js", true),
            ],
            assets: vec![
                AssetStats {
                    name: "frontend.js".to_string(),
                    size: 2048,
                    cached: false,
                    emitted: true,
                },
                AssetStats {
                    name: "frontend.js.map".to_string(),
                    size: 4096,
                    cached: true,
                    emitted: false,
                },
            ],
        }
    }

    fn plain() -> ReportOptions {
        ReportOptions::default().with_color(false)
    }

    #[test]
    fn header_has_hash_time_and_module_count() {
        let report = BuildReporter::format(&stats(), &plain()).to_string();
        let header = report.lines().next().unwrap();
        assert_eq!(header, "frontend  Hash: 0123456789abcdef0123  Time: 42ms  Modules: 3");
    }

    #[test]
    fn hidden_modules_are_collapsed() {
        let report = BuildReporter::format(&stats(), &plain()).to_string();
        assert!(report.contains("./static/js/main.js"));
        assert!(!report.contains("button.js"));
        assert!(report.contains("+ 2 hidden modules"));
    }

    #[test]
    fn modules_can_be_turned_off() {
        let options = ReportOptions {
            show_modules: false,
            ..plain()
        };
        let report = BuildReporter::format(&stats(), &options).to_string();
        assert!(report.contains("Modules: 3"));
        assert!(!report.contains("[0]"));
        assert!(!report.contains("hidden"));
    }

    #[test]
    fn cached_assets_only_when_enabled() {
        let report = BuildReporter::format(&stats(), &plain()).to_string();
        assert!(report.contains("frontend.js"));
        assert!(!report.contains("frontend.js.map"));

        let options = ReportOptions {
            show_cached_assets: true,
            ..plain()
        };
        let report = BuildReporter::format(&stats(), &options).to_string();
        assert!(report.contains("frontend.js.map"));
        assert!(report.contains("[cached]"));
    }

    #[test]
    fn reasons_only_when_enabled() {
        let options = ReportOptions {
            show_chunk_reasons: true,
            exclude: Vec::new(),
            ..plain()
        };
        let report = BuildReporter::format(&stats(), &options).to_string();
        assert!(report.contains("require ./app from ./static/js/main.js"));
        assert!(!BuildReporter::format(&stats(), &plain())
            .to_string()
            .contains("require ./app"));
    }

    #[test]
    fn errors_and_warnings_follow_listing() {
        let mut stats = stats();
        stats.errors.push(Diagnostic::at("Module not found: cannot resolve './x'", "./static/js/main.js", Some(4)));
        stats.warnings.push(Diagnostic::new("records file was corrupt"));

        let report = BuildReporter::format(&stats, &plain());
        let lines = report.lines();
        let error_at = lines.iter().position(|l| l == "ERROR in ./static/js/main.js:4").unwrap();
        let warning_at = lines.iter().position(|l| l == "WARNING").unwrap();
        assert!(error_at < warning_at);
        assert_eq!(lines[error_at + 1], "Module not found: cannot resolve './x'");
    }

    #[test]
    fn formatting_is_deterministic() {
        let options = ReportOptions::default().with_color(true);
        assert_eq!(
            BuildReporter::format(&stats(), &options),
            BuildReporter::format(&stats(), &options)
        );
    }

    #[test]
    fn no_color_output_has_no_escapes() {
        let report = BuildReporter::format(&stats(), &plain()).to_string();
        assert!(!report.contains('\u{1b}'));
    }
}
