//! Per-pass build results.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The outcome of one build pass.
///
/// Created fresh for every pass and never mutated; the next pass supersedes
/// it rather than merging into it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildStats {
    pub target_name: String,
    /// Content hash of the emitted assets. Empty when no pass ran.
    pub hash: String,
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
    pub module_count: usize,
    pub timing_ms: u64,
    #[serde(default)]
    pub modules: Vec<ModuleStats>,
    #[serde(default)]
    pub assets: Vec<AssetStats>,
}

impl BuildStats {
    /// Stats for a pass that could not run, carrying the failure as its only
    /// error.
    pub fn from_failure(target_name: impl Into<String>, message: impl Into<String>, timing_ms: u64) -> Self {
        Self {
            target_name: target_name.into(),
            hash: String::new(),
            errors: vec![Diagnostic::new(message)],
            warnings: Vec::new(),
            module_count: 0,
            timing_ms,
            modules: Vec::new(),
            assets: Vec::new(),
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// A compile error or warning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub message: String,
    pub file: Option<String>,
    pub line: Option<u32>,
}

impl Diagnostic {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            file: None,
            line: None,
        }
    }

    pub fn at(message: impl Into<String>, file: impl Into<String>, line: Option<u32>) -> Self {
        Self {
            message: message.into(),
            file: Some(file.into()),
            line,
        }
    }

    /// `file:line` when known.
    pub fn location(&self) -> Option<String> {
        self.file.as_ref().map(|file| match self.line {
            Some(line) => format!("{file}:{line}"),
            None => file.clone(),
        })
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location() {
            Some(location) => write!(f, "{location}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleStats {
    pub id: u32,
    /// Path relative to the project root, `./`-prefixed.
    pub name: String,
    pub size: usize,
    /// Unchanged since the previous pass of the same target.
    pub cached: bool,
    pub loaders: Vec<String>,
    pub reasons: Vec<ModuleReason>,
}

/// Why a module was included: the importing module and the request it made.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleReason {
    pub module: String,
    pub request: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetStats {
    pub name: String,
    pub size: usize,
    /// Identical to what was already on disk, so not rewritten.
    pub cached: bool,
    pub emitted: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_stats_carry_message() {
        let stats = BuildStats::from_failure("backend", "entry module not found: server/main.js", 3);
        assert!(stats.has_errors());
        assert!(!stats.is_success());
        assert_eq!(stats.hash, "");
        assert_eq!(stats.errors[0].message, "entry module not found: server/main.js");
    }

    #[test]
    fn diagnostic_display() {
        assert_eq!(
            Diagnostic::at("Module not found", "./a.js", Some(3)).to_string(),
            "./a.js:3: Module not found"
        );
        assert_eq!(Diagnostic::new("boom").to_string(), "boom");
    }
}
