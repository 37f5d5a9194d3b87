//! The default compiler.
//!
//! `BundleCompiler` walks a target's dependency graph, emits one bundle per
//! target and keeps a little state between passes of the same target: the
//! sources it saw last time (to mark unchanged modules as cached) and the
//! module id records.

mod emit;
mod graph;
mod records;

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use gaffer_config::BuildTarget;
use parking_lot::Mutex;

pub use records::Records;

use crate::compiler::{Compiler, CompilerError};
use crate::stats::{AssetStats, BuildStats, Diagnostic, ModuleStats};
use emit::EmittedAsset;
use graph::SourceCache;

#[derive(Clone, Default)]
pub struct BundleCompiler {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    states: Mutex<HashMap<String, TargetState>>,
}

#[derive(Default)]
struct TargetState {
    sources: SourceCache,
    records: Option<Records>,
}

impl BundleCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run one pass synchronously on the current thread.
    pub fn compile_blocking(&self, target: &BuildTarget) -> Result<BuildStats, CompilerError> {
        let started = Instant::now();

        if target.entry_points.is_empty() {
            return Err(CompilerError::InvalidTarget {
                target: target.name.clone(),
                reason: "no entry points".to_string(),
            });
        }
        if let Some(missing) = target.entry_points.iter().find(|entry| !entry.is_file()) {
            return Err(CompilerError::EntryNotFound(missing.clone()));
        }

        // taken out of the map so other targets are not blocked while we build
        let mut state = self
            .inner
            .states
            .lock()
            .remove(&target.name)
            .unwrap_or_default();

        let mut warnings = Vec::new();
        let mut records = match (state.records.take(), &target.records_path) {
            (Some(records), _) => records,
            (None, Some(path)) => {
                let (records, problem) = Records::load(path);
                if let Some(problem) = problem {
                    warnings.push(Diagnostic::new(problem));
                }
                records
            }
            (None, None) => Records::default(),
        };
        let records_before = records.clone();

        let graph = graph::walk(target, &mut state.sources);
        let ids: HashMap<PathBuf, u32> = graph
            .modules
            .values()
            .map(|module| (module.path.clone(), records.id_for(&module.name)))
            .collect();

        let assets = emit::emit(target, &graph, &ids);
        let hash = emit::content_hash(&assets);

        let errors = graph.errors.clone();
        warnings.extend(graph.warnings.iter().cloned());

        let asset_stats = if !errors.is_empty() && target.no_errors() {
            tracing::debug!(target_name = %target.name, "skipping emit, build has errors");
            assets
                .iter()
                .map(|asset| AssetStats {
                    name: asset.name.clone(),
                    size: asset.content.len(),
                    cached: false,
                    emitted: false,
                })
                .collect()
        } else {
            let result = assets
                .iter()
                .map(|asset| write_asset(target, asset))
                .collect::<Result<Vec<_>, _>>();
            match result {
                Ok(stats) => stats,
                Err(err) => {
                    self.inner.states.lock().insert(target.name.clone(), state);
                    return Err(err);
                }
            }
        };

        if let Some(path) = &target.records_path {
            if records != records_before || !path.exists() {
                if let Err(err) = records.save(path) {
                    warnings.push(Diagnostic::new(format!(
                        "cannot write records file {}: {err}",
                        path.display()
                    )));
                }
            }
        }

        let mut modules: Vec<ModuleStats> = graph
            .modules
            .values()
            .map(|module| ModuleStats {
                id: ids.get(&module.path).copied().unwrap_or_default(),
                name: module.name.clone(),
                size: module.source.len(),
                cached: module.cached,
                loaders: module.loaders.clone(),
                reasons: module.reasons.clone(),
            })
            .collect();
        modules.sort_by_key(|module| module.id);

        state.records = Some(records);
        self.inner.states.lock().insert(target.name.clone(), state);

        let stats = BuildStats {
            target_name: target.name.clone(),
            hash,
            errors,
            warnings,
            module_count: modules.len(),
            timing_ms: started.elapsed().as_millis() as u64,
            modules,
            assets: asset_stats,
        };
        tracing::debug!(
            target_name = %stats.target_name,
            hash = %stats.hash,
            modules = stats.module_count,
            errors = stats.errors.len(),
            "compiled target"
        );
        Ok(stats)
    }
}

#[async_trait]
impl Compiler for BundleCompiler {
    async fn compile(&self, target: Arc<BuildTarget>) -> Result<BuildStats, CompilerError> {
        let compiler = self.clone();
        tokio::task::spawn_blocking(move || compiler.compile_blocking(&target))
            .await
            .map_err(|e| CompilerError::Task(e.to_string()))?
    }
}

/// Write an asset unless the file on disk already has the same content.
fn write_asset(target: &BuildTarget, asset: &EmittedAsset) -> Result<AssetStats, CompilerError> {
    let path = target.output_path.join(&asset.name);
    let unchanged = fs::read(&path)
        .map(|existing| existing == asset.content.as_bytes())
        .unwrap_or(false);

    if !unchanged {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| CompilerError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(&path, &asset.content).map_err(|source| CompilerError::Write {
            path: path.clone(),
            source,
        })?;
    }

    Ok(AssetStats {
        name: asset.name.clone(),
        size: asset.content.len(),
        cached: unchanged,
        emitted: !unchanged,
    })
}
