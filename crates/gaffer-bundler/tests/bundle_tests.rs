use std::fs;
use std::path::Path;
use std::sync::Arc;

use gaffer_bundler::{BundleCompiler, Compiler, CompilerError};
use gaffer_config::{BuildTarget, Mode, ProjectConfig};
use tempfile::TempDir;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn target(root: &Path, mode: Mode, toml: &str) -> Arc<BuildTarget> {
    let project = ProjectConfig::from_toml_str(toml, &root.join("gaffer.toml")).unwrap();
    project.resolve(mode, root).unwrap().single("app").unwrap()
}

const APP: &str = r#"
presets = false

[targets.app]
entry = "src/main.js"
output = { path = "out", filename = "app.js" }
records_path = "out/_records"
"#;

fn app_sources(root: &Path) {
    write(root, "src/main.js", "var util = require('./util');\nutil.run();\n");
    write(root, "src/util.js", "exports.run = function () { return 1; };\n");
}

#[tokio::test]
async fn repeated_builds_have_stable_hash_and_cached_assets() {
    let dir = TempDir::new().unwrap();
    app_sources(dir.path());
    let target = target(dir.path(), Mode::Development, APP);
    let compiler = BundleCompiler::new();

    let first = compiler.compile(target.clone()).await.unwrap();
    assert!(first.is_success(), "{:?}", first.errors);
    assert_eq!(first.module_count, 2);
    assert_eq!(first.hash.len(), 20);
    assert!(first.assets.iter().all(|a| a.emitted && !a.cached));
    assert!(first.modules.iter().all(|m| !m.cached));

    let second = compiler.compile(target).await.unwrap();
    assert_eq!(first.hash, second.hash);
    assert!(second.assets.iter().all(|a| a.cached && !a.emitted));
    assert!(second.modules.iter().all(|m| m.cached));
}

#[tokio::test]
async fn changed_source_changes_hash_and_uncaches_module() {
    let dir = TempDir::new().unwrap();
    app_sources(dir.path());
    let target = target(dir.path(), Mode::Development, APP);
    let compiler = BundleCompiler::new();

    let first = compiler.compile(target.clone()).await.unwrap();
    write(dir.path(), "src/util.js", "exports.run = function () { return 2; };\n");
    let second = compiler.compile(target).await.unwrap();

    assert_ne!(first.hash, second.hash);
    let util = second.modules.iter().find(|m| m.name == "./src/util.js").unwrap();
    let main = second.modules.iter().find(|m| m.name == "./src/main.js").unwrap();
    assert!(!util.cached);
    assert!(main.cached);
}

#[tokio::test]
async fn unresolved_import_is_reported_in_stats() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "src/main.js", "require('./missing');\n");
    let target = target(dir.path(), Mode::Development, APP);

    let stats = BundleCompiler::new().compile(target).await.unwrap();
    assert_eq!(stats.errors.len(), 1);
    let error = &stats.errors[0];
    assert!(error.message.contains("cannot resolve './missing'"), "{}", error.message);
    assert_eq!(error.file.as_deref(), Some("./src/main.js"));
    assert_eq!(error.line, Some(1));
}

#[tokio::test]
async fn missing_entry_is_a_structural_failure() {
    let dir = TempDir::new().unwrap();
    let target = target(dir.path(), Mode::Development, APP);

    let err = BundleCompiler::new().compile(target).await.unwrap_err();
    assert!(matches!(err, CompilerError::EntryNotFound(path) if path.ends_with("src/main.js")));
}

#[tokio::test]
async fn records_keep_module_ids_across_compilers() {
    let dir = TempDir::new().unwrap();
    app_sources(dir.path());
    let target = target(dir.path(), Mode::Development, APP);

    let first = BundleCompiler::new().compile(target.clone()).await.unwrap();
    assert!(dir.path().join("out/_records").is_file());

    // a fresh compiler only knows the ids from the records file
    write(dir.path(), "src/main.js", "var extra = require('./extra');\nvar util = require('./util');\n");
    write(dir.path(), "src/extra.js", "module.exports = 3;\n");
    let second = BundleCompiler::new().compile(target).await.unwrap();

    let id = |stats: &gaffer_bundler::BuildStats, name: &str| {
        stats.modules.iter().find(|m| m.name == name).map(|m| m.id)
    };
    assert_eq!(id(&first, "./src/main.js"), id(&second, "./src/main.js"));
    assert_eq!(id(&first, "./src/util.js"), id(&second, "./src/util.js"));
    assert_eq!(id(&second, "./src/extra.js"), Some(2));
}

#[tokio::test]
async fn corrupt_records_become_a_warning() {
    let dir = TempDir::new().unwrap();
    app_sources(dir.path());
    write(dir.path(), "out/_records", "not json");
    let target = target(dir.path(), Mode::Development, APP);

    let stats = BundleCompiler::new().compile(target).await.unwrap();
    assert!(stats.is_success());
    assert!(stats.warnings.iter().any(|w| w.message.contains("corrupt records")));
}

#[tokio::test]
async fn ignored_requests_are_not_bundled() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "src/main.js", "require('./style.css');\nmodule.exports = 1;\n");
    let target = target(
        dir.path(),
        Mode::Development,
        r#"
presets = false

[targets.app]
entry = "src/main.js"
output = { path = "out", filename = "app.js" }
plugins = [{ name = "ignore", pattern = '\.(css|less)$' }]
"#,
    );

    let stats = BundleCompiler::new().compile(target).await.unwrap();
    assert!(stats.is_success(), "{:?}", stats.errors);
    assert_eq!(stats.module_count, 1);

    let bundle = fs::read_to_string(dir.path().join("out/app.js")).unwrap();
    assert!(bundle.contains(r#"{"./style.css":null}"#));
}

#[tokio::test]
async fn production_applies_defines_and_minify() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "src/main.js",
        "// setup\n\n    if (process.env.NODE_ENV === \"production\") {\n        start();\n    }\n",
    );
    let toml = r#"
presets = false

[targets.app]
entry = "src/main.js"
output = { path = "out", filename = "app.js" }

[profiles.production.targets.app]
plugins = ["minify", { name = "define", "process.env.NODE_ENV" = '"production"' }]
"#;

    let stats = BundleCompiler::new()
        .compile(target(dir.path(), Mode::Production, toml))
        .await
        .unwrap();
    assert!(stats.is_success());

    let bundle = fs::read_to_string(dir.path().join("out/app.js")).unwrap();
    assert!(bundle.contains("if (\"production\" === \"production\") {"));
    assert!(!bundle.contains("// setup"));
    assert!(!bundle.contains("    start();"));

    let dev_dir = TempDir::new().unwrap();
    write(dev_dir.path(), "src/main.js", "if (process.env.NODE_ENV) {}\n");
    BundleCompiler::new()
        .compile(target(dev_dir.path(), Mode::Development, toml))
        .await
        .unwrap();
    let bundle = fs::read_to_string(dev_dir.path().join("out/app.js")).unwrap();
    assert!(bundle.contains("process.env.NODE_ENV"));
}

#[tokio::test]
async fn no_errors_plugin_skips_the_write() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "src/main.js", "require('./missing');\n");
    let target = target(
        dir.path(),
        Mode::Development,
        r#"
presets = false

[targets.app]
entry = "src/main.js"
output = { path = "out", filename = "app.js" }
plugins = ["no-errors"]
"#,
    );

    let stats = BundleCompiler::new().compile(target).await.unwrap();
    assert!(stats.has_errors());
    assert!(stats.assets.iter().all(|a| !a.emitted));
    assert!(!dir.path().join("out/app.js").exists());
}

#[tokio::test]
async fn file_type_without_rule_is_an_error() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "src/main.js", "require('./data.yaml');\n");
    write(dir.path(), "src/data.yaml", "a: 1\n");
    let target = target(dir.path(), Mode::Development, APP);

    let stats = BundleCompiler::new().compile(target).await.unwrap();
    assert_eq!(stats.errors.len(), 1);
    assert!(stats.errors[0].message.contains("no module rule matches"));
    assert_eq!(stats.errors[0].file.as_deref(), Some("./src/data.yaml"));
}

#[tokio::test]
async fn external_source_maps_are_written_next_to_bundle() {
    let dir = TempDir::new().unwrap();
    app_sources(dir.path());
    let target = target(
        dir.path(),
        Mode::Development,
        r#"
presets = false

[targets.app]
entry = "src/main.js"
output = { path = "out", filename = "app.js" }
devtool = "source-map"
"#,
    );

    let stats = BundleCompiler::new().compile(target).await.unwrap();
    let names: Vec<_> = stats.assets.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["app.js", "app.js.map"]);

    let bundle = fs::read_to_string(dir.path().join("out/app.js")).unwrap();
    assert!(bundle.trim_end().ends_with("//# sourceMappingURL=app.js.map"));
    let map: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(dir.path().join("out/app.js.map")).unwrap()).unwrap();
    assert_eq!(map["version"], 3);
    assert_eq!(map["sources"][0], "./src/main.js");
}
