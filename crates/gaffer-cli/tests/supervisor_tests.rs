//! Supervisor behavior against real child processes.
#![cfg(unix)]

use std::fs;
use std::path::Path;
use std::time::Duration;

use gaffer_cli::supervisor::{ProcessSupervisor, SpawnError, SupervisorConfig, SupervisorEvent};
use indexmap::IndexMap;
use tempfile::TempDir;
use tokio::sync::broadcast;
use tokio::time::timeout;

fn config(root: &Path, script: &str) -> SupervisorConfig {
    fs::write(root.join("server.sh"), script).unwrap();
    SupervisorConfig {
        interpreter: "sh".to_string(),
        args: Vec::new(),
        script: root.join("server.sh"),
        env: IndexMap::new(),
        watch: vec![root.join("bin")],
        cwd: root.to_path_buf(),
        restart_delay: Duration::ZERO,
    }
}

async fn next_event(events: &mut broadcast::Receiver<SupervisorEvent>) -> SupervisorEvent {
    timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("supervisor event should arrive")
        .unwrap()
}

#[tokio::test]
async fn restart_replaces_the_process() {
    let dir = TempDir::new().unwrap();
    let mut supervisor = ProcessSupervisor::new(config(dir.path(), "sleep 30\n"));
    let mut events = supervisor.subscribe();

    let first = supervisor.start().await.unwrap();
    assert_eq!(first.generation(), 1);
    assert_eq!(first.script_path(), dir.path().join("server.sh"));
    assert_eq!(first.watched_restart_paths(), &[dir.path().join("bin")]);
    let first_pid = first.pid();
    assert!(matches!(next_event(&mut events).await, SupervisorEvent::Started { generation: 1, .. }));

    let second = supervisor.restart().await.unwrap();
    assert_eq!(second.generation(), 2);
    assert!(second.is_alive());
    assert_ne!(second.pid(), first_pid);

    assert_eq!(next_event(&mut events).await, SupervisorEvent::Restarted { previous: 1 });
    assert!(matches!(next_event(&mut events).await, SupervisorEvent::Started { generation: 2, .. }));

    supervisor.shutdown().await;
    assert!(supervisor.current().is_none());
}

#[tokio::test]
async fn exit_is_reported_and_not_restarted() {
    let dir = TempDir::new().unwrap();
    let mut supervisor = ProcessSupervisor::new(config(dir.path(), "exit 3\n"));
    let mut events = supervisor.subscribe();

    supervisor.start().await.unwrap();
    assert!(matches!(next_event(&mut events).await, SupervisorEvent::Started { .. }));
    assert_eq!(
        next_event(&mut events).await,
        SupervisorEvent::Exited {
            generation: 1,
            code: Some(3)
        }
    );

    let quiet = timeout(Duration::from_millis(300), events.recv()).await;
    assert!(quiet.is_err(), "no further events after an exit");
    assert_eq!(supervisor.current().unwrap().generation(), 1);
}

#[tokio::test]
async fn missing_script_is_a_spawn_error() {
    let dir = TempDir::new().unwrap();
    let mut cfg = config(dir.path(), "");
    cfg.script = dir.path().join("build/backend.js");
    let mut supervisor = ProcessSupervisor::new(cfg);

    let err = supervisor.start().await.unwrap_err();
    assert!(matches!(err, SpawnError::ScriptNotFound(path) if path.ends_with("build/backend.js")));
}

#[tokio::test]
async fn missing_interpreter_is_a_spawn_error() {
    let dir = TempDir::new().unwrap();
    let mut cfg = config(dir.path(), "sleep 30\n");
    cfg.interpreter = "gaffer-no-such-interpreter".to_string();

    let err = ProcessSupervisor::new(cfg).start().await.unwrap_err();
    assert!(matches!(err, SpawnError::Spawn { .. }));
}

#[tokio::test]
async fn environment_is_passed_to_the_child() {
    let dir = TempDir::new().unwrap();
    let mut cfg = config(dir.path(), "printf '%s' \"$GAFFER_TEST_VALUE\" > env.txt\nsleep 30\n");
    cfg.env.insert("GAFFER_TEST_VALUE".to_string(), "from-supervisor".to_string());
    let mut supervisor = ProcessSupervisor::new(cfg);

    let process = supervisor.start().await.unwrap();
    assert_eq!(process.environment()["GAFFER_TEST_VALUE"], "from-supervisor");

    let out = dir.path().join("env.txt");
    let content = wait_for_file(&out).await;
    assert_eq!(content, "from-supervisor");
    supervisor.shutdown().await;
}

#[tokio::test]
async fn requests_before_the_task_runs_collapse() {
    let dir = TempDir::new().unwrap();
    let supervisor = ProcessSupervisor::new(config(dir.path(), "sleep 30\n"));
    let mut events = supervisor.subscribe();
    let handle = supervisor.spawn();

    handle.request_restart();
    handle.request_restart();
    handle.request_restart();
    assert!(matches!(next_event(&mut events).await, SupervisorEvent::Started { generation: 1, .. }));
    let quiet = timeout(Duration::from_millis(300), events.recv()).await;
    assert!(quiet.is_err(), "three requests, one start");

    handle.requester().request_restart();
    assert_eq!(next_event(&mut events).await, SupervisorEvent::Restarted { previous: 1 });
    assert!(matches!(next_event(&mut events).await, SupervisorEvent::Started { generation: 2, .. }));

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn requests_during_a_restart_collapse() {
    let dir = TempDir::new().unwrap();
    let mut cfg = config(dir.path(), "sleep 30\n");
    cfg.restart_delay = Duration::from_millis(300);
    let supervisor = ProcessSupervisor::new(cfg);
    let mut events = supervisor.subscribe();
    let handle = supervisor.spawn();

    handle.request_restart();
    assert!(matches!(next_event(&mut events).await, SupervisorEvent::Started { generation: 1, .. }));

    handle.request_restart();
    assert_eq!(next_event(&mut events).await, SupervisorEvent::Restarted { previous: 1 });
    // generation 2 is not up yet
    for _ in 0..3 {
        handle.request_restart();
    }

    assert!(matches!(next_event(&mut events).await, SupervisorEvent::Started { generation: 2, .. }));
    assert_eq!(next_event(&mut events).await, SupervisorEvent::Restarted { previous: 2 });
    assert!(matches!(next_event(&mut events).await, SupervisorEvent::Started { generation: 3, .. }));
    let quiet = timeout(Duration::from_millis(600), events.recv()).await;
    assert!(quiet.is_err(), "three overlapping requests, one restart");

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn handle_stops_on_spawn_failure() {
    let dir = TempDir::new().unwrap();
    let mut cfg = config(dir.path(), "");
    cfg.script = dir.path().join("missing.js");
    let mut handle = ProcessSupervisor::new(cfg).spawn();

    handle.request_restart();
    let err = timeout(Duration::from_secs(5), handle.stopped()).await.unwrap().unwrap_err();
    assert!(matches!(err, SpawnError::ScriptNotFound(_)));
}

async fn wait_for_file(path: &Path) -> String {
    for _ in 0..100 {
        if let Ok(content) = fs::read_to_string(path) {
            if !content.is_empty() {
                return content;
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("{} was never written", path.display());
}
