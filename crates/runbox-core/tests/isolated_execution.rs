//! Integration tests for programs run inside a `runbox-host` child process.
//!
//! Build the host first (`cargo build -p runbox-host`), then run with
//! `--ignored`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use runbox_core::{
    CollectingSink, EngineConfig, EventKind, ExecutionEngine, ExecutionRequest, HostPlatform,
    RunOutcome,
};
use tempfile::TempDir;

fn engine(temp_root: &TempDir) -> ExecutionEngine {
    let config = EngineConfig {
        temp_root: temp_root.path().to_path_buf(),
        ..EngineConfig::default()
    };
    ExecutionEngine::new(config)
        .expect("rustc must be available")
        .with_host_platform(HostPlatform::headless())
}

fn web_request(source: &str) -> ExecutionRequest {
    ExecutionRequest {
        project_type: "web".to_string(),
        ..ExecutionRequest::single_file("main.rs", source)
    }
}

#[tokio::test]
#[ignore = "Requires runbox-host binary"]
async fn test_hosted_program_streams_and_exits() {
    let temp = TempDir::new().unwrap();
    let engine = engine(&temp);
    let sink = Arc::new(CollectingSink::new());

    let outcome = engine
        .run(
            web_request(r#"fn main() { println!("served"); eprintln!("warned"); }"#),
            sink.clone(),
        )
        .await;

    assert_eq!(outcome, RunOutcome::Finished { exit_code: 0 });
    assert!(sink.text(EventKind::Output).contains("served"));
    assert!(sink.text(EventKind::Error).contains("warned"));
    assert_eq!(sink.completed_count(), 1);
    // Sandbox removed during cleanup.
    assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
}

#[tokio::test]
#[ignore = "Requires runbox-host binary"]
async fn test_hosted_program_exit_code_is_reported() {
    let temp = TempDir::new().unwrap();
    let engine = engine(&temp);
    let sink = Arc::new(CollectingSink::new());

    let outcome = engine
        .run(web_request(r#"fn main() { panic!("host side"); }"#), sink.clone())
        .await;

    assert_eq!(outcome, RunOutcome::Finished { exit_code: 101 });
    assert_eq!(
        sink.events().pop().unwrap().content,
        "Process exited with code 101"
    );
}

#[tokio::test]
#[ignore = "Requires runbox-host binary"]
async fn test_child_stdin_receives_session_input() {
    let temp = TempDir::new().unwrap();
    let engine = Arc::new(engine(&temp));
    let sink = Arc::new(CollectingSink::new());
    let request = web_request(
        r#"
fn main() {
    let mut line = String::new();
    std::io::stdin().read_line(&mut line).unwrap();
    println!("echo {}", line.trim());
}
"#,
    )
    .with_session("child-echo");

    let task = {
        let engine = engine.clone();
        let sink = sink.clone();
        tokio::spawn(async move { engine.run(request, sink).await })
    };

    let deadline = Instant::now() + Duration::from_secs(120);
    while !engine.provide_input("child-echo", "ping") {
        assert!(Instant::now() < deadline, "child never accepted input");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let outcome = task.await.unwrap();
    assert_eq!(outcome, RunOutcome::Finished { exit_code: 0 });
    assert!(sink.text(EventKind::Output).contains("echo ping"));
}

#[tokio::test]
#[ignore = "Requires runbox-host binary"]
async fn test_stop_kills_running_host() {
    let temp = TempDir::new().unwrap();
    let engine = Arc::new(engine(&temp));
    let sink = Arc::new(CollectingSink::new());
    let request = web_request(
        r#"
fn main() {
    println!("looping");
    loop {
        std::thread::sleep(std::time::Duration::from_millis(10));
    }
}
"#,
    )
    .with_session("spinner");

    let task = {
        let engine = engine.clone();
        let sink = sink.clone();
        tokio::spawn(async move { engine.run(request, sink).await })
    };

    let deadline = Instant::now() + Duration::from_secs(120);
    while !sink.text(EventKind::Output).contains("looping") {
        assert!(Instant::now() < deadline, "guest never started");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let start = Instant::now();
    assert!(engine.stop("spinner"));
    let outcome = task.await.unwrap();

    assert_eq!(outcome, RunOutcome::Cancelled);
    assert!(start.elapsed() < Duration::from_secs(5));
    assert!(!engine.stop("spinner"));
}

#[cfg(unix)]
#[tokio::test]
#[ignore = "Requires runbox-host binary"]
async fn test_background_children_do_not_outlive_host() {
    let temp = TempDir::new().unwrap();
    let engine = engine(&temp);
    let sink = Arc::new(CollectingSink::new());

    let outcome = engine
        .run(
            web_request(
                r#"
fn main() {
    let child = std::process::Command::new("sleep").arg("30").spawn().unwrap();
    println!("pid={}", child.id());
}
"#,
            ),
            sink.clone(),
        )
        .await;

    assert_eq!(outcome, RunOutcome::Finished { exit_code: 0 });
    let output = sink.text(EventKind::Output);
    let pid: i32 = output
        .trim()
        .strip_prefix("pid=")
        .and_then(|p| p.parse().ok())
        .unwrap_or_else(|| panic!("unexpected output: {output}"));

    // Reparented to init, so it may linger briefly as a zombie.
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let stat = std::fs::read_to_string(format!("/proc/{pid}/stat")).unwrap_or_default();
        let running = stat
            .rsplit(')')
            .next()
            .and_then(|rest| rest.split_whitespace().next())
            .is_some_and(|state| state != "Z" && state != "X");
        if !running {
            break;
        }
        assert!(Instant::now() < deadline, "background child {pid} survived the host");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
