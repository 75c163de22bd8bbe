//! Integration tests for console programs run inside the engine process.
//!
//! These compile real programs, so they need `rustc` in PATH.

use std::sync::Arc;
use std::time::{Duration, Instant};

use runbox_core::{
    CollectingSink, EngineConfig, EventKind, ExecutionEngine, ExecutionRequest, HostPlatform,
    PackageRef, RunOutcome, SourceFile,
};

fn engine() -> ExecutionEngine {
    let temp = std::env::temp_dir().join("runbox-tests");
    let config = EngineConfig {
        temp_root: temp,
        input_timeout: Duration::from_secs(30),
        ..EngineConfig::default()
    };
    ExecutionEngine::new(config)
        .expect("rustc must be available")
        .with_host_platform(HostPlatform::headless())
}

async fn run(engine: &ExecutionEngine, request: ExecutionRequest) -> (RunOutcome, Arc<CollectingSink>) {
    let sink = Arc::new(CollectingSink::new());
    let outcome = engine.run(request, sink.clone()).await;
    (outcome, sink)
}

#[tokio::test]
async fn test_hello_world_streams_output() {
    let engine = engine();
    let request = ExecutionRequest::single_file(
        "main.rs",
        r#"fn main() { println!("Hello from the guest"); }"#,
    );

    let (outcome, sink) = run(&engine, request).await;

    assert_eq!(outcome, RunOutcome::Finished { exit_code: 0 });
    assert!(sink.text(EventKind::Output).contains("Hello from the guest"));
    assert_eq!(sink.completed_count(), 1);
    let last = sink.events().pop().unwrap();
    assert_eq!(last.kind, EventKind::Completed);
    assert_eq!(last.content, "Execution completed");
}

#[tokio::test]
async fn test_empty_request_runs_default_program() {
    let engine = engine();
    let request = ExecutionRequest {
        project_type: "console".to_string(),
        ..Default::default()
    };

    let (outcome, sink) = run(&engine, request).await;

    assert_eq!(outcome, RunOutcome::Finished { exit_code: 0 });
    assert!(sink.text(EventKind::Output).contains("Hello, World!"));
}

#[tokio::test]
async fn test_compile_error_stops_before_execution() {
    let engine = engine();
    let request = ExecutionRequest::single_file(
        "main.rs",
        "fn main() {\n    println!(\"never\");\n    let x: i32 = \"text\";\n}\n",
    );

    let (outcome, sink) = run(&engine, request).await;

    assert_eq!(outcome, RunOutcome::CompileFailed);
    assert!(sink.text(EventKind::Output).is_empty());
    let errors = sink.text(EventKind::Error);
    assert!(errors.contains("main.rs:3:"), "errors: {}", errors);

    // Error events, then exactly one completed, nothing else.
    let events = sink.events();
    let (last, rest) = events.split_last().unwrap();
    assert_eq!(last.kind, EventKind::Completed);
    assert_eq!(last.content, "Compilation error");
    assert!(rest.iter().all(|e| e.kind == EventKind::Error));
}

#[tokio::test]
async fn test_multi_file_program() {
    let engine = engine();
    let request = ExecutionRequest {
        files: vec![
            SourceFile::new("main.rs", "fn main() { println!(\"{}\", math::add(2, 3)); }").entry(),
            SourceFile::new("math.rs", "pub fn add(a: i32, b: i32) -> i32 { a + b }"),
        ],
        project_type: "console".to_string(),
        ..Default::default()
    };

    let (outcome, sink) = run(&engine, request).await;

    assert_eq!(outcome, RunOutcome::Finished { exit_code: 0 });
    assert!(sink.text(EventKind::Output).contains('5'));
}

#[tokio::test]
async fn test_main_returning_err_reports_message() {
    let engine = engine();
    let request = ExecutionRequest::single_file(
        "main.rs",
        r#"fn main() -> Result<(), String> { Err("bad input".to_string()) }"#,
    );

    let (outcome, sink) = run(&engine, request).await;

    assert_eq!(outcome, RunOutcome::Finished { exit_code: 1 });
    assert!(sink.text(EventKind::Error).contains("Error: \"bad input\""));
    assert_eq!(sink.completed_count(), 1);
}

#[tokio::test]
async fn test_exit_code_main_sets_status() {
    let engine = engine();
    let request = ExecutionRequest::single_file(
        "main.rs",
        r#"
use std::process::ExitCode;

fn main() -> ExitCode {
    println!("hi");
    ExitCode::from(3)
}
"#,
    );

    let (outcome, sink) = run(&engine, request).await;

    assert_eq!(outcome, RunOutcome::Finished { exit_code: 3 });
    assert!(sink.text(EventKind::Output).contains("hi"));
    assert!(sink.text(EventKind::Error).is_empty());
    assert_eq!(sink.completed_count(), 1);
}

#[tokio::test]
async fn test_result_of_exit_code_main() {
    let engine = engine();
    let request = ExecutionRequest::single_file(
        "main.rs",
        r#"
use std::process::ExitCode;

fn main() -> Result<ExitCode, String> {
    Ok(ExitCode::SUCCESS)
}
"#,
    );

    let (outcome, _sink) = run(&engine, request).await;

    assert_eq!(outcome, RunOutcome::Finished { exit_code: 0 });
}

#[tokio::test]
async fn test_unsupported_main_return_type_points_at_main() {
    let engine = engine();
    let request = ExecutionRequest::single_file("main.rs", "fn main() -> u8 {
    0
}
");

    let (outcome, sink) = run(&engine, request).await;

    assert_eq!(outcome, RunOutcome::CompileFailed);
    let errors = sink.text(EventKind::Error);
    assert!(errors.contains("generated entry point"), "errors: {}", errors);
    assert!(!errors.contains("main.rs:2"), "errors: {}", errors);
}

#[tokio::test]
async fn test_panic_reports_execution_error() {
    let engine = engine();
    let request = ExecutionRequest::single_file("main.rs", r#"fn main() { panic!("kaboom"); }"#);

    let (outcome, sink) = run(&engine, request).await;

    assert_eq!(outcome, RunOutcome::Failed("kaboom".to_string()));
    assert!(sink.text(EventKind::Error).contains("Execution error: kaboom"));
    assert_eq!(sink.completed_count(), 1);
}

#[tokio::test]
async fn test_argument_vector_entry_gets_placeholder() {
    let engine = engine();
    let request = ExecutionRequest::single_file(
        "main.rs",
        r#"fn main(args: Vec<String>) { println!("args={}", args.len()); }"#,
    );

    let (outcome, sink) = run(&engine, request).await;

    assert_eq!(outcome, RunOutcome::Finished { exit_code: 0 });
    assert!(sink.text(EventKind::Output).contains("args=0"));
}

#[tokio::test]
async fn test_missing_entry_point_is_reported() {
    let engine = engine();
    let request = ExecutionRequest::single_file("main.rs", "pub fn helper() {}");

    let (outcome, sink) = run(&engine, request).await;

    assert!(matches!(outcome, RunOutcome::Failed(_)));
    assert!(sink.text(EventKind::Error).contains("No entry point found"));
    assert!(sink.text(EventKind::Output).is_empty());
}

#[tokio::test]
async fn test_unknown_edition_fails_before_compiling() {
    let engine = engine();
    let mut request = ExecutionRequest::single_file("main.rs", "fn main() {}");
    request.language_version = Some("1999".to_string());

    let (outcome, sink) = run(&engine, request).await;

    assert!(matches!(outcome, RunOutcome::Failed(_)));
    assert!(sink.text(EventKind::Error).contains("1999"));
    assert_eq!(sink.completed_count(), 1);
}

#[tokio::test]
async fn test_gui_program_on_headless_host_fails_fast() {
    let engine = engine();
    let request = ExecutionRequest::single_file(
        "main.rs",
        "use eframe::egui;\nfn main() { eframe::run_native(); }",
    );

    let (outcome, sink) = run(&engine, request).await;

    match outcome {
        RunOutcome::Failed(message) => assert!(message.contains("desktop GUI"), "{}", message),
        other => panic!("expected failure, got {:?}", other),
    }
    // Rejected before compilation: no diagnostics about the missing crate.
    assert!(!sink.text(EventKind::Error).contains("eframe"));
}

#[tokio::test]
async fn test_unresolvable_package_fails_before_compiling() {
    let engine = engine();
    let mut request = ExecutionRequest::single_file("main.rs", "fn main() {}");
    request.packages.push(PackageRef::new("definitely-not-here", "1.0"));

    let (outcome, sink) = run(&engine, request).await;

    assert!(matches!(outcome, RunOutcome::Failed(_)));
    assert!(sink.text(EventKind::Error).contains("definitely-not-here"));
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let engine = engine();
    let request = ExecutionRequest::single_file("main.rs", "fn main() { println!(\"ran\"); }");
    request.abort.abort();

    let (outcome, sink) = run(&engine, request).await;

    assert_eq!(outcome, RunOutcome::Cancelled);
    assert!(sink.text(EventKind::Output).is_empty());
    assert_eq!(sink.events().pop().unwrap().content, "Execution cancelled");
}

#[cfg(unix)]
#[tokio::test]
async fn test_standard_streams_restored_after_runs() {
    fn identity(fd: i32) -> (u64, u64) {
        let mut stat: libc::stat = unsafe { std::mem::zeroed() };
        assert_eq!(unsafe { libc::fstat(fd, &mut stat) }, 0);
        (stat.st_dev as u64, stat.st_ino as u64)
    }

    let engine = engine();
    let before: Vec<_> = (0..3).map(identity).collect();

    let ok = ExecutionRequest::single_file("main.rs", r#"fn main() { println!("one"); }"#);
    let (outcome, _) = run(&engine, ok).await;
    assert_eq!(outcome, RunOutcome::Finished { exit_code: 0 });
    assert_eq!((0..3).map(identity).collect::<Vec<_>>(), before);

    let failing = ExecutionRequest::single_file("main.rs", r#"fn main() { panic!("two"); }"#);
    let (outcome, _) = run(&engine, failing).await;
    assert!(matches!(outcome, RunOutcome::Failed(_)));
    assert_eq!((0..3).map(identity).collect::<Vec<_>>(), before);
}

const ECHO_PROGRAM: &str = r#"
fn main() {
    let mut line = String::new();
    std::io::stdin().read_line(&mut line).unwrap();
    println!("got {}", line.trim());
}
"#;

/// Wait until the session accepts input, i.e. the run has attached its reader.
async fn provide_when_ready(engine: &ExecutionEngine, session: &str, text: &str) {
    let deadline = Instant::now() + Duration::from_secs(120);
    while !engine.provide_input(session, text) {
        assert!(Instant::now() < deadline, "session {} never accepted input", session);
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::test]
async fn test_interactive_input_reaches_guest() {
    let engine = Arc::new(engine());
    let sink = Arc::new(CollectingSink::new());
    let request = ExecutionRequest::single_file("main.rs", ECHO_PROGRAM).with_session("echo-1");

    let task = {
        let engine = engine.clone();
        let sink = sink.clone();
        tokio::spawn(async move { engine.run(request, sink).await })
    };
    provide_when_ready(&engine, "echo-1", "hello").await;

    let outcome = task.await.unwrap();
    assert_eq!(outcome, RunOutcome::Finished { exit_code: 0 });
    assert!(sink.text(EventKind::Output).contains("got hello"));
    // Session removed on completion.
    assert!(!engine.sessions().contains("echo-1"));
    assert!(!engine.provide_input("echo-1", "late"));
}

#[tokio::test]
async fn test_stop_succeeds_at_most_once() {
    let engine = Arc::new(engine());
    let sink = Arc::new(CollectingSink::new());
    let request = ExecutionRequest::single_file("main.rs", ECHO_PROGRAM).with_session("echo-2");

    let task = {
        let engine = engine.clone();
        let sink = sink.clone();
        tokio::spawn(async move { engine.run(request, sink).await })
    };

    let deadline = Instant::now() + Duration::from_secs(120);
    while !engine.sessions().contains("echo-2") {
        assert!(Instant::now() < deadline);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(engine.stop("echo-2"));
    assert!(!engine.stop("echo-2"));

    let outcome = task.await.unwrap();
    // Stopped while compiling or while blocked on input: either way cancelled.
    assert_eq!(outcome, RunOutcome::Cancelled);
    assert_eq!(sink.completed_count(), 1);
}

#[tokio::test]
async fn test_without_session_stdin_reads_eof() {
    let engine = engine();
    let request = ExecutionRequest::single_file(
        "main.rs",
        r#"
fn main() {
    let mut line = String::new();
    let n = std::io::stdin().read_line(&mut line).unwrap();
    println!("read {} bytes", n);
}
"#,
    );

    let (outcome, sink) = run(&engine, request).await;

    assert_eq!(outcome, RunOutcome::Finished { exit_code: 0 });
    assert!(sink.text(EventKind::Output).contains("read 0 bytes"));
}

#[tokio::test]
async fn test_unread_input_does_not_block_completion() {
    let engine = Arc::new(engine());
    let sink = Arc::new(CollectingSink::new());
    let request = ExecutionRequest::single_file(
        "main.rs",
        r#"
fn main() {
    std::thread::sleep(std::time::Duration::from_millis(1500));
    println!("done");
}
"#,
    )
    .with_session("flood-1");

    let task = {
        let engine = engine.clone();
        let sink = sink.clone();
        tokio::spawn(async move { engine.run(request, sink).await })
    };
    let line = "x".repeat(1024);
    provide_when_ready(&engine, "flood-1", &line).await;
    for _ in 0..200 {
        engine.provide_input("flood-1", &line);
    }

    let outcome = tokio::time::timeout(Duration::from_secs(60), task)
        .await
        .expect("run hung with unread input")
        .unwrap();
    assert_eq!(outcome, RunOutcome::Finished { exit_code: 0 });
    assert!(sink.text(EventKind::Output).contains("done"));
    assert_eq!(sink.completed_count(), 1);
}
