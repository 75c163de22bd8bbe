//! Run command implementation for the runbox CLI.
//!
//! Compiles and runs a program, printing its output as it arrives. Lines
//! typed on stdin are delivered to the program as interactive input, and
//! Ctrl+C stops it.

use std::io::{BufRead, BufReader};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use runbox_core::{EngineConfig, ExecutionEngine, ExecutionRequest, RunOutcome};
use tokio::sync::mpsc;

use crate::program::ProgramArgs;
use crate::terminal::Terminal;

/// Poll interval while input waits for the program to start reading.
const INPUT_RETRY_INTERVAL: Duration = Duration::from_millis(20);

/// Exit code reported for a cancelled run.
const EXIT_CANCELLED: i32 = 130;

/// Run a program; returns the process exit code to report.
pub async fn execute(
    terminal: Terminal,
    program: ProgramArgs,
    session: Option<String>,
) -> anyhow::Result<i32> {
    let files = program.load_sources()?;
    let session_id = session.unwrap_or_else(|| format!("cli-{}", std::process::id()));

    let engine = Arc::new(ExecutionEngine::new(EngineConfig::from_env())?);
    let sink = Arc::new(terminal.sink()?);

    let request = ExecutionRequest {
        files,
        packages: program.packages,
        language_version: program.edition,
        project_type: program.project_type,
        session_id: Some(session_id.clone()),
        ..Default::default()
    };

    let finished = Arc::new(AtomicBool::new(false));
    let forwarder = tokio::spawn(forward_input(
        terminal,
        engine.clone(),
        session_id.clone(),
        finished.clone(),
    ));

    let interrupt = {
        let engine = engine.clone();
        let session_id = session_id.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupted; stopping {}", session_id);
                engine.stop(&session_id);
            }
        })
    };

    let outcome = engine.run(request, sink).await;
    finished.store(true, Ordering::SeqCst);
    forwarder.abort();
    interrupt.abort();

    Ok(exit_code(&outcome))
}

fn exit_code(outcome: &RunOutcome) -> i32 {
    match outcome {
        RunOutcome::Finished { exit_code } => *exit_code,
        RunOutcome::Cancelled => EXIT_CANCELLED,
        RunOutcome::CompileFailed | RunOutcome::Failed(_) => 1,
    }
}

/// Deliver stdin lines to the session, then signal end of input.
///
/// Input typed while the program is still compiling is held back until the
/// session accepts it.
async fn forward_input(
    terminal: Terminal,
    engine: Arc<ExecutionEngine>,
    session_id: String,
    finished: Arc<AtomicBool>,
) {
    let (tx, mut lines) = mpsc::unbounded_channel::<String>();
    let stdin = terminal.stdin;

    // The terminal read blocks; it is left behind when the run ends.
    std::thread::spawn(move || {
        for line in BufReader::new(stdin).lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });

    while let Some(line) = lines.recv().await {
        if !deliver(&finished, || engine.provide_input(&session_id, &line)).await {
            return;
        }
    }
    deliver(&finished, || engine.close_input(&session_id)).await;
}

/// Retry `attempt` until it succeeds; false if the run ended first.
async fn deliver(finished: &AtomicBool, attempt: impl Fn() -> bool) -> bool {
    loop {
        if attempt() {
            return true;
        }
        if finished.load(Ordering::SeqCst) {
            return false;
        }
        tokio::time::sleep(INPUT_RETRY_INTERVAL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code(&RunOutcome::Finished { exit_code: 0 }), 0);
        assert_eq!(exit_code(&RunOutcome::Finished { exit_code: 101 }), 101);
        assert_eq!(exit_code(&RunOutcome::CompileFailed), 1);
        assert_eq!(exit_code(&RunOutcome::Failed("x".into())), 1);
        assert_eq!(exit_code(&RunOutcome::Cancelled), EXIT_CANCELLED);
    }

    #[tokio::test]
    async fn test_deliver_gives_up_after_finish() {
        let finished = AtomicBool::new(true);
        assert!(!deliver(&finished, || false).await);
        assert!(deliver(&finished, || true).await);
    }
}
