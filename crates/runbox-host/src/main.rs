//! runbox-host - runs one compiled guest program in its own process.
//!
//! Spawned by the isolated runner with piped stdio:
//!
//! ```text
//! runbox-host --assembly <lib> --workingDirectory <dir> --requiresSta <true|false>
//! ```
//!
//! The guest shares this process's standard streams, so its output goes
//! straight to the parent. The exit code is the guest's: 0 on success, 1 when
//! `main` returned `Err`, 101 on panic, 255 when the host itself failed.

use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;

use clap::Parser;
use runbox_core::execute::{GuestOutcome, ModuleContext};

/// Exit code for failures of the host rather than the guest.
const HOST_FAILURE: u8 = 255;

/// Stack size of the guest thread, matching a default main thread.
const GUEST_STACK_SIZE: usize = 8 * 1024 * 1024;

#[derive(Parser, Debug)]
#[command(name = "runbox-host")]
#[command(about = "Execution host for isolated runbox runs")]
#[command(version)]
struct Args {
    /// Compiled guest library
    #[arg(long = "assembly")]
    assembly: PathBuf,

    /// Directory to run in
    #[arg(long = "workingDirectory")]
    working_directory: Option<PathBuf>,

    /// Run the guest on the main thread (GUI toolkits need this)
    #[arg(long = "requiresSta", default_value_t = false, action = clap::ArgAction::Set)]
    requires_sta: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Only warnings, and only on stderr: stdout belongs to the guest.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(args) {
        Ok(outcome) => exit_code(&outcome),
        Err(message) => {
            eprintln!("runbox-host: {}", message);
            ExitCode::from(HOST_FAILURE)
        }
    }
}

fn run(args: Args) -> Result<GuestOutcome, String> {
    if let Some(dir) = &args.working_directory {
        std::env::set_current_dir(dir)
            .map_err(|e| format!("cannot enter {}: {}", dir.display(), e))?;
    }

    let assembly = args
        .assembly
        .canonicalize()
        .map_err(|e| format!("cannot open {}: {}", args.assembly.display(), e))?;
    let context = ModuleContext::from_path(&assembly).map_err(|e| e.to_string())?;

    let outcome = if args.requires_sta {
        context.run()
    } else {
        thread::Builder::new()
            .name("guest-main".to_string())
            .stack_size(GUEST_STACK_SIZE)
            .spawn(move || context.run())
            .map_err(|e| format!("cannot start guest thread: {}", e))?
            .join()
            .map_err(|_| "guest thread panicked".to_string())?
    };
    outcome.map_err(|e| e.to_string())
}

fn exit_code(outcome: &GuestOutcome) -> ExitCode {
    if let GuestOutcome::Failed(message) = outcome {
        eprintln!("{}", message);
    }
    // The guest's own panic hook has already printed the panic message.
    ExitCode::from(outcome.exit_code() as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from([
            "runbox-host",
            "--assembly",
            "/tmp/lib.so",
            "--workingDirectory",
            "/tmp",
            "--requiresSta",
            "true",
        ])
        .unwrap();
        assert_eq!(args.assembly, PathBuf::from("/tmp/lib.so"));
        assert_eq!(args.working_directory, Some(PathBuf::from("/tmp")));
        assert!(args.requires_sta);

        let args = Args::try_parse_from(["runbox-host", "--assembly", "x", "--requiresSta", "false"]).unwrap();
        assert!(!args.requires_sta);
        assert!(args.working_directory.is_none());
    }

    #[test]
    fn test_assembly_is_required() {
        assert!(Args::try_parse_from(["runbox-host"]).is_err());
    }

    #[test]
    fn test_missing_assembly_is_host_failure() {
        let args = Args::try_parse_from(["runbox-host", "--assembly", "/definitely/not/here.so"]).unwrap();
        let err = run(args).unwrap_err();
        assert!(err.contains("cannot open"));
    }
}
