//! runbox CLI - compile and run Rust programs, serve the engine, publish binaries.

mod colors;
mod program;
mod publish;
mod run;
mod serve;
mod terminal;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use program::ProgramArgs;
use terminal::Terminal;

#[derive(Parser)]
#[command(name = "runbox")]
#[command(about = "Compile and run Rust programs in a sandboxed engine")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile and run a program, forwarding stdin as interactive input
    Run {
        #[command(flatten)]
        program: ProgramArgs,

        /// Session id for the run
        #[arg(long)]
        session: Option<String>,
    },

    /// Start the HTTP and WebSocket server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Address to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },

    /// Build a program as a standalone executable and zip it
    Publish {
        #[command(flatten)]
        program: ProgramArgs,

        /// Name of the published executable and archive
        #[arg(short, long, default_value = "app")]
        output: String,

        /// Target triple (defaults to the host)
        #[arg(long)]
        target: Option<String>,

        /// Directory the archive is copied to
        #[arg(long, default_value = ".")]
        dest: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Taken before any run can redirect the standard streams.
    let terminal = Terminal::detach()?;

    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::DEBUG.into())
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(terminal.log_writer()?)
        .init();

    match cli.command {
        Commands::Run { program, session } => {
            let code = run::execute(terminal, program, session).await?;
            if code != 0 {
                std::process::exit(code);
            }
        }

        Commands::Serve { port, host } => {
            serve::execute(host, port).await?;
        }

        Commands::Publish {
            program,
            output,
            target,
            dest,
        } => {
            publish::execute(&terminal, program, output, target, &dest).await?;
        }
    }

    Ok(())
}
