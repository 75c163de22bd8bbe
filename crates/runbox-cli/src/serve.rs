//! Serve command implementation for the runbox CLI.
//!
//! Starts the HTTP and WebSocket server in front of the execution engine.

use runbox_core::EngineConfig;
use runbox_server::ServerConfig;

use crate::colors;

/// Start the server and block until Ctrl+C.
pub async fn execute(host: String, port: u16) -> anyhow::Result<()> {
    let engine_config = EngineConfig::from_env();
    let config = ServerConfig { host, port };

    println!("\n{}runbox server{}", colors::BOLD, colors::RESET);
    println!("{}", "─".repeat(50));
    println!(
        "{}  ◆ Server:{} http://{}:{}",
        colors::CYAN,
        colors::RESET,
        config.host,
        config.port
    );
    println!(
        "{}  ◆ WebSocket:{} ws://{}:{}/ws",
        colors::CYAN,
        colors::RESET,
        config.host,
        config.port
    );
    println!(
        "{}  ◆ Sandboxes:{} {}",
        colors::CYAN,
        colors::RESET,
        engine_config.temp_root.display()
    );
    println!("{}", "─".repeat(50));
    println!("{}Press Ctrl+C to stop{}", colors::GREEN, colors::RESET);
    println!();

    runbox_server::serve(engine_config, config).await?;

    Ok(())
}
