use std::process::ExitCode;

use stream_bridge::cli;

#[tokio::main]
async fn main() -> ExitCode {
    // Main entrypoint simply delegates control to CLI layer.
    // The CLI parses user arguments, installs tracing and then calls into the runtime.
    cli::cli::run().await
}
