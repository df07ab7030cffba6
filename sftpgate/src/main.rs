//! Forced-command entry point.
//!
//! Meant to run as an SSH forced command: the SSH host parses nothing, it
//! just hands us `SSH_ORIGINAL_COMMAND` and a stdin/stdout byte stream.
//! All logging goes to stderr; stdout belongs to the wire.

use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(clap::Parser)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    /// Enable per-packet debug logging
    #[clap(long)]
    debug: bool,

    /// Only allow read access to the virtual file system
    #[clap(long)]
    read_only: bool,

    /// Maximum number of concurrently open file handles
    #[clap(long, default_value_t = 64)]
    max_files: usize,

    /// File system backend, as ENGINE or ENGINE:PARAMS (e.g. "local")
    #[clap(long)]
    vfs: String,
}

fn init_logging(debug: bool) {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var(
            "RUST_LOG",
            if debug { "sftpgate=debug" } else { "sftpgate=info" },
        );
    }
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
}

fn parse_vfs(spec: &str) -> (&str, &str) {
    match spec.split_once(':') {
        Some((engine, params)) => (engine, params),
        None => (spec, ""),
    }
}

async fn _main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug);

    sftpgate_vfs::local::register();

    let original_command =
        std::env::var("SSH_ORIGINAL_COMMAND").context("SSH_ORIGINAL_COMMAND is not set")?;
    let mut command_args = original_command.split_whitespace();
    let Some(command) = command_args.next() else {
        bail!("expected a command, got none");
    };

    let (engine, params) = parse_vfs(&cli.vfs);
    let vfs = sftpgate_vfs::open_engine(engine, params)
        .map_err(|err| anyhow::anyhow!("opening vfs engine '{engine}': {err}"))?;

    let command_name = Path::new(command)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    if command_name != "sftp-server" {
        bail!("unsupported command: {original_command}");
    }

    let options = sftpgate_server::SessionOptions {
        debug: cli.debug,
        max_files: cli.max_files,
        write_access: !cli.read_only,
    };
    let result = sftpgate_server::serve(options, vfs.clone(), tokio::io::stdin(), tokio::io::stdout()).await;
    let _ = vfs.close().await;
    result
}

#[tokio::main]
async fn main() {
    if let Err(err) = _main().await {
        error!(error = %err, "fatal error");
        std::process::exit(1);
    }
}
