//! codecraft server entry point.
//!
//! Usage:
//!   codecraft                          # Serve with ~/.config/codecraft/server.toml
//!   codecraft --config <path>          # Serve with an explicit config file
//!   codecraft --listen 127.0.0.1:9000  # Override the bind address

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use codecraft_kernel::KernelConfig;
use codecraft_server::Server;

/// CraftLang recursion runs on the runtime's blocking threads.
const THREAD_STACK_SIZE: usize = 8 * 1024 * 1024;

fn main() -> ExitCode {
    // RUST_LOG wins; otherwise our crates at info.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("codecraft=info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:?}");
            ExitCode::FAILURE
        }
    }
}

#[derive(Debug, Default)]
struct Options {
    config: Option<PathBuf>,
    listen: Option<String>,
    workspace: Option<PathBuf>,
}

fn run() -> Result<ExitCode> {
    let args: Vec<String> = env::args().skip(1).collect();

    match args.first().map(|s| s.as_str()) {
        Some("--help" | "-h") => {
            print_help();
            return Ok(ExitCode::SUCCESS);
        }
        Some("--version" | "-V") => {
            println!("codecraft {}", env!("CARGO_PKG_VERSION"));
            return Ok(ExitCode::SUCCESS);
        }
        _ => {}
    }

    let options = parse_options(&args)?;
    let mut config = match &options.config {
        Some(path) => KernelConfig::load_from(path)?.with_env_overrides(),
        None => KernelConfig::load()?,
    };
    if let Some(listen) = options.listen {
        config = config.with_listen(listen);
    }
    if let Some(dir) = options.workspace {
        config = config.with_workspace_dir(dir);
    }

    std::fs::create_dir_all(&config.workspace_dir).with_context(|| {
        format!(
            "Failed to create workspace {}",
            config.workspace_dir.display()
        )
    })?;

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_stack_size(THREAD_STACK_SIZE)
        .build()
        .context("Failed to start runtime")?;

    rt.block_on(async {
        let server = Arc::new(Server::new(config));
        let listener = server.bind().await?;
        tokio::select! {
            result = server.serve(listener) => result,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted, shutting down");
                Ok(())
            }
        }
    })?;

    Ok(ExitCode::SUCCESS)
}

fn parse_options(args: &[String]) -> Result<Options> {
    let mut options = Options::default();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        let (flag, inline) = match arg.split_once('=') {
            Some((flag, value)) => (flag, Some(value.to_string())),
            None => (arg.as_str(), None),
        };
        let mut value = || -> Result<String> {
            match &inline {
                Some(v) => Ok(v.clone()),
                None => iter
                    .next()
                    .cloned()
                    .with_context(|| format!("{flag} requires a value")),
            }
        };
        match flag {
            "--config" => options.config = Some(PathBuf::from(value()?)),
            "--listen" => options.listen = Some(value()?),
            "--workspace" => options.workspace = Some(PathBuf::from(value()?)),
            unknown => bail!("Unknown option: {unknown}\nRun 'codecraft --help' for usage."),
        }
    }

    Ok(options)
}

fn print_help() {
    println!(
        r#"codecraft v{}

Usage:
  codecraft [OPTIONS]

Options:
  --config <path>       Config file (default: ~/.config/codecraft/server.toml)
  --listen <addr>       Bind address (default: 0.0.0.0:9000)
  --workspace <dir>     Scratch directory for source files (default: ./workspace)
  -h, --help            Show this help
  -V, --version         Show version

Environment:
  AGENT_AUTH_TOKEN      Shared secret hardware agents must present
  RUST_LOG              Log filter (default: codecraft=info)

Browsers connect on ws://<addr>/, hardware agents on ws://<addr>/agent.
"#,
        env!("CARGO_PKG_VERSION")
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn options_accept_both_spellings() {
        let options =
            parse_options(&args(&["--listen", "127.0.0.1:1", "--workspace=/tmp/ws"])).expect("parse");
        assert_eq!(options.listen.as_deref(), Some("127.0.0.1:1"));
        assert_eq!(options.workspace, Some(PathBuf::from("/tmp/ws")));
        assert_eq!(options.config, None);
    }

    #[test]
    fn missing_value_is_an_error() {
        let err = parse_options(&args(&["--config"])).unwrap_err();
        assert!(err.to_string().contains("--config requires a value"));
    }

    #[test]
    fn unknown_flag_is_an_error() {
        assert!(parse_options(&args(&["--verbose"])).is_err());
    }
}
