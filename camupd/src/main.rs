use std::io::BufRead;
use std::process::ExitCode;

use anyhow::Context;
use camupd::agent::Agent;
use camupd::config::AgentConfig;
use camupd::storage::TokenStorage;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CliMode {
    Run,
    Logout,
    SaveToken,
    Help,
}

fn parse_cli_mode<I>(args: I) -> anyhow::Result<CliMode>
where
    I: IntoIterator<Item = String>,
{
    let mut mode = CliMode::Run;
    for arg in args.into_iter().skip(1) {
        match arg.as_str() {
            "--logout" => mode = CliMode::Logout,
            "--save-token" => mode = CliMode::SaveToken,
            "--help" | "-h" => mode = CliMode::Help,
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }
    Ok(mode)
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("camupd=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn read_token_from_stdin() -> anyhow::Result<String> {
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read token from stdin")?;
    let token = line.trim();
    if token.is_empty() {
        anyhow::bail!("no token given on stdin");
    }
    Ok(token.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();
    init_tracing();
    match parse_cli_mode(std::env::args())? {
        CliMode::Logout => {
            TokenStorage::new()?.delete_token()?;
            eprintln!("[camupd] saved token removed");
            return Ok(ExitCode::SUCCESS);
        }
        CliMode::SaveToken => {
            let token = read_token_from_stdin()?;
            TokenStorage::new()?.save_token(&token)?;
            eprintln!("[camupd] token saved");
            return Ok(ExitCode::SUCCESS);
        }
        CliMode::Help => {
            println!("Usage: camupd [--logout | --save-token]");
            println!("  --logout       Remove saved OAuth token and exit");
            println!("  --save-token   Read an OAuth token from stdin and save it");
            return Ok(ExitCode::SUCCESS);
        }
        CliMode::Run => {}
    }
    let config = AgentConfig::from_env()?;
    let outcome = Agent::new(config).run_once().await;
    Ok(if outcome.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
