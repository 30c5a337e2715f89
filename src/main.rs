use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use clap::Parser;
use gradebookd::config::Config;
use gradebookd::ipc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gradebookd")]
#[command(about = "Gradebook sidecar: JSON requests on stdin, responses on stdout", long_about = None)]
struct Cli {
    /// Workspace directory holding marks.csv and grading_policy.txt
    #[arg(long, value_name = "DIR")]
    workspace: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // stdout carries protocol lines only; logs go to stderr.
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_ansi(false)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return Err(e.into());
        }
    };
    if cli.workspace.is_some() {
        config.workspace = cli.workspace;
    }
    info!(
        workspace = ?config.workspace,
        exam_scale = ?config.exam_scale,
        letter_scale = ?config.letter_scale,
        "gradebookd starting"
    );

    let mut state = ipc::AppState::new(config);

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // Can't reply without id.
                warn!(error = %e, "unparseable request line");
                let resp = ipc::err("", "bad_json", e.to_string(), None);
                let _ = writeln!(stdout, "{}", resp);
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }

    info!("stdin closed; exiting");
    Ok(())
}
