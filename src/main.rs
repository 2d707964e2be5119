mod audit;
mod calc;
mod calendar;
mod capabilities;
mod config;
mod curriculum;
mod db;
mod domain;
mod enrollment;
mod error;
mod exports;
mod gradebook;
mod imports;
mod ipc;
mod logging;
mod portal;
mod reports;
mod sections;
mod settings;
mod sheet;
mod students;
mod teachers;
mod users;

use clap::Parser;
use serde_json::json;
use std::io::{self, BufRead, Write};

fn main() {
    let config = config::Config::parse();
    logging::init_tracing(&config.log_level);

    let mut state = ipc::AppState::new(config.default_role);
    if let Some(path) = config.workspace.clone() {
        // A bad startup workspace leaves the daemon up; the host can still select another.
        if let Err(e) = ipc::select_workspace(&mut state, path) {
            tracing::error!(error = %e, "could not open startup workspace");
        }
    }
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        default_role = config.default_role.as_str(),
        "registrard ready"
    );

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(error = %e, "stdin closed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // No id to echo back.
                tracing::warn!(error = %e, "unparsable request line");
                let resp = json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                });
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
}
