use clap::Parser;
use std::path::PathBuf;

use crate::capabilities::UserRole;

/// Process-level settings. Per-workspace school settings live in the `settings` table.
#[derive(Debug, Parser, Clone)]
#[command(name = "registrard", version, about = "School registrar sidecar (JSON lines over stdio)")]
pub struct Config {
    /// Workspace directory to open at startup, same as a `workspace.select` request.
    #[clap(long, env = "REGISTRARD_WORKSPACE")]
    pub workspace: Option<PathBuf>,

    #[clap(long, env = "REGISTRARD_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Acting role for requests that carry no `role` field.
    #[clap(long, env = "REGISTRARD_DEFAULT_ROLE", default_value = "admin", value_parser = parse_role)]
    pub default_role: UserRole,
}

fn parse_role(s: &str) -> Result<UserRole, String> {
    UserRole::parse(s).ok_or_else(|| format!("unknown role: {s} (admin, registrar, teacher, student)"))
}
