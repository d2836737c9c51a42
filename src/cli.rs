use std::path::PathBuf;

use clap::{ArgAction, ArgGroup, Parser};

use crate::session::SessionName;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "pysession",
    about = "Run Python code in a restartable interpreter with persistent sessions",
    version
)]
#[command(group(ArgGroup::new("input").args(["code", "file"]).multiple(false)))]
#[command(group(
    ArgGroup::new("manage")
        .args(["list_sessions", "show_session", "delete_session"])
        .multiple(false)
))]
pub struct Cli {
    /// Python code to execute. Literal "\n" sequences are turned into newlines.
    #[arg(short = 'c', long, value_name = "CODE")]
    pub code: Option<String>,

    /// Read the Python code to execute from a file.
    #[arg(short = 'f', long, value_name = "PATH")]
    pub file: Option<PathBuf>,

    /// Persist interpreter state under this name ([A-Za-z0-9_-]+).
    #[arg(short = 's', long, value_name = "NAME", value_parser = parse_session_name)]
    pub session: Option<SessionName>,

    /// Directory holding session files (created if missing). Defaults to the current directory.
    #[arg(short = 'd', long = "sessions-dir", value_name = "PATH")]
    pub sessions_dir: Option<PathBuf>,

    /// Comma-separated modules to install, instead of scanning the code for imports.
    #[arg(long, value_name = "MODULES", value_delimiter = ',')]
    pub imports: Option<Vec<String>>,

    /// Python interpreter to run.
    #[arg(long, value_name = "PATH")]
    pub python: Option<PathBuf>,

    /// List sessions in the sessions directory.
    #[arg(long = "list-sessions")]
    pub list_sessions: bool,

    /// Show metadata and the last result of a session.
    #[arg(long = "show-session", value_name = "NAME", value_parser = parse_session_name)]
    pub show_session: Option<SessionName>,

    /// Delete every file of a session.
    #[arg(long = "delete-session", value_name = "NAME", value_parser = parse_session_name)]
    pub delete_session: Option<SessionName>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short = 'v', long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn try_parse() -> Result<Self, clap::Error> {
        <Self as Parser>::try_parse()
    }

    pub fn is_management(&self) -> bool {
        self.list_sessions || self.show_session.is_some() || self.delete_session.is_some()
    }
}

fn parse_session_name(raw: &str) -> Result<SessionName, String> {
    raw.parse().map_err(|e: crate::error::Error| e.to_string())
}

/// Turn escaped newline sequences typed on a command line into real newlines.
pub fn unescape_newlines(code: &str) -> String {
    code.replace("\\r\\n", "\n").replace("\\n", "\n")
}
