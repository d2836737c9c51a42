//! Printers: the JSON envelope on stdout, diagnostics and session listings.

use std::io::{self, Write};

use is_terminal::IsTerminal;
use owo_colors::OwoColorize;
use serde_json::Value;

use crate::{
    execution::ExecutionResult,
    session::{SessionMetadata, SessionName},
};

pub struct EnvelopePrinter {
    pub pretty: bool,
}

impl EnvelopePrinter {
    /// Successful envelopes are pretty-printed, failures stay on one line.
    pub fn for_result(result: &ExecutionResult) -> Self {
        Self { pretty: result.success }
    }

    pub fn render(&self, result: &ExecutionResult) -> serde_json::Result<String> {
        if self.pretty {
            serde_json::to_string_pretty(result)
        } else {
            serde_json::to_string(result)
        }
    }

    pub fn print(&self, result: &ExecutionResult) -> io::Result<()> {
        let text = self.render(result).map_err(io::Error::other)?;
        let mut out = io::stdout().lock();
        writeln!(out, "{text}")?;
        out.flush()
    }
}

pub struct TextPrinter {
    pub color: bool,
}

impl TextPrinter {
    pub fn stdout() -> Self {
        Self { color: io::stdout().is_terminal() }
    }

    pub fn stderr() -> Self {
        Self { color: io::stderr().is_terminal() }
    }

    pub fn error(&self, message: &str) {
        if self.color {
            eprintln!("{}: {}", "error".red().bold(), message);
        } else {
            eprintln!("error: {message}");
        }
    }

    pub fn sessions(&self, sessions: &[(SessionName, SessionMetadata)]) {
        for (name, meta) in sessions {
            let modified = meta.last_modified.to_rfc3339();
            let packages = format!("{} packages", meta.packages.len());
            if self.color {
                println!("{}\t{}\t{}", name.cyan(), modified, packages.dimmed());
            } else {
                println!("{name}\t{modified}\t{packages}");
            }
        }
    }

    pub fn session(&self, name: &SessionName, meta: &SessionMetadata, result: Option<&Value>) {
        let header = |label: &str| {
            if self.color {
                format!("{}", label.green())
            } else {
                label.to_string()
            }
        };
        println!("{} {}", header("session:"), name);
        println!("{} {}", header("created:"), meta.created.to_rfc3339());
        println!("{} {}", header("lastModified:"), meta.last_modified.to_rfc3339());
        let packages = meta.packages.iter().cloned().collect::<Vec<_>>().join(", ");
        println!("{} {}", header("packages:"), packages);
        match result {
            Some(value) => println!("{} {}", header("result:"), value),
            None => println!("{} -", header("result:")),
        }
    }
}
