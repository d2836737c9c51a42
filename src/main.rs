use std::{fs, process::ExitCode};

use anyhow::{bail, Context, Result};
use clap::error::ErrorKind;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use pysession::{
    cli::{unescape_newlines, Cli},
    config::{self, Config},
    execution::{ExecutionRequest, ExecutionResult, Orchestrator, OrchestratorOptions},
    printer::{EnvelopePrinter, TextPrinter},
    process::{
        pip::PipInstaller,
        python::{PythonOptions, PythonProcess},
        Installer, SkipInstaller,
    },
    resolver::PackageMap,
    serializer::ResultSerializer,
    session::SessionStore,
};

#[tokio::main]
async fn main() -> ExitCode {
    let args = match Cli::try_parse() {
        Ok(args) => args,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            e.exit()
        }
        Err(e) => {
            if let Err(err) = e.print() {
                init_logging(0);
                warn!(error = %err, "failed to print usage error");
            }
            return ExitCode::FAILURE;
        }
    };
    init_logging(args.verbose);

    match run(args).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            TextPrinter::stderr().error(&format!("{err:#}"));
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Returns whether the invocation succeeded.
async fn run(args: Cli) -> Result<bool> {
    // CLI flags override rc file and environment
    let mut cfg = Config::load();
    if let Some(dir) = &args.sessions_dir {
        cfg.set(config::SESSIONS_DIR, dir.to_string_lossy());
    }
    if let Some(python) = &args.python {
        cfg.set(config::PYTHON, python.to_string_lossy());
    }
    debug!(config = %cfg.config_path.display(), "configuration loaded");

    if args.is_management() {
        return manage(&args, &cfg);
    }

    let code = match (&args.code, &args.file) {
        (Some(code), _) => unescape_newlines(code),
        (None, Some(path)) => fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        (None, None) => bail!("no code given: pass -c/--code or -f/--file"),
    };

    let store =
        SessionStore::create(cfg.sessions_dir()).context("failed to prepare sessions directory")?;
    if let Some(session) = &args.session {
        if let Err(err) = store.check_available(session) {
            return report(&ExecutionResult::failed(err.to_string()));
        }
    }
    let mut packages = PackageMap::builtin();
    if let Some(path) = cfg.package_map() {
        packages
            .merge_file(&path)
            .with_context(|| format!("failed to load package map {}", path.display()))?;
    }
    let options = OrchestratorOptions {
        snapshot_package: cfg.snapshot_package(),
        packages,
        serializer: ResultSerializer::new(cfg.repr_limit()),
    };

    let mut request = ExecutionRequest::new(code);
    if let Some(session) = args.session.clone() {
        request = request.with_session(session);
    }
    if let Some(imports) = args.imports.clone() {
        request = request.with_imports(imports);
    }

    let python = cfg.python();
    let interpreter = match PythonProcess::spawn(&PythonOptions {
        python: python.clone(),
        recursion_limit: cfg.recursion_limit(),
    })
    .await
    {
        Ok(interpreter) => interpreter,
        Err(err) => {
            let message = format!("failed to start {}: {err}", python.display());
            return report(&ExecutionResult::failed(message));
        }
    };
    let installer: Box<dyn Installer> = if cfg.install_enabled() {
        Box::new(PipInstaller::new(python))
    } else {
        Box::new(SkipInstaller)
    };

    let mut orchestrator = Orchestrator::new(interpreter, installer, store, options);
    let result = orchestrator.run(&request).await;
    let (interpreter, _) = orchestrator.into_parts();
    if let Err(err) = interpreter.shutdown().await {
        warn!(error = %err, "interpreter did not stop cleanly");
    }
    report(&result)
}

fn report(result: &ExecutionResult) -> Result<bool> {
    EnvelopePrinter::for_result(result)
        .print(result)
        .context("failed to write result")?;
    if let Some(error) = &result.error {
        TextPrinter::stderr().error(error);
    }
    Ok(result.success)
}

fn manage(args: &Cli, cfg: &Config) -> Result<bool> {
    let store = SessionStore::new(cfg.sessions_dir());
    let printer = TextPrinter::stdout();
    if args.list_sessions {
        let sessions = store.list().context("failed to list sessions")?;
        printer.sessions(&sessions);
    } else if let Some(name) = &args.show_session {
        let meta = store
            .read_metadata(name)
            .with_context(|| format!("failed to read session {name}"))?;
        let result = store
            .read_result(name)
            .with_context(|| format!("failed to read result of session {name}"))?;
        printer.session(name, &meta, result.as_ref());
    } else if let Some(name) = &args.delete_session {
        if !store.remove(name).with_context(|| format!("failed to delete session {name}"))? {
            bail!("session not found: {name}");
        }
        println!("Deleted session: {name}");
    }
    Ok(true)
}
