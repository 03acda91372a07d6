//! `pfund-kit`: inspect and edit the toolkit settings file.
//!
//! # Usage
//!
//! ```text
//! pfund-kit [--config <path>] <command> [args]
//!
//! Commands:
//!   show [--json]          print resolved settings
//!   resolve <name>         canonical name for an alias
//!   alias <canonical>      alias registered for a canonical name
//!   set --key value ...    merge values into [settings]
//!   clear-logs             delete log files in the log directory
//! ```
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Load config
//!   3. Init logging from `[kit] logging_config`, or console logging at
//!      `[kit] log_level`
//!   4. Run the command

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use tracing::{debug, info};

use pfund_kit::cli::args_to_kwargs;
use pfund_kit::config::{self, Config};
use pfund_kit::error::KitError;
use pfund_kit::logging::{self, LoggingHandle, PanicRouter};
use pfund_kit::toml_io::{self, DumpMode};

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

// ── CLI arg parsing ────────────────────────────────────────────────────────

struct Args {
    config: Option<String>,
    command: Option<String>,
    rest: Vec<String>,
}

fn parse_args() -> Args {
    let mut config = None;
    let mut command = None;
    let mut rest = Vec::new();
    let mut iter = std::env::args().skip(1);

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" | "-c" if command.is_none() => {
                config = iter.next();
            }
            "--help" | "-h" => {
                print_help();
                process::exit(0);
            }
            _ if command.is_none() => command = Some(arg),
            _ => rest.push(arg),
        }
    }

    Args { config, command, rest }
}

fn print_help() {
    eprintln!("usage: pfund-kit [--config <path>] <command> [args]");
    eprintln!();
    eprintln!("commands:");
    eprintln!("  show [--json]          print resolved settings");
    eprintln!("  resolve <name>         canonical name for an alias");
    eprintln!("  alias <canonical>      alias registered for a canonical name");
    eprintln!("  set --key value ...    merge values into [settings]");
    eprintln!("  clear-logs             delete log files in the log directory");
    eprintln!();
    eprintln!("flags:");
    eprintln!("  --config, -c <path>   settings file (default: $PFUND_KIT_CONFIG or config/default.toml)");
    eprintln!("  --help,   -h          print this help");
}

// ── commands ───────────────────────────────────────────────────────────────

fn run() -> Result<(), KitError> {
    // .env is optional.
    let _ = dotenvy::dotenv();

    let args = parse_args();
    let Some(command) = args.command else {
        print_help();
        return Err(KitError::Config("no command given".into()));
    };
    let config_path = args.config.map(PathBuf::from).unwrap_or_else(config::config_path);

    // `set` may create the settings file, so it cannot require one.
    if command == "set" {
        logging::init("warn", false)?;
        return cmd_set(&config_path, &args.rest);
    }

    let cfg = config::load_at(&config_path)?;
    let _logging = init_logging(&cfg)?;

    info!(
        source = %cfg.source.display(),
        log_dir = %cfg.log_dir.display(),
        log_level = %cfg.log_level,
        "config loaded"
    );

    match command.as_str() {
        "show" => cmd_show(&cfg, args.rest.iter().any(|a| a == "--json")),
        "resolve" => {
            let name = args.rest.first().ok_or_else(|| usage("resolve <name>"))?;
            println!("{}", cfg.aliases.resolve(name));
            Ok(())
        }
        "alias" => {
            let canonical = args.rest.first().ok_or_else(|| usage("alias <canonical>"))?;
            let alias = cfg
                .aliases
                .get_alias(canonical)
                .ok_or_else(|| KitError::AliasNotFound(canonical.clone()))?;
            println!("{alias}");
            Ok(())
        }
        "clear-logs" => cmd_clear_logs(&cfg.log_dir),
        other => Err(KitError::Config(format!(
            "unknown command: {other}\n  run 'pfund-kit --help' for usage"
        ))),
    }
}

fn usage(form: &str) -> KitError {
    KitError::Config(format!("usage: pfund-kit {form}"))
}

/// Configured sinks when `[kit] logging_config` is set, console otherwise.
fn init_logging(cfg: &Config) -> Result<Option<LoggingHandle>, KitError> {
    let Some(logging_config) = cfg.logging()? else {
        logging::init(&cfg.log_level, false)?;
        return Ok(None);
    };
    let handle = logging::init_with_config(&cfg.log_dir, logging_config, cfg.lazy_logging)?;
    let panics = PanicRouter::new();
    panics.register(env!("CARGO_PKG_NAME"));
    panics.install(handle.clone());
    Ok(Some(handle))
}

fn cmd_show(cfg: &Config, json: bool) -> Result<(), KitError> {
    if json {
        let out = serde_json::json!({
            "source": cfg.source,
            "log_dir": cfg.log_dir,
            "log_level": cfg.log_level,
            "lazy_logging": cfg.lazy_logging,
            "logging_config": cfg.logging_config,
            "aliases": cfg.aliases.to_map(),
            "settings": cfg.settings,
        });
        let rendered = serde_json::to_string_pretty(&out)
            .map_err(|e| KitError::Config(format!("cannot render settings: {e}")))?;
        println!("{rendered}");
        return Ok(());
    }

    println!("source          {}", cfg.source.display());
    println!("log_dir         {}", cfg.log_dir.display());
    println!("log_level       {}", cfg.log_level);
    println!("lazy_logging    {}", cfg.lazy_logging);
    match &cfg.logging_config {
        Some(p) => println!("logging_config  {}", p.display()),
        None => println!("logging_config  (console)"),
    }
    println!("aliases ({}):", cfg.aliases.len());
    for (alias, canonical) in cfg.aliases.items() {
        println!("  {alias} -> {canonical}");
    }
    if !cfg.settings.is_empty() {
        println!("settings:");
        print!("{}", toml::to_string(&cfg.settings)?);
    }
    Ok(())
}

fn cmd_set(config_path: &Path, rest: &[String]) -> Result<(), KitError> {
    let kwargs = args_to_kwargs(rest);
    if kwargs.is_empty() {
        return Err(usage("set --key value ..."));
    }
    let count = kwargs.len();
    let mut update = toml::Table::new();
    update.insert("settings".into(), toml::Value::Table(kwargs));
    toml_io::dump(&update, config_path, DumpMode::Merge)?;
    debug!(path = %config_path.display(), keys = count, "settings merged");
    println!("ok  {count} setting(s) written to {}", config_path.display());
    Ok(())
}

fn cmd_clear_logs(log_dir: &Path) -> Result<(), KitError> {
    if !log_dir.exists() {
        println!("ok  nothing to clear in {}", log_dir.display());
        return Ok(());
    }
    let mut removed = 0;
    for entry in fs::read_dir(log_dir)? {
        let path = entry?.path();
        let is_log = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(".log") || n.contains(".log."));
        if path.is_file() && is_log {
            fs::remove_file(&path)?;
            removed += 1;
        }
    }
    info!(log_dir = %log_dir.display(), removed, "log files cleared");
    println!("ok  removed {removed} log file(s) from {}", log_dir.display());
    Ok(())
}
