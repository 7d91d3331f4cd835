//! `p4settings`: resolve Perforce demo settings and optionally connect.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Init logger (`P4SETTINGS_LOG_LEVEL`, default "info"; `RUST_LOG` wins)
//!   3. Collect overrides: `com.perforce.p4settings.*` env vars, then `-D` flags
//!   4. Load settings, reporting an unreadable settings file as a warning
//!   5. Print the resolved settings (password masked)
//!   6. With `--connect`, open a TCP connection to the server address
//!
//! # Usage
//!
//! ```text
//! p4settings [--config <path>] [-D<name>=<value>]... [--json] [--connect]
//! ```

use std::{env, path::PathBuf, process};

use p4settings::{
    config::{self, Loaded, Overrides, SettingKey},
    error::AppError,
    logger,
    server::{self, UsageOptions},
    tcp::TcpServerFactory,
};
use tracing::{info, warn};

const USAGE: &str = "\
usage: p4settings [--config <path>] [-D<name>=<value>]... [--json] [--connect]

Flags:
  --config <path>      settings file (default: $P4SETTINGS_CONFIG or ./PerforceSettings.txt)
  -D<name>=<value>     runtime override, e.g. -Dcom.perforce.p4settings.userName=alice
  --json               print resolved settings as JSON
  --connect            open a TCP connection to the resolved server address
  --help, -h           print this help";

#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    defines: Vec<String>,
    json: bool,
    connect: bool,
    help: bool,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Args, AppError> {
    let mut parsed = Args::default();
    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                let path = iter
                    .next()
                    .ok_or_else(|| AppError::Config("--config requires a path".into()))?;
                parsed.config = Some(config::expand_home(&path));
            }
            "-D" => {
                let def = iter
                    .next()
                    .ok_or_else(|| AppError::Config("-D requires name=value".into()))?;
                parsed.defines.push(def);
            }
            "--json" => parsed.json = true,
            "--connect" => parsed.connect = true,
            "--help" | "-h" => parsed.help = true,
            other if other.starts_with("-D") => parsed.defines.push(other.to_string()),
            other => return Err(AppError::Config(format!("unknown argument '{other}'\n{USAGE}"))),
        }
    }
    Ok(parsed)
}

/// Validated log level; unset or empty means "info". A typo here would
/// otherwise become a target filter that hides every event.
fn log_level(raw: Option<String>) -> Result<String, AppError> {
    let level = raw
        .filter(|l| !l.is_empty())
        .unwrap_or_else(|| "info".to_string());
    logger::parse_level(&level)?;
    Ok(level)
}

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), AppError> {
    // Load .env if present; the file is optional.
    let _ = dotenvy::dotenv();

    let args = parse_args(env::args().skip(1))?;
    if args.help {
        println!("{USAGE}");
        return Ok(());
    }

    let level = log_level(env::var("P4SETTINGS_LOG_LEVEL").ok())?;
    logger::init(&level, false)?;

    let mut overrides = Overrides::from_env();
    for def in &args.defines {
        overrides
            .define(def)
            .map_err(|e| AppError::Config(e.to_string()))?;
    }

    let path = args.config.unwrap_or_else(config::default_config_path);
    let Loaded { settings, warning } = config::load_from(&path, &overrides);
    if let Some(w) = warning {
        warn!("{w}");
    }

    info!(
        server_uri = settings.server_uri.as_str(),
        user_name = settings.user_name.as_str(),
        client_name = settings.client_name.as_str(),
        "settings resolved"
    );

    if args.json {
        let json = serde_json::to_string_pretty(&settings.report())
            .map_err(|e| AppError::Config(format!("cannot render settings: {e}")))?;
        println!("{json}");
    } else {
        for key in SettingKey::ALL {
            let setting = settings.get(key);
            let value = match key {
                SettingKey::Password => "********",
                _ => setting.as_str(),
            };
            println!("{:<11} {value} ({})", key.name(), setting.source());
        }
    }

    if args.connect {
        let opts = UsageOptions::for_program(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        match server::connect(&settings, &TcpServerFactory, None, Some(&opts))? {
            Some(mut server) => {
                println!("✓ Connected: {}", server.address());
                server.disconnect();
            }
            None => println!("no server returned for {}", settings.server_uri.as_str()),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Result<Args, AppError> {
        parse_args(list.iter().map(|s| s.to_string()))
    }

    #[test]
    fn parses_all_flags() {
        let a = args(&[
            "--config",
            "/tmp/p4.txt",
            "-Dcom.perforce.p4settings.userName=bob",
            "-D",
            "com.perforce.p4settings.password=x",
            "--json",
            "--connect",
        ])
        .unwrap();
        assert_eq!(a.config, Some(PathBuf::from("/tmp/p4.txt")));
        assert_eq!(a.defines.len(), 2);
        assert!(a.json && a.connect && !a.help);
    }

    #[test]
    fn log_level_defaults_to_info() {
        assert_eq!(log_level(None).unwrap(), "info");
        assert_eq!(log_level(Some(String::new())).unwrap(), "info");
        assert_eq!(log_level(Some("debug".into())).unwrap(), "debug");
    }

    #[test]
    fn log_level_rejects_unknown_names() {
        let err = log_level(Some("verbose".into())).unwrap_err();
        assert!(matches!(err, AppError::Logger(ref m) if m.contains("verbose")), "{err}");
    }

    #[test]
    fn rejects_unknown_and_incomplete_flags() {
        assert!(args(&["--verbose"]).is_err());
        assert!(args(&["--config"]).is_err());
        assert!(args(&["-D"]).is_err());
    }
}
