use log::{error, info};
use smarthome_store::config::Config;
use smarthome_store::services::alerts::AckTarget;
use smarthome_store::services::maintenance::Table;
use smarthome_store::services::query::ReportParams;
use smarthome_store::TelemetryStore;
use std::io::Write;
use std::path::PathBuf;

#[derive(Debug)]
struct LoadedEnvFile {
    path: PathBuf,
    explicit: bool,
}

#[derive(Debug, PartialEq)]
enum Command {
    Migrate,
    Report { name: String, params: Vec<String> },
    Ack(AckTarget),
    Purge { table: Table, days: i64 },
    Vacuum,
    Sizes,
    Export(Option<PathBuf>),
    Seed,
}

const USAGE: &str = "usage: smarthome-store [--env-file <path>] \
    [migrate | report <name> [key=value ...] | ack <all|id> | purge <table> <days> | vacuum | sizes | export [path] | seed]";

impl Command {
    fn parse(args: &[String]) -> Result<Self, String> {
        let Some((head, rest)) = args.split_first() else {
            return Ok(Command::Migrate);
        };
        let cmd = match (head.as_str(), rest) {
            ("migrate", []) => Command::Migrate,
            ("report", [name, params @ ..]) => Command::Report {
                name: name.clone(),
                params: params.to_vec(),
            },
            ("ack", [target]) => Command::Ack(target.parse().map_err(|e| format!("{}", e))?),
            ("purge", [table, days]) => Command::Purge {
                table: table.parse().map_err(|e| format!("{}", e))?,
                days: days
                    .parse::<i64>()
                    .map_err(|_| format!("purge days must be an integer, got {:?}", days))?,
            },
            ("vacuum", []) => Command::Vacuum,
            ("sizes", []) => Command::Sizes,
            ("export", []) => Command::Export(None),
            ("export", [path]) => Command::Export(Some(PathBuf::from(path))),
            ("seed", []) => Command::Seed,
            _ => return Err(format!("unrecognised command: {}\n{}", args.join(" "), USAGE)),
        };
        Ok(cmd)
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), String> {
    let text = serde_json::to_string_pretty(value).map_err(|e| format!("serializing output failed: {}", e))?;
    println!("{}", text);
    Ok(())
}

fn run(command: Command) -> Result<(), String> {
    // 1) Load config
    let cfg = Config::from_env()?;
    info!(
        "Config loaded (database={}, busy_timeout={}ms, export_days={}, seed_days={}, seed_step={}min)",
        cfg.database_url,
        cfg.busy_timeout.as_millis(),
        cfg.export_days,
        cfg.seed.days,
        cfg.seed.step_minutes
    );

    // 2) Open DB and apply pending migrations
    let mut store = TelemetryStore::open(&cfg).map_err(|e| format!("opening database failed: {}", e))?;
    info!("Database ready at {}", cfg.database_url);

    // 3) Dispatch
    match command {
        Command::Migrate => {
            let sizes = store.table_sizes().map_err(|e| e.to_string())?;
            for size in &sizes {
                info!("{}: {} row(s)", size.table, size.rows);
            }
        }
        Command::Report { name, params } => {
            let params = ReportParams::parse(&params).map_err(|e| e.to_string())?;
            let rows = store.query_named(&name, &params).map_err(|e| e.to_string())?;
            print_json(&rows)?;
        }
        Command::Ack(target) => {
            let affected = store.acknowledge(target).map_err(|e| e.to_string())?;
            print_json(&serde_json::json!({ "acknowledged": affected }))?;
        }
        Command::Purge { table, days } => {
            let horizon = chrono::Duration::try_days(days).ok_or_else(|| format!("purge days out of range: {}", days))?;
            let deleted = store.purge_older_than(table, horizon).map_err(|e| e.to_string())?;
            print_json(&serde_json::json!({ "table": table, "deleted": deleted }))?;
        }
        Command::Vacuum => store.reclaim_space().map_err(|e| e.to_string())?,
        Command::Sizes => print_json(&store.table_sizes().map_err(|e| e.to_string())?)?,
        Command::Export(path) => {
            let written = match &path {
                Some(path) => {
                    let mut file = std::fs::File::create(path)
                        .map_err(|e| format!("creating {} failed: {}", path.display(), e))?;
                    store.export_csv(&mut file, cfg.export_days)
                }
                None => {
                    let stdout = std::io::stdout();
                    let mut lock = stdout.lock();
                    let result = store.export_csv(&mut lock, cfg.export_days);
                    let _ = lock.flush();
                    result
                }
            }
            .map_err(|e| e.to_string())?;
            if let Some(path) = path {
                info!("Wrote {} reading(s) to {}", written, path.display());
            }
        }
        Command::Seed => {
            let summary = store.seed(cfg.seed).map_err(|e| e.to_string())?;
            print_json(&summary)?;
        }
    }

    Ok(())
}

fn configure_env_from_cli() -> Result<(Option<LoadedEnvFile>, Vec<String>), String> {
    let mut args = std::env::args_os();
    args.next(); // skip program name

    let mut env_file: Option<PathBuf> = None;
    let mut positional = Vec::new();

    while let Some(arg) = args.next() {
        match arg.to_str() {
            Some("--env-file") => {
                if env_file.is_some() {
                    return Err("`--env-file` provided more than once".to_string());
                }
                let value = args
                    .next()
                    .ok_or_else(|| "`--env-file` requires a path argument".to_string())?;
                env_file = Some(PathBuf::from(value));
            }
            Some(s) if s.starts_with("--env-file=") => {
                if env_file.is_some() {
                    return Err("`--env-file` provided more than once".to_string());
                }
                let path_str = &s["--env-file=".len()..];
                if path_str.is_empty() {
                    return Err("`--env-file` requires a path argument".to_string());
                }
                env_file = Some(PathBuf::from(path_str));
            }
            Some("-h") | Some("--help") => return Err(USAGE.to_string()),
            Some(s) if s.starts_with("--") => return Err(format!("unrecognised argument: {}\n{}", s, USAGE)),
            Some(s) => positional.push(s.to_string()),
            None => return Err("argument contains invalid UTF-8".to_string()),
        }
    }

    // dotenvy never overrides variables already set in the process environment
    let loaded = if let Some(path) = env_file {
        if !path.is_file() {
            return Err(format!("env file not found: {}", path.display()));
        }
        dotenvy::from_path(&path).map_err(|e| format!("failed to load {}: {}", path.display(), e))?;
        Some(LoadedEnvFile { path, explicit: true })
    } else {
        let cwd = std::env::current_dir().map_err(|e| format!("unable to read current directory: {}", e))?;
        let default_path = cwd.join(".env");
        if default_path.is_file() {
            dotenvy::from_path(&default_path).map_err(|e| format!("failed to load {}: {}", default_path.display(), e))?;
            Some(LoadedEnvFile {
                path: default_path,
                explicit: false,
            })
        } else {
            None
        }
    };

    Ok((loaded, positional))
}

fn main() {
    let (loaded_env, args) = match configure_env_from_cli() {
        Ok(parsed) => parsed,
        Err(err) => {
            eprintln!("fatal: {}", err);
            std::process::exit(1);
        }
    };

    // Init logging after environment so RUST_LOG from .env is respected.
    let default_filter = env_logger::Env::default().default_filter_or("info");
    env_logger::Builder::from_env(default_filter)
        .format_timestamp_secs()
        .init();

    if let Some(info) = loaded_env.as_ref() {
        let origin = if info.explicit { "CLI-specified" } else { "default" };
        info!("Environment loaded from {} .env file: {}", origin, info.path.display());
    }

    let command = match Command::parse(&args) {
        Ok(command) => command,
        Err(e) => {
            error!("fatal: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        "smarthome-store {} (git {}) starting",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_TIME_GIT_HASH")
    );
    if let Err(e) = run(command) {
        error!("fatal: {}", e);
        std::process::exit(1);
    }
}
