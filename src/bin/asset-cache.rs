use std::env;
use std::io::Write;
use std::path::PathBuf;

use asset_cache::{
    AppConfig, CacheStorage, CacheStore, DiskCacheStorage, HttpNetwork, OfflineWorker, Request,
};

fn print_usage() {
    eprintln!("Usage: asset-cache [OPTIONS] <COMMAND>");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  install             Pre-cache every configured asset (all or nothing)");
    eprintln!("  fetch <PATH|URL>    Answer one request from the cache or the network; body to stdout");
    eprintln!("  list                Print cache stores and their entries");
    eprintln!("  serve               Install, then serve the scope offline-first over HTTP");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --config <FILE>     TOML configuration file");
    eprintln!("  --scope <URL>       Base URL assets are resolved against");
    eprintln!("  --cache-dir <DIR>   Cache storage directory");
    eprintln!("  -h, --help          Show this help");
    eprintln!();
    eprintln!("Logging is controlled with RUST_LOG (default: info).");
}

#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    scope: Option<String>,
    cache_dir: Option<PathBuf>,
    command: Vec<String>,
}

fn parse_args(raw: &[String]) -> Result<Args, String> {
    let mut args = Args::default();
    let mut i = 0;
    while i < raw.len() {
        let flag = raw[i].as_str();
        match flag {
            "--config" | "--scope" | "--cache-dir" => {
                i += 1;
                let value = raw
                    .get(i)
                    .cloned()
                    .ok_or_else(|| format!("{flag} requires a value"))?;
                match flag {
                    "--config" => args.config = Some(PathBuf::from(value)),
                    "--scope" => args.scope = Some(value),
                    _ => args.cache_dir = Some(PathBuf::from(value)),
                }
            }
            _ if flag.starts_with('-') => return Err(format!("unknown option {flag}")),
            _ => args.command.push(raw[i].clone()),
        }
        i += 1;
    }
    Ok(args)
}

fn load_config(args: &Args) -> asset_cache::Result<AppConfig> {
    let mut config = AppConfig::load_or_default(args.config.as_deref())?;
    if let Some(ref scope) = args.scope {
        config.network.scope.clone_from(scope);
    }
    if let Some(ref dir) = args.cache_dir {
        config.cache.dir.clone_from(dir);
    }
    Ok(config)
}

fn build_worker(config: &AppConfig) -> asset_cache::Result<OfflineWorker<DiskCacheStorage, HttpNetwork>> {
    let scope = config.network.scope_url()?;
    let network = HttpNetwork::from_config(&config.network)?;
    let storage = DiskCacheStorage::new(config.cache.dir.clone());
    log::debug!("Cache storage at {}", storage.root().display());
    Ok(OfflineWorker::new(storage, network, config.cache.manifest(), scope)
        .with_concurrent_fetches(config.network.concurrent_fetches))
}

async fn list(storage: &DiskCacheStorage) -> asset_cache::Result<()> {
    for name in storage.names().await? {
        println!("{name}");
        let store = storage.open(&name).await?;
        for request in store.keys().await? {
            println!("  {} {}", request.method, request.url);
        }
    }
    Ok(())
}

async fn run(args: Args) -> asset_cache::Result<()> {
    let config = load_config(&args)?;
    let worker = build_worker(&config)?;

    match args.command.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        ["install"] => {
            let report = worker.install().await?;
            println!(
                "Installed {} assets ({} bytes) into {} in {:?}",
                report.assets, report.bytes, report.cache_name, report.elapsed
            );
        }
        ["fetch", target] => {
            let request = Request::resolve(worker.scope(), target)?;
            let fetched = worker.fetch(request).await?;
            log::info!(
                "{} {} from {:?}",
                fetched.response.status,
                fetched.response.url,
                fetched.source
            );
            std::io::stdout().write_all(&fetched.response.body)?;
        }
        ["list"] => list(worker.storage()).await?,
        #[cfg(feature = "server")]
        ["serve"] => {
            worker.install().await?;
            let worker = std::sync::Arc::new(worker);
            if let Err(e) =
                asset_cache::server::run_server(worker, &config.server.host, config.server.port)
                    .await
            {
                log::error!("Server error: {e}");
                std::process::exit(1);
            }
        }
        #[cfg(not(feature = "server"))]
        ["serve"] => {
            eprintln!("Server support not compiled in");
            std::process::exit(1);
        }
        _ => {
            print_usage();
            std::process::exit(2);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let raw: Vec<String> = env::args().skip(1).collect();
    if raw.is_empty() || raw.iter().any(|a| a == "-h" || a == "--help") {
        print_usage();
        std::process::exit(0);
    }

    let args = match parse_args(&raw) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(2);
        }
    };

    if let Err(e) = run(args).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn parses_options_and_command() {
        let args = parse_args(&strings(&[
            "--scope",
            "https://example.com/",
            "fetch",
            "index.html",
            "--cache-dir",
            "/tmp/c",
        ]))
        .unwrap();
        assert_eq!(args.scope.as_deref(), Some("https://example.com/"));
        assert_eq!(args.cache_dir, Some(PathBuf::from("/tmp/c")));
        assert_eq!(args.command, vec!["fetch", "index.html"]);
        assert!(args.config.is_none());
    }

    #[test]
    fn missing_option_value_is_an_error() {
        let err = parse_args(&strings(&["install", "--config"])).unwrap_err();
        assert!(err.contains("--config"));
    }

    #[test]
    fn unknown_option_is_an_error() {
        assert!(parse_args(&strings(&["--verbose"])).is_err());
    }

    #[test]
    fn cli_overrides_config() {
        let args = Args {
            scope: Some("https://override.test/".into()),
            cache_dir: Some(PathBuf::from("/tmp/override")),
            ..Args::default()
        };
        let config = load_config(&args).unwrap();
        assert_eq!(config.network.scope, "https://override.test/");
        assert_eq!(config.cache.dir, PathBuf::from("/tmp/override"));
    }
}
