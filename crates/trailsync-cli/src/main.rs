//! `trailsync` - drive a sync session from the terminal

use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use trailsync_cache::{FileStore, KeyValueStore, MemoryStore};
use trailsync_core::{
    FlushOutcome, PathExpander, PathMapping, SessionBuilder, SessionEvent, SyncConfig, SyncSession,
};
use trailsync_http::{HttpRemoteStore, SseTransport};
use trailsync_realtime::SharedRoute;

fn cli() -> Command {
    Command::new("trailsync")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Learning-path selection and progress sync")
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .env("TRAILSYNC_CONFIG")
                .value_parser(value_parser!(PathBuf))
                .global(true)
                .help("TOML configuration file"),
        )
        .arg(
            Arg::new("base-url")
                .long("base-url")
                .env("TRAILSYNC_BASE_URL")
                .global(true)
                .help("Remote store base URL (overrides config)"),
        )
        .arg(
            Arg::new("user-id")
                .long("user-id")
                .env("TRAILSYNC_USER_ID")
                .global(true)
                .help("Learner identity (overrides config)"),
        )
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .action(ArgAction::SetTrue)
                .global(true)
                .help("Emit logs as JSON"),
        )
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("select")
                .about("Select items or paths and save immediately")
                .arg(ids_arg()),
        )
        .subcommand(
            Command::new("deselect")
                .about("Deselect items or paths and save immediately")
                .arg(ids_arg()),
        )
        .subcommand(Command::new("status").about("Print the hydrated selection and progress as JSON"))
        .subcommand(
            Command::new("expand")
                .about("List the items a path expands to")
                .arg(Arg::new("path").required(true).help("Path id, e.g. path-foundation")),
        )
        .subcommand(
            Command::new("watch")
                .about("Follow push updates for a route until interrupted")
                .arg(Arg::new("route").required(true).help("Content route, e.g. /katas/intro")),
        )
}

fn ids_arg() -> Arg {
    Arg::new("ids")
        .required(true)
        .num_args(1..)
        .help("Item or path ids")
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn load_config(matches: &ArgMatches) -> Result<SyncConfig> {
    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(path) => SyncConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => SyncConfig::new(),
    };
    if let Some(url) = matches.get_one::<String>("base-url") {
        config = config.with_base_url(url);
    }
    if let Some(user) = matches.get_one::<String>("user-id") {
        config = config.with_user_id(user);
    }
    config.validate()?;
    Ok(config)
}

fn load_mapping(config: &SyncConfig) -> Result<PathMapping> {
    match &config.paths_file {
        Some(path) => PathMapping::load(path)
            .with_context(|| format!("loading path mapping from {}", path.display())),
        None => PathMapping::builtin().context("loading built-in path mapping"),
    }
}

fn open_store(config: &SyncConfig) -> Result<Arc<dyn KeyValueStore>> {
    let Some(path) = &config.cache.file else {
        return Ok(Arc::new(MemoryStore::new()));
    };
    let store = FileStore::open(path).with_context(|| format!("opening cache file {}", path.display()))?;
    Ok(Arc::new(store))
}

fn build_session(config: &SyncConfig, route: &SharedRoute) -> Result<SyncSession> {
    let remote = HttpRemoteStore::new(config.base_url.clone()).context("building HTTP client")?;
    let transport = SseTransport::new(config.base_url.clone()).context("building event-stream client")?;
    Ok(SessionBuilder::new(
        config.clone(),
        Arc::new(remote),
        Arc::new(transport),
        Arc::new(route.clone()),
    )
    .with_store(open_store(config)?)
    .with_mapping(load_mapping(config)?)
    .build())
}

fn ids(args: &ArgMatches) -> Vec<String> {
    args.get_many::<String>("ids")
        .map(|ids| ids.cloned().collect())
        .unwrap_or_default()
}

fn print_event(event: &SessionEvent) {
    match event {
        SessionEvent::SelectionChanged => println!("selection changed"),
        SessionEvent::ProgressChanged { page_id } => println!("progress changed: {page_id}"),
        SessionEvent::Milestone(m) => println!(
            "{}: {}",
            m.kind,
            m.title.as_deref().unwrap_or("(untitled)")
        ),
        SessionEvent::Status(status) => println!("[{}]", status.label()),
    }
}

async fn mutate(config: &SyncConfig, ids: &[String], select: bool) -> Result<()> {
    let session = build_session(config, &SharedRoute::default())?;
    session.hydrate().await;
    for id in ids {
        let changed = if select {
            session.selection().add(id)
        } else {
            session.selection().remove(id)
        };
        tracing::debug!(id = %id, changed, "applied");
    }

    let outcome = session.flush_now().await;
    session.shutdown().await;
    match outcome {
        FlushOutcome::Saved => println!("saved"),
        FlushOutcome::CachedOnly => println!("saved locally (remote unavailable)"),
        FlushOutcome::InFlight => println!("save already in progress"),
    }
    println!("{}", session.selection().snapshot().join("\n"));
    Ok(())
}

async fn status(config: &SyncConfig) -> Result<()> {
    let session = build_session(config, &SharedRoute::default())?;
    let hydration = session.hydrate().await;
    tracing::info!(?hydration, "hydrated");
    println!("{}", serde_json::to_string_pretty(&session.snapshot())?);
    session.shutdown().await;
    Ok(())
}

async fn watch(config: &SyncConfig, route: &str) -> Result<()> {
    let shared_route = SharedRoute::new(route);
    let session = build_session(config, &shared_route)?;
    session.hydrate().await;
    session.on_update(print_event);
    session.connect_realtime(route);

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    session.shutdown().await;
    Ok(())
}

fn expand(config: &SyncConfig, path: &str) -> Result<()> {
    let expander = PathExpander::new(load_mapping(config)?);
    if !expander.is_path_id(path) {
        anyhow::bail!("'{path}' is not a path id (expected the 'path-' prefix)");
    }
    for item in expander.expand(path) {
        println!("{item}");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("log-json"));
    let config = load_config(&matches)?;

    match matches.subcommand() {
        Some(("select", args)) => mutate(&config, &ids(args), true).await,
        Some(("deselect", args)) => mutate(&config, &ids(args), false).await,
        Some(("status", _)) => status(&config).await,
        Some(("expand", args)) => {
            let path = args.get_one::<String>("path").map_or("", String::as_str);
            expand(&config, path)
        }
        Some(("watch", args)) => {
            let route = args.get_one::<String>("route").map_or("/", String::as_str);
            watch(&config, route).await
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn command_definition_is_consistent() {
        cli().debug_assert();
    }

    #[test]
    fn flags_override_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "base_url = \"http://from-file/api\"\nuser_id = \"file-user\"").unwrap();
        let path = file.path().to_string_lossy().into_owned();

        let matches = cli()
            .try_get_matches_from(["trailsync", "--config", &path, "--user-id", "cli-user", "status"])
            .unwrap();
        let config = load_config(&matches).unwrap();
        assert_eq!(config.base_url, "http://from-file/api");
        assert_eq!(config.user_id, "cli-user");
    }

    #[test]
    fn select_takes_several_ids() {
        let matches = cli()
            .try_get_matches_from(["trailsync", "select", "path-foundation", "kata-01"])
            .unwrap();
        let (name, args) = matches.subcommand().unwrap();
        assert_eq!(name, "select");
        assert_eq!(ids(args), vec!["path-foundation", "kata-01"]);
    }

    #[test]
    fn builtin_mapping_expands() {
        let mapping = load_mapping(&SyncConfig::new()).unwrap();
        assert!(mapping.contains("path-foundation"));
    }
}
