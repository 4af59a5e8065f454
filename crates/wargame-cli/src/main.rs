use anyhow::{anyhow, bail, Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};
use wargame_channel::{game_state_reader, game_state_writer, publish_game_state, TimerDisplay};
use wargame_roles::{Facilitator, Mode, Notetaker, Role, WargameConfig, WhiteCell, Workspace};
use wargame_store::{
    create_backup, restore_backup, Backup, DirectorySink, LegacyMigrator, Move, Phase, SessionId,
    SessionKeyStore, SessionResolver,
};
use wargame_timeline::{aggregate, search, Feed, Team};

fn session_arg() -> Arg {
    Arg::new("session")
        .long("session")
        .help("Session id; defaults to the persisted current session")
}

fn move_arg() -> Arg {
    Arg::new("move")
        .long("move")
        .default_value("1")
        .value_parser(value_parser!(i64))
        .help("Move number (1-3)")
}

fn cli() -> Command {
    Command::new("wargame")
        .version(wargame_roles::VERSION)
        .about("Inspect and maintain wargame session storage")
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .default_value("wargame.toml")
                .value_parser(value_parser!(PathBuf))
                .help("Configuration file; defaults apply when it does not exist"),
        )
        .subcommand_required(true)
        .subcommand(
            Command::new("migrate")
                .about("Copy legacy unscoped keys into a session")
                .arg(session_arg())
                .arg(
                    Arg::new("dry-run")
                        .long("dry-run")
                        .action(ArgAction::SetTrue)
                        .help("Only print the planned copies"),
                ),
        )
        .subcommand(Command::new("cleanup-legacy").about("Remove every legacy unscoped key"))
        .subcommand(
            Command::new("backup")
                .about("Write a verbatim snapshot of one session")
                .arg(session_arg())
                .arg(
                    Arg::new("out")
                        .long("out")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Backup file to write"),
                ),
        )
        .subcommand(
            Command::new("restore")
                .about("Write every entry of a backup back into storage")
                .arg(
                    Arg::new("file")
                        .long("file")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Backup file to read"),
                ),
        )
        .subcommand(
            Command::new("timeline")
                .about("Print the merged timeline of a move")
                .arg(session_arg())
                .arg(move_arg())
                .arg(Arg::new("team").long("team").help("Only items of this team"))
                .arg(Arg::new("search").long("search").help("Case-insensitive text filter"))
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output as JSON"),
                ),
        )
        .subcommand(
            Command::new("status")
                .about("Show the published game state and timer")
                .arg(session_arg()),
        )
        .subcommand(
            Command::new("publish")
                .about("Publish a move and phase as the White Cell")
                .arg(session_arg())
                .arg(move_arg())
                .arg(
                    Arg::new("phase")
                        .long("phase")
                        .default_value("1")
                        .help("Phase number or name"),
                ),
        )
        .subcommand(
            Command::new("export")
                .about("Export a role's data for every move")
                .arg(session_arg())
                .arg(
                    Arg::new("role")
                        .long("role")
                        .required(true)
                        .help("facilitator, notetaker or white-cell"),
                ),
        )
}

fn load_config(path: &Path) -> Result<WargameConfig> {
    if path.exists() {
        WargameConfig::load(path).with_context(|| format!("loading {}", path.display()))
    } else {
        info!(path = %path.display(), "no configuration file, using defaults");
        Ok(WargameConfig::default())
    }
}

fn resolve_session(store: &SessionKeyStore, args: &ArgMatches) -> SessionId {
    match args.get_one::<String>("session") {
        Some(id) => {
            let session = SessionId::new(id.as_str());
            store.bind_session(session.clone());
            session
        }
        None => SessionResolver::new(store).resolve(None),
    }
}

fn move_of(args: &ArgMatches) -> Result<Move> {
    let number = args.get_one::<i64>("move").copied().unwrap_or(1);
    Ok(Move::new(number)?)
}

fn migrate(store: &SessionKeyStore, config: &WargameConfig, args: &ArgMatches) -> Result<()> {
    let session = resolve_session(store, args);
    let sink = DirectorySink::new(&config.export_dir);
    let migrator = LegacyMigrator::new(store).with_sink(&sink);
    if args.get_flag("dry-run") {
        let plan = migrator.plan(&session);
        for copy in &plan.copies {
            println!("{} -> {}", copy.legacy, copy.target);
        }
        println!("{} planned copies for session {session}", plan.copies.len());
        return Ok(());
    }
    let report = migrator.run(&session);
    if report.already_migrated {
        println!("Session {session} was already migrated");
    } else {
        println!("Copied {} keys into session {session}", report.copied.len());
    }
    Ok(())
}

fn backup(store: &SessionKeyStore, args: &ArgMatches) -> Result<()> {
    let session = resolve_session(store, args);
    let out = args
        .get_one::<PathBuf>("out")
        .ok_or_else(|| anyhow!("--out is required"))?;
    let snapshot = create_backup(store, &session);
    std::fs::write(out, serde_json::to_string_pretty(&snapshot)?)
        .with_context(|| format!("writing {}", out.display()))?;
    println!("Backed up {} entries of session {session}", snapshot.data.len());
    Ok(())
}

fn restore(store: &SessionKeyStore, args: &ArgMatches) -> Result<()> {
    let file = args
        .get_one::<PathBuf>("file")
        .ok_or_else(|| anyhow!("--file is required"))?;
    let text = std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let snapshot: Backup = serde_json::from_str(&text).context("parsing backup")?;
    let restored = restore_backup(store, &snapshot)?;
    println!("Restored {restored} entries of session {}", snapshot.session_id);
    Ok(())
}

fn timeline(store: Arc<SessionKeyStore>, args: &ArgMatches) -> Result<()> {
    let session = resolve_session(&store, args);
    let mv = move_of(args)?;
    let phase = game_state_reader(Arc::clone(&store), &session)
        .read()
        .map_or_else(Phase::default, |state| state.phase);
    let feed = Feed::new(&store, session, mv);
    let mut items = aggregate([feed.white_cell_items(None), feed.blue_sources(phase)]);
    if let Some(team) = args.get_one::<String>("team") {
        let team: Team = team.parse().map_err(|e: String| anyhow!(e))?;
        items.retain(|item| item.team == Some(team));
    }
    let items: Vec<_> = match args.get_one::<String>("search") {
        Some(query) => search(&items, query).into_iter().cloned().collect(),
        None => items,
    };

    if args.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }
    for item in &items {
        println!(
            "{:<25} {:<6} {:<15} {}",
            item.time.as_deref().unwrap_or("-"),
            item.team.map_or("-", Team::as_str),
            item.item_type.as_str(),
            item.title.as_deref().or(item.content.as_deref()).unwrap_or(""),
        );
    }
    println!("{} items in move {mv}", items.len());
    Ok(())
}

fn status(store: Arc<SessionKeyStore>, config: &WargameConfig, args: &ArgMatches) {
    let session = resolve_session(&store, args);
    println!("Session: {session}");
    match game_state_reader(Arc::clone(&store), &session).read() {
        Some(state) => {
            println!("Move:    {}", state.move_number);
            println!("Phase:   {} ({})", state.phase.number(), state.phase.name());
        }
        None => println!("No game state published"),
    }
    let reading = TimerDisplay::new(store, &session, config.timer).reading();
    println!(
        "Timer:   {} ({}, {:?})",
        reading.formatted(),
        if reading.running { "running" } else { "paused" },
        reading.urgency,
    );
}

fn publish(store: Arc<SessionKeyStore>, args: &ArgMatches) -> Result<()> {
    let session = resolve_session(&store, args);
    let mv = move_of(args)?;
    let raw = args.get_one::<String>("phase").map_or("1", String::as_str);
    let phase: Phase = match raw.parse::<i64>() {
        Ok(number) => Phase::from_number(number)?,
        Err(_) => raw.parse()?,
    };
    let channel = game_state_writer(Arc::clone(&store), &session);
    let state = publish_game_state(&channel, &store, mv, phase)?;
    println!("Published move {} phase {} for session {session}", state.move_number, state.phase.number());
    Ok(())
}

fn export(store: Arc<SessionKeyStore>, config: &WargameConfig, args: &ArgMatches) -> Result<()> {
    let session = resolve_session(&store, args);
    let role: Role = args
        .get_one::<String>("role")
        .ok_or_else(|| anyhow!("--role is required"))?
        .parse()
        .map_err(|e: String| anyhow!(e))?;
    let sink = DirectorySink::new(&config.export_dir);
    let filename = match role {
        Role::Facilitator => {
            let mut workspace = Facilitator::new(store, session, Move::FIRST, config);
            workspace.load(Mode::Lenient)?;
            workspace.export(&sink)?
        }
        Role::Notetaker => {
            let mut workspace = Notetaker::new(store, session, Move::FIRST, config);
            workspace.load(Mode::Lenient)?;
            workspace.export(&sink)?
        }
        Role::WhiteCell => {
            let mut workspace = WhiteCell::new(store, session, Move::FIRST, config);
            workspace.load(Mode::Lenient)?;
            workspace.export(&sink)?
        }
    };
    println!("Wrote {}", config.export_dir.join(filename).display());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init();

    let matches = cli().get_matches();
    let config_path = matches
        .get_one::<PathBuf>("config")
        .cloned()
        .unwrap_or_else(|| PathBuf::from("wargame.toml"));
    let config = load_config(&config_path)?;
    let store = Arc::new(config.open_store()?);

    match matches.subcommand() {
        Some(("migrate", args)) => migrate(&store, &config, args)?,
        Some(("cleanup-legacy", _)) => {
            let removed = LegacyMigrator::new(&store).cleanup_legacy_keys();
            println!("Removed {removed} legacy keys");
        }
        Some(("backup", args)) => backup(&store, args)?,
        Some(("restore", args)) => restore(&store, args)?,
        Some(("timeline", args)) => timeline(store, args)?,
        Some(("status", args)) => status(store, &config, args),
        Some(("publish", args)) => publish(store, args)?,
        Some(("export", args)) => export(store, &config, args)?,
        Some((other, _)) => bail!("unknown command: {other}"),
        None => bail!("no command given"),
    }
    Ok(())
}
