use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use collaboard_sync::grammar::{GrammarError, parse_changes, parse_snapshot, serialize_snapshot};
use collaboard_sync::net::connection::ConnectionStatus;
use collaboard_sync::net::transport::{Credential, WireFormat};
use collaboard_sync::net::types::Frame;
use collaboard_sync::state::viewport::{CellCode, InvalidCell, Viewport, ViewportGrid};
use collaboard_sync::{BoardState, ClientError, ConfigError, SessionEvent, SyncClient, SyncConfig};
use tracing::info;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("config: {0}")]
    Config(#[from] ConfigError),
    #[error("read {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("{path}: {source}")]
    Grammar { path: PathBuf, source: GrammarError },
    #[error(transparent)]
    Cell(#[from] InvalidCell),
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("{0} request(s) failed")]
    RequestsFailed(usize),
}

#[derive(Parser, Debug)]
#[command(name = "collab-sync", about = "CollabBoard real-time sync client")]
struct Cli {
    #[arg(long, env = "COLLAB_BASE_URL")]
    base_url: Option<String>,

    #[arg(long, env = "COLLAB_SESSION_TOKEN")]
    session_token: Option<String>,

    #[arg(long, env = "COLLAB_WS_TICKET")]
    ws_ticket: Option<String>,

    /// Send JSON text frames instead of protobuf.
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check a snapshot or changes document without connecting.
    Validate(ValidateArgs),
    /// Print the A1..H8 grid context for a viewport.
    Grid(GridArgs),
    /// Join a board and log everything that happens on it.
    Watch(WatchArgs),
    /// Join a board and print its objects as a snapshot document.
    Snapshot(BoardArgs),
    /// Apply a changes document to a live board.
    Apply(ApplyArgs),
    /// Send a prompt to the board assistant and print its reply.
    Prompt(PromptArgs),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum DocumentKind {
    Snapshot,
    Changes,
}

#[derive(Args, Debug)]
struct ValidateArgs {
    path: PathBuf,
    /// Document kind; guessed from the first line when omitted.
    #[arg(long, value_enum)]
    kind: Option<DocumentKind>,
}

#[derive(Args, Debug)]
struct GridArgs {
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    x: f64,
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    y: f64,
    #[arg(long, default_value_t = 1.0)]
    scale: f64,
    #[arg(long, default_value_t = 1280.0)]
    width: f64,
    #[arg(long, default_value_t = 800.0)]
    height: f64,
    /// Print only the canvas centre of this cell.
    #[arg(long)]
    cell: Option<String>,
}

#[derive(Args, Debug)]
struct BoardArgs {
    #[arg(long)]
    board: String,
    /// Give up after this many seconds.
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,
}

#[derive(Args, Debug)]
struct WatchArgs {
    #[arg(long)]
    board: String,
    /// Stop after this many seconds; runs until the transport closes when omitted.
    #[arg(long)]
    for_secs: Option<u64>,
}

#[derive(Args, Debug)]
struct ApplyArgs {
    #[command(flatten)]
    board: BoardArgs,
    path: PathBuf,
}

#[derive(Args, Debug)]
struct PromptArgs {
    #[command(flatten)]
    board: BoardArgs,
    text: String,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    match cli.command {
        Command::Validate(ref args) => run_validate(args),
        Command::Grid(ref args) => run_grid(args),
        Command::Watch(ref args) => run_watch(&cli, args).await,
        Command::Snapshot(ref args) => run_snapshot(&cli, args).await,
        Command::Apply(ref args) => run_apply(&cli, args).await,
        Command::Prompt(ref args) => run_prompt(&cli, args).await,
    }
}

// =============================================================================
// offline
// =============================================================================

fn run_validate(args: &ValidateArgs) -> Result<(), CliError> {
    let text = read_document(&args.path)?;
    let kind = args.kind.unwrap_or_else(|| guess_kind(&text));
    let grammar = |source| CliError::Grammar { path: args.path.clone(), source };
    match kind {
        DocumentKind::Snapshot => {
            let snapshot = parse_snapshot(&text).map_err(grammar)?;
            println!("ok: snapshot with {} object(s)", snapshot.objects.len());
        }
        DocumentKind::Changes => {
            let changes = parse_changes(&text).map_err(grammar)?;
            println!(
                "ok: {} create, {} update, {} delete",
                changes.create.len(),
                changes.update.len(),
                changes.delete.len()
            );
        }
    }
    Ok(())
}

fn guess_kind(text: &str) -> DocumentKind {
    let first = text.lines().map(str::trim).find(|line| !line.is_empty()).unwrap_or_default();
    if first.starts_with("objects:") { DocumentKind::Snapshot } else { DocumentKind::Changes }
}

fn run_grid(args: &GridArgs) -> Result<(), CliError> {
    let grid = ViewportGrid::new(Viewport::new(args.x, args.y, args.scale), args.width, args.height);
    if let Some(cell) = &args.cell {
        let cell = cell.parse::<CellCode>()?;
        let at = grid.cell_to_canvas(cell);
        println!("{cell}=({},{})", at.x.round(), at.y.round());
        return Ok(());
    }
    println!("{}", grid.build_grid_context());
    Ok(())
}

// =============================================================================
// live
// =============================================================================

fn sync_config(cli: &Cli) -> Result<SyncConfig, CliError> {
    let mut config = SyncConfig::from_env()?;
    if let Some(base_url) = &cli.base_url {
        config.transport.base_url = base_url.trim_end_matches('/').to_owned();
    }
    if let Some(ticket) = &cli.ws_ticket {
        config.transport.credential = Credential::Ticket(ticket.clone());
    } else if let Some(token) = &cli.session_token {
        config.transport.credential = Credential::SessionToken(token.clone());
    }
    if cli.json {
        config.transport.wire_format = WireFormat::Json;
    }
    Ok(config)
}

/// Connect and join `board`, waiting until its snapshot has loaded.
async fn join(cli: &Cli, board: &str, limit: Duration) -> Result<SyncClient, CliError> {
    let mut client = SyncClient::connect(sync_config(cli)?);
    client
        .run_until(limit, |session, _| session.status() == ConnectionStatus::Connected)
        .await?;
    client.session_mut().join_board(board);
    client
        .run_until(limit, |session, _| session.state().pending_join_id.is_none())
        .await?;
    info!(board, objects = client.session().objects().len(), "joined board");
    Ok(client)
}

async fn run_watch(cli: &Cli, args: &WatchArgs) -> Result<(), CliError> {
    let mut client = join(cli, &args.board, Duration::from_secs(30)).await?;
    for syscall in ["object:create", "object:update", "object:delete"] {
        client.session_mut().subscribe(syscall, |state: &mut BoardState, frame: &Frame| {
            info!(syscall = %frame.syscall, objects = state.objects.len(), "board changed");
        });
    }
    client.session_mut().subscribe("cursor:moved", |state: &mut BoardState, _frame: &Frame| {
        info!(peers = state.presence.len(), "cursor moved");
    });

    let deadline = args.for_secs.map(|secs| tokio::time::Instant::now() + Duration::from_secs(secs));
    loop {
        let step = match deadline {
            Some(at) => match tokio::time::timeout_at(at, client.step()).await {
                Ok(step) => step,
                Err(_) => break,
            },
            None => client.step().await,
        };
        let Some(events) = step else {
            break;
        };
        for event in events {
            info!(?event, "session event");
        }
    }
    client.close();
    Ok(())
}

async fn run_snapshot(cli: &Cli, args: &BoardArgs) -> Result<(), CliError> {
    let client = join(cli, &args.board, Duration::from_secs(args.timeout_secs)).await?;
    print!("{}", serialize_snapshot(&client.session().snapshot()));
    client.close();
    Ok(())
}

async fn run_apply(cli: &Cli, args: &ApplyArgs) -> Result<(), CliError> {
    let text = read_document(&args.path)?;
    let changes = parse_changes(&text).map_err(|source| CliError::Grammar { path: args.path.clone(), source })?;

    let limit = Duration::from_secs(args.board.timeout_secs);
    let mut client = join(cli, &args.board.board, limit).await?;
    let issued = client.session_mut().apply_changes(&changes);
    info!(issued, "changes sent");

    let events = client.run_until(limit, |session, _| session.state().correlator.is_empty()).await?;
    let failed = report_failures(&events);
    client.close();
    if failed > 0 {
        return Err(CliError::RequestsFailed(failed));
    }
    println!("applied {issued} change(s)");
    Ok(())
}

async fn run_prompt(cli: &Cli, args: &PromptArgs) -> Result<(), CliError> {
    let limit = Duration::from_secs(args.board.timeout_secs);
    let mut client = join(cli, &args.board.board, limit).await?;
    let request_id = client.session_mut().prompt_ai(&args.text);

    let events = client
        .run_until(limit, |session, _| !session.state().correlator.is_pending(&request_id))
        .await?;
    for event in &events {
        match event {
            SessionEvent::AiReply { text } => println!("{text}"),
            SessionEvent::AiMutationsRejected { error } => eprintln!("assistant changes rejected: {error}"),
            _ => {}
        }
    }
    let failed = report_failures(&events);
    client.close();
    if failed > 0 {
        return Err(CliError::RequestsFailed(failed));
    }
    Ok(())
}

fn report_failures(events: &[SessionEvent]) -> usize {
    let mut failed = 0;
    for event in events {
        match event {
            SessionEvent::RequestFailed { syscall, message, code, .. } => {
                failed += 1;
                eprintln!("{syscall} failed: {message} ({})", code.as_deref().unwrap_or("no code"));
            }
            SessionEvent::RequestCancelled { syscall, .. } => {
                failed += 1;
                eprintln!("{syscall} cancelled");
            }
            _ => {}
        }
    }
    failed
}

fn read_document(path: &Path) -> Result<String, CliError> {
    std::fs::read_to_string(path).map_err(|source| CliError::Read { path: path.to_path_buf(), source })
}
