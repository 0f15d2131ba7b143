use std::fs;
use std::io::BufRead as _;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};

use anyhow::Context as _;
use directories::ProjectDirs;
use pageturner_application::{AppContext, Command, Flow, NavigationEngine, Piece, Viewport};
use pageturner_engine::{
    Completion, Converter, FolderScanRuntime, HeaderGeometry, ProtocolEvent, ScanAcquisitionProtocol,
    ScanConfig, TransferMode,
};
use pageturner_storage::{
    DATABASE_FILE_NAME, OPTIONS_FILE_NAME, STARTUP_FILE_NAME, StartupRecord, Storage,
    load_options, save_options,
};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const HOME_ENV: &str = "PAGETURNER_HOME";
const SCAN_TICK: Duration = Duration::from_millis(100);
const DEFAULT_VIEWPORT: (f64, f64) = (1024.0, 768.0);

fn main() {
    init_tracing();
    if let Err(err) = run() {
        error!("{err:?}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_filter(env_filter),
        )
        .init();
}

#[derive(Debug, Default)]
struct Args {
    piece: Option<PathBuf>,
    program: Option<PathBuf>,
    resume: bool,
    scan_dir: Option<PathBuf>,
    inbox: Option<PathBuf>,
    by_file: bool,
    poll: bool,
    convert: Option<(PathBuf, PathBuf)>,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut parsed = Args::default();
    let mut args = std::env::args_os().skip(1);
    while let Some(arg) = args.next() {
        let arg_str = arg.to_string_lossy();
        match arg_str.as_ref() {
            "--piece" => {
                let value = args.next().context("missing value for --piece")?;
                parsed.piece = Some(PathBuf::from(value));
            }
            "--program" => {
                let value = args.next().context("missing value for --program")?;
                parsed.program = Some(PathBuf::from(value));
            }
            "--resume" => parsed.resume = true,
            "--scan" => {
                let value = args.next().context("missing value for --scan")?;
                parsed.scan_dir = Some(PathBuf::from(value));
            }
            "--inbox" => {
                let value = args.next().context("missing value for --inbox")?;
                parsed.inbox = Some(PathBuf::from(value));
            }
            "--by-file" => parsed.by_file = true,
            "--poll" => parsed.poll = true,
            "--convert" => {
                let pdf = args.next().context("missing PDF for --convert")?;
                let dest = args.next().context("missing destination for --convert")?;
                parsed.convert = Some((PathBuf::from(pdf), PathBuf::from(dest)));
            }
            other => anyhow::bail!("unknown arg: {other}"),
        }
    }
    let sources = [parsed.piece.is_some(), parsed.program.is_some(), parsed.resume]
        .into_iter()
        .filter(|set| *set)
        .count();
    if sources > 1 {
        anyhow::bail!("use only one of --piece, --program and --resume");
    }
    if parsed.scan_dir.is_some() != parsed.inbox.is_some() {
        anyhow::bail!("--scan and --inbox go together");
    }
    Ok(parsed)
}

fn home_dir() -> anyhow::Result<PathBuf> {
    let dir = match std::env::var_os(HOME_ENV) {
        Some(dir) => PathBuf::from(dir),
        None => ProjectDirs::from("org", "pageturner", "pageturner")
            .context("resolve project dirs")?
            .config_dir()
            .to_path_buf(),
    };
    fs::create_dir_all(&dir).with_context(|| format!("create config dir {}", dir.display()))?;
    Ok(dir)
}

enum Event {
    Line(String),
    Closed,
}

fn run() -> anyhow::Result<()> {
    let args = parse_args()?;
    let home = home_dir()?;
    let options_path = home.join(OPTIONS_FILE_NAME);
    let startup_path = home.join(STARTUP_FILE_NAME);

    let settings = load_options(&options_path)?.unwrap_or_default();
    let startup = StartupRecord::load(&startup_path)?;
    let storage = Storage::open(home.join(DATABASE_FILE_NAME))?;
    info!(home = %home.display(), view_mode = %settings.view_mode, "starting");

    let (width, height) = DEFAULT_VIEWPORT;
    let mut nav = NavigationEngine::new(
        Box::new(HeaderGeometry::new()),
        settings.view_mode,
        Viewport::new(width, height),
    );
    let mut ctx = AppContext::new(settings)
        .with_store(Box::new(storage))
        .with_startup(startup);

    if let Err(err) = open_initial(&args, &mut ctx, &mut nav) {
        warn!("{err:#}");
        println!("{err:#}");
    }

    let mut scan = match (&args.scan_dir, &args.inbox) {
        (Some(dir), Some(inbox)) => Some(start_scan(dir, inbox, &args)?),
        _ => None,
    };

    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else {
                break;
            };
            if tx.send(Event::Line(line)).is_err() {
                return;
            }
        }
        let _ = tx.send(Event::Closed);
    });

    print_status(&mut ctx);
    let mut last_tick = Instant::now();
    loop {
        let timer = ctx.timer_interval();
        let mut wait = timer.map(|interval| interval.saturating_sub(last_tick.elapsed()));
        if scan.is_some() {
            wait = Some(wait.map_or(SCAN_TICK, |w| w.min(SCAN_TICK)));
        }
        let received = match wait {
            Some(wait) => rx.recv_timeout(wait),
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        match received {
            Ok(Event::Line(line)) => {
                let was_running = ctx.timer_running();
                let command = if ctx.awaiting_text() && !line.starts_with(':') {
                    Some(Command::BeginAnnotate(line.clone()))
                } else {
                    Command::parse_line(&line)
                };
                let Some(command) = command else {
                    println!("unknown command: {line}");
                    continue;
                };
                let command = match (command, scan.as_mut()) {
                    (Command::RetryScan, Some(protocol)) => {
                        match protocol.retry_transfer() {
                            Some(event) => handle_scan_event(event, protocol, &mut ctx, &mut nav),
                            None => println!("no failed transfer to retry"),
                        }
                        continue;
                    }
                    (Command::StopScan, Some(protocol)) => {
                        protocol.terminate();
                        println!("scanner closed");
                        continue;
                    }
                    (command, _) => command,
                };
                if ctx.apply(command, &mut nav) == Flow::Quit {
                    break;
                }
                if ctx.timer_running() != was_running {
                    last_tick = Instant::now();
                }
                print_status(&mut ctx);
            }
            Ok(Event::Closed) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }

        match ctx.timer_interval() {
            Some(interval) if last_tick.elapsed() >= interval => {
                last_tick = Instant::now();
                ctx.apply(Command::Tick, &mut nav);
                print_status(&mut ctx);
            }
            Some(_) => {}
            None => last_tick = Instant::now(),
        }

        if let Some(protocol) = scan.as_mut() {
            let mut events = protocol.pump();
            events.extend(protocol.poll());
            for event in events {
                handle_scan_event(event, protocol, &mut ctx, &mut nav);
            }
        }
    }

    if let Some(mut protocol) = scan.take() {
        protocol.terminate();
    }
    if let Err(err) = ctx.save_piece_state(nav.view_mode()) {
        warn!("{err:#}");
    }
    save_options(&options_path, &ctx.settings)?;
    ctx.startup.save(&startup_path)?;
    Ok(())
}

fn open_initial(args: &Args, ctx: &mut AppContext, nav: &mut NavigationEngine) -> anyhow::Result<()> {
    if let Some((pdf, dest)) = &args.convert {
        let converter = Converter::locate(ctx.settings.magick_home.as_deref())?;
        converter
            .convert(pdf, dest)
            .with_context(|| format!("convert {}", pdf.display()))?;
        return ctx.load_piece(dest, nav);
    }
    if let Some(piece) = &args.piece {
        return ctx.load_piece(piece, nav);
    }
    if let Some(program) = &args.program {
        return ctx.load_program(program, nav);
    }
    if args.resume && !ctx.resume(nav)? {
        println!("nothing to resume");
    }
    Ok(())
}

fn start_scan(dir: &Path, inbox: &Path, args: &Args) -> anyhow::Result<ScanAcquisitionProtocol> {
    fs::create_dir_all(dir).with_context(|| format!("create piece dir {}", dir.display()))?;
    let mut config = ScanConfig::new(dir);
    if args.poll {
        config.completion = Completion::Poll;
    }
    if args.by_file {
        config.transfer = TransferMode::ByFile;
    }
    let mut protocol = ScanAcquisitionProtocol::new(Box::new(FolderScanRuntime::new(inbox)), config);
    if protocol.open_source()? {
        protocol.request_acquire()?;
        println!("scanning into {}", dir.display());
    } else {
        println!("no scanner source");
    }
    Ok(protocol)
}

fn handle_scan_event(
    event: ProtocolEvent,
    protocol: &mut ScanAcquisitionProtocol,
    ctx: &mut AppContext,
    nav: &mut NavigationEngine,
) {
    match event {
        ProtocolEvent::PageAcquired { path, page } => {
            println!("acquired page {page}: {}", path.display());
            nav.forget_page(&path);
            let dir = protocol.config().target_dir.clone();
            if let Err(err) = ctx.load_piece(&dir, nav) {
                warn!("{err:#}");
            }
            if let Err(err) = protocol.request_acquire() {
                warn!("next acquire: {err}");
            }
        }
        ProtocolEvent::TransferFailed(reason) => {
            println!("transfer failed: {reason}");
            println!("type :retry-scan to try the same page again or :stop-scan to stop");
        }
        ProtocolEvent::CloseRequested => {
            protocol.terminate();
            println!("scanner closed");
        }
    }
}

fn print_status(ctx: &mut AppContext) {
    let mut line = ctx.status_line();
    if let Some(progress) = ctx.piece.as_ref().map(Piece::progress) {
        line.push_str(&format!("    Page {progress}"));
    }
    if let Some(message) = ctx.take_message() {
        line.push_str(&format!("    {message}"));
    }
    println!("{line}");
}
