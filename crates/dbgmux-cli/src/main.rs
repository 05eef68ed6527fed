//! dbgmux - console front-end over the link core
//!
//! Spawns or accepts the selected backend, bridges user input to link
//! operations, and prints broadcast events. The link layer stays
//! single-threaded: the main loop interleaves backend readiness with user
//! commands and never holds a command across an await it does not own.

mod args;
mod console;

use args::Args;
use clap::Parser;
use console::UserCommand;
use dbgmux_backends::{create_link, BackendKind, StreamTransport, Transport};
use dbgmux_config::Config;
use dbgmux_core::Result;
use dbgmux_link::DebuggerLink;
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;
use tracing::{info, warn};

fn main() -> std::process::ExitCode {
    let args = Args::parse();
    dbgmux_logging::init(dbgmux_logging::LogConfig::cli(args.debug));

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("tokio runtime");

    match runtime.block_on(run(args)) {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("dbgmux: {}", err);
            std::process::ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let config = dbgmux_config::load()?;
    let kind = args.backend_kind();
    info!(?kind, "selecting backend");

    let (transport, mut child) = connect_backend(kind, &config).await?;
    let mut link = create_link(kind, transport, &config);

    // event printer: reads the broadcast subscription, owns stdout
    let mut events = link.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Some(line) = console::render_event(&event) {
                        println!("{}", line);
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    if let Some(program) = &args.program {
        link.set_program(program).await?;
    }
    if let Some(core) = &args.core {
        link.set_core(core).await?;
    }
    for file in &args.files {
        // source windows are the GUI's business; note the request
        info!(%file, "source file requested at startup");
    }
    seed_breakpoints(link.as_mut(), &args).await?;

    // user input arrives over a channel so the main loop can race it
    // against backend readiness without holding two borrows
    let (input_tx, mut input_rx) = mpsc::channel::<String>(16);
    tokio::spawn(async move {
        let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if input_tx.send(line).await.is_err() {
                break;
            }
        }
    });

    enum Turn {
        Backend(Result<()>),
        User(Option<String>),
    }

    loop {
        let turn = tokio::select! {
            biased;
            result = link.process_available() => Turn::Backend(result),
            line = input_rx.recv() => Turn::User(line),
        };

        match turn {
            Turn::Backend(Ok(())) => {}
            Turn::Backend(Err(err)) => {
                warn!(%err, "backend connection lost");
                if !config.restart.auto_restart {
                    break;
                }
                let (transport, new_child) = connect_backend(kind, &config).await?;
                link.replace_transport(transport);
                child = new_child;
                link.restart().await?;
            }
            Turn::User(None) => break,
            Turn::User(Some(line)) => {
                let Some(cmd) = console::parse_line(&line) else {
                    continue;
                };
                if cmd == UserCommand::Quit {
                    break;
                }
                if let Err(err) = dispatch(link.as_mut(), cmd).await {
                    eprintln!("dbgmux: {}", err);
                }
            }
        }
    }

    save_breakpoints(link.as_mut());
    printer.abort();
    if let Some(mut child) = child {
        let _ = child.kill().await;
    }
    Ok(())
}

/// Establish the byte stream for the chosen backend family: a spawned
/// child's pipes for the line protocol, an accepted socket for the others.
async fn connect_backend(
    kind: BackendKind,
    config: &Config,
) -> Result<(Box<dyn Transport>, Option<tokio::process::Child>)> {
    match kind {
        BackendKind::Mi => {
            let mut child = tokio::process::Command::new(&config.mi.command)
                .arg("--interpreter=mi2")
                .stdin(std::process::Stdio::piped())
                .stdout(std::process::Stdio::piped())
                .spawn()
                .map_err(|e| {
                    dbgmux_core::Error::Transport(format!(
                        "cannot start {}: {}",
                        config.mi.command, e
                    ))
                })?;
            let stdout = child.stdout.take().expect("piped stdout");
            let stdin = child.stdin.take().expect("piped stdin");
            Ok((Box::new(StreamTransport::new(stdout, stdin)), Some(child)))
        }
        BackendKind::Jdwp => accept_one(config.jdwp.port).await,
        BackendKind::Xdebug => accept_one(config.xdebug.port).await,
    }
}

async fn accept_one(
    port: u16,
) -> Result<(Box<dyn Transport>, Option<tokio::process::Child>)> {
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
        .await
        .map_err(|e| dbgmux_core::Error::Transport(format!("cannot bind port {}: {}", port, e)))?;
    eprintln!("dbgmux: waiting for backend connection on port {}...", port);
    let (stream, peer) = listener
        .accept()
        .await
        .map_err(|e| dbgmux_core::Error::Transport(e.to_string()))?;
    info!(%peer, "backend connected");
    let (read, write) = stream.into_split();
    Ok((Box::new(StreamTransport::new(read, write)), None))
}

async fn seed_breakpoints(link: &mut dyn DebuggerLink, args: &Args) -> Result<()> {
    let mut seeds = Vec::new();
    for arg in &args.breakpoints {
        match dbgmux_core::Location::parse(arg) {
            Ok(location) => seeds.push(dbgmux_core::Breakpoint::pending(location)),
            Err(err) => eprintln!("dbgmux: ignoring -b {}: {}", arg, err),
        }
    }
    for saved in dbgmux_config::load_breakpoint_setup(&breakpoint_setup_path())? {
        seeds.push(saved.to_pending());
    }
    if seeds.is_empty() {
        return Ok(());
    }

    let directives = link.breakpoint_manager().load_saved_setup(seeds);
    link.apply_breakpoint_directives(directives).await
}

fn save_breakpoints(link: &mut dyn DebuggerLink) {
    let breakpoints: Vec<_> = link.breakpoint_manager().breakpoints().to_vec();
    if let Err(err) =
        dbgmux_config::save_breakpoint_setup(&breakpoints, &breakpoint_setup_path())
    {
        warn!(%err, "could not save breakpoints");
    }
}

fn breakpoint_setup_path() -> std::path::PathBuf {
    dbgmux_config::config_path()
        .parent()
        .map(|dir| dir.join("breakpoints.toml"))
        .unwrap_or_else(|| std::path::PathBuf::from("breakpoints.toml"))
}

async fn dispatch(link: &mut dyn DebuggerLink, cmd: UserCommand) -> Result<()> {
    match cmd {
        UserCommand::Run(cli_args) => link.run_program(&cli_args).await,
        UserCommand::Continue => link.continue_program().await,
        UserCommand::StepOver => link.step_over().await,
        UserCommand::StepInto => link.step_into().await,
        UserCommand::StepOut => link.step_out().await,
        UserCommand::Until(location) => link.run_until(&location).await,
        UserCommand::Interrupt => link.stop_program().await,
        UserCommand::Kill => link.kill_program().await,
        UserCommand::Break {
            location,
            temporary,
        } => link.set_breakpoint(&location, temporary).await,
        UserCommand::Delete(Some(index)) => link.remove_breakpoint(index).await,
        UserCommand::Delete(None) => link.remove_all_breakpoints().await,
        UserCommand::Enable(Some(index)) => link.set_breakpoint_enabled(index, true, false).await,
        UserCommand::Disable(Some(index)) => {
            link.set_breakpoint_enabled(index, false, false).await
        }
        UserCommand::Enable(None) => {
            let directives = link.breakpoint_manager().enable_all();
            link.apply_breakpoint_directives(directives).await
        }
        UserCommand::Disable(None) => {
            let directives = link.breakpoint_manager().disable_all();
            link.apply_breakpoint_directives(directives).await
        }
        UserCommand::Condition { index, expression } => {
            link.set_breakpoint_condition(index, expression.as_deref())
                .await
        }
        UserCommand::Ignore { index, count } => {
            link.set_breakpoint_ignore_count(index, count).await
        }
        UserCommand::ListBreakpoints => {
            for bp in link.breakpoint_manager().breakpoints() {
                let state = if bp.enabled { "enabled" } else { "disabled" };
                println!("#{} {} ({})", bp.debugger_index, bp.location, state);
            }
            link.request_breakpoints().await
        }
        UserCommand::Stack => link.request_stack().await,
        UserCommand::Threads => link.request_threads().await,
        UserCommand::Thread(id) => link.switch_to_thread(id).await,
        UserCommand::Frame(id) => link.switch_to_frame(id).await,
        UserCommand::Raw(text) => link.send_raw(&format!("{}\n", text)).await,
        UserCommand::Quit => Ok(()),
    }
}
