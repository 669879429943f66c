use std::path::PathBuf;
use std::process::ExitCode;

use autoinvite_cli::{commands, logging, readline};
use autoinvite_core::context::data_dir;
use autoinvite_core::{
    AppConfig, AppConfigExt, FilePattern, MonitorEvent, MonitorHandle, StartPosition, TailerConfig,
};
use clap::{Parser, Subcommand};
use tokio::sync::{broadcast, mpsc};
use tracing::error;

#[derive(Parser)]
#[command(version, about = "Invite players seen in the VRChat log to a group")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Watch the log and send invites until `exit` or Ctrl-C.
    Run {
        /// Directory holding output_log_*.txt.
        #[arg(long)]
        log_dir: Option<PathBuf>,
        /// Process the current log file from its first line.
        #[arg(long)]
        from_start: bool,
    },
    /// Log in and store the session.
    Login {
        #[arg(short, long)]
        username: String,
        #[arg(short, long, env = "AUTOINVITE_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Remove the stored session.
    Logout,
    /// Show the active configuration.
    Config,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let _guard = logging::init_logging(data_dir().map(|d| d.join("logs")).as_deref());
    let config = AppConfig::load();

    let result = match cli.command {
        Command::Run {
            log_dir,
            from_start,
        } => run(config, log_dir, from_start).await,
        Command::Login { username, password } => login(&config, username, password).await,
        Command::Logout => commands::logout(),
        Command::Config => commands::show_config(&config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn login(config: &AppConfig, username: String, password: Option<String>) -> Result<(), String> {
    let password = match password {
        Some(p) => p,
        None => commands::prompt_password()?,
    };
    commands::login(config, username, password).await
}

async fn run(config: AppConfig, log_dir: Option<PathBuf>, from_start: bool) -> Result<(), String> {
    let directory = commands::log_directory(&config, log_dir)?;
    let start = if from_start || config.log.start_from_beginning {
        StartPosition::Beginning
    } else {
        StartPosition::End
    };
    let tailer = TailerConfig {
        directory,
        pattern: FilePattern::new(&config.log.file_pattern),
        start,
    };

    let deps = commands::build_deps(&config)?;
    let handle = autoinvite_core::start_monitor(&config, tailer, deps);
    let printer = tokio::spawn(print_events(handle.subscribe()));

    // stdin is read on a plain thread so a pending read never holds up shutdown.
    let (line_tx, mut line_rx) = mpsc::channel::<String>(8);
    std::thread::spawn(move || {
        while let Ok(Some(line)) = readline() {
            if line_tx.blocking_send(line).is_err() {
                break;
            }
        }
    });

    let mut input_open = true;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = line_rx.recv(), if input_open => {
                let Some(line) = line else {
                    input_open = false;
                    continue;
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match respond(line, &handle).await {
                    Ok(true) => break,
                    Ok(false) => {}
                    Err(err) => println!("{err}"),
                }
            }
        }
    }

    handle.shutdown().await;
    if let Err(e) = printer.await {
        error!(error = %e, "Event printer failed");
    }
    Ok(())
}

async fn print_events(mut rx: broadcast::Receiver<MonitorEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => println!("{event}"),
            Err(broadcast::error::RecvError::Lagged(n)) => println!("({n} events not shown)"),
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[derive(Parser)]
#[command(no_binary_name = true, disable_version_flag = true)]
struct Console {
    #[command(subcommand)]
    command: Option<ConsoleCommand>,
}

#[derive(Subcommand)]
enum ConsoleCommand {
    /// Hold all dispatch until `resume`.
    Pause,
    Resume,
    Status,
    /// Re-read the config file and apply its invite settings.
    Reload,
    Exit,
}

async fn respond(line: &str, handle: &MonitorHandle) -> Result<bool, String> {
    let args = shlex::split(line).ok_or("error: Invalid quoting")?;
    let console = Console::try_parse_from(args).map_err(|e| e.to_string())?;

    match console.command {
        Some(ConsoleCommand::Pause) => handle.pause().await?,
        Some(ConsoleCommand::Resume) => handle.resume().await?,
        Some(ConsoleCommand::Status) => commands::show_status(&handle.status()),
        Some(ConsoleCommand::Reload) => {
            let config = AppConfig::try_load().map_err(|e| e.to_string())?;
            handle.update_invite_settings(config.invite).await?;
        }
        Some(ConsoleCommand::Exit) => return Ok(true),
        None => {}
    }
    Ok(false)
}
