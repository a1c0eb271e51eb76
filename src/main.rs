use std::{path::PathBuf, process::ExitCode, sync::Arc};

use clap::{Parser, Subcommand};

use script_server::{
    client::{ServerAddress, ServerClient},
    config::{ConsoleSettings, DEFAULT_IP, DEFAULT_PORT, ServerConfig},
    console::ConsoleSession,
    interpreter::RhaiInterpreter,
    log_sink::LogSink,
    repl,
    server::{Server, ServerControl},
    tui::{ConsoleApp, ConsoleControl},
};

/// Serve script commands over TCP, or drive the interpreter interactively.
#[derive(Parser, Debug)]
#[command(name = "script-server", version)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Run the command server until a client evaluates quit().
    Serve {
        /// Address to listen on. Host names listen on every resolved address.
        #[arg(long)]
        ip: Option<String>,

        /// TCP port to listen on.
        #[arg(long)]
        port: Option<u16>,

        /// Append the server log to this file instead of stdout.
        #[arg(long, value_name = "FILE")]
        logfile: Option<PathBuf>,

        /// JSON file with `ip`, `port` and `logfile` defaults.
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
    },

    /// Interactive console with history recall.
    Console {
        /// Where command history is kept between sessions.
        #[arg(long, value_name = "FILE")]
        settings: Option<PathBuf>,

        /// Where Ctrl-S saves the transcript.
        #[arg(long, value_name = "FILE", default_value = "console-transcript.txt")]
        transcript: PathBuf,
    },

    /// Send commands to a running server.
    Send {
        #[arg(long, default_value = DEFAULT_IP)]
        host: String,

        #[arg(long, default_value_t = DEFAULT_PORT)]
        port: u16,

        /// Send this one command and exit; without it an interactive prompt opens.
        #[arg(short, long)]
        command: Option<String>,
    },
}

fn main() -> anyhow::Result<ExitCode> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    match Cli::parse().mode {
        Mode::Serve {
            ip,
            port,
            logfile,
            config,
        } => {
            let base = match config {
                Some(path) => ServerConfig::load(&path)?,
                None => ServerConfig::default(),
            };
            serve(base.with_overrides(ip, port, logfile))
        }
        Mode::Console {
            settings,
            transcript,
        } => console(settings.unwrap_or_else(ConsoleSettings::default_path), transcript),
        Mode::Send {
            host,
            port,
            command,
        } => send(&ServerAddress::new(&host, port), command),
    }
}

fn serve(config: ServerConfig) -> anyhow::Result<ExitCode> {
    let log = LogSink::from_path(config.logfile.as_deref())?;
    let control = ServerControl::new();
    let interpreter = RhaiInterpreter::new(Arc::new(control.clone()));

    let mut server = Server::bind(&config, interpreter, control, log)?;
    server.run();
    Ok(ExitCode::SUCCESS)
}

fn console(settings_path: PathBuf, transcript_path: PathBuf) -> anyhow::Result<ExitCode> {
    let settings = ConsoleSettings::load(&settings_path)?;
    let control = ConsoleControl::new();
    let interpreter = RhaiInterpreter::new(Arc::new(control.clone()));
    let session = ConsoleSession::new(interpreter, &settings)?;

    let session = ConsoleApp::new(session, control, transcript_path).run()?;
    session.settings().save(&settings_path)?;
    Ok(ExitCode::SUCCESS)
}

fn send(address: &ServerAddress, command: Option<String>) -> anyhow::Result<ExitCode> {
    let mut client = ServerClient::connect(address)?;

    let Some(command) = command else {
        repl::run(&mut client)?;
        return Ok(ExitCode::SUCCESS);
    };

    let response = client.send_command(&command)?;
    repl::print_response(response.is_error(), response.body());
    Ok(if response.is_error() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
