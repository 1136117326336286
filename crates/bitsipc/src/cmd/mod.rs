use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bitsipc_client::{Client, ClientConfig, DispatchMode, Scopes};
use clap::{Args, Subcommand};
use serde_json::Value;

use crate::exit::{client_error, CliError, CliResult, INTERNAL};
use crate::output::OutputFormat;

pub mod demo;
pub mod event;
pub mod listen;
pub mod request;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the interactive demo session (heartbeat, ping, bitsId).
    Demo(DemoArgs),
    /// Send a single event.
    Event(EventArgs),
    /// Send a request and print its result.
    Request(RequestArgs),
    /// Subscribe to events and print them as they arrive.
    Listen(ListenArgs),
}

/// Settings shared by every subcommand.
#[derive(Debug, Clone)]
pub struct Context {
    pub format: OutputFormat,
    pub config: ClientConfig,
}

pub fn run(command: Command, ctx: &Context) -> CliResult<i32> {
    match command {
        Command::Demo(args) => demo::run(args, ctx),
        Command::Event(args) => event::run(args, ctx),
        Command::Request(args) => request::run(args, ctx),
        Command::Listen(args) => listen::run(args, ctx),
    }
}

#[derive(Args, Debug)]
pub struct DemoArgs {
    /// Message center socket path.
    pub socket: PathBuf,
}

#[derive(Args, Debug)]
pub struct EventArgs {
    /// Message center socket path.
    pub socket: PathBuf,
    /// Event name, e.g. "bits-ipc#Client connected".
    pub event: String,
    /// Scope to route the event to (repeatable).
    #[arg(long = "scope", value_name = "SCOPE")]
    pub scopes: Vec<String>,
    /// JSON argument appended to the event params (repeatable).
    #[arg(long = "arg", value_name = "JSON")]
    pub args: Vec<String>,
}

#[derive(Args, Debug)]
pub struct RequestArgs {
    /// Message center socket path.
    pub socket: PathBuf,
    /// Request name, e.g. "base#System bitsId".
    pub event: String,
    /// Scope to route the request to (repeatable).
    #[arg(long = "scope", value_name = "SCOPE")]
    pub scopes: Vec<String>,
    /// JSON argument appended to the request params (repeatable).
    #[arg(long = "arg", value_name = "JSON")]
    pub args: Vec<String>,
    /// Maximum time to wait for the response (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Message center socket path.
    pub socket: PathBuf,
    /// Event names to subscribe to.
    #[arg(required = true, value_name = "EVENT")]
    pub events: Vec<String>,
    /// Scope the listeners are registered under (repeatable).
    #[arg(long = "scope", value_name = "SCOPE")]
    pub scopes: Vec<String>,
    /// Exit after receiving N events.
    #[arg(long)]
    pub count: Option<usize>,
}

/// Build a client for `socket`. Listeners are registered by the caller
/// before `start`, so they are announced as part of connecting.
pub(crate) fn build_client(socket: &Path, config: &ClientConfig) -> CliResult<Client> {
    Client::with_config(socket, config.clone())
        .map_err(|err| client_error("invalid client configuration", err))
}

pub(crate) fn start(client: &Client, mode: DispatchMode) -> CliResult<()> {
    client.start(mode).map_err(|err| {
        client_error(
            &format!("connect to {} failed", client.socket_path().display()),
            err,
        )
    })
}

pub(crate) fn scopes_from(values: &[String]) -> Scopes {
    Scopes::new(values.iter().cloned())
}

/// Parse each `--arg` as a JSON document.
pub(crate) fn parse_json_args(raw: &[String]) -> CliResult<Vec<Value>> {
    raw.iter()
        .map(|text| {
            serde_json::from_str(text)
                .map_err(|err| CliError::usage(format!("invalid --arg JSON {text:?}: {err}")))
        })
        .collect()
}

pub(crate) fn parse_duration(raw: &str) -> CliResult<Duration> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(CliError::usage("duration cannot be empty"));
    }

    let (number, unit_ms) = if let Some(ms) = value.strip_suffix("ms") {
        (ms, 1u64)
    } else if let Some(s) = value.strip_suffix('s') {
        (s, 1000u64)
    } else {
        (value, 1000u64)
    };

    let amount: u64 = number
        .trim()
        .parse()
        .map_err(|_| CliError::usage(format!("invalid duration: {raw}")))?;
    if amount == 0 {
        return Err(CliError::usage(format!("duration must be positive: {raw}")));
    }

    Ok(Duration::from_millis(amount.saturating_mul(unit_ms)))
}

pub(crate) fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
