mod cmd;
mod exit;
mod logging;
mod output;

use std::path::PathBuf;

use bitsipc_client::ClientConfig;
use clap::Parser;

use crate::cmd::{Command, Context, DemoArgs};
use crate::exit::{CliError, CliResult};
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "bitsipc", version, about = "BITS message center client")]
struct Cli {
    /// Message center socket path. Runs the demo session when no
    /// subcommand is given.
    #[arg(value_name = "SOCKET", env = "BITSIPC_SOCKET")]
    socket: Option<PathBuf>,

    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    /// Socket receive timeout; bounds how quickly the client notices a stop.
    #[arg(long, value_name = "DURATION", default_value = "1s", global = true)]
    read_timeout: String,

    /// Default deadline for requests sent by the demo session.
    #[arg(long, value_name = "DURATION", default_value = "30s", global = true)]
    request_timeout: String,

    #[command(subcommand)]
    command: Option<Command>,
}

impl Cli {
    fn into_parts(self) -> CliResult<(Command, Context)> {
        let config = ClientConfig {
            read_timeout: cmd::parse_duration(&self.read_timeout)?,
            request_timeout: Some(cmd::parse_duration(&self.request_timeout)?),
            ..ClientConfig::default()
        };
        let context = Context {
            format: self.format.unwrap_or_else(OutputFormat::default_for_stdout),
            config,
        };

        let command = match (self.command, self.socket) {
            (Some(command), _) => command,
            (None, Some(socket)) => Command::Demo(DemoArgs { socket }),
            (None, None) => {
                return Err(CliError::usage(
                    "missing socket path (usage: bitsipc <SOCKET> or bitsipc <COMMAND>)",
                ))
            }
        };
        Ok((command, context))
    }
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            std::process::exit(if err.use_stderr() {
                exit::USAGE
            } else {
                exit::SUCCESS
            });
        }
    };
    init_logging(cli.log_format, cli.log_level);

    let result = cli
        .into_parts()
        .and_then(|(command, ctx)| cmd::run(command, &ctx));

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn bare_socket_runs_demo() {
        let cli = Cli::try_parse_from(["bitsipc", "/tmp/bits.sock"]).expect("parse");
        let (command, ctx) = cli.into_parts().expect("parts");
        match command {
            Command::Demo(args) => assert_eq!(args.socket, PathBuf::from("/tmp/bits.sock")),
            other => panic!("unexpected command: {other:?}"),
        }
        assert_eq!(ctx.config.read_timeout, Duration::from_secs(1));
        assert_eq!(ctx.config.request_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn missing_socket_is_usage_error() {
        let cli = Cli::try_parse_from(["bitsipc"]).expect("parse");
        let err = cli.into_parts().expect_err("no socket");
        assert_eq!(err.code, exit::USAGE);
    }

    #[test]
    fn extra_positional_is_rejected() {
        assert!(Cli::try_parse_from(["bitsipc", "/tmp/a.sock", "/tmp/b.sock"]).is_err());
    }

    #[test]
    fn parses_event_subcommand() {
        let cli = Cli::try_parse_from([
            "bitsipc",
            "event",
            "/tmp/bits.sock",
            "bits-ipc#Client connected",
            "--scope",
            "omnibox",
            "--arg",
            "{\"x\":1}",
            "--format",
            "json",
        ])
        .expect("parse");
        assert_eq!(cli.format, Some(OutputFormat::Json));
        match cli.command {
            Some(Command::Event(args)) => {
                assert_eq!(args.event, "bits-ipc#Client connected");
                assert_eq!(args.scopes, vec!["omnibox".to_string()]);
                assert_eq!(args.args, vec!["{\"x\":1}".to_string()]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_request_with_timeout() {
        let cli = Cli::try_parse_from([
            "bitsipc",
            "--read-timeout",
            "250ms",
            "request",
            "/tmp/bits.sock",
            "base#System bitsId",
            "--timeout",
            "2s",
        ])
        .expect("parse");
        let (command, ctx) = cli.into_parts().expect("parts");
        assert_eq!(ctx.config.read_timeout, Duration::from_millis(250));
        match command {
            Command::Request(args) => {
                assert_eq!(args.event, "base#System bitsId");
                assert_eq!(args.timeout, "2s");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn listen_requires_an_event() {
        assert!(Cli::try_parse_from(["bitsipc", "listen", "/tmp/bits.sock"]).is_err());
        let cli = Cli::try_parse_from([
            "bitsipc",
            "listen",
            "/tmp/bits.sock",
            "bits-ipc#heartbeat",
            "other#tick",
            "--count",
            "3",
        ])
        .expect("parse");
        match cli.command {
            Some(Command::Listen(args)) => {
                assert_eq!(args.events.len(), 2);
                assert_eq!(args.count, Some(3));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn zero_read_timeout_is_rejected() {
        let cli = Cli::try_parse_from(["bitsipc", "--read-timeout", "0", "/tmp/bits.sock"])
            .expect("parse");
        assert_eq!(cli.into_parts().expect_err("zero").code, exit::USAGE);
    }
}
