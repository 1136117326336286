use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use bitsipc_client::DispatchMode;
use serde_json::Value;
use tracing::{info, warn};

use crate::cmd::{build_client, install_ctrlc_handler, scopes_from, start, Context, ListenArgs};
use crate::exit::{client_error, CliError, CliResult, FAILURE, SUCCESS};
use crate::output::print_event;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub fn run(args: ListenArgs, ctx: &Context) -> CliResult<i32> {
    let client = build_client(&args.socket, &ctx.config)?;
    let scopes = scopes_from(&args.scopes);
    let (tx, rx) = mpsc::channel::<(String, Vec<Value>)>();

    for event in &args.events {
        let tx = tx.clone();
        let name = event.clone();
        client
            .add_event_listener(event, &scopes, move |params| {
                let _ = tx.send((name.clone(), params.to_vec()));
            })
            .map_err(|err| client_error("register listener failed", err))?;
    }
    drop(tx);

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    start(&client, DispatchMode::Background)?;
    info!(events = args.events.len(), "listening");

    let mut printed = 0usize;
    let mut lost = false;

    while running.load(Ordering::SeqCst) {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok((event, params)) => {
                print_event(&event, &params, ctx.format);
                printed = printed.saturating_add(1);
                if args.count.is_some_and(|count| printed >= count) {
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if !client.is_connected() {
                    lost = true;
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    client.stop();

    if lost {
        warn!(printed, "message center closed the connection");
        return Err(CliError::new(FAILURE, "connection to message center lost"));
    }
    Ok(SUCCESS)
}
