//! Demo session against a live message center.
//!
//! Prints heartbeats, answers pings, announces itself and asks the
//! message center for the BITS id, then idles until Ctrl-C. Dispatch counters
//! are printed when the session ends.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bitsipc_client::{DispatchMode, Scopes};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::cmd::{build_client, install_ctrlc_handler, start, Context, DemoArgs};
use crate::exit::{client_error, CliError, CliResult, FAILURE, SUCCESS};
use crate::output::{print_event, print_result, print_stats};

pub const HEARTBEAT_EVENT: &str = "bits-ipc#heartbeat";
pub const PING_REQUEST: &str = "bits-ipc#ping";
pub const CONNECTED_EVENT: &str = "bits-ipc#Client connected";
pub const BITS_ID_REQUEST: &str = "base#System bitsId";

const IDLE_POLL: Duration = Duration::from_millis(100);

pub fn run(args: DemoArgs, ctx: &Context) -> CliResult<i32> {
    let client = build_client(&args.socket, &ctx.config)?;
    let none = Scopes::none();
    let format = ctx.format;

    client
        .add_event_listener(HEARTBEAT_EVENT, &none, move |params| {
            print_event(HEARTBEAT_EVENT, params, format);
        })
        .map_err(|err| client_error("register heartbeat listener failed", err))?;
    client
        .add_request_listener(PING_REQUEST, &none, |_| {
            debug!("answering ping");
            Ok(pong())
        })
        .map_err(|err| client_error("register ping handler failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    start(&client, DispatchMode::Background)?;

    client
        .send_event(CONNECTED_EVENT, &none, Vec::new())
        .map_err(|err| client_error("announce failed", err))?;

    match client.send_request(BITS_ID_REQUEST, &none, Vec::new()) {
        Ok(bits_id) => print_result(BITS_ID_REQUEST, &bits_id, format),
        Err(err) => warn!(error = %err, "bitsId request failed"),
    }

    while running.load(Ordering::SeqCst) && client.is_connected() {
        thread::sleep(IDLE_POLL);
    }
    let interrupted = !running.load(Ordering::SeqCst);
    client.stop();

    print_stats(&client.stats(), format);
    info!(interrupted, "demo finished");

    if interrupted {
        Ok(SUCCESS)
    } else {
        Err(CliError::new(FAILURE, "connection to message center lost"))
    }
}

fn pong() -> Value {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    json!({ "pong": millis })
}
