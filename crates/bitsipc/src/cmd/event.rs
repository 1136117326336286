use bitsipc_client::DispatchMode;
use tracing::info;

use crate::cmd::{build_client, parse_json_args, scopes_from, start, Context, EventArgs};
use crate::exit::{client_error, CliResult, SUCCESS};

pub fn run(args: EventArgs, ctx: &Context) -> CliResult<i32> {
    let params = parse_json_args(&args.args)?;
    let scopes = scopes_from(&args.scopes);

    // Nothing is read back, so nobody needs to drive dispatch.
    let client = build_client(&args.socket, &ctx.config)?;
    start(&client, DispatchMode::Manual)?;

    let sent = client
        .send_event(&args.event, &scopes, params)
        .map_err(|err| client_error("send event failed", err));
    client.stop();
    sent?;

    info!(event = %args.event, "event sent");
    Ok(SUCCESS)
}
