use bitsipc_client::DispatchMode;
use tracing::debug;

use crate::cmd::{
    build_client, parse_duration, parse_json_args, scopes_from, start, Context, RequestArgs,
};
use crate::exit::{client_error, CliResult, SUCCESS};
use crate::output::print_result;

pub fn run(args: RequestArgs, ctx: &Context) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let params = parse_json_args(&args.args)?;
    let scopes = scopes_from(&args.scopes);

    // Manual mode: the waiting call pumps the connection itself.
    let client = build_client(&args.socket, &ctx.config)?;
    start(&client, DispatchMode::Manual)?;

    let outcome = client.send_request_timeout(&args.event, &scopes, params, timeout);
    debug!(stats = ?client.stats(), "request finished");
    client.stop();

    let result = outcome.map_err(|err| client_error("request failed", err))?;
    print_result(&args.event, &result, ctx.format);
    Ok(SUCCESS)
}
