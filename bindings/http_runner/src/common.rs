use gauntlet_runner::prelude::{GauntletResult, HookResult, RunnerContext, VuContext};
use http_client_instrumented::prelude::{HttpBody, HttpClient, HttpResponse};
use serde::Deserialize;

use crate::context::HttpVuContext;
use crate::runner_context::HttpRunnerContext;

/// Creates the shared [HttpClient] for the run, pointed at the configured base URL.
///
/// Call this from the scenario setup:
/// ```rust
/// use http_gauntlet_runner::prelude::*;
///
/// fn setup(ctx: &mut RunnerContext<HttpRunnerContext>) -> HookResult {
///     configure_http_client(ctx)?;
///     Ok(())
/// }
/// ```
pub fn configure_http_client(ctx: &mut RunnerContext<HttpRunnerContext>) -> HookResult {
    let client = HttpClient::new(ctx.base_url(), ctx.reporter())?;
    log::info!("Sending requests to {}", client.base_url());
    ctx.get_mut().client = Some(client);

    Ok(())
}

/// Send a GET request, blocking the VU until the response has been read.
pub fn http_get(
    ctx: &mut VuContext<HttpRunnerContext, HttpVuContext>,
    path: &str,
) -> GauntletResult<HttpResponse> {
    let client = ctx.runner_context().get().client()?;
    ctx.execute(client.get(ctx.scenario_name(), path))
}

/// Send a POST request, with the VU's access token if it has logged in.
pub fn http_post(
    ctx: &mut VuContext<HttpRunnerContext, HttpVuContext>,
    path: &str,
    body: HttpBody<'_>,
) -> GauntletResult<HttpResponse> {
    let client = ctx.runner_context().get().client()?;
    let access_token = ctx.get().access_token.as_deref();
    ctx.execute(client.post(ctx.scenario_name(), path, body, access_token))
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    access_token: String,
}

/// Log in with form credentials.
///
/// A successful login stores the returned access token on the VU so that [http_post] sends it. A
/// failed login clears any token from an earlier login. The response is returned either way so
/// that the caller can check it.
pub fn login(
    ctx: &mut VuContext<HttpRunnerContext, HttpVuContext>,
    path: &str,
    username: &str,
    password: &str,
) -> GauntletResult<HttpResponse> {
    let response = http_post(
        ctx,
        path,
        HttpBody::Form(&[("username", username), ("password", password)]),
    )?;

    let access_token = access_token(&response);
    if access_token.is_none() {
        log::debug!("Login for {} returned no access token", ctx.vu_id());
    }
    ctx.get_mut().access_token = access_token;

    Ok(response)
}

fn access_token(response: &HttpResponse) -> Option<String> {
    if !response.status.is_success() {
        return None;
    }

    response
        .json::<LoginResponse>()
        .ok()
        .map(|login| login.access_token)
}
