//! Load test for a ticket purchase service.
//!
//! Two scenarios run side by side. `smoke` keeps a few VUs listing events, while `purchase` has
//! many VUs log in and race each other to buy random seats of the same event. A purchase that
//! loses the race gets a 409, which is an expected answer rather than a failure.

use std::time::Duration;

use http_gauntlet_runner::prelude::*;
use rand::Rng;

/// Entry function name of the purchase scenario.
pub const PURCHASE_EXEC: &str = "purchaseScenario";

pub const EVENT_ID: u32 = 1;
pub const SEATS_PER_EVENT: u32 = 20;

const THINK_TIME: Duration = Duration::from_secs(1);

pub type TicketVuContext = VuContext<HttpRunnerContext, HttpVuContext>;

pub fn default_options() -> Options {
    Options::new()
        .with_scenario("smoke", ScenarioOptions::constant_vus(5, "30s"))
        .with_scenario(
            "purchase",
            ScenarioOptions::constant_vus(50, "1m")
                .with_graceful_stop("10s")
                .with_exec(PURCHASE_EXEC),
        )
}

fn setup(ctx: &mut RunnerContext<HttpRunnerContext>) -> HookResult {
    configure_http_client(ctx)?;
    Ok(())
}

/// List the events on sale.
pub fn list_events(ctx: &mut TicketVuContext) -> HookResult {
    let response = http_get(ctx, "/api/events")?;
    ctx.check(
        &response,
        &[("status 200", &|r: &HttpResponse| r.status() == 200)],
    );

    ctx.sleep(THINK_TIME)
}

/// Log in and try to buy a random seat.
pub fn purchase_scenario(ctx: &mut TicketVuContext) -> HookResult {
    let login_response = login(ctx, "/api/login", "demo", "demo")?;
    ctx.check(
        &login_response,
        &[("login status 200", &|r: &HttpResponse| r.status() == 200)],
    );

    let seat_id = ctx.rng().gen_range(1..=SEATS_PER_EVENT);
    log::trace!("{} is buying seat {}", ctx.vu_id(), seat_id);

    let purchase = http_post(
        ctx,
        &format!("/api/events/{EVENT_ID}/seats/{seat_id}/purchase"),
        HttpBody::Empty,
    )?;
    // Someone else may have bought the seat first
    ctx.check(
        &purchase,
        &[("purchase response valid", &|r: &HttpResponse| {
            matches!(r.status(), 200 | 409)
        })],
    );

    ctx.sleep(THINK_TIME)
}

pub fn definition(
    cli: GauntletScenarioCli,
) -> TestDefinitionBuilder<HttpRunnerContext, HttpVuContext> {
    TestDefinitionBuilder::new(env!("CARGO_PKG_NAME"), cli)
        .with_options(default_options())
        .use_setup(setup)
        .use_default_exec(list_events)
        .use_named_exec(PURCHASE_EXEC, purchase_scenario)
}
