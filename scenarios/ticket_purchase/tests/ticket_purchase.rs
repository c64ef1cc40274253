mod common;

use std::sync::atomic::Ordering;

use common::start_mock_service;
use http_gauntlet_runner::prelude::{
    run, GauntletScenarioCli, Options, ReporterOpt, ScenarioOptions,
};
use pretty_assertions::assert_eq;
use ticket_purchase::{default_options, definition, PURCHASE_EXEC};

/// Long enough for every VU to complete a few iterations against the local mock.
const SHORT_SMOKE_DURATION: &str = "2s";

fn cli(base_url: &str) -> GauntletScenarioCli {
    GauntletScenarioCli {
        base_url: Some(base_url.to_string()),
        config: None,
        scenario: vec![],
        seed: Some(2024),
        no_progress: true,
        reporter: ReporterOpt::Noop,
        summary_path: None,
        run_id: None,
    }
}

fn purchase_options(vus: usize, iterations: u64) -> Options {
    Options::new().with_scenario(
        "purchase",
        ScenarioOptions::per_vu_iterations(vus, iterations).with_exec(PURCHASE_EXEC),
    )
}

#[test]
fn smoke_run_lists_events() {
    let service = start_mock_service(false);

    let summary = run(definition(cli(&service.base_url)).with_options(
        Options::new().with_scenario(
            "smoke",
            ScenarioOptions::constant_vus(5, SHORT_SMOKE_DURATION),
        ),
    ))
    .unwrap();

    let smoke = &summary.scenarios["smoke"];
    assert_eq!(5, smoke.vus_started);
    assert_eq!(0, smoke.failed_iterations);
    assert_eq!(0, smoke.http_req_failed);

    let check = summary.check("smoke", "status 200").unwrap();
    assert!(check.passes >= 5, "expected every VU to pass at least once: {check:?}");
    assert_eq!(0, check.fails);
    assert_eq!(check.passes, smoke.http_reqs);
    assert_eq!(
        smoke.http_reqs as usize,
        service.state.event_listings.load(Ordering::SeqCst)
    );
}

#[test]
#[ignore = "runs the full 30 second smoke scenario"]
fn full_length_smoke_run() {
    let service = start_mock_service(false);

    let mut cli = cli(&service.base_url);
    cli.scenario = vec!["smoke".to_string()];
    let summary = run(definition(cli).with_options(default_options())).unwrap();

    let smoke = &summary.scenarios["smoke"];
    assert_eq!(30_000, smoke.planned_duration_ms);
    assert!(smoke.elapsed_ms >= 30_000);
    assert_eq!(5, smoke.vu_end_count);
    assert_eq!(0, smoke.failed_iterations);
}

#[test]
fn purchase_logs_in_and_buys_a_seat() {
    let service = start_mock_service(false);

    let summary =
        run(definition(cli(&service.base_url)).with_options(purchase_options(1, 1))).unwrap();

    let login = summary.check("purchase", "login status 200").unwrap();
    assert_eq!(1, login.passes);
    assert_eq!(0, login.fails);

    let purchase = summary.check("purchase", "purchase response valid").unwrap();
    assert_eq!(1, purchase.passes);
    assert_eq!(0, purchase.fails);

    assert_eq!(1, service.state.logins.load(Ordering::SeqCst));
    assert_eq!(1, service.state.sales.load(Ordering::SeqCst));
    // The token from the login is sent with the purchase
    assert_eq!(1, service.state.authorized_purchases.load(Ordering::SeqCst));
    assert_eq!(2, summary.scenarios["purchase"].http_reqs);
    assert_eq!(0, summary.scenarios["purchase"].http_req_failed);
}

#[test]
fn rejected_login_drops_previous_token() {
    let service = start_mock_service(false);
    service.state.max_logins.store(1, Ordering::SeqCst);

    let summary =
        run(definition(cli(&service.base_url)).with_options(purchase_options(1, 2))).unwrap();

    let login = summary.check("purchase", "login status 200").unwrap();
    assert_eq!(1, login.passes);
    assert_eq!(1, login.fails);

    // Only the purchase after the successful login carries a token
    let attempts = service.state.sales.load(Ordering::SeqCst)
        + service.state.conflicts.load(Ordering::SeqCst);
    assert_eq!(2, attempts);
    assert_eq!(1, service.state.authorized_purchases.load(Ordering::SeqCst));
}

#[test]
fn purchase_of_sold_seat_is_still_valid() {
    let service = start_mock_service(true);

    let summary =
        run(definition(cli(&service.base_url)).with_options(purchase_options(2, 2))).unwrap();

    let purchase = summary.check("purchase", "purchase response valid").unwrap();
    assert_eq!(4, purchase.passes);
    assert_eq!(0, purchase.fails);
    assert_eq!(4, summary.check("purchase", "login status 200").unwrap().passes);

    assert_eq!(0, service.state.sales.load(Ordering::SeqCst));
    assert_eq!(4, service.state.conflicts.load(Ordering::SeqCst));

    // A 409 passes the check but is outside the expected statuses of a request
    let scenario = &summary.scenarios["purchase"];
    assert_eq!(8, scenario.http_reqs);
    assert_eq!(4, scenario.http_req_failed);
    assert_eq!(0, scenario.failed_iterations);
}

#[test]
fn racing_vus_never_sell_a_seat_twice() {
    let service = start_mock_service(false);

    let summary =
        run(definition(cli(&service.base_url)).with_options(purchase_options(10, 3))).unwrap();

    let purchase = summary.check("purchase", "purchase response valid").unwrap();
    assert_eq!(30, purchase.passes);
    assert_eq!(0, purchase.fails);

    let sales = service.state.sales.load(Ordering::SeqCst);
    let conflicts = service.state.conflicts.load(Ordering::SeqCst);
    assert_eq!(30, sales + conflicts);
    assert!(sales <= 20);
}

#[test]
fn selected_scenario_runs_alone() {
    let service = start_mock_service(false);

    let mut cli = cli(&service.base_url);
    cli.scenario = vec!["smoke".to_string()];
    let options = purchase_options(1, 1)
        .with_scenario("smoke", ScenarioOptions::per_vu_iterations(1, 1));

    let summary = run(definition(cli).with_options(options)).unwrap();

    assert_eq!(vec!["smoke"], summary.scenarios.keys().collect::<Vec<_>>());
    assert_eq!(0, service.state.logins.load(Ordering::SeqCst));
}

#[test]
fn unreachable_service_fails_iterations() {
    // Nothing listens on the discard port
    let summary = run(definition(cli("http://127.0.0.1:9")).with_options(
        Options::new().with_scenario("smoke", ScenarioOptions::per_vu_iterations(1, 2)),
    ))
    .unwrap();

    let smoke = &summary.scenarios["smoke"];
    assert_eq!(2, smoke.failed_iterations);
    assert_eq!(2, smoke.http_req_failed);
    assert!(summary.check("smoke", "status 200").is_none());
}
