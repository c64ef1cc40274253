use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use gauntlet_runner::prelude::{
    run, ConfigError, GauntletScenarioCli, HookResult, NoValues, Options, ReporterOpt,
    ScenarioOptions, TestDefinitionBuilder, VuContext,
};
use rand::Rng;

type Ctx = VuContext<NoValues, NoValues>;

fn cli() -> GauntletScenarioCli {
    GauntletScenarioCli {
        base_url: None,
        config: None,
        scenario: vec![],
        seed: Some(42),
        no_progress: true,
        reporter: ReporterOpt::Noop,
        summary_path: None,
        run_id: Some("executor-test".to_string()),
    }
}

fn pace(ctx: &mut Ctx) -> HookResult {
    ctx.sleep(Duration::from_millis(20))
}

#[test]
fn spawns_configured_number_of_vus() {
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let exec = {
        let active = active.clone();
        let peak = peak.clone();
        move |ctx: &mut Ctx| -> HookResult {
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            let result = ctx.sleep(Duration::from_millis(100));
            active.fetch_sub(1, Ordering::SeqCst);
            result
        }
    };

    let definition = TestDefinitionBuilder::<NoValues, NoValues>::new("vus", cli())
        .with_options(
            Options::new().with_scenario("smoke", ScenarioOptions::constant_vus(5, "1s")),
        )
        .use_default_exec(exec);

    let started = Instant::now();
    let summary = run(definition).unwrap();
    let elapsed = started.elapsed();

    let smoke = &summary.scenarios["smoke"];
    assert_eq!(5, smoke.vus);
    assert_eq!(5, smoke.vus_started);
    assert_eq!(5, smoke.peak_vus);
    assert_eq!(5, smoke.vu_end_count);
    assert_eq!(5, peak.load(Ordering::SeqCst));
    assert_eq!(0, smoke.failed_iterations);
    assert!(smoke.iterations >= 5);
    assert_eq!("constant-vus", smoke.executor);
    assert_eq!(1000, smoke.planned_duration_ms);

    // Ran for the duration, plus at most one in-flight iteration
    assert!(elapsed >= Duration::from_secs(1), "finished too early: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(5), "finished too late: {elapsed:?}");
}

#[test]
fn failed_iterations_do_not_stop_the_vu() {
    let definition = TestDefinitionBuilder::<NoValues, NoValues>::new("failures", cli())
        .with_options(
            Options::new().with_scenario("flaky", ScenarioOptions::per_vu_iterations(2, 6)),
        )
        .use_default_exec(|ctx: &mut Ctx| -> HookResult {
            match ctx.iteration() % 3 {
                0 => Err(anyhow::anyhow!("transport error")),
                1 => panic!("unexpected panic in iteration"),
                _ => Ok(()),
            }
        });

    let summary = run(definition).unwrap();

    let flaky = &summary.scenarios["flaky"];
    assert_eq!(12, flaky.iterations);
    assert_eq!(8, flaky.failed_iterations);
    assert_eq!(0, flaky.interrupted_iterations);
    assert_eq!(2, flaky.vu_end_count);
}

#[test]
fn per_vu_iterations_are_exact() {
    let count = Arc::new(AtomicUsize::new(0));
    let exec = {
        let count = count.clone();
        move |_ctx: &mut Ctx| -> HookResult {
            count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    };

    let definition = TestDefinitionBuilder::<NoValues, NoValues>::new("iterations", cli())
        .with_options(
            Options::new().with_scenario("iter", ScenarioOptions::per_vu_iterations(3, 4)),
        )
        .use_default_exec(exec);

    let summary = run(definition).unwrap();

    assert_eq!(12, count.load(Ordering::SeqCst));
    assert_eq!(12, summary.scenarios["iter"].iterations);
    assert_eq!("per-vu-iterations", summary.scenarios["iter"].executor);
}

#[test]
fn max_duration_bounds_iteration_budget() {
    let definition = TestDefinitionBuilder::<NoValues, NoValues>::new("max_duration", cli())
        .with_options(Options::new().with_scenario(
            "slow",
            ScenarioOptions::per_vu_iterations(1, 1000).with_max_duration("300ms"),
        ))
        .use_default_exec(pace);

    let started = Instant::now();
    let summary = run(definition).unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(summary.scenarios["slow"].iterations < 1000);
}

#[test]
fn graceful_stop_cancels_stragglers() {
    let definition = TestDefinitionBuilder::<NoValues, NoValues>::new("graceful", cli())
        .with_options(Options::new().with_scenario(
            "stuck",
            ScenarioOptions::constant_vus(3, "200ms").with_graceful_stop("200ms"),
        ))
        .use_default_exec(|ctx: &mut Ctx| -> HookResult {
            ctx.sleep(Duration::from_secs(60))
        });

    let started = Instant::now();
    let summary = run(definition).unwrap();
    let elapsed = started.elapsed();

    let stuck = &summary.scenarios["stuck"];
    assert_eq!(3, stuck.interrupted_iterations);
    assert_eq!(0, stuck.iterations);
    assert!(elapsed >= Duration::from_millis(400), "stopped before graceful stop: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(10), "stragglers were not cancelled: {elapsed:?}");
}

#[test]
fn blocked_vus_are_abandoned_after_graceful_stop() {
    // Blocks the thread without going through the VU context, so nothing can cancel it
    let definition = TestDefinitionBuilder::<NoValues, NoValues>::new("blocked", cli())
        .with_options(Options::new().with_scenario(
            "blocked",
            ScenarioOptions::constant_vus(1, "100ms").with_graceful_stop("100ms"),
        ))
        .use_default_exec(|_ctx: &mut Ctx| -> HookResult {
            std::thread::sleep(Duration::from_secs(4));
            Ok(())
        });

    let started = Instant::now();
    let summary = run(definition).unwrap();
    let elapsed = started.elapsed();

    let blocked = &summary.scenarios["blocked"];
    assert!(elapsed < Duration::from_secs(3), "waited for a blocked VU: {elapsed:?}");
    assert_eq!(1, blocked.vus_started);
    assert_eq!(1, blocked.interrupted_iterations);
    assert_eq!(0, blocked.iterations);
    assert_eq!(0, blocked.vu_end_count);
}

#[test]
fn in_flight_iterations_finish_within_graceful_stop() {
    let definition = TestDefinitionBuilder::<NoValues, NoValues>::new("drain", cli())
        .with_options(Options::new().with_scenario(
            "drain",
            ScenarioOptions::constant_vus(2, "100ms").with_graceful_stop("5s"),
        ))
        .use_default_exec(|ctx: &mut Ctx| -> HookResult {
            ctx.sleep(Duration::from_millis(400))
        });

    let summary = run(definition).unwrap();

    let drain = &summary.scenarios["drain"];
    assert_eq!(2, drain.iterations);
    assert_eq!(0, drain.interrupted_iterations);
}

#[test]
fn scenarios_run_concurrently() {
    let options = Options::new()
        .with_scenario("first", ScenarioOptions::constant_vus(2, "500ms"))
        .with_scenario(
            "second",
            ScenarioOptions::constant_vus(3, "500ms").with_exec("second"),
        );

    let definition = TestDefinitionBuilder::<NoValues, NoValues>::new("concurrent", cli())
        .with_options(options)
        .use_default_exec(pace)
        .use_named_exec("second", pace);

    let started = Instant::now();
    let summary = run(definition).unwrap();

    // Sequential execution would take at least a second
    assert!(started.elapsed() < Duration::from_millis(950));
    assert_eq!(2, summary.scenarios["first"].vus_started);
    assert_eq!(3, summary.scenarios["second"].vus_started);
    assert_eq!("second", summary.scenarios["second"].exec);
}

#[test]
fn start_time_delays_scenario() {
    let definition = TestDefinitionBuilder::<NoValues, NoValues>::new("start_time", cli())
        .with_options(Options::new().with_scenario(
            "late",
            ScenarioOptions::per_vu_iterations(1, 1).with_start_time("300ms"),
        ))
        .use_default_exec(|_ctx: &mut Ctx| -> HookResult { Ok(()) });

    let started = Instant::now();
    let summary = run(definition).unwrap();

    assert!(started.elapsed() >= Duration::from_millis(300));
    assert_eq!(1, summary.scenarios["late"].iterations);
}

#[test]
fn configuration_errors_happen_before_any_vu() {
    let spawned = Arc::new(AtomicUsize::new(0));

    let mut options = ScenarioOptions::constant_vus(5, "1s");
    options.executor = "constant-arrival-rate".to_string();

    let exec = {
        let spawned = spawned.clone();
        move |_ctx: &mut Ctx| -> HookResult {
            spawned.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    };

    let definition = TestDefinitionBuilder::<NoValues, NoValues>::new("bad_executor", cli())
        .with_options(
            Options::new()
                .with_scenario("good", ScenarioOptions::constant_vus(1, "1s"))
                .with_scenario("bad", options),
        )
        .use_default_exec(exec.clone());
    let err = run(definition).err().unwrap();
    assert!(matches!(
        err.downcast_ref::<ConfigError>(),
        Some(ConfigError::UnknownExecutor { .. })
    ));

    let definition = TestDefinitionBuilder::<NoValues, NoValues>::new("bad_duration", cli())
        .with_options(
            Options::new().with_scenario("bad", ScenarioOptions::constant_vus(1, "30 parsecs")),
        )
        .use_default_exec(exec);
    let err = run(definition).err().unwrap();
    assert!(matches!(
        err.downcast_ref::<ConfigError>(),
        Some(ConfigError::InvalidDuration { .. })
    ));

    assert_eq!(0, spawned.load(Ordering::SeqCst));
}

#[test]
fn seeded_random_source_is_reproducible() {
    fn seats_for_seed(seed: u64) -> Vec<u32> {
        let seats = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let exec = {
            let seats = seats.clone();
            move |ctx: &mut Ctx| -> HookResult {
                let seat = ctx.rng().gen_range(1..=20);
                seats.lock().push(seat);
                Ok(())
            }
        };

        let mut cli = cli();
        cli.seed = Some(seed);
        let definition = TestDefinitionBuilder::<NoValues, NoValues>::new("seeded", cli)
            .with_options(
                Options::new()
                    .with_scenario("purchase", ScenarioOptions::per_vu_iterations(1, 10)),
            )
            .use_default_exec(exec);
        let summary = run(definition).unwrap();
        assert_eq!(seed, summary.seed);

        let seats = seats.lock().clone();
        seats
    }

    assert_eq!(seats_for_seed(7), seats_for_seed(7));
    assert_ne!(seats_for_seed(7), seats_for_seed(8));
}

#[test]
fn summary_is_appended_to_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("summary.jsonl");

    let mut cli = cli();
    cli.summary_path = Some(path.clone());
    let definition = TestDefinitionBuilder::<NoValues, NoValues>::new("summary", cli)
        .with_options(
            Options::new().with_scenario("once", ScenarioOptions::per_vu_iterations(1, 1)),
        )
        .use_default_exec(|_ctx: &mut Ctx| -> HookResult { Ok(()) });

    let summary = run(definition).unwrap();

    let runs = gauntlet_summary_model::load_summary_runs(path).unwrap();
    assert_eq!(vec![summary.clone()], runs);
    assert_eq!("executor-test", runs[0].run_id);
    assert_eq!(Some(summary.compute_fingerprint()), runs[0].fingerprint);
}

#[test]
fn checks_are_recorded_per_scenario() {
    let definition = TestDefinitionBuilder::<NoValues, NoValues>::new("checks", cli())
        .with_options(
            Options::new().with_scenario("smoke", ScenarioOptions::per_vu_iterations(4, 5)),
        )
        .use_default_exec(|ctx: &mut Ctx| -> HookResult {
            let status: u16 = if ctx.iteration() == 0 { 500 } else { 200 };
            ctx.check(&status, &[("status 200", &|s: &u16| *s == 200)]);
            Ok(())
        });

    let summary = run(definition).unwrap();

    let check = summary.check("smoke", "status 200").unwrap();
    assert_eq!(16, check.passes);
    assert_eq!(4, check.fails);
}
