use std::time::{Duration, Instant};

use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

use crate::shutdown::DelegatedShutdownListener;

/// Share of the whole machine above which the load generator is considered busy.
const HIGH_CPU_PERCENT: f32 = 10.0;
const WARN_INTERVAL: Duration = Duration::from_secs(30);

/// Watch the CPU usage of the load generator while VUs run.
///
/// This never stops the run. It logs a warning when the process is busy enough that response
/// times may include time spent waiting for the load generator rather than the service.
pub(crate) fn start_monitor(total_vus: usize, shutdown_listener: DelegatedShutdownListener) {
    let spawned = std::thread::Builder::new()
        .name("monitor".to_string())
        .spawn(move || {
            let pid = Pid::from_u32(std::process::id());
            let mut sys = System::new();
            sys.refresh_cpu_all();
            let cpu_count = sys.cpus().len().max(1);

            let mut last_warning: Option<Instant> = None;
            while !shutdown_listener.should_shutdown() {
                sys.refresh_processes_specifics(
                    ProcessesToUpdate::Some(&[pid]),
                    true,
                    ProcessRefreshKind::nothing().with_cpu(),
                );

                let Some(process) = sys.process(pid) else {
                    log::warn!("Failed to get process info, stopping the resource monitor");
                    break;
                };

                let usage = machine_share(process.cpu_usage(), cpu_count);
                let quiet = last_warning.is_some_and(|at| at.elapsed() < WARN_INTERVAL);
                if usage > HIGH_CPU_PERCENT && !quiet {
                    log::warn!(
                        "High CPU usage detected. The load generator is using {:.2}% of {} cores \
                         to drive {} VUs",
                        usage,
                        cpu_count,
                        total_vus
                    );
                    last_warning = Some(Instant::now());
                }

                std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
            }
        });

    if let Err(e) = spawned {
        log::warn!("Failed to start monitor thread: {e}");
    }
}

/// sysinfo reports process usage as a percentage of one core.
fn machine_share(process_usage: f32, cpu_count: usize) -> f32 {
    process_usage / cpu_count as f32
}
