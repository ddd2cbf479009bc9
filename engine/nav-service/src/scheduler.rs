//! Timer tasks driving major ticks, minor ticks, persistence and rate refresh

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, timeout, MissedTickBehavior};
use tracing::{error, info, warn};

use price_simulator::TickMode;

use crate::config::ScheduleConfig;
use crate::service::NavService;

/// Handles to the running timer tasks
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl SchedulerHandle {
    /// Signal every task to stop and wait for each up to `grace`
    pub async fn shutdown(self, grace: Duration) {
        let _ = self.shutdown.send(true);

        for (name, handle) in self.tasks {
            match timeout(grace, handle).await {
                Ok(Ok(())) => info!("{} task stopped gracefully", name),
                Ok(Err(e)) => error!("{} task failed: {}", name, e),
                Err(_) => warn!("{} task did not stop within timeout, abandoning", name),
            }
        }
    }

    /// Number of running tasks
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }
}

/// Spawn the timer tasks for `service`
pub fn start(service: Arc<NavService>) -> SchedulerHandle {
    let schedule = service.config().schedule.clone();
    let (shutdown, _) = watch::channel(false);

    let mut tasks = vec![
        (
            "major tick",
            tokio::spawn(run_major_loop(service.clone(), schedule.clone(), shutdown.subscribe())),
        ),
        ("flush", tokio::spawn(run_flush_loop(service.clone(), schedule.clone(), shutdown.subscribe()))),
        ("rate refresh", tokio::spawn(run_rate_loop(service.clone(), schedule.clone(), shutdown.subscribe()))),
    ];

    if schedule.minor_enabled {
        tasks.push((
            "minor tick",
            tokio::spawn(run_minor_loop(service.clone(), schedule.clone(), shutdown.subscribe())),
        ));
    }

    info!("Scheduler started with {} tasks", tasks.len());
    SchedulerHandle { shutdown, tasks }
}

/// Wait until the service is active again; false when shutting down instead
async fn wait_until_active(
    activity: &mut watch::Receiver<bool>,
    shutdown: &mut watch::Receiver<bool>,
) -> bool {
    loop {
        if *activity.borrow_and_update() {
            return true;
        }
        tokio::select! {
            _ = shutdown.changed() => return false,
            changed = activity.changed() => {
                if changed.is_err() {
                    return false;
                }
            }
        }
    }
}

async fn run_major_loop(
    service: Arc<NavService>,
    schedule: ScheduleConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut rng = StdRng::from_entropy();
    let mut activity = service.activity();

    loop {
        let active = *activity.borrow_and_update();
        if !active {
            if !wait_until_active(&mut activity, &mut shutdown).await {
                break;
            }
            info!("Resumed, running catch-up major tick");
            service.simulate_tick(TickMode::Major).await;
            continue;
        }

        let delay = schedule.major_delay(&mut rng);
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = sleep(delay) => {}
        }

        if service.is_active() {
            service.simulate_tick(TickMode::Major).await;
        }
    }
}

async fn run_minor_loop(
    service: Arc<NavService>,
    schedule: ScheduleConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut activity = service.activity();
    let mut ticker = interval(schedule.minor_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let active = *activity.borrow_and_update();
        if !active && !wait_until_active(&mut activity, &mut shutdown).await {
            break;
        }

        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {}
        }

        if service.is_active() {
            service.simulate_tick(TickMode::Minor).await;
        }
    }
}

async fn run_flush_loop(
    service: Arc<NavService>,
    schedule: ScheduleConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(schedule.flush_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => service.save().await,
        }
    }
}

async fn run_rate_loop(
    service: Arc<NavService>,
    schedule: ScheduleConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(schedule.rate_check_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                service.refresh_rate().await;
            }
        }
    }
}
