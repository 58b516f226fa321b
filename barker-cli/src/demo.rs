//! Simulated workload that shows the activity tree while jobs run.
//!
//! Every job reports a `run` activity under `/jobs/<n>` for its whole
//! lifetime and a `fetch` activity under `/jobs/<n>/inputs` for the first
//! half of it. Job `n` of `N` runs for `duration * n / N`.

use std::io::Write;
use std::time::Duration;

use barker::{
    Aggregator, ActivityTree, BarkerConfig, BarkerHandle, CancellationToken, MonitorOutcome,
    Snapshot, TaskTracker, WaitGroupMonitor,
};
use barker_report::{DetailOption, Details, log_failures, notify_close};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct DemoOptions {
    pub jobs: u32,
    pub duration: Duration,
    pub fail_job: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobOutcome {
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DemoSummary {
    pub completed: u32,
    pub failed: u32,
    pub cancelled: u32,
}

/// Run the demo and print every snapshot to stdout.
pub async fn run(
    config: &BarkerConfig,
    options: &DemoOptions,
    shutdown: CancellationToken,
) -> Result<DemoSummary, Details> {
    let (snapshot_tx, mut snapshot_rx) = mpsc::channel::<Snapshot>(config.snapshot_capacity);
    let printer = tokio::spawn(async move {
        while let Some(snapshot) = snapshot_rx.recv().await {
            println!("{}", snapshot);
        }
    });

    let summary = run_jobs(config, options, shutdown, snapshot_tx).await?;
    printer.await.map_err(Details::from_error)?;
    notify_close(
        || std::io::stdout().flush().map_err(Details::from),
        &[DetailOption::Msg("while flushing snapshot output".to_string())],
    );
    Ok(summary)
}

/// Run the jobs, sending snapshots to `snapshot_tx` until the final one.
pub async fn run_jobs(
    config: &BarkerConfig,
    options: &DemoOptions,
    shutdown: CancellationToken,
    snapshot_tx: mpsc::Sender<Snapshot>,
) -> Result<DemoSummary, Details> {
    let (aggregator, handle) = Aggregator::new(config, snapshot_tx).map_err(Details::from_error)?;
    let aggregator = aggregator.spawn();

    let tracker = TaskTracker::new();
    let mut jobs: Vec<JoinHandle<JobOutcome>> = Vec::new();
    for number in 1..=options.jobs {
        let runtime = options.duration * number / options.jobs;
        let fail = options.fail_job == Some(number);
        let handle = handle.clone();
        let shutdown = shutdown.child_token();
        jobs.push(tracker.spawn(async move {
            let result = job(handle, number, runtime, fail, shutdown).await;
            match log_failures(result, &[DetailOption::Msg(format!("in demo job {}", number))]) {
                Some(outcome) => outcome,
                None => JobOutcome::Failed,
            }
        }));
    }
    tracker.close();
    info!("Started {} demo jobs", options.jobs);

    let monitor = WaitGroupMonitor::from_config(config)
        .with_name("jobs")
        .with_id("demo");
    if monitor.wait(&tracker, None).await == MonitorOutcome::CycleLimit {
        warn!("Still waiting for demo jobs, no longer reporting progress");
        tracker.wait().await;
    }

    let mut summary = DemoSummary::default();
    for job in jobs {
        match job.await.map_err(Details::from_error)? {
            JobOutcome::Completed => summary.completed += 1,
            JobOutcome::Failed => summary.failed += 1,
            JobOutcome::Cancelled => summary.cancelled += 1,
        }
    }

    drop(handle);
    let tree: ActivityTree = aggregator.await.map_err(Details::from_error)?;
    if !tree.is_empty() {
        warn!("Activities left after all jobs finished:\n{}", tree.render());
    }

    Ok(summary)
}

async fn job(
    handle: BarkerHandle,
    number: u32,
    runtime: Duration,
    fail: bool,
    shutdown: CancellationToken,
) -> Result<JobOutcome, Details> {
    let path = format!("/jobs/{}", number);
    let _run = handle.beacon("run", path.clone());
    let fetch = handle.beacon("fetch", format!("{}/inputs", path));
    debug!("Job {} started, runs for {:?}", number, runtime);

    let fetch_time = runtime / 2;
    tokio::select! {
        _ = tokio::time::sleep(fetch_time) => {}
        _ = shutdown.cancelled() => {
            info!("Job {} cancelled while fetching", number);
            return Ok(JobOutcome::Cancelled);
        }
    }
    fetch.finish().await;

    if fail {
        return Err(Details::report(
            format!("job {} could not process its inputs", number),
            "demo-job",
        )
        .with_exit_code(2));
    }

    tokio::select! {
        _ = tokio::time::sleep(runtime - fetch_time) => {}
        _ = shutdown.cancelled() => {
            info!("Job {} cancelled", number);
            return Ok(JobOutcome::Cancelled);
        }
    }

    debug!("Job {} finished", number);
    Ok(JobOutcome::Completed)
}
