use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::collector::Collector;
use crate::error::RunError;
use crate::reporter::{make_reporters, Reporter};
use crate::segment::{post_test_output, render_test_output, AnalyticsSink};
use crate::types::{AnalyticsEvent, Config, TestMode};

/// What happened to each reporter in a run.
#[derive(Debug, Default)]
pub struct RunOutcome {
    /// Reporters whose event reached the sink.
    pub delivered: Vec<String>,
    /// Reporters held back because they recorded errors.
    pub skipped: Vec<String>,
    /// Reporters whose event the sink rejected.
    pub send_failures: Vec<String>,
    /// Dry-run dump, empty outside test mode.
    pub test_output: BTreeMap<String, AnalyticsEvent>,
}

/// Runs every configured reporter once and delivers the results.
pub async fn execute_run(
    config: &Config,
    sink: &dyn AnalyticsSink,
) -> Result<RunOutcome, RunError> {
    info!("starting signal run");
    let reporters = make_reporters(config)?;
    run_reporters(reporters, config, sink).await
}

/// Fans `reporters` out to one worker each, waits for all of them, then
/// dispatches every completed reporter.
pub async fn run_reporters(
    reporters: Vec<Box<dyn Reporter>>,
    config: &Config,
    sink: &dyn AnalyticsSink,
) -> Result<RunOutcome, RunError> {
    let collector = Collector::new(config)?;
    let shared = Arc::new(config.clone());
    let expected = reporters.len();
    let (tx, mut rx) = mpsc::channel::<Box<dyn Reporter>>(expected.max(1));

    for (i, reporter) in reporters.into_iter().enumerate() {
        let worker = i + 1;
        debug!("deploying worker {}", worker);
        let tx = tx.clone();
        let collector = collector.clone();
        let config = Arc::clone(&shared);
        tokio::spawn(async move {
            let reporter = work(worker, reporter, &collector, &config).await;
            if tx.send(reporter).await.is_err() {
                warn!("worker {}: coordinator went away", worker);
            }
        });
    }
    drop(tx);

    let mut completed = Vec::with_capacity(expected);
    while completed.len() < expected {
        match rx.recv().await {
            Some(reporter) => completed.push(reporter),
            None => break,
        }
    }

    let mut outcome = RunOutcome::default();
    for reporter in &completed {
        dispatch(reporter.as_ref(), config, sink, &mut outcome).await;
    }

    if completed.len() < expected {
        error!("{} reporters launched but only {} completed", expected, completed.len());
        return Err(RunError::WorkerLost {
            expected,
            received: completed.len(),
        });
    }

    match &config.test_mode {
        TestMode::Off => {}
        TestMode::Stdout => println!("{}", render_test_output(&outcome.test_output)?),
        TestMode::Post(url) => {
            let rendered = render_test_output(&outcome.test_output)?;
            post_test_output(url, rendered).await.map_err(RunError::TestDelivery)?;
        }
    }

    info!(
        "signal run finished: {} delivered, {} skipped, {} send failures",
        outcome.delivered.len(),
        outcome.skipped.len(),
        outcome.send_failures.len()
    );
    Ok(outcome)
}

async fn work(
    worker: usize,
    mut reporter: Box<dyn Reporter>,
    collector: &Collector,
    config: &Config,
) -> Box<dyn Reporter> {
    debug!("worker {}: processing {}", worker, reporter.name());

    if let Err(e) = collector.pull(reporter.as_mut()).await {
        error!("worker {}: {}: {}", worker, reporter.name(), e);
        reporter.record_error(e.to_string());
        // Nothing was ingested, so there is nothing to derive
        if !reporter.has_report() {
            return reporter;
        }
    }

    if let Err(e) = reporter.build_event(config) {
        error!("worker {}: {}: {}", worker, reporter.name(), e);
        reporter.record_error(e.to_string());
    }
    reporter
}

async fn dispatch(
    reporter: &dyn Reporter,
    config: &Config,
    sink: &dyn AnalyticsSink,
    outcome: &mut RunOutcome,
) {
    let name = reporter.name();

    if config.is_test() {
        for e in reporter.errors() {
            error!("{}: {}", name, e);
        }
        match reporter.event() {
            Some(event) => {
                info!("adding test data for {}", name);
                outcome.test_output.insert(name.to_string(), event.clone());
            }
            None => warn!("{}: no event built, leaving it out of the test output", name),
        }
        return;
    }

    if !reporter.errors().is_empty() {
        error!("{}: {}", name, reporter.errors().join("; "));
        outcome.skipped.push(name.to_string());
        return;
    }

    let Some(event) = reporter.event() else {
        error!("{}: completed without an event", name);
        outcome.skipped.push(name.to_string());
        return;
    };
    match sink.send(event).await {
        Ok(()) => {
            info!("sent {} event for {}", event.event, name);
            outcome.delivered.push(name.to_string());
        }
        Err(e) => {
            error!("{}: {}", name, e);
            outcome.send_failures.push(name.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SinkError;
    use crate::reporter::{HealthReporter, PackageReporter};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<AnalyticsEvent>>,
    }

    #[async_trait]
    impl AnalyticsSink for RecordingSink {
        async fn send(&self, event: &AnalyticsEvent) -> Result<(), SinkError> {
            self.sent.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    fn unconfigured() -> Vec<Box<dyn Reporter>> {
        vec![
            Box::new(HealthReporter::new("diagnostics", Vec::new(), "GET")),
            Box::new(PackageReporter::new("cosmos", Vec::new(), "POST")),
        ]
    }

    #[tokio::test]
    async fn test_reporters_without_endpoints_are_skipped() {
        let sink = RecordingSink::default();
        let outcome = run_reporters(unconfigured(), &Config::default(), &sink).await.unwrap();

        assert!(sink.sent.lock().unwrap().is_empty());
        assert!(outcome.delivered.is_empty());
        let mut skipped = outcome.skipped.clone();
        skipped.sort();
        assert_eq!(skipped, vec!["cosmos", "diagnostics"]);
    }

    #[tokio::test]
    async fn test_worker_records_exactly_one_error_without_endpoints() {
        let collector = Collector::new(&Config::default()).unwrap();
        let cosmos = Box::new(PackageReporter::new("cosmos", Vec::new(), "POST"));
        let reporter = work(1, cosmos, &collector, &Config::default()).await;
        assert_eq!(reporter.errors().len(), 1);
        assert!(reporter.errors()[0].contains("no endpoints"));
        assert!(reporter.event().is_none());
    }

    #[tokio::test]
    async fn test_dispatch_in_test_mode_never_sends() {
        let cfg = Config { test_mode: TestMode::Stdout, ..Config::default() };
        let sink = RecordingSink::default();
        let mut r = PackageReporter::new("cosmos", vec!["/package/list".into()], "POST");
        r.ingest(br#"{"packages": [{"appId": "/kafka"}]}"#).unwrap();
        r.build_event(&cfg).unwrap();

        let mut outcome = RunOutcome::default();
        dispatch(&r, &cfg, &sink, &mut outcome).await;
        assert!(sink.sent.lock().unwrap().is_empty());
        assert_eq!(outcome.test_output.len(), 1);
        assert_eq!(outcome.test_output["cosmos"].event, "package_list");
    }

    #[tokio::test]
    async fn test_dispatch_withholds_partially_built_events() {
        let cfg = Config::default();
        let sink = RecordingSink::default();
        let mut r = PackageReporter::new("cosmos", vec!["/package/list".into()], "POST");
        r.ingest(br#"{"packages": []}"#).unwrap();
        r.build_event(&cfg).unwrap();
        r.record_error("second endpoint failed".into());

        let mut outcome = RunOutcome::default();
        dispatch(&r, &cfg, &sink, &mut outcome).await;
        assert!(sink.sent.lock().unwrap().is_empty());
        assert_eq!(outcome.skipped, vec!["cosmos"]);
    }

    #[tokio::test]
    async fn test_dispatch_sends_healthy_reporter() {
        let cfg = Config::default();
        let sink = RecordingSink::default();
        let mut r = PackageReporter::new("cosmos", vec!["/package/list".into()], "POST");
        r.ingest(br#"{"packages": [{"appId": "/spark"}]}"#).unwrap();
        r.build_event(&cfg).unwrap();

        let mut outcome = RunOutcome::default();
        dispatch(&r, &cfg, &sink, &mut outcome).await;
        assert_eq!(outcome.delivered, vec!["cosmos"]);
        let sent = sink.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].properties["package_list"], serde_json::json!(["/spark"]));
    }
}
