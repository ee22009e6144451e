use std::{collections::HashSet, sync::Arc, time::Duration};

use futures::future::join_all;
use metrics::{counter, histogram};
use thiserror::Error;
use tokio::{
    sync::watch,
    time::{sleep, Instant},
};
use tracing::{error, info, warn};

use txwatch_domain::{
    AlertSink, Network, PriceUnavailable, ProviderError, StartupSummary, Transaction,
};

use crate::monitor::NetworkMonitor;

/// Per-poll failure reported by a network monitor.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error(transparent)]
    PriceUnavailable(#[from] PriceUnavailable),
    #[error("cached price for {network} is {}s old", .age.as_secs())]
    StalePrice { network: Network, age: Duration },
    #[error("{network} provider error: {source}")]
    Provider {
        network: Network,
        #[source]
        source: ProviderError,
    },
}

/// Timing knobs for the polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorSettings {
    pub interval: Duration,
    pub alert_spacing: Duration,
    pub shutdown_grace: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            alert_spacing: Duration::from_millis(500),
            shutdown_grace: Duration::from_secs(30),
        }
    }
}

/// What happened during one polling cycle.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub emitted: usize,
    pub alerts_sent: usize,
    pub alert_failures: usize,
    pub failed_networks: Vec<Network>,
    pub recovered_networks: Vec<Network>,
}

/// Drives every registered monitor on a fixed interval and forwards what they
/// emit to the alert sink.
///
/// The sink hears about a network's health only when it changes: one error
/// notice when polls start failing, one recovery notice when they succeed
/// again.
pub struct Orchestrator {
    monitors: Vec<Box<dyn NetworkMonitor>>,
    sink: Arc<dyn AlertSink>,
    settings: OrchestratorSettings,
    failing: HashSet<Network>,
}

impl Orchestrator {
    pub fn new(
        monitors: Vec<Box<dyn NetworkMonitor>>,
        sink: Arc<dyn AlertSink>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            monitors,
            sink,
            settings,
            failing: HashSet::new(),
        }
    }

    pub fn networks(&self) -> Vec<Network> {
        self.monitors.iter().map(|monitor| monitor.network()).collect()
    }

    /// Polls all monitors concurrently, then delivers alerts network by
    /// network. A failing monitor never prevents the others from alerting.
    pub async fn run_cycle(&mut self) -> CycleReport {
        let started = Instant::now();
        let outcomes = join_all(self.monitors.iter_mut().map(|monitor| async move {
            let network = monitor.network();
            (network, monitor.poll().await)
        }))
        .await;

        let mut report = CycleReport::default();
        for (network, outcome) in outcomes {
            match outcome {
                Ok(transactions) => {
                    if self.failing.remove(&network) {
                        info!(%network, "network recovered");
                        report.recovered_networks.push(network);
                        if let Err(sink_err) = self.sink.send_recovery_notification(network).await {
                            warn!(%network, error = %sink_err, "failed to deliver recovery notification");
                        }
                    }
                    report.emitted += transactions.len();
                    for tx in &transactions {
                        deliver(
                            self.sink.as_ref(),
                            self.settings.alert_spacing,
                            tx,
                            &mut report,
                        )
                        .await;
                    }
                }
                Err(err) => {
                    report.failed_networks.push(network);
                    if !self.failing.insert(network) {
                        warn!(%network, error = %err, "poll still failing");
                        continue;
                    }
                    error!(%network, error = %err, "poll failed");
                    if let Err(sink_err) = self
                        .sink
                        .send_error_notification(&format!("{network}: {err}"))
                        .await
                    {
                        warn!(%network, error = %sink_err, "failed to deliver error notification");
                    }
                }
            }
        }

        histogram!("txwatch_cycle_seconds").record(started.elapsed().as_secs_f64());
        report
    }

    /// Announces startup, then runs cycles until `shutdown` flips to `true`.
    ///
    /// Cycles start `interval` apart, measured from each cycle's start; an
    /// overrunning cycle is followed immediately by the next one. A shutdown
    /// raised mid-cycle lets the cycle finish for up to `shutdown_grace`.
    pub async fn run_forever(&mut self, min_usd: f64, mut shutdown: watch::Receiver<bool>) {
        let summary = StartupSummary {
            networks: self.networks(),
            min_usd,
            poll_interval: self.settings.interval,
        };
        info!(
            networks = ?summary.networks,
            min_usd,
            interval_secs = self.settings.interval.as_secs(),
            "starting monitor loop"
        );
        if let Err(err) = self.sink.send_startup_notification(&summary).await {
            warn!(error = %err, "failed to deliver startup notification");
        }

        loop {
            if *shutdown.borrow() {
                break;
            }
            let cycle_start = Instant::now();
            let grace = self.settings.shutdown_grace;
            let mut stop_requested = false;

            let report = {
                let cycle = self.run_cycle();
                tokio::pin!(cycle);
                tokio::select! {
                    report = &mut cycle => Some(report),
                    _ = wait_for_shutdown(&mut shutdown) => {
                        stop_requested = true;
                        info!(grace_secs = grace.as_secs(), "shutdown requested, finishing current cycle");
                        tokio::time::timeout(grace, &mut cycle).await.ok()
                    }
                }
            };

            let Some(report) = report else {
                warn!("cycle abandoned after shutdown grace period");
                break;
            };
            info!(
                emitted = report.emitted,
                alerts_sent = report.alerts_sent,
                alert_failures = report.alert_failures,
                failed = report.failed_networks.len(),
                "cycle complete"
            );
            if stop_requested {
                break;
            }

            let remaining = self
                .settings
                .interval
                .saturating_sub(cycle_start.elapsed());
            if remaining.is_zero() {
                continue;
            }
            tokio::select! {
                _ = sleep(remaining) => {}
                _ = wait_for_shutdown(&mut shutdown) => break,
            }
        }

        info!("monitor loop stopped");
    }
}

/// Sends one alert, pacing consecutive deliveries by `spacing`.
async fn deliver(
    sink: &dyn AlertSink,
    spacing: Duration,
    tx: &Transaction,
    report: &mut CycleReport,
) {
    if report.alerts_sent + report.alert_failures > 0 && !spacing.is_zero() {
        sleep(spacing).await;
    }

    match sink.send_transaction_alert(tx).await {
        Ok(()) => {
            counter!("txwatch_alerts_total", "result" => "sent").increment(1);
            info!(
                network = %tx.network(),
                hash = tx.tx_hash(),
                amount_usd = tx.amount_usd(),
                "alert sent"
            );
            report.alerts_sent += 1;
        }
        Err(err) => {
            counter!("txwatch_alerts_total", "result" => "failed").increment(1);
            error!(
                network = %tx.network(),
                hash = tx.tx_hash(),
                error = %err,
                "failed to deliver alert"
            );
            report.alert_failures += 1;
        }
    }
}

/// Resolves once the shutdown flag is raised or its sender is gone.
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::{
        tests::{raw, FixedPrice, ScriptedTransfers},
        PollingMonitor,
    };
    use async_trait::async_trait;
    use std::sync::Mutex;
    use txwatch_domain::{ProviderResult, RawTransfer, SinkError, SinkResult, TransferSource};

    #[derive(Default)]
    struct RecordingSink {
        alerts: Mutex<Vec<String>>,
        errors: Mutex<Vec<String>>,
        recoveries: Mutex<Vec<Network>>,
        startups: Mutex<usize>,
        fail_alerts: bool,
    }

    #[async_trait]
    impl AlertSink for RecordingSink {
        async fn send_transaction_alert(&self, tx: &Transaction) -> SinkResult<()> {
            if self.fail_alerts {
                return Err(SinkError::Status(500));
            }
            self.alerts.lock().unwrap().push(tx.tx_hash().to_string());
            Ok(())
        }

        async fn send_error_notification(&self, message: &str) -> SinkResult<()> {
            self.errors.lock().unwrap().push(message.to_string());
            Ok(())
        }

        async fn send_recovery_notification(&self, network: Network) -> SinkResult<()> {
            self.recoveries.lock().unwrap().push(network);
            Ok(())
        }

        async fn send_startup_notification(&self, _summary: &StartupSummary) -> SinkResult<()> {
            *self.startups.lock().unwrap() += 1;
            Ok(())
        }
    }

    fn quick_settings() -> OrchestratorSettings {
        settings(Duration::from_millis(20), Duration::from_secs(1))
    }

    fn settings(interval: Duration, shutdown_grace: Duration) -> OrchestratorSettings {
        OrchestratorSettings {
            interval,
            alert_spacing: Duration::ZERO,
            shutdown_grace,
        }
    }

    /// Transfer source that takes `delay` per fetch and remembers when each
    /// fetch started.
    #[derive(Clone)]
    struct SlowTransfers {
        delay: Duration,
        batch: Vec<RawTransfer>,
        started: Arc<Mutex<Vec<Instant>>>,
    }

    impl SlowTransfers {
        fn new(delay: Duration, batch: Vec<RawTransfer>) -> Self {
            Self {
                delay,
                batch,
                started: Arc::default(),
            }
        }

        fn gaps(&self) -> Vec<Duration> {
            let started = self.started.lock().unwrap();
            started.windows(2).map(|pair| pair[1] - pair[0]).collect()
        }
    }

    #[async_trait]
    impl TransferSource for SlowTransfers {
        async fn fetch_recent_transactions(&self) -> ProviderResult<Vec<RawTransfer>> {
            self.started.lock().unwrap().push(Instant::now());
            sleep(self.delay).await;
            Ok(self.batch.clone())
        }
    }

    fn slow_monitor(transfers: SlowTransfers) -> Box<dyn NetworkMonitor> {
        Box::new(PollingMonitor::new(
            Network::Ton,
            transfers,
            FixedPrice::ok(2.0),
            1000.0,
        ))
    }

    fn assert_close(actual: Duration, expected: Duration) {
        assert!(
            actual >= expected && actual < expected + Duration::from_millis(100),
            "expected about {expected:?}, got {actual:?}"
        );
    }

    fn healthy(network: Network, hash: &str) -> Box<dyn NetworkMonitor> {
        Box::new(PollingMonitor::new(
            network,
            ScriptedTransfers::new(vec![Ok(vec![raw(hash, 600.0)])]),
            FixedPrice::ok(2.0),
            1000.0,
        ))
    }

    #[tokio::test]
    async fn one_failing_network_does_not_block_the_others() {
        let failing: Box<dyn NetworkMonitor> = Box::new(PollingMonitor::new(
            Network::Venom,
            ScriptedTransfers::new(vec![Err(ProviderError::Status(502))]),
            FixedPrice::ok(2.0),
            1000.0,
        ));
        let sink = Arc::new(RecordingSink::default());
        let mut orchestrator = Orchestrator::new(
            vec![
                healthy(Network::Ton, "ton-1"),
                healthy(Network::Everscale, "ever-1"),
                failing,
                healthy(Network::Humanode, "hmnd-1"),
            ],
            sink.clone(),
            quick_settings(),
        );

        let report = orchestrator.run_cycle().await;

        assert_eq!(report.failed_networks, vec![Network::Venom]);
        assert_eq!(report.emitted, 3);
        assert_eq!(report.alerts_sent, 3);
        let mut alerts = sink.alerts.lock().unwrap().clone();
        alerts.sort();
        assert_eq!(alerts, vec!["ever-1", "hmnd-1", "ton-1"]);
        let errors = sink.errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("Venom:"));
    }

    #[tokio::test]
    async fn sink_failures_do_not_re_alert() {
        let sink = Arc::new(RecordingSink {
            fail_alerts: true,
            ..Default::default()
        });
        let monitor: Box<dyn NetworkMonitor> = Box::new(PollingMonitor::new(
            Network::Ton,
            ScriptedTransfers::new(vec![
                Ok(vec![raw("a1", 600.0)]),
                Ok(vec![raw("a1", 600.0)]),
            ]),
            FixedPrice::ok(2.0),
            1000.0,
        ));
        let mut orchestrator = Orchestrator::new(vec![monitor], sink, quick_settings());

        let first = orchestrator.run_cycle().await;
        assert_eq!(first.alert_failures, 1);
        let second = orchestrator.run_cycle().await;
        assert_eq!(second.emitted, 0);
        assert!(second.failed_networks.is_empty());
    }

    #[tokio::test]
    async fn preserves_per_network_order() {
        let sink = Arc::new(RecordingSink::default());
        let monitor: Box<dyn NetworkMonitor> = Box::new(PollingMonitor::new(
            Network::Ton,
            ScriptedTransfers::new(vec![Ok(vec![
                raw("c", 600.0),
                raw("a", 600.0),
                raw("b", 600.0),
            ])]),
            FixedPrice::ok(2.0),
            1000.0,
        ));
        let mut orchestrator = Orchestrator::new(vec![monitor], sink.clone(), quick_settings());

        orchestrator.run_cycle().await;
        assert_eq!(*sink.alerts.lock().unwrap(), vec!["c", "a", "b"]);
    }

    #[tokio::test]
    async fn run_forever_stops_on_shutdown() {
        let sink = Arc::new(RecordingSink::default());
        let mut orchestrator = Orchestrator::new(
            vec![healthy(Network::Ton, "ton-1")],
            sink.clone(),
            quick_settings(),
        );
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            orchestrator.run_forever(1000.0, rx).await;
        });
        sleep(Duration::from_millis(70)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("loop stops")
            .unwrap();

        assert_eq!(*sink.startups.lock().unwrap(), 1);
        assert_eq!(*sink.alerts.lock().unwrap(), vec!["ton-1"]);
    }

    #[tokio::test]
    async fn pre_raised_shutdown_skips_polling() {
        let sink = Arc::new(RecordingSink::default());
        let mut orchestrator = Orchestrator::new(
            vec![healthy(Network::Ton, "ton-1")],
            sink.clone(),
            quick_settings(),
        );
        let (_tx, rx) = watch::channel(true);

        orchestrator.run_forever(1000.0, rx).await;
        assert!(sink.alerts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn health_notices_fire_on_transitions_only() {
        let sink = Arc::new(RecordingSink::default());
        let monitor: Box<dyn NetworkMonitor> = Box::new(PollingMonitor::new(
            Network::Venom,
            ScriptedTransfers::new(vec![
                Err(ProviderError::Status(502)),
                Err(ProviderError::Status(502)),
                Ok(Vec::new()),
                Ok(Vec::new()),
                Err(ProviderError::Status(503)),
            ]),
            FixedPrice::ok(2.0),
            1000.0,
        ));
        let mut orchestrator = Orchestrator::new(vec![monitor], sink.clone(), quick_settings());

        let first = orchestrator.run_cycle().await;
        let second = orchestrator.run_cycle().await;
        assert_eq!(first.failed_networks, vec![Network::Venom]);
        assert_eq!(second.failed_networks, vec![Network::Venom]);
        assert_eq!(sink.errors.lock().unwrap().len(), 1);

        let third = orchestrator.run_cycle().await;
        assert_eq!(third.recovered_networks, vec![Network::Venom]);
        let fourth = orchestrator.run_cycle().await;
        assert!(fourth.recovered_networks.is_empty());
        assert_eq!(*sink.recoveries.lock().unwrap(), vec![Network::Venom]);

        orchestrator.run_cycle().await;
        let errors = sink.errors.lock().unwrap();
        assert_eq!(errors.len(), 2);
        assert!(errors[1].contains("503"));
    }

    #[tokio::test(start_paused = true)]
    async fn interval_is_measured_from_cycle_start() {
        let transfers = SlowTransfers::new(Duration::from_secs(2), Vec::new());
        let mut orchestrator = Orchestrator::new(
            vec![slow_monitor(transfers.clone())],
            Arc::new(RecordingSink::default()),
            settings(Duration::from_secs(10), Duration::from_secs(1)),
        );
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(async move { orchestrator.run_forever(1000.0, rx).await });
        sleep(Duration::from_secs(35)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        let gaps = transfers.gaps();
        assert_eq!(gaps.len(), 3);
        for gap in gaps {
            assert_close(gap, Duration::from_secs(10));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn overrunning_cycle_is_followed_immediately() {
        let transfers = SlowTransfers::new(Duration::from_secs(15), Vec::new());
        let mut orchestrator = Orchestrator::new(
            vec![slow_monitor(transfers.clone())],
            Arc::new(RecordingSink::default()),
            settings(Duration::from_secs(10), Duration::from_secs(1)),
        );
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(async move { orchestrator.run_forever(1000.0, rx).await });
        sleep(Duration::from_secs(50)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        let gaps = transfers.gaps();
        assert_eq!(gaps.len(), 3);
        for gap in gaps {
            assert_close(gap, Duration::from_secs(15));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_mid_cycle_abandons_after_grace() {
        let transfers = SlowTransfers::new(Duration::from_secs(100), vec![raw("late", 600.0)]);
        let sink = Arc::new(RecordingSink::default());
        let mut orchestrator = Orchestrator::new(
            vec![slow_monitor(transfers)],
            sink.clone(),
            settings(Duration::from_secs(10), Duration::from_secs(5)),
        );
        let (tx, rx) = watch::channel(false);
        let started = Instant::now();

        let handle = tokio::spawn(async move { orchestrator.run_forever(1000.0, rx).await });
        sleep(Duration::from_secs(1)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert_close(started.elapsed(), Duration::from_secs(6));
        assert!(sink.alerts.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_mid_cycle_lets_a_short_cycle_finish() {
        let transfers = SlowTransfers::new(Duration::from_secs(3), vec![raw("late", 600.0)]);
        let sink = Arc::new(RecordingSink::default());
        let mut orchestrator = Orchestrator::new(
            vec![slow_monitor(transfers.clone())],
            sink.clone(),
            settings(Duration::from_secs(10), Duration::from_secs(5)),
        );
        let (tx, rx) = watch::channel(false);
        let started = Instant::now();

        let handle = tokio::spawn(async move { orchestrator.run_forever(1000.0, rx).await });
        sleep(Duration::from_secs(1)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert_close(started.elapsed(), Duration::from_secs(3));
        assert_eq!(*sink.alerts.lock().unwrap(), vec!["late"]);
        assert!(transfers.gaps().is_empty());
    }
}
