use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use seshat::clock::ManualClock;
use seshat::config::{FailoverConfig, OracleConfig, TimeSourceKind};
use seshat::errors::SeshatError;
use seshat::oracle::{FailoverMonitor, FailoverPhase, HealthProbe, ProbeOutcome, TimeOracle};
use seshat::timesource::{
    self, CounterTimeSource, HybridTimeSource, SimpleTimeSource, TimeMode, TimeSource,
};

fn failover_config() -> FailoverConfig {
    FailoverConfig {
        primary_url: "http://primary".to_string(),
        max_skew: Duration::from_millis(50),
        failure_threshold: 3,
        probe_interval: Duration::from_millis(100),
        probe_timeout: Duration::from_millis(50),
    }
}

async fn assert_strictly_increasing(source: &dyn TimeSource, draws: usize) {
    let mut last = source.get_time(TimeMode::Start).await.unwrap();
    for i in 0..draws {
        let mode = if i % 2 == 0 {
            TimeMode::Commit
        } else {
            TimeMode::Start
        };
        let ts = source.get_time(mode).await.unwrap();
        assert!(ts > last, "{ts} after {last}");
        last = ts;
    }
}

#[tokio::test]
async fn test_every_source_is_strictly_increasing() {
    let clock = Arc::new(ManualClock::new(1_000));
    assert_strictly_increasing(&HybridTimeSource::with_clock(6, clock).unwrap(), 1_000).await;
    assert_strictly_increasing(&SimpleTimeSource::new(), 1_000).await;
    assert_strictly_increasing(&CounterTimeSource::new(), 1_000).await;
    for kind in [TimeSourceKind::Hybrid, TimeSourceKind::Simple, TimeSourceKind::Counter] {
        let config = OracleConfig {
            kind,
            ..OracleConfig::default()
        };
        assert_strictly_increasing(timesource::from_config(&config).unwrap().as_ref(), 200).await;
    }
}

#[tokio::test]
async fn test_hybrid_layout_and_tick() {
    let clock = Arc::new(ManualClock::new(1_000));
    let source = HybridTimeSource::with_clock(6, clock.clone()).unwrap();
    assert_eq!(source.get_time(TimeMode::Start).await.unwrap(), 1_000_000_001);
    assert_eq!(source.get_time(TimeMode::Start).await.unwrap(), 1_000_000_002);

    clock.set(2_000);
    source.tick();
    assert_eq!(source.get_time(TimeMode::Commit).await.unwrap(), 2_000_000_001);

    // A clock stepping back cannot make timestamps go backwards.
    clock.set(1_500);
    source.tick();
    assert_eq!(source.get_time(TimeMode::Commit).await.unwrap(), 2_000_000_002);
    assert_eq!(source.last_issued(), Some(2_000_000_002));
}

#[tokio::test]
async fn test_hybrid_refreshes_before_logical_overflow() {
    let clock = Arc::new(ManualClock::new(7));
    // With two logical bits every draw re-reads the physical clock.
    let source = HybridTimeSource::with_clock(2, clock.clone()).unwrap();
    let first = source.get_time(TimeMode::Start).await.unwrap();
    clock.set(8);
    let second = source.get_time(TimeMode::Start).await.unwrap();
    assert_eq!(first, 701);
    assert_eq!(second, 801);
}

#[tokio::test]
async fn test_hybrid_rejects_layouts_that_overflow() {
    let now = Arc::new(ManualClock::new(1_700_000_000_000));
    let source = HybridTimeSource::with_clock(6, now.clone()).unwrap();
    assert!(source.get_time(TimeMode::Start).await.unwrap() > 1_700_000_000_000_000_000);
    for bits in [7, 19, 63, 64, 200] {
        assert!(matches!(
            HybridTimeSource::with_clock(bits, now.clone()),
            Err(SeshatError::Config(_))
        ));
    }
    let config = OracleConfig {
        logical_bits: 12,
        ..OracleConfig::default()
    };
    assert!(matches!(
        timesource::from_config(&config),
        Err(SeshatError::Config(_))
    ));

    // A wall clock that later outgrows the layout stops issuing timestamps.
    let clock = Arc::new(ManualClock::new(1_000));
    let source = HybridTimeSource::with_clock(6, clock.clone()).unwrap();
    source.get_time(TimeMode::Start).await.unwrap();
    clock.set(i64::MAX / 10);
    source.tick();
    assert!(matches!(
        source.get_time(TimeMode::Commit).await,
        Err(SeshatError::OracleUnavailable(_))
    ));
    assert_eq!(source.last_issued(), Some(1_000_000_001));
}

#[tokio::test]
async fn test_observe_raises_floor() {
    let counter = CounterTimeSource::new();
    counter.observe(500);
    assert_eq!(counter.get_time(TimeMode::Start).await.unwrap(), 501);

    let hybrid = HybridTimeSource::with_clock(6, Arc::new(ManualClock::new(1))).unwrap();
    hybrid.observe(9_000_000_000);
    assert!(hybrid.get_time(TimeMode::Commit).await.unwrap() > 9_000_000_000);
}

#[tokio::test]
async fn test_inactive_oracle_refuses_timestamps() {
    let oracle = TimeOracle::backup(Arc::new(CounterTimeSource::new()));
    match oracle.get_time(TimeMode::Start).await {
        Err(SeshatError::OracleUnavailable(msg)) => assert_eq!(msg, "Service not active"),
        other => panic!("expected unavailable, got {other:?}"),
    }

    oracle.activate_above(Some(1_000));
    assert!(oracle.is_active());
    assert_eq!(oracle.get_time(TimeMode::Start).await.unwrap(), 1_001);

    oracle.set_active(false);
    assert!(oracle.get_time(TimeMode::Commit).await.is_err());
}

#[test]
fn test_failover_waits_twice_the_skew_after_breach() {
    let mut monitor = FailoverMonitor::new(failover_config());
    let t0 = Instant::now();

    monitor.record_probe(ProbeOutcome::failed(), t0);
    monitor.record_probe(ProbeOutcome::failed(), t0);
    assert_eq!(monitor.phase(), FailoverPhase::Watching { failures: 2 });
    assert!(!monitor.poll(t0 + Duration::from_secs(10)));

    monitor.record_probe(ProbeOutcome::failed(), t0);
    assert_eq!(monitor.phase(), FailoverPhase::Breached { since: t0 });
    assert_eq!(
        monitor.activation_deadline(),
        Some(t0 + Duration::from_millis(100))
    );

    assert!(!monitor.poll(t0 + Duration::from_millis(99)));
    assert!(!monitor.is_active());
    assert!(monitor.poll(t0 + Duration::from_millis(100)));
    assert!(monitor.is_active());

    // Once active, a recovering primary does not demote this node.
    monitor.record_probe(ProbeOutcome::healthy(None), t0 + Duration::from_secs(1));
    assert!(monitor.is_active());
}

#[test]
fn test_healthy_probe_cancels_breach() {
    let mut monitor = FailoverMonitor::new(failover_config());
    let t0 = Instant::now();
    for _ in 0..3 {
        monitor.record_probe(ProbeOutcome::failed(), t0);
    }
    monitor.record_probe(ProbeOutcome::healthy(Some(10)), t0 + Duration::from_millis(50));
    assert_eq!(monitor.phase(), FailoverPhase::Watching { failures: 0 });
    assert!(!monitor.poll(t0 + Duration::from_secs(1)));

    // An interrupted streak starts over.
    monitor.record_probe(ProbeOutcome::failed(), t0);
    monitor.record_probe(ProbeOutcome::healthy(None), t0);
    monitor.record_probe(ProbeOutcome::failed(), t0);
    monitor.record_probe(ProbeOutcome::failed(), t0);
    assert_eq!(monitor.phase(), FailoverPhase::Watching { failures: 2 });
}

#[test]
fn test_floor_tracks_highest_reported_timestamp() {
    let mut monitor = FailoverMonitor::new(failover_config());
    let now = Instant::now();
    assert_eq!(monitor.floor(), None);
    monitor.record_probe(ProbeOutcome::healthy(Some(500)), now);
    monitor.record_probe(ProbeOutcome::healthy(Some(300)), now);
    monitor.record_probe(ProbeOutcome::healthy(None), now);
    assert_eq!(monitor.floor(), Some(500));
}

/// Replays scripted outcomes, then keeps failing.
struct ScriptedProbe {
    script: Mutex<VecDeque<ProbeOutcome>>,
}

#[async_trait]
impl HealthProbe for ScriptedProbe {
    async fn probe(&self) -> ProbeOutcome {
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(ProbeOutcome::failed)
    }
}

#[tokio::test(start_paused = true)]
async fn test_backup_takes_over_after_safety_wait() {
    let oracle = Arc::new(TimeOracle::backup(Arc::new(CounterTimeSource::new())));
    let probe = Arc::new(ScriptedProbe {
        script: Mutex::new(VecDeque::from([ProbeOutcome::healthy(Some(5_000))])),
    });
    let handle = FailoverMonitor::spawn(failover_config(), oracle.clone(), probe);

    // Probes at 0 (healthy), 100, 200, 300 (third failure, breach), so no
    // activation before 300 + 2 * 50.
    tokio::time::sleep(Duration::from_millis(350)).await;
    assert!(!oracle.is_active());
    assert!(oracle.get_time(TimeMode::Start).await.is_err());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(oracle.is_active());
    assert!(handle.is_finished());
    assert_eq!(oracle.get_time(TimeMode::Start).await.unwrap(), 5_001);
}

#[cfg(feature = "network")]
mod http {
    use super::*;
    use seshat::oracle::{HttpHealthProbe, OracleServer};
    use seshat::timesource::GlobalTimeSource;

    async fn serve(oracle: Arc<TimeOracle>) -> String {
        let (addr, _handle) = OracleServer::spawn("127.0.0.1:0".parse().unwrap(), oracle)
            .await
            .unwrap();
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_remote_time_source() {
        let primary = Arc::new(TimeOracle::primary(Arc::new(CounterTimeSource::starting_at(41))));
        let url = serve(primary.clone()).await;

        let remote = GlobalTimeSource::new(url.clone()).unwrap();
        assert_eq!(remote.get_time(TimeMode::Start).await.unwrap(), 42);
        assert_eq!(remote.get_time(TimeMode::Commit).await.unwrap(), 43);
        let plain = reqwest::get(format!("{url}/timestamp/")).await.unwrap();
        assert_eq!(plain.text().await.unwrap(), "44");

        primary.set_active(false);
        assert!(matches!(
            remote.get_time(TimeMode::Start).await,
            Err(SeshatError::OracleUnavailable(_))
        ));
        let refused = reqwest::get(format!("{url}/timestamp/start")).await.unwrap();
        assert_eq!(refused.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(refused.text().await.unwrap(), "Service not active");
    }

    #[tokio::test]
    async fn test_health_reports_last_issued() {
        let primary = Arc::new(TimeOracle::primary(Arc::new(CounterTimeSource::new())));
        let url = serve(primary.clone()).await;
        let probe = HttpHealthProbe::new(url.clone(), Duration::from_millis(500)).unwrap();

        assert_eq!(probe.probe().await, ProbeOutcome::healthy(None));
        primary.get_time(TimeMode::Start).await.unwrap();
        primary.get_time(TimeMode::Start).await.unwrap();
        assert_eq!(probe.probe().await, ProbeOutcome::healthy(Some(2)));

        primary.set_active(false);
        assert_eq!(probe.probe().await, ProbeOutcome::failed());

        let nowhere = HttpHealthProbe::new("127.0.0.1:1", Duration::from_millis(200)).unwrap();
        assert!(!nowhere.probe().await.healthy);
    }

    /// Answers every connection with `response` and hangs up.
    async fn canned(response: &'static str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut request = [0_u8; 1024];
                let _ = socket.read(&mut request).await;
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_health_without_readable_floor_is_still_healthy() {
        let garbled = canned("HTTP/1.1 200 OK\r\nContent-Length: 15\r\n\r\nOK\nnot-a-number").await;
        let probe = HttpHealthProbe::new(garbled, Duration::from_millis(500)).unwrap();
        assert_eq!(probe.probe().await, ProbeOutcome::healthy(None));

        // The body is cut short of its declared length.
        let truncated = canned("HTTP/1.1 200 OK\r\nContent-Length: 64\r\n\r\nOK\n12").await;
        let probe = HttpHealthProbe::new(truncated, Duration::from_millis(500)).unwrap();
        assert_eq!(probe.probe().await, ProbeOutcome::healthy(None));
    }

    #[tokio::test]
    async fn test_http_failover_continues_above_primary() {
        let primary = Arc::new(TimeOracle::primary(Arc::new(CounterTimeSource::starting_at(
            1_000,
        ))));
        let primary_url = serve(primary.clone()).await;
        let backup = Arc::new(TimeOracle::backup(Arc::new(CounterTimeSource::new())));
        let backup_url = serve(backup.clone()).await;

        let config = FailoverConfig {
            primary_url: primary_url.clone(),
            max_skew: Duration::from_millis(10),
            failure_threshold: 3,
            probe_interval: Duration::from_millis(20),
            probe_timeout: Duration::from_millis(200),
        };
        let probe = Arc::new(HttpHealthProbe::new(primary_url.clone(), config.probe_timeout).unwrap());
        let monitor = FailoverMonitor::spawn(config, backup.clone(), probe);

        let client = GlobalTimeSource::new(primary_url).unwrap();
        let mut last = 0;
        for _ in 0..5 {
            last = client.get_time(TimeMode::Commit).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!backup.is_active());

        primary.set_active(false);
        tokio::time::timeout(Duration::from_secs(5), monitor)
            .await
            .unwrap()
            .unwrap();

        let via_backup = GlobalTimeSource::new(backup_url).unwrap();
        assert!(via_backup.get_time(TimeMode::Start).await.unwrap() > last);
    }
}
