// Declare the common module *within this test crate*
mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use rand::Rng;
use seshat::config::TransactionConfig;
use seshat::errors::SeshatError;
use seshat::{Seshat, TxnStatus};

use common::{counter_oracle, manual_clock, setup_seshat, setup_single};

/// Adds `delta` to `key`, retrying conflicted attempts in fresh transactions.
async fn increment(seshat: &Seshat, key: &str, delta: i64) -> usize {
    let mut attempts = 0;
    loop {
        attempts += 1;
        let mut txn = seshat.begin().await.unwrap();
        let current = match txn.read::<i64>("ds", key).await {
            Ok(v) => v,
            Err(e) if e.is_key_not_found() => 0,
            Err(e) if e.is_retryable() => {
                txn.abort().await.unwrap();
                tokio::task::yield_now().await;
                continue;
            }
            Err(e) => panic!("unexpected read error: {e:?}"),
        };
        txn.write("ds", key, &(current + delta)).unwrap();
        match txn.commit().await {
            Ok(()) => return attempts,
            Err(e) if e.is_retryable() => {
                assert_eq!(txn.state(), TxnStatus::Aborted);
                tokio::task::yield_now().await;
            }
            Err(e) => panic!("unexpected commit error: {e:?}"),
        }
    }
}

#[tokio::test]
async fn test_write_write_conflict_first_committer_wins() {
    let (seshat, _conn) = setup_single();
    let mut setup = seshat.begin().await.unwrap();
    setup.write("ds", "key1", &0_i64).unwrap();
    setup.commit().await.unwrap();

    let mut tx1 = seshat.begin().await.unwrap();
    let mut tx2 = seshat.begin().await.unwrap();
    let v1: i64 = tx1.read("ds", "key1").await.unwrap();
    let v2: i64 = tx2.read("ds", "key1").await.unwrap();
    tx1.write("ds", "key1", &(v1 + 1)).unwrap();
    tx2.write("ds", "key1", &(v2 + 10)).unwrap();

    tx1.commit().await.unwrap();
    let err = tx2.commit().await.unwrap_err();
    assert!(matches!(err, SeshatError::PrepareConflict { .. }), "{err:?}");
    assert!(err.is_retryable());
    assert_eq!(tx2.state(), TxnStatus::Aborted);

    let mut check = seshat.begin().await.unwrap();
    assert_eq!(check.read::<i64>("ds", "key1").await.unwrap(), 1);
}

#[tokio::test]
async fn test_blind_writes_to_new_key_conflict() {
    let (seshat, _conn) = setup_single();
    let mut tx1 = seshat.begin().await.unwrap();
    let mut tx2 = seshat.begin().await.unwrap();
    tx1.write("ds", "fresh", "one").unwrap();
    tx2.write("ds", "fresh", "two").unwrap();

    tx1.commit().await.unwrap();
    // tx2 finds tx1's version, which is newer than its snapshot.
    assert!(tx2.commit().await.unwrap_err().is_retryable());

    let mut check = seshat.begin().await.unwrap();
    assert_eq!(check.read::<String>("ds", "fresh").await.unwrap(), "one");
}

#[tokio::test]
async fn test_disjoint_keys_commit_independently() {
    let (seshat, _conns) = setup_seshat(
        &["a", "b"],
        counter_oracle(0),
        manual_clock(),
        TransactionConfig::default(),
    );
    let mut tx1 = seshat.begin().await.unwrap();
    let mut tx2 = seshat.begin().await.unwrap();
    tx1.write("a", "x", &1).unwrap();
    tx2.write("b", "y", &2).unwrap();
    tx2.commit().await.unwrap();
    tx1.commit().await.unwrap();

    let mut check = seshat.begin().await.unwrap();
    assert_eq!(check.read::<i32>("a", "x").await.unwrap(), 1);
    assert_eq!(check.read::<i32>("b", "y").await.unwrap(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_increments_lose_no_update() {
    const WORKERS: usize = 8;
    const ROUNDS: usize = 10;
    let (seshat, _conn) = setup_single();
    let seshat = Arc::new(seshat);

    let mut expected = 0_i64;
    let mut handles = Vec::new();
    for _ in 0..WORKERS {
        let deltas: Vec<i64> = {
            let mut rng = rand::rng();
            (0..ROUNDS).map(|_| rng.random_range(1..=5)).collect()
        };
        expected += deltas.iter().sum::<i64>();
        let seshat = seshat.clone();
        handles.push(tokio::spawn(async move {
            let mut attempts = 0;
            for delta in deltas {
                attempts += increment(&seshat, "counter", delta).await;
            }
            attempts
        }));
    }
    let mut attempts = 0;
    for handle in handles {
        attempts += handle.await.unwrap();
    }
    assert!(attempts >= WORKERS * ROUNDS);

    let mut check = seshat.begin().await.unwrap();
    assert_eq!(check.read::<i64>("ds", "counter").await.unwrap(), expected);
}

#[test]
fn test_transfer_between_datastores_preserves_total() {
    // Two threads move money in opposite directions between two stores; the
    // sum seen by any snapshot stays constant.
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let (seshat, _conns) = setup_seshat(
        &["checking", "savings"],
        counter_oracle(0),
        manual_clock(),
        TransactionConfig::default(),
    );
    let seshat = Arc::new(seshat);
    runtime.block_on(async {
        let mut setup = seshat.begin().await.unwrap();
        setup.write("checking", "alice", &100_i64).unwrap();
        setup.write("savings", "alice", &100_i64).unwrap();
        setup.commit().await.unwrap();
    });

    let barrier = Arc::new(Barrier::new(2));
    let committed = Arc::new(AtomicUsize::new(0));
    let handle = runtime.handle().clone();
    let mut threads = Vec::new();
    for (from, to) in [("checking", "savings"), ("savings", "checking")] {
        let seshat = seshat.clone();
        let barrier = barrier.clone();
        let committed = committed.clone();
        let handle = handle.clone();
        threads.push(thread::spawn(move || {
            barrier.wait();
            for _ in 0..20 {
                let done = handle.block_on(async {
                    let mut txn = seshat.begin().await.unwrap();
                    let a = txn.read::<i64>(from, "alice").await;
                    let b = txn.read::<i64>(to, "alice").await;
                    let (Ok(a), Ok(b)) = (a, b) else {
                        txn.abort().await.unwrap();
                        return false;
                    };
                    txn.write(from, "alice", &(a - 1)).unwrap();
                    txn.write(to, "alice", &(b + 1)).unwrap();
                    txn.commit().await.is_ok()
                });
                if done {
                    committed.fetch_add(1, Ordering::SeqCst);
                }
            }
        }));
    }
    for t in threads {
        t.join().unwrap();
    }
    assert!(committed.load(Ordering::SeqCst) > 0);

    runtime.block_on(async {
        let mut check = seshat.begin().await.unwrap();
        let checking = check.read::<i64>("checking", "alice").await.unwrap();
        let savings = check.read::<i64>("savings", "alice").await.unwrap();
        assert_eq!(checking + savings, 200);
    });
}
