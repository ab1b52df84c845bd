#![allow(dead_code)]

use std::sync::mpsc::{channel, Receiver};
use std::sync::OnceLock;
use std::time::Duration;

use deferred_out::{DeferredPool, PoolConfig, Promise};

pub const WAIT: Duration = Duration::from_secs(5);

/// Initialize test logging (call once per test).
pub fn init_test_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("deferred_out=trace".parse().expect("valid directive")),
        )
        .with_test_writer()
        .try_init();
}

pub fn shared_pool() -> &'static DeferredPool {
    static POOL: OnceLock<DeferredPool> = OnceLock::new();
    POOL.get_or_init(|| {
        DeferredPool::new(PoolConfig::default().pool_size(4).name_prefix("suite-pool-"))
            .expect("pool starts")
    })
}

/// Records every callback fired on `promise` as a line of text.
pub fn observe<P>(promise: &P) -> Receiver<String>
where
    P: Promise<Value = i32, Cause = String>,
{
    let (tx, rx) = channel();
    let (done, fail, always) = (tx.clone(), tx.clone(), tx);
    promise
        .done(move |value| {
            let _ = done.send(format!("done {value}"));
        })
        .fail(move |cause| {
            let _ = fail.send(format!("fail {cause}"));
        })
        .always(move |status, value, cause| {
            let _ = always.send(format!("always {status:?} {value:?} {cause:?}"));
        });
    rx
}

/// Waits for exactly `count` events, sorted, and checks nothing else arrives.
pub fn expect_events(rx: &Receiver<String>, count: usize) -> Vec<String> {
    let mut events: Vec<String> = (0..count)
        .map(|_| rx.recv_timeout(WAIT).expect("callback fired"))
        .collect();
    assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    events.sort();
    events
}
