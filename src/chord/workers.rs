use crate::chord::node::RingNode;
use crate::chord::peer::RingPeer;
use crate::config::MaintenanceConfig;
use log::{debug, error, info, warn};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Periodic maintenance for one node: stabilize, fix fingers, ping the
/// successor, check the predecessor. Each runs in its own task.
pub struct Scheduler {
    token: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl Scheduler {
    /// Starts the workers; they stop when `parent` or this scheduler is cancelled.
    pub fn start(
        node: Arc<RingNode>,
        config: &MaintenanceConfig,
        parent: &CancellationToken,
    ) -> Self {
        let token = parent.child_token();
        let mut handles = vec![
            tokio::spawn(run_stabilize_worker(
                node.clone(),
                config.stabilize_interval(),
                token.clone(),
            )),
            tokio::spawn(run_finger_maintainer(
                node.clone(),
                config.fix_fingers_interval(),
                token.clone(),
            )),
            tokio::spawn(run_successor_checker(
                node.clone(),
                config.ping_interval(),
                config.max_ping_failures,
                token.clone(),
            )),
        ];
        if config.check_predecessor {
            handles.push(tokio::spawn(run_predecessor_checker(
                node.clone(),
                config.ping_interval(),
                token.clone(),
            )));
        }
        info!("{}: started {} maintenance workers", node.descriptor().name(), handles.len());
        Self { token, handles }
    }

    pub async fn shutdown(self) {
        self.token.cancel();
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!("Maintenance worker panicked: {}", e);
            }
        }
    }
}

/// A ticker whose first tick lands after a random fraction of `period`, so
/// nodes started together do not run in lockstep.
fn ticker(period: Duration) -> tokio::time::Interval {
    let jitter = rand::rng().random_range(0..=period.as_millis() as u64 / 4);
    let mut ticker = interval_at(Instant::now() + Duration::from_millis(jitter), period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

pub async fn run_stabilize_worker(node: Arc<RingNode>, period: Duration, token: CancellationToken) {
    debug!("{}: stabilize worker running every {:?}", node.descriptor().name(), period);
    let mut ticker = ticker(period);
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(e) = node.stabilize().await {
                    warn!("{}: stabilize failed: {}", node.descriptor().name(), e);
                }
            }
        }
    }
}

pub async fn run_finger_maintainer(
    node: Arc<RingNode>,
    period: Duration,
    token: CancellationToken,
) {
    debug!("{}: finger maintainer running every {:?}", node.descriptor().name(), period);
    let mut ticker = ticker(period);
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(e) = node.fix_fingers().await {
                    warn!("{}: fix_fingers failed: {}", node.descriptor().name(), e);
                }
            }
        }
    }
}

/// Pings the successor and evicts it after `max_failures` misses in a row.
pub async fn run_successor_checker(
    node: Arc<RingNode>,
    period: Duration,
    max_failures: u32,
    token: CancellationToken,
) {
    let mut ticker = ticker(period);
    let mut failures = 0u32;
    let mut watched = node.successor().await;
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                let successor = node.successor().await;
                if successor != watched {
                    watched = successor.clone();
                    failures = 0;
                }
                if successor == *node.descriptor() {
                    continue;
                }
                if node.peer(&successor).ping().await {
                    failures = 0;
                    continue;
                }
                failures += 1;
                warn!(
                    "{}: successor {} missed ping {}/{}",
                    node.descriptor().name(),
                    successor,
                    failures,
                    max_failures
                );
                if failures >= max_failures {
                    node.evict_successor(&successor).await;
                    failures = 0;
                }
            }
        }
    }
}

pub async fn run_predecessor_checker(
    node: Arc<RingNode>,
    period: Duration,
    token: CancellationToken,
) {
    let mut ticker = ticker(period);
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => node.check_predecessor().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chord::types::IdSpace;
    use crate::network::memory::MemoryNetwork;

    fn fast() -> MaintenanceConfig {
        MaintenanceConfig {
            stabilize_interval_ms: 20,
            fix_fingers_interval_ms: 10,
            ping_interval_ms: 20,
            max_ping_failures: 2,
            check_predecessor: true,
        }
    }

    #[tokio::test]
    async fn workers_converge_two_nodes_and_stop_on_shutdown() {
        let net = MemoryNetwork::new(IdSpace::new(16).unwrap(), Duration::from_millis(200));
        let a = net.spawn_node("a", None).await.unwrap();
        let b = net.spawn_node("b", None).await.unwrap();
        b.join(a.descriptor().clone()).await.unwrap();

        let root = CancellationToken::new();
        let sa = Scheduler::start(a.clone(), &fast(), &root);
        let sb = Scheduler::start(b.clone(), &fast(), &root);

        let converged = async {
            loop {
                if a.successor().await == *b.descriptor()
                    && a.predecessor().await.as_ref() == Some(b.descriptor())
                    && b.predecessor().await.as_ref() == Some(a.descriptor())
                {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(5), converged).await.unwrap();

        sa.shutdown().await;
        sb.shutdown().await;
    }

    #[tokio::test]
    async fn dead_successor_is_evicted() {
        let net = MemoryNetwork::new(IdSpace::new(16).unwrap(), Duration::from_millis(100));
        let a = net.spawn_node("a", None).await.unwrap();
        let b = net.spawn_node("b", None).await.unwrap();
        b.join(a.descriptor().clone()).await.unwrap();
        a.stabilize().await.unwrap();
        b.stabilize().await.unwrap();
        a.stabilize().await.unwrap();
        assert_eq!(a.successor().await, *b.descriptor());

        net.take_down(b.descriptor()).await;
        let root = CancellationToken::new();
        let scheduler = Scheduler::start(a.clone(), &fast(), &root);

        let evicted = async {
            while a.successor().await != *a.descriptor() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(5), evicted).await.unwrap();
        root.cancel();
        scheduler.shutdown().await;
    }
}
