use crate::chord::descriptor::PeerDescriptor;
use crate::chord::node::{ReceiveCallback, RingNode};
use crate::chord::types::IdSpace;
use crate::error::{ChordError, NetworkError};
use crate::network::dispatcher::{as_remote_failure, Dispatcher, Transport};
use crate::network::messages::envelope::RpcRequest;
use async_trait::async_trait;
use bytes::Bytes;
use log::debug;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::RwLock;

const MEMORY_HOST: &str = "memory";

/// An in-process network of ring nodes.
///
/// Calls are delivered straight to the target's dispatcher, under the same
/// timeout a real transport would apply. Addresses can be taken down and
/// brought back to simulate failures.
pub struct MemoryNetwork {
    space: IdSpace,
    timeout: Duration,
    next_port: AtomicU16,
    nodes: RwLock<HashMap<String, Weak<Dispatcher>>>,
    down: RwLock<HashSet<String>>,
}

impl MemoryNetwork {
    pub fn new(space: IdSpace, timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            space,
            timeout,
            next_port: AtomicU16::new(1),
            nodes: RwLock::new(HashMap::new()),
            down: RwLock::new(HashSet::new()),
        })
    }

    pub fn space(&self) -> &IdSpace {
        &self.space
    }

    /// Creates a node named `name` attached to this network.
    pub async fn spawn_node(
        self: &Arc<Self>,
        name: &str,
        on_receive: Option<ReceiveCallback>,
    ) -> Result<Arc<RingNode>, ChordError> {
        let port = self.next_port.fetch_add(1, Ordering::Relaxed);
        let me = PeerDescriptor::new(name, MEMORY_HOST, port, &self.space)?;
        let transport: Arc<dyn Transport> = self.clone();
        let rpc = Arc::new(Dispatcher::new(me.clone(), self.space, transport));
        {
            let mut nodes = self.nodes.write().await;
            nodes.retain(|_, dispatcher| dispatcher.strong_count() > 0);
            nodes.insert(me.address(), Arc::downgrade(&rpc));
        }
        Ok(RingNode::new(rpc, on_receive).await)
    }

    /// Makes every call to `peer` fail as unreachable.
    pub async fn take_down(&self, peer: &PeerDescriptor) {
        self.down.write().await.insert(peer.address());
    }

    pub async fn bring_up(&self, peer: &PeerDescriptor) {
        self.down.write().await.remove(&peer.address());
    }
}

#[async_trait]
impl Transport for MemoryNetwork {
    async fn call(
        &self,
        target: &PeerDescriptor,
        request: RpcRequest,
    ) -> Result<Bytes, ChordError> {
        let address = target.address();
        if self.down.read().await.contains(&address) {
            return Err(NetworkError::PeerUnreachable(format!("{} is down", target)).into());
        }
        let dispatcher = self
            .nodes
            .read()
            .await
            .get(&address)
            .and_then(Weak::upgrade)
            .ok_or_else(|| {
                NetworkError::PeerUnreachable(format!("no node listening at {}", address))
            })?;

        let delivery = dispatcher.dispatch(request.code, request.payload);
        match tokio::time::timeout(self.timeout, delivery).await {
            Ok(result) => result.map_err(as_remote_failure),
            Err(_) => {
                debug!("Call to {} timed out after {:?}", target, self.timeout);
                Err(NetworkError::PeerUnreachable(format!("{} timed out", target)).into())
            }
        }
    }
}
