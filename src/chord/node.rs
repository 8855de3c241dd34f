use crate::chord::descriptor::PeerDescriptor;
use crate::chord::peer::{PeerRef, RemotePeer, RingPeer};
use crate::chord::routing::FingerTable;
use crate::chord::types::{IdSpace, Identifier};
use crate::error::{ChordError, NetworkError};
use crate::network::dispatcher::Dispatcher;
use crate::network::service;
use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, info, warn};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Application callback invoked for every `RECEIVE` addressed to this node.
pub type ReceiveCallback = Arc<dyn Fn(Bytes) + Send + Sync>;

/// Where a node is in its life on the ring.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeState {
    /// Successor known, predecessor not yet learned.
    Joined,
    /// Predecessor known; kept that way by periodic stabilization.
    Stable,
}

/// Point-in-time view of a node's ring pointers.
#[derive(Clone, Debug)]
pub struct NodeSnapshot {
    pub node: PeerDescriptor,
    pub predecessor: Option<PeerDescriptor>,
    pub successor: PeerDescriptor,
    pub fingers: Vec<Option<PeerDescriptor>>,
}

impl fmt::Display for NodeSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "node:        {}", self.node)?;
        match &self.predecessor {
            Some(p) => writeln!(f, "predecessor: {}", p)?,
            None => writeln!(f, "predecessor: <unknown>")?,
        }
        writeln!(f, "successor:   {}", self.successor)?;
        for (i, finger) in self.fingers.iter().enumerate() {
            if let Some(finger) = finger {
                writeln!(f, "finger[{:>2}]:  {}", i, finger)?;
            }
        }
        Ok(())
    }
}

/// A ring member's local state together with the Chord algorithms over it.
///
/// `predecessor`, `successor` and each finger slot are locked independently,
/// and no lock is ever held across a call to another peer.
pub struct RingNode {
    me: PeerDescriptor,
    space: IdSpace,
    predecessor: Mutex<Option<PeerDescriptor>>,
    successor: Mutex<PeerDescriptor>,
    fingers: FingerTable,
    next_finger: AtomicUsize,
    rpc: Arc<Dispatcher>,
    on_receive: Option<ReceiveCallback>,
}

impl RingNode {
    /// Creates a one-node ring for the dispatcher's local descriptor and
    /// registers the node's handlers with that dispatcher.
    pub async fn new(rpc: Arc<Dispatcher>, on_receive: Option<ReceiveCallback>) -> Arc<Self> {
        let me = rpc.local().clone();
        let space = *rpc.space();
        let node = Arc::new(Self {
            fingers: FingerTable::new(me.id(), &space),
            successor: Mutex::new(me.clone()),
            predecessor: Mutex::new(None),
            next_finger: AtomicUsize::new(0),
            me,
            space,
            rpc,
            on_receive,
        });
        service::install(&node).await;
        debug!("Created node {}", node.me);
        node
    }

    pub fn descriptor(&self) -> &PeerDescriptor {
        &self.me
    }

    pub fn id(&self) -> Identifier {
        self.me.id()
    }

    pub fn space(&self) -> &IdSpace {
        &self.space
    }

    pub fn rpc(&self) -> &Arc<Dispatcher> {
        &self.rpc
    }

    /// Local handle when `target` is this node, a remote stub otherwise.
    pub fn peer(&self, target: &PeerDescriptor) -> PeerRef<'_> {
        if *target == self.me {
            PeerRef::Local(self)
        } else {
            PeerRef::Remote(RemotePeer::new(target.clone(), self.rpc.clone()))
        }
    }

    pub async fn successor(&self) -> PeerDescriptor {
        self.successor.lock().await.clone()
    }

    pub async fn predecessor(&self) -> Option<PeerDescriptor> {
        self.predecessor.lock().await.clone()
    }

    pub async fn state(&self) -> NodeState {
        if self.predecessor.lock().await.is_some() {
            NodeState::Stable
        } else {
            NodeState::Joined
        }
    }

    pub async fn snapshot(&self) -> NodeSnapshot {
        NodeSnapshot {
            node: self.me.clone(),
            predecessor: self.predecessor().await,
            successor: self.successor().await,
            fingers: self.fingers.entries().await,
        }
    }

    /// Finds the node responsible for `key`.
    pub async fn lookup(&self, key: &str) -> Result<PeerDescriptor, ChordError> {
        self.find_successor(self.space.identifier_of(key)).await
    }

    /// Delivers `message` to whichever node owns `key` and returns that node.
    pub async fn send(&self, key: &str, message: Bytes) -> Result<PeerDescriptor, ChordError> {
        let owner = self.lookup(key).await?;
        self.peer(&owner).receive(message).await?;
        Ok(owner)
    }

    /// Recomputes finger `index`. Unreachable peers leave the slot untouched.
    pub async fn fix_finger(&self, index: usize) -> Result<(), ChordError> {
        let start = self.fingers.start(index);
        match self.find_successor(start).await {
            Ok(node) => {
                debug!("{}: finger[{}] ({}) -> {}", self.me.name(), index, start, node);
                self.fingers.set(index, Some(node)).await;
                Ok(())
            }
            Err(e) if e.is_unreachable() => {
                warn!("{}: could not fix finger[{}]: {}", self.me.name(), index, e);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Pings the predecessor and forgets it if it does not answer.
    pub async fn check_predecessor(&self) {
        let Some(predecessor) = self.predecessor().await else {
            return;
        };
        if predecessor == self.me || self.peer(&predecessor).ping().await {
            return;
        }
        let mut guard = self.predecessor.lock().await;
        if guard.as_ref() == Some(&predecessor) {
            warn!("{}: predecessor {} is unreachable, clearing it", self.me.name(), predecessor);
            *guard = None;
        }
    }

    /// Drops a dead successor and falls back to the nearest live peer known:
    /// the lowest live finger, then the predecessor, then this node alone.
    pub async fn evict_successor(&self, dead: &PeerDescriptor) {
        self.fingers.forget(dead).await;

        let mut tried: Vec<PeerDescriptor> = Vec::new();
        let mut replacement = None;
        let mut candidates: Vec<PeerDescriptor> =
            self.fingers.entries().await.into_iter().flatten().collect();
        candidates.extend(self.predecessor().await);
        for candidate in candidates {
            if candidate == *dead || candidate == self.me || tried.contains(&candidate) {
                continue;
            }
            if self.peer(&candidate).ping().await {
                replacement = Some(candidate);
                break;
            }
            tried.push(candidate);
        }
        let replacement = replacement.unwrap_or_else(|| self.me.clone());

        {
            let mut successor = self.successor.lock().await;
            if *successor != *dead {
                return;
            }
            *successor = replacement.clone();
        }
        self.fingers
            .set(0, (replacement != self.me).then(|| replacement.clone()))
            .await;

        let mut predecessor = self.predecessor.lock().await;
        if predecessor.as_ref() == Some(dead) {
            *predecessor = None;
        }
        warn!("{}: successor {} evicted, now {}", self.me.name(), dead, replacement);
    }

    /// Records a failed forward to `next`. Unreachable fingers are forgotten.
    async fn skip_candidate(
        &self,
        next: &PeerDescriptor,
        id: Identifier,
        e: ChordError,
    ) -> ChordError {
        warn!("{}: forwarding {} to {} failed: {}", self.me.name(), id, next, e);
        if e.is_unreachable() {
            self.fingers.forget(next).await;
        }
        e
    }

    fn no_live_candidate(&self, id: Identifier, last_error: Option<ChordError>) -> ChordError {
        let reason = match last_error {
            Some(e) => format!("no finger preceding {} answered, last error: {}", id, e),
            None => format!("no finger preceding {} answered", id),
        };
        NetworkError::PeerUnreachable(reason).into()
    }

    async fn replace_successor(&self, next: PeerDescriptor) {
        *self.successor.lock().await = next.clone();
        self.fingers.set(0, (next != self.me).then_some(next)).await;
    }

    /// Adopts `candidate` only if it sits strictly between this node and the
    /// current successor, so concurrent updates can only tighten the pointer.
    async fn tighten_successor(&self, candidate: &PeerDescriptor) -> bool {
        {
            let mut successor = self.successor.lock().await;
            if !candidate.id().is_between(&self.me.id(), &successor.id()) {
                return false;
            }
            *successor = candidate.clone();
        }
        self.fingers.set(0, Some(candidate.clone())).await;
        true
    }
}

#[async_trait]
impl RingPeer for RingNode {
    async fn find_successor(&self, id: Identifier) -> Result<PeerDescriptor, ChordError> {
        let successor = self.successor().await;
        if id.is_between_right_inclusive(&self.me.id(), &successor.id()) {
            return Ok(successor);
        }

        let candidates = self.fingers.preceding(&id).await;
        if candidates.is_empty() {
            return Ok(successor);
        }

        let mut last_error = None;
        for next in candidates {
            match self.peer(&next).find_successor(id).await {
                Ok(found) => return Ok(found),
                Err(e) => {
                    last_error = Some(self.skip_candidate(&next, id, e).await);
                }
            }
        }
        Err(self.no_live_candidate(id, last_error))
    }

    /// Walks toward `id` one preceding finger at a time. Each hop asks the
    /// candidate to continue the walk, so a dead finger anywhere along the
    /// way is routed around by the node that holds it.
    async fn find_predecessor(&self, id: Identifier) -> Result<PeerDescriptor, ChordError> {
        let successor = self.successor().await;
        if id.is_between_right_inclusive(&self.me.id(), &successor.id()) {
            return Ok(self.me.clone());
        }

        let candidates = self.fingers.preceding(&id).await;
        if candidates.is_empty() {
            return Ok(self.me.clone());
        }

        let mut last_error = None;
        for next in candidates {
            match self.peer(&next).find_predecessor(id).await {
                Ok(found) => return Ok(found),
                Err(e) => {
                    last_error = Some(self.skip_candidate(&next, id, e).await);
                }
            }
        }
        Err(self.no_live_candidate(id, last_error))
    }

    async fn closest_preceding_finger(&self, id: Identifier) -> Result<PeerDescriptor, ChordError> {
        Ok(self
            .fingers
            .preceding(&id)
            .await
            .into_iter()
            .next()
            .unwrap_or_else(|| self.me.clone()))
    }

    async fn join(&self, known: PeerDescriptor) -> Result<(), ChordError> {
        *self.predecessor.lock().await = None;
        if known == self.me {
            self.replace_successor(self.me.clone()).await;
            info!("{} started a new ring", self.me);
            return Ok(());
        }
        let successor = self
            .peer(&known)
            .find_successor(self.me.id())
            .await
            .map_err(|e| ChordError::JoinFailed(format!("{} could not place us: {}", known, e)))?;
        info!("{} joined through {}, successor is {}", self.me, known, successor);
        self.replace_successor(successor).await;
        Ok(())
    }

    async fn stabilize(&self) -> Result<(), ChordError> {
        let mut successor = self.successor().await;
        match self.peer(&successor).get_predecessor().await {
            Ok(Some(candidate)) => {
                if self.tighten_successor(&candidate).await {
                    debug!("{}: successor tightened to {}", self.me.name(), candidate);
                    successor = candidate;
                }
            }
            Ok(None) => {}
            Err(e) => {
                warn!(
                    "{}: successor {} did not answer during stabilize: {}",
                    self.me.name(),
                    successor,
                    e
                );
                return Ok(());
            }
        }
        if let Err(e) = self.peer(&successor).notify(self.me.clone()).await {
            warn!("{}: failed to notify successor {}: {}", self.me.name(), successor, e);
        }
        Ok(())
    }

    async fn notify(&self, candidate: PeerDescriptor) -> Result<(), ChordError> {
        let mut predecessor = self.predecessor.lock().await;
        let accept = match predecessor.as_ref() {
            None => true,
            Some(current) => candidate.id().is_between(&current.id(), &self.me.id()),
        };
        if accept {
            debug!("{}: predecessor is now {}", self.me.name(), candidate);
            *predecessor = Some(candidate);
        }
        Ok(())
    }

    async fn fix_fingers(&self) -> Result<(), ChordError> {
        let index = self.next_finger.fetch_add(1, Ordering::Relaxed) % self.fingers.len();
        self.fix_finger(index).await
    }

    async fn get_predecessor(&self) -> Result<Option<PeerDescriptor>, ChordError> {
        Ok(self.predecessor().await)
    }

    async fn set_predecessor(&self, predecessor: Option<PeerDescriptor>) -> Result<(), ChordError> {
        *self.predecessor.lock().await = predecessor;
        Ok(())
    }

    async fn get_successor(&self) -> Result<PeerDescriptor, ChordError> {
        Ok(self.successor().await)
    }

    async fn set_successor(&self, successor: PeerDescriptor) -> Result<(), ChordError> {
        self.replace_successor(successor).await;
        Ok(())
    }

    async fn get_id(&self) -> Result<Identifier, ChordError> {
        Ok(self.me.id())
    }

    async fn receive(&self, message: Bytes) -> Result<(), ChordError> {
        match &self.on_receive {
            Some(callback) => callback(message),
            None => debug!(
                "{}: no receive callback, dropped {} bytes",
                self.me.name(),
                message.len()
            ),
        }
        Ok(())
    }

    async fn ping(&self) -> bool {
        true
    }
}
