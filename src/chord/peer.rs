use crate::chord::descriptor::PeerDescriptor;
use crate::chord::node::RingNode;
use crate::chord::types::Identifier;
use crate::error::{ChordError, MessageError, NetworkError};
use crate::network::dispatcher::Dispatcher;
use crate::network::messages::conversions as payload;
use crate::network::messages::envelope::RpcCode;
use async_trait::async_trait;
use bytes::Bytes;
use log::debug;
use std::ops::Deref;
use std::sync::Arc;

/// The operations every ring member answers, whether it lives in this process
/// or behind the network.
#[async_trait]
pub trait RingPeer: Send + Sync {
    async fn find_successor(&self, id: Identifier) -> Result<PeerDescriptor, ChordError>;

    async fn find_predecessor(&self, id: Identifier) -> Result<PeerDescriptor, ChordError>;

    async fn closest_preceding_finger(&self, id: Identifier) -> Result<PeerDescriptor, ChordError>;

    async fn join(&self, known: PeerDescriptor) -> Result<(), ChordError>;

    async fn stabilize(&self) -> Result<(), ChordError>;

    async fn notify(&self, candidate: PeerDescriptor) -> Result<(), ChordError>;

    async fn fix_fingers(&self) -> Result<(), ChordError>;

    async fn get_predecessor(&self) -> Result<Option<PeerDescriptor>, ChordError>;

    async fn set_predecessor(&self, predecessor: Option<PeerDescriptor>) -> Result<(), ChordError>;

    async fn get_successor(&self) -> Result<PeerDescriptor, ChordError>;

    async fn set_successor(&self, successor: PeerDescriptor) -> Result<(), ChordError>;

    async fn get_id(&self) -> Result<Identifier, ChordError>;

    async fn receive(&self, message: Bytes) -> Result<(), ChordError>;

    /// True iff the peer answered within the RPC timeout.
    async fn ping(&self) -> bool;
}

/// Stub that marshals every operation through the dispatcher.
pub struct RemotePeer {
    target: PeerDescriptor,
    rpc: Arc<Dispatcher>,
}

impl RemotePeer {
    pub fn new(target: PeerDescriptor, rpc: Arc<Dispatcher>) -> Self {
        Self { target, rpc }
    }

    pub fn target(&self) -> &PeerDescriptor {
        &self.target
    }

    async fn invoke(&self, code: RpcCode, args: Bytes) -> Result<Bytes, ChordError> {
        self.rpc.invoke(&self.target, code, args).await
    }

    /// A reply we cannot decode counts as the peer being unreachable.
    fn malformed_reply(&self, code: RpcCode, e: MessageError) -> ChordError {
        debug!("Malformed {} reply from {}: {}", code, self.target, e);
        NetworkError::PeerUnreachable(format!("malformed {} reply from {}", code, self.target))
            .into()
    }

    async fn invoke_for_peer(
        &self,
        code: RpcCode,
        args: Bytes,
    ) -> Result<PeerDescriptor, ChordError> {
        let reply = self.invoke(code, args).await?;
        payload::decode_peer(&reply, self.rpc.space()).map_err(|e| self.malformed_reply(code, e))
    }
}

#[async_trait]
impl RingPeer for RemotePeer {
    async fn find_successor(&self, id: Identifier) -> Result<PeerDescriptor, ChordError> {
        self.invoke_for_peer(RpcCode::FindSuccessor, payload::encode_identifier(id))
            .await
    }

    async fn find_predecessor(&self, id: Identifier) -> Result<PeerDescriptor, ChordError> {
        self.invoke_for_peer(RpcCode::FindPredecessor, payload::encode_identifier(id))
            .await
    }

    async fn closest_preceding_finger(&self, id: Identifier) -> Result<PeerDescriptor, ChordError> {
        self.invoke_for_peer(RpcCode::ClosestPrecedingFinger, payload::encode_identifier(id))
            .await
    }

    async fn join(&self, known: PeerDescriptor) -> Result<(), ChordError> {
        self.invoke(RpcCode::Join, payload::encode_peer(&known)).await?;
        Ok(())
    }

    async fn stabilize(&self) -> Result<(), ChordError> {
        self.invoke(RpcCode::Stabilize, payload::empty()).await?;
        Ok(())
    }

    async fn notify(&self, candidate: PeerDescriptor) -> Result<(), ChordError> {
        self.invoke(RpcCode::Notify, payload::encode_peer(&candidate)).await?;
        Ok(())
    }

    async fn fix_fingers(&self) -> Result<(), ChordError> {
        self.invoke(RpcCode::FixFinger, payload::empty()).await?;
        Ok(())
    }

    async fn get_predecessor(&self) -> Result<Option<PeerDescriptor>, ChordError> {
        let reply = self.invoke(RpcCode::GetPredecessor, payload::empty()).await?;
        payload::decode_optional_peer(&reply, self.rpc.space())
            .map_err(|e| self.malformed_reply(RpcCode::GetPredecessor, e))
    }

    async fn set_predecessor(&self, predecessor: Option<PeerDescriptor>) -> Result<(), ChordError> {
        self.invoke(
            RpcCode::SetPredecessor,
            payload::encode_optional_peer(predecessor.as_ref()),
        )
        .await?;
        Ok(())
    }

    async fn get_successor(&self) -> Result<PeerDescriptor, ChordError> {
        self.invoke_for_peer(RpcCode::GetSuccessor, payload::empty()).await
    }

    async fn set_successor(&self, successor: PeerDescriptor) -> Result<(), ChordError> {
        self.invoke(RpcCode::SetSuccessor, payload::encode_peer(&successor))
            .await?;
        Ok(())
    }

    async fn get_id(&self) -> Result<Identifier, ChordError> {
        let reply = self.invoke(RpcCode::GetId, payload::empty()).await?;
        payload::decode_identifier(&reply, self.rpc.space())
            .map_err(|e| self.malformed_reply(RpcCode::GetId, e))
    }

    async fn receive(&self, message: Bytes) -> Result<(), ChordError> {
        self.invoke(RpcCode::Receive, message).await?;
        Ok(())
    }

    async fn ping(&self) -> bool {
        match self.invoke(RpcCode::Ping, payload::empty()).await {
            Ok(reply) => payload::decode_bool(&reply).unwrap_or(false),
            Err(e) => {
                debug!("Ping to {} failed: {}", self.target, e);
                false
            }
        }
    }
}

/// Either this node itself or a stub for a remote one, chosen by identifier.
pub enum PeerRef<'a> {
    Local(&'a RingNode),
    Remote(RemotePeer),
}

impl<'a> Deref for PeerRef<'a> {
    type Target = dyn RingPeer + 'a;

    fn deref(&self) -> &Self::Target {
        match self {
            PeerRef::Local(node) => *node,
            PeerRef::Remote(remote) => remote,
        }
    }
}
