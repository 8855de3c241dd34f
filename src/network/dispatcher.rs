use crate::chord::descriptor::PeerDescriptor;
use crate::chord::types::IdSpace;
use crate::error::{ChordError, MessageError};
use crate::network::messages::envelope::{RpcCode, RpcRequest};
use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;
use log::{debug, trace};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Server-side handler for one opcode: decoded arguments in, encoded result out.
pub type Handler =
    Arc<dyn Fn(Bytes) -> BoxFuture<'static, Result<Bytes, ChordError>> + Send + Sync>;

/// Carries an envelope to a remote peer and returns its reply payload.
///
/// Every failure to reach the peer, including a timeout, must come back as
/// `NetworkError::PeerUnreachable`.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn call(&self, target: &PeerDescriptor, request: RpcRequest) -> Result<Bytes, ChordError>;
}

/// How a handler failure looks to the peer that issued the call: decode
/// failures keep their kind, anything else becomes a remote failure.
pub fn as_remote_failure(e: ChordError) -> ChordError {
    match e {
        ChordError::Message(m) => ChordError::Message(m),
        ChordError::RemoteFailure(reason) => ChordError::RemoteFailure(reason),
        other => ChordError::RemoteFailure(other.to_string()),
    }
}

/// Routes ring operations either to local handlers or across a `Transport`.
pub struct Dispatcher {
    local: PeerDescriptor,
    space: IdSpace,
    transport: Arc<dyn Transport>,
    handlers: RwLock<HashMap<RpcCode, Handler>>,
}

impl Dispatcher {
    pub fn new(local: PeerDescriptor, space: IdSpace, transport: Arc<dyn Transport>) -> Self {
        Self {
            local,
            space,
            transport,
            handlers: RwLock::new(HashMap::new()),
        }
    }

    pub fn local(&self) -> &PeerDescriptor {
        &self.local
    }

    pub fn space(&self) -> &IdSpace {
        &self.space
    }

    /// Registers the local handler for `code`, replacing any previous one.
    pub async fn serve(&self, code: RpcCode, handler: Handler) {
        self.handlers.write().await.insert(code, handler);
    }

    /// Issues `code` against `target`. Calls addressed to this node never
    /// leave the process.
    pub async fn invoke(
        &self,
        target: &PeerDescriptor,
        code: RpcCode,
        args: Bytes,
    ) -> Result<Bytes, ChordError> {
        if target.id() == self.local.id() {
            trace!("{} handled locally", code);
            return self.dispatch(code.into(), args).await;
        }
        trace!("{} -> {} ({} byte payload)", code, target, args.len());
        self.transport.call(target, RpcRequest::new(code, args)).await
    }

    /// Decodes the opcode of an inbound envelope and runs its handler.
    pub async fn dispatch(&self, raw_code: u32, payload: Bytes) -> Result<Bytes, ChordError> {
        let code = RpcCode::try_from(raw_code)?;
        let handler = self
            .handlers
            .read()
            .await
            .get(&code)
            .cloned()
            .ok_or(MessageError::ProtocolViolation(raw_code))?;
        let result = handler(payload).await;
        if let Err(e) = &result {
            debug!("{} failed on {}: {}", code, self.local, e);
        }
        result
    }
}
