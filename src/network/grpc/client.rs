use crate::chord::descriptor::PeerDescriptor;
use crate::chord::types::Identifier;
use crate::error::{ChordError, MessageError, NetworkError};
use crate::network::dispatcher::Transport;
use crate::network::grpc::proto::ring_node_client::RingNodeClient;
use crate::network::messages::envelope::RpcRequest;
use async_trait::async_trait;
use bytes::Bytes;
use log::debug;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tonic::transport::{Channel, Endpoint};
use tonic::{Code, Status};

#[derive(Clone)]
pub struct ChordGrpcClient {
    client: RingNodeClient<Channel>,
}

impl ChordGrpcClient {
    pub async fn connect(addr: &str, timeout: Duration) -> Result<Self, NetworkError> {
        let endpoint = Endpoint::from_shared(format!("http://{}", addr))
            .map_err(|e| NetworkError::InvalidAddress(format!("{}: {}", addr, e)))?
            .connect_timeout(timeout)
            .timeout(timeout)
            .tcp_nodelay(true);
        let channel = endpoint
            .connect()
            .await
            .map_err(|e| {
                NetworkError::PeerUnreachable(format!("Failed to connect to {}: {}", addr, e))
            })?;
        Ok(Self {
            client: RingNodeClient::new(channel),
        })
    }

    pub async fn invoke(&mut self, request: RpcRequest) -> Result<Bytes, ChordError> {
        let code = request.code;
        let response = self
            .client
            .invoke(request)
            .await
            .map_err(|status| status_to_error(code, status))?;
        Ok(response.into_inner().payload)
    }
}

/// Mirrors `server::error_to_status`.
fn status_to_error(code: u32, status: Status) -> ChordError {
    match status.code() {
        Code::InvalidArgument => {
            MessageError::MalformedRequest(status.message().to_string()).into()
        }
        Code::Unimplemented => MessageError::ProtocolViolation(code).into(),
        Code::Internal => ChordError::RemoteFailure(status.message().to_string()),
        _ => NetworkError::PeerUnreachable(status.to_string()).into(),
    }
}

/// gRPC transport with one cached channel per peer identifier.
pub struct GrpcTransport {
    timeout: Duration,
    clients: Mutex<HashMap<Identifier, (String, ChordGrpcClient)>>,
}

impl GrpcTransport {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            clients: Mutex::new(HashMap::new()),
        }
    }

    async fn client_for(&self, target: &PeerDescriptor) -> Result<ChordGrpcClient, NetworkError> {
        let address = target.address();
        if let Some((cached_addr, client)) = self.clients.lock().await.get(&target.id()) {
            if *cached_addr == address {
                return Ok(client.clone());
            }
        }
        let client = ChordGrpcClient::connect(&address, self.timeout).await?;
        self.clients
            .lock()
            .await
            .insert(target.id(), (address, client.clone()));
        Ok(client)
    }

    async fn forget(&self, target: &PeerDescriptor) {
        if self.clients.lock().await.remove(&target.id()).is_some() {
            debug!("Dropped cached channel to {}", target);
        }
    }
}

#[async_trait]
impl Transport for GrpcTransport {
    async fn call(
        &self,
        target: &PeerDescriptor,
        request: RpcRequest,
    ) -> Result<Bytes, ChordError> {
        let attempt = async {
            let mut client = self.client_for(target).await?;
            client.invoke(request).await
        };
        let result = match tokio::time::timeout(self.timeout, attempt).await {
            Ok(result) => result,
            Err(_) => Err(NetworkError::PeerUnreachable(format!(
                "{} timed out after {:?}",
                target, self.timeout
            ))
            .into()),
        };
        if let Err(e) = &result {
            if e.is_unreachable() {
                self.forget(target).await;
            }
        }
        result
    }
}
