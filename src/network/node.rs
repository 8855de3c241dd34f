use crate::chord::descriptor::PeerDescriptor;
use crate::chord::node::{NodeSnapshot, ReceiveCallback, RingNode};
use crate::chord::peer::RingPeer;
use crate::chord::workers::Scheduler;
use crate::config::{BootstrapPeer, NodeConfig};
use crate::error::{ChordError, NetworkError};
use crate::network::dispatcher::{Dispatcher, Transport};
use crate::network::grpc::{client::GrpcTransport, thread::GrpcThread};
use bytes::Bytes;
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

const SERVER_STARTUP_WAIT: Duration = Duration::from_secs(5);
const CONNECTION_RETRY_DELAY: Duration = Duration::from_millis(500);
const MAX_CONNECTION_RETRIES: u32 = 5;

/// A ring node served over gRPC, with its maintenance workers.
pub struct ChordPeer {
    node: Arc<RingNode>,
    config: NodeConfig,
    shutdown: CancellationToken,
    grpc_handle: Option<JoinHandle<Result<(), NetworkError>>>,
    scheduler: Option<Scheduler>,
}

impl ChordPeer {
    /// Binds the listener, starts the gRPC server and returns once it
    /// accepts connections. The node starts out as a ring of one.
    pub async fn start(
        config: NodeConfig,
        on_receive: Option<ReceiveCallback>,
    ) -> Result<Self, ChordError> {
        config.validate()?;
        let space = config.id_space()?;

        let bind_addr = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| NetworkError::Grpc(format!("Failed to bind {}: {}", bind_addr, e)))?;
        let port = listener
            .local_addr()
            .map_err(|e| NetworkError::Grpc(format!("Failed to read bound address: {}", e)))?
            .port();

        let me = PeerDescriptor::new(config.name.as_str(), config.host.as_str(), port, &space)?;
        let transport: Arc<dyn Transport> = Arc::new(GrpcTransport::new(config.rpc_timeout()));
        let rpc = Arc::new(Dispatcher::new(me, space, transport));
        let node = RingNode::new(rpc.clone(), on_receive).await;

        let shutdown = CancellationToken::new();
        let (ready_tx, ready_rx) = oneshot::channel();
        let grpc_thread = GrpcThread::new(listener, rpc, shutdown.clone(), ready_tx);
        let handle = tokio::spawn(grpc_thread.run());

        match tokio::time::timeout(SERVER_STARTUP_WAIT, ready_rx).await {
            Ok(Ok(_)) => info!("{} is listening", node.descriptor()),
            Ok(Err(_)) => {
                error!("gRPC server failed to initialize properly");
                shutdown.cancel();
                return Err(NetworkError::Grpc("Server failed to initialize".into()).into());
            }
            Err(_) => {
                error!("gRPC server startup timed out");
                shutdown.cancel();
                return Err(NetworkError::Grpc("Server startup timed out".into()).into());
            }
        }

        Ok(Self {
            node,
            config,
            shutdown,
            grpc_handle: Some(handle),
            scheduler: None,
        })
    }

    /// Joins the ring `bootstrap` belongs to. The bootstrap must answer
    /// GET_ID with the identifier its name hashes to.
    pub async fn join(&self, bootstrap: &BootstrapPeer) -> Result<(), ChordError> {
        let known = PeerDescriptor::new(
            bootstrap.name.as_str(),
            bootstrap.host.as_str(),
            bootstrap.port,
            self.node.space(),
        )?;
        info!("Attempting to join the ring through {}", known);

        let mut attempt = 1;
        loop {
            match self.node.peer(&known).get_id().await {
                Ok(id) if id == known.id() => break,
                Ok(id) => {
                    return Err(ChordError::JoinFailed(format!(
                        "{} answered with identifier {}, expected {}",
                        known,
                        id,
                        known.id()
                    )))
                }
                Err(e) if attempt < MAX_CONNECTION_RETRIES => {
                    warn!(
                        "Bootstrap {} not ready (attempt {}/{}): {}",
                        known, attempt, MAX_CONNECTION_RETRIES, e
                    );
                    attempt += 1;
                    sleep(CONNECTION_RETRY_DELAY).await;
                }
                Err(e) => {
                    return Err(ChordError::JoinFailed(format!(
                        "Bootstrap {} not available: {}",
                        known, e
                    )));
                }
            }
        }

        self.node.join(known).await
    }

    /// Starts the periodic maintenance workers. Calling it twice is a no-op.
    pub fn start_maintenance(&mut self) {
        if self.scheduler.is_none() {
            self.scheduler = Some(Scheduler::start(
                self.node.clone(),
                &self.config.maintenance,
                &self.shutdown,
            ));
        }
    }

    pub fn node(&self) -> &Arc<RingNode> {
        &self.node
    }

    pub fn descriptor(&self) -> &PeerDescriptor {
        self.node.descriptor()
    }

    pub async fn lookup(&self, key: &str) -> Result<PeerDescriptor, ChordError> {
        self.node.lookup(key).await
    }

    pub async fn send(&self, key: &str, message: Bytes) -> Result<PeerDescriptor, ChordError> {
        self.node.send(key, message).await
    }

    pub async fn snapshot(&self) -> NodeSnapshot {
        self.node.snapshot().await
    }

    /// A token that stops this peer when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub async fn shutdown(mut self) -> Result<(), ChordError> {
        info!("Shutting down {}", self.node.descriptor());
        self.shutdown.cancel();
        if let Some(scheduler) = self.scheduler.take() {
            scheduler.shutdown().await;
        }
        if let Some(handle) = self.grpc_handle.take() {
            match handle.await {
                Ok(result) => result?,
                Err(e) => {
                    return Err(NetworkError::Grpc(format!("Server task failed: {}", e)).into())
                }
            }
        }
        Ok(())
    }
}
