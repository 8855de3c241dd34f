use crate::error::NetworkError;
use crate::network::dispatcher::Dispatcher;
use crate::network::grpc::proto::ring_node_server::RingNodeServer;
use crate::network::grpc::server::ChordGrpcServer;
use log::{error, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;

/// Runs the gRPC server for one node on an already bound listener.
pub struct GrpcThread {
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
    shutdown: CancellationToken,
    ready_tx: Option<oneshot::Sender<()>>,
}

impl GrpcThread {
    pub fn new(
        listener: TcpListener,
        dispatcher: Arc<Dispatcher>,
        shutdown: CancellationToken,
        ready_tx: oneshot::Sender<()>,
    ) -> Self {
        Self {
            listener,
            dispatcher,
            shutdown,
            ready_tx: Some(ready_tx),
        }
    }

    pub async fn run(mut self) -> Result<(), NetworkError> {
        let addr = self
            .listener
            .local_addr()
            .map_err(|e| NetworkError::Grpc(format!("Listener has no local address: {}", e)))?;

        info!("Starting gRPC server on {}", addr);

        let server = Server::builder()
            .tcp_nodelay(true)
            .tcp_keepalive(Some(Duration::from_secs(60)))
            .add_service(RingNodeServer::new(ChordGrpcServer::new(self.dispatcher.clone())));

        if let Some(ready_tx) = self.ready_tx.take() {
            let _ = ready_tx.send(());
        }

        let shutdown = self.shutdown.clone();
        match server
            .serve_with_incoming_shutdown(
                TcpListenerStream::new(self.listener),
                shutdown.cancelled(),
            )
            .await
        {
            Ok(_) => {
                info!("gRPC server on {} shut down gracefully", addr);
                Ok(())
            }
            Err(e) => {
                error!("gRPC server encountered a fatal error: {:?}", e);
                Err(NetworkError::Grpc(format!("Server error: {}", e)))
            }
        }
    }
}
