use crate::error::{ChordError, MessageError};
use crate::network::dispatcher::{as_remote_failure, Dispatcher};
use crate::network::grpc::proto::ring_node_server::RingNode as RingNodeService;
use crate::network::messages::envelope::{RpcReply, RpcRequest};
use log::debug;
use std::sync::Arc;
use tonic::{Request, Response, Status};

pub struct ChordGrpcServer {
    dispatcher: Arc<Dispatcher>,
}

impl ChordGrpcServer {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }
}

pub(crate) fn error_to_status(e: ChordError) -> Status {
    match as_remote_failure(e) {
        ChordError::Message(MessageError::ProtocolViolation(code)) => {
            Status::unimplemented(format!("unknown opcode {}", code))
        }
        ChordError::Message(e) => Status::invalid_argument(e.to_string()),
        other => Status::internal(other.to_string()),
    }
}

#[tonic::async_trait]
impl RingNodeService for ChordGrpcServer {
    async fn invoke(&self, request: Request<RpcRequest>) -> Result<Response<RpcReply>, Status> {
        let remote = request.remote_addr();
        let RpcRequest { code, payload } = request.into_inner();
        match self.dispatcher.dispatch(code, payload).await {
            Ok(payload) => Ok(Response::new(RpcReply { payload })),
            Err(e) => {
                debug!("Rejecting opcode {} from {:?}: {}", code, remote, e);
                Err(error_to_status(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NetworkError;
    use tonic::Code;

    #[test]
    fn errors_map_to_status_codes() {
        let status = error_to_status(MessageError::MalformedPeer("short".into()).into());
        assert_eq!(status.code(), Code::InvalidArgument);

        let status = error_to_status(MessageError::ProtocolViolation(77).into());
        assert_eq!(status.code(), Code::Unimplemented);

        // A handler that failed to reach a third peer is still an answer from this one.
        let status = error_to_status(NetworkError::PeerUnreachable("c".into()).into());
        assert_eq!(status.code(), Code::Internal);
    }
}
