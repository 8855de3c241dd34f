use crate::error::MessageError;
use bytes::Bytes;
use std::fmt;

/// One opcode per logical ring operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum RpcCode {
    FindPredecessor = 0,
    FindSuccessor = 1,
    ClosestPrecedingFinger = 2,
    Join = 3,
    Stabilize = 4,
    Notify = 5,
    FixFinger = 6,
    GetPredecessor = 7,
    SetPredecessor = 8,
    GetSuccessor = 9,
    SetSuccessor = 10,
    GetId = 11,
    Receive = 12,
    Ping = 13,
}

impl RpcCode {
    pub const ALL: [RpcCode; 14] = [
        RpcCode::FindPredecessor,
        RpcCode::FindSuccessor,
        RpcCode::ClosestPrecedingFinger,
        RpcCode::Join,
        RpcCode::Stabilize,
        RpcCode::Notify,
        RpcCode::FixFinger,
        RpcCode::GetPredecessor,
        RpcCode::SetPredecessor,
        RpcCode::GetSuccessor,
        RpcCode::SetSuccessor,
        RpcCode::GetId,
        RpcCode::Receive,
        RpcCode::Ping,
    ];
}

impl From<RpcCode> for u32 {
    fn from(code: RpcCode) -> Self {
        code as u32
    }
}

impl TryFrom<u32> for RpcCode {
    type Error = MessageError;

    fn try_from(raw: u32) -> Result<Self, Self::Error> {
        RpcCode::ALL
            .get(raw as usize)
            .copied()
            .ok_or(MessageError::ProtocolViolation(raw))
    }
}

impl fmt::Display for RpcCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RpcCode::FindPredecessor => "FIND_PREDECESSOR",
            RpcCode::FindSuccessor => "FIND_SUCCESSOR",
            RpcCode::ClosestPrecedingFinger => "CLOSEST_PRECEDING_FINGER",
            RpcCode::Join => "JOIN",
            RpcCode::Stabilize => "STABILIZE",
            RpcCode::Notify => "NOTIFY",
            RpcCode::FixFinger => "FIX_FINGER",
            RpcCode::GetPredecessor => "GET_PREDECESSOR",
            RpcCode::SetPredecessor => "SET_PREDECESSOR",
            RpcCode::GetSuccessor => "GET_SUCCESSOR",
            RpcCode::SetSuccessor => "SET_SUCCESSOR",
            RpcCode::GetId => "GET_ID",
            RpcCode::Receive => "RECEIVE",
            RpcCode::Ping => "PING",
        };
        f.write_str(name)
    }
}

/// Envelope sent to `chordring.RingNode/Invoke`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RpcRequest {
    #[prost(uint32, tag = "1")]
    pub code: u32,
    #[prost(bytes = "bytes", tag = "2")]
    pub payload: Bytes,
}

impl RpcRequest {
    pub fn new(code: RpcCode, payload: Bytes) -> Self {
        Self {
            code: code.into(),
            payload,
        }
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RpcReply {
    #[prost(bytes = "bytes", tag = "1")]
    pub payload: Bytes,
}
