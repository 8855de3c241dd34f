//! Binds every opcode to the matching `RingNode` operation.

use crate::chord::node::RingNode;
use crate::chord::peer::RingPeer;
use crate::error::{ChordError, NetworkError};
use crate::network::dispatcher::Handler;
use crate::network::messages::conversions as payload;
use crate::network::messages::envelope::RpcCode;
use bytes::Bytes;
use futures::FutureExt;
use std::future::Future;
use std::sync::{Arc, Weak};

/// Wraps `op` into a handler holding the node weakly, since the node owns the
/// dispatcher the handler is registered with.
fn bind<F, Fut>(node: &Arc<RingNode>, op: F) -> Handler
where
    F: Fn(Arc<RingNode>, Bytes) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Bytes, ChordError>> + Send + 'static,
{
    let node: Weak<RingNode> = Arc::downgrade(node);
    let op = Arc::new(op);
    Arc::new(move |args: Bytes| {
        let node = node.upgrade();
        let op = op.clone();
        async move {
            match node {
                Some(node) => op(node, args).await,
                None => Err(NetworkError::PeerUnreachable("node has shut down".into()).into()),
            }
        }
        .boxed()
    })
}

pub async fn install(node: &Arc<RingNode>) {
    let rpc = node.rpc().clone();

    rpc.serve(
        RpcCode::FindSuccessor,
        bind(node, |node, args| async move {
            let id = payload::decode_identifier(&args, node.space())?;
            Ok::<_, ChordError>(payload::encode_peer(&node.find_successor(id).await?))
        }),
    )
    .await;

    rpc.serve(
        RpcCode::FindPredecessor,
        bind(node, |node, args| async move {
            let id = payload::decode_identifier(&args, node.space())?;
            Ok::<_, ChordError>(payload::encode_peer(&node.find_predecessor(id).await?))
        }),
    )
    .await;

    rpc.serve(
        RpcCode::ClosestPrecedingFinger,
        bind(node, |node, args| async move {
            let id = payload::decode_identifier(&args, node.space())?;
            Ok::<_, ChordError>(payload::encode_peer(&node.closest_preceding_finger(id).await?))
        }),
    )
    .await;

    rpc.serve(
        RpcCode::Join,
        bind(node, |node, args| async move {
            let known = payload::decode_peer(&args, node.space())?;
            node.join(known).await?;
            Ok::<_, ChordError>(payload::empty())
        }),
    )
    .await;

    rpc.serve(
        RpcCode::Stabilize,
        bind(node, |node, args| async move {
            payload::expect_empty(&args)?;
            node.stabilize().await?;
            Ok::<_, ChordError>(payload::empty())
        }),
    )
    .await;

    rpc.serve(
        RpcCode::Notify,
        bind(node, |node, args| async move {
            let candidate = payload::decode_peer(&args, node.space())?;
            node.notify(candidate).await?;
            Ok::<_, ChordError>(payload::empty())
        }),
    )
    .await;

    rpc.serve(
        RpcCode::FixFinger,
        bind(node, |node, args| async move {
            payload::expect_empty(&args)?;
            node.fix_fingers().await?;
            Ok::<_, ChordError>(payload::empty())
        }),
    )
    .await;

    rpc.serve(
        RpcCode::GetPredecessor,
        bind(node, |node, args| async move {
            payload::expect_empty(&args)?;
            let predecessor = node.get_predecessor().await?;
            Ok::<_, ChordError>(payload::encode_optional_peer(predecessor.as_ref()))
        }),
    )
    .await;

    rpc.serve(
        RpcCode::SetPredecessor,
        bind(node, |node, args| async move {
            let predecessor = payload::decode_optional_peer(&args, node.space())?;
            node.set_predecessor(predecessor).await?;
            Ok::<_, ChordError>(payload::empty())
        }),
    )
    .await;

    rpc.serve(
        RpcCode::GetSuccessor,
        bind(node, |node, args| async move {
            payload::expect_empty(&args)?;
            Ok::<_, ChordError>(payload::encode_peer(&node.get_successor().await?))
        }),
    )
    .await;

    rpc.serve(
        RpcCode::SetSuccessor,
        bind(node, |node, args| async move {
            let successor = payload::decode_peer(&args, node.space())?;
            node.set_successor(successor).await?;
            Ok::<_, ChordError>(payload::empty())
        }),
    )
    .await;

    rpc.serve(
        RpcCode::GetId,
        bind(node, |node, args| async move {
            payload::expect_empty(&args)?;
            Ok::<_, ChordError>(payload::encode_identifier(node.get_id().await?))
        }),
    )
    .await;

    rpc.serve(
        RpcCode::Receive,
        bind(node, |node, args| async move {
            node.receive(args).await?;
            Ok::<_, ChordError>(payload::empty())
        }),
    )
    .await;

    rpc.serve(
        RpcCode::Ping,
        bind(node, |node, args| async move {
            payload::expect_empty(&args)?;
            Ok::<_, ChordError>(payload::encode_bool(node.ping().await))
        }),
    )
    .await;
}
