use crate::journal::{self, SharedJournal, TREE_NESTING};
use actiontree_core::{ActionNode, Msg, NodeRecord, TraceId};
use anyhow::{Context, Result};
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::codec::{Framed, LengthDelimitedCodec};

type Conn = Framed<UnixStream, LengthDelimitedCodec>;

pub fn bind(sock_path: &str) -> Result<UnixListener> {
    // Clean stale socket
    let _ = std::fs::remove_file(sock_path);
    let listener = UnixListener::bind(sock_path).with_context(|| format!("bind UDS {sock_path}"))?;
    tracing::info!(socket = %sock_path, "feed listening");
    Ok(listener)
}

pub async fn serve(listener: UnixListener, journal: SharedJournal, bus: broadcast::Sender<ActionNode>) -> Result<()> {
    let mut next_conn = 0u64;
    loop {
        let (stream, _addr) = listener.accept().await?;
        next_conn += 1;
        let conn_id = next_conn;
        tracing::info!(conn = conn_id, "viewer connected");

        let journal = journal.clone();
        let bus = bus.clone();
        tokio::spawn(async move {
            match handle(stream, journal, bus).await {
                Ok(()) => tracing::info!(conn = conn_id, "viewer disconnected"),
                Err(e) => tracing::warn!(conn = conn_id, error = %format!("{e:#}"), "viewer connection failed"),
            }
        });
    }
}

struct Subscription {
    trace_id: Option<TraceId>,
    rx: broadcast::Receiver<ActionNode>,
}

impl Subscription {
    fn wants(&self, node: &ActionNode) -> bool {
        self.trace_id.as_ref().map_or(true, |t| *t == node.trace_id)
    }
}

async fn send(framed: &mut Conn, msg: &Msg) -> Result<()> {
    framed.send(Bytes::from(serde_json::to_vec(msg)?)).await?;
    Ok(())
}

/// Next matching node, or `Err(skipped)` once the subscriber fell behind
/// the bus.
async fn next_node(sub: &mut Option<Subscription>) -> Option<Result<ActionNode, u64>> {
    let Some(s) = sub else {
        return std::future::pending().await;
    };
    loop {
        match s.rx.recv().await {
            Ok(node) if s.wants(&node) => return Some(Ok(node)),
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => return Some(Err(skipped)),
            Err(RecvError::Closed) => return None,
        }
    }
}

async fn handle(stream: UnixStream, journal: SharedJournal, bus: broadcast::Sender<ActionNode>) -> Result<()> {
    let mut framed = Framed::new(stream, LengthDelimitedCodec::new());
    let mut sub: Option<Subscription> = None;

    loop {
        tokio::select! {
            frame = framed.next() => {
                let Some(frame) = frame else { return Ok(()) };
                let bytes = frame.context("read frame")?;
                let msg = match serde_json::from_slice::<Msg>(&bytes) {
                    Ok(msg) => msg,
                    Err(e) => {
                        tracing::warn!(error = %e, "undecodable request");
                        send(&mut framed, &Msg::Error { message: format!("bad request: {e}") }).await?;
                        continue;
                    }
                };
                if let Some(reply) = respond(msg, &journal, &bus, &mut sub) {
                    send(&mut framed, &reply).await?;
                }
            }
            Some(item) = next_node(&mut sub) => match item {
                Ok(node) => {
                    send(&mut framed, &Msg::NodeCreated { node: NodeRecord::from(&node) }).await?;
                }
                Err(skipped) => {
                    // The viewer's tree now has holes; make it reconnect.
                    tracing::warn!(skipped, "subscriber lagged, closing connection");
                    send(&mut framed, &Msg::Error {
                        message: format!("subscription lagged, {skipped} nodes missed"),
                    })
                    .await?;
                    return Ok(());
                }
            },
        }
    }
}

fn respond(
    msg: Msg,
    journal: &SharedJournal,
    bus: &broadcast::Sender<ActionNode>,
    sub: &mut Option<Subscription>,
) -> Option<Msg> {
    match msg {
        Msg::Hello { version } => {
            tracing::debug!(%version, "hello");
            Some(Msg::Hello {
                version: env!("CARGO_PKG_VERSION").into(),
            })
        }
        Msg::Ping => Some(Msg::Pong),
        Msg::ListTraces => Some(Msg::Traces {
            traces: journal::lock(journal).traces(),
        }),
        Msg::RequestTree { trace_id } => Some(match journal::lock(journal).tree(&trace_id, TREE_NESTING) {
            Ok(roots) => Msg::Tree { trace_id, roots },
            Err(e) => Msg::Error { message: e.to_string() },
        }),
        Msg::Subscribe { trace_id } => {
            tracing::debug!(trace_id = ?trace_id, "subscribed");
            *sub = Some(Subscription {
                trace_id,
                rx: bus.subscribe(),
            });
            None
        }
        Msg::Pong => None,
        other => Some(Msg::Error {
            message: format!("unexpected request {:?}", std::mem::discriminant(&other)),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::{Journal, NewNode};
    use actiontree_core::NodeKind;

    async fn recv(framed: &mut Conn) -> Msg {
        let bytes = framed.next().await.expect("frame").expect("read");
        serde_json::from_slice(&bytes).expect("decode")
    }

    #[tokio::test]
    async fn serves_tree_and_filtered_live_nodes() {
        let dir = tempfile::tempdir().unwrap();
        let sock = dir.path().join("feed.sock");
        let sock = sock.to_string_lossy().into_owned();

        let journal = Journal::shared();
        let (t1, t2) = {
            let mut j = journal::lock(&journal);
            let t1 = j.create_trace("one", None).id;
            let t2 = j.create_trace("two", None).id;
            j.create_node(NewNode::new(t1.clone(), NodeKind::Logging, "root")).unwrap();
            (t1, t2)
        };
        let (bus, _keep) = broadcast::channel(16);
        let listener = bind(&sock).unwrap();
        tokio::spawn(serve(listener, journal.clone(), bus.clone()));

        let stream = UnixStream::connect(&sock).await.unwrap();
        let mut framed = Framed::new(stream, LengthDelimitedCodec::new());
        send(&mut framed, &Msg::Hello { version: "test".into() }).await.unwrap();
        assert!(matches!(recv(&mut framed).await, Msg::Hello { .. }));

        send(&mut framed, &Msg::Subscribe { trace_id: Some(t1.clone()) }).await.unwrap();
        send(&mut framed, &Msg::RequestTree { trace_id: t1.clone() }).await.unwrap();
        match recv(&mut framed).await {
            Msg::Tree { trace_id, roots } => {
                assert_eq!(trace_id, t1);
                assert_eq!(roots.len(), 1);
            }
            other => panic!("expected tree, got {other:?}"),
        }

        // Ping round-trips after the subscription is registered.
        send(&mut framed, &Msg::Ping).await.unwrap();
        assert!(matches!(recv(&mut framed).await, Msg::Pong));

        for (trace, label) in [(t2, "other"), (t1.clone(), "mine")] {
            let node = journal::lock(&journal)
                .create_node(NewNode::new(trace, NodeKind::Decision, label))
                .unwrap();
            bus.send(node).unwrap();
        }
        match recv(&mut framed).await {
            Msg::NodeCreated { node } => assert_eq!(node.label.as_deref(), Some("mine")),
            other => panic!("expected node, got {other:?}"),
        }

        send(&mut framed, &Msg::RequestTree { trace_id: TraceId("404".into()) }).await.unwrap();
        assert!(matches!(recv(&mut framed).await, Msg::Error { .. }));
    }

    #[tokio::test]
    async fn lagging_subscriber_gets_an_error_and_is_closed() {
        let dir = tempfile::tempdir().unwrap();
        let sock = dir.path().join("feed.sock").to_string_lossy().into_owned();

        let journal = Journal::shared();
        let t = journal::lock(&journal).create_trace("busy", None).id;
        let (bus, _keep) = broadcast::channel(2);
        tokio::spawn(serve(bind(&sock).unwrap(), journal.clone(), bus.clone()));

        let stream = UnixStream::connect(&sock).await.unwrap();
        let mut framed = Framed::new(stream, LengthDelimitedCodec::new());
        send(&mut framed, &Msg::Subscribe { trace_id: Some(t.clone()) }).await.unwrap();
        send(&mut framed, &Msg::Ping).await.unwrap();
        assert!(matches!(recv(&mut framed).await, Msg::Pong));

        // Published without yielding, so the connection task cannot keep up.
        for i in 0..5 {
            let node = journal::lock(&journal)
                .create_node(NewNode::new(t.clone(), NodeKind::Logging, format!("step {i}")))
                .unwrap();
            bus.send(node).unwrap();
        }

        match recv(&mut framed).await {
            Msg::Error { message } => assert!(message.contains("lagged")),
            other => panic!("expected a lag error, got {other:?}"),
        }
        assert!(framed.next().await.is_none());
        assert_eq!(journal::lock(&journal).node_count(&t), 5);
    }
}
