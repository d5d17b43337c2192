use crate::net::Incoming;
use actiontree_core::{Msg, TraceId, TraceInfo};
use anyhow::{Context, Result};
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::net::UnixStream;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

/// Running feed reader. Dropping the handle stops it.
pub struct ReaderHandle {
    trace_id: TraceId,
    task: JoinHandle<()>,
}

impl ReaderHandle {
    pub fn trace_id(&self) -> &TraceId {
        &self.trace_id
    }
}

impl Drop for ReaderHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Fetch the tree for `trace_id` and follow its live node feed. Transport
/// failures are reported as `Error` + `Disconnected`; no retry happens here.
pub fn spawn_reader(sock_path: String, trace_id: TraceId, tx: UnboundedSender<Incoming>) -> ReaderHandle {
    let task_trace = trace_id.clone();
    let task = tokio::spawn(async move {
        if let Err(e) = run(&sock_path, task_trace.clone(), tx.clone()).await {
            tracing::warn!(socket = %sock_path, trace_id = %task_trace, error = %format!("{e:#}"), "feed reader failed");
            let _ = tx.send(Incoming::error(task_trace.clone(), format!("{e:#}")));
            let _ = tx.send(Incoming::disconnected(task_trace));
        }
    });
    ReaderHandle { trace_id, task }
}

async fn connect(sock_path: &str) -> Result<Framed<UnixStream, LengthDelimitedCodec>> {
    let stream = UnixStream::connect(sock_path)
        .await
        .with_context(|| format!("connect UDS {sock_path}"))?;
    let mut framed = Framed::new(stream, LengthDelimitedCodec::new());
    send(&mut framed, &Msg::Hello {
        version: env!("CARGO_PKG_VERSION").into(),
    })
    .await?;
    Ok(framed)
}

async fn send(framed: &mut Framed<UnixStream, LengthDelimitedCodec>, msg: &Msg) -> Result<()> {
    framed.send(Bytes::from(serde_json::to_vec(msg)?)).await?;
    Ok(())
}

async fn run(sock_path: &str, trace_id: TraceId, tx: UnboundedSender<Incoming>) -> Result<()> {
    let mut framed = connect(sock_path).await?;
    let _ = tx.send(Incoming::connected(trace_id.clone()));

    // Subscribe before fetching: anything created in between shows up in
    // both the tree and the feed, and the store drops the duplicate.
    send(&mut framed, &Msg::Subscribe {
        trace_id: Some(trace_id.clone()),
    })
    .await?;
    send(&mut framed, &Msg::RequestTree {
        trace_id: trace_id.clone(),
    })
    .await?;

    while let Some(frame) = framed.next().await {
        let bytes = frame.context("read frame")?;
        match serde_json::from_slice::<Msg>(&bytes) {
            Ok(Msg::Tree { trace_id: tid, roots }) if tid == trace_id => {
                let _ = tx.send(Incoming::tree(trace_id.clone(), roots));
            }
            Ok(Msg::NodeCreated { node }) => {
                let _ = tx.send(Incoming::node(trace_id.clone(), node));
            }
            Ok(Msg::Error { message }) => {
                let _ = tx.send(Incoming::error(trace_id.clone(), message));
            }
            Ok(Msg::Ping) => send(&mut framed, &Msg::Pong).await?,
            Ok(other) => {
                tracing::debug!(msg = ?std::mem::discriminant(&other), "ignoring feed message");
            }
            Err(e) => {
                // Keep reading; records inside a frame are checked one by one,
                // so this is a broken envelope.
                tracing::warn!(error = %e, "feed decode error");
                let _ = tx.send(Incoming::error(trace_id.clone(), format!("undecodable feed message: {e}")));
            }
        }
    }

    let _ = tx.send(Incoming::disconnected(trace_id));
    Ok(())
}

/// One-shot trace listing for the trace picker.
pub async fn list_traces(sock_path: &str) -> Result<Vec<TraceInfo>> {
    let mut framed = connect(sock_path).await?;
    send(&mut framed, &Msg::ListTraces).await?;
    while let Some(frame) = framed.next().await {
        let bytes = frame.context("read frame")?;
        match serde_json::from_slice::<Msg>(&bytes)? {
            Msg::Traces { traces } => return Ok(traces),
            Msg::Error { message } => anyhow::bail!("feed error: {message}"),
            _ => {}
        }
    }
    anyhow::bail!("feed closed before listing traces")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::IncomingKind;
    use tokio::net::UnixListener;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn broken_envelope_is_reported_and_reading_continues() {
        let dir = tempfile::tempdir().unwrap();
        let sock = dir.path().join("feed.sock").to_string_lossy().into_owned();
        let listener = UnixListener::bind(&sock).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let reader = spawn_reader(sock.clone(), TraceId("1".into()), tx);
        assert_eq!(reader.trace_id(), &TraceId("1".into()));

        let (stream, _) = listener.accept().await.unwrap();
        let mut feed = Framed::new(stream, LengthDelimitedCodec::new());
        // Hello, Subscribe, RequestTree.
        for _ in 0..3 {
            feed.next().await.unwrap().unwrap();
        }
        feed.send(Bytes::from(r#"{"type":"Tree","data":{"roots":[]}}"#)).await.unwrap();
        feed.send(Bytes::from(
            r#"{"type":"Tree","data":{"trace_id":1,"roots":[{"id":"a","type":"logging","trace_id":1,
               "children":[{"id":"b","type":"logging","trace_id":1,"parent_id":"a","label":false}]}]}}"#,
        ))
        .await
        .unwrap();

        assert!(matches!(rx.recv().await.unwrap().kind, IncomingKind::Connected));
        assert!(matches!(rx.recv().await.unwrap().kind, IncomingKind::Error(_)));
        match rx.recv().await.unwrap().kind {
            IncomingKind::Tree(roots) => {
                assert_eq!(roots[0].id, Some(actiontree_core::NodeId("a".into())));
                assert_eq!(roots[0].children[0].invalid, Some("label"));
            }
            other => panic!("expected the tree, got {other:?}"),
        }
    }
}
