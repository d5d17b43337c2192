use crossbeam_channel::Sender;

use crate::graph::ViewFrame;
use crate::util::ids::{node_label_long, node_label_short};

/// The drawing side. It owns pan/zoom/selection; the assembler only hands
/// over finished frames and asks it to refit after each one.
pub trait RenderSink {
    fn present(&mut self, frame: &ViewFrame);
    fn fit_view(&mut self);
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenderEvent {
    Frame(ViewFrame),
    FitView,
}

// A renderer on its own thread (GPU loop, UI toolkit) drains these.
impl RenderSink for Sender<RenderEvent> {
    fn present(&mut self, frame: &ViewFrame) {
        if self.send(RenderEvent::Frame(frame.clone())).is_err() {
            tracing::debug!("renderer gone, frame dropped");
        }
    }

    fn fit_view(&mut self) {
        let _ = self.send(RenderEvent::FitView);
    }
}

/// Headless sink: summarises every frame through `tracing`.
#[derive(Debug, Default)]
pub struct LogSink {
    pub verbose: bool,
}

impl RenderSink for LogSink {
    fn present(&mut self, frame: &ViewFrame) {
        tracing::info!(
            trace_id = %frame.trace_id,
            status = ?frame.status,
            direction = frame.direction.as_str(),
            shown = frame.nodes.len(),
            edges = frame.edges.len(),
            total = frame.total_nodes,
            unresolved = frame.unresolved,
            "frame"
        );
        if self.verbose {
            for n in &frame.nodes {
                tracing::info!(
                    id = %n.id,
                    x = n.position.x,
                    y = n.position.y,
                    laid_out = n.laid_out,
                    "{}",
                    node_label_short(&n.data)
                );
                for line in node_label_long(&n.data) {
                    tracing::debug!(id = %n.id, "  {line}");
                }
            }
        }
    }

    fn fit_view(&mut self) {
        tracing::trace!("fit view");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Direction, FeedStatus};
    use actiontree_core::TraceId;

    #[test]
    fn channel_sink_forwards_frame_then_fit() {
        let (mut tx, rx) = crossbeam_channel::unbounded::<RenderEvent>();
        let frame = ViewFrame {
            trace_id: TraceId("1".into()),
            status: FeedStatus::Live,
            direction: Direction::LeftToRight,
            nodes: Vec::new(),
            edges: Vec::new(),
            total_nodes: 0,
            unresolved: 0,
        };

        tx.present(&frame);
        tx.fit_view();

        assert_eq!(rx.try_recv(), Ok(RenderEvent::Frame(frame)));
        assert_eq!(rx.try_recv(), Ok(RenderEvent::FitView));

        // A closed renderer is not an error for the assembler.
        drop(rx);
        tx.fit_view();
    }
}
