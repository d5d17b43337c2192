use anyhow::Result;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::graph::GraphState;
use crate::net::{self, Incoming, ReaderHandle};
use crate::render::RenderSink;
use crate::ui::Command;
use crate::util::config::{self, ViewerConfig};

pub mod debounce;

pub use debounce::Debouncer;

/// Single event loop that owns the graph state. Feed messages and commands
/// only mark the state dirty; frames are produced by the debouncer.
pub struct Viewer<S: RenderSink> {
    state: GraphState,
    sink: S,
    debounce: Debouncer,
    socket: Option<String>,
    reader: Option<ReaderHandle>,
    settings: Option<(ViewerConfig, PathBuf)>,
    net_tx: UnboundedSender<Incoming>,
    net_rx: UnboundedReceiver<Incoming>,
}

impl<S: RenderSink> Viewer<S> {
    pub fn new(state: GraphState, sink: S, debounce: Duration) -> Self {
        let (net_tx, net_rx) = mpsc::unbounded_channel();
        Self {
            state,
            sink,
            debounce: Debouncer::new(debounce),
            socket: None,
            reader: None,
            settings: None,
            net_tx,
            net_rx,
        }
    }

    pub fn with_feed(mut self, socket: String) -> Self {
        self.socket = Some(socket);
        self
    }

    /// Sender for feed messages; the socket reader uses one of these too.
    pub fn feed_sender(&self) -> UnboundedSender<Incoming> {
        self.net_tx.clone()
    }

    /// Where `save` writes the current view options.
    pub fn with_settings(mut self, cfg: ViewerConfig, path: PathBuf) -> Self {
        self.settings = Some((cfg, path));
        self
    }

    pub async fn run(mut self, mut commands: UnboundedReceiver<Command>) -> Result<()> {
        self.connect();
        if self.state.is_dirty() {
            self.debounce.schedule();
        }

        loop {
            tokio::select! {
                Some(inc) = self.net_rx.recv() => {
                    if self.state.apply(inc) {
                        self.debounce.schedule();
                    }
                }
                cmd = commands.recv() => match cmd {
                    None | Some(Command::Quit) => break,
                    Some(cmd) => self.handle(cmd),
                },
                _ = self.debounce.fired() => self.emit(),
            }
        }

        tracing::info!(frames = self.state.perf.frames, merged = self.state.perf.merged, "viewer stopped");
        Ok(())
    }

    fn connect(&mut self) {
        // Replacing the handle aborts the previous reader.
        self.reader = self.socket.as_ref().map(|sock| {
            net::spawn_reader(sock.clone(), self.state.trace_id().clone(), self.net_tx.clone())
        });
    }

    fn handle(&mut self, cmd: Command) {
        let changed = match cmd {
            Command::SwitchTrace(trace_id) => {
                if let Some(old) = self.reader.take() {
                    tracing::debug!(trace_id = %old.trace_id(), "stopping feed reader");
                }
                self.debounce.cancel();
                self.state.switch_trace(trace_id);
                self.connect();
                true
            }
            Command::SetType(kind) => self.state.set_type_filter(kind),
            Command::SetSearch(search) => self.state.set_search(&search),
            Command::SetDirection(direction) => self.state.set_direction(direction),
            Command::ListTraces => {
                self.list_traces();
                false
            }
            Command::Save => {
                self.save_settings();
                false
            }
            Command::Quit => false,
        };
        if changed {
            self.debounce.schedule();
        }
    }

    fn list_traces(&self) {
        let Some(sock) = self.socket.clone() else {
            tracing::warn!("no feed configured, cannot list traces");
            return;
        };
        let tx = self.net_tx.clone();
        let trace_id = self.state.trace_id().clone();
        tokio::spawn(async move {
            match net::list_traces(&sock).await {
                Ok(traces) => {
                    let _ = tx.send(Incoming::traces(trace_id, traces));
                }
                Err(e) => tracing::warn!(error = %format!("{e:#}"), "listing traces failed"),
            }
        });
    }

    fn save_settings(&mut self) {
        let Some((cfg, path)) = self.settings.as_mut() else {
            tracing::warn!("no config file location, settings not saved");
            return;
        };
        cfg.remember(&self.state.options);
        match config::save_to_path(cfg, path) {
            Ok(()) => tracing::info!(path = %path.display(), "settings saved"),
            Err(e) => tracing::warn!(error = %format!("{e:#}"), "saving settings failed"),
        }
    }

    fn emit(&mut self) {
        let frame = self.state.take_frame();
        self.sink.present(&frame);
        self.sink.fit_view();
    }
}
