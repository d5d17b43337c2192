use actiontree_core::TraceId;
use actiontree_viewer::app::Viewer;
use actiontree_viewer::graph::GraphState;
use actiontree_viewer::net;
use actiontree_viewer::render::LogSink;
use actiontree_viewer::ui;
use actiontree_viewer::util::{cli, config};
use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_tracing();
    let args = cli::parse_args()?;
    let mut cfg = config::load_or_default();
    args.apply_to(&mut cfg);

    let trace_id = match args.trace.clone() {
        Some(id) => id,
        None => latest_trace(&cfg.socket_path).await?,
    };
    tracing::info!(socket = %cfg.socket_path, trace_id = %trace_id, "starting viewer");

    let state = GraphState::new(trace_id, cfg.view_options(), cfg.layout());
    let sink = LogSink {
        verbose: cfg.verbose_frames,
    };
    let mut viewer = Viewer::new(state, sink, cfg.debounce()).with_feed(cfg.socket_path.clone());
    if let Some(path) = config::config_file_path() {
        viewer = viewer.with_settings(cfg.clone(), path);
    }

    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    ui::spawn_stdin_reader(cmd_tx);
    viewer.run(cmd_rx).await
}

async fn latest_trace(sock_path: &str) -> Result<TraceId> {
    let traces = net::list_traces(sock_path)
        .await
        .context("no --trace given and trace listing failed")?;
    traces
        .into_iter()
        .max_by_key(|t| t.created_at_ms)
        .map(|t| t.id)
        .context("feed has no traces yet")
}
