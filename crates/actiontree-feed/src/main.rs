mod config;
mod ingest;
mod journal;
mod seed;
mod server;

use actiontree_core::ActionNode;
use anyhow::Result;
use journal::Journal;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let config = config::parse_args()?;

    let journal = Journal::shared();
    if config.seed {
        seed::seed_demo(&mut journal::lock(&journal))?;
    }

    // Event bus (broadcast so multiple viewers can subscribe)
    let (bus_tx, _bus_rx) = broadcast::channel::<ActionNode>(4096);

    if config.read_stdin {
        let mut session = ingest::Session::new(journal.clone(), bus_tx.clone());
        if let Some(name) = config.trace_name.clone() {
            session.apply(ingest::AgentCommand::StartTrace {
                name,
                description: None,
            })?;
        }
        tokio::spawn(async move {
            if let Err(e) = ingest::run_stdin(session).await {
                tracing::error!(error = %format!("{e:#}"), "agent step reader failed");
            }
        });
    }

    let listener = server::bind(&config.socket_path)?;
    server::serve(listener, journal, bus_tx).await
}
