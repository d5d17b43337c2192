use actiontree_core::{NodeKind, TraceId};
use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::UnboundedSender;

use crate::graph::Direction;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    SwitchTrace(TraceId),
    SetType(Option<NodeKind>),
    SetSearch(String),
    SetDirection(Direction),
    ListTraces,
    Save,
    Quit,
}

pub fn parse_command(line: &str) -> Result<Option<Command>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (head, rest) = match line.split_once(char::is_whitespace) {
        Some((h, r)) => (h, r.trim()),
        None => (line, ""),
    };
    let cmd = match head {
        "trace" => {
            if rest.is_empty() {
                anyhow::bail!("trace expects an id");
            }
            Command::SwitchTrace(TraceId(rest.to_string()))
        }
        "type" => match rest {
            "" | "none" | "all" => Command::SetType(None),
            other => match NodeKind::parse(other) {
                Some(kind) => Command::SetType(Some(kind)),
                None => anyhow::bail!(
                    "unknown node type: {other} (expected none|logging|decision|tool_call|terminal)"
                ),
            },
        },
        "search" => Command::SetSearch(rest.to_string()),
        "dir" => match Direction::parse(rest) {
            Some(d) => Command::SetDirection(d),
            None => anyhow::bail!("invalid direction: {rest} (expected tb|lr)"),
        },
        "traces" => Command::ListTraces,
        "save" => Command::Save,
        "quit" | "exit" => Command::Quit,
        other => anyhow::bail!("unknown command: {other}"),
    };
    Ok(Some(cmd))
}

/// Forward stdin lines as commands. End of input is treated as `quit`.
pub fn spawn_stdin_reader(tx: UnboundedSender<Command>) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => match parse_command(&line) {
                    Ok(Some(cmd)) => {
                        if tx.send(cmd).is_err() {
                            return;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => tracing::warn!(error = %e, "ignoring command"),
                },
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "stdin read failed");
                    break;
                }
            }
        }
        let _ = tx.send(Command::Quit);
    });
}
