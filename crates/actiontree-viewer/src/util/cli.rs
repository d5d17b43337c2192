use actiontree_core::{NodeKind, TraceId};
use anyhow::Result;
use std::ffi::OsString;

use crate::graph::Direction;
use crate::util::config::ViewerConfig;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CliArgs {
    pub socket: Option<String>,
    pub trace: Option<TraceId>,
    pub direction: Option<Direction>,
    pub type_filter: Option<Option<NodeKind>>,
    pub search: Option<String>,
    pub verbose_frames: bool,
}

impl CliArgs {
    /// Flags win over the config file.
    pub fn apply_to(&self, cfg: &mut ViewerConfig) {
        if let Some(socket) = &self.socket {
            cfg.socket_path = socket.clone();
        }
        if let Some(direction) = self.direction {
            cfg.direction = direction;
        }
        if let Some(type_filter) = self.type_filter {
            cfg.type_filter = type_filter;
        }
        if let Some(search) = &self.search {
            cfg.search = search.clone();
        }
        cfg.verbose_frames |= self.verbose_frames;
    }
}

pub fn parse_args() -> Result<CliArgs> {
    parse_args_from(std::env::args_os().skip(1))
}

fn parse_args_from<I>(args: I) -> Result<CliArgs>
where
    I: IntoIterator<Item = OsString>,
{
    let mut out = CliArgs::default();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        let mut value = |flag: &str| -> Result<String> {
            match args.next() {
                Some(v) => Ok(v.to_string_lossy().into_owned()),
                None => anyhow::bail!("{flag} expects a value"),
            }
        };
        if arg == "--socket" {
            out.socket = Some(value("--socket")?);
        } else if arg == "--trace" {
            out.trace = Some(TraceId(value("--trace")?));
        } else if arg == "--direction" {
            let v = value("--direction")?;
            let Some(d) = Direction::parse(&v) else {
                anyhow::bail!("invalid direction: {v} (expected tb|lr)");
            };
            out.direction = Some(d);
        } else if arg == "--type" {
            let v = value("--type")?;
            out.type_filter = Some(match v.as_str() {
                "none" | "all" => None,
                other => match NodeKind::parse(other) {
                    Some(kind) => Some(kind),
                    None => anyhow::bail!("invalid node type: {other}"),
                },
            });
        } else if arg == "--search" {
            out.search = Some(value("--search")?);
        } else if arg == "--verbose-frames" {
            out.verbose_frames = true;
        } else {
            anyhow::bail!("unknown argument: {:?}", arg);
        }
    }

    Ok(out)
}
