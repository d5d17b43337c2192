use anyhow::Result;
use std::ffi::OsString;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedConfig {
    pub socket_path: String,
    pub seed: bool,
    pub trace_name: Option<String>,
    pub read_stdin: bool,
}

pub fn runtime_sock_path() -> String {
    // Wayland-friendly: prefer XDG_RUNTIME_DIR
    match std::env::var("XDG_RUNTIME_DIR") {
        Ok(dir) if !dir.trim().is_empty() => format!("{dir}/actiontree.sock"),
        _ => "/tmp/actiontree.sock".to_string(),
    }
}

pub fn parse_args() -> Result<FeedConfig> {
    parse_args_from(std::env::args_os().skip(1))
}

fn parse_args_from<I>(args: I) -> Result<FeedConfig>
where
    I: IntoIterator<Item = OsString>,
{
    let mut config = FeedConfig {
        socket_path: runtime_sock_path(),
        seed: false,
        trace_name: None,
        read_stdin: true,
    };
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        if arg == "--socket" {
            let Some(path) = args.next() else {
                anyhow::bail!("--socket expects a path");
            };
            config.socket_path = path.to_string_lossy().into_owned();
        } else if arg == "--seed" {
            config.seed = true;
        } else if arg == "--trace-name" {
            let Some(name) = args.next() else {
                anyhow::bail!("--trace-name expects a name");
            };
            config.trace_name = Some(name.to_string_lossy().into_owned());
        } else if arg == "--no-stdin" {
            config.read_stdin = false;
        } else {
            anyhow::bail!("unknown argument: {:?}", arg);
        }
    }

    Ok(config)
}
