pub mod commands;

pub use commands::{parse_command, spawn_stdin_reader, Command};
