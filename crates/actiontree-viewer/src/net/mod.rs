pub mod protocol;
pub mod uds;

pub use protocol::{Incoming, IncomingKind};
pub use uds::{list_traces, spawn_reader, ReaderHandle};
