//! Live action-tree viewer engine: an order-tolerant node store, type and
//! text filtering, layered layout, and a debounced loop that hands finished
//! frames to a renderer.

pub mod app;
pub mod graph;
pub mod net;
pub mod render;
pub mod ui;
pub mod util;
