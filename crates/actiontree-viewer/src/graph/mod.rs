pub mod filter;
pub mod layout;
pub mod model;
pub mod state;
pub mod view;

pub use filter::filter_nodes;
pub use layout::{layout, Direction, Layout, LayoutConfig, Point};
pub use model::{IngestStats, MergeOutcome, NodeStore};
pub use state::GraphState;
pub use view::{assemble, FeedStatus, FlowEdge, FlowNode, ViewFrame, ViewOptions};
