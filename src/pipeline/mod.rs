pub mod buffer;
pub mod filter;
pub mod reader;
pub mod sink;

pub use buffer::HandoffBuffer;
pub use filter::{FilterChain, FilterKind, FilterRule, run_filter_stage};
pub use reader::SourceReader;
pub use sink::Sink;
