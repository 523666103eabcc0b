//! pfdb: a live viewer for piped logs that tracks the variables printed into
//! them and lets the operator scrub back and forth through time.

mod cli;
pub mod ingest;
pub mod nav;
pub mod seek;
pub mod store;
pub mod tui;

pub use cli::{run, DynError};
pub use ingest::{Ingestor, LineParser, MonotonicClock, ParsedLine};
pub use nav::{Action, Pane, ProgramState, Session, Transition};
pub use seek::{is_active_at, scroll_to_time, seek_variables, seek_variables_except};
pub use store::{
    BufferEntry, LineBuffer, TemporalStore, Timestamp, VariableHistory, VariableRegistry,
    VariableUpdate,
};
