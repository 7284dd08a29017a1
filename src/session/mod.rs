//! Compressor session: explicit state, a pure reducer, a single-writer
//! store and the compression driver.

mod action;
mod job;
mod state;
mod store;

pub use action::{Action, reduce};
pub use job::{
    CompressionEvent, Compressor, DEFAULT_POLL_INTERVAL, StartedJob, clear_output_dir,
};
pub use state::{CompressionStatus, SelectedSource, SessionState};
pub use store::{Observer, Session};
