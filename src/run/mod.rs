//! Run lifecycle: state machine, live registry, cancellation.

pub mod cancel;
pub mod registry;
pub mod state;

pub use cancel::{CancelOutcome, RunCanceller};
pub use registry::{CallRegistry, RunMetadata, RunSnapshot, RunUpdate, TerminalListener};
pub use state::{Applied, ResponseIdSlot, RunState};
