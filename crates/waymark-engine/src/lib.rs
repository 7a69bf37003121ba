//! Executes command graphs against a fire-and-forget backend.
//!
//! The backend never reports completion, so every tracked command is
//! registered with the [`CompletionTracker`] and a background poller infers
//! progress from status queries.

pub mod completion;
pub mod executor;
pub mod session;
pub mod sim;
pub mod status;

pub use completion::{CompletionHandle, CompletionTracker};
pub use executor::{ExecutionReport, GraphExecutor, StepOutcome};
pub use session::Session;
pub use sim::SimulatedBackend;
pub use status::ExecutionStatus;
