//! Scenario replay harness for the sparse id index.
//!
//! - [`scenario`]: JSON/TOML scenario model and deterministic [`replay`].
//! - [`log`]: JSON-lines replay transcripts and test logging setup.

pub mod error;
pub mod log;
pub mod scenario;

pub use error::{HarnessError, Result};
pub use log::{TRANSCRIPT_SCHEMA_VERSION, Transcript, TranscriptEntry, init_test_logging};
pub use scenario::{
    MutationExpectation, QueryExpectation, RangeSpec, ReplayOutcome, Scenario, Step, StepFailure,
    replay,
};
