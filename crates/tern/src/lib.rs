//! The checking driver: per-file parse/bind/analyze/finalize state
//! machines, the cross-file worklist, and diagnostic read-out.

pub mod cancellation;
pub mod config;
pub mod program;
pub mod source;

pub use cancellation::CancellationToken;
pub use config::Configuration;
pub use program::{CheckError, FileDiagnostics, Program};
