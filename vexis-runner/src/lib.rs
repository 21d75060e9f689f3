//! VEXIS runner - solver driving and result extraction
//!
//! Takes a prepared document from `vexis-core` the rest of the way:
//! - Solver driver: child process with streamed, line-buffered stdout,
//!   progress parsing, dll-not-found fallback, and graceful cancellation
//! - Result extractor: rigid-body rows from the solver log into a
//!   force-stroke CSV and plot
//! - Job and batch orchestration with per-job artifacts and diagnostics

pub mod driver;
pub mod error;
pub mod extract;
pub mod job;
pub mod plot;

pub use driver::{ProgressEvent, SolveRequest, SolverDriver};
pub use error::{RunnerError, RunnerResult};
pub use extract::{parse_rigid_body_rows, write_curve_csv, CurvePoint};
pub use job::{run_job, run_job_to_completion, JobOutcome, JobPaths};
pub use plot::write_curve_plot;
