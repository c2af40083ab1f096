//! Reconstruction runners: the orchestration layer that turns a resolved
//! configuration into a finished pipeline run.
//!
//! The launcher builds the processing objects (calibration, correctors,
//! filter spec, readers/writers) and hands them to one of two engines:
//!
//! * [`single::run`]: everything on the calling thread, direct I/O;
//! * [`multi::run`]: N worker threads each owning a projection filterer
//!   and one z-slab of the volume, one asynchronous I/O executor thread,
//!   and the control thread driving two double-buffer pairs with a barrier
//!   per projection.
//!
//! Errors never retry: the first failure anywhere stops the queues, joins
//! every thread and surfaces the earliest captured error.

mod error;
mod launcher;
mod multi;
mod pipeline;
mod single;

pub use error::RunnerError;
pub use launcher::launch;
pub use pipeline::{
    build_pipeline, projection_angle, BackProjectionSpec, CorrectionStage, FilterSpec,
    PipelineParts,
};
