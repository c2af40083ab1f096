//! Configuration loading, inference and resolution.
//!
//! The configuration file is TOML with the section-and-key layout of the
//! reconstruction tool: `[Input]`, `[Output]`, `[Projections]`, `[Volume]`,
//! `[Reconstruction]`, `[Software]`. Unknown sections or keys are rejected
//! with the offending name: maintaining explicit key lists is a hassle,
//! but it catches config-file typos before hours of reconstruction run on
//! the wrong settings.
//!
//! Resolution happens in three steps:
//! 1. parse the file ([`ConfigFile`]),
//! 2. read the input dataset's MetaImage header and fill in everything it
//!    can provide (data type, shape, pixel size, offsets); explicit config
//!    values always win,
//! 3. apply defaults, cross-validate, and produce a fully-typed
//!    [`ResolvedConfig`] for the launcher.
//!
//! Every constraint violation is reported here, at resolution time, never
//! later in the pipeline.

mod error;
mod file;
mod memory;
mod resolved;

pub use error::ConfigError;
pub use file::{
    BadPixelCorrectionChoice, BeamPowerChoice, ConfigFile, DataType, EngineChoice,
    FilteringModuleChoice, InterpolationChoice, SmoothingChoice, ThreadsChoice,
};
pub use memory::resolve_memory_limit;
pub use resolved::{
    InputKind, ResolvedConfig, ResolvedInput, ResolvedOutput, ResolvedProjections,
    ResolvedReconstruction, ResolvedSoftware, ResolvedVolume, SmoothingSpec,
};
