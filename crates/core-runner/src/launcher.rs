//! Entry point: configuration in, finished reconstruction out.

use core_config::{EngineChoice, ResolvedConfig};
use tracing::info;

use crate::error::RunnerError;
use crate::pipeline::build_pipeline;
use crate::{multi, single};

/// Builds the pipeline described by `config` and runs it on the configured
/// engine. This is the only function the binary needs.
pub fn launch(config: &ResolvedConfig) -> Result<(), RunnerError> {
    let engine = config.software.engine;
    let threads = match engine {
        EngineChoice::SingleThreaded => 1,
        EngineChoice::MultiThreaded => config
            .software
            .threads
            .unwrap_or_else(num_cpus::get)
            .max(1),
    };

    info!(target: "runner", ?engine, threads, "launching reconstruction");
    let parts = build_pipeline(config, threads)?;
    match engine {
        EngineChoice::SingleThreaded => single::run(parts),
        EngineChoice::MultiThreaded => multi::run(parts),
    }
}
