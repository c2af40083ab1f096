use thiserror::Error;

/// Anything that can stop a reconstruction run.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error(transparent)]
    Calibration(#[from] core_calib::CalibrationError),

    #[error(transparent)]
    Filter(#[from] core_filter::FilterError),

    #[error(transparent)]
    Io(#[from] core_io::IoError),

    #[error("cannot write attenuation corrections log: {0}")]
    CorrectionsLog(std::io::Error),

    /// An error captured on a worker thread; only the first per worker is
    /// kept and re-raised on the control thread.
    #[error("worker {worker} failed: {message}")]
    Worker { worker: usize, message: String },

    #[error("worker thread panicked")]
    WorkerPanic,
}
