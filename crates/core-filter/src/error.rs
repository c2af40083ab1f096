use thiserror::Error;

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("the real-space convolution back-end cannot apply a smoothing filter")]
    SmoothingUnsupported,

    #[error("FFT back-end failure: {0}")]
    Backend(String),
}
