use thiserror::Error;

/// Error kinds reported by the SPK build pipeline
///
/// Every variant is terminal for the run. Library functions return
/// [`anyhow::Result`] carrying one of these, so callers can recover the kind
/// with [`anyhow::Error::downcast_ref`].
#[derive(Error, Debug)]
pub enum SpkError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unsupported combination: {0}")]
    UnsupportedCombination(String),

    #[error("fetch failed: {0}")]
    Fetch(String),

    #[error("packaging failed: {0}")]
    Packaging(String),

    #[error("insufficient privilege: {0}")]
    Privilege(String),
}

impl SpkError {
    /// Name of the pipeline stage that raised this error
    #[must_use]
    pub fn stage(&self) -> &'static str {
        match self {
            SpkError::InvalidArgument(_) => "resolve",
            SpkError::UnsupportedCombination(_) | SpkError::Fetch(_) => "fetch",
            SpkError::Packaging(_) => "assemble",
            SpkError::Privilege(_) => "guard",
        }
    }
}
