use thiserror::Error;

/// Everything that can end a scan run. The `Display` text is what the host UI
/// shows through the `CaptureError` host event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("capture not permitted")]
    ConsentDenied,
    #[error("failed to acquire screen image")]
    CaptureAcquisitionFailed,
    #[error("{0}")]
    RecognitionFailed(String),
    #[error("no text found on screen")]
    NoTextFound,
    #[error("reply service is not configured")]
    NotConfigured,
    #[error("{0}")]
    Network(String),
    #[error("{message}")]
    Server { status: u16, message: String },
    #[error("malformed reply payload: {0}")]
    MalformedResponse(String),
}

impl PipelineError {
    /// `NoTextFound` ends the run like a failure but is an expected outcome.
    pub fn is_soft(&self) -> bool {
        matches!(self, PipelineError::NoTextFound)
    }
}

#[cfg(test)]
mod tests {
    use super::PipelineError;

    #[test]
    fn server_errors_surface_the_server_message() {
        let err = PipelineError::Server {
            status: 429,
            message: "Monthly scan limit of 50 reached.".to_string(),
        };
        assert_eq!(err.to_string(), "Monthly scan limit of 50 reached.");
    }

    #[test]
    fn fixed_messages() {
        assert_eq!(PipelineError::ConsentDenied.to_string(), "capture not permitted");
        assert_eq!(
            PipelineError::NoTextFound.to_string(),
            "no text found on screen"
        );
        assert!(PipelineError::NoTextFound.is_soft());
        assert!(!PipelineError::ConsentDenied.is_soft());
    }
}
