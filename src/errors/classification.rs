use super::types::ScanError;

/// Broad family an error belongs to. Each family has its own recovery policy:
/// network errors are retried inside the probe client, backend errors at the
/// stage boundary, parse errors contribute nothing, configuration errors stop
/// the run before any traffic is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    Backend,
    Parse,
    Configuration,
    Runtime,
}

#[derive(Debug, Clone)]
pub struct ErrorClassification {
    pub error_type: &'static str,
    pub category: ErrorCategory,
    pub retryable: bool,
}

impl ErrorClassification {
    fn new(error_type: &'static str, category: ErrorCategory, retryable: bool) -> Self {
        Self { error_type, category, retryable }
    }
}

impl ScanError {
    /// Classify this error to determine its family and whether it can be retried.
    pub fn classify(&self) -> ErrorClassification {
        use ErrorCategory::*;
        match self {
            // Retryable errors
            ScanError::Network(_) => ErrorClassification::new("NetworkError", Network, true),
            ScanError::Timeout(_) => ErrorClassification::new("TimeoutError", Network, true),
            ScanError::BackendRateLimited(_) => {
                ErrorClassification::new("RateLimitError", Backend, true)
            }
            ScanError::BackendUnavailable(_) => {
                ErrorClassification::new("BackendUnavailableError", Backend, true)
            }
            ScanError::BackendMalformed(_) => {
                ErrorClassification::new("BackendMalformedError", Backend, true)
            }

            // Retries already spent in the probe client
            ScanError::Unreachable(_) => ErrorClassification::new("UnreachableError", Network, false),
            ScanError::MalformedResponse(_) => {
                ErrorClassification::new("MalformedResponseError", Network, false)
            }

            // Non-retryable errors
            ScanError::Parse(_) => ErrorClassification::new("ParseError", Parse, false),
            ScanError::Json(_) => ErrorClassification::new("JsonError", Parse, false),
            ScanError::Config(_) => ErrorClassification::new("ConfigError", Configuration, false),
            ScanError::Template(_) => {
                ErrorClassification::new("TemplateError", Configuration, false)
            }
            ScanError::InvalidTarget(_) => {
                ErrorClassification::new("InvalidTargetError", Configuration, false)
            }
            ScanError::Yaml(_) => ErrorClassification::new("YamlError", Configuration, false),
            ScanError::Cancelled(_) => ErrorClassification::new("CancelledError", Runtime, false),
            ScanError::Io(_) => ErrorClassification::new("IoError", Runtime, false),
            ScanError::Internal(_) => ErrorClassification::new("InternalError", Runtime, false),
        }
    }

    /// Errors that stop the whole scan rather than degrading one stage.
    pub fn is_fatal(&self) -> bool {
        matches!(self.classify().category, ErrorCategory::Configuration)
            || matches!(self, ScanError::Unreachable(_))
    }
}
