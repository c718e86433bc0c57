use thiserror::Error;

#[derive(Error, Debug)]
pub enum CensusError {
    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration error in '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration field: {field}")]
    MissingConfigError { field: String },

    #[error("Missing credential '{credential}': set {env_var} or '{config_key}' in the config file")]
    MissingCredentialError {
        credential: String,
        env_var: String,
        config_key: String,
    },

    #[error("Upstream returned HTTP {status} for {operation}: {message}")]
    UpstreamError {
        operation: String,
        status: u16,
        message: String,
    },

    #[error("Upstream API reported errors: {details}")]
    UpstreamRejected { details: String },

    #[error("{operation} failed after {attempts} attempts: {last_error}")]
    RetryExhausted {
        operation: String,
        attempts: u32,
        last_error: String,
    },

    #[error("Webhook delivery failed: {message}")]
    WebhookDeliveryError { message: String },

    #[error("Data processing error: {message}")]
    ProcessingError { message: String },

    #[error("Validation error: {message}")]
    ValidationError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Network,
    Upstream,
    Data,
    Delivery,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl CensusError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            CensusError::ApiError(_) | CensusError::RetryExhausted { .. } => ErrorCategory::Network,
            CensusError::IoError(_) => ErrorCategory::System,
            CensusError::SerializationError(_)
            | CensusError::ProcessingError { .. }
            | CensusError::ValidationError { .. } => ErrorCategory::Data,
            CensusError::ConfigError { .. }
            | CensusError::ConfigValidationError { .. }
            | CensusError::InvalidConfigValueError { .. }
            | CensusError::MissingConfigError { .. }
            | CensusError::MissingCredentialError { .. } => ErrorCategory::Configuration,
            CensusError::UpstreamError { .. } | CensusError::UpstreamRejected { .. } => {
                ErrorCategory::Upstream
            }
            CensusError::WebhookDeliveryError { .. } => ErrorCategory::Delivery,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            CensusError::WebhookDeliveryError { .. } => ErrorSeverity::Low,
            CensusError::ApiError(_) | CensusError::RetryExhausted { .. } => ErrorSeverity::Medium,
            CensusError::IoError(_) => ErrorSeverity::Critical,
            _ => ErrorSeverity::High,
        }
    }

    /// Process exit code for a run that ended with this error.
    pub fn exit_code(&self) -> i32 {
        match self.severity() {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        }
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            CensusError::MissingCredentialError {
                env_var, config_key, ..
            } => format!(
                "Export {} or add '{}' under [credentials] in the config file",
                env_var, config_key
            ),
            CensusError::ConfigError { .. }
            | CensusError::ConfigValidationError { .. }
            | CensusError::InvalidConfigValueError { .. }
            | CensusError::MissingConfigError { .. } => {
                "Check the config file for typos and invalid values".to_string()
            }
            CensusError::RetryExhausted { .. } | CensusError::ApiError(_) => {
                "The upstream API is unavailable or rate limited; rerun the job later".to_string()
            }
            CensusError::UpstreamError { status, .. } if *status == 401 || *status == 403 => {
                "The API token was rejected; verify INTERCOM_TOKEN".to_string()
            }
            CensusError::UpstreamError { .. } | CensusError::UpstreamRejected { .. } => {
                "Inspect the upstream error details above".to_string()
            }
            CensusError::WebhookDeliveryError { .. } => {
                "Verify the webhook URL and API token; the report was still printed".to_string()
            }
            CensusError::IoError(_) => "Check file permissions and available disk".to_string(),
            CensusError::SerializationError(_)
            | CensusError::ProcessingError { .. }
            | CensusError::ValidationError { .. } => {
                "Rerun with --verbose to see the offending data".to_string()
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Configuration => format!("Configuration problem: {}", self),
            ErrorCategory::Network => format!("Network request failed: {}", self),
            ErrorCategory::Upstream => format!("The contacts API refused the request: {}", self),
            ErrorCategory::Data => format!("Unexpected data: {}", self),
            ErrorCategory::Delivery => format!("Report not delivered: {}", self),
            ErrorCategory::System => format!("System error: {}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, CensusError>;
