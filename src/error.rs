//! Error taxonomy for the answer path.
//!
//! Remote collaborators (embedding, vector index, chat model) report
//! [`ProviderError`]s. The answer pipeline folds those, configuration
//! problems and conversation-store failures into [`AnswerError`], whose
//! variants the HTTP layer maps onto distinct status codes.
//!
//! Offline plumbing (ingestion, CLI commands) stays on `anyhow`.

/// Invalid or missing configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required setting: {0}")]
    Missing(&'static str),

    #[error("invalid setting {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

/// Failure reported by a remote provider.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Network failure, timeout or 5xx after all retries.
    #[error("{provider} unavailable: {message}")]
    Unavailable { provider: String, message: String },

    /// HTTP 429 after all retries.
    #[error("{provider} quota exceeded: {message}")]
    QuotaExceeded { provider: String, message: String },

    /// Non-retryable 4xx.
    #[error("{provider} rejected the request ({status}): {body}")]
    Rejected {
        provider: String,
        status: u16,
        body: String,
    },

    /// The provider answered, but not with something we can use.
    #[error("{provider} returned an invalid response: {message}")]
    BadResponse { provider: String, message: String },

    /// The provider cannot work with the current settings.
    #[error("{provider} misconfigured: {message}")]
    Misconfigured { provider: String, message: String },
}

impl ProviderError {
    pub fn unavailable(provider: &str, message: impl ToString) -> Self {
        Self::Unavailable {
            provider: provider.to_string(),
            message: message.to_string(),
        }
    }

    pub fn bad_response(provider: &str, message: impl ToString) -> Self {
        Self::BadResponse {
            provider: provider.to_string(),
            message: message.to_string(),
        }
    }

    pub fn misconfigured(provider: &str, message: impl ToString) -> Self {
        Self::Misconfigured {
            provider: provider.to_string(),
            message: message.to_string(),
        }
    }

    /// Name of the provider that failed.
    pub fn provider(&self) -> &str {
        match self {
            Self::Unavailable { provider, .. }
            | Self::QuotaExceeded { provider, .. }
            | Self::Rejected { provider, .. }
            | Self::BadResponse { provider, .. }
            | Self::Misconfigured { provider, .. } => provider,
        }
    }
}

/// Distinguishable outcomes of a failed answer.
#[derive(Debug, thiserror::Error)]
pub enum AnswerError {
    #[error("message must not be empty")]
    EmptyMessage,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{provider} unavailable: {message}")]
    ProviderUnavailable { provider: String, message: String },

    #[error("{provider} quota exceeded: {message}")]
    QuotaExceeded { provider: String, message: String },

    #[error("no passages matched the message")]
    EmptyRetrieval,

    #[error("conversation store error: {0}")]
    Store(String),
}

impl AnswerError {
    /// Machine-readable code used in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyMessage => "bad_request",
            Self::Config(_) => "config_error",
            Self::ProviderUnavailable { .. } => "provider_unavailable",
            Self::QuotaExceeded { .. } => "quota_exceeded",
            Self::EmptyRetrieval => "empty_retrieval",
            Self::Store(_) => "store_error",
        }
    }

    pub(crate) fn store(err: anyhow::Error) -> Self {
        Self::Store(format!("{:#}", err))
    }
}

impl From<ConfigError> for AnswerError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<ProviderError> for AnswerError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::QuotaExceeded { provider, message } => {
                Self::QuotaExceeded { provider, message }
            }
            ProviderError::Misconfigured { provider, message } => {
                Self::Config(format!("{}: {}", provider, message))
            }
            // Bad credentials are a deployment problem, not an outage.
            ProviderError::Rejected {
                provider,
                status: status @ (401 | 403),
                body,
            } => Self::Config(format!(
                "{} rejected credentials ({}): {}",
                provider, status, body
            )),
            ProviderError::Rejected {
                provider,
                status,
                body,
            } => Self::ProviderUnavailable {
                provider,
                message: format!("request rejected ({}): {}", status, body),
            },
            ProviderError::Unavailable { provider, message }
            | ProviderError::BadResponse { provider, message } => {
                Self::ProviderUnavailable { provider, message }
            }
        }
    }
}
