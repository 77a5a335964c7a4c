use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("agent request timed out")]
    Timeout,

    #[error("agent upstream request failed with status {status}")]
    UpstreamHttp {
        status: u16,
        error_code: String,
        body: String,
    },

    #[error("agent request failed: {0}")]
    Generic(String),
}

impl AdapterError {
    pub fn error_code(&self) -> String {
        match self {
            AdapterError::Timeout => agentic_run_common::error_code::AGENT_TIMEOUT.to_string(),
            AdapterError::UpstreamHttp { error_code, .. } => error_code.clone(),
            AdapterError::Generic(_) => agentic_run_common::error_code::AGENT_GENERIC.to_string(),
        }
    }
}

impl From<reqwest::Error> for AdapterError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AdapterError::Timeout
        } else {
            AdapterError::Generic(err.to_string())
        }
    }
}
