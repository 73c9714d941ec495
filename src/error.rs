use thiserror::Error;

/// Failure talking to the upstream traffic feed.
///
/// None of these are fatal: the bulk path turns them into a degraded snapshot
/// and the detail path turns them into "route unknown".
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Upstream answered with a non-success status (429 when rate-limited)
    #[error(
        "OpenSky API error: {status}. The API may be rate-limited or temporarily unavailable."
    )]
    Status {
        status: u16,
    },

    /// Connection, TLS or timeout failure before a response was read
    #[error("OpenSky API request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Response was not JSON (OpenSky serves HTML pages when throttling)
    #[error("OpenSky API returned invalid response ({content_type}). It may be rate-limited.")]
    NotJson {
        content_type: String,
    },

    /// JSON body did not match the expected shape
    #[error("OpenSky API returned a malformed body: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Coarse classification used for logging and status reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamErrorKind {
    Unavailable,
    Malformed,
}

impl UpstreamError {
    pub fn kind(&self) -> UpstreamErrorKind {
        match self {
            UpstreamError::Status { .. } | UpstreamError::Transport(_) => {
                UpstreamErrorKind::Unavailable
            }
            UpstreamError::NotJson { .. } | UpstreamError::Malformed(_) => {
                UpstreamErrorKind::Malformed
            }
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, UpstreamError::Status { status: 429 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_message_mentions_status() {
        let err = UpstreamError::Status { status: 429 };
        assert!(err.is_rate_limited());
        assert_eq!(err.kind(), UpstreamErrorKind::Unavailable);
        assert!(err.to_string().contains("429"));
    }

    #[test]
    fn decode_failures_are_malformed() {
        let json_err = serde_json::from_str::<serde_json::Value>("<html>").unwrap_err();
        assert_eq!(UpstreamError::from(json_err).kind(), UpstreamErrorKind::Malformed);

        let err = UpstreamError::NotJson { content_type: "text/html".into() };
        assert_eq!(err.kind(), UpstreamErrorKind::Malformed);
        assert!(!err.is_rate_limited());
    }
}
