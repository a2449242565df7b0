/// Errors surfaced by the ComicVine client and the components built on it.
///
/// The numeric variants mirror the API's envelope status codes; the rest cover
/// transport failures and caller/schema mistakes.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("invalid API key: {0}")]
    InvalidApiKey(String),

    #[error("object not found: {0}")]
    ObjectNotFound(String),

    #[error("error in URL format: {0}")]
    UrlFormat(String),

    #[error("malformed JSON response: {0}")]
    Json(String),

    #[error("bad filter syntax: {0}")]
    Filter(String),

    #[error("subscriber-only resource: {0}")]
    SubscriberOnly(String),

    #[error("API rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    #[error("unknown API status {code}: {message}")]
    UnknownStatus { code: i64, message: String },

    #[error("illegal argument: {0}")]
    IllegalArgument(String),

    #[error("cannot convert field '{field}': {reason}")]
    NotConvertable { field: String, reason: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl ApiError {
    /// Map an envelope status code to the matching error kind.
    /// Anything unrecognized (and not the success code 1) is `UnknownStatus`.
    pub fn from_status(code: i64, message: &str) -> ApiError {
        let message = message.to_string();
        match code {
            100 => ApiError::InvalidApiKey(message),
            101 => ApiError::ObjectNotFound(message),
            102 => ApiError::UrlFormat(message),
            103 => ApiError::Json(message),
            104 => ApiError::Filter(message),
            105 => ApiError::SubscriberOnly(message),
            107 => ApiError::RateLimitExceeded(message),
            _ => ApiError::UnknownStatus { code, message },
        }
    }

    /// Classification used by the retry middleware.
    ///
    /// Rate limiting is not retried: the token bucket should have prevented it,
    /// so an occurrence means some other consumer is draining the quota.
    /// Caller and schema mistakes are not retried either.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            ApiError::RateLimitExceeded(_)
                | ApiError::IllegalArgument(_)
                | ApiError::NotConvertable { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            ApiError::from_status(100, "x"),
            ApiError::InvalidApiKey(_)
        ));
        assert!(matches!(
            ApiError::from_status(101, "x"),
            ApiError::ObjectNotFound(_)
        ));
        assert!(matches!(ApiError::from_status(102, "x"), ApiError::UrlFormat(_)));
        assert!(matches!(ApiError::from_status(103, "x"), ApiError::Json(_)));
        assert!(matches!(ApiError::from_status(104, "x"), ApiError::Filter(_)));
        assert!(matches!(
            ApiError::from_status(105, "x"),
            ApiError::SubscriberOnly(_)
        ));
        assert!(matches!(
            ApiError::from_status(107, "x"),
            ApiError::RateLimitExceeded(_)
        ));
        assert!(matches!(
            ApiError::from_status(42, "x"),
            ApiError::UnknownStatus { code: 42, .. }
        ));
    }

    #[test]
    fn test_retry_classification() {
        assert!(!ApiError::RateLimitExceeded("slow down".into()).is_retryable());
        assert!(!ApiError::IllegalArgument("bad".into()).is_retryable());
        assert!(!ApiError::NotConvertable {
            field: "volume".into(),
            reason: "not an object".into()
        }
        .is_retryable());
        assert!(ApiError::ObjectNotFound("gone".into()).is_retryable());
        assert!(ApiError::UnknownStatus {
            code: 500,
            message: "boom".into()
        }
        .is_retryable());
    }
}
