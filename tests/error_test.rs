use std::time::Duration;

use mimir::{MimirError, Result};

#[test]
fn test_error_display() {
    let err = MimirError::ModelNotFound("gemma2-9b".to_string());
    assert!(err.to_string().contains("gemma2-9b"));

    let err = MimirError::ProviderUnavailable("no groq key".to_string());
    assert_eq!(err.to_string(), "provider unavailable: no groq key");
}

#[test]
fn test_result_alias() {
    fn returns_error() -> Result<()> {
        Err(MimirError::Configuration("missing".into()))
    }
    assert!(returns_error().is_err());
}

#[test]
fn json_errors_convert() {
    fn parse() -> Result<serde_json::Value> {
        Ok(serde_json::from_str("{not json")?)
    }
    assert!(matches!(parse(), Err(MimirError::Json(_))));
}

// ============================================================================
// Transient error classification
// ============================================================================

#[test]
fn transient_errors() {
    assert!(MimirError::RateLimited { retry_after: None }.is_transient());
    assert!(MimirError::Http("connection reset".into()).is_transient());
    assert!(MimirError::EmptyResponse.is_transient());
    for status in [429, 500, 502, 503] {
        assert!(
            MimirError::Api {
                status,
                message: String::new()
            }
            .is_transient(),
            "{status} should be transient"
        );
    }
}

#[test]
fn permanent_errors() {
    assert!(!MimirError::AuthenticationFailed.is_transient());
    assert!(!MimirError::ModelNotFound("x".into()).is_transient());
    assert!(!MimirError::ProviderUnavailable("x".into()).is_transient());
    assert!(!MimirError::Configuration("x".into()).is_transient());
    assert!(!MimirError::Store("x".into()).is_transient());
    assert!(
        !MimirError::Api {
            status: 400,
            message: "bad request".into()
        }
        .is_transient()
    );
}

#[test]
fn retry_after_only_from_rate_limits() {
    let err = MimirError::RateLimited {
        retry_after: Some(Duration::from_secs(3)),
    };
    assert_eq!(err.retry_after(), Some(Duration::from_secs(3)));
    assert_eq!(MimirError::Http("x".into()).retry_after(), None);
}
