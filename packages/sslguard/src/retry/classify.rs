//! Result validity and error classification

use bytes::Bytes;
use http::StatusCode;

use super::policy::ErrorType;
use crate::error::TransportError;
use crate::transport::FetchResponse;

/// What the retry loop needs to know about a successful call's value
///
/// A value is invalid, and therefore retried, when it is absent or carries an
/// HTTP status outside 2xx.
pub trait Outcome {
    fn status_code(&self) -> Option<StatusCode> {
        None
    }

    fn is_absent(&self) -> bool {
        false
    }
}

impl Outcome for FetchResponse {
    fn status_code(&self) -> Option<StatusCode> {
        Some(self.status)
    }
}

impl Outcome for StatusCode {
    fn status_code(&self) -> Option<StatusCode> {
        Some(*self)
    }
}

impl<T: Outcome> Outcome for Option<T> {
    fn status_code(&self) -> Option<StatusCode> {
        self.as_ref().and_then(Outcome::status_code)
    }

    fn is_absent(&self) -> bool {
        self.as_ref().is_none_or(Outcome::is_absent)
    }
}

impl Outcome for bool {
    fn is_absent(&self) -> bool {
        !*self
    }
}

impl Outcome for () {}
impl Outcome for String {}
impl Outcome for Vec<u8> {}
impl Outcome for Bytes {}

/// `true` when the result ends the retry loop successfully
pub fn is_valid_result<T: Outcome>(result: &Result<T, TransportError>) -> bool {
    match result {
        Err(_) => false,
        Ok(value) if value.is_absent() => false,
        Ok(value) => value.status_code().is_none_or(|status| status.is_success()),
    }
}

/// Classify a failed result
///
/// Transport errors are matched on their text; HTTP statuses split into
/// server and client errors; anything else is a generic connection error.
pub fn determine_error_type<T: Outcome>(result: &Result<T, TransportError>) -> ErrorType {
    match result {
        Err(error) => {
            let text = error.to_string().to_ascii_lowercase();
            if text.contains("connect") || text.contains("timeout") {
                ErrorType::ConnectionTimeout
            } else if text.contains("ssl") || text.contains("cert") {
                ErrorType::SslError
            } else {
                ErrorType::ConnectionError
            }
        }
        Ok(value) => match value.status_code().map(|status| status.as_u16()) {
            Some(code) if code >= 500 => ErrorType::ServerError,
            Some(code) if code >= 400 => ErrorType::ClientError,
            _ => ErrorType::ConnectionError,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportErrorKind;

    fn status(code: u16) -> Result<FetchResponse, TransportError> {
        Ok(FetchResponse::new(StatusCode::from_u16(code).unwrap(), Bytes::new()))
    }

    #[test]
    fn classifies_transport_errors_by_text() {
        let timeout: Result<FetchResponse, _> = Err(TransportError::timeout("read"));
        assert_eq!(determine_error_type(&timeout), ErrorType::ConnectionTimeout);

        let refused: Result<FetchResponse, _> = Err(TransportError::connect("refused"));
        assert_eq!(determine_error_type(&refused), ErrorType::ConnectionTimeout);

        let handshake: Result<FetchResponse, _> = Err(TransportError::tls("bad handshake"));
        assert_eq!(determine_error_type(&handshake), ErrorType::SslError);

        let protocol: Result<FetchResponse, _> =
            Err(TransportError::new(TransportErrorKind::Protocol, "garbage"));
        assert_eq!(determine_error_type(&protocol), ErrorType::ConnectionError);
    }

    #[test]
    fn classifies_statuses() {
        assert_eq!(determine_error_type(&status(503)), ErrorType::ServerError);
        assert_eq!(determine_error_type(&status(404)), ErrorType::ClientError);
        assert_eq!(determine_error_type(&status(301)), ErrorType::ConnectionError);
        let absent: Result<Option<FetchResponse>, TransportError> = Ok(None);
        assert_eq!(determine_error_type(&absent), ErrorType::ConnectionError);
    }

    #[test]
    fn validity_rules() {
        assert!(is_valid_result(&status(200)));
        assert!(!is_valid_result(&status(304)));
        assert!(!is_valid_result(&status(102)));
        assert!(!is_valid_result(&status(400)));
        assert!(!is_valid_result(&Ok::<bool, TransportError>(false)));
        assert!(is_valid_result(&Ok::<bool, TransportError>(true)));
        assert!(!is_valid_result(&Ok::<Option<String>, TransportError>(None)));
        assert!(is_valid_result(&Ok::<Option<String>, TransportError>(Some(String::new()))));
    }
}
