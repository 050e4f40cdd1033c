//! Map attempt errors (and the curl errors behind downloads) onto retry kinds.

use super::error::AttemptError;
use super::policy::ErrorKind;

pub fn classify(e: &AttemptError) -> ErrorKind {
    match e {
        AttemptError::NavigationTimeout(_) => ErrorKind::Timeout,
        AttemptError::Navigation(_) => ErrorKind::Navigation,
        AttemptError::NotFound => ErrorKind::NotFound,
        AttemptError::Download(_) => ErrorKind::Download,
        AttemptError::Engine(_) => ErrorKind::Fatal,
    }
}

/// Short reason for a curl failure, used in `AttemptError::Download`.
pub fn classify_curl_error(e: &curl::Error) -> String {
    if e.is_operation_timedout() {
        return "timed out".to_string();
    }
    if e.is_couldnt_connect() || e.is_couldnt_resolve_host() || e.is_couldnt_resolve_proxy() {
        return format!("connection failed: {}", e.description());
    }
    if e.is_read_error() || e.is_recv_error() || e.is_send_error() || e.is_got_nothing() {
        return format!("transfer interrupted: {}", e.description());
    }
    e.description().to_string()
}
