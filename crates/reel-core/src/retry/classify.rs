//! Classify HTTP status and curl errors into retry classes.

use super::error::ChunkError;
use super::policy::ErrorClass;

/// Any non-success status is a protocol failure; it is retried within the chunk budget.
pub fn classify_http_status(_code: u32) -> ErrorClass {
    ErrorClass::Protocol
}

/// Classify a curl error for retry decisions.
pub fn classify_curl_error(e: &curl::Error) -> ErrorClass {
    if e.is_operation_timedout()
        || e.is_couldnt_connect()
        || e.is_couldnt_resolve_host()
        || e.is_couldnt_resolve_proxy()
        || e.is_read_error()
        || e.is_recv_error()
        || e.is_send_error()
        || e.is_got_nothing()
        || e.is_partial_file()
        || e.is_http2_error()
        || e.is_http2_stream_error()
        || e.is_ssl_connect_error()
    {
        return ErrorClass::Transient;
    }
    if e.is_write_error() || e.is_file_couldnt_read_file() {
        return ErrorClass::Fatal;
    }
    if e.is_url_malformed() || e.is_unsupported_protocol() {
        return ErrorClass::Fatal;
    }
    ErrorClass::Transient
}

/// Classify a chunk error into a retry class.
pub fn classify(e: &ChunkError) -> ErrorClass {
    match e {
        ChunkError::Curl(ce) => classify_curl_error(ce),
        ChunkError::Http(code) => classify_http_status(*code),
        ChunkError::PartialTransfer { .. } => ErrorClass::Transient,
        ChunkError::Storage(_) => ErrorClass::Fatal,
        ChunkError::Cancelled => ErrorClass::Cancelled,
    }
}
