//! Redis error conversion.

use kc_cluster::ClusterError;

/// Converts a `fred` Redis error to a `ClusterError`.
#[allow(clippy::needless_pass_by_value)]
pub fn from_redis_error(err: fred::error::Error) -> ClusterError {
    match err.kind() {
        fred::error::ErrorKind::Timeout => ClusterError::Timeout(err.to_string()),
        fred::error::ErrorKind::Config => ClusterError::Configuration(err.to_string()),
        _ => ClusterError::Connection(err.to_string()),
    }
}

/// Wraps a failed lock command on `key`.
#[allow(clippy::needless_pass_by_value)]
pub fn lock_error(key: &str, err: fred::error::Error) -> ClusterError {
    match err.kind() {
        fred::error::ErrorKind::IO
        | fred::error::ErrorKind::Timeout
        | fred::error::ErrorKind::Config => from_redis_error(err),
        _ => ClusterError::lock(key, err.to_string()),
    }
}
