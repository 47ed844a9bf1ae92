//! Error taxonomy for dispatcher operations.
//!
//! Registration and removal failures are local to the call that caused
//! them; there is no background error channel. A caller that ignores a
//! [`RegistrationError`] simply holds a watch that never became active.

use std::io;

use thiserror::Error;

/// The primitive refused a registration.
///
/// Raised synchronously from
/// [`add_watch`](crate::dispatch::EventDispatcher::add_watch) and
/// [`add_tree_watch`](crate::dispatch::EventDispatcher::add_tree_watch),
/// never deferred into the event sequence.
#[derive(Debug, Error)]
pub enum RegistrationError {
    /// The watch target does not exist.
    #[error("watch target not found")]
    NotFound(#[source] io::Error),
    /// The watch target is not readable by this process.
    #[error("permission denied for watch target")]
    PermissionDenied(#[source] io::Error),
    /// A kernel limit (watch count, instance count, memory) was hit.
    #[error("notification resource limit exceeded")]
    ResourceLimitExceeded(#[source] io::Error),
    /// The registration request itself was malformed.
    #[error("invalid watch registration")]
    InvalidArgument(#[source] io::Error),
}

impl From<io::Error> for RegistrationError {
    fn from(err: io::Error) -> Self {
        match err.raw_os_error() {
            Some(libc::ENOENT | libc::ENOTDIR) => Self::NotFound(err),
            Some(libc::EACCES | libc::EPERM) => Self::PermissionDenied(err),
            Some(libc::ENOSPC | libc::ENOMEM | libc::EMFILE | libc::ENFILE) => {
                Self::ResourceLimitExceeded(err)
            }
            _ => Self::InvalidArgument(err),
        }
    }
}

/// Unregistering a handle failed for a reason other than its backing
/// object being gone already; that case is the expected steady state
/// after an external deletion and is silently treated as success.
#[derive(Debug, Error)]
#[error("failed to unregister watch descriptor")]
pub struct RemovalError(#[from] pub io::Error);

/// The surface error type of all mutating dispatcher calls.
#[derive(Debug, Error)]
pub enum Error {
    /// The dispatcher reached its terminal state; no further mutation is
    /// valid.
    #[error("event dispatcher is closed")]
    DispatcherClosed,
    #[error(transparent)]
    Registration(#[from] RegistrationError),
    #[error(transparent)]
    Removal(#[from] RemovalError),
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::RegistrationError;

    fn errno(code: i32) -> io::Error {
        io::Error::from_raw_os_error(code)
    }

    #[test]
    fn must_map_errno_to_kind() {
        assert!(matches!(
            RegistrationError::from(errno(libc::ENOENT)),
            RegistrationError::NotFound(_)
        ));
        assert!(matches!(
            RegistrationError::from(errno(libc::EACCES)),
            RegistrationError::PermissionDenied(_)
        ));
        assert!(matches!(
            RegistrationError::from(errno(libc::ENOSPC)),
            RegistrationError::ResourceLimitExceeded(_)
        ));
        assert!(matches!(
            RegistrationError::from(errno(libc::EINVAL)),
            RegistrationError::InvalidArgument(_)
        ));
    }
}
