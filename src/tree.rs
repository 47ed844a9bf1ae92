//! Recursive expansion of tree watches.
//!
//! A tree watch is one registration per directory under its root. The
//! initial expansion walks the subtree as it exists at call time; later
//! growth is discovered reactively, while the event sequence is being
//! drained, by walking each newly created directory before its creation
//! record is yielded. A directory and its descendants are often created
//! as one non-atomic burst, so by the time a directory's own creation
//! record is processed it may already contain populated children; the
//! walk picks those up and reports them so the dispatcher can synthesize
//! the creation records the kernel never produced for them.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, error};

use crate::errors::RegistrationError;
use crate::raw::{NotifyFd, Wd};
use crate::registry::WatchRegistry;
use crate::resolver::PathResolver;
use crate::watch::Watch;

/// Expand a recursive watch over the subtree rooted at its path,
/// registering every directory (root included) with the watch's mask.
///
/// Returns once coverage matches the subtree snapshot at call time.
///
/// # Errors
/// A failure to register the root is surfaced as-is; a descendant that
/// vanishes mid-walk is skipped, any other descendant failure
/// propagates.
pub(crate) fn expand(
    fd: &NotifyFd,
    registry: &mut WatchRegistry,
    resolver: &mut PathResolver,
    watch: &Watch,
) -> Result<(), RegistrationError> {
    let root = watch.path().to_path_buf();
    let wd = fd
        .add_watch(&root, watch.mask().bits())
        .map_err(RegistrationError::from)?;
    registry.register(watch, wd);
    resolver.insert(wd, root.clone());
    walk_below(fd, registry, resolver, watch, &root, &mut Vec::new())
}

/// Extend coverage onto a directory that just appeared under a
/// recursive watch, then walk its current contents.
///
/// Returns the descendant directories that were newly covered by the
/// walk, in pre-order; each of those was created too fast for the
/// kernel to report it under an already-registered parent, so the
/// dispatcher owes the consumer a synthesized creation record for it.
/// Failures here cannot be surfaced to any caller (there is no error
/// channel in the event sequence), so they are logged and coverage is
/// left incomplete.
pub(crate) fn extend_on_create(
    fd: &NotifyFd,
    registry: &mut WatchRegistry,
    resolver: &mut PathResolver,
    watch: &Watch,
    dir: &Path,
) -> Vec<PathBuf> {
    let mut discovered = Vec::new();
    match register_if_uncovered(fd, registry, resolver, watch, dir) {
        Ok(true) => {
            if let Err(err) = walk_below(fd, registry, resolver, watch, dir, &mut discovered) {
                error!("tree extension below {:?} is incomplete: {}", dir, err);
            }
        }
        Ok(false) => {}
        Err(err) => error!("failed to extend tree watch onto {:?}: {}", dir, err),
    }
    discovered
}

/// Retire the descriptor of a directory reported deleted.
///
/// The kernel usually retires a descriptor itself once its backing
/// object vanishes, so "already gone" is expected and ignored; the
/// bookkeeping is dropped immediately either way so a fast recreate of
/// the same name is seen as fresh coverage.
pub(crate) fn retire_on_delete(
    fd: &NotifyFd,
    registry: &mut WatchRegistry,
    resolver: &mut PathResolver,
    wd: Wd,
) {
    resolver.remove(wd);
    if let Err(err) = registry.unregister(fd, wd) {
        error!("failed to retire watch descriptor {}: {}", wd, err);
    }
}

/// Pre-order registration of every directory strictly below `dir`,
/// recording each newly covered one in `discovered`.
fn walk_below(
    fd: &NotifyFd,
    registry: &mut WatchRegistry,
    resolver: &mut PathResolver,
    watch: &Watch,
    dir: &Path,
    discovered: &mut Vec<PathBuf>,
) -> Result<(), RegistrationError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        // the directory was removed between its discovery and this walk
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(RegistrationError::from(err)),
    };
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
            Err(err) => return Err(RegistrationError::from(err)),
        };
        if !entry.file_type().map(|kind| kind.is_dir()).unwrap_or(false) {
            continue;
        }
        let path = entry.path();
        if register_if_uncovered(fd, registry, resolver, watch, &path)? {
            discovered.push(path.clone());
        }
        walk_below(fd, registry, resolver, watch, &path, discovered)?;
    }
    Ok(())
}

/// Register `dir` against `watch` unless a descriptor already covers it.
/// Returns whether a new registration took place.
fn register_if_uncovered(
    fd: &NotifyFd,
    registry: &mut WatchRegistry,
    resolver: &mut PathResolver,
    watch: &Watch,
    dir: &Path,
) -> Result<bool, RegistrationError> {
    if resolver.wd_at(dir).is_some() {
        return Ok(false);
    }
    match fd.add_watch(dir, watch.mask().bits()) {
        Ok(wd) => {
            registry.register(watch, wd);
            resolver.insert(wd, dir.to_path_buf());
            Ok(true)
        }
        Err(err) if err.raw_os_error() == Some(libc::ENOENT) => {
            debug!("directory vanished before registration: {:?}", dir);
            Ok(false)
        }
        Err(err) => Err(RegistrationError::from(err)),
    }
}
