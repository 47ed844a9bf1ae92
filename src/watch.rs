//! The caller-level watch request.

use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::flags::EventMask;

static NEXT_WATCH_ID: AtomicU64 = AtomicU64::new(0);

/// A description of what to monitor: an absolute path, an event-kind
/// mask, and (once handed to
/// [`add_tree_watch`](crate::dispatch::EventDispatcher::add_tree_watch))
/// whether the whole subtree is covered.
///
/// A `Watch` has reference identity: clones share one identity, and two
/// watches built from the same mask and path are distinct. Events report
/// the exact `Watch` that was registered, so a consumer can tell
/// overlapping interests apart by equality alone.
///
/// A `Watch` only becomes active through
/// [`add_watch`](crate::dispatch::EventDispatcher::add_watch) or
/// [`add_tree_watch`](crate::dispatch::EventDispatcher::add_tree_watch).
#[derive(Debug, Clone)]
pub struct Watch {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    id: u64,
    mask: EventMask,
    path: PathBuf,
    recursive: AtomicBool,
}

impl Watch {
    /// Create a new inactive watch for `path` with the given mask.
    pub fn new(mask: EventMask, path: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: NEXT_WATCH_ID.fetch_add(1, Ordering::Relaxed),
                mask,
                path: path.into(),
                recursive: AtomicBool::new(false),
            }),
        }
    }

    /// The event-kind mask this watch was built with.
    pub fn mask(&self) -> EventMask {
        self.inner.mask
    }

    /// The path this watch was built with.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Whether this watch covers its whole subtree.
    pub fn is_recursive(&self) -> bool {
        self.inner.recursive.load(Ordering::Relaxed)
    }

    pub(crate) fn id(&self) -> u64 {
        self.inner.id
    }

    pub(crate) fn mark_recursive(&self) {
        self.inner.recursive.store(true, Ordering::Relaxed);
    }
}

impl PartialEq for Watch {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Watch {}

impl std::hash::Hash for Watch {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl Display for Watch {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}{:?} ({:#x})",
            if self.is_recursive() { "tree " } else { "" },
            self.inner.path,
            self.inner.mask.bits()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::Watch;
    use crate::flags::EventMask;

    #[test]
    fn must_have_reference_identity() {
        let fst = Watch::new(EventMask::CREATE, "/tmp/foo");
        let snd = Watch::new(EventMask::CREATE, "/tmp/foo");
        assert_ne!(fst, snd);
        assert_eq!(fst, fst.clone());
    }

    #[test]
    fn must_share_recursive_flag_across_clones() {
        let watch = Watch::new(EventMask::DELETE, "/tmp/foo");
        let clone = watch.clone();
        assert!(!clone.is_recursive());
        watch.mark_recursive();
        assert!(clone.is_recursive());
    }
}
