//! Bidirectional index between watch descriptors and their owning
//! watches.
//!
//! Every live descriptor belongs to exactly one [`Watch`]; a recursive
//! watch owns one descriptor per directory under its root. All
//! operations are pure bookkeeping and never block.

use std::collections::{HashMap, HashSet};

use crate::errors::RemovalError;
use crate::raw::{NotifyFd, Wd};
use crate::watch::Watch;

#[derive(Debug, Default)]
pub(crate) struct WatchRegistry {
    by_wd: HashMap<Wd, Watch>,
    by_watch: HashMap<u64, HashSet<Wd>>,
}

impl WatchRegistry {
    /// Associate a freshly obtained descriptor with its owning watch.
    pub fn register(&mut self, watch: &Watch, wd: Wd) {
        self.by_wd.insert(wd, watch.clone());
        self.by_watch.entry(watch.id()).or_default().insert(wd);
    }

    /// The watch owning `wd`, if the descriptor is still known.
    pub fn lookup(&self, wd: Wd) -> Option<&Watch> {
        self.by_wd.get(&wd)
    }

    /// Every descriptor currently owned by `watch`.
    pub fn handles_of(&self, watch: &Watch) -> Vec<Wd> {
        self.by_watch
            .get(&watch.id())
            .map(|wds| wds.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Every descriptor known to the registry.
    pub fn all_handles(&self) -> Vec<Wd> {
        self.by_wd.keys().copied().collect()
    }

    /// Drop the bookkeeping for a descriptor the kernel retired itself.
    pub fn forget(&mut self, wd: Wd) -> Option<Watch> {
        let watch = self.by_wd.remove(&wd)?;
        if let Some(wds) = self.by_watch.get_mut(&watch.id()) {
            wds.remove(&wd);
            if wds.is_empty() {
                self.by_watch.remove(&watch.id());
            }
        }
        Some(watch)
    }

    /// Remove the association and request removal from the primitive.
    ///
    /// `EINVAL` means the kernel already retired the descriptor because
    /// its backing object vanished; that is the expected steady state
    /// after an external deletion and is treated as success.
    ///
    /// # Errors
    /// Any other primitive failure is surfaced as a [`RemovalError`].
    pub fn unregister(&mut self, fd: &NotifyFd, wd: Wd) -> Result<(), RemovalError> {
        self.forget(wd);
        match fd.rm_watch(wd) {
            Ok(()) => Ok(()),
            Err(err) if err.raw_os_error() == Some(libc::EINVAL) => Ok(()),
            Err(err) => Err(RemovalError(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::WatchRegistry;
    use crate::flags::EventMask;
    use crate::watch::Watch;

    #[test]
    fn must_keep_handle_sets_disjoint() {
        let mut registry = WatchRegistry::default();
        let fst = Watch::new(EventMask::CREATE, "/tmp/fst");
        let snd = Watch::new(EventMask::CREATE, "/tmp/snd");
        registry.register(&fst, 1);
        registry.register(&fst, 2);
        registry.register(&snd, 3);

        assert_eq!(registry.lookup(1), Some(&fst));
        assert_eq!(registry.lookup(3), Some(&snd));
        let mut fst_wds = registry.handles_of(&fst);
        fst_wds.sort_unstable();
        assert_eq!(fst_wds, vec![1, 2]);
        assert_eq!(registry.handles_of(&snd), vec![3]);
    }

    #[test]
    fn must_forget_retired_descriptors() {
        let mut registry = WatchRegistry::default();
        let watch = Watch::new(EventMask::DELETE, "/tmp/foo");
        registry.register(&watch, 5);
        assert_eq!(registry.forget(5), Some(watch.clone()));
        assert_eq!(registry.lookup(5), None);
        assert!(registry.handles_of(&watch).is_empty());
        assert_eq!(registry.forget(5), None);
    }
}
