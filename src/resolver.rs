//! Descriptor-to-path resolution and rename correlation.
//!
//! Each live descriptor maps to the current absolute path of its backing
//! directory or file. A correlated rename pair (MOVED_FROM/MOVED_TO
//! sharing a cookie) rewrites the stored path of the moved object's
//! descriptor, and of every descriptor nested beneath it, in place — no
//! re-registration takes place. Pending half-renames only live for one
//! drain cycle's worth of records: a move that leaves the watched
//! subtree never produces its MOVED_TO half.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use crate::raw::Wd;

#[derive(Debug, Default)]
pub(crate) struct PathResolver {
    paths: HashMap<Wd, PathBuf>,
    pending_moves: HashMap<u32, PathBuf>,
}

impl PathResolver {
    pub fn insert(&mut self, wd: Wd, path: PathBuf) {
        self.paths.insert(wd, path);
    }

    pub fn remove(&mut self, wd: Wd) -> Option<PathBuf> {
        self.paths.remove(&wd)
    }

    /// Full path of the event subject: the descriptor's path joined with
    /// the child name, or the descriptor's path alone for events about
    /// the watched object itself.
    pub fn resolve(&self, wd: Wd, name: Option<&OsStr>) -> Option<PathBuf> {
        let base = self.paths.get(&wd)?;
        Some(match name {
            Some(name) => base.join(name),
            None => base.clone(),
        })
    }

    /// The descriptor currently registered at exactly `path`, if any.
    pub fn wd_at(&self, path: &Path) -> Option<Wd> {
        self.paths
            .iter()
            .find(|(_, covered)| covered.as_path() == path)
            .map(|(wd, _)| *wd)
    }

    /// Record the first half of a rename.
    pub fn note_moved_from(&mut self, cookie: u32, old_path: PathBuf) {
        self.pending_moves.insert(cookie, old_path);
    }

    /// Consume the pending half matching `cookie`, if one was seen.
    pub fn take_moved_from(&mut self, cookie: u32) -> Option<PathBuf> {
        self.pending_moves.remove(&cookie)
    }

    /// Drop pending halves whose counterpart did not arrive within the
    /// current drain cycle.
    pub fn discard_pending(&mut self) {
        self.pending_moves.clear();
    }

    /// Rewrite the stored path of every descriptor at or below
    /// `old_prefix` to its location under `new_prefix`.
    pub fn apply_move(&mut self, old_prefix: &Path, new_prefix: &Path) -> usize {
        let mut rewritten = 0;
        for path in self.paths.values_mut() {
            if let Ok(rest) = path.strip_prefix(old_prefix) {
                *path = if rest.as_os_str().is_empty() {
                    new_prefix.to_path_buf()
                } else {
                    new_prefix.join(rest)
                };
                rewritten += 1;
            }
        }
        rewritten
    }
}

#[cfg(test)]
mod tests {
    use std::ffi::OsStr;
    use std::path::{Path, PathBuf};

    use super::PathResolver;

    #[test]
    fn must_resolve_child_and_self_paths() {
        let mut resolver = PathResolver::default();
        resolver.insert(1, PathBuf::from("/tmp/foo"));
        assert_eq!(
            resolver.resolve(1, Some(OsStr::new("bar"))),
            Some(PathBuf::from("/tmp/foo/bar"))
        );
        assert_eq!(resolver.resolve(1, None), Some(PathBuf::from("/tmp/foo")));
        assert_eq!(resolver.resolve(2, None), None);
    }

    #[test]
    fn must_rewrite_nested_paths_on_move() {
        let mut resolver = PathResolver::default();
        resolver.insert(1, PathBuf::from("/tmp/root"));
        resolver.insert(2, PathBuf::from("/tmp/root/old"));
        resolver.insert(3, PathBuf::from("/tmp/root/old/nested"));
        resolver.insert(4, PathBuf::from("/tmp/root/other"));

        let rewritten =
            resolver.apply_move(Path::new("/tmp/root/old"), Path::new("/tmp/root/new"));
        assert_eq!(rewritten, 2);
        assert_eq!(resolver.resolve(2, None), Some(PathBuf::from("/tmp/root/new")));
        assert_eq!(
            resolver.resolve(3, None),
            Some(PathBuf::from("/tmp/root/new/nested"))
        );
        assert_eq!(resolver.resolve(4, None), Some(PathBuf::from("/tmp/root/other")));
    }

    #[test]
    fn must_expire_pending_halves_per_cycle() {
        let mut resolver = PathResolver::default();
        resolver.note_moved_from(42, PathBuf::from("/tmp/root/old"));
        resolver.discard_pending();
        assert_eq!(resolver.take_moved_from(42), None);
    }

    #[test]
    fn must_find_descriptor_by_exact_path() {
        let mut resolver = PathResolver::default();
        resolver.insert(9, PathBuf::from("/tmp/root/sub"));
        assert_eq!(resolver.wd_at(Path::new("/tmp/root/sub")), Some(9));
        assert_eq!(resolver.wd_at(Path::new("/tmp/root")), None);
    }
}
