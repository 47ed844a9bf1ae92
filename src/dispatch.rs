//! Dispatcher owning one notification channel and the watch state built
//! on top of it.
//!
//! One dispatcher instance is designed to have its mutating calls
//! ([`add_watch`](EventDispatcher::add_watch),
//! [`rm_watch`](EventDispatcher::rm_watch),
//! [`close`](EventDispatcher::close)) invoked from a different thread
//! than the one draining [`events`](EventDispatcher::events). The shared
//! state sits behind a single lock; the blocking channel read runs
//! outside it, so mutating calls never queue behind a reader that is
//! legitimately waiting for new data. Instances are fully isolated from
//! each other: no process-wide state is shared.

use std::collections::VecDeque;
use std::ffi::{OsStr, OsString};
use std::fmt::{Display, Formatter};
use std::io;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use log::{debug, error, warn};

use crate::decode;
use crate::errors::{Error, RegistrationError};
use crate::flags::EventMask;
use crate::raw::{NotifyFd, READ_BUFFER_SIZE};
use crate::registry::WatchRegistry;
use crate::resolver::PathResolver;
use crate::tree;
use crate::watch::Watch;

/// A decoded, path-resolved notification.
#[derive(Debug, Clone)]
pub struct Event {
    /// Name of the child the event is about, `None` for events about the
    /// watched object itself.
    pub name: Option<OsString>,
    /// The event-kind bits that triggered this event.
    pub mask: EventMask,
    /// Fully resolved absolute path of the event subject.
    pub path: PathBuf,
    /// The watch this event was delivered for.
    pub watch: Watch,
    /// Correlation token linking the two halves of a rename, `0` for
    /// anything that is not a rename half.
    pub cookie: u32,
}

impl Display for Event {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "path: {:?}, mask: {}({:#x}), cookie: {}",
            self.path,
            self.mask,
            self.mask.bits(),
            self.cookie
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Open,
    Closing,
    Closed,
}

#[derive(Debug)]
struct Inner {
    registry: WatchRegistry,
    resolver: PathResolver,
    state: State,
}

impl Inner {
    fn ensure_open(&self) -> Result<(), Error> {
        if self.state == State::Open {
            Ok(())
        } else {
            Err(Error::DispatcherClosed)
        }
    }
}

/// Owner of one notification channel and sole entry point for
/// consumers.
///
/// All methods take `&self`; share an instance across threads with an
/// [`Arc`](std::sync::Arc) (or scoped threads) to drain events on one
/// thread while mutating the watch set on another.
#[derive(Debug)]
pub struct EventDispatcher {
    fd: NotifyFd,
    inner: Mutex<Inner>,
}

impl EventDispatcher {
    /// Open a new dispatcher with its own notification channel.
    ///
    /// # Errors
    /// Returns the underlying error when the channel cannot be opened.
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            fd: NotifyFd::new()?,
            inner: Mutex::new(Inner {
                registry: WatchRegistry::default(),
                resolver: PathResolver::default(),
                state: State::Open,
            }),
        })
    }

    /// Activate a single (non-recursive) watch and return it.
    ///
    /// # Errors
    /// [`Error::Registration`] when the primitive refuses the
    /// registration; [`Error::DispatcherClosed`] after
    /// [`close`](EventDispatcher::close).
    pub fn add_watch(&self, watch: Watch) -> Result<Watch, Error> {
        let mut inner = self.lock();
        inner.ensure_open()?;
        let wd = self
            .fd
            .add_watch(watch.path(), watch.mask().bits())
            .map_err(RegistrationError::from)?;
        inner.registry.register(&watch, wd);
        inner.resolver.insert(wd, watch.path().to_path_buf());
        debug!("added watch {}", watch);
        Ok(watch)
    }

    /// Mark the watch recursive, expand it over every directory
    /// currently under its root, and return it.
    ///
    /// Coverage of directories created later is extended while the
    /// event sequence is being drained; a tree watch that is never
    /// drained never observes subtree growth.
    ///
    /// # Errors
    /// Same surfacing as [`add_watch`](EventDispatcher::add_watch) for
    /// the root.
    pub fn add_tree_watch(&self, watch: Watch) -> Result<Watch, Error> {
        watch.mark_recursive();
        let mut inner = self.lock();
        inner.ensure_open()?;
        let Inner {
            registry, resolver, ..
        } = &mut *inner;
        tree::expand(&self.fd, registry, resolver, &watch)?;
        debug!("added watch {}", watch);
        Ok(watch)
    }

    /// Deactivate a watch, removing every one of its handles.
    ///
    /// Handles whose backing object is already gone are silently
    /// treated as removed.
    ///
    /// # Errors
    /// [`Error::Removal`] for any other primitive failure;
    /// [`Error::DispatcherClosed`] after
    /// [`close`](EventDispatcher::close).
    pub fn rm_watch(&self, watch: &Watch) -> Result<(), Error> {
        let mut inner = self.lock();
        inner.ensure_open()?;
        let Inner {
            registry, resolver, ..
        } = &mut *inner;
        for wd in registry.handles_of(watch) {
            resolver.remove(wd);
            registry.unregister(&self.fd, wd)?;
        }
        debug!("removed watch {}", watch);
        Ok(())
    }

    /// A lazy, logically infinite sequence of resolved events.
    ///
    /// Each pull blocks the calling thread until the channel has at
    /// least one complete record, then decodes and resolves every
    /// record currently available, extending or retiring tree coverage
    /// before the triggering record is yielded. The sequence ends only
    /// when the dispatcher is closed.
    pub fn events(&self) -> Events<'_> {
        Events {
            dispatcher: self,
            pending: VecDeque::new(),
            buf: vec![0; READ_BUFFER_SIZE],
        }
    }

    /// Tear the dispatcher down: unblock any thread currently inside a
    /// pull, best-effort-remove every remaining watch, and transition
    /// to the terminal state.
    ///
    /// Idempotent; calling it again after the dispatcher is closed is a
    /// no-op.
    pub fn close(&self) {
        let mut inner = self.lock();
        if inner.state == State::Closed {
            return;
        }
        inner.state = State::Closing;
        // The blocked read observes the channel teardown itself; no
        // cooperative check runs between reads.
        if let Err(err) = self.fd.interrupt() {
            error!("failed to signal channel teardown: {}", err);
        }
        let Inner {
            registry, resolver, ..
        } = &mut *inner;
        for wd in registry.all_handles() {
            resolver.remove(wd);
            if let Err(err) = registry.unregister(&self.fd, wd) {
                error!("failed to remove watch descriptor {} during close: {}", wd, err);
            }
        }
        resolver.discard_pending();
        inner.state = State::Closed;
        debug!("event dispatcher closed");
    }

    #[cfg(test)]
    pub(crate) fn handle_count(&self, watch: &Watch) -> usize {
        self.lock().registry.handles_of(watch).len()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Decode one read batch and run every record through the pipeline:
    /// kernel-retirement bookkeeping, owner resolution, rename
    /// correlation, tree extension/retirement, path resolution.
    fn process_batch(&self, buf: &[u8], out: &mut VecDeque<Event>) {
        let mut inner = self.lock();
        if inner.state != State::Open {
            // close() raced the read; the sequence is already terminal
            return;
        }
        let Inner {
            registry, resolver, ..
        } = &mut *inner;
        let mut count = 0_usize;
        for record in decode::records(buf) {
            count += 1;
            if record.mask.contains(EventMask::Q_OVERFLOW) {
                warn!("notification queue overflowed, events were lost");
                continue;
            }
            if record.mask.contains(EventMask::IGNORED) {
                // the kernel retired this descriptor (object deleted,
                // unmounted, or explicitly unregistered)
                registry.forget(record.wd);
                resolver.remove(record.wd);
                continue;
            }
            let Some(watch) = registry.lookup(record.wd).cloned() else {
                // stragglers for a just-retired descriptor
                debug!("dropping record for unknown descriptor {}", record.wd);
                continue;
            };
            let Some(path) = resolver.resolve(record.wd, record.name.as_deref()) else {
                debug!("dropping record with no path for descriptor {}", record.wd);
                continue;
            };

            let mut grown = Vec::new();
            if record.mask.contains(EventMask::MOVED_FROM) {
                resolver.note_moved_from(record.cookie, path.clone());
            }
            if record.mask.contains(EventMask::MOVED_TO) {
                if let Some(old_path) = resolver.take_moved_from(record.cookie) {
                    // correlated rename: every descriptor at or below the
                    // old location follows the object, no re-registration
                    resolver.apply_move(&old_path, &path);
                } else if record.mask.contains(EventMask::ISDIR) && watch.is_recursive() {
                    // a directory arrived from outside the subtree
                    if resolver.wd_at(&path).is_some() {
                        continue;
                    }
                    grown = tree::extend_on_create(&self.fd, registry, resolver, &watch, &path);
                }
            }
            if record.mask.contains(EventMask::CREATE)
                && record.mask.contains(EventMask::ISDIR)
                && watch.is_recursive()
            {
                if resolver.wd_at(&path).is_some() {
                    // an earlier extension walk already covered this
                    // directory and reported its creation
                    continue;
                }
                grown = tree::extend_on_create(&self.fd, registry, resolver, &watch, &path);
            }
            if record.mask.contains(EventMask::DELETE)
                && record.mask.contains(EventMask::ISDIR)
                && watch.is_recursive()
            {
                if let Some(gone) = resolver.wd_at(&path) {
                    tree::retire_on_delete(&self.fd, registry, resolver, gone);
                }
            }

            out.push_back(Event {
                name: record.name.clone(),
                mask: record.mask,
                path,
                watch: watch.clone(),
                cookie: record.cookie,
            });
            // directories found by the walk were created too fast for
            // the kernel to report them; yield their records in walk
            // (pre-)order right after the record that triggered it
            for dir in grown {
                out.push_back(Event {
                    name: dir.file_name().map(OsStr::to_os_string),
                    mask: EventMask::CREATE | EventMask::ISDIR,
                    path: dir,
                    watch: watch.clone(),
                    cookie: 0,
                });
            }
        }
        resolver.discard_pending();
        debug!("decoded {} record(s)", count);
    }
}

impl Drop for EventDispatcher {
    fn drop(&mut self) {
        self.close();
    }
}

/// Blocking iterator over a dispatcher's resolved events.
///
/// Returned by [`EventDispatcher::events`]. The iterator ends (yields
/// `None`) only once the dispatcher has been closed; closing from
/// another thread unblocks a pull that is waiting inside the channel
/// read.
pub struct Events<'a> {
    dispatcher: &'a EventDispatcher,
    pending: VecDeque<Event>,
    buf: Vec<u8>,
}

impl Iterator for Events<'_> {
    type Item = Event;

    fn next(&mut self) -> Option<Event> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            if self.dispatcher.lock().state != State::Open {
                return None;
            }
            let len = match self.dispatcher.fd.read_block(&mut self.buf) {
                // terminal: the channel was closed out from under us
                Ok(0) => return None,
                Ok(len) => len,
                Err(err) => {
                    error!("notification channel read failed: {}", err);
                    return None;
                }
            };
            let (buf, pending) = (&self.buf[..len], &mut self.pending);
            self.dispatcher.process_batch(buf, pending);
        }
    }
}
