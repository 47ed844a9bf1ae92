use std::fmt::{Display, Formatter};

bitflags::bitflags! {
  /// Event-kind bitmask used both to express interest when registering a
  /// [`Watch`](crate::watch::Watch) and to describe what happened in a
  /// delivered [`Event`](crate::dispatch::Event).
  #[repr(C)]
  pub struct EventMask: u32 {
    /// File was accessed (read).
    const ACCESS = libc::IN_ACCESS;
    /// File was modified.
    const MODIFY = libc::IN_MODIFY;
    /// Metadata changed (permissions, timestamps, ownership, ...).
    const ATTRIB = libc::IN_ATTRIB;
    /// File opened for writing was closed.
    const CLOSE_WRITE = libc::IN_CLOSE_WRITE;
    /// File not opened for writing was closed.
    const CLOSE_NOWRITE = libc::IN_CLOSE_NOWRITE;
    /// File was opened.
    const OPEN = libc::IN_OPEN;
    /// Child was moved out of a watched directory.
    const MOVED_FROM = libc::IN_MOVED_FROM;
    /// Child was moved into a watched directory.
    const MOVED_TO = libc::IN_MOVED_TO;
    /// Child was created in a watched directory.
    const CREATE = libc::IN_CREATE;
    /// Child was deleted from a watched directory.
    const DELETE = libc::IN_DELETE;
    /// The watched object itself was deleted.
    const DELETE_SELF = libc::IN_DELETE_SELF;
    /// The watched object itself was moved.
    const MOVE_SELF = libc::IN_MOVE_SELF;
    /// Either close kind.
    const CLOSE = libc::IN_CLOSE;
    /// Either move direction.
    const MOVE = libc::IN_MOVE;
    /// Every event kind a caller can register interest in.
    const ALL_EVENTS = libc::IN_ALL_EVENTS;
    /// Set by the kernel when the subject of the event is a directory.
    const ISDIR = libc::IN_ISDIR;
    /// Set by the kernel when a watch descriptor was retired.
    const IGNORED = libc::IN_IGNORED;
    /// Set by the kernel when the event queue overflowed.
    const Q_OVERFLOW = libc::IN_Q_OVERFLOW;
    /// Set by the kernel when the backing filesystem was unmounted.
    const UNMOUNT = libc::IN_UNMOUNT;
  }
}

impl Display for EventMask {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        if self.contains(Self::ACCESS) {
            let _d = write!(f, "ACCESS ");
        }
        if self.contains(Self::MODIFY) {
            let _d = write!(f, "MODIFY ");
        }
        if self.contains(Self::ATTRIB) {
            let _d = write!(f, "ATTRIB ");
        }
        if self.contains(Self::CLOSE_WRITE) {
            let _d = write!(f, "CLOSE_WRITE ");
        }
        if self.contains(Self::CLOSE_NOWRITE) {
            let _d = write!(f, "CLOSE_NOWRITE ");
        }
        if self.contains(Self::OPEN) {
            let _d = write!(f, "OPEN ");
        }
        if self.contains(Self::MOVED_FROM) {
            let _d = write!(f, "MOVED_FROM ");
        }
        if self.contains(Self::MOVED_TO) {
            let _d = write!(f, "MOVED_TO ");
        }
        if self.contains(Self::CREATE) {
            let _d = write!(f, "CREATE ");
        }
        if self.contains(Self::DELETE) {
            let _d = write!(f, "DELETE ");
        }
        if self.contains(Self::DELETE_SELF) {
            let _d = write!(f, "DELETE_SELF ");
        }
        if self.contains(Self::MOVE_SELF) {
            let _d = write!(f, "MOVE_SELF ");
        }
        if self.contains(Self::ISDIR) {
            let _d = write!(f, "ISDIR ");
        }
        if self.contains(Self::IGNORED) {
            let _d = write!(f, "IGNORED ");
        }
        if self.contains(Self::Q_OVERFLOW) {
            let _d = write!(f, "Q_OVERFLOW ");
        }
        if self.contains(Self::UNMOUNT) {
            let _d = write!(f, "UNMOUNT ");
        }
        write!(f, "")
    }
}
