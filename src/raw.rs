//! Raw inotify notification channel.
//!
//! Everything the crate knows about the kernel primitive lives here: the
//! channel is opened with `inotify_init1`, registrations are plain
//! `inotify_add_watch`/`inotify_rm_watch` calls, and records are obtained
//! by blocking reads on the descriptor. A second descriptor (an eventfd)
//! is bundled with the channel so that [`interrupt`](NotifyFd::interrupt)
//! can force every current and future [`read_block`](NotifyFd::read_block)
//! to observe a terminal condition: the blocked wait itself sees the
//! teardown instead of checking a flag between reads.

use std::ffi::CString;
use std::io;
use std::os::raw::c_int;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

/// Kernel watch descriptor identifying one concrete (path, mask)
/// registration on a channel.
pub type Wd = c_int;

/// Size of the buffer handed to each blocking read. Large enough for a
/// batch of records; a single record is at most
/// `sizeof(inotify_event) + NAME_MAX + 1` = 272 bytes.
pub(crate) const READ_BUFFER_SIZE: usize = 4096;

/// An open inotify channel plus its wake descriptor.
///
/// The kernel guarantees whole-record alignment per read: a read returns
/// zero or more complete records and a record never spans two reads.
#[derive(Debug)]
pub struct NotifyFd {
    inotify: c_int,
    wake: c_int,
}

impl NotifyFd {
    /// Open a new notification channel.
    ///
    /// # Errors
    /// Returns the underlying error when either descriptor cannot be
    /// allocated (e.g. the per-user inotify instance limit is reached).
    pub fn new() -> io::Result<Self> {
        let inotify = unsafe { libc::inotify_init1(libc::IN_CLOEXEC) };
        if inotify < 0 {
            return Err(io::Error::last_os_error());
        }
        let wake = unsafe { libc::eventfd(0, libc::EFD_CLOEXEC) };
        if wake < 0 {
            let err = io::Error::last_os_error();
            unsafe { libc::close(inotify) };
            return Err(err);
        }
        Ok(Self { inotify, wake })
    }

    /// Register interest in `path` with the given event-kind mask,
    /// returning the kernel's watch descriptor.
    ///
    /// Registering a path whose inode is already watched on this channel
    /// returns the existing descriptor.
    ///
    /// # Errors
    /// Returns the underlying error when the kernel refuses the
    /// registration (missing path, permission, watch limit, ...).
    pub fn add_watch(&self, path: &Path, mask: u32) -> io::Result<Wd> {
        let path = CString::new(path.as_os_str().as_bytes())
            .map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))?;
        let wd = unsafe { libc::inotify_add_watch(self.inotify, path.as_ptr(), mask) };
        if wd < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(wd)
        }
    }

    /// Unregister a watch descriptor.
    ///
    /// # Errors
    /// Returns the underlying error; `EINVAL` means the kernel already
    /// retired the descriptor (its backing object is gone).
    pub fn rm_watch(&self, wd: Wd) -> io::Result<()> {
        if unsafe { libc::inotify_rm_watch(self.inotify, wd) } < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }

    /// Block until the channel has at least one complete record, then
    /// read every record currently available into `buf`.
    ///
    /// Returns `Ok(0)` once [`interrupt`](NotifyFd::interrupt) has been
    /// called; the channel is terminal from that point on and every
    /// subsequent call returns `Ok(0)` immediately.
    ///
    /// # Errors
    /// Returns the underlying error for any failure other than an
    /// interrupted syscall, which is retried.
    pub fn read_block(&self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let mut fds = [
                libc::pollfd {
                    fd: self.inotify,
                    events: libc::POLLIN,
                    revents: 0,
                },
                libc::pollfd {
                    fd: self.wake,
                    events: libc::POLLIN,
                    revents: 0,
                },
            ];
            let rc = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, -1) };
            if rc < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err);
            }
            // The wake side is checked first: records still queued at
            // teardown time are discarded, not delivered.
            if fds[1].revents & libc::POLLIN != 0 {
                return Ok(0);
            }
            if fds[0].revents & (libc::POLLIN | libc::POLLERR | libc::POLLHUP) != 0 {
                let n = unsafe { libc::read(self.inotify, buf.as_mut_ptr().cast(), buf.len()) };
                if n < 0 {
                    let err = io::Error::last_os_error();
                    match err.kind() {
                        io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock => continue,
                        _ => return Err(err),
                    }
                }
                return Ok(n as usize);
            }
        }
    }

    /// Transition the channel to its terminal state.
    ///
    /// The eventfd value is never drained, so one write is enough to make
    /// every in-flight and future [`read_block`](NotifyFd::read_block)
    /// return `Ok(0)`.
    ///
    /// # Errors
    /// Returns the underlying error when the wake write fails.
    pub fn interrupt(&self) -> io::Result<()> {
        let one: u64 = 1;
        let n = unsafe { libc::write(self.wake, (&one as *const u64).cast(), 8) };
        if n < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }
}

impl Drop for NotifyFd {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.inotify);
            libc::close(self.wake);
        }
    }
}
