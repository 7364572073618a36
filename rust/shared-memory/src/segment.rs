//! Segment lifecycle and attachment management
//!
//! A segment is identified by a `(key, id)` pair: the key is a stable 32-bit
//! token used to re-locate the segment from another process, the id is the
//! kernel handle valid only while the underlying object lives. Layout is
//! always `[u32 length header][payload]`, so the total kernel allocation is
//! the requested payload capacity plus [`SEGMENT_HEADER_LEN`].

use std::ffi::CString;
use std::fmt;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::ptr::NonNull;

use rand::Rng;
use tracing::{debug, warn};

use crate::error::{Result, SegmentError};
use crate::{MAX_KEY_ATTEMPTS, SEGMENT_HEADER_LEN};

/// Stable 32-bit token used to locate a segment across processes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SegmentKey(libc::key_t);

impl SegmentKey {
    /// Wrap a raw System-V key
    pub const fn from_raw(key: i32) -> Self {
        Self(key)
    }

    /// The raw key value, e.g. for sending to a peer in a control message
    pub const fn raw(&self) -> i32 {
        self.0
    }
}

impl fmt::Display for SegmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Handle to a System-V shared-memory segment.
///
/// Carries no mapping of its own; call [`attach`](Segment::attach) or
/// [`read`](Segment::read) to map the segment into this process. Dropping a
/// `Segment` releases nothing; the kernel object lives until
/// [`destroy`](Segment::destroy) and the last detach.
#[derive(Debug, Clone)]
pub struct Segment {
    key: SegmentKey,
    id: libc::c_int,
}

impl Segment {
    /// Create a segment under a key derived deterministically from
    /// `(path, project_id)`.
    ///
    /// The path must exist; `ftok` stats it. If a segment is already bound
    /// to the derived key this attaches to it instead of failing, so two
    /// cooperating processes can race this call safely.
    pub fn create(path: &Path, project_id: i32, capacity: usize) -> Result<Self> {
        let c_path =
            CString::new(path.as_os_str().as_bytes()).map_err(|_| SegmentError::KeyDerivation {
                path: path.to_path_buf(),
                source: io::Error::from(io::ErrorKind::InvalidInput),
            })?;

        let key = unsafe { libc::ftok(c_path.as_ptr(), project_id) };
        if key == -1 {
            return Err(SegmentError::KeyDerivation {
                path: path.to_path_buf(),
                source: io::Error::last_os_error(),
            });
        }

        let id = unsafe {
            libc::shmget(
                key,
                capacity + SEGMENT_HEADER_LEN,
                0o666 | libc::IPC_CREAT,
            )
        };
        if id == -1 {
            return Err(SegmentError::Create(io::Error::last_os_error()));
        }

        let segment = Self {
            key: SegmentKey(key),
            id,
        };
        debug!("created segment {} (id {})", segment.key, segment.id);
        Ok(segment)
    }

    /// Create a segment under a freshly allocated random key.
    ///
    /// Keys are tried with exclusive creation, so the returned segment is
    /// guaranteed to be newly allocated and not aliased to any pre-existing
    /// one. Gives up after [`MAX_KEY_ATTEMPTS`] collisions rather than
    /// looping forever in a pathological key space.
    pub fn create_random(capacity: usize) -> Result<Self> {
        let mut rng = rand::thread_rng();
        Self::create_random_from(capacity, || rng.gen_range(1..=libc::key_t::MAX))
    }

    /// Allocation loop behind [`Segment::create_random`], with the key source
    /// injected so collision handling stays testable.
    fn create_random_from(
        capacity: usize,
        mut next_key: impl FnMut() -> libc::key_t,
    ) -> Result<Self> {
        for _ in 0..MAX_KEY_ATTEMPTS {
            let key = SegmentKey(next_key());
            match shmget_exclusive(key, capacity)? {
                Some(id) => {
                    debug!("created segment {} (id {})", key, id);
                    return Ok(Self { key, id });
                }
                // Key already bound to a live segment, try another
                None => continue,
            }
        }
        Err(SegmentError::KeySpaceExhausted {
            attempts: MAX_KEY_ATTEMPTS,
        })
    }

    /// Look up an existing segment by key without creating one
    pub fn open(key: SegmentKey) -> Result<Self> {
        let id = unsafe { libc::shmget(key.raw(), 0, 0) };
        if id == -1 {
            warn!("no segment bound to key {}", key);
            return Err(SegmentError::NotFound(key));
        }
        Ok(Self { key, id })
    }

    /// The segment's stable key
    pub fn key(&self) -> SegmentKey {
        self.key
    }

    /// The segment's kernel handle, valid only while the object lives
    pub fn id(&self) -> i32 {
        self.id
    }

    /// Usable payload capacity in bytes, i.e. the kernel allocation minus
    /// the length header
    pub fn capacity(&self) -> Result<usize> {
        let total = stat_size(self.id)?;
        Ok(total.saturating_sub(SEGMENT_HEADER_LEN))
    }

    /// Map the segment into this process's address space.
    ///
    /// The returned guard detaches exactly once, on drop or via
    /// [`Attachment::detach`].
    pub fn attach(&self) -> Result<Attachment> {
        let capacity = self.capacity()?;
        let base = unsafe { libc::shmat(self.id, std::ptr::null(), 0) };
        if base as isize == -1 {
            return Err(SegmentError::Attach(io::Error::last_os_error()));
        }
        let base = NonNull::new(base as *mut u8)
            .ok_or_else(|| SegmentError::Attach(io::Error::from(io::ErrorKind::InvalidData)))?;
        Ok(Attachment { base, capacity })
    }

    /// Write a payload as one attach / write / detach cycle.
    ///
    /// Not atomic with respect to other processes reading concurrently;
    /// callers serialize access externally (single writer, then signal).
    pub fn write(&self, payload: &[u8]) -> Result<()> {
        let mut attachment = self.attach()?;
        attachment.write_payload(payload)?;
        attachment.detach()
    }

    /// Attach for reading, leaving the mapping alive inside the returned
    /// guard.
    ///
    /// The payload view obtained from the guard is a zero-copy alias into
    /// the segment; it stays valid until the guard is dropped or detached.
    pub fn read(&self) -> Result<Attachment> {
        self.attach()
    }

    /// Mark the segment for removal.
    ///
    /// The kernel reclaims the memory once the last attached process
    /// detaches; existing [`Attachment`]s stay valid until then.
    pub fn destroy(self) -> Result<()> {
        destroy_id(self.id)?;
        debug!("destroyed segment {} (id {})", self.key, self.id);
        Ok(())
    }

    /// Destroy this segment and create a fresh one of `new_capacity` under
    /// the same key.
    ///
    /// Destructive: payload bytes are not migrated. If the destroy fails the
    /// call aborts without creating anything, so no duplicate segment can
    /// dangle. Between destroy and create the key is briefly unbound; this
    /// manager assumes a single owner per key and does not defend the
    /// window.
    pub fn realloc(self, new_capacity: usize) -> Result<Segment> {
        let key = self.key;
        destroy_id(self.id)?;

        let id = unsafe {
            libc::shmget(
                key.raw(),
                new_capacity + SEGMENT_HEADER_LEN,
                0o666 | libc::IPC_CREAT,
            )
        };
        if id == -1 {
            return Err(SegmentError::Create(io::Error::last_os_error()));
        }
        debug!(
            "reallocated segment {} to {} payload bytes (id {})",
            key, new_capacity, id
        );
        Ok(Segment { key, id })
    }
}

/// RAII guard over one attached mapping of a segment.
///
/// Detaches exactly once: on drop (best effort, logged) or explicitly via
/// [`detach`](Attachment::detach) when the caller wants the error. Holds the
/// segment capacity so every access is bounds-checked locally.
#[derive(Debug)]
pub struct Attachment {
    base: NonNull<u8>,
    capacity: usize,
}

impl Attachment {
    /// Usable payload capacity of the attached segment
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Write the length header and payload into the attached segment.
    ///
    /// Fails fast with [`SegmentError::CapacityExceeded`] before touching
    /// memory when the payload does not fit; an oversized write can never
    /// corrupt adjacent memory.
    pub fn write_payload(&mut self, payload: &[u8]) -> Result<()> {
        if payload.len() > self.capacity {
            return Err(SegmentError::CapacityExceeded {
                needed: payload.len(),
                capacity: self.capacity,
            });
        }
        let header = (payload.len() as u32).to_ne_bytes();
        unsafe {
            std::ptr::copy_nonoverlapping(
                header.as_ptr(),
                self.base.as_ptr(),
                SEGMENT_HEADER_LEN,
            );
            std::ptr::copy_nonoverlapping(
                payload.as_ptr(),
                self.base.as_ptr().add(SEGMENT_HEADER_LEN),
                payload.len(),
            );
        }
        Ok(())
    }

    /// Zero-copy view of the payload recorded in the segment header.
    ///
    /// Valid only while this guard lives. Fails when the header claims more
    /// bytes than the segment can hold, which means the segment was never
    /// written or was written by something not speaking this layout.
    pub fn payload(&self) -> Result<&[u8]> {
        let mut header = [0u8; SEGMENT_HEADER_LEN];
        unsafe {
            std::ptr::copy_nonoverlapping(
                self.base.as_ptr(),
                header.as_mut_ptr(),
                SEGMENT_HEADER_LEN,
            );
        }
        let claimed = u32::from_ne_bytes(header) as usize;
        if claimed > self.capacity {
            return Err(SegmentError::HeaderOutOfRange {
                claimed,
                capacity: self.capacity,
            });
        }
        Ok(unsafe {
            std::slice::from_raw_parts(self.base.as_ptr().add(SEGMENT_HEADER_LEN), claimed)
        })
    }

    /// Detach explicitly, surfacing any error
    pub fn detach(self) -> Result<()> {
        let rc = unsafe { libc::shmdt(self.base.as_ptr() as *const libc::c_void) };
        std::mem::forget(self);
        if rc == -1 {
            return Err(SegmentError::Detach(io::Error::last_os_error()));
        }
        Ok(())
    }
}

impl Drop for Attachment {
    fn drop(&mut self) {
        let rc = unsafe { libc::shmdt(self.base.as_ptr() as *const libc::c_void) };
        if rc == -1 {
            warn!("could not detach segment: {}", io::Error::last_os_error());
        }
    }
}

/// Try to create a segment exclusively under `key`.
///
/// Returns `Ok(None)` when the key is already bound, so the caller can try
/// another; any other failure is a real error.
fn shmget_exclusive(key: SegmentKey, capacity: usize) -> Result<Option<libc::c_int>> {
    let id = unsafe {
        libc::shmget(
            key.raw(),
            capacity + SEGMENT_HEADER_LEN,
            0o666 | libc::IPC_CREAT | libc::IPC_EXCL,
        )
    };
    if id == -1 {
        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EEXIST) {
            return Ok(None);
        }
        return Err(SegmentError::Create(err));
    }
    Ok(Some(id))
}

fn stat_size(id: libc::c_int) -> Result<usize> {
    let mut ds: libc::shmid_ds = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::shmctl(id, libc::IPC_STAT, &mut ds) };
    if rc == -1 {
        return Err(SegmentError::Stat(io::Error::last_os_error()));
    }
    Ok(ds.shm_segsz as usize)
}

fn destroy_id(id: libc::c_int) -> Result<()> {
    let rc = unsafe { libc::shmctl(id, libc::IPC_RMID, std::ptr::null_mut()) };
    if rc == -1 {
        return Err(SegmentError::Destroy(io::Error::last_os_error()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn test_write_then_read_round_trip() {
        let segment = Segment::create_random(1024).unwrap();
        assert_eq!(segment.capacity().unwrap(), 1024);

        segment.write(b"0123456789").unwrap();

        let attachment = segment.read().unwrap();
        assert_eq!(attachment.payload().unwrap(), b"0123456789");
        drop(attachment);

        segment.destroy().unwrap();
    }

    #[test]
    fn test_open_by_key_from_second_handle() {
        let segment = Segment::create_random(64).unwrap();
        segment.write(b"shared").unwrap();

        let reopened = Segment::open(segment.key()).unwrap();
        assert_eq!(reopened.id(), segment.id());
        let attachment = reopened.read().unwrap();
        assert_eq!(attachment.payload().unwrap(), b"shared");
        drop(attachment);

        segment.destroy().unwrap();
    }

    #[test]
    fn test_ftok_keyed_create() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"anchor").unwrap();

        let segment = Segment::create(file.path(), 42, 256).unwrap();
        assert_eq!(segment.capacity().unwrap(), 256);

        // Same (path, project_id) resolves to the same segment
        let again = Segment::create(file.path(), 42, 256).unwrap();
        assert_eq!(again.key(), segment.key());
        assert_eq!(again.id(), segment.id());

        segment.destroy().unwrap();
    }

    #[test]
    fn test_checked_write_refuses_oversized_payload() {
        let segment = Segment::create_random(8).unwrap();
        let err = segment.write(&[0u8; 9]).unwrap_err();
        assert!(matches!(
            err,
            SegmentError::CapacityExceeded {
                needed: 9,
                capacity: 8
            }
        ));

        // Memory untouched: header still claims zero bytes
        let attachment = segment.read().unwrap();
        assert_eq!(attachment.payload().unwrap(), b"");
        drop(attachment);

        segment.destroy().unwrap();
    }

    #[test]
    fn test_random_key_collision_triggers_retry() {
        let occupied = Segment::create_random(32).unwrap();

        // First candidate collides with the live segment, the second is a
        // fresh random key; the loop must skip past the collision
        let mut rng = rand::thread_rng();
        let mut handed_out = 0;
        let segment = Segment::create_random_from(32, || {
            handed_out += 1;
            if handed_out == 1 {
                occupied.key().raw()
            } else {
                rng.gen_range(1..=libc::key_t::MAX)
            }
        })
        .unwrap();

        assert!(handed_out >= 2);
        assert_ne!(segment.key(), occupied.key());

        segment.destroy().unwrap();
        occupied.destroy().unwrap();
    }

    #[test]
    fn test_random_key_allocation_gives_up_after_cap() {
        let occupied = Segment::create_random(32).unwrap();

        // A key source that never escapes the collision must hit the cap
        // instead of looping forever
        let err = Segment::create_random_from(32, || occupied.key().raw()).unwrap_err();
        assert!(matches!(
            err,
            SegmentError::KeySpaceExhausted {
                attempts: MAX_KEY_ATTEMPTS
            }
        ));

        occupied.destroy().unwrap();
    }

    #[test]
    fn test_destroy_unbinds_key() {
        let segment = Segment::create_random(16).unwrap();
        let key = segment.key();
        segment.destroy().unwrap();
        assert!(matches!(
            Segment::open(key),
            Err(SegmentError::NotFound(_))
        ));
    }

    #[test]
    fn test_realloc_is_destructive() {
        let segment = Segment::create_random(64).unwrap();
        segment.write(b"old payload").unwrap();
        let key = segment.key();

        let resized = segment.realloc(4096).unwrap();
        assert_eq!(resized.key(), key);
        assert_eq!(resized.capacity().unwrap(), 4096);

        // Fresh kernel pages, not migrated content: the zeroed header reads
        // back as an empty payload
        let attachment = resized.read().unwrap();
        assert_eq!(attachment.payload().unwrap(), b"");
        drop(attachment);

        resized.destroy().unwrap();
    }

    #[test]
    fn test_header_out_of_range_is_rejected() {
        let segment = Segment::create_random(4).unwrap();
        let mut attachment = segment.attach().unwrap();
        // Forge a header claiming more payload than the segment holds
        unsafe {
            let bogus = (1024u32).to_ne_bytes();
            std::ptr::copy_nonoverlapping(
                bogus.as_ptr(),
                attachment.base.as_ptr(),
                SEGMENT_HEADER_LEN,
            );
        }
        assert!(matches!(
            attachment.payload(),
            Err(SegmentError::HeaderOutOfRange { claimed: 1024, .. })
        ));
        attachment.write_payload(b"ok").unwrap();
        assert_eq!(attachment.payload().unwrap(), b"ok");
        drop(attachment);
        segment.destroy().unwrap();
    }
}
