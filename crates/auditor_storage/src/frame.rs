//! Length-prefixed, checksummed frames over a [`StorageBackend`].
//!
//! Frame layout (little-endian):
//!
//! ```text
//! | payload_len: u32 | payload: [u8; payload_len] | crc32: u32 |
//! ```
//!
//! The CRC covers the length field and the payload. A frame cut short by a
//! crash is the torn tail: it is dropped and truncated away on open. A
//! complete frame whose checksum does not match is corruption and fails the
//! open.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use tracing::{debug, warn};

const LEN_SIZE: usize = 4;
const CRC_SIZE: usize = 4;

/// Bytes added around every payload.
pub const FRAME_OVERHEAD: usize = LEN_SIZE + CRC_SIZE;

/// An append-only log of opaque frames.
pub struct FrameLog {
    backend: Box<dyn StorageBackend>,
}

impl FrameLog {
    /// Opens a log over `backend`, returning it with every intact frame.
    ///
    /// A partial frame at the end is truncated away.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::ChecksumMismatch`] if a complete frame is
    /// corrupted, or any backend error.
    pub fn open(mut backend: Box<dyn StorageBackend>) -> StorageResult<(Self, Vec<Vec<u8>>)> {
        let (frames, valid_len) = scan(backend.as_ref())?;
        let size = backend.size()?;
        if valid_len < size {
            warn!(
                dropped = size - valid_len,
                "truncating partially written frame"
            );
            backend.truncate(valid_len)?;
        }
        debug!(frames = frames.len(), "frame log opened");
        Ok((Self { backend }, frames))
    }

    /// Appends one frame and syncs it. Returns the frame's offset.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is too large or the backend fails.
    pub fn append(&mut self, payload: &[u8]) -> StorageResult<u64> {
        let len = u32::try_from(payload.len()).map_err(|_| {
            StorageError::Corrupted(format!("frame payload too large: {}", payload.len()))
        })?;

        let mut frame = Vec::with_capacity(payload.len() + FRAME_OVERHEAD);
        frame.extend_from_slice(&len.to_le_bytes());
        frame.extend_from_slice(payload);
        let crc = crc32fast::hash(&frame);
        frame.extend_from_slice(&crc.to_le_bytes());

        let offset = self.backend.append(&frame)?;
        self.backend.sync()?;
        Ok(offset)
    }

    /// Reads every frame currently in the log.
    ///
    /// # Errors
    ///
    /// Returns an error if a frame is corrupted or the backend fails.
    pub fn frames(&self) -> StorageResult<Vec<Vec<u8>>> {
        scan(self.backend.as_ref()).map(|(frames, _)| frames)
    }

    /// Size of the underlying store in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot report its size.
    pub fn size(&self) -> StorageResult<u64> {
        self.backend.size()
    }
}

impl std::fmt::Debug for FrameLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameLog").finish_non_exhaustive()
    }
}

/// Returns intact frames and the byte length they cover.
fn scan(backend: &dyn StorageBackend) -> StorageResult<(Vec<Vec<u8>>, u64)> {
    let size = backend.size()?;
    let mut frames = Vec::new();
    let mut offset = 0u64;

    while size - offset >= FRAME_OVERHEAD as u64 {
        let len_bytes = backend.read_at(offset, LEN_SIZE)?;
        let payload_len = u32::from_le_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]]);
        let frame_len = FRAME_OVERHEAD as u64 + u64::from(payload_len);
        if size - offset < frame_len {
            break;
        }

        #[allow(clippy::cast_possible_truncation)]
        let frame = backend.read_at(offset, frame_len as usize)?;
        let body_len = frame.len() - CRC_SIZE;
        let stored = u32::from_le_bytes([
            frame[body_len],
            frame[body_len + 1],
            frame[body_len + 2],
            frame[body_len + 3],
        ]);
        let computed = crc32fast::hash(&frame[..body_len]);
        if stored != computed {
            return Err(StorageError::ChecksumMismatch {
                offset,
                expected: stored,
                actual: computed,
            });
        }

        frames.push(frame[LEN_SIZE..body_len].to_vec());
        offset += frame_len;
    }

    Ok((frames, offset))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FileBackend, InMemoryBackend};
    use proptest::prelude::*;
    use tempfile::tempdir;

    #[test]
    fn empty_log_replays_nothing() {
        let (log, frames) = FrameLog::open(Box::new(InMemoryBackend::new())).unwrap();
        assert!(frames.is_empty());
        assert_eq!(log.size().unwrap(), 0);
    }

    #[test]
    fn frames_replay_after_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("docs.log");

        {
            let backend = FileBackend::open(&path).unwrap();
            let (mut log, _) = FrameLog::open(Box::new(backend)).unwrap();
            log.append(b"login").unwrap();
            log.append(b"").unwrap();
            log.append(b"logout").unwrap();
        }

        let (_, frames) = FrameLog::open(Box::new(FileBackend::open(&path).unwrap())).unwrap();
        assert_eq!(frames, vec![b"login".to_vec(), Vec::new(), b"logout".to_vec()]);
    }

    fn encoded(payload: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        bytes.extend_from_slice(payload);
        let crc = crc32fast::hash(&bytes);
        bytes.extend_from_slice(&crc.to_le_bytes());
        bytes
    }

    #[test]
    fn torn_tail_is_truncated() {
        let mut bytes = encoded(b"complete");
        let intact = bytes.len() as u64;
        // half of a second frame: header claims 20 bytes, only 4 present
        bytes.extend_from_slice(&20u32.to_le_bytes());
        bytes.extend_from_slice(b"torn");

        let (log, frames) = FrameLog::open(Box::new(InMemoryBackend::with_data(bytes))).unwrap();
        assert_eq!(frames, vec![b"complete".to_vec()]);
        assert_eq!(log.size().unwrap(), intact);
    }

    #[test]
    fn append_matches_frame_layout() {
        let (mut log, _) = FrameLog::open(Box::new(InMemoryBackend::new())).unwrap();
        log.append(b"complete").unwrap();
        assert_eq!(log.size().unwrap(), encoded(b"complete").len() as u64);
    }

    #[test]
    fn flipped_byte_is_detected() {
        let mut bytes = encoded(b"login");
        bytes[6] ^= 0x01;

        let result = FrameLog::open(Box::new(InMemoryBackend::with_data(bytes)));
        assert!(matches!(
            result,
            Err(StorageError::ChecksumMismatch { offset: 0, .. })
        ));
    }

    proptest! {
        #[test]
        fn appended_frames_read_back_in_order(
            payloads in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 0..16)
        ) {
            let (mut log, _) = FrameLog::open(Box::new(InMemoryBackend::new())).unwrap();
            for payload in &payloads {
                log.append(payload).unwrap();
            }
            prop_assert_eq!(log.frames().unwrap(), payloads);
        }
    }
}
