//! Process-shared result state over a memory-mapped file.
//!
//! The region is the only mutable resource shared between the decode worker
//! and its readers. It holds a fixed header (magic, version, slot shapes),
//! three word-sized flags, a sequence counter, and two packed `f64` slots:
//! the probability vector and the latest feature frame.
//!
//! Flag discipline — each flag has one writer role per phase, so no mutex
//! is needed on the hot path:
//!
//! * `running`: raised by the worker once initialized, cleared by the worker
//!   on exit; cleared by the controlling process to request a cooperative
//!   stop.
//! * `unread`: raised by the worker after each publication, cleared by the
//!   reader when it consumes the slot.
//! * `frame_request`: raised by a reader, cleared by the worker after it has
//!   copied the latest frame into the slot.
//!
//! A whole float vector cannot be stored atomically, so the probability slot
//! is guarded by a sequence word: odd while a write is in flight, bumped to
//! even when it completes. Readers retry on an odd or moved sequence and
//! therefore observe either the previous or the newest vector, never a torn
//! one. The feature slot needs no sequence because the request/clear
//! handshake already serializes access.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::atomic::{fence, AtomicU32, AtomicU64, Ordering};

use memmap2::MmapMut;
use thiserror::Error;

use crate::features::FrameShape;

const MAGIC: u64 = u64::from_le_bytes(*b"CXLKSHM\0");
const VERSION: u32 = 1;

const OFF_MAGIC: usize = 0;
const OFF_VERSION: usize = 8;
const OFF_N_LABELS: usize = 12;
const OFF_FRAME_ROWS: usize = 16;
const OFF_FRAME_COLS: usize = 20;
const OFF_RUNNING: usize = 24;
const OFF_UNREAD: usize = 28;
const OFF_FRAME_REQ: usize = 32;
const OFF_PROB_SEQ: usize = 40;
const HEADER_LEN: usize = 64;

#[derive(Error, Debug)]
pub enum ShmError {
    #[error("shared region I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("{path} is not a cortexlink shared region")]
    BadMagic { path: PathBuf },

    #[error("shared region version {found} unsupported (expected {expected})")]
    BadVersion { found: u32, expected: u32 },

    #[error("shared region truncated: {len} bytes, need {need}")]
    Truncated { len: usize, need: usize },
}

/// One mapping of the shared result state. The daemon and the worker each
/// hold their own mapping of the same file; a mapping grants both reader
/// and writer operations, and the roles above say who calls what.
pub struct SharedResultRegion {
    map: MmapMut,
    n_labels: usize,
    frame_shape: Option<FrameShape>,
}

fn region_size(n_labels: usize, frame_shape: Option<FrameShape>) -> usize {
    HEADER_LEN + n_labels * 8 + frame_shape.map_or(0, |s| s.len() * 8)
}

impl SharedResultRegion {
    /// Create and initialize a region file sized exactly to the given
    /// shapes. The probability slot starts as the uniform prior and is
    /// marked already-read; all flags start low.
    pub fn create(
        path: &Path,
        n_labels: usize,
        frame_shape: Option<FrameShape>,
    ) -> Result<Self, ShmError> {
        assert!(n_labels >= 2, "a probability slot needs at least two labels");
        let size = region_size(n_labels, frame_shape);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(size as u64)?;
        let mut map = unsafe { MmapMut::map_mut(&file)? };

        map[OFF_MAGIC..OFF_MAGIC + 8].copy_from_slice(&MAGIC.to_le_bytes());
        map[OFF_VERSION..OFF_VERSION + 4].copy_from_slice(&VERSION.to_le_bytes());
        map[OFF_N_LABELS..OFF_N_LABELS + 4].copy_from_slice(&(n_labels as u32).to_le_bytes());
        let (rows, cols) = frame_shape.map_or((0, 0), |s| (s.rows as u32, s.cols as u32));
        map[OFF_FRAME_ROWS..OFF_FRAME_ROWS + 4].copy_from_slice(&rows.to_le_bytes());
        map[OFF_FRAME_COLS..OFF_FRAME_COLS + 4].copy_from_slice(&cols.to_le_bytes());

        let mut region = Self {
            map,
            n_labels,
            frame_shape,
        };
        let prior = vec![1.0 / n_labels as f64; n_labels];
        region.write_floats(HEADER_LEN, &prior);
        region.flag(OFF_UNREAD).store(0, Ordering::Release);
        Ok(region)
    }

    /// Map an existing region file, validating magic and version and
    /// reading the slot shapes back out of the header.
    pub fn open(path: &Path) -> Result<Self, ShmError> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let map = unsafe { MmapMut::map_mut(&file)? };
        if map.len() < HEADER_LEN {
            return Err(ShmError::Truncated {
                len: map.len(),
                need: HEADER_LEN,
            });
        }
        let magic = u64::from_le_bytes(map[OFF_MAGIC..OFF_MAGIC + 8].try_into().unwrap());
        if magic != MAGIC {
            return Err(ShmError::BadMagic {
                path: path.to_path_buf(),
            });
        }
        let version = u32::from_le_bytes(map[OFF_VERSION..OFF_VERSION + 4].try_into().unwrap());
        if version != VERSION {
            return Err(ShmError::BadVersion {
                found: version,
                expected: VERSION,
            });
        }
        let n_labels =
            u32::from_le_bytes(map[OFF_N_LABELS..OFF_N_LABELS + 4].try_into().unwrap()) as usize;
        let rows =
            u32::from_le_bytes(map[OFF_FRAME_ROWS..OFF_FRAME_ROWS + 4].try_into().unwrap()) as usize;
        let cols =
            u32::from_le_bytes(map[OFF_FRAME_COLS..OFF_FRAME_COLS + 4].try_into().unwrap()) as usize;
        let frame_shape = (rows > 0 && cols > 0).then_some(FrameShape { rows, cols });

        let need = region_size(n_labels, frame_shape);
        if map.len() < need {
            return Err(ShmError::Truncated {
                len: map.len(),
                need,
            });
        }
        Ok(Self {
            map,
            n_labels,
            frame_shape,
        })
    }

    pub fn n_labels(&self) -> usize {
        self.n_labels
    }

    pub fn frame_shape(&self) -> Option<FrameShape> {
        self.frame_shape
    }

    pub fn has_frame_slot(&self) -> bool {
        self.frame_shape.is_some()
    }

    fn frame_offset(&self) -> usize {
        HEADER_LEN + self.n_labels * 8
    }

    fn flag(&self, offset: usize) -> &AtomicU32 {
        // Mapped pages are page-aligned and the offsets are 4-byte aligned.
        unsafe { &*(self.map.as_ptr().add(offset) as *const AtomicU32) }
    }

    fn seq(&self) -> &AtomicU64 {
        unsafe { &*(self.map.as_ptr().add(OFF_PROB_SEQ) as *const AtomicU64) }
    }

    fn write_floats(&mut self, offset: usize, values: &[f64]) {
        let base = unsafe { self.map.as_mut_ptr().add(offset) as *mut f64 };
        for (i, &v) in values.iter().enumerate() {
            unsafe { base.add(i).write_volatile(v) };
        }
    }

    fn read_floats(&self, offset: usize, len: usize) -> Vec<f64> {
        let base = unsafe { self.map.as_ptr().add(offset) as *const f64 };
        (0..len).map(|i| unsafe { base.add(i).read_volatile() }).collect()
    }

    // ---- running flag ----

    pub fn is_running(&self) -> bool {
        self.flag(OFF_RUNNING).load(Ordering::Acquire) == 1
    }

    pub fn set_running(&self, running: bool) {
        self.flag(OFF_RUNNING)
            .store(running as u32, Ordering::Release);
    }

    // ---- probability slot (worker writes, readers consume) ----

    /// Publish one probability vector and mark it unread. Worker side.
    pub fn publish_probability(&mut self, probs: &[f64]) {
        debug_assert_eq!(probs.len(), self.n_labels);
        let seq = self.seq();
        let s = seq.load(Ordering::Relaxed);
        seq.store(s.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::Release);
        self.write_floats(HEADER_LEN, probs);
        fence(Ordering::Release);
        self.seq().store(s.wrapping_add(2), Ordering::Release);
        self.flag(OFF_UNREAD).store(1, Ordering::Release);
    }

    fn snapshot_probability(&self) -> Vec<f64> {
        let seq = self.seq();
        loop {
            let before = seq.load(Ordering::Acquire);
            if before & 1 == 1 {
                std::hint::spin_loop();
                continue;
            }
            let out = self.read_floats(HEADER_LEN, self.n_labels);
            fence(Ordering::Acquire);
            if seq.load(Ordering::Relaxed) == before {
                return out;
            }
        }
    }

    /// Snapshot the slot and mark it consumed. Never blocks; before the
    /// first publication this returns the uniform prior.
    pub fn read_probability(&self) -> Vec<f64> {
        let out = self.snapshot_probability();
        self.flag(OFF_UNREAD).store(0, Ordering::Release);
        out
    }

    /// Snapshot only if the current value has not been consumed since the
    /// last publication.
    pub fn read_probability_if_unread(&self) -> Option<Vec<f64>> {
        if self.flag(OFF_UNREAD).swap(0, Ordering::AcqRel) == 1 {
            Some(self.snapshot_probability())
        } else {
            None
        }
    }

    // ---- feature slot (request/clear handshake) ----

    pub fn request_frame(&self) {
        self.flag(OFF_FRAME_REQ).store(1, Ordering::Release);
    }

    pub fn frame_request_pending(&self) -> bool {
        self.flag(OFF_FRAME_REQ).load(Ordering::Acquire) == 1
    }

    /// Copy the frame into the slot and clear the request flag, releasing
    /// the polling reader. Worker side, called only while a request is
    /// pending.
    pub fn publish_frame(&mut self, frame: &[f64]) {
        let expected = self.frame_shape.map_or(0, |s| s.len());
        debug_assert_eq!(frame.len(), expected);
        let offset = self.frame_offset();
        self.write_floats(offset, frame);
        self.flag(OFF_FRAME_REQ).store(0, Ordering::Release);
    }

    /// Read the frame slot. Valid once a request has been served.
    pub fn read_frame(&self) -> Vec<f64> {
        let len = self.frame_shape.map_or(0, |s| s.len());
        self.read_floats(self.frame_offset(), len)
    }
}
