//! Simulated physical memory: a flat RAM of frames plus a backing store
//! holding evicted pages.
//!
//! The engine only talks to RAM through the four [`PhysicalStore`]
//! primitives, so tests can wrap or replace the store.

use std::collections::HashMap;

use crate::config::MemoryConfig;
use crate::constants::*;
use crate::error::{Result, VmError};
use crate::trace::{PmEvent, Trace};

/// Index of a frame in RAM
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FrameIndex(u64);

impl FrameIndex {
    pub const ROOT: FrameIndex = FrameIndex(ROOT_FRAME as u64);

    pub fn new(index: u64) -> Self {
        FrameIndex(index)
    }

    #[inline]
    pub fn get(self) -> u64 {
        self.0
    }

    /// Physical address of the first word of this frame
    #[inline]
    pub fn base(self, page_size: u64) -> u64 {
        self.0 * page_size
    }

    #[inline]
    pub fn address(self, offset: u64, page_size: u64) -> u64 {
        self.base(page_size) + offset
    }
}

impl std::fmt::Display for FrameIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "frame {}", self.0)
    }
}

/// A decoded table entry.
///
/// Table words and data words share the same RAM; this is the view of a
/// word that is known to sit in a table frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entry {
    Unlinked,
    Child(FrameIndex),
}

impl Entry {
    /// Decode a table word. Anything that isn't 0 or a valid non-root frame
    /// means the tree was corrupted.
    pub fn decode(word: Word, num_frames: u64) -> Result<Entry> {
        if word == UNLINKED {
            return Ok(Entry::Unlinked);
        }
        match u64::try_from(word) {
            Ok(index) if index < num_frames => Ok(Entry::Child(FrameIndex(index))),
            _ => Err(VmError::Inconsistent(format!(
                "table entry {} does not name a frame in [1, {})",
                word, num_frames
            ))),
        }
    }

    pub fn encode(self) -> Word {
        match self {
            Entry::Unlinked => UNLINKED,
            // frame counts are validated to fit in a word
            Entry::Child(frame) => frame.get() as Word,
        }
    }
}

/// The primitives the translation engine needs from physical memory.
pub trait PhysicalStore {
    fn pm_read(&mut self, address: u64) -> Word;

    fn pm_write(&mut self, address: u64, value: Word);

    /// Persist the current content of `frame` under `page`.
    fn pm_evict(&mut self, frame: FrameIndex, page: u64);

    /// Load the content saved for `page` into `frame`, zero-filling it when
    /// nothing was saved.
    fn pm_restore(&mut self, frame: FrameIndex, page: u64);
}

/// Secondary storage for evicted pages, keyed by virtual page number
#[derive(Debug, Default)]
pub struct BackingStore {
    pages: HashMap<u64, Vec<Word>>,
}

impl BackingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn save(&mut self, page: u64, words: Vec<Word>) {
        self.pages.insert(page, words);
    }

    /// Remove and return the record for `page`
    pub fn take(&mut self, page: u64) -> Option<Vec<Word>> {
        self.pages.remove(&page)
    }

    pub fn get(&self, page: u64) -> Option<&[Word]> {
        self.pages.get(&page).map(Vec::as_slice)
    }

    pub fn contains(&self, page: u64) -> bool {
        self.pages.contains_key(&page)
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn clear(&mut self) {
        self.pages.clear();
    }
}

/// RAM plus backing store, with optional recording of every primitive call.
///
/// # Panics
/// The primitives index straight into RAM and panic on an address past its
/// end. The engine only issues addresses inside frames it resolved.
pub struct SimulatedMemory {
    ram: Vec<Word>,
    page_size: u64,
    backing: BackingStore,
    trace: Option<Trace>,
}

impl SimulatedMemory {
    /// Zeroed RAM sized for `config`
    pub fn new(config: &MemoryConfig) -> Self {
        SimulatedMemory {
            ram: vec![0; config.ram_size() as usize],
            page_size: config.page_size(),
            backing: BackingStore::new(),
            trace: None,
        }
    }

    /// Start recording primitive calls
    pub fn with_trace(mut self) -> Self {
        self.trace = Some(Trace::new());
        self
    }

    pub fn trace(&self) -> Option<&Trace> {
        self.trace.as_ref()
    }

    pub fn trace_mut(&mut self) -> Option<&mut Trace> {
        self.trace.as_mut()
    }

    /// Read RAM without recording the access
    #[inline]
    pub fn peek(&self, address: u64) -> Word {
        self.ram[address as usize]
    }

    pub fn data(&self) -> &[Word] {
        &self.ram
    }

    /// Direct access to RAM, bypassing the primitives and the trace
    pub fn data_mut(&mut self) -> &mut [Word] {
        &mut self.ram
    }

    pub fn backing_store(&self) -> &BackingStore {
        &self.backing
    }

    pub fn has_record(&self, page: u64) -> bool {
        self.backing.contains(page)
    }

    pub fn record_count(&self) -> usize {
        self.backing.len()
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    pub fn num_frames(&self) -> u64 {
        self.ram.len() as u64 / self.page_size
    }

    /// Zero all of RAM and drop every backing-store record
    pub fn clear(&mut self) {
        self.ram.fill(0);
        if !self.backing.is_empty() {
            log::debug!("dropping {} saved pages", self.backing.len());
            self.backing.clear();
        }
    }

    fn frame_range(&self, frame: FrameIndex) -> std::ops::Range<usize> {
        let start = frame.base(self.page_size) as usize;
        start..start + self.page_size as usize
    }

    fn record(&mut self, event: PmEvent) {
        if let Some(trace) = self.trace.as_mut() {
            trace.record(event);
        }
    }
}

impl PhysicalStore for SimulatedMemory {
    #[inline]
    fn pm_read(&mut self, address: u64) -> Word {
        self.record(PmEvent::Read { address });
        self.ram[address as usize]
    }

    #[inline]
    fn pm_write(&mut self, address: u64, value: Word) {
        self.record(PmEvent::Write { address, value });
        self.ram[address as usize] = value;
    }

    fn pm_evict(&mut self, frame: FrameIndex, page: u64) {
        self.record(PmEvent::Evict {
            frame: frame.get(),
            page,
        });
        let words = self.ram[self.frame_range(frame)].to_vec();
        self.backing.save(page, words);
    }

    fn pm_restore(&mut self, frame: FrameIndex, page: u64) {
        self.record(PmEvent::Restore {
            frame: frame.get(),
            page,
        });
        let range = self.frame_range(frame);
        match self.backing.take(page) {
            Some(words) => self.ram[range].copy_from_slice(&words),
            None => self.ram[range].fill(0),
        }
    }
}
