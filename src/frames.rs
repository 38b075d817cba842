//! Frame allocation and eviction.
//!
//! When a walk hits an unlinked entry it asks for a frame. Candidates are
//! tried in this order:
//!
//! 1. a table frame that holds no links (released by pruning, or found
//!    linked but empty somewhere off the current path);
//! 2. the lowest frame index never handed out, i.e. one past the highest
//!    frame referenced from the tree;
//! 3. the resident leaf page furthest from the faulting page in cyclic
//!    page-number distance, which is written to the backing store.
//!
//! Only leaf pages are ever evicted. Tables drained by an eviction are
//! reclaimed through step 1, either lazily on a later scan or eagerly when
//! `prune_empty_tables` is set.

use log::{debug, trace};

use crate::config::MemoryConfig;
use crate::constants::UNLINKED;
use crate::error::{Result, VmError};
use crate::memory::{Entry, FrameIndex, PhysicalStore};

/// Wraparound distance between two page numbers in a space of `num_pages`.
#[inline]
pub fn cyclic_distance(a: u64, b: u64, num_pages: u64) -> u64 {
    let d = a.abs_diff(b);
    d.min(num_pages - d)
}

/// What the walk needs a frame for
#[derive(Debug, Clone, Copy)]
pub struct FrameRequest<'a> {
    /// Page number being translated
    pub page: u64,
    /// Frames already on this walk, root first. None of them may be handed out.
    pub path: &'a [FrameIndex],
    /// The frame will hold the page's data rather than a table
    pub leaf: bool,
}

/// How a frame was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSource {
    Released,
    EmptyTable,
    Unused,
    Evicted { page: u64 },
}

/// A non-root frame together with the entry that links it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Slot {
    frame: FrameIndex,
    parent_entry: u64,
}

#[derive(Debug)]
struct Victim {
    slot: Slot,
    page: u64,
    distance: u64,
    /// Tables from below the root down to the victim's parent
    lineage: Vec<Slot>,
}

/// One depth-first pass over every frame reachable from the root
struct Scan<'a> {
    config: &'a MemoryConfig,
    target_page: u64,
    path: &'a [FrameIndex],
    max_frame: u64,
    empty: Option<Slot>,
    victim: Option<Victim>,
    lineage: Vec<Slot>,
}

impl<'a> Scan<'a> {
    fn run<S: PhysicalStore>(
        config: &'a MemoryConfig,
        store: &mut S,
        request: &FrameRequest<'a>,
    ) -> Result<Self> {
        let mut scan = Scan {
            config,
            target_page: request.page,
            path: request.path,
            max_frame: FrameIndex::ROOT.get(),
            empty: None,
            victim: None,
            lineage: Vec::with_capacity(config.tables_depth() as usize),
        };
        scan.visit_children(store, FrameIndex::ROOT, 0, 0)?;
        Ok(scan)
    }

    fn visit<S: PhysicalStore>(&mut self, store: &mut S, slot: Slot, depth: u32, page: u64) -> Result<()> {
        self.max_frame = self.max_frame.max(slot.frame.get());

        if depth == self.config.tables_depth() {
            self.consider_victim(slot, page);
            return Ok(());
        }

        self.lineage.push(slot);
        let has_children = self.visit_children(store, slot.frame, depth, page)?;
        self.lineage.pop();

        if !has_children && self.empty.is_none() && !self.path.contains(&slot.frame) {
            self.empty = Some(slot);
        }
        Ok(())
    }

    fn visit_children<S: PhysicalStore>(
        &mut self,
        store: &mut S,
        frame: FrameIndex,
        depth: u32,
        page: u64,
    ) -> Result<bool> {
        let page_size = self.config.page_size();
        let mut has_children = false;
        for index in 0..page_size {
            let entry = frame.address(index, page_size);
            if let Entry::Child(child) = Entry::decode(store.pm_read(entry), self.config.num_frames())? {
                has_children = true;
                let slot = Slot {
                    frame: child,
                    parent_entry: entry,
                };
                self.visit(store, slot, depth + 1, (page << self.config.offset_width) | index)?;
            }
        }
        Ok(has_children)
    }

    fn consider_victim(&mut self, slot: Slot, page: u64) {
        if self.path.contains(&slot.frame) {
            return;
        }
        let distance = cyclic_distance(self.target_page, page, self.config.num_pages());
        // pages are visited in ascending order, so ties keep the smaller one
        if self.victim.as_ref().is_some_and(|v| v.distance >= distance) {
            return;
        }
        self.victim = Some(Victim {
            slot,
            page,
            distance,
            lineage: self.lineage.clone(),
        });
    }
}

/// Hands out frames to the translation walk.
#[derive(Debug)]
pub struct FrameAllocator {
    config: MemoryConfig,
    /// Tables unlinked by pruning, free for reuse
    released: Vec<FrameIndex>,
}

impl FrameAllocator {
    pub fn new(config: MemoryConfig) -> Self {
        FrameAllocator {
            config,
            released: Vec::new(),
        }
    }

    /// Forget every frame handed out so far. Only valid together with a
    /// reset of the root table.
    pub fn reset(&mut self) {
        self.released.clear();
    }

    pub fn released(&self) -> &[FrameIndex] {
        &self.released
    }

    /// Produce a frame for `request` with its content in place: zeroed for a
    /// table, restored from the backing store (or zeroed) for a leaf page.
    /// The caller links it into the parent entry.
    pub fn obtain<S: PhysicalStore>(
        &mut self,
        store: &mut S,
        request: &FrameRequest<'_>,
    ) -> Result<(FrameIndex, FrameSource)> {
        let (frame, source) = self.pick(store, request)?;
        debug!(
            "page {}: {} for {} ({:?})",
            request.page,
            frame,
            if request.leaf { "leaf" } else { "table" },
            source
        );

        if request.leaf {
            store.pm_restore(frame, request.page);
        } else {
            self.zero_frame(store, frame);
        }
        Ok((frame, source))
    }

    fn pick<S: PhysicalStore>(
        &mut self,
        store: &mut S,
        request: &FrameRequest<'_>,
    ) -> Result<(FrameIndex, FrameSource)> {
        if let Some(frame) = self.released.pop() {
            return Ok((frame, FrameSource::Released));
        }

        let scan = Scan::run(&self.config, store, request)?;

        if let Some(slot) = scan.empty {
            store.pm_write(slot.parent_entry, UNLINKED);
            return Ok((slot.frame, FrameSource::EmptyTable));
        }

        let next = scan.max_frame + 1;
        if next < self.config.num_frames() {
            return Ok((FrameIndex::new(next), FrameSource::Unused));
        }

        let victim = scan.victim.ok_or_else(|| {
            VmError::Inconsistent(format!(
                "RAM is full and no page can be evicted for page {}",
                request.page
            ))
        })?;
        debug!(
            "evicting page {} from {} (distance {} from page {})",
            victim.page, victim.slot.frame, victim.distance, request.page
        );
        store.pm_evict(victim.slot.frame, victim.page);
        store.pm_write(victim.slot.parent_entry, UNLINKED);

        if self.config.prune_empty_tables {
            self.prune(store, &victim.lineage, request.path);
        }
        Ok((victim.slot.frame, FrameSource::Evicted { page: victim.page }))
    }

    /// Unlink the tables an eviction left empty, deepest first. Bounded by
    /// the tree depth since `lineage` is one root-to-leaf path.
    fn prune<S: PhysicalStore>(&mut self, store: &mut S, lineage: &[Slot], path: &[FrameIndex]) {
        for slot in lineage.iter().rev() {
            if path.contains(&slot.frame) || !self.is_empty_table(store, slot.frame) {
                break;
            }
            trace!("pruning empty table {}", slot.frame);
            store.pm_write(slot.parent_entry, UNLINKED);
            self.released.push(slot.frame);
        }
    }

    fn is_empty_table<S: PhysicalStore>(&self, store: &mut S, frame: FrameIndex) -> bool {
        let page_size = self.config.page_size();
        (0..page_size).all(|index| store.pm_read(frame.address(index, page_size)) == UNLINKED)
    }

    fn zero_frame<S: PhysicalStore>(&self, store: &mut S, frame: FrameIndex) {
        let page_size = self.config.page_size();
        for index in 0..page_size {
            store.pm_write(frame.address(index, page_size), UNLINKED);
        }
    }
}
