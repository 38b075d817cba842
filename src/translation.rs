//! The page-table walk.
//!
//! Starting from the root table in frame 0, each level index selects an
//! entry; an unlinked entry faults in a fresh child through the
//! [`FrameAllocator`] before the walk descends. After `D` hops the current
//! frame is the leaf page holding the addressed word.

use log::trace;

use crate::address::{VirtualAddress, display_bits};
use crate::config::MemoryConfig;
use crate::error::Result;
use crate::frames::{FrameAllocator, FrameRequest};
use crate::memory::{Entry, FrameIndex, PhysicalStore};

/// Outcome of a successful walk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translation {
    pub page: u64,
    /// Leaf frame holding the page
    pub frame: FrameIndex,
    pub physical: u64,
    /// Number of entries that had to be linked during this walk
    pub faults: usize,
}

impl Translation {
    /// True when every table and the page itself were already resident
    pub fn is_hit(&self) -> bool {
        self.faults == 0
    }
}

/// Resolve `va` to a physical address, materializing missing tables and the
/// leaf page on the way.
pub fn walk<S: PhysicalStore>(
    config: &MemoryConfig,
    store: &mut S,
    allocator: &mut FrameAllocator,
    va: &VirtualAddress,
) -> Result<Translation> {
    let page_size = config.page_size();
    let depth = va.depth();

    let mut path = Vec::with_capacity(depth + 1);
    path.push(FrameIndex::ROOT);
    let mut current = FrameIndex::ROOT;
    let mut faults = 0;

    for level in 0..depth {
        let entry = current.address(va.level_index(level), page_size);
        let next = match Entry::decode(store.pm_read(entry), config.num_frames())? {
            Entry::Child(child) => child,
            Entry::Unlinked => {
                let request = FrameRequest {
                    page: va.page,
                    path: &path,
                    leaf: level + 1 == depth,
                };
                let (child, _) = allocator.obtain(store, &request)?;
                store.pm_write(entry, Entry::Child(child).encode());
                faults += 1;
                child
            }
        };
        trace!(
            "level {} index {}: {} -> {}",
            level,
            display_bits(va.level_index(level), config.offset_width),
            current,
            next
        );
        path.push(next);
        current = next;
    }

    Ok(Translation {
        page: va.page,
        frame: current,
        physical: current.address(va.offset, page_size),
        faults,
    })
}
