//! Memory geometry.
//!
//! Three widths fix everything else: page size, frame count, page count and
//! the depth of the table tree. A `MemoryConfig` is validated once when a
//! `VmManager` is built and is never mutated afterwards.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::error::{Result, VmError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Bits of in-page offset, also the bits consumed per table level.
    pub offset_width: u32,
    pub physical_address_width: u32,
    pub virtual_address_width: u32,
    /// Unlink tables emptied by an eviction right away instead of leaving
    /// them for a later allocation to reclaim.
    pub prune_empty_tables: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        MemoryConfig {
            offset_width: OFFSET_WIDTH,
            physical_address_width: PHYSICAL_ADDRESS_WIDTH,
            virtual_address_width: VIRTUAL_ADDRESS_WIDTH,
            prune_empty_tables: false,
        }
    }
}

impl MemoryConfig {
    pub fn new(offset_width: u32, physical_address_width: u32, virtual_address_width: u32) -> Self {
        MemoryConfig {
            offset_width,
            physical_address_width,
            virtual_address_width,
            prune_empty_tables: false,
        }
    }

    /// The 2-word-page geometry used for hand-traced scenarios.
    pub fn test_constants() -> Self {
        Self::new(
            TEST_OFFSET_WIDTH,
            TEST_PHYSICAL_ADDRESS_WIDTH,
            TEST_VIRTUAL_ADDRESS_WIDTH,
        )
    }

    pub fn with_pruning(mut self, prune_empty_tables: bool) -> Self {
        self.prune_empty_tables = prune_empty_tables;
        self
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let config: MemoryConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Words per page (and entries per table).
    #[inline]
    pub fn page_size(&self) -> u64 {
        1 << self.offset_width
    }

    #[inline]
    pub fn ram_size(&self) -> u64 {
        1 << self.physical_address_width
    }

    #[inline]
    pub fn virtual_memory_size(&self) -> u64 {
        1 << self.virtual_address_width
    }

    #[inline]
    pub fn num_frames(&self) -> u64 {
        self.ram_size() / self.page_size()
    }

    #[inline]
    pub fn num_pages(&self) -> u64 {
        self.virtual_memory_size() / self.page_size()
    }

    /// Number of table levels between the root and a leaf page.
    ///
    /// `(virtual - 1) / offset` groups cover every bit above the final
    /// offset group; when the widths don't divide evenly the root index
    /// simply uses fewer bits.
    #[inline]
    pub fn tables_depth(&self) -> u32 {
        (self.virtual_address_width - 1) / self.offset_width
    }

    pub fn validate(&self) -> Result<()> {
        if self.offset_width == 0 {
            return Err(VmError::InvalidConfig("offset width must be at least 1".into()));
        }
        if self.virtual_address_width > MAX_VIRTUAL_ADDRESS_WIDTH {
            return Err(VmError::InvalidConfig(format!(
                "virtual address width {} exceeds {}",
                self.virtual_address_width, MAX_VIRTUAL_ADDRESS_WIDTH
            )));
        }
        if self.physical_address_width > MAX_PHYSICAL_ADDRESS_WIDTH {
            return Err(VmError::InvalidConfig(format!(
                "physical address width {} exceeds {}",
                self.physical_address_width, MAX_PHYSICAL_ADDRESS_WIDTH
            )));
        }
        if self.physical_address_width < self.offset_width {
            return Err(VmError::InvalidConfig(format!(
                "physical address width {} is smaller than offset width {}",
                self.physical_address_width, self.offset_width
            )));
        }
        if self.virtual_address_width <= self.offset_width {
            return Err(VmError::InvalidConfig(format!(
                "virtual address width {} leaves no bits for the table tree (offset width {})",
                self.virtual_address_width, self.offset_width
            )));
        }
        if self.num_frames() > Word::MAX as u64 {
            return Err(VmError::InvalidConfig(format!(
                "{} frames cannot be addressed by a {}-bit word",
                self.num_frames(),
                WORD_WIDTH
            )));
        }

        // a whole root-to-leaf path has to be resident at once
        let path_len = u64::from(self.tables_depth()) + 1;
        if self.num_frames() < path_len {
            return Err(VmError::InvalidConfig(format!(
                "{} frames cannot hold a resident path of {} frames",
                self.num_frames(),
                path_len
            )));
        }
        Ok(())
    }
}

impl std::fmt::Display for MemoryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "offset={} physical={} virtual={} (frames={}, pages={}, depth={})",
            self.offset_width,
            self.physical_address_width,
            self.virtual_address_width,
            self.num_frames(),
            self.num_pages(),
            self.tables_depth()
        )
    }
}
