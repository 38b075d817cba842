use log::{debug, info};

use crate::address::VirtualAddress;
use crate::config::MemoryConfig;
use crate::constants::*;
use crate::error::Result;
use crate::frames::FrameAllocator;
use crate::memory::{FrameIndex, PhysicalStore, SimulatedMemory};
use crate::translation::{Translation, walk};

/// A virtual address space backed by a hierarchical page table living in
/// simulated RAM.
///
/// Leaf words double as "never written" and "written 0": a read of a page
/// nobody wrote yields 0, the same as a page that was explicitly zeroed.
pub struct VmManager<S: PhysicalStore = SimulatedMemory> {
    config: MemoryConfig,
    store: S,
    allocator: FrameAllocator,
}

impl VmManager<SimulatedMemory> {
    /// Fresh zeroed RAM and an empty backing store
    pub fn new(config: MemoryConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::assemble(config, SimulatedMemory::new(&config)))
    }

    /// Like [`VmManager::new`], recording every primitive call
    pub fn with_trace(config: MemoryConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::assemble(config, SimulatedMemory::new(&config).with_trace()))
    }

    /// Clear all RAM and the backing store, then reset the tables.
    pub fn fully_initialize(&mut self) {
        self.store.clear();
        self.initialize();
    }
}

impl<S: PhysicalStore> VmManager<S> {
    /// Wrap an existing store. Its root table is taken as is; call
    /// [`VmManager::initialize`] to start from an empty tree.
    pub fn with_store(config: MemoryConfig, store: S) -> Result<Self> {
        config.validate()?;
        Ok(Self::assemble(config, store))
    }

    /// `config` must already be validated.
    fn assemble(config: MemoryConfig, store: S) -> Self {
        info!("virtual memory: {}", config);
        VmManager {
            config,
            store,
            allocator: FrameAllocator::new(config),
        }
    }

    /// Zero the root table and forget which frames were handed out.
    ///
    /// Other frames keep whatever they held; nothing outside the tree
    /// reachable from the root is ever trusted.
    pub fn initialize(&mut self) {
        let page_size = self.config.page_size();
        for index in 0..page_size {
            self.store
                .pm_write(FrameIndex::ROOT.address(index, page_size), UNLINKED);
        }
        self.allocator.reset();
        info!("page tables reset");
    }

    /// Resolve `address`, faulting in whatever is missing.
    pub fn translate(&mut self, address: u64) -> Result<Translation> {
        let va = VirtualAddress::decompose(address, &self.config)?;
        let translation = walk(&self.config, &mut self.store, &mut self.allocator, &va)?;
        if !translation.is_hit() {
            debug!(
                "{} resolved to {} after {} fault(s)",
                va, translation.physical, translation.faults
            );
        }
        Ok(translation)
    }

    pub fn vm_read(&mut self, address: u64) -> Result<Word> {
        let translation = self.translate(address)?;
        Ok(self.store.pm_read(translation.physical))
    }

    pub fn vm_write(&mut self, address: u64, value: Word) -> Result<()> {
        let translation = self.translate(address)?;
        self.store.pm_write(translation.physical, value);
        Ok(())
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Direct access to the store, bypassing translation
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VmError;
    use crate::trace::PmEvent;

    #[test]
    fn test_invalid_config_rejected_before_allocating() {
        let mut config = MemoryConfig::default();
        config.physical_address_width = 63;
        assert!(matches!(VmManager::new(config), Err(VmError::InvalidConfig(_))));
        assert!(matches!(VmManager::with_trace(config), Err(VmError::InvalidConfig(_))));

        let store = SimulatedMemory::new(&MemoryConfig::default());
        assert!(matches!(
            VmManager::with_store(config, store),
            Err(VmError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_write_then_read_once() {
        let mut vm = VmManager::new(MemoryConfig::default()).unwrap();
        let addr = 0b1000_1011_1011_0111_0011;
        vm.vm_write(addr, 1337).unwrap();

        let mem = vm.store();
        for (pa, value) in [(8, 1), (27, 2), (43, 3), (55, 4), (67, 1337)] {
            assert_eq!(mem.peek(pa), value, "physical address {}", pa);
        }

        assert_eq!(vm.vm_read(addr).unwrap(), 1337);
        let mem = vm.store();
        for (pa, value) in [(8, 1), (27, 2), (43, 3), (55, 4), (67, 1337)] {
            assert_eq!(mem.peek(pa), value, "physical address {}", pa);
        }
    }

    #[test]
    fn test_unwritten_address_reads_zero() {
        let mut vm = VmManager::new(MemoryConfig::default()).unwrap();
        assert_eq!(vm.vm_read(0xABCDE).unwrap(), 0);
    }

    #[test]
    fn test_out_of_range_touches_nothing() {
        let mut vm = VmManager::with_trace(MemoryConfig::default()).unwrap();
        let limit = vm.config().virtual_memory_size();

        let err = vm.vm_write(limit, 5).unwrap_err();
        assert!(matches!(err, VmError::OutOfRange { .. }));
        assert!(vm.vm_read(limit).is_err());
        assert!(vm.store().trace().unwrap().is_empty());

        vm.vm_write(limit - 1, 5).unwrap();
        assert_eq!(vm.vm_read(limit - 1).unwrap(), 5);
    }

    #[test]
    fn test_invalid_config_is_rejected_up_front() {
        let err = VmManager::new(MemoryConfig::new(2, 4, 10)).err().unwrap();
        assert!(matches!(err, VmError::InvalidConfig(_)));
    }

    #[test]
    fn test_resident_read_only_reads() {
        let mut vm = VmManager::with_trace(MemoryConfig::default()).unwrap();
        vm.vm_write(4242, 7).unwrap();
        vm.store_mut().trace_mut().unwrap().clear();

        assert_eq!(vm.vm_read(4242).unwrap(), 7);
        let trace = vm.store().trace().unwrap();
        assert_eq!(trace.len(), 5);
        assert!(trace.events().iter().all(|e| matches!(e, PmEvent::Read { .. })));
    }

    #[test]
    fn test_initialize_only_clears_root() {
        let mut vm = VmManager::new(MemoryConfig::default()).unwrap();
        vm.vm_write(100, 9).unwrap();
        let leaf = vm.translate(100).unwrap().physical;

        vm.initialize();
        assert!(vm.store().data()[..16].iter().all(|&w| w == 0));
        assert_eq!(vm.store().peek(leaf), 9);

        // the old tree is gone; the page is faulted in again from scratch
        assert_eq!(vm.vm_read(100).unwrap(), 0);
    }

    #[test]
    fn test_fully_initialize_clears_everything() {
        let mut vm = VmManager::new(MemoryConfig::test_constants()).unwrap();
        for addr in 0..32 {
            vm.vm_write(addr, addr as Word + 1).unwrap();
        }
        assert!(vm.store().record_count() > 0);

        vm.fully_initialize();
        assert!(vm.store().data().iter().all(|&w| w == 0));
        assert_eq!(vm.store().record_count(), 0);
    }
}
