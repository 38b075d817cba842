//! Hand-traced scenario on the small geometry: 2-word pages, 8 frames,
//! 16 pages, 4 table levels.

use std::collections::{BTreeSet, HashMap};

use hierarchical_vm::frames::cyclic_distance;
use hierarchical_vm::{MemoryConfig, PmEvent, SimulatedMemory, VmManager, Word};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn assert_ram(mem: &SimulatedMemory, expected: &[(u64, Word)], context: &str) {
    let gotten: HashMap<u64, Word> = expected.iter().map(|&(pa, _)| (pa, mem.peek(pa))).collect();
    let expected: HashMap<u64, Word> = expected.iter().copied().collect();
    assert_eq!(expected, gotten, "{}", context);
}

fn traced_vm() -> VmManager {
    let mut vm = VmManager::with_trace(MemoryConfig::test_constants()).unwrap();
    vm.fully_initialize();
    vm
}

#[test]
fn test_flow() {
    let mut vm = traced_vm();

    vm.vm_write(13, 3).unwrap();
    let after_first_write = [(0, 1), (3, 2), (5, 3), (6, 4), (9, 3)];
    assert_ram(vm.store(), &after_first_write, "after writing 3 to 13");

    assert_eq!(vm.vm_read(13).unwrap(), 3);
    assert_ram(vm.store(), &after_first_write, "reading back must not change tables");
    assert!(
        vm.store()
            .trace()
            .unwrap()
            .contains_in_order(&[PmEvent::Restore { frame: 4, page: 6 }])
    );

    // virtual address 6 lands on physical 14
    assert_eq!(vm.store().peek(14), 0);
    vm.vm_write(6, 1337).unwrap();
    assert_eq!(vm.vm_read(6).unwrap(), 1337);
    assert_ram(
        vm.store(),
        &[
            (0, 1),
            (2, 5),
            (3, 2),
            (5, 3),
            (6, 4),
            (9, 3),
            (11, 6),
            (13, 7),
            (14, 1337),
        ],
        "after touching 6",
    );
    assert!(
        vm.store()
            .trace()
            .unwrap()
            .contains_in_order(&[PmEvent::Restore { frame: 7, page: 3 }])
    );

    // RAM is now full; virtual address 31 lands on physical 15 after two evictions
    assert_eq!(vm.store().peek(15), 0);
    vm.vm_write(31, 7331).unwrap();
    assert_eq!(vm.vm_read(31).unwrap(), 7331);
    assert_ram(
        vm.store(),
        &[
            (0, 1),
            (1, 4),
            (2, 5),
            (3, 0),
            (4, 0),
            (5, 7),
            (6, 0),
            (7, 2),
            (8, 0),
            (9, 3),
            (10, 0),
            (11, 6),
            (12, 0),
            (13, 0),
            (15, 7331),
        ],
        "after touching 31",
    );
    assert!(vm.store().trace().unwrap().contains_in_order(&[
        PmEvent::Evict { frame: 4, page: 6 },
        PmEvent::Evict { frame: 7, page: 3 },
        PmEvent::Restore { frame: 7, page: 15 },
    ]));

    // both evicted pages come back from the backing store
    assert_eq!(vm.vm_read(6).unwrap(), 1337);
    assert_eq!(vm.vm_read(13).unwrap(), 3);
    assert_eq!(vm.vm_read(31).unwrap(), 7331);
}

/// Leaf pages reachable from the root, read without touching the trace
fn resident_pages(mem: &SimulatedMemory, config: &MemoryConfig) -> Vec<u64> {
    fn visit(mem: &SimulatedMemory, config: &MemoryConfig, frame: u64, depth: u32, page: u64, out: &mut Vec<u64>) {
        if depth == config.tables_depth() {
            out.push(page);
            return;
        }
        for index in 0..config.page_size() {
            let child = mem.peek(frame * config.page_size() + index);
            if child != 0 {
                visit(mem, config, child as u64, depth + 1, (page << config.offset_width) | index, out);
            }
        }
    }
    let mut out = Vec::new();
    visit(mem, config, 0, 0, 0, &mut out);
    out
}

fn check_victims(config: MemoryConfig) {
    let mut vm = VmManager::with_trace(config).unwrap();
    let mut rng = StdRng::seed_from_u64(1337);
    let mut evictions = 0;
    let mut written = BTreeSet::new();

    for _ in 0..500 {
        let addr = rng.gen_range(0..config.virtual_memory_size());
        let page = addr >> config.offset_width;
        written.insert(addr);

        let mut resident = resident_pages(vm.store(), &config);
        resident.sort_unstable();
        vm.store_mut().trace_mut().unwrap().clear();

        vm.vm_write(addr, page as Word).unwrap();

        let first_eviction = vm.store().trace().unwrap().events().iter().find_map(|e| match e {
            PmEvent::Evict { page, .. } => Some(*page),
            _ => None,
        });
        if let Some(victim) = first_eviction {
            evictions += 1;
            let best = resident
                .iter()
                .map(|&p| cyclic_distance(page, p, config.num_pages()))
                .max()
                .unwrap();
            let expected = resident
                .iter()
                .copied()
                .find(|&p| cyclic_distance(page, p, config.num_pages()) == best)
                .unwrap();
            assert_eq!(victim, expected, "faulting page {}", page);
        }
    }
    assert!(evictions > 0);

    // every address written still holds its page number
    for &addr in &written {
        vm.store_mut().trace_mut().unwrap().clear();
        let page = addr >> config.offset_width;
        assert_eq!(vm.vm_read(addr).unwrap(), page as Word, "address {}", addr);
    }
}

#[test]
fn test_evicts_furthest_resident_page() {
    check_victims(MemoryConfig::test_constants());
    check_victims(MemoryConfig::default());
}

#[test]
fn test_evicts_furthest_resident_page_with_pruning() {
    check_victims(MemoryConfig::test_constants().with_pruning(true));
    check_victims(MemoryConfig::default().with_pruning(true));
}
