use criterion::Criterion;

use beltway::tele::memory_region::MemoryRegion;
use beltway::tele::watchpoint::WatchpointSettings;
use beltway::util::test_util::simulated_target::{SimulatedTarget, HEAP_START};

const WATCHPOINTS: usize = 256;

pub fn bench(c: &mut Criterion) {
    let target = SimulatedTarget::new(WATCHPOINTS);
    let (_vm, factory) = target.attach();
    let settings = WatchpointSettings::new(false, true, false, false);
    for i in 0..WATCHPOINTS {
        let region = MemoryRegion::new(HEAP_START + i * 64, 32);
        factory
            .create_region_watchpoint("bench", region, settings)
            .unwrap()
            .unwrap();
    }

    c.bench_function("find_client_watchpoint", |b| {
        let mut i = 0usize;
        b.iter(|| {
            i = (i + 1) % (WATCHPOINTS * 64);
            factory.find_client_watchpoint(HEAP_START + i)
        })
    });
}
