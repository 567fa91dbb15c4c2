use criterion::{BatchSize, Criterion};

use beltway::memory_manager;
use beltway::util::options::{BeltPercentages, Options};
use beltway::util::test_util::mock_vm::{self, MockVM};
use beltway::BeltwayHeap;

const LIVE_OBJECTS: usize = 1000;

pub fn bench(c: &mut Criterion) {
    let mut options = Options::defaults();
    options.heap_size = 64 << 20;
    options.belt_percentages = BeltPercentages::new(vec![10, 40, 50]);
    let heap = BeltwayHeap::<MockVM>::new(options).unwrap();
    let mut mutator = memory_manager::bind_mutator(&heap);

    // A minor collection copying a linked list out of eden.
    c.bench_function("minor_collection", |b| {
        b.iter_batched(
            || {
                mock_vm::reset();
                let mut head = mock_vm::alloc_object(&mut mutator, 64, 1);
                for _ in 1..LIVE_OBJECTS {
                    let node = mock_vm::alloc_object(&mut mutator, 64, 1);
                    mock_vm::set_ref(node, 0, head);
                    head = node;
                }
                mock_vm::add_root(head);
            },
            |_| heap.collect_garbage(0).unwrap(),
            BatchSize::PerIteration,
        )
    });
    mock_vm::reset();
}
