use criterion::Criterion;

use beltway::memory_manager;
use beltway::util::options::Options;
use beltway::util::test_util::mock_vm::MockVM;
use beltway::BeltwayHeap;

pub fn bench(c: &mut Criterion) {
    let mut options = Options::defaults();
    options.heap_size = 256 << 20;
    let heap = BeltwayHeap::<MockVM>::new(options).unwrap();
    let mut mutator = memory_manager::bind_mutator(&heap);

    // Nothing is rooted: when eden fills up, a collection empties it again.
    c.bench_function("alloc", |b| {
        b.iter(|| {
            let addr = memory_manager::alloc(&mut mutator, 32);
            if addr.is_zero() {
                heap.collect_garbage(32).unwrap();
            }
        })
    });
}
