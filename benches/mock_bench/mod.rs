use criterion::Criterion;

pub mod alloc;
pub mod collect;
pub mod watchpoints;

pub fn bench(c: &mut Criterion) {
    alloc::bench(c);
    collect::bench(c);
    watchpoints::bench(c);
}
