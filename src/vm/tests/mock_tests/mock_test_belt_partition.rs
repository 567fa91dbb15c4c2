use super::mock_test_prelude::*;
use crate::util::heap::ConfigurationError;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

const HEAP_SIZE: usize = 4 * MB;

/// A random usable split: mature keeps more than half of to-space, with a margin
/// for rounding belts to TLABs.
fn random_split(rng: &mut ChaCha8Rng) -> Vec<usize> {
    let eden = rng.random_range(1..=94);
    let to_space = rng.random_range(1..=2 * (100 - eden) / 3 - 2);
    vec![eden, to_space, 100 - eden - to_space]
}

/// Whatever the split, the belts tile the heap in order, each at least a TLAB
/// large and aligned to it, and the inspector sees the same regions.
#[test]
pub fn belts_tile_the_heap() {
    let mut rng = ChaCha8Rng::seed_from_u64(0x8e17);
    for _ in 0..16 {
        let percentages = random_split(&mut rng);
        with_mock_heap(heap_options(HEAP_SIZE, &percentages), |heap| {
            let belts = heap.belts();
            assert_eq!(belts.num_belts(), 3);
            assert!(belts.verify_partition());
            assert_eq!(belts.start(), belts.youngest().start());
            assert_eq!(belts.end(), belts.oldest().end());
            let total: usize = belts.belts().iter().map(|b| b.size()).sum();
            assert_eq!(total, HEAP_SIZE);
            for (belt, percentage) in belts.belts().iter().zip(percentages.iter()) {
                assert!(belt.size() >= TLAB_SIZE);
                assert!(belt.start().is_aligned_to(TLAB_SIZE));
                assert!(belt.size() <= HEAP_SIZE * percentage / 100 + TLAB_SIZE * 3);
                assert_eq!(belt.allocation_mark(), belt.start());
            }
            assert_eq!(heap.inspectable().memory_regions(), belts.memory_regions());

            // Collecting does not move belt boundaries.
            let before = belts.memory_regions();
            assert_eq!(heap.collect_garbage(0), Ok(true));
            assert!(belts.verify_partition());
            assert_eq!(belts.memory_regions(), before);
            assert_eq!(heap.inspectable().memory_regions(), before);
        });
    }
}

#[test]
pub fn bad_splits_are_rejected() {
    for percentages in [&[50, 50][..], &[10, 40, 40], &[0, 50, 50], &[10, 20, 30, 40]] {
        let options = heap_options(HEAP_SIZE, percentages);
        assert!(BeltwayHeap::<MockVM>::new(options).is_err(), "{:?}", percentages);
    }
    // Mature cannot take half of to-space even when empty.
    for percentages in [&[57, 38, 5][..], &[10, 80, 10]] {
        let options = heap_options(HEAP_SIZE, percentages);
        assert!(
            matches!(
                BeltwayHeap::<MockVM>::new(options),
                Err(ConfigurationError::OldestBeltTooSmall { .. })
            ),
            "{:?}",
            percentages
        );
    }
    // A heap that is not a whole number of TLABs.
    let options = heap_options(HEAP_SIZE + 8, &[10, 40, 50]);
    assert!(BeltwayHeap::<MockVM>::new(options).is_err());
}
