//! Uniform sampling of board items.

use rand::Rng;

/// Returns all of `items` when there are at most `cap`, otherwise `cap`
/// distinct items chosen uniformly at random.
///
/// Partial Fisher–Yates: only the first `cap` positions are shuffled.
pub fn sample<T: Clone, R: Rng + ?Sized>(items: &[T], cap: usize, rng: &mut R) -> Vec<T> {
    if items.len() <= cap {
        return items.to_vec();
    }

    let mut pool: Vec<T> = items.to_vec();
    for i in 0..cap {
        let j = rng.gen_range(i..pool.len());
        pool.swap(i, j);
    }
    pool.truncate(cap);
    pool
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    #[test]
    fn test_small_input_returned_whole() {
        let mut rng = StdRng::seed_from_u64(1);
        let items = vec![1, 2, 3];
        assert_eq!(sample(&items, 8, &mut rng), items);
        assert_eq!(sample(&items, 3, &mut rng), items);
    }

    #[test]
    fn test_large_input_capped_without_duplicates() {
        let items: Vec<u32> = (0..50).collect();
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let picked = sample(&items, 8, &mut rng);

            assert_eq!(picked.len(), 8);
            let distinct: HashSet<_> = picked.iter().collect();
            assert_eq!(distinct.len(), 8);
            assert!(picked.iter().all(|p| items.contains(p)));
        }
    }

    #[test]
    fn test_same_seed_same_sample() {
        let items: Vec<u32> = (0..30).collect();
        let a = sample(&items, 8, &mut StdRng::seed_from_u64(7));
        let b = sample(&items, 8, &mut StdRng::seed_from_u64(7));
        assert_eq!(a, b);
    }

    #[test]
    fn test_every_item_reachable() {
        let items: Vec<u32> = (0..10).collect();
        let mut seen = HashSet::new();
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..200 {
            seen.extend(sample(&items, 2, &mut rng));
        }
        assert_eq!(seen.len(), 10);
    }
}
