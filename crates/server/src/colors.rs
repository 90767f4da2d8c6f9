//! Player color allocation.
//!
//! A color is both a player's paint on the grid and the key used to find
//! who owns a body cell, so the pool keeps the color -> owner index next to
//! the free list and updates both together.

use std::collections::HashMap;

use protocol::ColorId;
use rand::Rng;
use rand::seq::IndexedRandom;

use crate::server::player::PlayerId;

#[derive(Debug)]
pub struct ColorPool {
    num_colors: ColorId,
    free: Vec<ColorId>,
    holders: HashMap<ColorId, PlayerId>,
}

impl ColorPool {
    /// Pool of colors `1..=num_colors`. Color 0 is never handed out.
    pub fn new(num_colors: ColorId) -> Self {
        Self {
            num_colors,
            free: (1..=num_colors).collect(),
            holders: HashMap::new(),
        }
    }

    /// Pick a free color uniformly at random and record `owner` as its holder.
    /// Returns `None` only when every color is held.
    pub fn take<R: Rng>(&mut self, owner: &PlayerId, rng: &mut R) -> Option<ColorId> {
        if self.free.is_empty() {
            self.refill();
        }
        let color = *self.free.choose(rng)?;
        self.free.retain(|&c| c != color);
        self.holders.insert(color, owner.clone());
        Some(color)
    }

    /// Return a color to the pool. Returning a color that is not held is a no-op.
    pub fn release(&mut self, color: ColorId) -> bool {
        if self.holders.remove(&color).is_some() {
            self.free.push(color);
            true
        } else {
            false
        }
    }

    /// The player currently painting with `color`.
    pub fn holder(&self, color: ColorId) -> Option<&PlayerId> {
        self.holders.get(&color)
    }

    pub fn held_count(&self) -> usize {
        self.holders.len()
    }

    /// A cosmetic color with no ownership meaning.
    pub fn random<R: Rng>(&self, rng: &mut R) -> ColorId {
        rng.random_range(1..=self.num_colors)
    }

    fn refill(&mut self) {
        self.free = (1..=self.num_colors)
            .filter(|c| !self.holders.contains_key(c))
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashSet;

    fn id(s: &str) -> PlayerId {
        PlayerId::from(s)
    }

    #[test]
    fn test_colors_unique_until_exhausted() {
        let mut pool = ColorPool::new(6);
        let mut rng = StdRng::seed_from_u64(1);
        let taken: HashSet<ColorId> = (0..6)
            .map(|i| pool.take(&id(&i.to_string()), &mut rng).unwrap())
            .collect();
        assert_eq!(taken, (1..=6).collect());
        assert_eq!(pool.take(&id("extra"), &mut rng), None);
    }

    #[test]
    fn test_release_makes_color_available_again() {
        let mut pool = ColorPool::new(2);
        let mut rng = StdRng::seed_from_u64(2);
        let a = pool.take(&id("a"), &mut rng).unwrap();
        let b = pool.take(&id("b"), &mut rng).unwrap();
        assert_ne!(a, b);
        assert_eq!(pool.holder(a), Some(&id("a")));

        assert!(pool.release(a));
        assert!(!pool.release(a));
        assert_eq!(pool.holder(a), None);
        assert_eq!(pool.take(&id("c"), &mut rng), Some(a));
        assert_eq!(pool.held_count(), 2);
    }

    #[test]
    fn test_color_zero_never_allocated() {
        let mut pool = ColorPool::new(3);
        let mut rng = StdRng::seed_from_u64(3);
        for round in 0..50 {
            let c = pool.take(&id(&round.to_string()), &mut rng).unwrap();
            assert!((1..=3).contains(&c));
            pool.release(c);
            assert!(pool.random(&mut rng) >= 1);
        }
    }
}
