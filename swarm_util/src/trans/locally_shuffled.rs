use std::ops::Add;
use std::num::Wrapping;

use num::{Bounded, One, Zero};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::trans::{SequentialIds, TransactionIds};

const TRANSACTION_ID_PREALLOC_LEN: usize = 2048;

/// Provides transaction ids that are locally shuffled.
///
/// For all intents and purposes, this class is used to generate
/// transaction ids that need to be random but need to be unique
/// over a reasonable span of time.
///
/// We do this by composing the sequential ids and taking x number
/// of ids into a buffer. We then randomly shuffle that buffer
/// and hand out ids in order. When the buffer is exhausted we repeat.
/// This allows us to uphold the uniqueness property for any large
/// transaction type (such as u64) but also works with smaller types.
///
/// The shuffle is driven by a seeded `StdRng`, not a thread-local
/// source, so two generators constructed with the same seed hand out
/// the same id sequence.
pub struct LocallyShuffledIds<T> {
    sequential: SequentialIds<T>,
    stored_ids: Vec<T>,
    rng: StdRng,
}

impl<T> LocallyShuffledIds<T>
    where T: One + Zero + Clone + Eq + Bounded + Default,
          Wrapping<T>: Add<Wrapping<T>, Output = Wrapping<T>> {
    /// Create a new LocallyShuffledIds struct whose shuffle is seeded
    /// from `seed`.
    pub fn new(seed: u64) -> LocallyShuffledIds<T> {
        LocallyShuffledIds::start_at(T::zero(), seed)
    }

    /// Create a new LocallyShuffledIds struct at the starting value,
    /// with its shuffle seeded from `seed`.
    pub fn start_at(start: T, seed: u64) -> LocallyShuffledIds<T> {
        LocallyShuffledIds {
            sequential: SequentialIds::start_at(start),
            stored_ids: Vec::new(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Refills our stored ids list with new ids and resets our current index.
    fn refill_stored_ids(&mut self) {
        // Clear out our previous block.
        self.stored_ids.clear();

        // Store these values so we can detect when we hit them.
        let max_value = T::max_value();
        let min_value = T::min_value();

        // If we see that we picked up the min value, then we can't rollover after the max value
        // for the current pre allocation chunk otherwise we will have duplicates in the same block.
        let mut contains_min_value = false;
        let mut contains_max_value = false;

        let mut num_ids_generated = 0;
        while num_ids_generated < TRANSACTION_ID_PREALLOC_LEN && (!contains_min_value || !contains_max_value) {
            let next_id = self.sequential.generate();

            // If we haven't seen the min or max values yet, see if the current id is either of them.
            contains_min_value = contains_min_value || next_id == min_value;
            contains_max_value = contains_max_value || next_id == max_value;

            self.stored_ids.push(next_id);
            num_ids_generated += 1;
        }

        crate::fisher_shuffle(&mut self.stored_ids[..], &mut self.rng);
    }
}

impl<T> TransactionIds<T> for LocallyShuffledIds<T>
    where T: One + Zero + Clone + Eq + Bounded + Default,
          Wrapping<T>: Add<Wrapping<T>, Output = Wrapping<T>>{
    fn generate(&mut self) -> T {
        self.stored_ids.pop().unwrap_or_else(|| {
            self.refill_stored_ids();

            self.generate()
        })
    }
}
