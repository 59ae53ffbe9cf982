//! Utilities shared across the swarm engine crates: hashes, bitfields, and
//! the transaction id generators used to de-correlate wire and DHT traffic.

pub mod bitfield;
pub mod bt;
pub mod error;
pub mod sha;
pub mod trans;

pub use crate::bitfield::Bitfield;

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

/// The unspecified ipv4 socket, used as a default bind address.
pub fn default_route_v4() -> SocketAddr {
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(0, 0, 0, 0), 0))
}

/// Applies a Fisher-Yates shuffle on the given list in place, drawing
/// swap indices from the supplied `rng` so callers that need
/// reproducible output can pass a seeded one instead of a thread-local
/// source of randomness.
pub fn fisher_shuffle<T: Copy, R: rand::Rng>(list: &mut [T], rng: &mut R) {
    for i in 0..list.len() {
        let swap_index = rng.gen_range(i..list.len());

        list.swap(i, swap_index);
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    #[test]
    fn positive_fisher_shuffle() {
        let mut test_slice = [1, 2, 3, 4];
        let mut rng = rand::rngs::StdRng::seed_from_u64(0);

        super::fisher_shuffle(&mut test_slice, &mut rng);

        assert!(test_slice.contains(&1));
        assert!(test_slice.contains(&2));
        assert!(test_slice.contains(&3));
        assert!(test_slice.contains(&4));
    }

    #[test]
    fn positive_fisher_shuffle_is_deterministic_for_a_given_seed() {
        let mut a = [1, 2, 3, 4, 5, 6, 7, 8];
        let mut b = a;

        super::fisher_shuffle(&mut a, &mut rand::rngs::StdRng::seed_from_u64(42));
        super::fisher_shuffle(&mut b, &mut rand::rngs::StdRng::seed_from_u64(42));

        assert_eq!(a, b);
    }
}
