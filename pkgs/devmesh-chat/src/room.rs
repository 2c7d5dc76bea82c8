//! Room identity function.
//!
//! A room is the broadcast group for one participant pair. The id must be
//! the same no matter which participant computes it, so the pair is sorted
//! before hashing.

use sha2::{Digest, Sha256};

/// Prefix length of the hex digest kept in the room id. 16 hex chars is
/// 64 bits, which is small enough to be readable and wide enough for this
/// system's user cardinality. Not collision-free in the formal sense.
const ROOM_ID_HEX_LEN: usize = 16;

/// Sort two user ids into canonical order.
pub fn canonical_pair<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Derive the stable room id for a pair of users.
///
/// Commutative: `room_id(a, b) == room_id(b, a)`.
pub fn room_id(a: &str, b: &str) -> String {
    let (lo, hi) = canonical_pair(a, b);
    let digest = Sha256::digest(format!("{lo}:{hi}").as_bytes());
    let hash = hex::encode(digest);
    format!("room_{}", &hash[..ROOM_ID_HEX_LEN])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_id_is_commutative() {
        assert_eq!(room_id("alice", "bob"), room_id("bob", "alice"));
        assert_eq!(room_id("1", "2"), room_id("2", "1"));
    }

    #[test]
    fn test_room_id_is_deterministic() {
        let first = room_id("alice", "bob");
        let second = room_id("alice", "bob");
        assert_eq!(first, second);
    }

    #[test]
    fn test_distinct_pairs_get_distinct_rooms() {
        assert_ne!(room_id("alice", "bob"), room_id("alice", "carol"));
        assert_ne!(room_id("alice", "bob"), room_id("bob", "carol"));
    }

    #[test]
    fn test_room_id_shape() {
        let id = room_id("alice", "bob");
        assert!(id.starts_with("room_"));
        assert_eq!(id.len(), "room_".len() + 16);
    }
}
