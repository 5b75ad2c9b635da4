//! Leader election for room creation
//!
//! Exactly one participant may create the shared room when none exists.
//! The rule is coordination-free: the peer holding the numerically lowest
//! stable session ID creates it; everyone else waits and joins.

/// Whether the local participant should create the room
///
/// `peers` is the ordered set of currently joined session IDs (it may
/// include the local ID itself; equality never vetoes).
pub fn should_create_room(local_id: i64, peers: &[i64]) -> bool {
    !peers.iter().any(|&peer| peer < local_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_lowest_id_creates() {
        let peers = [5, 12, 3];
        assert!(should_create_room(3, &peers));
        assert!(!should_create_room(5, &peers));
        assert!(!should_create_room(12, &peers));
    }

    #[test]
    fn test_sole_participant_creates() {
        assert!(should_create_room(42, &[42]));
        assert!(should_create_room(42, &[]));
    }

    #[test]
    fn test_tie_on_own_id_does_not_veto() {
        // The peer list includes the local participant
        assert!(should_create_room(1, &[1, 2, 3]));
    }

    proptest! {
        /// For any set of distinct IDs, exactly one participant elects itself
        #[test]
        fn prop_exactly_one_creator(ids in proptest::collection::hash_set(any::<i64>(), 1..20)) {
            let peers: Vec<i64> = ids.iter().copied().collect();
            let creators = peers
                .iter()
                .filter(|&&id| should_create_room(id, &peers))
                .count();
            prop_assert_eq!(creators, 1);
        }
    }
}
