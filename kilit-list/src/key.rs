//! Key derivation shared by every list flavour.

use std::hash::{BuildHasher, Hash};

/// Key of the head sentinel.
pub(crate) const KEY_MIN: usize = 0;

/// Key of the tail sentinel.
pub(crate) const KEY_MAX: usize = usize::MAX;

/// Maps an item's hash into the open interval `(KEY_MIN, KEY_MAX)`.
///
/// The offset guarantees user keys never equal a sentinel key, so items
/// whose hash happens to be 0 or `usize::MAX` behave like any other item
/// instead of corrupting the list boundaries.
#[inline]
pub(crate) fn item_key<T: Hash, S: BuildHasher>(build_hasher: &S, item: &T) -> usize {
    1 + (build_hasher.hash_one(item) as usize) % (usize::MAX - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use foldhash::fast::RandomState;

    #[test]
    fn keys_stay_inside_the_sentinel_range() {
        let s = RandomState::default();
        for item in [0usize, 1, usize::MAX, usize::MAX - 1, 42] {
            let key = item_key(&s, &item);
            assert!(key > KEY_MIN);
            assert!(key < KEY_MAX);
        }
    }
}
