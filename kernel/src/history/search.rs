use std::cmp::Ordering;

/// Which side of the key to settle on when there is no exact match (or several).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Bound {
    /// The first position whose key is `>= key`
    LeastUpper,
    /// The last position whose key is `<= key`
    GreatestLower,
}

/// Binary search over `values`, which must be sorted ascending by `key_fn`.
///
/// Runs of equal keys resolve to their first element for [`Bound::LeastUpper`] and to their last
/// element for [`Bound::GreatestLower`]. Returns `None` when no element satisfies the bound.
pub(crate) fn search_by_key_with_bounds<T, K: Ord>(
    values: &[T],
    key: K,
    key_fn: impl Fn(&T) -> K,
    bound: Bound,
) -> Option<usize> {
    let (mut lo, mut hi) = (0, values.len());
    while lo != hi {
        let mid = lo + (hi - lo) / 2;
        debug_assert!(lo <= mid && mid < hi);

        match key.cmp(&key_fn(&values[mid])) {
            Ordering::Equal => match bound {
                Bound::LeastUpper => hi = mid,
                Bound::GreatestLower => lo = mid + 1,
            },
            Ordering::Less => hi = mid,
            Ordering::Greater => lo = mid + 1,
        }
    }

    // The bound exists only if the corresponding edge actually moved during the search.
    match bound {
        Bound::LeastUpper if hi < values.len() => Some(hi),
        Bound::GreatestLower if lo > 0 => Some(lo - 1),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const TIMESTAMPS: [i64; 7] = [1000, 2000, 2000, 2000, 3000, 4000, 5000];

    fn ts(x: &i64) -> i64 {
        *x
    }

    #[rstest]
    #[case::exact(3000, Some(4), Some(4))]
    #[case::between(2500, Some(4), Some(3))]
    #[case::run_of_equal_keys(2000, Some(1), Some(3))]
    #[case::before_all(999, Some(0), None)]
    #[case::first(1000, Some(0), Some(0))]
    #[case::last(5000, Some(6), Some(6))]
    #[case::after_all(5001, None, Some(6))]
    fn bounds(
        #[case] key: i64,
        #[case] least_upper: Option<usize>,
        #[case] greatest_lower: Option<usize>,
    ) {
        assert_eq!(
            search_by_key_with_bounds(&TIMESTAMPS, key, ts, Bound::LeastUpper),
            least_upper
        );
        assert_eq!(
            search_by_key_with_bounds(&TIMESTAMPS, key, ts, Bound::GreatestLower),
            greatest_lower
        );
    }

    #[test]
    fn empty_slice_has_no_bounds() {
        let empty: [i64; 0] = [];
        assert_eq!(
            search_by_key_with_bounds(&empty, 5, ts, Bound::LeastUpper),
            None
        );
        assert_eq!(
            search_by_key_with_bounds(&empty, 5, ts, Bound::GreatestLower),
            None
        );
    }

    #[test]
    fn searches_by_projected_key() {
        let pairs = [(100, 1000), (101, 2000), (102, 3000)];
        let idx =
            search_by_key_with_bounds(&pairs, 2500, |(_, t): &(i32, i64)| *t, Bound::GreatestLower);
        assert_eq!(idx.map(|i| pairs[i].0), Some(101));
    }
}
