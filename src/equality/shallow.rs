use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::hash::Hash;
use std::sync::Arc;

/// A boxed comparison function used by selector subscriptions and derived
/// values to decide whether a new value counts as a change.
pub type Comparator<T> = Arc<dyn Fn(&T, &T) -> bool + Send + Sync>;

/// Single-level structural equality.
///
/// Compares one level of structure: sequence elements, map entries, and set
/// members are compared with `==`, not recursively with `shallow_eq`.
/// `Arc` values short-circuit on pointer identity before looking inside.
pub trait ShallowEq {
    fn shallow_eq(&self, other: &Self) -> bool;
}

macro_rules! impl_shallow_eq_by_value {
    ($($t:ty),* $(,)?) => {$(
        impl ShallowEq for $t {
            fn shallow_eq(&self, other: &Self) -> bool {
                self == other
            }
        }
    )*};
}

impl_shallow_eq_by_value!(
    (),
    bool,
    char,
    i8,
    i16,
    i32,
    i64,
    i128,
    isize,
    u8,
    u16,
    u32,
    u64,
    u128,
    usize,
    f32,
    f64,
    String,
);

impl ShallowEq for &str {
    fn shallow_eq(&self, other: &Self) -> bool {
        self == other
    }
}

impl<T: PartialEq> ShallowEq for Vec<T> {
    fn shallow_eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().zip(other.iter()).all(|(a, b)| a == b)
    }
}

impl<K: Eq + Hash, V: PartialEq> ShallowEq for HashMap<K, V> {
    fn shallow_eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(key, value)| other.get(key).is_some_and(|found| found == value))
    }
}

impl<K: Ord, V: PartialEq> ShallowEq for BTreeMap<K, V> {
    fn shallow_eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(key, value)| other.get(key).is_some_and(|found| found == value))
    }
}

impl<T: Eq + Hash> ShallowEq for HashSet<T> {
    fn shallow_eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|item| other.contains(item))
    }
}

impl<T: Ord> ShallowEq for BTreeSet<T> {
    fn shallow_eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|item| other.contains(item))
    }
}

impl<T: ShallowEq> ShallowEq for Option<T> {
    fn shallow_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (None, None) => true,
            (Some(a), Some(b)) => a.shallow_eq(b),
            _ => false,
        }
    }
}

impl<T: ShallowEq> ShallowEq for Arc<T> {
    fn shallow_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(self, other) || self.as_ref().shallow_eq(other.as_ref())
    }
}

impl<A: PartialEq, B: PartialEq> ShallowEq for (A, B) {
    fn shallow_eq(&self, other: &Self) -> bool {
        self.0 == other.0 && self.1 == other.1
    }
}

impl<A: PartialEq, B: PartialEq, C: PartialEq> ShallowEq for (A, B, C) {
    fn shallow_eq(&self, other: &Self) -> bool {
        self.0 == other.0 && self.1 == other.1 && self.2 == other.2
    }
}

/// Comparator backed by [`ShallowEq`]. This is the default for selector
/// subscriptions and derived values.
pub fn shallow<T: ShallowEq>() -> Comparator<T> {
    Arc::new(|a, b| a.shallow_eq(b))
}

/// Comparator backed by `PartialEq`, for callers that want full deep equality
/// or have types without a `ShallowEq` impl.
pub fn by_partial_eq<T: PartialEq>() -> Comparator<T> {
    Arc::new(|a, b| a == b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitives_compare_by_value() {
        assert!(1i32.shallow_eq(&1));
        assert!(!1i32.shallow_eq(&2));
        assert!("a".to_string().shallow_eq(&"a".to_string()));
    }

    #[test]
    fn sequences_compare_one_level() {
        assert!(vec![1, 2, 3].shallow_eq(&vec![1, 2, 3]));
        assert!(!vec![1, 2].shallow_eq(&vec![1, 2, 3]));
    }

    #[test]
    fn maps_and_sets_compare_entries() {
        let a: HashMap<&str, i32> = [("x", 1), ("y", 2)].into_iter().collect();
        let b: HashMap<&str, i32> = [("y", 2), ("x", 1)].into_iter().collect();
        assert!(a.shallow_eq(&b));

        let c: HashSet<i32> = [1, 2, 3].into_iter().collect();
        let d: HashSet<i32> = [3, 2, 1].into_iter().collect();
        assert!(c.shallow_eq(&d));
        let e: HashSet<i32> = [1, 2].into_iter().collect();
        assert!(!c.shallow_eq(&e));
    }

    #[test]
    fn arc_takes_identity_fast_path() {
        let a = Arc::new(7i32);
        let same = Arc::clone(&a);
        assert!(a.shallow_eq(&same));

        let equal_but_distinct = Arc::new(7i32);
        assert!(a.shallow_eq(&equal_but_distinct));
        assert!(!a.shallow_eq(&Arc::new(8)));
    }
}
