//! Reference-counted pending-concern flags
//!
//! A coroutine is "still pending something" iff at least one flag has a
//! non-zero count. Counts make raise/lower pairs safe to nest.

use std::collections::HashMap;

/// Named reference counts
#[derive(Debug, Default, Clone)]
pub struct FlagSet {
    counts: HashMap<String, u32>,
}

impl FlagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment `name`
    pub fn raise(&mut self, name: &str) {
        *self.counts.entry(name.to_string()).or_insert(0) += 1;
    }

    /// Decrement `name`; the entry disappears when it reaches zero.
    /// Lowering a flag that is not raised does nothing.
    pub fn lower(&mut self, name: &str) {
        if let Some(count) = self.counts.get_mut(name) {
            *count -= 1;
            if *count == 0 {
                self.counts.remove(name);
            }
        }
    }

    /// Current count for `name` (zero if absent)
    #[inline]
    pub fn count(&self, name: &str) -> u32 {
        self.counts.get(name).copied().unwrap_or(0)
    }

    #[inline]
    pub fn is_raised(&self, name: &str) -> bool {
        self.counts.contains_key(name)
    }

    /// Number of distinct raised flags
    #[inline]
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Raised flag names, unordered
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.counts.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raise_lower_nesting() {
        let mut flags = FlagSet::new();
        assert!(flags.is_empty());

        flags.raise("main");
        flags.raise("main");
        assert_eq!(flags.count("main"), 2);
        assert_eq!(flags.len(), 1);

        flags.lower("main");
        assert!(flags.is_raised("main"));
        flags.lower("main");
        assert!(!flags.is_raised("main"));
        assert!(flags.is_empty());
    }

    #[test]
    fn test_lower_absent_is_noop() {
        let mut flags = FlagSet::new();
        flags.lower("never");
        assert!(flags.is_empty());
        assert_eq!(flags.count("never"), 0);
    }

    #[test]
    fn test_independent_names() {
        let mut flags = FlagSet::new();
        flags.raise("a");
        flags.raise("b");
        flags.lower("a");
        assert_eq!(flags.names().collect::<Vec<_>>(), vec!["b"]);
    }
}
