use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

/// A stable-serialised, hashable label set.
///
/// Backed by a `BTreeMap` rather than a `HashMap` so that iteration (and
/// therefore the canonical serialisation used as the stream-grouping key) is
/// already lexicographically ordered by key, with no sort pass needed on the
/// hot path.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LabelSet(BTreeMap<String, String>);

impl LabelSet {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut map = BTreeMap::new();
        for (k, v) in pairs {
            map.insert(k.into(), v.into());
        }
        Self(map)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Clones this set and injects (or overwrites) the given label.
    ///
    /// Used to produce the per-stream batch-id label: the caller's original
    /// `LabelSet` must never be mutated, since it may still be referenced by
    /// the other side of a `DualTarget`.
    pub fn with_injected(&self, key: &str, value: &str) -> Self {
        let mut cloned = self.clone();
        cloned.insert(key, value);
        cloned
    }

    /// Canonical wire-stable serialisation: `{k1="v1",k2="v2",...}` with keys
    /// in lexicographic order. Changing this format breaks backend stream
    /// identity for every existing tenant, so it must never be "improved".
    pub fn canonical(&self) -> String {
        let mut out = String::with_capacity(2 + self.0.len() * 16);
        out.push('{');
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            let _ = write!(out, "{k}=\"{v}\"");
        }
        out.push('}');
        out
    }
}

impl std::fmt::Display for LabelSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.canonical())
    }
}

impl<K, V> FromIterator<(K, V)> for LabelSet
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::from_pairs(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_orders_keys_lexicographically() {
        let labels = LabelSet::from_pairs([("zeta", "1"), ("alpha", "2"), ("mid", "3")]);
        assert_eq!(labels.canonical(), r#"{alpha="2",mid="3",zeta="1"}"#);
    }

    #[test]
    fn with_injected_does_not_mutate_original() {
        let base = LabelSet::from_pairs([("app", "a")]);
        let injected = base.with_injected("id", "0");
        assert_eq!(base.get("id"), None);
        assert_eq!(injected.get("id"), Some("0"));
        assert_eq!(injected.get("app"), Some("a"));
    }

    #[test]
    fn equal_sets_compare_equal_regardless_of_insertion_order() {
        let a = LabelSet::from_pairs([("a", "1"), ("b", "2")]);
        let b = LabelSet::from_pairs([("b", "2"), ("a", "1")]);
        assert_eq!(a, b);
        assert_eq!(a.canonical(), b.canonical());
    }
}
