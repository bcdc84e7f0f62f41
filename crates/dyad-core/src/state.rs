//! The [`State`] mapping shared by agents, environments, and components.
//!
//! A `State` is an insertion-ordered map from string keys to [`Value`]s.
//! Namespacing is by key prefix (`environment/count`), which keeps the
//! type flat and cheap to merge.

use indexmap::map::Entry;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::MergeError;
use crate::Value;

/// How [`State::merge`] resolves a key defined on both sides.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OnConflict {
    /// The incoming value replaces the existing one.
    Overwrite,
    /// The existing value is kept; the incoming one is discarded.
    Keep,
    /// Fail with [`MergeError::KeyConflict`] if the values differ.
    /// Equal values on both sides are not a conflict.
    Error,
}

/// An ordered mapping from string keys to values.
///
/// # Examples
///
/// ```
/// use dyad_core::{OnConflict, State, Value};
///
/// let mut a = State::new();
/// a.set("count", 1);
/// let mut b = State::new();
/// b.set("count", 2);
///
/// assert!(a.merge(&b, OnConflict::Error).is_err());
/// let merged = a.merge(&b, OnConflict::Overwrite).unwrap();
/// assert_eq!(merged.get("count"), Some(&Value::from(2)));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct State {
    items: IndexMap<String, Value>,
}

impl State {
    /// An empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.items.get(key)
    }

    /// Insert or replace a value. Replacing keeps the key's position.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.items.insert(key.into(), value.into());
    }

    /// Remove a key, returning its value. Preserves the order of the rest.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.items.shift_remove(key)
    }

    /// Whether `key` is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.items.contains_key(key)
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the state holds no keys.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.items.keys().map(String::as_str)
    }

    /// `(key, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.items.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Remove every key.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Remove every key that starts with `prefix`.
    pub fn clear_prefix(&mut self, prefix: &str) {
        self.items.retain(|k, _| !k.starts_with(prefix));
    }

    /// A new state holding the keys that start with `prefix`, with the
    /// prefix stripped.
    pub fn slice_by_prefix(&self, prefix: &str) -> State {
        self.items
            .iter()
            .filter_map(|(k, v)| k.strip_prefix(prefix).map(|rest| (rest.to_owned(), v.clone())))
            .collect()
    }

    /// Insert each `(key, value)` of `items` under `prefix`.
    pub fn set_nested<K, V>(&mut self, prefix: &str, items: impl IntoIterator<Item = (K, V)>)
    where
        K: AsRef<str>,
        V: Into<Value>,
    {
        for (k, v) in items {
            self.items.insert(format!("{prefix}{}", k.as_ref()), v.into());
        }
    }

    /// Merge `other` into a copy of `self`.
    ///
    /// The result holds the union of both key sets. Keys only present on
    /// one side keep their value; shared keys are resolved by `on_conflict`.
    /// Neither input is modified.
    pub fn merge(&self, other: &State, on_conflict: OnConflict) -> Result<State, MergeError> {
        self.merge_prefixed(other, "", on_conflict)
    }

    /// Like [`merge`](Self::merge), but every key of `other` is placed
    /// under `prefix` first.
    pub fn merge_prefixed(
        &self,
        other: &State,
        prefix: &str,
        on_conflict: OnConflict,
    ) -> Result<State, MergeError> {
        let mut out = self.clone();
        out.absorb(other, prefix, on_conflict)?;
        Ok(out)
    }

    /// In-place merge. On error `self` may hold a prefix of `other`'s keys,
    /// so callers that need atomicity use [`merge`](Self::merge).
    pub fn absorb(
        &mut self,
        other: &State,
        prefix: &str,
        on_conflict: OnConflict,
    ) -> Result<(), MergeError> {
        for (key, value) in &other.items {
            let key = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{prefix}{key}")
            };
            match self.items.entry(key) {
                Entry::Vacant(slot) => {
                    slot.insert(value.clone());
                }
                Entry::Occupied(mut slot) => match on_conflict {
                    OnConflict::Overwrite => {
                        slot.insert(value.clone());
                    }
                    OnConflict::Keep => {}
                    OnConflict::Error => {
                        if slot.get() != value {
                            return Err(MergeError::KeyConflict {
                                key: slot.key().clone(),
                            });
                        }
                    }
                },
            }
        }
        Ok(())
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for State {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            items: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl<K: Into<String>, V: Into<Value>> Extend<(K, V)> for State {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (k, v) in iter {
            self.set(k, v);
        }
    }
}

impl<'a> IntoIterator for &'a State {
    type Item = (&'a String, &'a Value);
    type IntoIter = indexmap::map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn arb_state(keys: &'static [&'static str]) -> impl Strategy<Value = State> {
        prop::collection::vec((prop::sample::select(keys), -5i64..5), 0..8)
            .prop_map(|pairs| pairs.into_iter().collect::<State>())
    }

    #[test]
    fn set_replaces_in_place() {
        let mut s = State::new();
        s.set("a", 1);
        s.set("b", 2);
        s.set("a", 3);
        assert_eq!(s.keys().collect::<Vec<_>>(), ["a", "b"]);
        assert_eq!(s.get("a"), Some(&Value::from(3)));
    }

    #[test]
    fn keep_retains_existing_value() {
        let a: State = [("k", 1)].into_iter().collect();
        let b: State = [("k", 2), ("j", 5)].into_iter().collect();
        let merged = a.merge(&b, OnConflict::Keep).unwrap();
        assert_eq!(merged.get("k"), Some(&Value::from(1)));
        assert_eq!(merged.get("j"), Some(&Value::from(5)));
    }

    #[test]
    fn equal_values_are_not_a_conflict() {
        let a: State = [("k", "x")].into_iter().collect();
        let merged = a.merge(&a.clone(), OnConflict::Error).unwrap();
        assert_eq!(merged, a);
    }

    #[test]
    fn conflict_reports_prefixed_key() {
        let mut base = State::new();
        base.set("env/count", 1);
        let other: State = [("count", 2)].into_iter().collect();
        let err = base
            .merge_prefixed(&other, "env/", OnConflict::Error)
            .unwrap_err();
        assert_eq!(
            err,
            MergeError::KeyConflict {
                key: "env/count".into()
            }
        );
    }

    #[test]
    fn failed_merge_leaves_inputs_untouched() {
        let a: State = [("k", 1)].into_iter().collect();
        let b: State = [("z", 0), ("k", 2)].into_iter().collect();
        assert!(a.merge(&b, OnConflict::Error).is_err());
        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 2);
    }

    #[test]
    fn prefix_helpers() {
        let mut s = State::new();
        s.set("environment/count", 3);
        s.set("environment/door", "open");
        s.set("agent/phase", "observing");
        s.set_nested("components/bag/", [("items", 2)]);

        let env = s.slice_by_prefix("environment/");
        assert_eq!(env.keys().collect::<Vec<_>>(), ["count", "door"]);
        assert_eq!(s.get("components/bag/items"), Some(&Value::from(2)));

        s.clear_prefix("environment/");
        assert_eq!(
            s.keys().collect::<Vec<_>>(),
            ["agent/phase", "components/bag/items"]
        );
    }

    #[test]
    fn serializes_as_plain_object() {
        let s: State = [("b", 1), ("a", 2)].into_iter().collect();
        assert_eq!(serde_json::to_string(&s).unwrap(), r#"{"b":1,"a":2}"#);
    }

    proptest! {
        #[test]
        fn disjoint_merge_is_union(
            a in arb_state(&["a", "b", "c"]),
            b in arb_state(&["x", "y", "z"]),
        ) {
            let merged = a.merge(&b, OnConflict::Error).unwrap();
            let expected: BTreeSet<&str> = a.keys().chain(b.keys()).collect();
            let got: BTreeSet<&str> = merged.keys().collect();
            prop_assert_eq!(got, expected);
            for (k, v) in a.iter().chain(b.iter()) {
                prop_assert_eq!(merged.get(k), Some(v));
            }
        }

        #[test]
        fn overwrite_takes_incoming_value(
            a in arb_state(&["k", "m"]),
            b in arb_state(&["k", "n"]),
        ) {
            let merged = a.merge(&b, OnConflict::Overwrite).unwrap();
            for (k, v) in b.iter() {
                prop_assert_eq!(merged.get(k), Some(v));
            }
            for (k, v) in a.iter().filter(|(k, _)| !b.contains_key(k)) {
                prop_assert_eq!(merged.get(k), Some(v));
            }
        }

        #[test]
        fn error_fails_exactly_on_differing_shared_keys(
            a in arb_state(&["k", "m"]),
            b in arb_state(&["k", "n"]),
        ) {
            let differs = a
                .iter()
                .any(|(k, v)| b.get(k).is_some_and(|w| w != v));
            let result = a.merge(&b, OnConflict::Error);
            prop_assert_eq!(result.is_err(), differs);
            if let Err(MergeError::KeyConflict { key }) = result {
                prop_assert_ne!(a.get(&key), b.get(&key));
            }
        }
    }
}
