//! Prefix-searchable multimap from key text to logical offsets.
//!
//! [`KeyStoreBuilder`] only accepts inserts; [`KeyStoreBuilder::freeze`]
//! consumes it and yields the query-only [`KeyStore`].

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::ops::Range;

/// Offsets stored under one key, in insertion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Single(u64),
    Multi(Vec<u64>),
}

impl Value {
    pub fn offsets(&self) -> &[u64] {
        match self {
            Value::Single(offset) => std::slice::from_ref(offset),
            Value::Multi(offsets) => offsets,
        }
    }

    fn push(&mut self, offset: u64) {
        match self {
            Value::Single(first) => *self = Value::Multi(vec![*first, offset]),
            Value::Multi(offsets) => offsets.push(offset),
        }
    }
}

#[derive(Debug, Default)]
pub struct KeyStoreBuilder {
    map: BTreeMap<String, Value>,
}

impl KeyStoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `offset` under `key`, and under its lower-cased form when that
    /// differs.
    pub fn insert(&mut self, key: &str, offset: u64) {
        self.add(key.to_owned(), offset);
        let lower = key.to_lowercase();
        if lower != key {
            self.add(lower, offset);
        }
    }

    fn add(&mut self, key: String, offset: u64) {
        match self.map.entry(key) {
            Entry::Vacant(e) => {
                e.insert(Value::Single(offset));
            }
            Entry::Occupied(mut e) => e.get_mut().push(offset),
        }
    }

    /// Number of distinct keys, aliases included.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn freeze(self) -> KeyStore {
        let mut keys = Vec::with_capacity(self.map.len());
        let mut values = Vec::with_capacity(self.map.len());
        for (key, value) in self.map {
            keys.push(key.into_boxed_str());
            values.push(value);
        }
        KeyStore { keys, values }
    }
}

/// Frozen store: keys sorted bytewise, so every prefix owns a contiguous run.
#[derive(Debug, Clone, Default)]
pub struct KeyStore {
    keys: Vec<Box<str>>,
    values: Vec<Value>,
}

impl KeyStore {
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Exact match without case folding.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.position(key).map(|i| &self.values[i])
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.keys.iter().map(|k| &**k)
    }

    /// Rows `(key, offset)` for `word`; retried lower-cased when nothing matches.
    pub fn lookup(&self, word: &str) -> Vec<(&str, u64)> {
        self.with_lowercase_fallback(word, |store, w| {
            let range = match store.position(w) {
                Some(i) => i..i + 1,
                None => 0..0,
            };
            store.rows(range)
        })
    }

    /// Rows for every key starting with `prefix`, in key order.
    pub fn lookup_predictive(&self, prefix: &str) -> Vec<(&str, u64)> {
        self.with_lowercase_fallback(prefix, |store, p| store.rows(store.prefix_range(p)))
    }

    fn with_lowercase_fallback<'a>(
        &'a self,
        word: &str,
        search: impl Fn(&'a Self, &str) -> Vec<(&'a str, u64)>,
    ) -> Vec<(&'a str, u64)> {
        let rows = search(self, word);
        if !rows.is_empty() {
            return rows;
        }
        let lower = word.to_lowercase();
        if lower == word {
            return rows;
        }
        search(self, &lower)
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.keys.binary_search_by(|k| (**k).cmp(key)).ok()
    }

    fn prefix_range(&self, prefix: &str) -> Range<usize> {
        let start = self.keys.partition_point(|k| &**k < prefix);
        let len = self.keys[start..].partition_point(|k| k.starts_with(prefix));
        start..start + len
    }

    fn rows(&self, range: Range<usize>) -> Vec<(&str, u64)> {
        self.keys[range.clone()]
            .iter()
            .zip(&self.values[range])
            .flat_map(|(key, value)| value.offsets().iter().map(move |&o| (&**key, o)))
            .collect()
    }
}
