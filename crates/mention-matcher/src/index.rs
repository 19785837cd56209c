//! Per-category key index and the length-ordered candidate list built from it.

use std::collections::{HashMap, HashSet};

use mention_core::{EntityId, EntityRecord};
use regex::Regex;
use serde::Serialize;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityRef {
    pub id: EntityId,
    pub canonical_name: String,
}

/// Insertion-ordered `key -> entity` map.
///
/// Re-registering a key replaces the entity but keeps the key's original
/// slot, so the last loaded entity wins a collision while iteration order
/// stays that of first registration.
#[derive(Debug, Clone, Default)]
pub struct CategoryIndex {
    entries: Vec<(String, EntityRef)>,
    slots: HashMap<String, usize>,
}

impl CategoryIndex {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a EntityRecord>) -> Self {
        let mut index = Self::default();
        for record in records {
            index.register(record);
        }
        index
    }

    /// Registers the lowercased canonical name, every alternate key and the
    /// alphanumeric-only simplification of the name.
    pub fn register(&mut self, record: &EntityRecord) {
        let entity = EntityRef {
            id: record.id,
            canonical_name: record.canonical_name.clone(),
        };
        self.insert(record.canonical_name.to_lowercase(), entity.clone());
        for alt in &record.alternate_keys {
            self.insert(alt.to_lowercase(), entity.clone());
        }
        self.insert(simplify_key(&record.canonical_name), entity);
    }

    pub fn insert(&mut self, key: String, entity: EntityRef) {
        if key.is_empty() {
            return;
        }
        match self.slots.get(&key) {
            Some(&slot) => self.entries[slot].1 = entity,
            None => {
                self.slots.insert(key.clone(), self.entries.len());
                self.entries.push((key, entity));
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&EntityRef> {
        self.slots.get(key).map(|&slot| &self.entries[slot].1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &EntityRef)> {
        self.entries.iter().map(|(k, e)| (k.as_str(), e))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Lowercase and drop everything outside `[a-z0-9]`.
pub fn simplify_key(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .collect()
}

/// A key ready for matching, with its whole-word pattern compiled once.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub key: String,
    pub entity: EntityRef,
    pattern: Regex,
}

impl Candidate {
    pub fn new(key: &str, entity: EntityRef) -> Result<Self, regex::Error> {
        let pattern = Regex::new(&format!(r"\b{}\b", regex::escape(key)))?;
        Ok(Self {
            key: key.to_string(),
            entity,
            pattern,
        })
    }

    /// Byte range of the first whole-word occurrence in already-lowercased text.
    pub fn find_in(&self, lower: &str) -> Option<(usize, usize)> {
        self.pattern.find(lower).map(|m| (m.start(), m.end()))
    }
}

/// Filters the index down to scannable keys and orders them longest first.
///
/// Keys shorter than `min_key_len` characters or present in `stoplist` are
/// dropped. Equal-length keys keep index order.
pub fn build_candidates(
    index: &CategoryIndex,
    min_key_len: usize,
    stoplist: Option<&HashSet<String>>,
) -> Vec<Candidate> {
    let mut candidates = Vec::with_capacity(index.len());
    for (key, entity) in index.iter() {
        if key.chars().count() < min_key_len {
            continue;
        }
        if stoplist.is_some_and(|words| words.contains(key)) {
            continue;
        }
        match Candidate::new(key, entity.clone()) {
            Ok(candidate) => candidates.push(candidate),
            Err(err) => warn!(key, %err, "skipping key with unbuildable pattern"),
        }
    }
    candidates.sort_by_key(|c| std::cmp::Reverse(c.key.chars().count()));
    candidates
}
