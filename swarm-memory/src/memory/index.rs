//! Inverted term index over entry key, tags, and type.
//!
//! A reverse map (id → terms) keeps updates and removals proportional to the
//! entry's own term count rather than the size of the index.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::types::{EntryId, MemoryEntry};

/// Term → entry ids.
#[derive(Debug, Default)]
pub struct SearchIndex {
    terms: HashMap<String, HashSet<EntryId>>,
    by_entry: HashMap<EntryId, BTreeSet<String>>,
}

/// How a search term is compared against indexed terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// Indexed term equals or contains the query term.
    Substring,
    /// Substring, or edit distance of at most one.
    Fuzzy,
}

impl SearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Terms derived from an entry: the full key, its word tokens, each tag,
    /// and the entry type. All lowercased.
    pub fn terms_for(entry: &MemoryEntry) -> BTreeSet<String> {
        let mut terms = BTreeSet::new();
        let key = entry.key.to_lowercase();
        terms.extend(tokenize(&key));
        terms.insert(key);
        for tag in &entry.tags {
            terms.insert(tag.to_lowercase());
        }
        terms.insert(entry.entry_type.as_str().to_string());
        terms
    }

    pub fn add_entry(&mut self, entry: &MemoryEntry) {
        let terms = Self::terms_for(entry);
        for term in &terms {
            self.terms
                .entry(term.clone())
                .or_default()
                .insert(entry.id.clone());
        }
        self.by_entry.insert(entry.id.clone(), terms);
    }

    pub fn update_entry(&mut self, entry: &MemoryEntry) {
        self.remove_entry(&entry.id);
        self.add_entry(entry);
    }

    pub fn remove_entry(&mut self, entry_id: &str) {
        let Some(terms) = self.by_entry.remove(entry_id) else {
            return;
        };
        for term in terms {
            if let Some(ids) = self.terms.get_mut(&term) {
                ids.remove(entry_id);
                if ids.is_empty() {
                    self.terms.remove(&term);
                }
            }
        }
    }

    pub fn clear(&mut self) {
        self.terms.clear();
        self.by_entry.clear();
    }

    /// Rebuild from scratch.
    pub fn rebuild<'a>(&mut self, entries: impl IntoIterator<Item = &'a MemoryEntry>) {
        self.clear();
        for entry in entries {
            self.add_entry(entry);
        }
    }

    /// Score every entry matching at least one query token.
    ///
    /// The score is the number of distinct query tokens that matched.
    pub fn search(&self, query: &str, mode: MatchMode) -> HashMap<EntryId, usize> {
        let mut scores: HashMap<EntryId, usize> = HashMap::new();
        let query = query.to_lowercase();
        let mut tokens: BTreeSet<String> = tokenize(&query).collect();
        if tokens.is_empty() && !query.trim().is_empty() {
            tokens.insert(query.trim().to_string());
        }

        for token in &tokens {
            let mut matched: HashSet<&EntryId> = HashSet::new();
            for (term, ids) in &self.terms {
                if term_matches(term, token, mode) {
                    matched.extend(ids.iter());
                }
            }
            for id in matched {
                *scores.entry(id.clone()).or_default() += 1;
            }
        }
        scores
    }

    pub fn contains(&self, entry_id: &str) -> bool {
        self.by_entry.contains_key(entry_id)
    }

    pub fn term_count(&self) -> usize {
        self.terms.len()
    }

    pub fn entry_count(&self) -> usize {
        self.by_entry.len()
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

fn term_matches(term: &str, token: &str, mode: MatchMode) -> bool {
    if term.contains(token) {
        return true;
    }
    mode == MatchMode::Fuzzy && within_one_edit(term, token)
}

/// Levenshtein distance ≤ 1 without building the full matrix.
fn within_one_edit(a: &str, b: &str) -> bool {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (short, long) = if a.len() <= b.len() { (&a, &b) } else { (&b, &a) };
    if long.len() - short.len() > 1 {
        return false;
    }

    let (mut i, mut j, mut edits) = (0, 0, 0);
    while i < short.len() && j < long.len() {
        if short[i] == long[j] {
            i += 1;
            j += 1;
            continue;
        }
        edits += 1;
        if edits > 1 {
            return false;
        }
        if short.len() == long.len() {
            i += 1;
        }
        j += 1;
    }
    edits + (long.len() - j) + (short.len() - i) <= 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::fixtures::entry;
    use crate::types::EntryType;
    use serde_json::json;

    fn tagged(key: &str, tags: &[&str]) -> MemoryEntry {
        let mut e = entry(key, json!(null));
        e.tags = tags.iter().map(|t| t.to_string()).collect();
        e
    }

    #[test]
    fn test_terms_include_key_tokens_tags_and_type() {
        let mut e = tagged("Build-Cache/rust", &["CI"]);
        e.entry_type = EntryType::Cache;
        let terms = SearchIndex::terms_for(&e);
        assert!(terms.contains("build-cache/rust"));
        assert!(terms.contains("build"));
        assert!(terms.contains("rust"));
        assert!(terms.contains("ci"));
        assert!(terms.contains("cache"));
    }

    #[test]
    fn test_search_is_case_insensitive_substring() {
        let mut index = SearchIndex::new();
        let e = tagged("deploy_plan", &["release"]);
        let id = e.id.clone();
        index.add_entry(&e);

        assert!(index.search("DEPLOY", MatchMode::Substring).contains_key(&id));
        assert!(index.search("leas", MatchMode::Substring).contains_key(&id));
        assert!(index.search("missing", MatchMode::Substring).is_empty());
    }

    #[test]
    fn test_score_counts_matched_tokens() {
        let mut index = SearchIndex::new();
        let both = tagged("alpha", &["beta"]);
        let one = tagged("alpha", &[]);
        index.add_entry(&both);
        index.add_entry(&one);

        let scores = index.search("alpha beta", MatchMode::Substring);
        assert_eq!(scores[&both.id], 2);
        assert_eq!(scores[&one.id], 1);
    }

    #[test]
    fn test_remove_scrubs_all_terms() {
        let mut index = SearchIndex::new();
        let e = tagged("alpha", &["beta", "gamma"]);
        let id = e.id.clone();
        index.add_entry(&e);
        index.remove_entry(&id);

        assert!(!index.contains(&id));
        assert_eq!(index.term_count(), 0);
        assert!(index.search("beta", MatchMode::Substring).is_empty());
    }

    #[test]
    fn test_update_replaces_terms() {
        let mut index = SearchIndex::new();
        let mut e = tagged("alpha", &["old"]);
        index.add_entry(&e);
        e.tags = ["new".to_string()].into_iter().collect();
        index.update_entry(&e);

        assert!(index.search("old", MatchMode::Substring).is_empty());
        assert!(index.search("new", MatchMode::Substring).contains_key(&e.id));
        assert_eq!(index.entry_count(), 1);
    }

    #[test]
    fn test_fuzzy_one_edit() {
        let mut index = SearchIndex::new();
        let e = tagged("planner", &[]);
        index.add_entry(&e);

        assert!(index.search("plannr", MatchMode::Substring).is_empty());
        assert!(index.search("plannr", MatchMode::Fuzzy).contains_key(&e.id));
        assert!(index.search("plxnnxr", MatchMode::Fuzzy).is_empty());
    }

    #[test]
    fn test_within_one_edit() {
        assert!(within_one_edit("cat", "cat"));
        assert!(within_one_edit("cat", "cut"));
        assert!(within_one_edit("cat", "cats"));
        assert!(within_one_edit("cat", "at"));
        assert!(!within_one_edit("cat", "dog"));
        assert!(!within_one_edit("cat", "c"));
    }
}
