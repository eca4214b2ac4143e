use qrotate_core::{AppError, AppResult};

/// Maximum number of remembered search terms.
pub const RECENT_SEARCH_CAPACITY: usize = 5;

/// Bounded, deduplicated, most-recent-first list of search terms.
///
/// Repeating a remembered term does not move it to the front.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecentSearches {
    terms: Vec<String>,
}

impl RecentSearches {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a list from persisted terms, most recent first.
    #[must_use]
    pub fn from_terms(terms: impl IntoIterator<Item = String>) -> Self {
        let mut restored: Vec<String> = Vec::with_capacity(RECENT_SEARCH_CAPACITY);
        for term in terms {
            let term = term.trim();
            if term.is_empty() || restored.iter().any(|existing| existing == term) {
                continue;
            }

            restored.push(term.to_owned());
            if restored.len() == RECENT_SEARCH_CAPACITY {
                break;
            }
        }

        Self { terms: restored }
    }

    /// Decodes the persisted JSON array; malformed values yield an empty list.
    #[must_use]
    pub fn from_json(value: &str) -> Self {
        serde_json::from_str::<Vec<String>>(value)
            .map(Self::from_terms)
            .unwrap_or_default()
    }

    /// Encodes the list as a JSON array of strings.
    pub fn to_json(&self) -> AppResult<String> {
        serde_json::to_string(&self.terms).map_err(|error| {
            AppError::Internal(format!("failed to encode recent searches: {error}"))
        })
    }

    /// Remembers a term and returns whether the list changed.
    pub fn add(&mut self, term: &str) -> bool {
        let term = term.trim();
        if term.is_empty() || self.contains(term) {
            return false;
        }

        self.terms.insert(0, term.to_owned());
        self.terms.truncate(RECENT_SEARCH_CAPACITY);
        true
    }

    /// Forgets every term.
    pub fn clear(&mut self) {
        self.terms.clear();
    }

    /// Returns whether the term is remembered.
    #[must_use]
    pub fn contains(&self, term: &str) -> bool {
        self.terms.iter().any(|existing| existing == term)
    }

    /// Returns the term at one position.
    #[must_use]
    pub fn get(&self, position: usize) -> Option<&str> {
        self.terms.get(position).map(String::as_str)
    }

    /// Returns remembered terms, most recent first.
    #[must_use]
    pub fn terms(&self) -> &[String] {
        self.terms.as_slice()
    }

    /// Returns the number of remembered terms.
    #[must_use]
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    /// Returns whether nothing is remembered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::{RECENT_SEARCH_CAPACITY, RecentSearches};

    #[test]
    fn adding_same_term_twice_keeps_single_entry() {
        let mut searches = RecentSearches::new();

        assert!(searches.add("invoice"));
        assert!(!searches.add("invoice"));

        assert_eq!(searches.terms(), ["invoice".to_owned()]);
    }

    #[test]
    fn repeated_term_is_not_moved_to_front() {
        let mut searches = RecentSearches::new();
        searches.add("alpha");
        searches.add("beta");
        searches.add("gamma");

        assert!(!searches.add("alpha"));
        assert_eq!(searches.terms(), ["gamma", "beta", "alpha"]);
    }

    #[test]
    fn sixth_term_evicts_oldest() {
        let mut searches = RecentSearches::new();
        for term in ["one", "two", "three", "four", "five", "six"] {
            searches.add(term);
        }

        assert_eq!(searches.terms(), ["six", "five", "four", "three", "two"]);
    }

    #[test]
    fn blank_terms_are_ignored() {
        let mut searches = RecentSearches::new();
        assert!(!searches.add("   "));
        assert!(searches.is_empty());
    }

    #[test]
    fn malformed_json_restores_empty_list() {
        assert!(RecentSearches::from_json("{not json").is_empty());
        assert!(RecentSearches::from_json("{\"a\":1}").is_empty());
    }

    #[test]
    fn json_restore_drops_duplicates_and_excess_terms() {
        let searches =
            RecentSearches::from_json(r#"["a","b","a","c","d","e","f","g"]"#);

        assert_eq!(searches.terms(), ["a", "b", "c", "d", "e"]);
        assert_eq!(
            searches.to_json().unwrap_or_default(),
            r#"["a","b","c","d","e"]"#
        );
    }

    proptest! {
        #[test]
        fn list_stays_bounded_and_unique(terms in proptest::collection::vec("[a-z]{1,4}", 0..40)) {
            let mut searches = RecentSearches::new();
            for term in &terms {
                searches.add(term);
            }

            prop_assert!(searches.len() <= RECENT_SEARCH_CAPACITY);
            let mut unique = searches.terms().to_vec();
            unique.sort();
            unique.dedup();
            prop_assert_eq!(unique.len(), searches.len());
        }

        #[test]
        fn newest_distinct_term_is_first(terms in proptest::collection::vec("[a-z]{1,4}", 1..40)) {
            let mut searches = RecentSearches::new();
            let mut last_inserted = None;
            for term in &terms {
                if searches.add(term) {
                    last_inserted = Some(term.clone());
                }
            }

            prop_assert_eq!(searches.get(0).map(str::to_owned), last_inserted);
        }
    }
}
