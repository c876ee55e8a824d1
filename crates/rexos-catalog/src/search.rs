//! Name matching shared by both index formats

use crate::{CatalogError, SearchResult};
use regex::{Regex, RegexBuilder};

/// How a query is tested against an indexed name. All modes ignore case.
#[derive(Debug, Clone)]
pub enum NameMatch {
    /// Whole name equals the query
    Exact(String),
    /// Name contains the query
    Partial(String),
    /// Name contains every word of the query, in any order
    Words(Vec<String>),
    /// Name matches the pattern; `None` when the pattern failed to compile
    Regex(Option<Regex>),
}

impl NameMatch {
    pub fn exact(query: &str) -> Self {
        NameMatch::Exact(query.to_lowercase())
    }

    pub fn partial(query: &str) -> Self {
        NameMatch::Partial(query.to_lowercase())
    }

    pub fn words(query: &str) -> Self {
        NameMatch::Words(
            query
                .to_lowercase()
                .split_whitespace()
                .map(|w| w.to_string())
                .collect(),
        )
    }

    /// An invalid pattern yields a matcher that matches nothing
    pub fn regex(pattern: &str) -> Self {
        match RegexBuilder::new(pattern).case_insensitive(true).build() {
            Ok(re) => NameMatch::Regex(Some(re)),
            Err(err) => {
                tracing::debug!("Invalid search pattern {:?}: {}", pattern, err);
                NameMatch::Regex(None)
            }
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        match self {
            NameMatch::Exact(query) => name.to_lowercase() == *query,
            NameMatch::Partial(query) => name.to_lowercase().contains(query.as_str()),
            NameMatch::Words(words) => {
                if words.is_empty() {
                    return false;
                }
                let name = name.to_lowercase();
                words.iter().all(|word| name.contains(word.as_str()))
            }
            NameMatch::Regex(Some(re)) => re.is_match(name),
            NameMatch::Regex(None) => false,
        }
    }
}

/// Read side of a built index.
///
/// System ids are the canonical ids from the system registry. `None` as the
/// system scans every indexed system. Result order is unspecified.
pub trait IndexEngine {
    /// Every entry of `system` whose name passes `test`
    fn scan(
        &self,
        system: Option<&str>,
        test: &dyn Fn(&str) -> bool,
    ) -> Result<Vec<SearchResult>, CatalogError>;

    /// Ids of systems with at least one entry
    fn systems(&self) -> Result<Vec<String>, CatalogError>;

    /// Number of indexed entries
    fn total(&self) -> Result<usize, CatalogError>;

    fn search(
        &self,
        system: Option<&str>,
        matcher: &NameMatch,
    ) -> Result<Vec<SearchResult>, CatalogError> {
        self.scan(system, &|name| matcher.matches(name))
    }

    fn search_exact(
        &self,
        system: Option<&str>,
        query: &str,
    ) -> Result<Vec<SearchResult>, CatalogError> {
        self.search(system, &NameMatch::exact(query))
    }

    fn search_partial(
        &self,
        system: Option<&str>,
        query: &str,
    ) -> Result<Vec<SearchResult>, CatalogError> {
        self.search(system, &NameMatch::partial(query))
    }

    fn search_words(
        &self,
        system: Option<&str>,
        query: &str,
    ) -> Result<Vec<SearchResult>, CatalogError> {
        self.search(system, &NameMatch::words(query))
    }

    fn search_regex(
        &self,
        system: Option<&str>,
        pattern: &str,
    ) -> Result<Vec<SearchResult>, CatalogError> {
        self.search(system, &NameMatch::regex(pattern))
    }
}
