use std::{convert::Infallible, str::FromStr};

use ahash::AHashSet;
use compact_str::CompactString;

/// A set of permitted client IDs, scopes, or roles
///
/// Entries are compared exactly and case-sensitively. Empty entries are never
/// stored, so an empty candidate can never match.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AllowList(AHashSet<CompactString>);

impl AllowList {
    /// An allow list that permits nothing
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parses a delimited list, trimming whitespace around each entry
    ///
    /// ```
    /// use bearer_gate::AllowList;
    ///
    /// let roles = AllowList::from_delimited("admin| editor||", '|');
    ///
    /// assert_eq!(roles.len(), 2);
    /// assert!(roles.contains("editor"));
    /// assert!(!roles.contains(""));
    /// ```
    #[must_use]
    pub fn from_delimited(raw: &str, delimiter: char) -> Self {
        raw.split(delimiter).collect()
    }

    /// Adds an entry to the list
    ///
    /// Entries that are empty after trimming are ignored.
    pub fn insert(&mut self, entry: &str) {
        let entry = entry.trim();
        if !entry.is_empty() {
            self.0.insert(CompactString::from(entry));
        }
    }

    /// Whether the candidate is permitted
    #[must_use]
    pub fn contains(&self, candidate: &str) -> bool {
        self.0.contains(candidate)
    }

    /// Whether any of the candidates is permitted
    pub fn intersects<'a, I>(&self, candidates: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        candidates.into_iter().any(|c| self.contains(c))
    }

    /// The number of permitted entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the list permits nothing
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the permitted entries in no particular order
    pub fn iter(&self) -> impl Iterator<Item = &str> + '_ {
        self.0.iter().map(CompactString::as_str)
    }
}

/// Parses a comma-separated list
impl FromStr for AllowList {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_delimited(s, ','))
    }
}

impl<'a> FromIterator<&'a str> for AllowList {
    fn from_iter<T: IntoIterator<Item = &'a str>>(iter: T) -> Self {
        let mut list = Self::default();
        list.extend(iter);
        list
    }
}

impl<'a> Extend<&'a str> for AllowList {
    fn extend<T: IntoIterator<Item = &'a str>>(&mut self, iter: T) {
        for entry in iter {
            self.insert(entry);
        }
    }
}
