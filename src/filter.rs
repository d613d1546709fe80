// 🚫 Category Exclusion - drop articles by classification code
// Each list is tied to one classification field; lists are checked in order
// and the first hit wins.

use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, Default)]
pub struct ExclusionFilter {
    lists: Vec<(String, HashSet<String>)>,
}

/// Which list matched, for logging
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exclusion<'a> {
    pub field: &'a str,
    pub code: String,
}

impl ExclusionFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a field -> codes map (the shape used in configuration)
    pub fn from_map(lists: &BTreeMap<String, Vec<String>>) -> Self {
        let mut filter = Self::new();
        for (field, codes) in lists {
            filter = filter.with_list(field, codes.iter().cloned());
        }
        filter
    }

    /// Builder pattern: add one exclusion list for a classification field
    pub fn with_list<I>(mut self, field: &str, codes: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        self.lists.push((field.to_string(), codes.into_iter().collect()));
        self
    }

    /// Fields this filter looks at
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.lists.iter().map(|(field, _)| field.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.lists.iter().all(|(_, codes)| codes.is_empty())
    }

    /// Test a record, given a lookup from field name to its code
    ///
    /// Codes are compared exactly; a field the record does not have never
    /// matches.
    pub fn check<'f, 'r, F>(&'f self, lookup: F) -> Option<Exclusion<'f>>
    where
        F: Fn(&str) -> Option<&'r str>,
    {
        for (field, codes) in &self.lists {
            if let Some(code) = lookup(field) {
                if codes.contains(code) {
                    return Some(Exclusion {
                        field,
                        code: code.to_string(),
                    });
                }
            }
        }
        None
    }
}
