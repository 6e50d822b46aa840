//! Paginated list responses
//!
//! List endpoints answer `{items: [...], first, next, previous}`. The
//! pagination links are opaque URLs, passed back verbatim as the `page` of a
//! later search.

use serde::{Deserialize, Serialize};

/// Wire shape of a list response before item transformation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawPage {
    #[serde(default)]
    pub items: Vec<serde_json::Value>,
    #[serde(default)]
    pub first: Option<String>,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub previous: Option<String>,
}

/// One page of transformed items plus its continuation links.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResults<T> {
    pub items: Vec<T>,
    pub first: Option<String>,
    pub next: Option<String>,
    pub previous: Option<String>,
}

impl<T> SearchResults<T> {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            first: None,
            next: None,
            previous: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn has_next(&self) -> bool {
        self.next.as_deref().is_some_and(|n| !n.is_empty())
    }

    /// Applies `f` to every item, keeping the links.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> SearchResults<U> {
        SearchResults {
            items: self.items.into_iter().map(f).collect(),
            first: self.first,
            next: self.next,
            previous: self.previous,
        }
    }
}

impl<T> Default for SearchResults<T> {
    fn default() -> Self {
        Self::empty()
    }
}
