//! Ordered, de-duplicated collection of discovered request points

use crate::request::{FuzzableRequest, RequestId};
use std::collections::HashSet;
use url::Url;

/// Target scope: the origins (scheme, host, port) of the configured targets
#[derive(Debug, Clone, Default)]
pub struct Scope {
    base_urls: HashSet<String>,
}

impl Scope {
    /// Build the scope from the configured target URLs
    pub fn new<'a>(targets: impl IntoIterator<Item = &'a Url>) -> Self {
        Self {
            base_urls: targets
                .into_iter()
                .map(|url| url.origin().ascii_serialization())
                .collect(),
        }
    }

    /// Whether the URL's base URL belongs to one of the targets
    pub fn contains(&self, url: &Url) -> bool {
        self.base_urls.contains(&url.origin().ascii_serialization())
    }

    /// Whether no target is configured
    pub fn is_empty(&self) -> bool {
        self.base_urls.is_empty()
    }
}

/// Insertion-ordered set of fuzzable requests
///
/// Requests are keyed by [`RequestId`], so two requests that only differ by
/// parameter values or URL fragment occupy a single slot.
#[derive(Debug, Clone, Default)]
pub struct WorkList {
    items: Vec<FuzzableRequest>,
    seen: HashSet<RequestId>,
}

impl WorkList {
    /// Create an empty work list
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a work list from requests, dropping duplicates
    pub fn from_requests(requests: impl IntoIterator<Item = FuzzableRequest>) -> Self {
        let mut list = Self::new();
        list.extend(requests);
        list
    }

    /// Insert a request, stripping its fragment first
    ///
    /// Returns `false` when a request with the same identity is already present.
    pub fn insert(&mut self, mut request: FuzzableRequest) -> bool {
        request.strip_fragment();
        if !self.seen.insert(request.id()) {
            return false;
        }
        self.items.push(request);
        true
    }

    /// Insert a request only if its base URL is inside `scope`
    pub fn insert_in_scope(&mut self, request: FuzzableRequest, scope: &Scope) -> bool {
        scope.contains(request.url()) && self.insert(request)
    }

    /// Insert every request, returning how many were new
    pub fn extend(&mut self, requests: impl IntoIterator<Item = FuzzableRequest>) -> usize {
        requests
            .into_iter()
            .map(|request| self.insert(request))
            .filter(|added| *added)
            .count()
    }

    /// Membership test by request identity
    pub fn contains(&self, request: &FuzzableRequest) -> bool {
        let mut request = request.clone();
        request.strip_fragment();
        self.seen.contains(&request.id())
    }

    /// Number of distinct request points
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the list is empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterate in insertion order
    pub fn iter(&self) -> std::slice::Iter<'_, FuzzableRequest> {
        self.items.iter()
    }

    /// Requests in insertion order
    pub fn as_slice(&self) -> &[FuzzableRequest] {
        &self.items
    }

    /// Consume into the ordered request vector
    pub fn into_vec(self) -> Vec<FuzzableRequest> {
        self.items
    }
}

impl<'a> IntoIterator for &'a WorkList {
    type Item = &'a FuzzableRequest;
    type IntoIter = std::slice::Iter<'a, FuzzableRequest>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
