//! Search filtering over the cached proposal set

use crate::proposal::Proposal;
use std::sync::Arc;

/// Proposals whose `uri` contains `query`, ignoring case, in input order.
///
/// An empty query keeps everything.
pub fn filter_by_uri(proposals: &[Proposal], query: &str) -> Vec<Proposal> {
    if query.is_empty() {
        return proposals.to_vec();
    }

    let needle = query.to_lowercase();
    proposals
        .iter()
        .filter(|p| p.uri.to_lowercase().contains(&needle))
        .cloned()
        .collect()
}

/// Memoized filtered view.
///
/// Holds the search string and the last input set; [`ProposalView::filtered`]
/// recomputes only when either has changed since the previous call.
#[derive(Default)]
pub struct ProposalView {
    query: String,
    source: Option<Arc<Vec<Proposal>>>,
    filtered: Vec<Proposal>,
}

impl ProposalView {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn set_query(&mut self, query: impl Into<String>) {
        let query = query.into();
        if query != self.query {
            self.query = query;
            self.source = None;
        }
    }

    /// Filtered view of `proposals` for the current query.
    pub fn filtered(&mut self, proposals: &Arc<Vec<Proposal>>) -> &[Proposal] {
        let stale = match &self.source {
            Some(source) => !Arc::ptr_eq(source, proposals),
            None => true,
        };
        if stale {
            self.filtered = filter_by_uri(proposals, &self.query);
            self.source = Some(proposals.clone());
        }
        &self.filtered
    }
}
