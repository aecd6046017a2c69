//! Query parameters and filter state.
//!
//! `QueryParameters` is the single description of what a screen displays.
//! It is a value: replacing it and re-fetching replaces the displayed data.

use rootwise_store::{Query, CREATED_AT};
use serde::{Deserialize, Serialize};

use crate::config::{CATALOGUE_LIMIT, LATEST_LIMIT};
use crate::models::{disease_fields, record_fields};

/// Selection value meaning "no plant-name constraint".
pub const ALL_PLANTS: &str = "All";

/// Plant-name constraint on the records list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlantFilter {
    #[default]
    All,
    Named(String),
}

impl PlantFilter {
    /// Interpret a user selection. `"All"` and blank input mean no constraint.
    pub fn from_selection(selection: &str) -> Self {
        let trimmed = selection.trim();
        if trimmed.is_empty() || trimmed == ALL_PLANTS {
            PlantFilter::All
        } else {
            PlantFilter::Named(trimmed.to_string())
        }
    }

    /// The label shown on the selected chip.
    pub fn label(&self) -> &str {
        match self {
            PlantFilter::All => ALL_PLANTS,
            PlantFilter::Named(name) => name,
        }
    }
}

/// Sort direction on one field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortOrder {
    Ascending(String),
    Descending(String),
}

/// Immutable description of what to fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryParameters {
    /// Owner identity; `None` for catalogue queries
    pub owner: Option<String>,
    pub plant: PlantFilter,
    /// Free-text search on the disease name
    pub search: Option<String>,
    pub order: Option<SortOrder>,
    pub limit: Option<usize>,
}

impl QueryParameters {
    /// An owner's plant records, newest first.
    pub fn records(owner: impl Into<String>, plant: PlantFilter) -> Self {
        Self {
            owner: Some(owner.into()),
            plant,
            search: None,
            order: Some(SortOrder::Descending(CREATED_AT.to_string())),
            limit: None,
        }
    }

    /// Disease catalogue ordered by name, optionally narrowed by search text.
    pub fn catalogue(search: &str) -> Self {
        Self::catalogue_capped(search, CATALOGUE_LIMIT)
    }

    pub fn catalogue_capped(search: &str, cap: usize) -> Self {
        let search = search.trim();
        Self {
            owner: None,
            plant: PlantFilter::All,
            search: (!search.is_empty()).then(|| search.to_string()),
            order: Some(SortOrder::Ascending(disease_fields::NAME.to_string())),
            limit: Some(cap),
        }
    }

    /// Oldest catalogue entries first, capped.
    pub fn latest_diseases() -> Self {
        Self {
            owner: None,
            plant: PlantFilter::All,
            search: None,
            order: Some(SortOrder::Ascending(CREATED_AT.to_string())),
            limit: Some(LATEST_LIMIT),
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Translate into document-store clauses.
    pub fn to_queries(&self) -> Vec<Query> {
        let mut queries = Vec::new();
        if let Some(order) = &self.order {
            queries.push(match order {
                SortOrder::Ascending(field) => Query::order_asc(field.as_str()),
                SortOrder::Descending(field) => Query::order_desc(field.as_str()),
            });
        }
        if let Some(owner) = &self.owner {
            queries.push(Query::equal(record_fields::OWNER, owner.as_str()));
        }
        if let PlantFilter::Named(name) = &self.plant {
            queries.push(Query::equal(record_fields::PLANT_NAME, name.as_str()));
        }
        if let Some(text) = &self.search {
            queries.push(Query::search(disease_fields::NAME, text.as_str()));
        }
        if let Some(limit) = self.limit {
            queries.push(Query::limit(limit));
        }
        queries
    }
}

/// The plant-name chip selection on the home screen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterState {
    owner: Option<String>,
    selected: PlantFilter,
}

impl FilterState {
    pub fn new(owner: Option<String>) -> Self {
        Self {
            owner,
            selected: PlantFilter::All,
        }
    }

    pub fn selected(&self) -> &PlantFilter {
        &self.selected
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn set_owner(&mut self, owner: Option<String>) {
        self.owner = owner;
    }

    /// Select a chip directly.
    pub fn select(&mut self, selection: &str) -> &PlantFilter {
        self.selected = PlantFilter::from_selection(selection);
        &self.selected
    }

    /// Tap a chip: tapping the selected plant again reverts to "All".
    pub fn toggle(&mut self, selection: &str) -> &PlantFilter {
        let tapped = PlantFilter::from_selection(selection);
        self.selected = if tapped == self.selected {
            PlantFilter::All
        } else {
            tapped
        };
        &self.selected
    }

    /// Parameters for the records binding; `None` without an owner.
    pub fn params(&self) -> Option<QueryParameters> {
        self.owner
            .as_ref()
            .map(|owner| QueryParameters::records(owner.as_str(), self.selected.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_sentinel_adds_no_plant_clause() {
        let all = QueryParameters::records("ada@example.com", PlantFilter::from_selection("All"));
        let queries = all.to_queries();
        assert!(!queries
            .iter()
            .any(|q| matches!(q, Query::Equal { attribute, .. } if attribute == "plantname")));
        assert_eq!(all, QueryParameters::records("ada@example.com", PlantFilter::All));
    }

    #[test]
    fn test_named_filter_adds_equality() {
        let params = QueryParameters::records("ada@example.com", PlantFilter::from_selection("Basil"));
        assert!(params
            .to_queries()
            .contains(&Query::equal("plantname", "Basil")));
    }

    #[test]
    fn test_blank_search_has_no_search_clause() {
        let params = QueryParameters::catalogue("   ");
        assert_eq!(params.search, None);
        assert_eq!(
            params.to_queries(),
            vec![Query::order_asc("name"), Query::limit(100)]
        );
    }

    #[test]
    fn test_search_clause_on_name() {
        let params = QueryParameters::catalogue(" blight ");
        assert!(params.to_queries().contains(&Query::search("name", "blight")));
    }

    #[test]
    fn test_toggle_reverts_to_all() {
        let mut state = FilterState::new(Some("ada@example.com".into()));
        assert_eq!(state.toggle("Mint"), &PlantFilter::Named("Mint".into()));
        assert_eq!(state.toggle("Mint"), &PlantFilter::All);
        assert_eq!(state.toggle("All"), &PlantFilter::All);
        state.select("Basil");
        assert_eq!(state.toggle("Mint"), &PlantFilter::Named("Mint".into()));
    }

    #[test]
    fn test_params_require_owner() {
        assert_eq!(FilterState::new(None).params(), None);
        let state = FilterState::new(Some("ada@example.com".into()));
        assert_eq!(state.params().unwrap().owner.as_deref(), Some("ada@example.com"));
    }
}
