//! Visibility computation for the repository / service / endpoint tree.
//!
//! [`filter_tree`] is pure: it indexes the three flat collections once,
//! computes a base match set for the active [`ViewMode`], intersects it with
//! the search matches level by level, and derives which parents should be
//! expanded. Every set it returns is closed upward: a visible endpoint always
//! has its service and repository visible too.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::catalog::{Endpoint, EntityId, Repository, Service};
use crate::error::DomainError;

/// Which base set the tree starts from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    /// Everything.
    #[default]
    All,
    /// Starred entities with their ancestors and descendants.
    Favorites,
    /// Endpoints matching [`FilterCriteria`] with their ancestors.
    Filters,
}

impl ViewMode {
    /// Wire name of the mode.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Favorites => "favorites",
            Self::Filters => "filters",
        }
    }
}

impl fmt::Display for ViewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ViewMode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "favorites" => Ok(Self::Favorites),
            "filters" => Ok(Self::Filters),
            _ => Err(DomainError::UnknownViewMode(s.to_string())),
        }
    }
}

/// Predicate used by [`ViewMode::Filters`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterCriteria {
    /// HTTP methods to keep. Empty keeps nothing.
    #[serde(default)]
    pub methods: Vec<String>,
}

impl FilterCriteria {
    /// Criteria keeping the given methods.
    #[must_use]
    pub fn methods<I, S>(methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            methods: methods.into_iter().map(Into::into).collect(),
        }
    }

    fn matches(&self, endpoint: &Endpoint) -> bool {
        self.methods
            .iter()
            .any(|method| method.eq_ignore_ascii_case(&endpoint.method))
    }
}

/// Starred ids per level.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Favorites {
    /// Starred repositories.
    #[serde(default)]
    pub repos: BTreeSet<EntityId>,
    /// Starred services.
    #[serde(default)]
    pub services: BTreeSet<EntityId>,
    /// Starred endpoints.
    #[serde(default)]
    pub endpoints: BTreeSet<EntityId>,
}

impl Favorites {
    /// Returns true if nothing is starred.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.repos.is_empty() && self.services.is_empty() && self.endpoints.is_empty()
    }
}

/// Level of a tree item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    /// A repository.
    Repository,
    /// A service.
    Service,
    /// An endpoint.
    Endpoint,
}

/// Output of [`filter_tree`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisibilitySets {
    /// Visible repositories.
    pub repositories: BTreeSet<EntityId>,
    /// Visible services.
    pub services: BTreeSet<EntityId>,
    /// Visible endpoints.
    pub endpoints: BTreeSet<EntityId>,
    /// Repositories with at least one visible service.
    pub expanded_repositories: BTreeSet<EntityId>,
    /// Services with at least one visible endpoint.
    pub expanded_services: BTreeSet<EntityId>,
}

impl VisibilitySets {
    /// Returns true if the item should be rendered.
    #[must_use]
    pub fn is_item_visible(&self, kind: ItemKind, id: EntityId) -> bool {
        match kind {
            ItemKind::Repository => self.repositories.contains(&id),
            ItemKind::Service => self.services.contains(&id),
            ItemKind::Endpoint => self.endpoints.contains(&id),
        }
    }

    /// Visible repositories in input order.
    #[must_use]
    pub fn visible_repositories<'a>(&self, repositories: &'a [Repository]) -> Vec<&'a Repository> {
        repositories
            .iter()
            .filter(|repo| self.repositories.contains(&repo.id))
            .collect()
    }

    /// Returns true if no level has a visible item.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.repositories.is_empty() && self.services.is_empty() && self.endpoints.is_empty()
    }
}

#[derive(Default)]
struct Matches {
    repositories: BTreeSet<EntityId>,
    services: BTreeSet<EntityId>,
    endpoints: BTreeSet<EntityId>,
}

impl Matches {
    fn intersect(self, other: &Self) -> Self {
        Self {
            repositories: self.repositories.intersection(&other.repositories).copied().collect(),
            services: self.services.intersection(&other.services).copied().collect(),
            endpoints: self.endpoints.intersection(&other.endpoints).copied().collect(),
        }
    }
}

/// Parent-to-children lookups built once per filter call.
struct TreeIndex<'a> {
    services_by_repo: BTreeMap<EntityId, Vec<&'a Service>>,
    endpoints_by_service: BTreeMap<EntityId, Vec<&'a Endpoint>>,
    service_by_id: BTreeMap<EntityId, &'a Service>,
    endpoint_by_id: BTreeMap<EntityId, &'a Endpoint>,
}

impl<'a> TreeIndex<'a> {
    fn build(services: &'a [Service], endpoints: &'a [Endpoint]) -> Self {
        let mut index = Self {
            services_by_repo: BTreeMap::new(),
            endpoints_by_service: BTreeMap::new(),
            service_by_id: BTreeMap::new(),
            endpoint_by_id: BTreeMap::new(),
        };

        for service in services {
            index.services_by_repo.entry(service.repo_id).or_default().push(service);
            index.service_by_id.insert(service.id, service);
        }
        for endpoint in endpoints {
            index
                .endpoints_by_service
                .entry(endpoint.service_id)
                .or_default()
                .push(endpoint);
            index.endpoint_by_id.insert(endpoint.id, endpoint);
        }

        index
    }

    fn services_of(&self, repo_id: EntityId) -> &[&'a Service] {
        self.services_by_repo.get(&repo_id).map_or(&[], Vec::as_slice)
    }

    fn endpoints_of(&self, service_id: EntityId) -> &[&'a Endpoint] {
        self.endpoints_by_service.get(&service_id).map_or(&[], Vec::as_slice)
    }

    /// Adds the service and repository owning `endpoint`, if they still exist.
    fn add_ancestors(&self, endpoint: &Endpoint, matches: &mut Matches) {
        if let Some(service) = self.service_by_id.get(&endpoint.service_id) {
            matches.services.insert(service.id);
            matches.repositories.insert(service.repo_id);
        }
    }

    fn everything(&self, repositories: &[Repository]) -> Matches {
        Matches {
            repositories: repositories.iter().map(|repo| repo.id).collect(),
            services: self.service_by_id.keys().copied().collect(),
            endpoints: self.endpoint_by_id.keys().copied().collect(),
        }
    }

    fn favorites(&self, favorites: &Favorites) -> Matches {
        let mut matches = Matches::default();

        for &repo_id in &favorites.repos {
            matches.repositories.insert(repo_id);
            for service in self.services_of(repo_id) {
                matches.services.insert(service.id);
                matches
                    .endpoints
                    .extend(self.endpoints_of(service.id).iter().map(|e| e.id));
            }
        }

        // Stale ids (deleted since they were starred) are skipped.
        for service_id in &favorites.services {
            if let Some(service) = self.service_by_id.get(service_id) {
                matches.services.insert(service.id);
                matches.repositories.insert(service.repo_id);
                matches
                    .endpoints
                    .extend(self.endpoints_of(service.id).iter().map(|e| e.id));
            }
        }

        for endpoint_id in &favorites.endpoints {
            if let Some(endpoint) = self.endpoint_by_id.get(endpoint_id) {
                matches.endpoints.insert(endpoint.id);
                self.add_ancestors(endpoint, &mut matches);
            }
        }

        matches
    }

    fn criteria(&self, criteria: &FilterCriteria) -> Matches {
        let mut matches = Matches::default();
        if criteria.methods.is_empty() {
            return matches;
        }

        for endpoint in self.endpoint_by_id.values() {
            if criteria.matches(endpoint) {
                matches.endpoints.insert(endpoint.id);
                self.add_ancestors(endpoint, &mut matches);
            }
        }

        matches
    }

    fn search(&self, repositories: &[Repository], query: &str) -> Matches {
        let mut matches = Matches::default();

        for repo in repositories {
            if repo.name.to_lowercase().contains(query) {
                matches.repositories.insert(repo.id);
            }
        }

        for service in self.service_by_id.values() {
            if service.name.to_lowercase().contains(query) {
                matches.services.insert(service.id);
                matches.repositories.insert(service.repo_id);
            }
        }

        for endpoint in self.endpoint_by_id.values() {
            if endpoint.path.to_lowercase().contains(query)
                || endpoint.method.to_lowercase().contains(query)
            {
                matches.endpoints.insert(endpoint.id);
                self.add_ancestors(endpoint, &mut matches);
            }
        }

        matches
    }
}

/// Computes which tree items are visible and which parents are expanded.
///
/// The search query is trimmed and matched case-insensitively as a
/// substring of repository names, service names, endpoint paths and
/// endpoint methods. A blank query leaves the base set untouched.
#[must_use]
pub fn filter_tree(
    repositories: &[Repository],
    services: &[Service],
    endpoints: &[Endpoint],
    mode: ViewMode,
    search_query: &str,
    criteria: &FilterCriteria,
    favorites: &Favorites,
) -> VisibilitySets {
    let index = TreeIndex::build(services, endpoints);

    let mut matches = match mode {
        ViewMode::All => index.everything(repositories),
        ViewMode::Favorites => index.favorites(favorites),
        ViewMode::Filters => index.criteria(criteria),
    };

    let query = search_query.trim().to_lowercase();
    if !query.is_empty() {
        matches = matches.intersect(&index.search(repositories, &query));
    }

    let mut sets = VisibilitySets::default();

    for repo in repositories {
        if !matches.repositories.contains(&repo.id) {
            continue;
        }
        sets.repositories.insert(repo.id);

        for service in index.services_of(repo.id) {
            if !matches.services.contains(&service.id) {
                continue;
            }
            sets.expanded_repositories.insert(repo.id);

            let has_endpoint = index
                .endpoints_of(service.id)
                .iter()
                .any(|endpoint| matches.endpoints.contains(&endpoint.id));
            if has_endpoint {
                sets.expanded_services.insert(service.id);
            }
        }
    }

    sets.services = matches.services;
    sets.endpoints = matches.endpoints;
    sets
}
