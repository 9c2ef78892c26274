//! Loads the whole catalog shown in the explorer tree.

use postwhale_domain::{Endpoint, Repository, SavedRequest, Service};

use crate::error::ApplicationResult;
use crate::ports::ActionInvoker;
use crate::use_cases::worker_api::WorkerApi;

const MAX_PREVIEWED_ERRORS: usize = 3;

/// Everything the tree needs, plus the failures met while loading it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    /// All repositories.
    pub repositories: Vec<Repository>,
    /// All services.
    pub services: Vec<Service>,
    /// All endpoints.
    pub endpoints: Vec<Endpoint>,
    /// All saved requests.
    pub saved_requests: Vec<SavedRequest>,
    /// One message per failed list.
    pub errors: Vec<String>,
}

/// Loads repositories, then services, endpoints and saved requests
/// concurrently.
///
/// A failing list is left empty and reported in [`Catalog::errors`]; the
/// loader itself never fails. With no repositories nothing else is fetched.
pub async fn load_catalog<I: ActionInvoker>(api: &WorkerApi<I>) -> Catalog {
    let mut catalog = Catalog::default();

    catalog.repositories = collect(api.repositories().await, "repositories", &mut catalog.errors);
    if catalog.repositories.is_empty() {
        return catalog;
    }

    let (services, endpoints, saved_requests) = tokio::join!(
        api.all_services(),
        api.all_endpoints(),
        api.all_saved_requests()
    );

    catalog.services = collect(services, "services", &mut catalog.errors);
    catalog.endpoints = collect(endpoints, "endpoints", &mut catalog.errors);
    catalog.saved_requests = collect(saved_requests, "saved requests", &mut catalog.errors);

    tracing::debug!(
        repositories = catalog.repositories.len(),
        services = catalog.services.len(),
        endpoints = catalog.endpoints.len(),
        errors = catalog.errors.len(),
        "Catalog loaded"
    );

    catalog
}

fn collect<T>(result: ApplicationResult<Vec<T>>, what: &str, errors: &mut Vec<String>) -> Vec<T> {
    result.unwrap_or_else(|error| {
        tracing::warn!(%error, "Failed to load {what}");
        errors.push(format!("Failed to load {what}: {error}"));
        Vec::new()
    })
}

/// One-line warning for a non-empty error list.
#[must_use]
pub fn summarize_errors(errors: &[String]) -> Option<String> {
    if errors.is_empty() {
        return None;
    }

    let preview = errors
        .iter()
        .take(MAX_PREVIEWED_ERRORS)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join("; ");
    let suffix = if errors.len() > MAX_PREVIEWED_ERRORS {
        format!("; and {} more...", errors.len() - MAX_PREVIEWED_ERRORS)
    } else {
        String::new()
    };

    Some(format!(
        "Warning: {} item(s) failed to load. {preview}{suffix}",
        errors.len()
    ))
}
