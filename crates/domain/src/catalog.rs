//! Discovered entities: repositories, services, endpoints and the records
//! the worker keeps about them.
//!
//! Field names follow the worker's JSON (camelCase) so these types decode
//! straight out of response payloads.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Identifier of a stored entity, as assigned by the worker's database.
pub type EntityId = i64;

/// A source repository scanned for services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    /// Database id.
    pub id: EntityId,
    /// Display name (directory name of the repository).
    pub name: String,
    /// Absolute path on disk.
    pub path: String,
}

/// A service discovered inside a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    /// Database id.
    pub id: EntityId,
    /// Owning repository.
    pub repo_id: EntityId,
    /// Routing identifier of the service (used to build URLs).
    pub service_id: String,
    /// Display name.
    pub name: String,
    /// Port the service listens on locally.
    #[serde(default)]
    pub port: u16,
}

/// An HTTP endpoint exposed by a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    /// Database id.
    pub id: EntityId,
    /// Owning service (database id, not the routing id).
    pub service_id: EntityId,
    /// HTTP method, upper case.
    pub method: String,
    /// Path template, e.g. `/orders/{orderId}`.
    pub path: String,
    /// `OpenAPI` operation id, empty when the spec has none.
    #[serde(default)]
    pub operation_id: String,
    /// Parsed operation spec; older workers omit it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<EndpointSpec>,
}

impl Endpoint {
    /// Names of the query parameters declared by the endpoint spec.
    #[must_use]
    pub fn query_parameter_names(&self) -> Vec<String> {
        self.spec
            .as_ref()
            .map(|spec| {
                spec.parameters
                    .iter()
                    .filter(|p| p.location == ParameterLocation::Query)
                    .map(|p| p.name.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// The subset of an `OpenAPI` operation the explorer uses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointSpec {
    /// One-line summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Long description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Declared parameters.
    #[serde(default)]
    pub parameters: Vec<Parameter>,
}

/// A declared operation parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    /// Parameter name.
    pub name: String,
    /// Where the parameter goes.
    #[serde(rename = "in")]
    pub location: ParameterLocation,
    /// Whether the parameter must be supplied.
    #[serde(default)]
    pub required: bool,
}

/// Location of a parameter in the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterLocation {
    /// Substituted into the path template.
    Path,
    /// Appended to the query string.
    Query,
    /// Sent as a request header.
    Header,
}

/// A named request preset stored by the worker.
///
/// The parameter columns are JSON strings, exactly as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedRequest {
    /// Database id.
    pub id: EntityId,
    /// Endpoint the preset belongs to.
    pub endpoint_id: EntityId,
    /// User-chosen name.
    pub name: String,
    /// JSON object of path parameter values.
    #[serde(default)]
    pub path_params_json: String,
    /// JSON array of query parameter rows.
    #[serde(default)]
    pub query_params_json: String,
    /// JSON array of header rows.
    #[serde(default)]
    pub headers_json: String,
    /// Raw request body.
    #[serde(default)]
    pub body: String,
    /// Creation timestamp as reported by the worker.
    #[serde(default)]
    pub created_at: String,
}

/// Deployment environment a request is routed to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Environment {
    /// Local proxy.
    #[default]
    Local,
    /// Staging cluster.
    Staging,
    /// Production cluster.
    Production,
}

/// Result of an HTTP call executed by the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpResponse {
    /// Status code, 0 when the request never reached a server.
    #[serde(default)]
    pub status_code: u16,
    /// Status line text.
    #[serde(default)]
    pub status: String,
    /// Response headers (multi-valued).
    #[serde(default)]
    pub headers: BTreeMap<String, Vec<String>>,
    /// Response body as text.
    #[serde(default)]
    pub body: String,
    /// Round-trip time in milliseconds.
    #[serde(default)]
    pub response_time: u64,
    /// Transport error reported by the worker's HTTP client.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HttpResponse {
    /// Returns true for 2xx responses without a transport error.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none() && (200..300).contains(&self.status_code)
    }
}

/// One executed request from the worker's history table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestHistoryEntry {
    /// Database id.
    pub id: EntityId,
    /// Endpoint that was called.
    pub endpoint_id: EntityId,
    /// Environment name the request was sent to.
    #[serde(default)]
    pub environment: String,
    /// JSON-encoded request headers.
    #[serde(default)]
    pub headers: String,
    /// Request body.
    #[serde(default)]
    pub body: String,
    /// JSON-encoded response.
    #[serde(default)]
    pub response: String,
    /// Timestamp as reported by the worker.
    #[serde(default)]
    pub created_at: String,
}

/// Answer to a `checkPath` action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckPathResult {
    /// Whether anything exists at the path.
    pub exists: bool,
    /// Whether the path is a directory.
    pub is_directory: bool,
    /// Absolute, symlink-resolved path.
    pub resolved_path: String,
}

/// Answer to a `scanDirectory` action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanDirectoryResult {
    /// Directory that was scanned.
    pub base_path: String,
    /// Immediate subdirectories.
    #[serde(default)]
    pub subdirs: Vec<SubdirInfo>,
}

/// A subdirectory candidate for auto-adding as a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubdirInfo {
    /// Directory name.
    pub name: String,
    /// Absolute path.
    pub path: String,
    /// Whether a service layout was detected inside.
    #[serde(default)]
    pub has_services: bool,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn service_decodes_worker_shape() {
        let service: Service = serde_json::from_value(json!({
            "id": 2,
            "repoId": 1,
            "serviceId": "moby",
            "name": "Moby",
            "port": 8080
        }))
        .unwrap();

        assert_eq!(service.repo_id, 1);
        assert_eq!(service.service_id, "moby");
    }

    #[test]
    fn endpoint_without_spec_has_no_query_params() {
        let endpoint: Endpoint = serde_json::from_value(json!({
            "id": 1,
            "serviceId": 1,
            "method": "GET",
            "path": "/orders"
        }))
        .unwrap();

        assert!(endpoint.spec.is_none());
        assert!(endpoint.query_parameter_names().is_empty());
    }

    #[test]
    fn endpoint_query_params_skip_path_params() {
        let endpoint: Endpoint = serde_json::from_value(json!({
            "id": 3,
            "serviceId": 2,
            "method": "GET",
            "path": "/sessions/{sessionId}",
            "operationId": "getSession",
            "spec": {
                "parameters": [
                    {"name": "sessionId", "in": "path", "required": true},
                    {"name": "includeMessages", "in": "query"}
                ]
            }
        }))
        .unwrap();

        assert_eq!(endpoint.query_parameter_names(), vec!["includeMessages"]);
    }

    #[test]
    fn http_response_success_requires_no_error() {
        let mut response = HttpResponse {
            status_code: 204,
            status: "204 No Content".to_string(),
            headers: BTreeMap::new(),
            body: String::new(),
            response_time: 12,
            error: None,
        };
        assert!(response.is_success());

        response.error = Some("connection reset".to_string());
        assert!(!response.is_success());
    }

    #[test]
    fn environment_uses_upper_case_names() {
        assert_eq!(
            serde_json::to_value(Environment::Staging).unwrap(),
            json!("STAGING")
        );
    }
}
