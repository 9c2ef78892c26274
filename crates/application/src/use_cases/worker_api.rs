//! Typed client for the worker's action set.
//!
//! Every worker reply to a known action has the shape
//! `{"success": true, "data": ...}`. [`WorkerApi`] sends a [`WorkerAction`]
//! through any [`ActionInvoker`] and decodes `data` into domain types.

use std::collections::BTreeMap;

use postwhale_domain::{
    CheckPathResult, Endpoint, EntityId, Environment, HttpResponse, Repository,
    RequestHistoryEntry, SavedRequest, SavedRequestFields, ScanDirectoryResult, Service,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ApplicationError, ApplicationResult};
use crate::ports::ActionInvoker;

/// Payload of `executeRequest`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRequestInput {
    /// Routing id of the target service.
    pub service_id: String,
    /// Local port of the service.
    pub port: u16,
    /// Resolved path including the query string.
    pub endpoint: String,
    /// HTTP method.
    pub method: String,
    /// Environment to route to.
    pub environment: Environment,
    /// Request headers.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Raw body.
    #[serde(default)]
    pub body: String,
    /// Endpoint id; when present the worker records the call in its history.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_id: Option<EntityId>,
}

/// Payload of `updateSavedRequest`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateSavedRequestInput {
    /// Saved request to overwrite.
    pub id: EntityId,
    /// New field values.
    #[serde(flatten)]
    pub fields: SavedRequestFields,
}

/// Result of `refreshRepository`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshSummary {
    /// Repository id.
    pub id: EntityId,
    /// Repository name.
    pub name: String,
    /// Repository path.
    pub path: String,
    /// Services discovered by the rescan.
    #[serde(default)]
    pub services_added: u32,
    /// Endpoints discovered by the rescan.
    #[serde(default)]
    pub endpoints_added: u32,
    /// Non-fatal scan problems.
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// The closed set of actions the worker understands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(
    tag = "action",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum WorkerAction {
    /// Adds and scans a repository.
    AddRepository {
        /// Directory to add.
        path: String,
    },
    /// Lists repositories.
    GetRepositories,
    /// Removes a repository and everything discovered in it.
    RemoveRepository {
        /// Repository id.
        id: EntityId,
    },
    /// Rescans a repository.
    RefreshRepository {
        /// Repository id.
        id: EntityId,
    },
    /// Lists the services of one repository.
    GetServices {
        /// Repository id.
        repository_id: EntityId,
    },
    /// Lists every service.
    GetAllServices,
    /// Lists the endpoints of one service.
    GetEndpoints {
        /// Service database id.
        service_id: EntityId,
    },
    /// Lists every endpoint.
    GetAllEndpoints,
    /// Executes an HTTP request.
    ExecuteRequest(ExecuteRequestInput),
    /// Lists recent executions of an endpoint.
    GetRequestHistory {
        /// Endpoint id.
        endpoint_id: EntityId,
        /// Maximum entries; the worker defaults to 50.
        #[serde(skip_serializing_if = "Option::is_none")]
        limit: Option<u32>,
    },
    /// Lists subdirectories of a directory.
    ScanDirectory {
        /// Directory to scan.
        path: String,
    },
    /// Checks whether a path exists.
    CheckPath {
        /// Path to check.
        path: String,
    },
    /// Creates a saved request.
    SaveSavedRequest(SavedRequestFields),
    /// Lists saved requests of one endpoint.
    GetSavedRequests {
        /// Endpoint id.
        endpoint_id: EntityId,
    },
    /// Lists every saved request.
    GetAllSavedRequests,
    /// Overwrites a saved request.
    UpdateSavedRequest(UpdateSavedRequestInput),
    /// Deletes a saved request.
    DeleteSavedRequest {
        /// Saved request id.
        id: EntityId,
    },
}

impl WorkerAction {
    /// Splits into the wire action name and payload.
    ///
    /// Actions without a payload send an empty object.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be serialized.
    pub fn into_parts(self) -> Result<(String, Value), serde_json::Error> {
        let Value::Object(mut fields) = serde_json::to_value(&self)? else {
            return Ok((String::new(), Value::Null));
        };

        let action = match fields.remove("action") {
            Some(Value::String(name)) => name,
            _ => String::new(),
        };
        let data = fields
            .remove("data")
            .unwrap_or_else(|| Value::Object(Map::new()));

        Ok((action, data))
    }
}

/// Typed wrapper around an [`ActionInvoker`].
#[derive(Debug, Clone)]
pub struct WorkerApi<I> {
    invoker: I,
}

impl<I: ActionInvoker> WorkerApi<I> {
    /// Wraps an invoker.
    pub const fn new(invoker: I) -> Self {
        Self { invoker }
    }

    /// Returns the wrapped invoker.
    pub const fn invoker(&self) -> &I {
        &self.invoker
    }

    /// Sends an action and returns the raw `data` field (`null` when absent).
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails or the payload cannot be encoded.
    pub async fn send(&self, action: WorkerAction) -> ApplicationResult<(String, Value)> {
        let (name, data) = action.into_parts().map_err(|error| ApplicationError::Decode {
            action: "<encode>".to_string(),
            message: error.to_string(),
        })?;

        let result = self.invoker.invoke(&name, data).await?;
        let data = match result {
            Value::Object(mut fields) => fields.remove("data").unwrap_or(Value::Null),
            _ => Value::Null,
        };

        Ok((name, data))
    }

    async fn fetch<T: DeserializeOwned>(&self, action: WorkerAction) -> ApplicationResult<T> {
        let (name, data) = self.send(action).await?;
        decode(&name, data)
    }

    async fn fetch_list<T: DeserializeOwned>(
        &self,
        action: WorkerAction,
    ) -> ApplicationResult<Vec<T>> {
        let (name, data) = self.send(action).await?;
        if data.is_null() {
            return Ok(Vec::new());
        }
        decode(&name, data)
    }

    /// Adds and scans a repository.
    ///
    /// # Errors
    /// Returns an error if the worker rejects the path or the call fails.
    pub async fn add_repository(&self, path: impl Into<String>) -> ApplicationResult<Repository> {
        self.fetch(WorkerAction::AddRepository { path: path.into() })
            .await
    }

    /// Lists repositories.
    ///
    /// # Errors
    /// Returns an error if the call fails.
    pub async fn repositories(&self) -> ApplicationResult<Vec<Repository>> {
        self.fetch_list(WorkerAction::GetRepositories).await
    }

    /// Removes a repository.
    ///
    /// # Errors
    /// Returns an error if the call fails.
    pub async fn remove_repository(&self, id: EntityId) -> ApplicationResult<()> {
        self.send(WorkerAction::RemoveRepository { id }).await?;
        Ok(())
    }

    /// Rescans a repository.
    ///
    /// # Errors
    /// Returns an error if the repository is unknown or the call fails.
    pub async fn refresh_repository(&self, id: EntityId) -> ApplicationResult<RefreshSummary> {
        self.fetch(WorkerAction::RefreshRepository { id }).await
    }

    /// Lists services of a repository.
    ///
    /// # Errors
    /// Returns an error if the call fails.
    pub async fn services(&self, repository_id: EntityId) -> ApplicationResult<Vec<Service>> {
        self.fetch_list(WorkerAction::GetServices { repository_id })
            .await
    }

    /// Lists every service.
    ///
    /// # Errors
    /// Returns an error if the call fails.
    pub async fn all_services(&self) -> ApplicationResult<Vec<Service>> {
        self.fetch_list(WorkerAction::GetAllServices).await
    }

    /// Lists endpoints of a service.
    ///
    /// # Errors
    /// Returns an error if the call fails.
    pub async fn endpoints(&self, service_id: EntityId) -> ApplicationResult<Vec<Endpoint>> {
        self.fetch_list(WorkerAction::GetEndpoints { service_id })
            .await
    }

    /// Lists every endpoint.
    ///
    /// # Errors
    /// Returns an error if the call fails.
    pub async fn all_endpoints(&self) -> ApplicationResult<Vec<Endpoint>> {
        self.fetch_list(WorkerAction::GetAllEndpoints).await
    }

    /// Executes an HTTP request through the worker.
    ///
    /// Transport failures of the target service come back inside
    /// [`HttpResponse::error`], not as an `Err`.
    ///
    /// # Errors
    /// Returns an error if the worker call itself fails.
    pub async fn execute_request(
        &self,
        input: ExecuteRequestInput,
    ) -> ApplicationResult<HttpResponse> {
        self.fetch(WorkerAction::ExecuteRequest(input)).await
    }

    /// Lists recent executions of an endpoint.
    ///
    /// # Errors
    /// Returns an error if the call fails.
    pub async fn request_history(
        &self,
        endpoint_id: EntityId,
        limit: Option<u32>,
    ) -> ApplicationResult<Vec<RequestHistoryEntry>> {
        self.fetch_list(WorkerAction::GetRequestHistory { endpoint_id, limit })
            .await
    }

    /// Lists subdirectories of a directory.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be read or the call fails.
    pub async fn scan_directory(
        &self,
        path: impl Into<String>,
    ) -> ApplicationResult<ScanDirectoryResult> {
        self.fetch(WorkerAction::ScanDirectory { path: path.into() })
            .await
    }

    /// Checks whether a path exists.
    ///
    /// # Errors
    /// Returns an error if the call fails.
    pub async fn check_path(&self, path: impl Into<String>) -> ApplicationResult<CheckPathResult> {
        self.fetch(WorkerAction::CheckPath { path: path.into() })
            .await
    }

    /// Creates a saved request.
    ///
    /// # Errors
    /// Returns an error if the call fails.
    pub async fn save_saved_request(
        &self,
        fields: SavedRequestFields,
    ) -> ApplicationResult<SavedRequest> {
        self.fetch(WorkerAction::SaveSavedRequest(fields)).await
    }

    /// Lists saved requests of an endpoint.
    ///
    /// # Errors
    /// Returns an error if the call fails.
    pub async fn saved_requests(&self, endpoint_id: EntityId) -> ApplicationResult<Vec<SavedRequest>> {
        self.fetch_list(WorkerAction::GetSavedRequests { endpoint_id })
            .await
    }

    /// Lists every saved request.
    ///
    /// # Errors
    /// Returns an error if the call fails.
    pub async fn all_saved_requests(&self) -> ApplicationResult<Vec<SavedRequest>> {
        self.fetch_list(WorkerAction::GetAllSavedRequests).await
    }

    /// Overwrites a saved request.
    ///
    /// # Errors
    /// Returns an error if the call fails.
    pub async fn update_saved_request(
        &self,
        id: EntityId,
        fields: SavedRequestFields,
    ) -> ApplicationResult<SavedRequest> {
        self.fetch(WorkerAction::UpdateSavedRequest(UpdateSavedRequestInput { id, fields }))
            .await
    }

    /// Deletes a saved request.
    ///
    /// # Errors
    /// Returns an error if the call fails.
    pub async fn delete_saved_request(&self, id: EntityId) -> ApplicationResult<()> {
        self.send(WorkerAction::DeleteSavedRequest { id }).await?;
        Ok(())
    }
}

fn decode<T: DeserializeOwned>(action: &str, data: Value) -> ApplicationResult<T> {
    serde_json::from_value(data).map_err(|error| ApplicationError::Decode {
        action: action.to_string(),
        message: error.to_string(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::significant_drop_tightening)]
mod tests {
    use super::*;
    use crate::ports::BridgeError;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Mutex;

    /// Records calls and answers from a queue.
    struct ScriptedInvoker {
        calls: Mutex<Vec<(String, Value)>>,
        replies: Mutex<Vec<Result<Value, BridgeError>>>,
    }

    impl ScriptedInvoker {
        fn new(replies: Vec<Result<Value, BridgeError>>) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                replies: Mutex::new(replies),
            }
        }
    }

    impl ActionInvoker for ScriptedInvoker {
        async fn invoke(&self, action: &str, data: Value) -> Result<Value, BridgeError> {
            self.calls.lock().unwrap().push((action.to_string(), data));
            self.replies.lock().unwrap().remove(0)
        }
    }

    #[test]
    fn unit_actions_send_empty_object() {
        let (name, data) = WorkerAction::GetRepositories.into_parts().unwrap();
        assert_eq!(name, "getRepositories");
        assert_eq!(data, json!({}));
    }

    #[test]
    fn struct_actions_use_camel_case_fields() {
        let (name, data) = WorkerAction::GetRequestHistory {
            endpoint_id: 4,
            limit: None,
        }
        .into_parts()
        .unwrap();

        assert_eq!(name, "getRequestHistory");
        assert_eq!(data, json!({"endpointId": 4}));
    }

    #[test]
    fn update_flattens_fields_next_to_id() {
        let fields = SavedRequestFields {
            endpoint_id: 4,
            name: "Order".to_string(),
            path_params_json: "{}".to_string(),
            query_params_json: "[]".to_string(),
            headers_json: "[]".to_string(),
            body: String::new(),
        };
        let (_, data) = WorkerAction::UpdateSavedRequest(UpdateSavedRequestInput { id: 9, fields })
            .into_parts()
            .unwrap();

        assert_eq!(data["id"], 9);
        assert_eq!(data["endpointId"], 4);
        assert_eq!(data["pathParamsJson"], "{}");
    }

    #[tokio::test]
    async fn list_data_is_unwrapped() {
        let invoker = ScriptedInvoker::new(vec![Ok(json!({
            "success": true,
            "data": [{"id": 1, "name": "moby", "path": "/src/moby"}]
        }))]);
        let api = WorkerApi::new(invoker);

        let repos = api.repositories().await.unwrap();

        assert_eq!(repos.len(), 1);
        assert_eq!(repos[0].name, "moby");
        assert_eq!(
            api.invoker().calls.lock().unwrap()[0],
            ("getRepositories".to_string(), json!({}))
        );
    }

    #[tokio::test]
    async fn missing_list_data_is_empty() {
        let api = WorkerApi::new(ScriptedInvoker::new(vec![Ok(json!({"success": true}))]));

        assert!(api.all_endpoints().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_data_is_a_decode_error() {
        let api = WorkerApi::new(ScriptedInvoker::new(vec![Ok(json!({
            "success": true,
            "data": {"exists": "maybe"}
        }))]));

        let error = api.check_path("/tmp").await.unwrap_err();

        assert!(matches!(error, ApplicationError::Decode { ref action, .. } if action == "checkPath"));
    }

    #[tokio::test]
    async fn remote_errors_pass_through() {
        let api = WorkerApi::new(ScriptedInvoker::new(vec![Err(BridgeError::RemoteError(
            "repository not found: 3".to_string(),
        ))]));

        let error = api.refresh_repository(3).await.unwrap_err();

        assert_eq!(error.to_string(), "repository not found: 3");
    }
}
