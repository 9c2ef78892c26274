//! Editable request configurations and dirty tracking.
//!
//! An [`EditableConfig`] is what the request editor mutates. It keeps the
//! [`ConfigSnapshot`] captured when it was loaded or last saved; the config
//! is dirty exactly when a fresh [`EditableConfig::extract_snapshot`] differs
//! from that snapshot. Both sides of the comparison go through the same
//! projection, so adding a tracked field only ever touches
//! `extract_snapshot` and `undo`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::catalog::{Endpoint, EntityId, SavedRequest};

/// Id prefix for configs that are not backed by a saved request.
pub const ANONYMOUS_ID_PREFIX: &str = "temp_";

/// One row of the query-parameter or header table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValueParam {
    /// Parameter or header name.
    pub key: String,
    /// Value as typed by the user.
    pub value: String,
    /// Disabled rows are kept but not sent.
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

const fn enabled_by_default() -> bool {
    true
}

impl KeyValueParam {
    /// Creates an enabled row.
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            enabled: true,
        }
    }

    /// Returns true if the row should be sent: enabled with key and value.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.enabled && !self.key.is_empty() && !self.value.is_empty()
    }
}

/// The tracked fields of a config, captured at load or save time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSnapshot {
    /// Preset name; `None` for anonymous configs.
    #[serde(default)]
    pub name: Option<String>,
    /// Path parameter values by name.
    #[serde(default)]
    pub path_params: BTreeMap<String, String>,
    /// Query parameter rows.
    #[serde(default)]
    pub query_params: Vec<KeyValueParam>,
    /// Header rows.
    #[serde(default)]
    pub headers: Vec<KeyValueParam>,
    /// Raw body.
    #[serde(default)]
    pub body: String,
}

/// Persisted form of a config: identity plus its tracked fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredConfig {
    /// Config id (`temp_<endpointId>` or the saved request id).
    pub id: String,
    /// Endpoint the config targets.
    pub endpoint_id: EntityId,
    /// Tracked fields.
    #[serde(flatten)]
    pub snapshot: ConfigSnapshot,
}

/// Fields sent with `saveSavedRequest` / `updateSavedRequest`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedRequestFields {
    /// Endpoint the preset belongs to.
    pub endpoint_id: EntityId,
    /// Preset name.
    pub name: String,
    /// JSON object of path parameters.
    pub path_params_json: String,
    /// JSON array of query rows.
    pub query_params_json: String,
    /// JSON array of header rows.
    pub headers_json: String,
    /// Raw body.
    pub body: String,
}

/// A request ready to hand to the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRequest {
    /// Path with parameters substituted and query string appended.
    pub path: String,
    /// Active headers, later rows overriding earlier ones.
    pub headers: BTreeMap<String, String>,
    /// Raw body.
    pub body: String,
}

/// Path parameters that block sending.
#[derive(Debug, Clone, Default, PartialEq, Eq, thiserror::Error)]
#[error("missing path parameters: {missing:?}, invalid path parameters: {invalid:?}")]
pub struct PathParamError {
    /// Parameters without a value.
    pub missing: Vec<String>,
    /// Parameters whose value tries to escape the path.
    pub invalid: Vec<String>,
}

/// A request configuration open in the editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditableConfig {
    /// Config id.
    pub id: String,
    /// Endpoint the config targets.
    pub endpoint_id: EntityId,
    /// Preset name.
    pub name: Option<String>,
    /// Path parameter values.
    pub path_params: BTreeMap<String, String>,
    /// Query parameter rows.
    pub query_params: Vec<KeyValueParam>,
    /// Header rows.
    pub headers: Vec<KeyValueParam>,
    /// Raw body.
    pub body: String,
    /// Status of the last response shown for this config. Display only.
    pub last_status: Option<u16>,
    original_snapshot: ConfigSnapshot,
}

impl EditableConfig {
    fn from_parts(id: String, endpoint_id: EntityId, snapshot: ConfigSnapshot) -> Self {
        Self {
            id,
            endpoint_id,
            name: snapshot.name.clone(),
            path_params: snapshot.path_params.clone(),
            query_params: snapshot.query_params.clone(),
            headers: snapshot.headers.clone(),
            body: snapshot.body.clone(),
            last_status: None,
            original_snapshot: snapshot,
        }
    }

    /// Default config for an endpoint that has no saved preset.
    ///
    /// Declared query parameters get empty rows and a JSON content type
    /// header is pre-filled.
    #[must_use]
    pub fn anonymous(endpoint: &Endpoint) -> Self {
        let snapshot = ConfigSnapshot {
            name: None,
            path_params: BTreeMap::new(),
            query_params: endpoint
                .query_parameter_names()
                .into_iter()
                .map(|name| KeyValueParam::new(name, ""))
                .collect(),
            headers: default_headers(),
            body: String::new(),
        };
        Self::from_parts(
            format!("{ANONYMOUS_ID_PREFIX}{}", endpoint.id),
            endpoint.id,
            snapshot,
        )
    }

    /// Config for a saved preset. Malformed JSON columns fall back to
    /// defaults instead of failing.
    #[must_use]
    pub fn from_saved_request(saved: &SavedRequest) -> Self {
        let snapshot = ConfigSnapshot {
            name: Some(saved.name.clone()),
            path_params: parse_or(&saved.path_params_json, BTreeMap::new),
            query_params: parse_or(&saved.query_params_json, Vec::new),
            headers: parse_or(&saved.headers_json, default_headers),
            body: saved.body.clone(),
        };
        Self::from_parts(saved.id.to_string(), saved.endpoint_id, snapshot)
    }

    /// Rebuilds a config from its persisted form; it starts clean.
    #[must_use]
    pub fn from_stored(stored: StoredConfig) -> Self {
        Self::from_parts(stored.id, stored.endpoint_id, stored.snapshot)
    }

    /// Persisted form of the current (possibly unsaved) fields.
    #[must_use]
    pub fn to_stored(&self) -> StoredConfig {
        StoredConfig {
            id: self.id.clone(),
            endpoint_id: self.endpoint_id,
            snapshot: self.extract_snapshot(),
        }
    }

    /// Projects the tracked fields.
    #[must_use]
    pub fn extract_snapshot(&self) -> ConfigSnapshot {
        ConfigSnapshot {
            name: self.name.clone(),
            path_params: self.path_params.clone(),
            query_params: self.query_params.clone(),
            headers: self.headers.clone(),
            body: self.body.clone(),
        }
    }

    /// Snapshot taken at the last load or save.
    #[must_use]
    pub const fn original_snapshot(&self) -> &ConfigSnapshot {
        &self.original_snapshot
    }

    /// Returns true if any tracked field differs from the snapshot.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.extract_snapshot() != self.original_snapshot
    }

    /// Replaces the snapshot with the current fields. Call after a
    /// successful save.
    pub fn capture_snapshot(&mut self) {
        self.original_snapshot = self.extract_snapshot();
    }

    /// Restores every tracked field from the snapshot.
    pub fn undo(&mut self) {
        let snapshot = self.original_snapshot.clone();
        self.name = snapshot.name;
        self.path_params = snapshot.path_params;
        self.query_params = snapshot.query_params;
        self.headers = snapshot.headers;
        self.body = snapshot.body;
    }

    /// Returns true if the config is backed by a saved preset.
    #[must_use]
    pub fn is_saved_request(&self) -> bool {
        !self.id.starts_with(ANONYMOUS_ID_PREFIX)
    }

    /// Serializes the tracked fields into the worker's saved-request shape.
    ///
    /// # Errors
    ///
    /// Returns an error if a table cannot be encoded as JSON.
    pub fn to_saved_request_fields(
        &self,
        name: impl Into<String>,
    ) -> Result<SavedRequestFields, serde_json::Error> {
        Ok(SavedRequestFields {
            endpoint_id: self.endpoint_id,
            name: name.into(),
            path_params_json: serde_json::to_string(&self.path_params)?,
            query_params_json: serde_json::to_string(&self.query_params)?,
            headers_json: serde_json::to_string(&self.headers)?,
            body: self.body.clone(),
        })
    }

    /// Substitutes path parameters into `path_template` and appends the
    /// active query rows.
    ///
    /// # Errors
    ///
    /// Returns [`PathParamError`] when a parameter referenced by the template
    /// or present in the table has no value, or a value contains `../`.
    pub fn resolve(&self, path_template: &str) -> Result<ResolvedRequest, PathParamError> {
        let mut error = PathParamError::default();
        let mut path = path_template.to_string();

        for (key, value) in &self.path_params {
            if value.trim().is_empty() {
                error.missing.push(key.clone());
            } else if value.contains("../") || value.contains("..\\") {
                error.invalid.push(key.clone());
            } else {
                path = path.replace(&format!("{{{key}}}"), &urlencoding::encode(value));
            }
        }

        for name in path_param_names(path_template) {
            let provided = self
                .path_params
                .get(&name)
                .is_some_and(|value| !value.trim().is_empty());
            if !provided && !error.missing.contains(&name) {
                error.missing.push(name);
            }
        }

        if !error.missing.is_empty() || !error.invalid.is_empty() {
            return Err(error);
        }

        let query = self
            .query_params
            .iter()
            .filter(|row| row.is_active())
            .map(|row| {
                format!(
                    "{}={}",
                    urlencoding::encode(&row.key),
                    urlencoding::encode(&row.value)
                )
            })
            .collect::<Vec<_>>()
            .join("&");

        if !query.is_empty() {
            let separator = if path.contains('?') { '&' } else { '?' };
            path = format!("{path}{separator}{query}");
        }

        let headers = self
            .headers
            .iter()
            .filter(|row| row.is_active())
            .map(|row| (row.key.clone(), row.value.clone()))
            .collect();

        Ok(ResolvedRequest {
            path,
            headers,
            body: self.body.clone(),
        })
    }
}

/// Names of the `{param}` placeholders in a path template, in order.
#[must_use]
pub fn path_param_names(path_template: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = path_template;
    while let Some(start) = rest.find('{') {
        let after = &rest[start + 1..];
        let Some(end) = after.find('}') else { break };
        if end > 0 {
            names.push(after[..end].to_string());
        }
        rest = &after[end + 1..];
    }
    names
}

fn default_headers() -> Vec<KeyValueParam> {
    vec![KeyValueParam::new("Content-Type", "application/json")]
}

fn parse_or<T, F>(json: &str, fallback: F) -> T
where
    T: serde::de::DeserializeOwned,
    F: FnOnce() -> T,
{
    serde_json::from_str(json).unwrap_or_else(|_| fallback())
}
