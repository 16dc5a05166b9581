use serde::Serialize;

use crate::assets::AssetRegistry;
use crate::client::ApiClient;
use crate::error::{ExplorerError, Result};
use crate::executor::{self, ExecutionResult};
use crate::form::{self, FormDescriptor, FormState, UPLOAD_PATH_SUFFIX};
use crate::history::RequestHistory;
use crate::schema::{self, Operation};
use crate::storage::LocalStore;

pub const HEALTH_PATH: &str = "/api/v1/health";
pub const CONFIG_PATH: &str = "/api/v1/config";
pub const DEFAULT_UPLOAD_PATH: &str = "/api/v1/upload-media";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Connected,
    Error,
}

impl HealthState {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthState::Connected => "connected",
            HealthState::Error => "error",
        }
    }
}

/// Any 2xx is connected; everything else, including no answer at all, is
/// an error.
pub fn probe_health(api: &ApiClient) -> HealthState {
    match api.get(HEALTH_PATH) {
        Ok(resp) if resp.is_success() => {
            log::debug!("health: {}", resp.text);
            HealthState::Connected
        }
        Ok(resp) => {
            log::debug!("health returned http {}", resp.status);
            HealthState::Error
        }
        Err(err) => {
            log::debug!("health probe failed: {err}");
            HealthState::Error
        }
    }
}

/// Explorer session: connection, the loaded catalog and the local
/// registries. Every command goes through one of these.
pub struct Explorer {
    api: ApiClient,
    operations: Vec<Operation>,
    registry: AssetRegistry,
    history: RequestHistory,
}

impl Explorer {
    pub fn new(api: ApiClient, registry: AssetRegistry, history: RequestHistory) -> Self {
        Self {
            api,
            operations: Vec::new(),
            registry,
            history,
        }
    }

    pub fn open(api: ApiClient, store: LocalStore) -> Self {
        let registry = AssetRegistry::open(store.clone());
        let history = RequestHistory::open(store);
        Self::new(api, registry, history)
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn base_url(&self) -> &str {
        self.api.base_url()
    }

    pub fn health(&self) -> HealthState {
        probe_health(&self.api)
    }

    /// Adopts the server's advertised `site_url` when it differs from the
    /// current base URL. Returns the new base URL if it changed.
    pub fn discover_site_url(&mut self) -> Option<String> {
        let config = match self.api.get_json(CONFIG_PATH) {
            Ok(config) => config,
            Err(err) => {
                log::debug!("runtime config unavailable: {err}");
                return None;
            }
        };
        let site_url = config
            .get("site_url")
            .and_then(|v| v.as_str())
            .map(|v| v.trim().trim_end_matches('/'))
            .filter(|v| !v.is_empty())?;
        if site_url == self.api.base_url() {
            return None;
        }
        log::info!("using advertised site url {site_url}");
        self.api.set_base_url(site_url);
        Some(self.api.base_url().to_string())
    }

    /// Loads a fresh catalog. On failure the previous catalog stays.
    pub fn refresh(&mut self) -> Result<&[Operation]> {
        self.operations = schema::load(&self.api)?;
        Ok(&self.operations)
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn find(&self, reference: &str) -> Result<&Operation> {
        find_in(&self.operations, reference)
    }

    /// The upload operation from the catalog, or the conventional one when
    /// the catalog does not list it.
    pub fn upload_operation(&self) -> Operation {
        self.operations
            .iter()
            .find(|op| op.method == "POST" && op.path.ends_with(UPLOAD_PATH_SUFFIX))
            .cloned()
            .unwrap_or_else(|| Operation {
                id: schema::identifier("POST", DEFAULT_UPLOAD_PATH),
                method: "POST".to_string(),
                path: DEFAULT_UPLOAD_PATH.to_string(),
                tags: vec![schema::DEFAULT_TAG.to_string()],
                summary: "Upload media".to_string(),
                description: None,
                operation_id: None,
                params: Vec::new(),
                request_body: None,
                responses: Vec::new(),
            })
    }

    pub fn form_for(&self, op: &Operation) -> (FormDescriptor, FormState) {
        let descriptor = form::build(op, &self.registry);
        let state = FormState::new(&descriptor);
        (descriptor, state)
    }

    pub fn select(&self, reference: &str) -> Result<(FormDescriptor, FormState)> {
        let op = self.find(reference)?;
        Ok(self.form_for(op))
    }

    pub fn execute(&mut self, op: &Operation, state: &FormState) -> Result<ExecutionResult> {
        executor::execute_and_record(
            &self.api,
            op,
            state,
            &mut self.registry,
            &mut self.history,
        )
    }

    pub fn registry(&self) -> &AssetRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut AssetRegistry {
        &mut self.registry
    }

    pub fn history(&self) -> &RequestHistory {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut RequestHistory {
        &mut self.history
    }
}

pub fn find_in<'a>(ops: &'a [Operation], reference: &str) -> Result<&'a Operation> {
    ops.iter()
        .find(|op| op.matches_reference(reference))
        .ok_or_else(|| ExplorerError::UnknownOperation(reference.trim().to_string()))
}
