//! Config and options flows
//!
//! A flow is a short dialogue of form steps. Each step receives the user
//! input of the previous form (or `None` when the step is first shown) and
//! answers with another form, an entry to create, or an abort.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use ha_config_entries::{ConfigEntriesError, ConfigEntry, ConfigEntryUpdate};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::HomeAssistant;

pub type FlowInput = HashMap<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlowResult {
    Form {
        step_id: String,
        data_schema: Vec<FormField>,
        errors: HashMap<String, String>,
        description_placeholders: HashMap<String, String>,
    },
    CreateEntry {
        title: String,
        data: FlowInput,
        #[serde(skip_serializing_if = "Option::is_none")]
        unique_id: Option<String>,
    },
    Abort {
        reason: String,
    },
}

impl FlowResult {
    pub fn form(step_id: impl Into<String>, data_schema: Vec<FormField>) -> Self {
        FlowResult::Form {
            step_id: step_id.into(),
            data_schema,
            errors: HashMap::new(),
            description_placeholders: HashMap::new(),
        }
    }

    /// Same form, with errors shown to the user
    pub fn with_errors(self, new_errors: HashMap<String, String>) -> Self {
        match self {
            FlowResult::Form {
                step_id,
                data_schema,
                description_placeholders,
                ..
            } => FlowResult::Form {
                step_id,
                data_schema,
                errors: new_errors,
                description_placeholders,
            },
            other => other,
        }
    }

    /// Same form, with values substituted in its description
    pub fn with_placeholders(mut self, placeholders: HashMap<String, String>) -> Self {
        if let FlowResult::Form {
            description_placeholders,
            ..
        } = &mut self
        {
            description_placeholders.extend(placeholders);
        }
        self
    }

    pub fn abort(reason: impl Into<String>) -> Self {
        FlowResult::Abort {
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Password,
    Integer,
    Boolean,
    Select,
}

/// One field of a form schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    /// Allowed values of a `select`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

impl FormField {
    fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: true,
            default: None,
            options: Vec::new(),
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::String)
    }

    pub fn password(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Password)
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Integer)
    }

    pub fn select<I, S>(name: impl Into<String>, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut field = Self::new(name, FieldType::Select);
        field.options = options.into_iter().map(Into::into).collect();
        field
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn default(mut self, value: impl Into<serde_json::Value>) -> Self {
        self.default = Some(value.into());
        self
    }
}

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("No integration registered for domain {0}")]
    UnknownHandler(String),

    #[error("Flow {0} not found")]
    UnknownFlow(String),

    #[error("Unknown step {0}")]
    UnknownStep(String),

    #[error("Integration {0} has no options flow")]
    NoOptionsFlow(String),

    #[error(transparent)]
    ConfigEntries(#[from] ConfigEntriesError),
}

/// The steps creating a new config entry; the first step is `user`
#[async_trait]
pub trait ConfigFlow: Send + Sync {
    async fn step(&mut self, step_id: &str, input: Option<FlowInput>)
        -> Result<FlowResult, FlowError>;
}

/// The steps editing an entry's options; the first step is `init`
#[async_trait]
pub trait OptionsFlow: Send + Sync {
    async fn step(&mut self, step_id: &str, input: Option<FlowInput>)
        -> Result<FlowResult, FlowError>;
}

enum FlowKind {
    Config(Box<dyn ConfigFlow>),
    Options {
        entry_id: String,
        flow: Box<dyn OptionsFlow>,
    },
}

struct ActiveFlow {
    handler: String,
    step_id: String,
    kind: FlowKind,
}

/// A flow result addressed to the flow it belongs to
#[derive(Debug, Clone, Serialize)]
pub struct FlowResponse {
    pub flow_id: String,
    pub handler: String,
    #[serde(flatten)]
    pub result: FlowResult,
}

#[derive(Debug, Clone, Serialize)]
pub struct FlowSummary {
    pub flow_id: String,
    pub handler: String,
    pub step_id: String,
}

/// Drives flows and applies their outcome
///
/// A config flow ending in `CreateEntry` adds the entry and sets it up. An
/// options flow ending in `CreateEntry` stores the options and reloads the
/// entry.
pub struct FlowManager {
    hass: Arc<HomeAssistant>,
    flows: DashMap<String, ActiveFlow>,
}

impl FlowManager {
    pub fn new(hass: Arc<HomeAssistant>) -> Self {
        Self {
            hass,
            flows: DashMap::new(),
        }
    }

    pub async fn start_config_flow(&self, domain: &str) -> Result<FlowResponse, FlowError> {
        let integration = self
            .hass
            .integration(domain)
            .ok_or_else(|| FlowError::UnknownHandler(domain.to_string()))?;

        let flow = ActiveFlow {
            handler: domain.to_string(),
            step_id: "user".to_string(),
            kind: FlowKind::Config(integration.config_flow(&self.hass)),
        };
        self.run(ulid::Ulid::new().to_string(), flow, None).await
    }

    pub async fn start_options_flow(&self, entry_id: &str) -> Result<FlowResponse, FlowError> {
        let entry = self
            .hass
            .config_entries
            .get(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;
        let integration = self
            .hass
            .integration(&entry.domain)
            .ok_or_else(|| FlowError::UnknownHandler(entry.domain.clone()))?;
        let flow = integration
            .options_flow(&entry)
            .ok_or_else(|| FlowError::NoOptionsFlow(entry.domain.clone()))?;

        let flow = ActiveFlow {
            handler: entry.domain.clone(),
            step_id: "init".to_string(),
            kind: FlowKind::Options {
                entry_id: entry_id.to_string(),
                flow,
            },
        };
        self.run(ulid::Ulid::new().to_string(), flow, None).await
    }

    /// Submit user input to the flow's current step
    pub async fn progress(
        &self,
        flow_id: &str,
        input: FlowInput,
    ) -> Result<FlowResponse, FlowError> {
        let (_, flow) = self
            .flows
            .remove(flow_id)
            .ok_or_else(|| FlowError::UnknownFlow(flow_id.to_string()))?;
        self.run(flow_id.to_string(), flow, Some(input)).await
    }

    pub fn abort(&self, flow_id: &str) -> bool {
        self.flows.remove(flow_id).is_some()
    }

    pub fn list(&self) -> Vec<FlowSummary> {
        self.flows
            .iter()
            .map(|r| FlowSummary {
                flow_id: r.key().clone(),
                handler: r.value().handler.clone(),
                step_id: r.value().step_id.clone(),
            })
            .collect()
    }

    async fn run(
        &self,
        flow_id: String,
        mut flow: ActiveFlow,
        input: Option<FlowInput>,
    ) -> Result<FlowResponse, FlowError> {
        debug!("Flow {} ({}) step {}", flow_id, flow.handler, flow.step_id);

        let result = match &mut flow.kind {
            FlowKind::Config(handler) => handler.step(&flow.step_id, input).await?,
            FlowKind::Options { flow: handler, .. } => handler.step(&flow.step_id, input).await?,
        };

        let result = match result {
            FlowResult::Form { ref step_id, .. } => {
                flow.step_id = step_id.clone();
                let handler = flow.handler.clone();
                self.flows.insert(flow_id.clone(), flow);
                return Ok(FlowResponse {
                    flow_id,
                    handler,
                    result,
                });
            }
            FlowResult::CreateEntry {
                title,
                data,
                unique_id,
            } => self.finish(&flow, title, data, unique_id).await?,
            abort @ FlowResult::Abort { .. } => abort,
        };

        Ok(FlowResponse {
            flow_id,
            handler: flow.handler,
            result,
        })
    }

    async fn finish(
        &self,
        flow: &ActiveFlow,
        title: String,
        data: FlowInput,
        unique_id: Option<String>,
    ) -> Result<FlowResult, FlowError> {
        match &flow.kind {
            FlowKind::Config(_) => {
                let mut entry = ConfigEntry::new(&flow.handler, &title).with_data(data.clone());
                entry.unique_id = unique_id.clone();

                let entry = match self.hass.config_entries.add(entry).await {
                    Ok(entry) => entry,
                    Err(ConfigEntriesError::AlreadyExists { .. }) => {
                        return Ok(FlowResult::abort("already_configured"));
                    }
                    Err(err) => return Err(err.into()),
                };

                info!("Flow created entry {} for {}", entry.title, flow.handler);
                self.hass.setup_entry(&entry.entry_id).await?;
            }
            FlowKind::Options { entry_id, .. } => {
                self.hass
                    .update_entry(entry_id, ConfigEntryUpdate::new().options(data.clone()))
                    .await?;
                self.hass.reload_entry(entry_id).await?;
            }
        }

        Ok(FlowResult::CreateEntry {
            title,
            data,
            unique_id,
        })
    }
}
