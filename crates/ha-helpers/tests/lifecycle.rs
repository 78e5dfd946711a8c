//! Entry setup, retry, unload and flows through a scripted integration

mod common;

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use common::{test_hass, MockTime};
use ha_config_entries::{ConfigEntry, ConfigEntryState};
use ha_helpers::{
    ConfigFlow, Entity, FlowError, FlowInput, FlowManager, FlowResult, FormField, HomeAssistant,
    Integration, OptionsFlow, SetupError,
};
use serde_json::json;

struct Greeting {
    name: String,
}

impl Entity for Greeting {
    fn domain(&self) -> &str {
        "sensor"
    }

    fn unique_id(&self) -> Option<String> {
        Some(format!("{}-greeting", self.name))
    }

    fn name(&self) -> String {
        format!("greeting {}", self.name)
    }

    fn state(&self) -> Option<String> {
        Some(format!("hello {}", self.name))
    }
}

/// Answers setups from a script, `Ok` once the script is exhausted
#[derive(Default)]
struct Scripted {
    outcomes: Mutex<VecDeque<Result<(), SetupError>>>,
    setups: AtomicUsize,
    unloads: AtomicUsize,
}

impl Scripted {
    fn with(outcomes: Vec<Result<(), SetupError>>) -> Arc<Self> {
        Arc::new(Self {
            outcomes: Mutex::new(outcomes.into()),
            ..Default::default()
        })
    }
}

#[async_trait]
impl Integration for Scripted {
    fn domain(&self) -> &str {
        "scripted"
    }

    async fn setup_entry(
        &self,
        hass: &Arc<HomeAssistant>,
        entry: &ConfigEntry,
    ) -> Result<(), SetupError> {
        self.setups.fetch_add(1, Ordering::SeqCst);
        let outcome = self.outcomes.lock().unwrap().pop_front().unwrap_or(Ok(()));
        if outcome.is_ok() {
            hass.entities.add_entities(
                &entry.entry_id,
                vec![Arc::new(Greeting {
                    name: entry.title.to_lowercase(),
                })],
            );
        }
        outcome
    }

    async fn unload_entry(&self, hass: &Arc<HomeAssistant>, entry: &ConfigEntry) -> bool {
        self.unloads.fetch_add(1, Ordering::SeqCst);
        hass.entities.remove_entry(&entry.entry_id);
        true
    }

    fn config_flow(&self, _hass: &Arc<HomeAssistant>) -> Box<dyn ConfigFlow> {
        Box::new(NameFlow)
    }

    fn options_flow(&self, _entry: &ConfigEntry) -> Option<Box<dyn OptionsFlow>> {
        Some(Box::new(IntervalFlow))
    }
}

struct NameFlow;

#[async_trait]
impl ConfigFlow for NameFlow {
    async fn step(
        &mut self,
        step_id: &str,
        input: Option<FlowInput>,
    ) -> Result<FlowResult, FlowError> {
        if step_id != "user" {
            return Err(FlowError::UnknownStep(step_id.to_string()));
        }
        let form = FlowResult::form("user", vec![FormField::string("name")]);
        let Some(input) = input else {
            return Ok(form);
        };
        let name = input.get("name").and_then(|v| v.as_str()).unwrap_or_default();
        if name.is_empty() {
            let mut errors = HashMap::new();
            errors.insert("name".to_string(), "required".to_string());
            return Ok(form.with_errors(errors));
        }
        Ok(FlowResult::CreateEntry {
            title: name.to_string(),
            data: input.clone(),
            unique_id: Some(name.to_lowercase()),
        })
    }
}

struct IntervalFlow;

#[async_trait]
impl OptionsFlow for IntervalFlow {
    async fn step(
        &mut self,
        _step_id: &str,
        input: Option<FlowInput>,
    ) -> Result<FlowResult, FlowError> {
        match input {
            None => Ok(FlowResult::form(
                "init",
                vec![FormField::integer("interval").default(15)],
            )),
            Some(input) => Ok(FlowResult::CreateEntry {
                title: String::new(),
                data: input,
                unique_id: None,
            }),
        }
    }
}

fn clock() -> MockTime {
    MockTime::at(Utc.with_ymd_and_hms(2024, 3, 11, 6, 0, 0).unwrap())
}

async fn add_entry(hass: &Arc<HomeAssistant>, title: &str) -> String {
    hass.config_entries
        .add(ConfigEntry::new("scripted", title))
        .await
        .unwrap()
        .entry_id
}

#[tokio::test]
async fn test_setup_and_unload() {
    let time = clock();
    let (_dir, hass) = test_hass(&time);
    let integration = Scripted::with(vec![]);
    hass.register_integration(integration.clone());

    let entry_id = add_entry(&hass, "Lea").await;
    let state = hass.setup_entry(&entry_id).await.unwrap();
    assert_eq!(state, ConfigEntryState::Loaded);
    assert_eq!(
        hass.states.get_state("sensor.greeting_lea").as_deref(),
        Some("hello lea")
    );

    assert!(hass.unload_entry(&entry_id).await.unwrap());
    assert_eq!(
        hass.config_entries.get(&entry_id).unwrap().state,
        ConfigEntryState::NotLoaded
    );
    assert!(!hass.states.contains("sensor.greeting_lea"));
    assert_eq!(integration.unloads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_auth_failure_is_final() {
    let time = clock();
    let (_dir, hass) = test_hass(&time);
    let integration = Scripted::with(vec![Err(SetupError::AuthFailed("bad password".into()))]);
    hass.register_integration(integration.clone());

    let entry_id = add_entry(&hass, "Lea").await;
    let state = hass.setup_entry(&entry_id).await.unwrap();
    assert_eq!(state, ConfigEntryState::SetupError);

    let entry = hass.config_entries.get(&entry_id).unwrap();
    assert!(entry.reason.unwrap().contains("bad password"));

    // Unloading a failed entry does not call the integration
    assert!(hass.unload_entry(&entry_id).await.unwrap());
    assert_eq!(integration.unloads.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_not_ready_is_retried() {
    let time = clock();
    let (_dir, hass) = test_hass(&time);
    let integration = Scripted::with(vec![Err(SetupError::NotReady("timeout".into()))]);
    hass.register_integration(integration.clone());

    let entry_id = add_entry(&hass, "Lea").await;
    let state = hass.setup_entry(&entry_id).await.unwrap();
    assert_eq!(state, ConfigEntryState::SetupRetry);

    for _ in 0..60 {
        if hass.config_entries.get(&entry_id).unwrap().is_loaded() {
            break;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    assert!(hass.config_entries.get(&entry_id).unwrap().is_loaded());
    assert_eq!(integration.setups.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_missing_integration_is_setup_error() {
    let time = clock();
    let (_dir, hass) = test_hass(&time);

    let entry_id = add_entry(&hass, "Lea").await;
    assert_eq!(
        hass.setup_entry(&entry_id).await.unwrap(),
        ConfigEntryState::SetupError
    );
}

#[tokio::test]
async fn test_setup_all_only_registered_domains() {
    let time = clock();
    let (_dir, hass) = test_hass(&time);
    hass.register_integration(Scripted::with(vec![]));

    add_entry(&hass, "Lea").await;
    add_entry(&hass, "Tom").await;
    hass.config_entries
        .add(ConfigEntry::new("unknown", "X"))
        .await
        .unwrap();

    let results = hass.setup_all().await;
    assert_eq!(results.len(), 2);
    assert!(results
        .iter()
        .all(|(_, state)| *state == ConfigEntryState::Loaded));
}

#[tokio::test]
async fn test_today_uses_host_time_zone() {
    // 23:30 UTC is already the next day in Paris
    let time = MockTime::at(Utc.with_ymd_and_hms(2024, 3, 10, 23, 30, 0).unwrap());
    let (_dir, hass) = test_hass(&time);
    assert_eq!(hass.today().to_string(), "2024-03-11");

    time.advance(chrono::Duration::days(1));
    assert_eq!(hass.today().to_string(), "2024-03-12");
}

#[tokio::test]
async fn test_config_flow_creates_and_sets_up_entry() {
    let time = clock();
    let (_dir, hass) = test_hass(&time);
    hass.register_integration(Scripted::with(vec![]));
    let flows = FlowManager::new(hass.clone());

    let started = flows.start_config_flow("scripted").await.unwrap();
    assert!(matches!(started.result, FlowResult::Form { ref step_id, .. } if step_id == "user"));
    assert_eq!(flows.list().len(), 1);

    let mut empty = FlowInput::new();
    empty.insert("name".into(), json!(""));
    let retry = flows.progress(&started.flow_id, empty).await.unwrap();
    match retry.result {
        FlowResult::Form { errors, .. } => assert_eq!(errors["name"], "required"),
        other => panic!("expected form, got {:?}", other),
    }

    let mut input = FlowInput::new();
    input.insert("name".into(), json!("Lea"));
    let done = flows.progress(&started.flow_id, input.clone()).await.unwrap();
    assert!(matches!(done.result, FlowResult::CreateEntry { .. }));
    assert!(flows.list().is_empty());

    let entry = hass.config_entries.get_by_unique_id("scripted", "lea").unwrap();
    assert!(entry.is_loaded());

    // Same unique id a second time
    let again = flows.start_config_flow("scripted").await.unwrap();
    let aborted = flows.progress(&again.flow_id, input).await.unwrap();
    assert_eq!(aborted.result, FlowResult::abort("already_configured"));
    assert_eq!(hass.config_entries.len(), 1);
}

#[tokio::test]
async fn test_options_flow_updates_and_reloads() {
    let time = clock();
    let (_dir, hass) = test_hass(&time);
    let integration = Scripted::with(vec![]);
    hass.register_integration(integration.clone());
    let flows = FlowManager::new(hass.clone());

    let entry_id = add_entry(&hass, "Lea").await;
    hass.setup_entry(&entry_id).await.unwrap();

    let started = flows.start_options_flow(&entry_id).await.unwrap();
    let mut input = FlowInput::new();
    input.insert("interval".into(), json!(30));
    flows.progress(&started.flow_id, input).await.unwrap();

    let entry = hass.config_entries.get(&entry_id).unwrap();
    assert_eq!(entry.options["interval"], 30);
    assert!(entry.is_loaded());
    assert_eq!(integration.setups.load(Ordering::SeqCst), 2);
    assert_eq!(integration.unloads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unknown_flow_and_handler() {
    let time = clock();
    let (_dir, hass) = test_hass(&time);
    let flows = FlowManager::new(hass);

    assert!(matches!(
        flows.start_config_flow("missing").await,
        Err(FlowError::UnknownHandler(_))
    ));
    assert!(matches!(
        flows.progress("nope", FlowInput::new()).await,
        Err(FlowError::UnknownFlow(_))
    ));
}
