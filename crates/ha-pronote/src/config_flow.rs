//! Config and options flows

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use ha_config_entries::ConfigEntry;
use ha_helpers::{
    run_blocking, ConfigFlow, FlowError, FlowInput, FlowResult, FormField, HomeAssistant,
    OptionsFlow,
};
use pronote_api::{AccountType, ClientError, Connector, SharedClient};
use serde_json::{json, Value};
use tracing::{debug, error, info};

use crate::client::get_pronote_client;
use crate::consts::{DOMAIN, MAX_ALARM_OFFSET, MAX_REFRESH_INTERVAL};
use crate::entry::{ConnectionType, EntryData, EntryOptions};

pub const STEP_USER: &str = "user";
pub const STEP_USERNAME_PASSWORD: &str = "username_password_login";
pub const STEP_QR_CODE: &str = "qr_code_login";
pub const STEP_PARENT: &str = "parent";

fn base_error(code: &str) -> HashMap<String, String> {
    HashMap::from([("base".to_string(), code.to_string())])
}

fn login_error(err: &ClientError) -> &'static str {
    match err {
        ClientError::InvalidCredentials(_) | ClientError::QrCode(_) => "invalid_auth",
        ClientError::Connection(_) => "cannot_connect",
        _ => "unknown",
    }
}

fn account_types() -> Vec<&'static str> {
    vec![AccountType::Student.page(), AccountType::Parent.page()]
}

/// Adds a Pronote account
///
/// `user` picks the connection type, then either the username/password or
/// the QR code step logs in. Parent accounts end with the choice of a
/// child.
pub struct PronoteConfigFlow {
    hass: Arc<HomeAssistant>,
    connector: Arc<dyn Connector>,
    data: EntryData,
    client: Option<SharedClient>,
}

impl PronoteConfigFlow {
    pub fn new(hass: Arc<HomeAssistant>, connector: Arc<dyn Connector>) -> Self {
        Self {
            hass,
            connector,
            data: EntryData::default(),
            client: None,
        }
    }

    fn user_form() -> FlowResult {
        FlowResult::form(
            STEP_USER,
            vec![FormField::select("connection_type", ["username_password", "qrcode"])
                .default("username_password")],
        )
    }

    fn username_password_form(&self) -> FlowResult {
        let mut fields = vec![
            FormField::string("url"),
            FormField::select("account_type", account_types()),
            FormField::string("username"),
            FormField::password("password"),
        ];
        let ents = self.connector.ent_names();
        if !ents.is_empty() {
            fields.push(FormField::select("ent", ents).optional());
        }
        FlowResult::form(STEP_USERNAME_PASSWORD, fields)
    }

    fn qr_code_form() -> FlowResult {
        FlowResult::form(
            STEP_QR_CODE,
            vec![
                FormField::select("account_type", account_types()),
                FormField::string("qr_code_json"),
                FormField::password("qr_code_pin"),
            ],
        )
    }

    fn parent_form(&self) -> FlowResult {
        let children: Vec<String> = self
            .client
            .as_ref()
            .map(|client| client.children().into_iter().map(|c| c.name).collect())
            .unwrap_or_default();

        FlowResult::form(STEP_PARENT, vec![FormField::select("child", children)])
            .with_placeholders(HashMap::from([(
                "title".to_string(),
                "Enfant(s)".to_string(),
            )]))
    }

    /// Entry data from the user's input, on top of what earlier steps set
    fn merge_input(&self, input: FlowInput) -> Option<EntryData> {
        let mut map = self.data.to_map().ok()?;
        map.extend(input.into_iter().filter(|(_, v)| !v.is_null()));
        EntryData::from_map(&map).ok()
    }

    async fn login(&self, data: &EntryData) -> Result<SharedClient, &'static str> {
        let connector = Arc::clone(&self.connector);
        let login = data.clone();
        match run_blocking(move || get_pronote_client(connector.as_ref(), &login)).await {
            Ok(Ok(client)) => Ok(client),
            Ok(Err(err)) => {
                error!("Pronote login failed: {}", err);
                Err(login_error(&err))
            }
            Err(err) => {
                error!("Unexpected error during Pronote login: {}", err);
                Err("unknown")
            }
        }
    }

    async fn step_login(
        &mut self,
        connection_type: ConnectionType,
        input: FlowInput,
    ) -> Result<FlowResult, FlowError> {
        let form = match connection_type {
            ConnectionType::UsernamePassword => self.username_password_form(),
            ConnectionType::Qrcode => Self::qr_code_form(),
        };

        let Some(mut data) = self.merge_input(input) else {
            return Ok(form.with_errors(base_error("unknown")));
        };
        data.connection_type = connection_type;
        if connection_type == ConnectionType::Qrcode {
            data.qr_code_uuid = Some(uuid::Uuid::new_v4().to_string());
        }

        let client = match self.login(&data).await {
            Ok(client) => client,
            Err(code) => return Ok(form.with_errors(base_error(code))),
        };

        if connection_type == ConnectionType::Qrcode {
            let credentials = client.credentials();
            data.qr_code_json = None;
            data.qr_code_url = Some(credentials.pronote_url);
            data.qr_code_username = Some(credentials.username);
            data.qr_code_password = Some(credentials.password);
            if credentials.uuid.is_some() {
                data.qr_code_uuid = credentials.uuid;
            }
        }

        info!("Logged in to Pronote as {}", client.info().name);
        self.data = data;
        if self.data.account_type == AccountType::Parent {
            self.client = Some(client);
            return Ok(self.parent_form());
        }

        let title = client.info().name;
        self.create_entry(title.clone(), &title)
    }

    fn create_entry(&self, title: String, account: &str) -> Result<FlowResult, FlowError> {
        let unique_id = format!("{}-{}", self.data.login_name().unwrap_or_default(), account);
        if self
            .hass
            .config_entries
            .get_by_unique_id(DOMAIN, &unique_id)
            .is_some()
        {
            return Ok(FlowResult::abort("already_configured"));
        }

        let Ok(data) = self.data.to_map() else {
            return Ok(FlowResult::abort("unknown"));
        };
        Ok(FlowResult::CreateEntry {
            title,
            data,
            unique_id: Some(unique_id),
        })
    }
}

#[async_trait]
impl ConfigFlow for PronoteConfigFlow {
    async fn step(
        &mut self,
        step_id: &str,
        input: Option<FlowInput>,
    ) -> Result<FlowResult, FlowError> {
        debug!("Pronote config flow step {}", step_id);

        match (step_id, input) {
            (STEP_USER, None) => Ok(Self::user_form()),
            (STEP_USER, Some(input)) => {
                match input.get("connection_type").and_then(Value::as_str) {
                    Some("qrcode") => Ok(Self::qr_code_form()),
                    Some("username_password") | None => Ok(self.username_password_form()),
                    Some(_) => Ok(Self::user_form().with_errors(base_error("unknown"))),
                }
            }
            (STEP_USERNAME_PASSWORD, None) => Ok(self.username_password_form()),
            (STEP_USERNAME_PASSWORD, Some(input)) => {
                self.step_login(ConnectionType::UsernamePassword, input).await
            }
            (STEP_QR_CODE, None) => Ok(Self::qr_code_form()),
            (STEP_QR_CODE, Some(input)) => self.step_login(ConnectionType::Qrcode, input).await,
            (STEP_PARENT, None) => Ok(self.parent_form()),
            (STEP_PARENT, Some(input)) => {
                let Some(child) = input.get("child").and_then(Value::as_str) else {
                    return Ok(self.parent_form().with_errors(base_error("unknown")));
                };
                self.data.child = Some(child.to_string());
                self.create_entry(format!("{} (via compte parent)", child), child)
            }
            (other, _) => Err(FlowError::UnknownStep(other.to_string())),
        }
    }
}

/// Edits nickname, refresh interval and alarm offset
pub struct PronoteOptionsFlow {
    current: EntryOptions,
}

impl PronoteOptionsFlow {
    pub fn new(entry: &ConfigEntry) -> Self {
        Self {
            current: EntryOptions::from_entry(entry).unwrap_or_default(),
        }
    }

    fn form(&self) -> FlowResult {
        let mut nickname = FormField::string("nickname").optional();
        if let Some(current) = &self.current.nickname {
            nickname = nickname.default(current.clone());
        }
        FlowResult::form(
            "init",
            vec![
                nickname,
                FormField::integer("refresh_interval").default(self.current.refresh_interval),
                FormField::integer("alarm_offset").default(self.current.alarm_offset),
            ],
        )
    }
}

#[async_trait]
impl OptionsFlow for PronoteOptionsFlow {
    async fn step(
        &mut self,
        step_id: &str,
        input: Option<FlowInput>,
    ) -> Result<FlowResult, FlowError> {
        if step_id != "init" {
            return Err(FlowError::UnknownStep(step_id.to_string()));
        }
        let Some(input) = input else {
            return Ok(self.form());
        };

        let mut errors = HashMap::new();
        let refresh_interval = input
            .get("refresh_interval")
            .map_or(Some(self.current.refresh_interval as i64), Value::as_i64);
        let alarm_offset = input
            .get("alarm_offset")
            .map_or(Some(self.current.alarm_offset), Value::as_i64);

        let refresh_range = 1..=MAX_REFRESH_INTERVAL as i64;
        if !refresh_interval.is_some_and(|minutes| refresh_range.contains(&minutes)) {
            errors.insert("refresh_interval".to_string(), "out_of_range".to_string());
        }
        if !alarm_offset.is_some_and(|minutes| (0..=MAX_ALARM_OFFSET).contains(&minutes)) {
            errors.insert("alarm_offset".to_string(), "out_of_range".to_string());
        }
        if !errors.is_empty() {
            return Ok(self.form().with_errors(errors));
        }

        let nickname = input
            .get("nickname")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_string();

        let data = FlowInput::from([
            ("nickname".to_string(), json!(nickname)),
            ("refresh_interval".to_string(), json!(refresh_interval)),
            ("alarm_offset".to_string(), json!(alarm_offset)),
        ]);
        Ok(FlowResult::CreateEntry {
            title: String::new(),
            data,
            unique_id: None,
        })
    }
}
