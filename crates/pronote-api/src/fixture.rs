//! Snapshot-backed client
//!
//! Serves one account's data from a JSON document instead of a live
//! server. The document is a [`Snapshot`]; logins are checked against its
//! credentials and every query filters its lists the way the server does.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::{
    ClientCredentials, Connector, CredentialsLogin, QrCodeLogin, SharedClient, TokenLogin,
};
use crate::error::{ClientError, ClientResult};
use crate::models::{
    Absence, AccountType, Average, ClientInfo, Delay, Evaluation, Grade, Homework, Information,
    Lesson, Menu, Period, Punishment,
};
use crate::PronoteClient;

/// Tokens handed out by [`FixtureConnector`] start with this
pub const TOKEN_PREFIX: &str = "token-";

/// Data of one period
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeriodSnapshot {
    #[serde(flatten)]
    pub period: Period,
    #[serde(default)]
    pub grades: Vec<Grade>,
    #[serde(default)]
    pub averages: Vec<Average>,
    #[serde(default)]
    pub absences: Vec<Absence>,
    #[serde(default)]
    pub delays: Vec<Delay>,
    #[serde(default)]
    pub punishments: Vec<Punishment>,
    #[serde(default)]
    pub evaluations: Vec<Evaluation>,
}

/// Data of one student
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentSnapshot {
    pub info: ClientInfo,
    #[serde(default)]
    pub lessons: Vec<Lesson>,
    #[serde(default)]
    pub homework: Vec<Homework>,
    #[serde(default)]
    pub information_and_surveys: Vec<Information>,
    #[serde(default)]
    pub periods: Vec<PeriodSnapshot>,
    /// Id of the current period
    #[serde(default)]
    pub current_period: Option<String>,
    #[serde(default)]
    pub menus: Vec<Menu>,
    #[serde(default)]
    pub ical_url: Option<String>,
    /// Categories answering [`ClientError::Unavailable`]
    #[serde(default)]
    pub unavailable: Vec<String>,
}

/// One account as served by its school
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Root URL of the Pronote instance
    pub url: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub account_type: AccountType,
    /// PIN accepted by QR code logins
    #[serde(default)]
    pub qr_code_pin: Option<String>,
    #[serde(default)]
    pub ent_names: Vec<String>,
    /// The account holder
    pub account: ClientInfo,
    /// The student itself for a student account, the children for a parent
    pub students: Vec<StudentSnapshot>,
}

impl Snapshot {
    pub fn from_json(json: &str) -> ClientResult<Self> {
        let snapshot: Snapshot =
            serde_json::from_str(json).map_err(|e| ClientError::Parse(e.to_string()))?;
        if snapshot.students.is_empty() {
            return Err(ClientError::Parse("snapshot has no student".to_string()));
        }
        Ok(snapshot)
    }

    pub fn from_file(path: impl AsRef<Path>) -> ClientResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| ClientError::Parse(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }
}

/// Opens [`FixtureClient`] sessions on a snapshot
pub struct FixtureConnector {
    snapshot: Arc<Snapshot>,
    issued_tokens: AtomicU64,
}

impl FixtureConnector {
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            snapshot: Arc::new(snapshot),
            issued_tokens: AtomicU64::new(0),
        }
    }

    fn next_token(&self, uuid: &str) -> String {
        let n = self.issued_tokens.fetch_add(1, Ordering::SeqCst) + 1;
        format!("{}{}-{}", TOKEN_PREFIX, uuid, n)
    }

    fn check_url(&self, url: &str) -> ClientResult<()> {
        if url.starts_with(&self.snapshot.url) {
            Ok(())
        } else {
            Err(ClientError::Connection(url.to_string()))
        }
    }

    fn check_account(&self, username: &str, account_type: AccountType) -> ClientResult<()> {
        if username != self.snapshot.username || account_type != self.snapshot.account_type {
            return Err(ClientError::InvalidCredentials(format!(
                "unknown {} account {}",
                account_type.page(),
                username
            )));
        }
        Ok(())
    }

    fn open(&self, credentials: ClientCredentials) -> SharedClient {
        debug!("Opened fixture session for {}", credentials.username);
        Arc::new(FixtureClient::new(self.snapshot.clone(), credentials))
    }
}

impl Connector for FixtureConnector {
    fn login(&self, login: &CredentialsLogin) -> ClientResult<SharedClient> {
        self.check_url(&login.url)?;
        if let Some(ent) = &login.ent {
            if !self.snapshot.ent_names.contains(ent) {
                return Err(ClientError::Connection(format!("unknown ENT {}", ent)));
            }
        }
        self.check_account(&login.username, login.account_type)?;
        if login.password != self.snapshot.password {
            return Err(ClientError::InvalidCredentials("wrong password".to_string()));
        }

        Ok(self.open(ClientCredentials {
            pronote_url: login.url.clone(),
            username: login.username.clone(),
            password: login.password.clone(),
            uuid: None,
            client_identifier: login.device.client_identifier.clone(),
        }))
    }

    fn qrcode_login(&self, login: &QrCodeLogin) -> ClientResult<SharedClient> {
        let field = |name: &str| {
            login
                .qr_code
                .get(name)
                .and_then(|v| v.as_str())
                .ok_or_else(|| ClientError::QrCode(format!("missing {}", name)))
        };
        let url = field("url")?;
        field("login")?;
        field("jeton")?;
        self.check_url(url)?;

        if let Some(pin) = &self.snapshot.qr_code_pin {
            if &login.pin != pin {
                return Err(ClientError::QrCode("wrong pin".to_string()));
            }
        }

        Ok(self.open(ClientCredentials {
            pronote_url: url.to_string(),
            username: self.snapshot.username.clone(),
            password: self.next_token(&login.uuid),
            uuid: Some(login.uuid.clone()),
            client_identifier: login.device.client_identifier.clone(),
        }))
    }

    fn token_login(&self, login: &TokenLogin) -> ClientResult<SharedClient> {
        self.check_url(&login.url)?;
        self.check_account(&login.username, login.account_type)?;
        if !login.token.starts_with(TOKEN_PREFIX) {
            return Err(ClientError::InvalidCredentials("invalid token".to_string()));
        }

        Ok(self.open(ClientCredentials {
            pronote_url: login.url.clone(),
            username: login.username.clone(),
            password: self.next_token(&login.uuid),
            uuid: Some(login.uuid.clone()),
            client_identifier: login.device.client_identifier.clone(),
        }))
    }

    fn ent_names(&self) -> Vec<String> {
        self.snapshot.ent_names.clone()
    }
}

/// A session on a [`Snapshot`]
pub struct FixtureClient {
    snapshot: Arc<Snapshot>,
    credentials: ClientCredentials,
    selected: Mutex<usize>,
}

impl FixtureClient {
    pub fn new(snapshot: Arc<Snapshot>, credentials: ClientCredentials) -> Self {
        Self {
            snapshot,
            credentials,
            selected: Mutex::new(0),
        }
    }

    fn student(&self) -> ClientResult<&StudentSnapshot> {
        let index = *self.selected.lock().unwrap_or_else(|p| p.into_inner());
        self.snapshot
            .students
            .get(index)
            .ok_or_else(|| ClientError::Unavailable("student".to_string()))
    }

    /// The selected student, unless `category` is unavailable
    fn serving(&self, category: &str) -> ClientResult<&StudentSnapshot> {
        let student = self.student()?;
        if student.unavailable.iter().any(|c| c == category) {
            return Err(ClientError::Unavailable(category.to_string()));
        }
        Ok(student)
    }

    fn period_data<T: Clone>(
        &self,
        category: &str,
        period: &Period,
        items: impl Fn(&PeriodSnapshot) -> &Vec<T>,
    ) -> ClientResult<Vec<T>> {
        let student = self.serving(category)?;
        Ok(student
            .periods
            .iter()
            .find(|p| p.period.id == period.id)
            .map(|p| items(p).clone())
            .unwrap_or_default())
    }
}

impl PronoteClient for FixtureClient {
    fn info(&self) -> ClientInfo {
        self.snapshot.account.clone()
    }

    fn account_type(&self) -> AccountType {
        self.snapshot.account_type
    }

    fn children(&self) -> Vec<ClientInfo> {
        match self.snapshot.account_type {
            AccountType::Parent => self
                .snapshot
                .students
                .iter()
                .map(|s| s.info.clone())
                .collect(),
            AccountType::Student => Vec::new(),
        }
    }

    fn set_child(&self, name: &str) -> ClientResult<()> {
        let index = self
            .snapshot
            .students
            .iter()
            .position(|s| s.info.name == name)
            .ok_or_else(|| ClientError::ChildNotFound(name.to_string()))?;
        *self.selected.lock().unwrap_or_else(|p| p.into_inner()) = index;
        Ok(())
    }

    fn selected_child(&self) -> Option<ClientInfo> {
        match self.snapshot.account_type {
            AccountType::Parent => self.student().ok().map(|s| s.info.clone()),
            AccountType::Student => None,
        }
    }

    fn session_check(&self) -> ClientResult<()> {
        Ok(())
    }

    fn credentials(&self) -> ClientCredentials {
        self.credentials.clone()
    }

    fn lessons(&self, from: NaiveDate, to: Option<NaiveDate>) -> ClientResult<Vec<Lesson>> {
        let to = to.unwrap_or(from);
        Ok(self
            .serving("lessons")?
            .lessons
            .iter()
            .filter(|l| (from..=to).contains(&l.start.date()))
            .cloned()
            .collect())
    }

    fn homework(&self, from: NaiveDate, to: Option<NaiveDate>) -> ClientResult<Vec<Homework>> {
        Ok(self
            .serving("homework")?
            .homework
            .iter()
            .filter(|h| h.date >= from && to.map_or(true, |to| h.date <= to))
            .cloned()
            .collect())
    }

    fn information_and_surveys(&self, since: NaiveDateTime) -> ClientResult<Vec<Information>> {
        Ok(self
            .serving("information_and_surveys")?
            .information_and_surveys
            .iter()
            .filter(|i| i.creation_date >= since)
            .cloned()
            .collect())
    }

    fn periods(&self) -> ClientResult<Vec<Period>> {
        Ok(self
            .serving("periods")?
            .periods
            .iter()
            .map(|p| p.period.clone())
            .collect())
    }

    fn current_period(&self) -> ClientResult<Period> {
        let student = self.serving("periods")?;
        let id = student
            .current_period
            .as_ref()
            .ok_or_else(|| ClientError::Unavailable("current period".to_string()))?;
        student
            .periods
            .iter()
            .find(|p| &p.period.id == id)
            .map(|p| p.period.clone())
            .ok_or_else(|| ClientError::Unavailable(format!("period {}", id)))
    }

    fn grades(&self, period: &Period) -> ClientResult<Vec<Grade>> {
        self.period_data("grades", period, |p| &p.grades)
    }

    fn averages(&self, period: &Period) -> ClientResult<Vec<Average>> {
        self.period_data("averages", period, |p| &p.averages)
    }

    fn absences(&self, period: &Period) -> ClientResult<Vec<Absence>> {
        self.period_data("absences", period, |p| &p.absences)
    }

    fn delays(&self, period: &Period) -> ClientResult<Vec<Delay>> {
        self.period_data("delays", period, |p| &p.delays)
    }

    fn punishments(&self, period: &Period) -> ClientResult<Vec<Punishment>> {
        self.period_data("punishments", period, |p| &p.punishments)
    }

    fn evaluations(&self, period: &Period) -> ClientResult<Vec<Evaluation>> {
        self.period_data("evaluations", period, |p| &p.evaluations)
    }

    fn export_ical(&self) -> ClientResult<String> {
        self.serving("ical")?
            .ical_url
            .clone()
            .ok_or_else(|| ClientError::Unavailable("ical".to_string()))
    }

    fn menus(&self, from: NaiveDate, to: Option<NaiveDate>) -> ClientResult<Vec<Menu>> {
        let to = to.unwrap_or(from);
        Ok(self
            .serving("menus")?
            .menus
            .iter()
            .filter(|m| (from..=to).contains(&m.date))
            .cloned()
            .collect())
    }
}
