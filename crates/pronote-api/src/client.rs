//! Client seams
//!
//! Every call is blocking and talks to the school's server. Callers running
//! on an async runtime must move them to a blocking thread.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::ClientResult;
use crate::models::{
    Absence, AccountType, Average, ClientInfo, Delay, Evaluation, Grade, Homework, Information,
    Lesson, Menu, Period, Punishment,
};

/// Credentials a client is currently logged in with
///
/// After a QR code or token login, `password` holds the token to use for the
/// next [`Connector::token_login`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientCredentials {
    pub pronote_url: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub client_identifier: Option<String>,
}

/// A logged-in session
pub trait PronoteClient: Send + Sync {
    /// The account holder
    fn info(&self) -> ClientInfo;

    fn account_type(&self) -> AccountType;

    /// Children of a parent account, empty for a student account
    fn children(&self) -> Vec<ClientInfo>;

    /// Select the child every later call applies to
    fn set_child(&self, name: &str) -> ClientResult<()>;

    fn selected_child(&self) -> Option<ClientInfo>;

    fn session_check(&self) -> ClientResult<()>;

    fn credentials(&self) -> ClientCredentials;

    /// Lessons from `from` to `to` inclusive, or of `from` alone
    fn lessons(&self, from: NaiveDate, to: Option<NaiveDate>) -> ClientResult<Vec<Lesson>>;

    /// Homework due from `from`, up to `to` inclusive when given
    fn homework(&self, from: NaiveDate, to: Option<NaiveDate>) -> ClientResult<Vec<Homework>>;

    fn information_and_surveys(&self, since: NaiveDateTime) -> ClientResult<Vec<Information>>;

    fn periods(&self) -> ClientResult<Vec<Period>>;

    fn current_period(&self) -> ClientResult<Period>;

    fn grades(&self, period: &Period) -> ClientResult<Vec<Grade>>;

    fn averages(&self, period: &Period) -> ClientResult<Vec<Average>>;

    fn absences(&self, period: &Period) -> ClientResult<Vec<Absence>>;

    fn delays(&self, period: &Period) -> ClientResult<Vec<Delay>>;

    fn punishments(&self, period: &Period) -> ClientResult<Vec<Punishment>>;

    fn evaluations(&self, period: &Period) -> ClientResult<Vec<Evaluation>>;

    /// URL of the timetable iCal export
    fn export_ical(&self) -> ClientResult<String>;

    fn menus(&self, from: NaiveDate, to: Option<NaiveDate>) -> ClientResult<Vec<Menu>>;
}

pub type SharedClient = Arc<dyn PronoteClient>;

/// Fields common to every login
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceLogin {
    #[serde(default)]
    pub account_pin: Option<String>,
    #[serde(default)]
    pub device_name: Option<String>,
    #[serde(default)]
    pub client_identifier: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialsLogin {
    /// Full login page URL
    pub url: String,
    pub username: String,
    pub password: String,
    pub account_type: AccountType,
    /// ENT (regional SSO portal) to log in through
    pub ent: Option<String>,
    pub device: DeviceLogin,
}

/// First login from the QR code shown in the Pronote mobile settings
#[derive(Debug, Clone, PartialEq)]
pub struct QrCodeLogin {
    pub qr_code: serde_json::Value,
    pub pin: String,
    pub uuid: String,
    pub device: DeviceLogin,
}

/// Login with the token handed out by a previous QR code or token login
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenLogin {
    pub url: String,
    pub username: String,
    pub token: String,
    pub uuid: String,
    pub account_type: AccountType,
    pub device: DeviceLogin,
}

/// Opens sessions
pub trait Connector: Send + Sync {
    fn login(&self, login: &CredentialsLogin) -> ClientResult<SharedClient>;

    fn qrcode_login(&self, login: &QrCodeLogin) -> ClientResult<SharedClient>;

    fn token_login(&self, login: &TokenLogin) -> ClientResult<SharedClient>;

    /// Names of the ENT portals this connector can log in through
    fn ent_names(&self) -> Vec<String>;
}
