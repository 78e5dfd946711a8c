//! Building a logged-in client from an entry's data

use std::sync::OnceLock;

use chrono::NaiveDateTime;
use pronote_api::{
    AccountType, ClientError, ClientResult, Connector, CredentialsLogin, Lesson, QrCodeLogin,
    SharedClient, TokenLogin,
};
use regex::Regex;
use tracing::{debug, error, info, warn};

use crate::entry::EntryData;

static HTML_PAGE: OnceLock<Regex> = OnceLock::new();
static NON_LETTER: OnceLock<Regex> = OnceLock::new();

fn cached(cell: &'static OnceLock<Regex>, pattern: &'static str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("literal pattern compiles"))
}

/// Login page URL for an account type
///
/// Any page name already in `url` is replaced. Direct logins (no ENT) get
/// `?login=true` so Pronote skips the ENT redirection.
pub fn normalize_url(url: &str, account_type: AccountType, ent: Option<&str>) -> String {
    let mut url = cached(&HTML_PAGE, r"/[^/]+\.html$")
        .replace(url.trim(), "/")
        .into_owned();
    if !url.ends_with('/') {
        url.push('/');
    }
    url.push_str(account_type.page());
    url.push_str(".html");

    if ent.map_or(true, str::is_empty) {
        url.push_str("?login=true");
    }
    url
}

/// Entity name prefix for a child: lowercase, every non-letter replaced by `_`
pub fn sensor_prefix(child_name: &str) -> String {
    cached(&NON_LETTER, "[^A-Za-z]")
        .replace_all(&child_name.to_lowercase(), "_")
        .into_owned()
}

fn required<'a>(field: &'a Option<String>, name: &str) -> ClientResult<&'a str> {
    field
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ClientError::InvalidCredentials(format!("missing {}", name)))
}

/// Log in with an entry's credentials
///
/// A failing session check is logged and the client returned anyway.
pub fn get_pronote_client(connector: &dyn Connector, data: &EntryData) -> ClientResult<SharedClient> {
    debug!("Connecting with {:?}", data.connection_type);

    let client = if data.is_qr_code() {
        client_from_qr_code(connector, data)
    } else {
        client_from_username_password(connector, data)
    }
    .map_err(|err| {
        warn!("Client creation failed: {}", err);
        err
    })?;

    if let Err(err) = client.session_check() {
        error!("Session check failed: {}", err);
    }
    Ok(client)
}

fn client_from_username_password(
    connector: &dyn Connector,
    data: &EntryData,
) -> ClientResult<SharedClient> {
    let ent = data.ent.as_deref().filter(|e| !e.is_empty());
    let login = CredentialsLogin {
        url: normalize_url(required(&data.url, "url")?, data.account_type, ent),
        username: required(&data.username, "username")?.to_string(),
        password: required(&data.password, "password")?.to_string(),
        account_type: data.account_type,
        ent: ent.map(str::to_string),
        device: data.device(),
    };

    let client = connector.login(&login)?;
    info!("Logged in as {}", client.info().name);
    Ok(client)
}

fn client_from_qr_code(connector: &dyn Connector, data: &EntryData) -> ClientResult<SharedClient> {
    let token_login = match data.qr_code_json.as_deref() {
        Some(json) => {
            let qr_code: serde_json::Value =
                serde_json::from_str(json).map_err(|e| ClientError::QrCode(e.to_string()))?;
            let uuid = required(&data.qr_code_uuid, "qr_code_uuid")?.to_string();
            let first = connector.qrcode_login(&QrCodeLogin {
                qr_code,
                pin: required(&data.qr_code_pin, "qr_code_pin")?.to_string(),
                uuid: uuid.clone(),
                device: data.device(),
            })?;

            let credentials = first.credentials();
            TokenLogin {
                url: credentials.pronote_url,
                username: credentials.username,
                token: credentials.password,
                uuid: credentials.uuid.unwrap_or(uuid),
                account_type: data.account_type,
                device: data.device(),
            }
        }
        None => TokenLogin {
            url: required(&data.qr_code_url, "qr_code_url")?.to_string(),
            username: required(&data.qr_code_username, "qr_code_username")?.to_string(),
            token: required(&data.qr_code_password, "qr_code_password")?.to_string(),
            uuid: required(&data.qr_code_uuid, "qr_code_uuid")?.to_string(),
            account_type: data.account_type,
            device: data.device(),
        },
    };

    info!("Token login as {}", token_login.username);
    connector.token_login(&token_login)
}

/// Start of the first lesson not canceled
pub fn day_start_at(lessons: Option<&[Lesson]>) -> Option<NaiveDateTime> {
    lessons?.iter().find(|l| !l.canceled).map(|l| l.start)
}
