//! A scriptable Pronote account
//!
//! Tests hold the [`MockState`] and edit it between refreshes: add a
//! grade, make a category fail, refuse the next login.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, NaiveDateTime};
use pronote_api::{
    Absence, AccountType, Average, ClientCredentials, ClientError, ClientInfo, ClientResult,
    Connector, CredentialsLogin, Delay, Evaluation, Grade, Homework, Information, Lesson, Menu,
    Period, PronoteClient, Punishment, QrCodeLogin, SharedClient, Subject, TokenLogin,
};
use serde_json::json;

use super::at;

pub struct MockState {
    pub account: ClientInfo,
    pub account_type: AccountType,
    pub children: Vec<ClientInfo>,
    pub password: String,
    pub lessons: Vec<Lesson>,
    pub homework: Vec<Homework>,
    pub grades: Vec<Grade>,
    pub absences: Vec<Absence>,
    pub delays: Vec<Delay>,
    pub averages: Vec<Average>,
    /// Categories answering `Unavailable`
    pub failing: HashSet<&'static str>,
    /// Error returned by every login while set
    pub login_error: Option<ClientError>,
    pub qr_logins: usize,
    pub token_logins: usize,
    pub last_token: Option<String>,
}

#[allow(dead_code)]
impl MockState {
    pub fn student() -> Self {
        Self {
            account: info("Lea Martin"),
            account_type: AccountType::Student,
            children: Vec::new(),
            password: "pronotevs".into(),
            lessons: Vec::new(),
            homework: Vec::new(),
            grades: Vec::new(),
            absences: Vec::new(),
            delays: Vec::new(),
            averages: Vec::new(),
            failing: HashSet::new(),
            login_error: None,
            qr_logins: 0,
            token_logins: 0,
            last_token: None,
        }
    }

    pub fn parent() -> Self {
        Self {
            account: info("Camille Martin"),
            account_type: AccountType::Parent,
            children: vec![info("Lea Martin"), info("Hugo Martin")],
            ..Self::student()
        }
    }
}

pub fn info(name: &str) -> ClientInfo {
    ClientInfo {
        name: name.into(),
        class_name: "4A".into(),
        establishment: "Collège Jean Moulin".into(),
    }
}

pub fn subject(name: &str) -> Subject {
    Subject {
        id: String::new(),
        name: name.into(),
        groups: false,
    }
}

#[allow(dead_code)]
pub fn lesson(name: &str, start: NaiveDateTime, canceled: bool) -> Lesson {
    serde_json::from_value(json!({
        "subject": {"name": name},
        "teacher_name": "M. Durand",
        "classroom": "B12",
        "start": start,
        "end": start + chrono::Duration::hours(1),
        "canceled": canceled
    }))
    .unwrap()
}

#[allow(dead_code)]
pub fn grade(subject_name: &str, value: &str, date: NaiveDate) -> Grade {
    Grade {
        id: format!("{}-{}", subject_name, date),
        grade: value.into(),
        out_of: "20".into(),
        default_out_of: "20".into(),
        date,
        subject: subject(subject_name),
        average: "12.5".into(),
        max: "19".into(),
        min: "3".into(),
        coefficient: "1".into(),
        comment: String::new(),
        is_bonus: false,
        is_optionnal: false,
        is_out_of_20: true,
    }
}

#[allow(dead_code)]
pub fn homework(subject_name: &str, date: NaiveDate, done: bool) -> Homework {
    Homework {
        id: String::new(),
        subject: subject(subject_name),
        description: "Exercices 4 et 5 page 112".into(),
        done,
        background_color: None,
        date,
        files: Vec::new(),
    }
}

#[allow(dead_code)]
pub fn delay(start: NaiveDateTime, minutes: u32) -> Delay {
    Delay {
        id: String::new(),
        date: start,
        minutes,
        justified: false,
        justification: None,
        reasons: vec!["Transport".into()],
    }
}

fn period() -> Period {
    Period {
        id: "T2".into(),
        name: "Trimestre 2".into(),
        start: at(1, 0, 0) - chrono::Duration::days(60),
        end: at(31, 0, 0),
    }
}

#[derive(Clone)]
pub struct MockConnector {
    pub state: Arc<Mutex<MockState>>,
}

#[allow(dead_code)]
impl MockConnector {
    pub fn new(state: MockState) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn edit(&self, f: impl FnOnce(&mut MockState)) {
        f(&mut self.state.lock().unwrap());
    }

    fn open(&self, credentials: ClientCredentials) -> SharedClient {
        Arc::new(MockClient {
            state: self.state.clone(),
            credentials,
            selected: Mutex::new(None),
        })
    }

    fn check(&self) -> ClientResult<()> {
        match &self.state.lock().unwrap().login_error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

impl Connector for MockConnector {
    fn login(&self, login: &CredentialsLogin) -> ClientResult<SharedClient> {
        self.check()?;
        if login.password != self.state.lock().unwrap().password {
            return Err(ClientError::InvalidCredentials("wrong password".into()));
        }
        Ok(self.open(ClientCredentials {
            pronote_url: login.url.clone(),
            username: login.username.clone(),
            password: login.password.clone(),
            uuid: None,
            client_identifier: None,
        }))
    }

    fn qrcode_login(&self, login: &QrCodeLogin) -> ClientResult<SharedClient> {
        self.check()?;
        let url = login
            .qr_code
            .get("url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ClientError::QrCode("missing url".into()))?;

        let mut state = self.state.lock().unwrap();
        state.qr_logins += 1;
        let token = format!("qr-token-{}", state.qr_logins);
        state.last_token = Some(token.clone());
        drop(state);

        Ok(self.open(ClientCredentials {
            pronote_url: url.to_string(),
            username: "qr-user".into(),
            password: token,
            uuid: Some(login.uuid.clone()),
            client_identifier: None,
        }))
    }

    fn token_login(&self, login: &TokenLogin) -> ClientResult<SharedClient> {
        self.check()?;
        let mut state = self.state.lock().unwrap();
        if state.last_token.as_deref() != Some(login.token.as_str()) {
            return Err(ClientError::InvalidCredentials("stale token".into()));
        }
        state.token_logins += 1;
        let token = format!("token-{}", state.token_logins);
        state.last_token = Some(token.clone());
        drop(state);

        Ok(self.open(ClientCredentials {
            pronote_url: login.url.clone(),
            username: login.username.clone(),
            password: token,
            uuid: Some(login.uuid.clone()),
            client_identifier: None,
        }))
    }

    fn ent_names(&self) -> Vec<String> {
        vec!["ac_lyon".into()]
    }
}

struct MockClient {
    state: Arc<Mutex<MockState>>,
    credentials: ClientCredentials,
    selected: Mutex<Option<ClientInfo>>,
}

impl MockClient {
    fn serve<T>(&self, category: &str, f: impl FnOnce(&MockState) -> T) -> ClientResult<T> {
        let state = self.state.lock().unwrap();
        if state.failing.contains(category) {
            return Err(ClientError::Unavailable(category.to_string()));
        }
        Ok(f(&state))
    }
}

impl PronoteClient for MockClient {
    fn info(&self) -> ClientInfo {
        self.state.lock().unwrap().account.clone()
    }

    fn account_type(&self) -> AccountType {
        self.state.lock().unwrap().account_type
    }

    fn children(&self) -> Vec<ClientInfo> {
        self.state.lock().unwrap().children.clone()
    }

    fn set_child(&self, name: &str) -> ClientResult<()> {
        let child = self
            .children()
            .into_iter()
            .find(|c| c.name == name)
            .ok_or_else(|| ClientError::ChildNotFound(name.to_string()))?;
        *self.selected.lock().unwrap() = Some(child);
        Ok(())
    }

    fn selected_child(&self) -> Option<ClientInfo> {
        self.selected.lock().unwrap().clone()
    }

    fn session_check(&self) -> ClientResult<()> {
        Ok(())
    }

    fn credentials(&self) -> ClientCredentials {
        self.credentials.clone()
    }

    fn lessons(&self, from: NaiveDate, to: Option<NaiveDate>) -> ClientResult<Vec<Lesson>> {
        let to = to.unwrap_or(from);
        self.serve("lessons", |s| {
            s.lessons
                .iter()
                .filter(|l| (from..=to).contains(&l.start.date()))
                .cloned()
                .collect()
        })
    }

    fn homework(&self, from: NaiveDate, to: Option<NaiveDate>) -> ClientResult<Vec<Homework>> {
        self.serve("homework", |s| {
            s.homework
                .iter()
                .filter(|h| h.date >= from && to.map_or(true, |to| h.date <= to))
                .cloned()
                .collect()
        })
    }

    fn information_and_surveys(&self, _since: NaiveDateTime) -> ClientResult<Vec<Information>> {
        self.serve("information_and_surveys", |_| Vec::new())
    }

    fn periods(&self) -> ClientResult<Vec<Period>> {
        self.serve("periods", |_| vec![period()])
    }

    fn current_period(&self) -> ClientResult<Period> {
        self.serve("periods", |_| period())
    }

    fn grades(&self, _period: &Period) -> ClientResult<Vec<Grade>> {
        self.serve("grades", |s| s.grades.clone())
    }

    fn averages(&self, _period: &Period) -> ClientResult<Vec<Average>> {
        self.serve("averages", |s| s.averages.clone())
    }

    fn absences(&self, _period: &Period) -> ClientResult<Vec<Absence>> {
        self.serve("absences", |s| s.absences.clone())
    }

    fn delays(&self, _period: &Period) -> ClientResult<Vec<Delay>> {
        self.serve("delays", |s| s.delays.clone())
    }

    fn punishments(&self, _period: &Period) -> ClientResult<Vec<Punishment>> {
        self.serve("punishments", |_| Vec::new())
    }

    fn evaluations(&self, _period: &Period) -> ClientResult<Vec<Evaluation>> {
        self.serve("evaluations", |_| Vec::new())
    }

    fn export_ical(&self) -> ClientResult<String> {
        self.serve("ical", |_| {
            "https://demo.index-education.net/pronote/ical/Edt.ics".to_string()
        })
    }

    fn menus(&self, _from: NaiveDate, _to: Option<NaiveDate>) -> ClientResult<Vec<Menu>> {
        self.serve("menus", |_| Vec::new())
    }
}
