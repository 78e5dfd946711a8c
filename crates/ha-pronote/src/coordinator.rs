//! Polling the account
//!
//! One refresh logs in, then fetches every category in a fixed order. Each
//! category is isolated: a failure is logged and leaves that category `None`
//! while the others still update.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use ha_config_entries::{ConfigEntries, ConfigEntry, ConfigEntryUpdate};
use ha_core::{Context, Event};
use ha_event_bus::EventBus;
use ha_helpers::{run_blocking, ExecutorError, HomeAssistant, SharedClock, UpdateFailed, UpdateMethod};
use pronote_api::{
    Absence, AccountType, Average, ClientCredentials, ClientError, ClientInfo, ClientResult,
    Connector, Delay, Evaluation, Grade, Homework, Information, Lesson, Menu, PronoteClient,
    Punishment, SharedClient,
};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::client::{day_start_at, get_pronote_client, sensor_prefix};
use crate::consts::{
    EVENT_TYPE, HOMEWORK_MAX_DAYS, INFO_SURVEY_LIMIT_MAX_DAYS, LESSON_MAX_DAYS,
    LESSON_NEXT_DAY_SEARCH_LIMIT, MENU_MAX_DAYS,
};
use crate::diff::compare_data;
use crate::entry::{EntryConfigError, EntryData, EntryOptions};
use crate::formatter::{format_absence, format_average, format_delay, format_grade};

/// Everything one refresh fetched
///
/// `None` marks a category whose fetch failed.
#[derive(Debug, Clone)]
pub struct PronoteData {
    pub account_type: AccountType,
    pub sensor_prefix: String,
    pub child_info: ClientInfo,
    pub lessons_today: Option<Vec<Lesson>>,
    pub lessons_tomorrow: Option<Vec<Lesson>>,
    pub lessons_next_day: Option<Vec<Lesson>>,
    pub lessons_period: Option<Vec<Lesson>>,
    pub next_alarm: Option<DateTime<Tz>>,
    pub grades: Option<Vec<Grade>>,
    pub averages: Option<Vec<Average>>,
    /// Averages of every period, by period name in period order
    pub period_averages: Option<Vec<(String, Vec<Average>)>>,
    pub homework: Option<Vec<Homework>>,
    pub homework_period: Option<Vec<Homework>>,
    pub information_and_surveys: Option<Vec<Information>>,
    pub absences: Option<Vec<Absence>>,
    pub delays: Option<Vec<Delay>>,
    pub evaluations: Option<Vec<Evaluation>>,
    pub punishments: Option<Vec<Punishment>>,
    pub ical_url: Option<String>,
    pub menus: Option<Vec<Menu>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
enum FetchError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Executor(#[from] ExecutorError),
}

type FetchResult<T> = Result<T, FetchError>;

/// Run blocking client calls on the executor
async fn fetch<T, F>(client: &SharedClient, f: F) -> FetchResult<T>
where
    F: FnOnce(&dyn PronoteClient) -> ClientResult<T> + Send + 'static,
    T: Send + 'static,
{
    let client = Arc::clone(client);
    Ok(run_blocking(move || f(client.as_ref())).await??)
}

/// Keep a category's value, or log why it is missing
fn isolated<T>(category: &str, result: FetchResult<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            info!("Error getting {} from pronote: {}", category, err);
            None
        }
    }
}

async fn lessons(
    client: &SharedClient,
    from: NaiveDate,
    to: Option<NaiveDate>,
) -> FetchResult<Vec<Lesson>> {
    let mut lessons = fetch(client, move |c| c.lessons(from, to)).await?;
    lessons.sort_by_key(|l| l.start);
    Ok(lessons)
}

async fn homework(
    client: &SharedClient,
    from: NaiveDate,
    to: Option<NaiveDate>,
) -> FetchResult<Vec<Homework>> {
    let mut homework = fetch(client, move |c| c.homework(from, to)).await?;
    homework.sort_by_key(|h| h.date);
    Ok(homework)
}

/// Grades of every period, de-duplicated, newest first
fn all_grades(client: &dyn PronoteClient) -> ClientResult<Vec<Grade>> {
    let mut grades: Vec<Grade> = Vec::new();
    for period in client.periods()? {
        for grade in client.grades(&period)? {
            if !grades.contains(&grade) {
                grades.push(grade);
            }
        }
    }
    grades.sort_by(|a, b| b.date.cmp(&a.date));
    Ok(grades)
}

fn all_period_averages(client: &dyn PronoteClient) -> ClientResult<Vec<(String, Vec<Average>)>> {
    client
        .periods()?
        .into_iter()
        .map(|period| Ok((period.name.clone(), client.averages(&period)?)))
        .collect()
}

fn current_absences(client: &dyn PronoteClient) -> ClientResult<Vec<Absence>> {
    let mut absences = client.absences(&client.current_period()?)?;
    absences.sort_by(|a, b| b.from_date.cmp(&a.from_date));
    Ok(absences)
}

fn current_delays(client: &dyn PronoteClient) -> ClientResult<Vec<Delay>> {
    let mut delays = client.delays(&client.current_period()?)?;
    delays.sort_by(|a, b| b.date.cmp(&a.date));
    Ok(delays)
}

/// Newest first, by name within a day
fn sort_evaluations(evaluations: &mut [Evaluation]) {
    evaluations.sort_by(|a, b| a.name.cmp(&b.name));
    evaluations.sort_by(|a, b| b.date.cmp(&a.date));
}

/// Newest day first, keeping the server's order within a day
fn sort_punishments(punishments: &mut [Punishment]) {
    punishments.sort_by(|a, b| b.given.date().cmp(&a.given.date()));
}

fn current_evaluations(client: &dyn PronoteClient) -> ClientResult<Vec<Evaluation>> {
    let mut evaluations = client.evaluations(&client.current_period()?)?;
    sort_evaluations(&mut evaluations);
    Ok(evaluations)
}

fn current_punishments(client: &dyn PronoteClient) -> ClientResult<Vec<Punishment>> {
    let mut punishments = client.punishments(&client.current_period()?)?;
    sort_punishments(&mut punishments);
    Ok(punishments)
}

/// `offset` before the day's first lesson, `None` when it would overflow
fn alarm_before(lessons: Option<&[Lesson]>, offset: Duration) -> Option<NaiveDateTime> {
    day_start_at(lessons)?.checked_sub_signed(offset)
}

/// Alarm before today's first lesson while still ahead of `now`, else
/// before the next school day's
fn alarm_at(
    now: NaiveDateTime,
    offset_minutes: i64,
    lessons_today: Option<&[Lesson]>,
    lessons_next_day: Option<&[Lesson]>,
) -> Option<NaiveDateTime> {
    let offset = Duration::try_minutes(offset_minutes)?;
    alarm_before(lessons_today, offset)
        .filter(|alarm| now <= *alarm)
        .or_else(|| alarm_before(lessons_next_day, offset))
}

/// The [`UpdateMethod`] of a Pronote entry
///
/// Holds the host pieces it needs, never the host itself.
pub struct PronoteUpdater {
    entry_id: String,
    connector: Arc<dyn Connector>,
    config_entries: Arc<ConfigEntries>,
    bus: Arc<EventBus>,
    clock: SharedClock,
    time_zone: Tz,
    options: EntryOptions,
}

impl PronoteUpdater {
    pub fn new(
        hass: &HomeAssistant,
        entry: &ConfigEntry,
        connector: Arc<dyn Connector>,
    ) -> Result<Self, EntryConfigError> {
        Ok(Self {
            entry_id: entry.entry_id.clone(),
            connector,
            config_entries: hass.config_entries.clone(),
            bus: hass.bus.clone(),
            clock: hass.clock(),
            time_zone: hass.time_zone(),
            options: EntryOptions::from_entry(entry)?,
        })
    }

    fn today(&self) -> NaiveDate {
        self.clock.now().with_timezone(&self.time_zone).date_naive()
    }

    async fn connect(&self, data: &EntryData) -> Result<SharedClient, UpdateFailed> {
        let connector = Arc::clone(&self.connector);
        let login = data.clone();
        let client = run_blocking(move || get_pronote_client(connector.as_ref(), &login))
            .await
            .map_err(|err| UpdateFailed::Failed(err.to_string()))?;

        client.map_err(|err| match err {
            ClientError::Connection(_) => UpdateFailed::Failed(err.to_string()),
            other => UpdateFailed::Auth(other.to_string()),
        })
    }

    /// Persist the token the login handed out
    ///
    /// After a first login from a QR code the token credentials replace the
    /// code itself, which cannot be used twice.
    async fn store_token(&self, data: &EntryData, credentials: ClientCredentials) {
        let mut data = data.clone();
        data.qr_code_password = Some(credentials.password);
        if data.qr_code_json.take().is_some() {
            data.qr_code_url = Some(credentials.pronote_url);
            data.qr_code_username = Some(credentials.username);
            if credentials.uuid.is_some() {
                data.qr_code_uuid = credentials.uuid;
            }
        }

        let stored = match data.to_map() {
            Ok(map) => self
                .config_entries
                .update(&self.entry_id, ConfigEntryUpdate::new().data(map))
                .await
                .map(|_| ())
                .map_err(|e| e.to_string()),
            Err(err) => Err(err.to_string()),
        };
        if let Err(err) = stored {
            warn!("Cannot store the new Pronote token: {}", err);
        }
    }

    async fn child_info(
        &self,
        client: &SharedClient,
        data: &EntryData,
    ) -> Result<ClientInfo, UpdateFailed> {
        if data.account_type == AccountType::Student {
            return Ok(client.info());
        }

        let child = data
            .child
            .clone()
            .ok_or_else(|| UpdateFailed::Failed("no child selected".to_string()))?;
        fetch(client, move |c| {
            c.set_child(&child)?;
            c.selected_child()
                .ok_or(ClientError::ChildNotFound(child))
        })
        .await
        .map_err(|err| UpdateFailed::Failed(err.to_string()))
    }

    /// The longest range up to [`LESSON_MAX_DAYS`] that has lessons
    async fn lessons_period(&self, client: &SharedClient, today: NaiveDate) -> Option<Vec<Lesson>> {
        let mut last = None;
        for delta in (1..=LESSON_MAX_DAYS).rev() {
            match lessons(client, today, Some(today + Duration::days(delta))).await {
                Ok(found) if !found.is_empty() => {
                    debug!("Lessons found at {} days, for a maximum of {}", delta, LESSON_MAX_DAYS);
                    return Some(found);
                }
                Ok(found) => last = Some(found),
                Err(err) => debug!("No lessons at {} days from today: {}", delta, err),
            }
        }
        last
    }

    /// Tomorrow's lessons, or the next day that has some
    async fn lessons_next_day(
        &self,
        client: &SharedClient,
        today: NaiveDate,
        tomorrow: Option<&Vec<Lesson>>,
    ) -> Option<Vec<Lesson>> {
        if let Some(tomorrow) = tomorrow.filter(|l| !l.is_empty()) {
            return Some(tomorrow.clone());
        }

        for delta in 2..LESSON_NEXT_DAY_SEARCH_LIMIT {
            match lessons(client, today + Duration::days(delta), None).await {
                Ok(found) if !found.is_empty() => return Some(found),
                Ok(_) => {}
                Err(err) => {
                    info!("Error getting lessons_next_day from pronote: {}", err);
                    return None;
                }
            }
        }
        None
    }

    fn next_alarm(
        &self,
        lessons_today: Option<&[Lesson]>,
        lessons_next_day: Option<&[Lesson]>,
    ) -> Option<DateTime<Tz>> {
        let now = self.clock.now().with_timezone(&self.time_zone).naive_local();
        let alarm = alarm_at(now, self.options.alarm_offset, lessons_today, lessons_next_day)?;
        self.time_zone.from_local_datetime(&alarm).earliest()
    }

    fn fire_new_items(&self, data: &PronoteData, event: &str, items: Vec<Value>) {
        for item in items {
            debug!("New {} for {}", event, data.child_info.name);
            self.bus.fire(Event::new(
                EVENT_TYPE,
                json!({
                    "child_name": data.child_info.name,
                    "child_nickname": self.options.nickname,
                    "child_slug": data.sensor_prefix,
                    "type": event,
                    "data": item,
                }),
                Context::new(),
            ));
        }
    }
}

#[async_trait]
impl UpdateMethod<PronoteData> for PronoteUpdater {
    #[instrument(skip_all, fields(entry_id = %self.entry_id))]
    async fn update(&self, previous: Option<Arc<PronoteData>>) -> Result<PronoteData, UpdateFailed> {
        let entry = self
            .config_entries
            .get(&self.entry_id)
            .ok_or_else(|| UpdateFailed::Failed("config entry removed".to_string()))?;
        let config = EntryData::from_entry(&entry).map_err(|err| UpdateFailed::Auth(err.to_string()))?;
        let today = self.today();

        let client = self.connect(&config).await?;
        if config.is_qr_code() {
            self.store_token(&config, client.credentials()).await;
        }

        let child_info = self.child_info(&client, &config).await?;
        let prefix = sensor_prefix(&child_info.name);

        let lessons_today = isolated("lessons_today", lessons(&client, today, None).await);
        let lessons_tomorrow = isolated(
            "lessons_tomorrow",
            lessons(&client, today + Duration::days(1), None).await,
        );
        let lessons_period = self.lessons_period(&client, today).await;
        let lessons_next_day = self
            .lessons_next_day(&client, today, lessons_tomorrow.as_ref())
            .await;
        let next_alarm = self.next_alarm(lessons_today.as_deref(), lessons_next_day.as_deref());

        let grades = isolated("grades", fetch(&client, all_grades).await);

        let (averages, period_averages) = match fetch(&client, |c| {
            let averages = c.averages(&c.current_period()?)?;
            Ok((averages, all_period_averages(c)?))
        })
        .await
        {
            Ok((averages, per_period)) => (Some(averages), Some(per_period)),
            Err(err) => {
                info!("Error getting averages from pronote: {}", err);
                (None, None)
            }
        };

        let homework_today = isolated("homework", homework(&client, today, None).await);
        let homework_period = isolated(
            "homework_period",
            homework(&client, today, Some(today + Duration::days(HOMEWORK_MAX_DAYS))).await,
        );

        let since = (today - Duration::days(INFO_SURVEY_LIMIT_MAX_DAYS)).and_time(NaiveTime::MIN);
        let information_and_surveys = isolated(
            "information_and_surveys",
            fetch(&client, move |c| {
                let mut items = c.information_and_surveys(since)?;
                items.sort_by(|a, b| b.creation_date.cmp(&a.creation_date));
                Ok(items)
            })
            .await,
        );

        let absences = isolated("absences", fetch(&client, current_absences).await);
        let delays = isolated("delays", fetch(&client, current_delays).await);
        let evaluations = isolated("evaluations", fetch(&client, current_evaluations).await);
        let punishments = isolated("punishments", fetch(&client, current_punishments).await);
        let ical_url = isolated("ical_url", fetch(&client, |c| c.export_ical()).await);
        let menus = isolated(
            "menus",
            fetch(&client, move |c| {
                c.menus(today, Some(today + Duration::days(MENU_MAX_DAYS)))
            })
            .await,
        );

        let data = PronoteData {
            account_type: config.account_type,
            sensor_prefix: prefix,
            child_info,
            lessons_today,
            lessons_tomorrow,
            lessons_next_day,
            lessons_period,
            next_alarm,
            grades,
            averages,
            period_averages,
            homework: homework_today,
            homework_period,
            information_and_surveys,
            absences,
            delays,
            evaluations,
            punishments,
            ical_url,
            menus,
            updated_at: self.clock.now(),
        };

        if let Some(previous) = previous.as_deref() {
            let new_grades = compare_data(
                previous.grades.as_deref(),
                data.grades.as_deref(),
                format_grade,
                &["date", "subject", "grade_out_of"],
            );
            self.fire_new_items(&data, "new_grade", new_grades);

            let new_absences = compare_data(
                previous.absences.as_deref(),
                data.absences.as_deref(),
                format_absence,
                &["from", "to"],
            );
            self.fire_new_items(&data, "new_absence", new_absences);

            let new_delays = compare_data(
                previous.delays.as_deref(),
                data.delays.as_deref(),
                format_delay,
                &["date", "minutes"],
            );
            self.fire_new_items(&data, "new_delay", new_delays);
        }

        Ok(data)
    }
}

/// Period averages formatted for display, keyed by period name
pub fn format_period_averages(period_averages: &[(String, Vec<Average>)]) -> Value {
    period_averages
        .iter()
        .map(|(name, averages)| {
            let formatted: Vec<Value> = averages.iter().map(format_average).collect();
            (name.clone(), Value::from(formatted))
        })
        .collect::<serde_json::Map<String, Value>>()
        .into()
}
