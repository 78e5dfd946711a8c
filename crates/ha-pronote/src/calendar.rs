//! Timetable calendar

use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use ha_helpers::{
    calendar_state, Attributes, CalendarEntity, CalendarEvent, DataUpdateCoordinator, DeviceInfo,
    Entity, SharedClock,
};
use pronote_api::Lesson;

use crate::coordinator::PronoteData;
use crate::formatter::format_displayed_lesson;
use crate::sensor::child_device;

fn localize(time_zone: Tz, naive: NaiveDateTime) -> Option<DateTime<Tz>> {
    time_zone.from_local_datetime(&naive).earliest()
}

/// A lesson as a calendar event in the host time zone
pub fn lesson_event(lesson: &Lesson, time_zone: Tz) -> Option<CalendarEvent> {
    let mut summary = format_displayed_lesson(lesson);
    if lesson.canceled {
        summary = format!("Annulé - {}", summary);
    }

    Some(CalendarEvent {
        summary,
        description: lesson.teacher_name.clone(),
        location: lesson.classroom.as_ref().map(|room| format!("Salle {}", room)),
        start: localize(time_zone, lesson.start)?,
        end: localize(time_zone, lesson.end)?,
    })
}

pub struct PronoteCalendar {
    coordinator: Arc<DataUpdateCoordinator<PronoteData>>,
    clock: SharedClock,
    time_zone: Tz,
    name: String,
    unique_id: String,
    device: DeviceInfo,
}

impl PronoteCalendar {
    /// Calendar of the child in `data`, shown under `nickname` when set
    pub fn new(
        coordinator: Arc<DataUpdateCoordinator<PronoteData>>,
        data: &PronoteData,
        nickname: Option<&str>,
        clock: SharedClock,
        time_zone: Tz,
    ) -> Self {
        let shown = nickname.unwrap_or(&data.child_info.name);
        Self {
            coordinator,
            clock,
            time_zone,
            name: format!("Emploi du temps de {}", shown),
            unique_id: format!("{}-timetable", data.sensor_prefix),
            device: child_device(&data.child_info.name),
        }
    }

    fn lessons(&self) -> Vec<Lesson> {
        self.coordinator
            .data()
            .and_then(|data| data.lessons_period.clone())
            .unwrap_or_default()
    }
}

impl Entity for PronoteCalendar {
    fn domain(&self) -> &str {
        "calendar"
    }

    fn unique_id(&self) -> Option<String> {
        Some(self.unique_id.clone())
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn state(&self) -> Option<String> {
        Some(calendar_state(self.event().as_ref(), self.clock.now()).0)
    }

    fn attributes(&self) -> Attributes {
        calendar_state(self.event().as_ref(), self.clock.now()).1
    }

    fn available(&self) -> bool {
        self.coordinator.last_update_success()
    }

    fn device_info(&self) -> Option<DeviceInfo> {
        Some(self.device.clone())
    }
}

impl CalendarEntity for PronoteCalendar {
    /// The first lesson of the period starting from now
    fn event(&self) -> Option<CalendarEvent> {
        let now = self.clock.now();
        self.lessons()
            .iter()
            .filter_map(|lesson| lesson_event(lesson, self.time_zone))
            .find(|event| event.start.with_timezone(&Utc) >= now)
    }

    fn get_events(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<CalendarEvent> {
        self.lessons()
            .iter()
            .filter(|lesson| !lesson.canceled)
            .filter_map(|lesson| lesson_event(lesson, self.time_zone))
            .filter(|event| event.overlaps(start, end))
            .collect()
    }
}
