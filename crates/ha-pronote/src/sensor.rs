//! Sensor entities
//!
//! Every sensor reads the coordinator's latest [`PronoteData`]. Names follow
//! `pronote_<child prefix>[_<suffix>]`; list sensors report their item count
//! as state and the formatted items as attributes.

use std::sync::Arc;

use ha_helpers::{Attributes, DataUpdateCoordinator, DeviceEntryType, DeviceInfo, Entity};
use pronote_api::{AccountType, Evaluation, Grade, Lesson};
use serde_json::{json, Value};

use crate::client::day_start_at;
use crate::consts::{DOMAIN, EVALUATIONS_TO_DISPLAY, GRADES_TO_DISPLAY, MANUFACTURER};
use crate::coordinator::{format_period_averages, PronoteData};
use crate::formatter::{
    format_absence, format_average, format_delay, format_evaluation, format_grade,
    format_homework, format_information_and_survey, format_lesson, format_menu,
    format_punishment,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimetableDay {
    Today,
    Tomorrow,
    NextDay,
    Period,
}

impl TimetableDay {
    fn suffix(&self) -> &'static str {
        match self {
            TimetableDay::Today => "today",
            TimetableDay::Tomorrow => "tomorrow",
            TimetableDay::NextDay => "next_day",
            TimetableDay::Period => "period",
        }
    }

    fn lessons<'a>(&self, data: &'a PronoteData) -> Option<&'a [Lesson]> {
        match self {
            TimetableDay::Today => data.lessons_today.as_deref(),
            TimetableDay::Tomorrow => data.lessons_tomorrow.as_deref(),
            TimetableDay::NextDay => data.lessons_next_day.as_deref(),
            TimetableDay::Period => data.lessons_period.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorKind {
    Child,
    Timetable(TimetableDay),
    Grades,
    Homework,
    HomeworkPeriod,
    Absences,
    Delays,
    Evaluations,
    Averages,
    PeriodAverages,
    Punishments,
    Menus,
    InformationAndSurveys,
    IcalUrl,
    NextAlarm,
}

impl SensorKind {
    pub const ALL: [SensorKind; 18] = [
        SensorKind::Child,
        SensorKind::Timetable(TimetableDay::Today),
        SensorKind::Timetable(TimetableDay::Tomorrow),
        SensorKind::Timetable(TimetableDay::NextDay),
        SensorKind::Timetable(TimetableDay::Period),
        SensorKind::Grades,
        SensorKind::Homework,
        SensorKind::HomeworkPeriod,
        SensorKind::Absences,
        SensorKind::Delays,
        SensorKind::Evaluations,
        SensorKind::Averages,
        SensorKind::PeriodAverages,
        SensorKind::Punishments,
        SensorKind::Menus,
        SensorKind::InformationAndSurveys,
        SensorKind::IcalUrl,
        SensorKind::NextAlarm,
    ];

    /// Name suffix, `None` for the child sensor
    pub fn suffix(&self) -> Option<String> {
        let suffix = match self {
            SensorKind::Child => return None,
            SensorKind::Timetable(day) => return Some(format!("timetable_{}", day.suffix())),
            SensorKind::Grades => "grades",
            SensorKind::Homework => "homework",
            SensorKind::HomeworkPeriod => "homework_period",
            SensorKind::Absences => "absences",
            SensorKind::Delays => "delays",
            SensorKind::Evaluations => "evaluations",
            SensorKind::Averages => "averages",
            SensorKind::PeriodAverages => "period_averages",
            SensorKind::Punishments => "punishments",
            SensorKind::Menus => "menus",
            SensorKind::InformationAndSurveys => "information_and_surveys",
            SensorKind::IcalUrl => "timetable_ical_url",
            SensorKind::NextAlarm => "next_alarm",
        };
        Some(suffix.to_string())
    }

    /// Item count of a list sensor; `None` when its category failed
    fn count(&self, data: &PronoteData) -> Option<usize> {
        match self {
            SensorKind::Timetable(day) => day.lessons(data).map(<[_]>::len),
            SensorKind::Grades => data.grades.as_ref().map(Vec::len),
            SensorKind::Homework => data.homework.as_ref().map(Vec::len),
            SensorKind::HomeworkPeriod => data.homework_period.as_ref().map(Vec::len),
            SensorKind::Absences => data.absences.as_ref().map(Vec::len),
            SensorKind::Delays => data.delays.as_ref().map(Vec::len),
            SensorKind::Evaluations => data.evaluations.as_ref().map(Vec::len),
            SensorKind::Averages => data.averages.as_ref().map(Vec::len),
            SensorKind::PeriodAverages => data.period_averages.as_ref().map(Vec::len),
            SensorKind::Punishments => data.punishments.as_ref().map(Vec::len),
            SensorKind::Menus => data.menus.as_ref().map(Vec::len),
            SensorKind::InformationAndSurveys => {
                data.information_and_surveys.as_ref().map(Vec::len)
            }
            SensorKind::Child | SensorKind::IcalUrl | SensorKind::NextAlarm => None,
        }
    }
}

/// The device every entity of a child belongs to
pub fn child_device(child_name: &str) -> DeviceInfo {
    let name = format!("Pronote - {}", child_name);
    DeviceInfo {
        identifiers: vec![(DOMAIN.to_string(), name.clone())],
        name,
        manufacturer: Some(MANUFACTURER.to_string()),
        model: Some(child_name.to_string()),
        entry_type: Some(DeviceEntryType::Service),
    }
}

pub struct PronoteSensor {
    kind: SensorKind,
    coordinator: Arc<DataUpdateCoordinator<PronoteData>>,
    prefix: String,
    device: DeviceInfo,
}

impl PronoteSensor {
    pub fn new(
        kind: SensorKind,
        coordinator: Arc<DataUpdateCoordinator<PronoteData>>,
        data: &PronoteData,
    ) -> Self {
        Self {
            kind,
            coordinator,
            prefix: data.sensor_prefix.clone(),
            device: child_device(&data.child_info.name),
        }
    }

    pub fn kind(&self) -> SensorKind {
        self.kind
    }

    fn list_attributes(&self, data: &PronoteData) -> Attributes {
        let mut attributes = Attributes::new();
        match self.kind {
            SensorKind::Child => {
                attributes.insert("full_name".into(), json!(data.child_info.name));
                attributes.insert("class_name".into(), json!(data.child_info.class_name));
                attributes.insert(
                    "establishment".into(),
                    json!(data.child_info.establishment),
                );
                attributes.insert(
                    "via_parent_account".into(),
                    json!(data.account_type == AccountType::Parent),
                );
            }
            SensorKind::Timetable(day) => {
                let lessons = day.lessons(data).unwrap_or_default();
                attributes.insert("lessons".into(), timetable(lessons));
                attributes.insert("day_start_at".into(), json!(day_start_at(Some(lessons))));
                attributes.insert(
                    "canceled_lessons_counter".into(),
                    json!(lessons.iter().filter(|l| l.canceled).count()),
                );
            }
            SensorKind::Grades => {
                let grades = data.grades.as_deref().unwrap_or_default();
                attributes.insert("grades".into(), displayed_grades(grades));
            }
            SensorKind::Homework | SensorKind::HomeworkPeriod => {
                let source = if self.kind == SensorKind::Homework {
                    &data.homework
                } else {
                    &data.homework_period
                };
                let homework = source.as_deref().unwrap_or_default();
                let items: Vec<Value> = homework
                    .iter()
                    .enumerate()
                    .map(|(index, h)| {
                        let mut formatted = format_homework(h);
                        formatted["index"] = json!(index);
                        formatted
                    })
                    .collect();
                attributes.insert("homework".into(), json!(items));
                attributes.insert(
                    "todo_counter".into(),
                    json!(homework.iter().filter(|h| !h.done).count()),
                );
            }
            SensorKind::Absences => {
                attributes.insert("absences".into(), formatted(&data.absences, format_absence));
            }
            SensorKind::Delays => {
                attributes.insert("delays".into(), formatted(&data.delays, format_delay));
            }
            SensorKind::Evaluations => {
                let evaluations = data.evaluations.as_deref().unwrap_or_default();
                attributes.insert("evaluations".into(), displayed_evaluations(evaluations));
            }
            SensorKind::Averages => {
                attributes.insert("averages".into(), formatted(&data.averages, format_average));
            }
            SensorKind::PeriodAverages => {
                let per_period = data.period_averages.as_deref().unwrap_or_default();
                attributes.insert("period_averages".into(), format_period_averages(per_period));
            }
            SensorKind::Punishments => {
                attributes.insert(
                    "punishments".into(),
                    formatted(&data.punishments, format_punishment),
                );
            }
            SensorKind::Menus => {
                attributes.insert("menus".into(), formatted(&data.menus, format_menu));
            }
            SensorKind::InformationAndSurveys => {
                attributes.insert(
                    "information_and_surveys".into(),
                    formatted(&data.information_and_surveys, format_information_and_survey),
                );
            }
            SensorKind::IcalUrl | SensorKind::NextAlarm => {}
        }
        attributes
    }
}

fn formatted<T>(items: &Option<Vec<T>>, format: impl Fn(&T) -> Value) -> Value {
    items.iter().flatten().map(format).collect()
}

/// The newest grades, numeric fields as numbers
fn displayed_grades(grades: &[Grade]) -> Value {
    grades
        .iter()
        .take(GRADES_TO_DISPLAY - 1)
        .map(|grade| {
            let mut formatted = format_grade(grade);
            formatted["id"] = json!(grade.id);
            for key in [
                "out_of",
                "default_out_of",
                "coefficient",
                "class_average",
                "max",
                "min",
            ] {
                formatted[key] = decimal(&formatted[key]);
            }
            formatted
        })
        .collect()
}

fn displayed_evaluations(evaluations: &[Evaluation]) -> Value {
    evaluations
        .iter()
        .take(EVALUATIONS_TO_DISPLAY - 1)
        .map(format_evaluation)
        .collect()
}

/// `"12,5"` as the number 12.5, `null` when not a number
fn decimal(value: &Value) -> Value {
    value
        .as_str()
        .and_then(|s| s.replace(',', ".").parse::<f64>().ok())
        .map_or(Value::Null, |n| json!(n))
}

/// Lessons for display, without the canceled duplicate of a replaced slot
fn timetable(lessons: &[Lesson]) -> Value {
    lessons
        .iter()
        .enumerate()
        .filter(|(i, lesson)| {
            !(lesson.canceled && *i > 0 && lessons[*i - 1].start == lesson.start)
        })
        .map(|(_, lesson)| format_lesson(lesson))
        .collect()
}

impl Entity for PronoteSensor {
    fn domain(&self) -> &str {
        "sensor"
    }

    fn unique_id(&self) -> Option<String> {
        let suffix = self.kind.suffix().unwrap_or_else(|| "child".to_string());
        Some(format!("{}-{}", self.prefix, suffix))
    }

    fn name(&self) -> String {
        match self.kind.suffix() {
            Some(suffix) => format!("{}_{}_{}", DOMAIN, self.prefix, suffix),
            None => format!("{}_{}", DOMAIN, self.prefix),
        }
    }

    fn state(&self) -> Option<String> {
        let data = self.coordinator.data()?;
        match self.kind {
            SensorKind::Child => Some(data.child_info.name.clone()),
            SensorKind::IcalUrl => data.ical_url.clone(),
            SensorKind::NextAlarm => data.next_alarm.map(|alarm| alarm.to_rfc3339()),
            kind => kind.count(&data).map(|count| count.to_string()),
        }
    }

    fn attributes(&self) -> Attributes {
        let Some(data) = self.coordinator.data() else {
            return Attributes::new();
        };
        let mut attributes = self.list_attributes(&data);
        attributes.insert("updated_at".into(), json!(data.updated_at));
        attributes
    }

    /// Unavailable after a failed refresh, or when this sensor's category
    /// failed (timetables also when the day has no lesson)
    fn available(&self) -> bool {
        if !self.coordinator.last_update_success() {
            return false;
        }
        let Some(data) = self.coordinator.data() else {
            return false;
        };
        match self.kind {
            SensorKind::Child | SensorKind::NextAlarm => true,
            SensorKind::IcalUrl => data.ical_url.is_some(),
            SensorKind::Timetable(day) => day.lessons(&data).is_some_and(|l| !l.is_empty()),
            kind => kind.count(&data).is_some(),
        }
    }

    fn device_info(&self) -> Option<DeviceInfo> {
        Some(self.device.clone())
    }
}

/// Every sensor of an entry whose coordinator already holds data
pub fn build_sensors(coordinator: &Arc<DataUpdateCoordinator<PronoteData>>) -> Vec<Arc<dyn Entity>> {
    let Some(data) = coordinator.data() else {
        return Vec::new();
    };
    SensorKind::ALL
        .iter()
        .map(|kind| {
            Arc::new(PronoteSensor::new(*kind, Arc::clone(coordinator), &data)) as Arc<dyn Entity>
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, NaiveDateTime};

    fn at(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 2)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn lesson(name: &str, start: NaiveDateTime, canceled: bool) -> Lesson {
        serde_json::from_value(json!({
            "subject": {"name": name},
            "start": start,
            "end": start + Duration::hours(1),
            "canceled": canceled,
        }))
        .unwrap()
    }

    fn grade(index: usize) -> Grade {
        serde_json::from_value(json!({
            "id": format!("grade-{}", index),
            "grade": "14,5",
            "out_of": "20",
            "default_out_of": "20",
            "date": "2026-03-02",
            "subject": {"name": "ANGLAIS"},
            "average": "12.25",
            "max": "19",
            "min": "abs",
            "coefficient": "0.5",
        }))
        .unwrap()
    }

    fn evaluation(index: usize) -> Evaluation {
        serde_json::from_value(json!({
            "name": format!("Contrôle {}", index),
            "date": "2026-03-02",
            "subject": {"name": "SVT"},
        }))
        .unwrap()
    }

    #[test]
    fn test_timetable_drops_canceled_duplicate_slot() {
        let lessons = vec![
            lesson("MATHEMATIQUES", at(8), false),
            lesson("FRANCAIS", at(8), true),
            lesson("ANGLAIS", at(9), true),
            lesson("SVT", at(10), false),
        ];

        let shown = timetable(&lessons);
        let names: Vec<_> = shown
            .as_array()
            .unwrap()
            .iter()
            .map(|l| l["lesson"].as_str().unwrap())
            .collect();
        assert_eq!(names, ["MATHEMATIQUES", "ANGLAIS", "SVT"]);
    }

    #[test]
    fn test_first_canceled_lesson_is_kept() {
        let lessons = vec![lesson("FRANCAIS", at(8), true), lesson("SVT", at(8), false)];
        assert_eq!(timetable(&lessons).as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_grades_capped_and_numeric() {
        let grades: Vec<Grade> = (0..GRADES_TO_DISPLAY + 3).map(grade).collect();

        let shown = displayed_grades(&grades);
        let shown = shown.as_array().unwrap();
        assert_eq!(shown.len(), GRADES_TO_DISPLAY - 1);
        assert_eq!(shown[0]["id"], "grade-0");
        assert_eq!(shown[0]["grade"], "14,5");
        assert_eq!(shown[0]["out_of"], json!(20.0));
        assert_eq!(shown[0]["class_average"], json!(12.25));
        assert_eq!(shown[0]["coefficient"], json!(0.5));
        assert_eq!(shown[0]["min"], Value::Null);
    }

    #[test]
    fn test_evaluations_capped() {
        let evaluations: Vec<Evaluation> = (0..EVALUATIONS_TO_DISPLAY).map(evaluation).collect();

        let shown = displayed_evaluations(&evaluations);
        let shown = shown.as_array().unwrap();
        assert_eq!(shown.len(), EVALUATIONS_TO_DISPLAY - 1);
        assert_eq!(shown[0]["name"], "Contrôle 0");
        assert_eq!(displayed_evaluations(&evaluations[..3]).as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_decimal() {
        assert_eq!(decimal(&json!("12,5")), json!(12.5));
        assert_eq!(decimal(&json!("7")), json!(7.0));
        assert_eq!(decimal(&json!("Abs")), Value::Null);
        assert_eq!(decimal(&Value::Null), Value::Null);
    }
}
