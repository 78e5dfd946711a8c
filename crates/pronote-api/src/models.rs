//! Data served by a Pronote instance
//!
//! Datetimes are naive: Pronote reports the school's local wall-clock time.
//! Grades and averages stay strings because Pronote mixes numbers with
//! markers such as `Abs` or `N.Not`.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Kind of account used to log in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum AccountType {
    #[default]
    #[serde(rename = "eleve")]
    Student,
    #[serde(rename = "parent")]
    Parent,
}

impl AccountType {
    /// The login page of this account type, without extension
    pub fn page(&self) -> &'static str {
        match self {
            AccountType::Student => "eleve",
            AccountType::Parent => "parent",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub name: String,
    #[serde(default)]
    pub class_name: String,
    #[serde(default)]
    pub establishment: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subject {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub groups: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub id: String,
    pub name: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lesson {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub subject: Option<Subject>,
    #[serde(default)]
    pub teacher_name: Option<String>,
    #[serde(default)]
    pub teacher_names: Vec<String>,
    #[serde(default)]
    pub classroom: Option<String>,
    #[serde(default)]
    pub classrooms: Vec<String>,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    #[serde(default)]
    pub canceled: bool,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub background_color: Option<String>,
    #[serde(default)]
    pub outing: bool,
    #[serde(default)]
    pub memo: Option<String>,
    #[serde(default)]
    pub group_name: Option<String>,
    #[serde(default)]
    pub group_names: Vec<String>,
    #[serde(default)]
    pub exempted: bool,
    #[serde(default)]
    pub virtual_classrooms: Vec<String>,
    #[serde(default)]
    pub num: u32,
    #[serde(default)]
    pub detention: bool,
    #[serde(default)]
    pub test: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    #[serde(default)]
    pub url: String,
    /// 0 for a link, 1 for an uploaded file
    #[serde(rename = "type", default)]
    pub kind: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Homework {
    #[serde(default)]
    pub id: String,
    pub subject: Subject,
    pub description: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub background_color: Option<String>,
    pub date: NaiveDate,
    #[serde(default)]
    pub files: Vec<Attachment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grade {
    #[serde(default)]
    pub id: String,
    pub grade: String,
    pub out_of: String,
    #[serde(default)]
    pub default_out_of: String,
    pub date: NaiveDate,
    pub subject: Subject,
    /// Class average
    #[serde(default)]
    pub average: String,
    #[serde(default)]
    pub max: String,
    #[serde(default)]
    pub min: String,
    #[serde(default)]
    pub coefficient: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub is_bonus: bool,
    #[serde(default)]
    pub is_optionnal: bool,
    #[serde(default)]
    pub is_out_of_20: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Average {
    /// The student's own average
    pub student: String,
    #[serde(default)]
    pub class_average: String,
    #[serde(default)]
    pub max: String,
    #[serde(default)]
    pub min: String,
    #[serde(default)]
    pub out_of: String,
    #[serde(default)]
    pub default_out_of: String,
    pub subject: Subject,
    #[serde(default)]
    pub background_color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Absence {
    #[serde(default)]
    pub id: String,
    pub from_date: NaiveDateTime,
    pub to_date: NaiveDateTime,
    #[serde(default)]
    pub justified: bool,
    #[serde(default)]
    pub hours: Option<String>,
    #[serde(default)]
    pub days: u32,
    #[serde(default)]
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delay {
    #[serde(default)]
    pub id: String,
    pub date: NaiveDateTime,
    pub minutes: u32,
    #[serde(default)]
    pub justified: bool,
    #[serde(default)]
    pub justification: Option<String>,
    #[serde(default)]
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Acquisition {
    #[serde(default)]
    pub order: u32,
    #[serde(default)]
    pub name_id: String,
    pub name: String,
    #[serde(default)]
    pub abbreviation: String,
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub domain_id: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub coefficient: u32,
    #[serde(default)]
    pub pillar_id: String,
    #[serde(default)]
    pub pillar: String,
    #[serde(default)]
    pub pillar_prefix: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub domain: Option<String>,
    pub date: NaiveDate,
    pub subject: Subject,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub coefficient: u32,
    #[serde(default)]
    pub paliers: Vec<String>,
    #[serde(default)]
    pub teacher: String,
    #[serde(default)]
    pub acquisitions: Vec<Acquisition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledPunishment {
    pub start: NaiveDateTime,
    /// Minutes
    #[serde(default)]
    pub duration: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Punishment {
    #[serde(default)]
    pub id: String,
    pub given: NaiveDateTime,
    #[serde(default)]
    pub exclusion: bool,
    #[serde(default)]
    pub during_lesson: bool,
    #[serde(default)]
    pub homework: String,
    #[serde(default)]
    pub homework_documents: Vec<Attachment>,
    #[serde(default)]
    pub circumstances: String,
    #[serde(default)]
    pub circumstance_documents: Vec<Attachment>,
    pub nature: String,
    #[serde(default)]
    pub reasons: Vec<String>,
    #[serde(default)]
    pub giver: String,
    #[serde(default)]
    pub schedulable: bool,
    #[serde(default)]
    pub schedule: Vec<ScheduledPunishment>,
    /// Minutes
    #[serde(default)]
    pub duration: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodLabel {
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Food {
    pub name: String,
    #[serde(default)]
    pub labels: Vec<FoodLabel>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Menu {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub date: NaiveDate,
    #[serde(default)]
    pub is_lunch: bool,
    #[serde(default)]
    pub is_dinner: bool,
    #[serde(default)]
    pub first_meal: Option<Vec<Food>>,
    #[serde(default)]
    pub main_meal: Option<Vec<Food>>,
    #[serde(default)]
    pub side_meal: Option<Vec<Food>>,
    #[serde(default)]
    pub other_meal: Option<Vec<Food>>,
    #[serde(default)]
    pub cheese: Option<Vec<Food>>,
    #[serde(default)]
    pub dessert: Option<Vec<Food>>,
}

/// A school announcement or survey
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Information {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub read: bool,
    pub creation_date: NaiveDateTime,
    #[serde(default)]
    pub start_date: Option<NaiveDateTime>,
    #[serde(default)]
    pub end_date: Option<NaiveDateTime>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub survey: bool,
    #[serde(default)]
    pub anonymous_response: bool,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub template: bool,
    #[serde(default)]
    pub shared_template: bool,
    #[serde(default)]
    pub content: String,
}
