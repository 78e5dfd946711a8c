//! Constants of the Pronote integration

pub const DOMAIN: &str = "pronote";

/// Bus event announcing a new grade, absence or delay
pub const EVENT_TYPE: &str = "pronote_event";

pub const GRADES_TO_DISPLAY: usize = 11;
pub const EVALUATIONS_TO_DISPLAY: usize = 15;
pub const HOMEWORK_DESC_MAX_LENGTH: usize = 125;

/// Days
pub const LESSON_MAX_DAYS: i64 = 15;
pub const LESSON_NEXT_DAY_SEARCH_LIMIT: i64 = 30;
pub const HOMEWORK_MAX_DAYS: i64 = 15;
pub const INFO_SURVEY_LIMIT_MAX_DAYS: i64 = 7;
pub const MENU_MAX_DAYS: i64 = 7;

/// Minutes
pub const DEFAULT_REFRESH_INTERVAL: u64 = 15;
pub const DEFAULT_ALARM_OFFSET: i64 = 60;
pub const MAX_REFRESH_INTERVAL: u64 = 24 * 60;
pub const MAX_ALARM_OFFSET: i64 = 24 * 60;

pub const MANUFACTURER: &str = "Pronote";
