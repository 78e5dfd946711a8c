//! Controllable time source

use chrono::{DateTime, Duration, Utc};
use ha_helpers::Clock;
use std::sync::{Arc, RwLock};

#[derive(Clone)]
pub struct MockTime {
    current: Arc<RwLock<DateTime<Utc>>>,
}

#[allow(dead_code)]
impl MockTime {
    pub fn at(time: DateTime<Utc>) -> Self {
        Self {
            current: Arc::new(RwLock::new(time)),
        }
    }

    pub fn set(&self, time: DateTime<Utc>) {
        *self.current.write().unwrap() = time;
    }

    pub fn advance(&self, duration: Duration) {
        let mut current = self.current.write().unwrap();
        *current += duration;
    }
}

impl Clock for MockTime {
    fn now(&self) -> DateTime<Utc> {
        *self.current.read().unwrap()
    }
}
