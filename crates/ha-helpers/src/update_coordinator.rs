//! Polling coordinator
//!
//! A [`DataUpdateCoordinator`] fetches one integration's data on a fixed
//! interval and hands the latest snapshot to every entity built on it.
//! Entities never fetch on their own; they read [`DataUpdateCoordinator::data`]
//! and get rewritten after each refresh.

use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::clock::SharedClock;
use crate::SetupError;

/// A refresh that produced no data
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UpdateFailed {
    /// The remote service refused the credentials
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("{0}")]
    Failed(String),
}

/// The fetch behind a coordinator
///
/// `previous` is the data of the last successful refresh, `None` on the
/// first one.
#[async_trait]
pub trait UpdateMethod<T>: Send + Sync {
    async fn update(&self, previous: Option<Arc<T>>) -> Result<T, UpdateFailed>;
}

struct Snapshot<T> {
    data: Option<Arc<T>>,
    last_update_success: bool,
    last_update_success_time: Option<DateTime<Utc>>,
    last_error: Option<UpdateFailed>,
}

pub struct DataUpdateCoordinator<T> {
    name: String,
    update_interval: Duration,
    method: Arc<dyn UpdateMethod<T>>,
    clock: SharedClock,
    snapshot: RwLock<Snapshot<T>>,
    /// Serializes refreshes so `previous` is always the latest data
    refresh_lock: tokio::sync::Mutex<()>,
    /// Bumped after every refresh, successful or not
    refreshed: watch::Sender<u64>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Send + Sync + 'static> DataUpdateCoordinator<T> {
    pub fn new(
        name: impl Into<String>,
        update_interval: Duration,
        method: Arc<dyn UpdateMethod<T>>,
        clock: SharedClock,
    ) -> Self {
        let (refreshed, _) = watch::channel(0);
        Self {
            name: name.into(),
            update_interval,
            method,
            clock,
            snapshot: RwLock::new(Snapshot {
                data: None,
                last_update_success: true,
                last_update_success_time: None,
                last_error: None,
            }),
            refresh_lock: tokio::sync::Mutex::new(()),
            refreshed,
            task: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn update_interval(&self) -> Duration {
        self.update_interval
    }

    /// Data of the last successful refresh
    pub fn data(&self) -> Option<Arc<T>> {
        self.read(|s| s.data.clone())
    }

    pub fn last_update_success(&self) -> bool {
        self.read(|s| s.last_update_success)
    }

    pub fn last_update_success_time(&self) -> Option<DateTime<Utc>> {
        self.read(|s| s.last_update_success_time)
    }

    pub fn last_error(&self) -> Option<UpdateFailed> {
        self.read(|s| s.last_error.clone())
    }

    fn read<R>(&self, f: impl FnOnce(&Snapshot<T>) -> R) -> R {
        let guard = self
            .snapshot
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&guard)
    }

    /// Fetch now
    ///
    /// On failure the previous data is kept and `last_update_success` goes
    /// false. Failures and recoveries are logged once per transition.
    pub async fn refresh(&self) -> Result<(), UpdateFailed> {
        let _guard = self.refresh_lock.lock().await;
        debug!("Refreshing {} data", self.name);

        let previous = self.data();
        let result = self.method.update(previous).await;
        let now = self.clock.now();

        let outcome = {
            let mut snapshot = self
                .snapshot
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());

            match result {
                Ok(data) => {
                    if !snapshot.last_update_success {
                        info!("Fetching {} data recovered", self.name);
                    }
                    snapshot.data = Some(Arc::new(data));
                    snapshot.last_update_success = true;
                    snapshot.last_update_success_time = Some(now);
                    snapshot.last_error = None;
                    Ok(())
                }
                Err(err) => {
                    if snapshot.last_update_success {
                        error!("Error fetching {} data: {}", self.name, err);
                    }
                    snapshot.last_update_success = false;
                    snapshot.last_error = Some(err.clone());
                    Err(err)
                }
            }
        };

        self.refreshed.send_modify(|count| *count += 1);
        outcome
    }

    /// The refresh run during entry setup
    ///
    /// Authentication failures are final, anything else asks the host to
    /// retry the setup later.
    pub async fn first_refresh(&self) -> Result<(), SetupError> {
        self.refresh().await.map_err(|err| match err {
            UpdateFailed::Auth(reason) => SetupError::AuthFailed(reason),
            UpdateFailed::Failed(reason) => SetupError::NotReady(reason),
        })
    }

    /// Receiver notified after every refresh
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.refreshed.subscribe()
    }

    /// Start polling every `update_interval`
    ///
    /// The first poll happens one interval from now. Calling `start` on a
    /// running coordinator restarts the timer.
    pub fn start(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let interval = self.update_interval;

        let handle = tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let Some(coordinator) = weak.upgrade() else {
                    break;
                };
                // Errors are already logged and recorded by refresh
                let _ = coordinator.refresh().await;
            }
        });

        let mut task = self.task.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(previous) = task.replace(handle) {
            previous.abort();
        }
        debug!("Started polling {} every {:?}", self.name, interval);
    }

    /// Stop polling
    pub fn shutdown(&self) {
        let mut task = self.task.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(handle) = task.take() {
            handle.abort();
            debug!("Stopped polling {}", self.name);
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }
}

impl<T> Drop for DataUpdateCoordinator<T> {
    fn drop(&mut self) {
        if let Ok(mut task) = self.task.lock() {
            if let Some(handle) = task.take() {
                handle.abort();
            }
        }
    }
}
