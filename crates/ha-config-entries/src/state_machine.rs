//! Config entry lifecycle
//!
//! ```text
//! NotLoaded -> SetupInProgress -> Loaded | SetupError | SetupRetry | MigrationError
//! SetupError | SetupRetry -> SetupInProgress
//! Loaded | SetupError | SetupRetry -> UnloadInProgress -> NotLoaded | FailedUnload
//! ```
//!
//! `MigrationError` and `FailedUnload` are terminal.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigEntryState {
    #[default]
    NotLoaded,
    SetupInProgress,
    Loaded,
    /// Needs user action, never retried
    SetupError,
    /// A retry is scheduled
    SetupRetry,
    MigrationError,
    UnloadInProgress,
    FailedUnload,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("config entry cannot go from {from:?} to {to:?}")]
pub struct InvalidTransition {
    pub from: ConfigEntryState,
    pub to: ConfigEntryState,
}

impl ConfigEntryState {
    /// States reachable from this one
    pub fn successors(self) -> &'static [ConfigEntryState] {
        use ConfigEntryState::*;
        match self {
            NotLoaded => &[SetupInProgress],
            SetupInProgress => &[Loaded, SetupError, SetupRetry, MigrationError],
            SetupError | SetupRetry => &[SetupInProgress, UnloadInProgress],
            Loaded => &[UnloadInProgress],
            UnloadInProgress => &[NotLoaded, FailedUnload],
            MigrationError | FailedUnload => &[],
        }
    }

    pub fn can_transition_to(self, to: ConfigEntryState) -> bool {
        self.successors().contains(&to)
    }

    pub fn check_transition(self, to: ConfigEntryState) -> Result<(), InvalidTransition> {
        if self.can_transition_to(to) {
            Ok(())
        } else {
            Err(InvalidTransition { from: self, to })
        }
    }

    /// Whether an unload or reload may start from here
    pub fn is_recoverable(self) -> bool {
        self == ConfigEntryState::NotLoaded || self.can_transition_to(ConfigEntryState::UnloadInProgress)
    }
}

/// Wait before setup attempt number `tries + 1`
///
/// Doubles from 5 s and stays at 80 s from the fifth retry, plus up to
/// 100 ms of jitter.
pub fn calculate_retry_delay(tries: u32) -> Duration {
    let base = Duration::from_secs(5) * (1 << tries.min(4));
    base + Duration::from_millis(rand::thread_rng().gen_range(0..100))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConfigEntryState::*;

    const ALL: [ConfigEntryState; 8] = [
        NotLoaded,
        SetupInProgress,
        Loaded,
        SetupError,
        SetupRetry,
        MigrationError,
        UnloadInProgress,
        FailedUnload,
    ];

    #[test]
    fn test_transitions() {
        let allowed = [
            (NotLoaded, SetupInProgress),
            (SetupInProgress, Loaded),
            (SetupInProgress, SetupError),
            (SetupInProgress, SetupRetry),
            (SetupInProgress, MigrationError),
            (SetupError, SetupInProgress),
            (SetupError, UnloadInProgress),
            (SetupRetry, SetupInProgress),
            (SetupRetry, UnloadInProgress),
            (Loaded, UnloadInProgress),
            (UnloadInProgress, NotLoaded),
            (UnloadInProgress, FailedUnload),
        ];

        let mut seen = 0;
        for from in ALL {
            for to in ALL {
                let ok = allowed.contains(&(from, to));
                assert_eq!(from.can_transition_to(to), ok, "{:?} -> {:?}", from, to);
                seen += ok as usize;
            }
        }
        assert_eq!(seen, allowed.len());
    }

    #[test]
    fn test_recoverable_states() {
        let recoverable: Vec<_> = ALL.into_iter().filter(|s| s.is_recoverable()).collect();
        assert_eq!(recoverable, vec![NotLoaded, Loaded, SetupError, SetupRetry]);
    }

    #[test]
    fn test_error_names_both_states() {
        let err = FailedUnload.check_transition(NotLoaded).unwrap_err();
        assert_eq!(err, InvalidTransition { from: FailedUnload, to: NotLoaded });
        assert!(err.to_string().contains("FailedUnload"));
    }

    #[test]
    fn test_retry_delay() {
        for (tries, secs) in [(0, 5), (1, 10), (2, 20), (3, 40), (4, 80), (9, 80)] {
            let delay = calculate_retry_delay(tries);
            assert!(delay >= Duration::from_secs(secs), "tries={}", tries);
            assert!(delay < Duration::from_secs(secs) + Duration::from_millis(100));
        }
    }
}
