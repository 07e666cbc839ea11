//! Session options
//!
//! Timings and limits a host can tune for every session it runs. Options are
//! validated with `garde` against the bounds in [`crate::constants`] and can
//! be loaded from a JSON document.

use std::{fs, io::ErrorKind, path::Path, time::Duration};

use garde::Validate;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::constants::{roster, timing};

type ValidationResult = garde::Result;

/// Validates that a duration falls within specified bounds
///
/// # Arguments
///
/// * `field` - Name of the field being validated (for error messages)
/// * `val` - The duration value to validate
///
/// # Returns
///
/// `Ok(())` if the duration is valid, `Err` with descriptive message if not
fn validate_duration<const MIN_SECONDS: u64, const MAX_SECONDS: u64>(
    field: &'static str,
    val: &Duration,
) -> ValidationResult {
    if (Duration::from_secs(MIN_SECONDS)..=Duration::from_secs(MAX_SECONDS)).contains(val) {
        Ok(())
    } else {
        Err(garde::Error::new(format!(
            "{field} is outside of the bounds [{MIN_SECONDS},{MAX_SECONDS}]",
        )))
    }
}

fn validate_lobby_tick(val: &Duration) -> ValidationResult {
    if val.is_zero() {
        return Err(garde::Error::new("lobby_tick cannot be zero"));
    }
    validate_duration::<{ timing::MIN_LOBBY_TICK }, { timing::MAX_LOBBY_TICK }>("lobby_tick", val)
}

fn validate_time_limit(val: &Duration) -> ValidationResult {
    validate_duration::<{ timing::MIN_TIME_LIMIT }, { timing::MAX_TIME_LIMIT }>("time_limit", val)
}

fn validate_pacing(val: &Duration) -> ValidationResult {
    validate_duration::<{ timing::MIN_PACING }, { timing::MAX_PACING }>("pacing", val)
}

/// Options shared by every session a registry runs
///
/// The roster capacity is bounded by the bank's candidate width, so a full
/// roster can always be given one distinct correct answer per player.
#[serde_with::serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct Options {
    /// Period of the repeating lobby timer; the lobby window is two ticks
    #[garde(custom(|v, _| validate_lobby_tick(v)))]
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub lobby_tick: Duration,
    /// Time the turn holder has to pick an answer
    #[garde(custom(|v, _| validate_time_limit(v)))]
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub time_limit: Duration,
    /// Pause between consecutive reveal steps
    #[garde(custom(|v, _| validate_pacing(v)))]
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub pacing: Duration,
    /// Maximum roster size
    #[garde(range(min = roster::MIN_PLAYER_COUNT, max = roster::MAX_PLAYER_COUNT))]
    pub max_players: usize,
    /// Seed for reproducible sessions (mixed with the channel id)
    #[garde(skip)]
    pub seed: Option<u64>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            lobby_tick: Duration::from_secs(timing::DEFAULT_LOBBY_TICK),
            time_limit: Duration::from_secs(timing::DEFAULT_TIME_LIMIT),
            pacing: Duration::from_secs(timing::DEFAULT_PACING),
            max_players: roster::MAX_PLAYER_COUNT,
            seed: None,
        }
    }
}

impl Options {
    /// Loads options from a JSON file, falling back to defaults
    ///
    /// A missing file, unreadable file, malformed document, or a document that
    /// fails validation all produce [`Options::default`], with the reason logged.
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<Options>(&contents) {
                Ok(options) => match options.validate() {
                    Ok(()) => {
                        info!(path = %path.display(), "loaded session options");
                        options
                    }
                    Err(err) => {
                        warn!(
                            path = %path.display(),
                            error = %err,
                            "session options out of bounds; falling back to defaults"
                        );
                        Self::default()
                    }
                },
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse session options; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "options file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read options; falling back to defaults"
                );
                Self::default()
            }
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_default_options_are_valid() {
        assert!(Options::default().validate().is_ok());
    }

    #[test]
    fn test_zero_pacing_is_valid() {
        let options = Options {
            pacing: Duration::ZERO,
            ..Options::default()
        };
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_zero_lobby_tick_is_invalid() {
        let options = Options {
            lobby_tick: Duration::ZERO,
            ..Options::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_time_limit_out_of_bounds() {
        let options = Options {
            time_limit: Duration::from_secs(2),
            ..Options::default()
        };
        assert!(options.validate().is_err());

        let options = Options {
            time_limit: Duration::from_secs(241),
            ..Options::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_pacing_bound_counts_sub_second_excess() {
        let options = Options {
            pacing: Duration::from_millis(10_999),
            ..Options::default()
        };
        assert!(options.validate().is_err());

        let options = Options {
            pacing: Duration::from_millis(10_000),
            ..Options::default()
        };
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_roster_capacity_capped_by_candidate_width() {
        let options = Options {
            max_players: 9,
            ..Options::default()
        };
        assert!(options.validate().is_err());

        let options = Options {
            max_players: 1,
            ..Options::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_options_deserialize_with_defaults() {
        let options: Options =
            serde_json::from_str(r#"{"time_limit": 30000, "seed": 7}"#).unwrap();
        assert_eq!(options.time_limit, Duration::from_secs(30));
        assert_eq!(options.seed, Some(7));
        assert_eq!(options.lobby_tick, Options::default().lobby_tick);
    }

    #[test]
    fn test_load_missing_file_falls_back() {
        let options = Options::load(Path::new("/definitely/not/here/options.json"));
        assert_eq!(options, Options::default());
    }
}
