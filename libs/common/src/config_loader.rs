//! Runtime setting resolution
//!
//! openXDA keeps tunables in its `Setting` table. A deployment can still pin
//! one through an environment variable when the row is absent or unusable.

use std::fmt::Display;
use std::str::FromStr;
use tracing::{debug, warn};

fn parse_from<T>(source: &str, name: &str, raw: &str) -> Option<T>
where
    T: FromStr,
    T::Err: Display,
{
    match raw.trim().parse::<T>() {
        Ok(value) => {
            debug!("{} taken from {}: {}", name, source, raw.trim());
            Some(value)
        },
        Err(e) => {
            warn!("Ignoring {} value for {} ({:?}): {}", source, name, raw, e);
            None
        },
    }
}

/// Resolve a setting: database value > `env_var` > `default`
///
/// Unparseable values at either level are skipped with a warning.
pub fn get_config_value<T>(db_value: Option<&str>, env_var: &str, default: T) -> T
where
    T: FromStr,
    T::Err: Display,
{
    db_value
        .and_then(|raw| parse_from("database", env_var, raw))
        .or_else(|| {
            std::env::var(env_var)
                .ok()
                .and_then(|raw| parse_from("environment", env_var, &raw))
        })
        .unwrap_or(default)
}
