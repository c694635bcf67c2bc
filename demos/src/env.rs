use std::{env, str::FromStr};

pub fn read_env_any<T>(keys: &[&str], default: T) -> T
where
    T: FromStr + Copy,
{
    keys.iter()
        .find_map(|key| env::var(key).ok().and_then(|raw| raw.parse::<T>().ok()))
        .unwrap_or(default)
}

/// First non-blank value among `keys`, trimmed.
pub fn read_env_string(keys: &[&str], default: &str) -> String {
    keys.iter()
        .find_map(|key| {
            env::var(key)
                .ok()
                .map(|raw| raw.trim().to_owned())
                .filter(|raw| !raw.is_empty())
        })
        .unwrap_or_else(|| default.to_owned())
}
