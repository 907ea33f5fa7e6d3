//! Client configuration lookup (§0/§4.9): `instance[key] ?? env[PYNECTOR_<KEY>]
//! ?? default`, with numeric coercion/validation raising
//! [`ConfigurationError`] on a malformed override.

use crate::error::ConfigurationError;
use std::collections::BTreeMap;
use std::env;
use std::str::FromStr;

/// A flat instance-level configuration map, as passed to
/// [`crate::client::ClientBuilder::config`].
pub type ConfigMap = BTreeMap<String, String>;

/// Resolve `key` through the hierarchy: `instance[key]` → env
/// `PYNECTOR_<KEY>` (key uppercased) → `default`. Values found in either the
/// instance map or the environment are parsed via `T::from_str`; a parse
/// failure is a [`ConfigurationError`], not a silent fallback to `default`.
pub fn lookup<T>(instance: &ConfigMap, key: &str, default: T) -> Result<T, ConfigurationError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(raw) = instance.get(key) {
        return raw
            .parse()
            .map_err(|e| ConfigurationError::new(format!("invalid value for `{key}`: {e}")));
    }

    let env_key = format!("PYNECTOR_{}", key.to_uppercase());
    if let Ok(raw) = env::var(&env_key) {
        return raw
            .parse()
            .map_err(|e| ConfigurationError::new(format!("invalid value for `{env_key}`: {e}")));
    }

    Ok(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_instance_value_wins() {
        let mut instance = ConfigMap::new();
        instance.insert("timeout".to_string(), "30".to_string());
        let value: u64 = lookup(&instance, "timeout", 10).unwrap();
        assert_eq!(value, 30);
    }

    #[test]
    fn test_env_value_used_when_instance_missing() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::set_var("PYNECTOR_MAX_RETRIES", "5");
        let value: u32 = lookup(&ConfigMap::new(), "max_retries", 3).unwrap();
        assert_eq!(value, 5);
        env::remove_var("PYNECTOR_MAX_RETRIES");
    }

    #[test]
    fn test_default_used_when_nothing_set() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::remove_var("PYNECTOR_MAX_CONCURRENCY");
        let value: usize = lookup(&ConfigMap::new(), "max_concurrency", 8).unwrap();
        assert_eq!(value, 8);
    }

    #[test]
    fn test_invalid_instance_value_is_configuration_error() {
        let mut instance = ConfigMap::new();
        instance.insert("timeout".to_string(), "not-a-number".to_string());
        let result: Result<u64, _> = lookup(&instance, "timeout", 10);
        assert!(result.is_err());
    }
}
