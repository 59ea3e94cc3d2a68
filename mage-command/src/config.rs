//! 命令总线配置
//!
//! 默认值与环境变量：
//! - `APPLICATION_NAME`：审计记录的 `source`，默认 `mage-command-v1`
//! - `EXECUTOR_CORE_POOL_SIZE`：常驻 worker 数，默认 32
//! - `EXECUTOR_MAX_POOL_SIZE`：worker 上限（含溢出任务），默认 16384
//! - `EXECUTOR_QUEUE_CAPACITY`：任务队列容量，默认 8
//! - `EXECUTOR_SATURATION_POLICY`：`block` | `reject`，默认 `block`
//!
use crate::error::CommandError;
use crate::worker_pool::SaturationPolicy;
use bon::Builder;
use std::str::FromStr;

pub const APPLICATION_NAME_DEFAULT: &str = "mage-command-v1";
pub const CORE_POOL_SIZE_DEFAULT: usize = 32;
pub const MAX_POOL_SIZE_DEFAULT: usize = 16384;
pub const QUEUE_CAPACITY_DEFAULT: usize = 8;

pub const APPLICATION_NAME_ENV: &str = "APPLICATION_NAME";
pub const CORE_POOL_SIZE_ENV: &str = "EXECUTOR_CORE_POOL_SIZE";
pub const MAX_POOL_SIZE_ENV: &str = "EXECUTOR_MAX_POOL_SIZE";
pub const QUEUE_CAPACITY_ENV: &str = "EXECUTOR_QUEUE_CAPACITY";
pub const SATURATION_POLICY_ENV: &str = "EXECUTOR_SATURATION_POLICY";

#[derive(Debug, Clone, PartialEq, Eq, Builder)]
pub struct CommandConfig {
    /// 所属应用标识，写入审计主键的 `source`
    #[builder(into, default = APPLICATION_NAME_DEFAULT.to_string())]
    pub source: String,
    #[builder(default = CORE_POOL_SIZE_DEFAULT)]
    pub core_pool_size: usize,
    #[builder(default = MAX_POOL_SIZE_DEFAULT)]
    pub max_pool_size: usize,
    #[builder(default = QUEUE_CAPACITY_DEFAULT)]
    pub queue_capacity: usize,
    #[builder(default)]
    pub saturation_policy: SaturationPolicy,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl CommandConfig {
    /// 以默认值为基础，按环境变量覆盖
    pub fn from_env() -> Result<Self, CommandError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// 以任意键值来源覆盖默认值（便于测试）
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CommandError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(source) = lookup(APPLICATION_NAME_ENV) {
            config.source = source;
        }
        if let Some(v) = lookup(CORE_POOL_SIZE_ENV) {
            config.core_pool_size = parse(CORE_POOL_SIZE_ENV, &v)?;
        }
        if let Some(v) = lookup(MAX_POOL_SIZE_ENV) {
            config.max_pool_size = parse(MAX_POOL_SIZE_ENV, &v)?;
        }
        if let Some(v) = lookup(QUEUE_CAPACITY_ENV) {
            config.queue_capacity = parse(QUEUE_CAPACITY_ENV, &v)?;
        }
        if let Some(v) = lookup(SATURATION_POLICY_ENV) {
            config.saturation_policy = parse(SATURATION_POLICY_ENV, &v)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CommandError> {
        if self.source.trim().is_empty() {
            return Err(CommandError::config("source must not be empty"));
        }
        if self.core_pool_size == 0 {
            return Err(CommandError::config("core_pool_size must be at least 1"));
        }
        if self.max_pool_size < self.core_pool_size {
            return Err(CommandError::config(format!(
                "max_pool_size ({}) must not be less than core_pool_size ({})",
                self.max_pool_size, self.core_pool_size
            )));
        }
        if self.queue_capacity == 0 {
            return Err(CommandError::config("queue_capacity must be at least 1"));
        }
        Ok(())
    }
}

fn parse<T>(name: &str, value: &str) -> Result<T, CommandError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| CommandError::config(format!("{name}={value}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_documented_values() {
        let config = CommandConfig::default();
        assert_eq!(config.source, "mage-command-v1");
        assert_eq!(config.core_pool_size, 32);
        assert_eq!(config.max_pool_size, 16384);
        assert_eq!(config.queue_capacity, 8);
        assert_eq!(config.saturation_policy, SaturationPolicy::Block);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn lookup_overrides_defaults() {
        let vars: HashMap<&str, &str> = HashMap::from([
            (APPLICATION_NAME_ENV, "ledger-v2"),
            (CORE_POOL_SIZE_ENV, "4"),
            (QUEUE_CAPACITY_ENV, " 16 "),
            (SATURATION_POLICY_ENV, "reject"),
        ]);
        let config = CommandConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();

        assert_eq!(config.source, "ledger-v2");
        assert_eq!(config.core_pool_size, 4);
        assert_eq!(config.max_pool_size, 16384);
        assert_eq!(config.queue_capacity, 16);
        assert_eq!(config.saturation_policy, SaturationPolicy::Reject);
    }

    #[test]
    fn invalid_values_are_reported() {
        let err = CommandConfig::from_lookup(|k| (k == CORE_POOL_SIZE_ENV).then(|| "many".into()))
            .unwrap_err();
        assert!(err.to_string().contains(CORE_POOL_SIZE_ENV));

        let err = CommandConfig::builder()
            .core_pool_size(8)
            .max_pool_size(4)
            .build()
            .validate()
            .unwrap_err();
        assert!(matches!(err, CommandError::Config { .. }));
    }
}
