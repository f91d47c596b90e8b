//! # Node Configuration
//!
//! Devnet parameters, read from the environment.

use ibft_consensus::{ConsensusConfig, ProposerPolicy};
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}={value:?} is not valid: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: &'static str,
    },
}

/// Complete devnet configuration
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Number of validators started in this process
    pub validators: usize,
    /// Height at which the devnet stops
    pub target_height: u64,
    /// Base round-change timeout
    pub request_timeout: Duration,
    pub proposer_policy: ProposerPolicy,
    /// Committee size for large validator sets
    pub sub_group_size: usize,
    /// Delay between a new head and the next proposal
    pub block_period: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            validators: 4,
            target_height: 10,
            request_timeout: Duration::from_millis(2000),
            proposer_policy: ProposerPolicy::RoundRobin,
            sub_group_size: ibft_consensus::domain::DEFAULT_SUB_GROUP_SIZE,
            block_period: Duration::from_millis(200),
        }
    }
}

impl NodeConfig {
    /// Load the configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `IBFT_VALIDATORS`: validator count (default: 4)
    /// - `IBFT_TARGET_HEIGHT`: stop height (default: 10)
    /// - `IBFT_REQUEST_TIMEOUT_MS`: base round timeout (default: 2000)
    /// - `IBFT_PROPOSER_POLICY`: `round-robin` or `sticky`
    /// - `IBFT_SUB_GROUP_SIZE`: committee size (default: 21)
    /// - `IBFT_BLOCK_PERIOD_MS`: proposal delay (default: 200)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Same as [`NodeConfig::from_env`] over an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup("IBFT_VALIDATORS") {
            config.validators = parse_number("IBFT_VALIDATORS", &value)?;
            if config.validators == 0 {
                return Err(invalid("IBFT_VALIDATORS", value, "at least one validator"));
            }
        }
        if let Some(value) = lookup("IBFT_TARGET_HEIGHT") {
            config.target_height = parse_number("IBFT_TARGET_HEIGHT", &value)?;
        }
        if let Some(value) = lookup("IBFT_REQUEST_TIMEOUT_MS") {
            config.request_timeout =
                Duration::from_millis(parse_number("IBFT_REQUEST_TIMEOUT_MS", &value)?);
        }
        if let Some(value) = lookup("IBFT_PROPOSER_POLICY") {
            config.proposer_policy = match value.to_ascii_lowercase().as_str() {
                "round-robin" | "roundrobin" => ProposerPolicy::RoundRobin,
                "sticky" => ProposerPolicy::Sticky,
                _ => {
                    return Err(invalid(
                        "IBFT_PROPOSER_POLICY",
                        value,
                        "expected round-robin or sticky",
                    ))
                }
            };
        }
        if let Some(value) = lookup("IBFT_SUB_GROUP_SIZE") {
            config.sub_group_size = parse_number("IBFT_SUB_GROUP_SIZE", &value)?;
            if config.sub_group_size == 0 {
                return Err(invalid("IBFT_SUB_GROUP_SIZE", value, "must be positive"));
            }
        }
        if let Some(value) = lookup("IBFT_BLOCK_PERIOD_MS") {
            config.block_period = Duration::from_millis(parse_number("IBFT_BLOCK_PERIOD_MS", &value)?);
        }

        Ok(config)
    }

    /// Core configuration shared by every validator
    pub fn consensus_config(&self) -> ConsensusConfig {
        ConsensusConfig {
            request_timeout: self.request_timeout,
            proposer_policy: self.proposer_policy,
            sub_group_size: self.sub_group_size,
            ..Default::default()
        }
    }
}

fn parse_number<N: std::str::FromStr>(var: &'static str, value: &str) -> Result<N, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| invalid(var, value.to_string(), "expected an unsigned integer"))
}

fn invalid(var: &'static str, value: String, reason: &'static str) -> ConfigError {
    ConfigError::Invalid { var, value, reason }
}
