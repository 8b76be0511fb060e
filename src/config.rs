use std::str::FromStr;

use serde::{Deserialize, Serialize};
use stacked_errors::{Result, StackableErr};

/// The runtime socket used when nothing else is configured
pub const DEFAULT_DOCKER_ENDPOINT: &str = "unix:///var/run/docker.sock";
/// The runtime CLI program used when nothing else is configured
pub const DEFAULT_PROGRAM: &str = "docker";
/// Seconds before a runtime API request is abandoned, this matches the default
/// of `bollard`
pub const DEFAULT_API_TIMEOUT_SECS: u64 = 120;

/// Whether [ImageRunner::run](crate::ImageRunner::run) pulls the image before
/// running it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PullPolicy {
    /// Assume the image is already present
    #[default]
    Never,
    /// Pull first, a failed pull fails the run
    Always,
    /// Pull first, a failed pull is logged and the run proceeds anyway
    BestEffort,
}

impl FromStr for PullPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "never" => Ok(Self::Never),
            "always" => Ok(Self::Always),
            "best_effort" => Ok(Self::BestEffort),
            _ => Err(format!(
                "unknown pull policy \"{s}\", expected \"never\", \"always\", or \"best_effort\""
            )),
        }
    }
}

/// Configuration of an [ImageRunner](crate::ImageRunner), passed at
/// construction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Runtime API endpoint, "unix://", "tcp://", and "http://" are accepted
    pub docker_endpoint: String,
    /// Timeout for runtime API requests in seconds
    pub api_timeout_secs: u64,
    /// The runtime CLI program that is invoked as `<program> run ...`
    pub program: String,
    /// Flags inserted right after `run`, such as "--rm"
    pub extra_run_args: Vec<String>,
    pub pull_policy: PullPolicy,
    /// Forward the output of the runtime CLI to this process as it arrives
    pub debug: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            docker_endpoint: DEFAULT_DOCKER_ENDPOINT.to_owned(),
            api_timeout_secs: DEFAULT_API_TIMEOUT_SECS,
            program: DEFAULT_PROGRAM.to_owned(),
            extra_run_args: vec![],
            pull_policy: PullPolicy::default(),
            debug: false,
        }
    }
}

impl RunnerConfig {
    /// Parses a JSON object, missing fields take their default values
    pub fn from_json_str(s: &str) -> Result<Self> {
        serde_json::from_str(s).stack_err("RunnerConfig::from_json_str -> invalid config")
    }

    pub fn docker_endpoint(mut self, docker_endpoint: impl Into<String>) -> Self {
        self.docker_endpoint = docker_endpoint.into();
        self
    }

    pub fn program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn pull_policy(mut self, pull_policy: PullPolicy) -> Self {
        self.pull_policy = pull_policy;
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = RunnerConfig::default();
        assert_eq!(config.docker_endpoint, "unix:///var/run/docker.sock");
        assert_eq!(config.program, "docker");
        assert_eq!(config.pull_policy, PullPolicy::Never);
        assert!(config.extra_run_args.is_empty());
        assert_eq!(RunnerConfig::from_json_str("{}").unwrap(), config);
    }

    #[test]
    fn from_json() {
        let config = RunnerConfig::from_json_str(
            r#"{
                "docker_endpoint": "tcp://127.0.0.1:2375",
                "program": "podman",
                "extra_run_args": ["--rm"],
                "pull_policy": "best_effort"
            }"#,
        )
        .unwrap();
        assert_eq!(config.docker_endpoint, "tcp://127.0.0.1:2375");
        assert_eq!(config.program, "podman");
        assert_eq!(config.extra_run_args, vec!["--rm".to_owned()]);
        assert_eq!(config.pull_policy, PullPolicy::BestEffort);
        assert_eq!(config.api_timeout_secs, DEFAULT_API_TIMEOUT_SECS);
        assert!(!config.debug);

        assert!(RunnerConfig::from_json_str(r#"{"pull_policy": "sometimes"}"#).is_err());
    }

    #[test]
    fn pull_policy_from_str() {
        assert_eq!("never".parse::<PullPolicy>(), Ok(PullPolicy::Never));
        assert_eq!("always".parse::<PullPolicy>(), Ok(PullPolicy::Always));
        assert_eq!("best_effort".parse::<PullPolicy>(), Ok(PullPolicy::BestEffort));
        assert!("Always".parse::<PullPolicy>().is_err());
    }
}
