use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::RunnerError;

/// Environment variable the image reads the cluster API URL from
pub const TARGET_ENV_VAR_NAME: &str = "OPENSHIFT_TARGET";
/// Environment variable the image reads the cluster user from
pub const USER_ENV_VAR_NAME: &str = "OPENSHIFT_USER";
/// Environment variable the image reads the cluster password from
pub const PASS_ENV_VAR_NAME: &str = "OPENSHIFT_PASS";

/// The remote cluster an image acts against. These are opaque to the runner,
/// they are handed to the image unchanged.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub target: String,
    pub user: String,
    pub password: String,
}

impl fmt::Debug for ClusterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterConfig")
            .field("target", &self.target)
            .field("user", &self.user)
            .field("password", &crate::REDACTED)
            .finish()
    }
}

impl ClusterConfig {
    pub fn new(
        target: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            target: target.into(),
            user: user.into(),
            password: password.into(),
        }
    }

    /// Returns an error naming the first empty field
    pub fn validate(&self) -> Result<(), RunnerError> {
        for (field, value) in [
            ("target", &self.target),
            ("user", &self.user),
            ("password", &self.password),
        ] {
            if value.is_empty() {
                return Err(RunnerError::InvalidCluster { field })
            }
        }
        Ok(())
    }

    /// The `-e KEY=VALUE` assignments in the order they are passed to the
    /// runtime
    pub fn env_assignments(&self) -> [String; 3] {
        [
            format!("{TARGET_ENV_VAR_NAME}={}", self.target),
            format!("{USER_ENV_VAR_NAME}={}", self.user),
            format!("{PASS_ENV_VAR_NAME}={}", self.password),
        ]
    }
}

/// Identifies the image to run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Spec {
    /// The image reference, e.g. "docker.io/ansibleapp/etherpad-ansibleapp"
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Spec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
        }
    }
}

/// The extra-vars payload handed to the image. `answers` holds the user's
/// answers to the image's parameters and `kubecfg` any cluster client
/// configuration, other top level keys are passed through as is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Parameters {
    #[serde(default)]
    pub answers: Map<String, Value>,
    #[serde(default)]
    pub kubecfg: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Parameters {
    /// Sets a single answer
    pub fn answer(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.answers.insert(key.into(), value.into());
        self
    }
}
