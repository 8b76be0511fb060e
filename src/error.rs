use std::{borrow::Cow, process::ExitStatus};

/// Errors returned by [ImageRunner](crate::ImageRunner). The `stacked_errors`
/// errors from lower layers are kept in the variants for their context, they
/// are displayed with their `Debug` impl.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// The runtime client could not be constructed
    #[error("could not construct the container runtime client: {0:?}")]
    ClientInit(stacked_errors::Error),
    /// The parameters could not be encoded as JSON
    #[error("could not serialize the parameters: {0}")]
    Serialization(#[from] serde_json::Error),
    /// A `ClusterConfig` field was empty
    #[error("the cluster config field `{field}` is empty")]
    InvalidCluster { field: &'static str },
    /// The runtime API failed while pulling an image
    #[error("could not pull image \"{image}\": {error:?}")]
    Pull {
        image: String,
        error: stacked_errors::Error,
    },
    /// The runtime CLI could not be spawned or waited on
    #[error("could not run `{command}`: {error:?}")]
    Spawn {
        command: String,
        error: stacked_errors::Error,
    },
    /// The runtime CLI exited unsuccessfully
    #[error(
        "`{command}` exited with {}, output:\n{}",
        display_status(.status),
        String::from_utf8_lossy(.output)
    )]
    Execution {
        /// The command line with the password redacted
        command: String,
        status: Option<ExitStatus>,
        /// Combined stdout and stderr
        output: Vec<u8>,
    },
}

impl RunnerError {
    /// The captured output if this is an `Execution` error
    pub fn output(&self) -> Option<Cow<'_, str>> {
        match self {
            Self::Execution { output, .. } => Some(String::from_utf8_lossy(output)),
            _ => None,
        }
    }
}

fn display_status(status: &Option<ExitStatus>) -> String {
    match status {
        Some(status) => status.to_string(),
        None => "no exit status".to_owned(),
    }
}
