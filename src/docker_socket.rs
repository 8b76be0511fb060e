use bollard::{Docker, API_DEFAULT_VERSION};
use stacked_errors::{bail, Result, StackableErr};
use tracing::debug;

use crate::RunnerConfig;

/// The transport an endpoint string selects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    Unix,
    Http,
}

impl EndpointKind {
    pub fn of(endpoint: &str) -> Result<Self> {
        if endpoint.starts_with("unix://") {
            Ok(Self::Unix)
        } else if endpoint.starts_with("tcp://") || endpoint.starts_with("http://") {
            Ok(Self::Http)
        } else {
            bail!(
                "EndpointKind::of -> unsupported runtime endpoint \"{endpoint}\", expected a \
                 \"unix://\", \"tcp://\", or \"http://\" endpoint"
            )
        }
    }
}

/// Constructs a `bollard::Docker` handle for the configured endpoint. No
/// request is made, an unreachable runtime is only noticed by the first call
/// through the handle.
pub async fn connect(config: &RunnerConfig) -> Result<Docker> {
    let endpoint = config.docker_endpoint.clone();
    let timeout = config.api_timeout_secs;
    let kind = EndpointKind::of(&endpoint)?;
    debug!(endpoint = %endpoint, ?kind, "connecting to container runtime");
    // the constructors can touch the filesystem, keep them off of the runtime
    // threads
    tokio::task::spawn_blocking(move || match kind {
        EndpointKind::Unix => {
            Docker::connect_with_unix(&endpoint, timeout, API_DEFAULT_VERSION).stack()
        }
        EndpointKind::Http => {
            Docker::connect_with_http(&endpoint, timeout, API_DEFAULT_VERSION).stack()
        }
    })
    .await
    .stack()?
    .stack_err_locationless("docker_socket::connect -> could not construct the runtime client")
}
