//! Runs "ansible-in-a-box" automation images against a remote cluster.
//!
//! An [ImageRunner] pulls an image through the container runtime API and
//! invokes it through the runtime CLI as
//!
//! ```text
//! docker run -e OPENSHIFT_TARGET=.. -e OPENSHIFT_USER=.. -e OPENSHIFT_PASS=.. \
//!     <image> <action> --extra-vars <json>
//! ```
//!
//! ```no_run
//! use ansibleapp::{ClusterConfig, ImageRunner, Parameters, RunnerConfig, Spec};
//!
//! # async fn f() -> Result<(), ansibleapp::RunnerError> {
//! let runner = ImageRunner::new(RunnerConfig::default());
//! let spec = Spec::new("ansibleapp/etherpad-ansibleapp");
//! runner.pull_image(&spec.name).await?;
//! let cluster = ClusterConfig::new("https://cluster.example.com:8443", "admin", "admin");
//! let params = Parameters::default().answer("namespace", "etherpad");
//! let output = runner.run("provision", &cluster, &spec, &params).await?;
//! println!("{}", String::from_utf8_lossy(&output));
//! # Ok(())
//! # }
//! ```

mod cluster;
mod command;
mod command_runner;
mod config;
/// Construction of the `bollard` runtime API client
pub mod docker_socket;
mod error;
mod image_ref;
mod misc;
mod runner;

pub use cluster::*;
pub use command::*;
pub use command_runner::*;
pub use config::*;
pub use error::*;
pub use image_ref::*;
pub use misc::*;
pub use runner::*;
/// This reexport helps with dependency wrangling
pub use stacked_errors;
