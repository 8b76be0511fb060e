use std::{pin::pin, sync::Arc};

use bollard::{image::CreateImageOptions, Docker};
use futures::StreamExt;
use serde::Serialize;
use stacked_errors::{bail, Result, StackableErr};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::{
    docker_socket, ClusterConfig, Command, ImageReference, PullPolicy, RunnerConfig, RunnerError,
    Spec,
};

/// Pulls and runs automation images against a remote cluster.
///
/// The runtime API handle is created on first use and shared between clones,
/// `ImageRunner` is safe to use from concurrent tasks. Each
/// [ImageRunner::run] call is a single independent invocation of the runtime
/// CLI.
#[derive(Debug, Clone)]
pub struct ImageRunner {
    config: Arc<RunnerConfig>,
    docker: Arc<OnceCell<Docker>>,
}

impl ImageRunner {
    /// Creates a runner without touching the runtime API, the client is
    /// constructed by the first pull
    pub fn new(config: RunnerConfig) -> Self {
        Self {
            config: Arc::new(config),
            docker: Arc::new(OnceCell::new()),
        }
    }

    /// Creates a runner and constructs the runtime API client immediately
    pub async fn connect(config: RunnerConfig) -> std::result::Result<Self, RunnerError> {
        let this = Self::new(config);
        this.docker().await?;
        Ok(this)
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    async fn docker(&self) -> std::result::Result<&Docker, RunnerError> {
        self.docker
            .get_or_try_init(|| docker_socket::connect(&self.config))
            .await
            .map_err(RunnerError::ClientInit)
    }

    /// Pulls `image` through the runtime API, printing progress to stdout.
    /// This succeeds if the image was already present.
    #[tracing::instrument(skip_all, fields(image = %image))]
    pub async fn pull_image(&self, image: &str) -> std::result::Result<(), RunnerError> {
        let docker = self.docker().await?;
        pull(docker, image).await.map_err(|error| RunnerError::Pull {
            image: image.to_owned(),
            error,
        })
    }

    /// Builds the runtime CLI invocation that [ImageRunner::run] executes:
    ///
    /// `<program> run [extra_run_args] -e OPENSHIFT_TARGET=.. -e
    /// OPENSHIFT_USER=.. -e OPENSHIFT_PASS=.. <image> <action> --extra-vars
    /// <extra_vars>`
    pub fn build_command(
        &self,
        action: &str,
        cluster: &ClusterConfig,
        spec: &Spec,
        extra_vars: &str,
    ) -> Command {
        let [target, user, password] = cluster.env_assignments();
        Command::new_os_str(&self.config.program)
            .arg("run")
            .args(&self.config.extra_run_args)
            .arg("-e")
            .arg(target)
            .arg("-e")
            .arg(user)
            .arg("-e")
            .secret_arg(password)
            .arg(&spec.name)
            .arg(action)
            .arg("--extra-vars")
            .arg(extra_vars)
            .debug(self.config.debug)
    }

    /// Runs `action` of the image named by `spec` against `cluster`, with
    /// `parameters` passed as JSON extra-vars. Returns the combined stdout and
    /// stderr of the invocation.
    ///
    /// The image is pulled first according to the configured [PullPolicy].
    /// There is no timeout, wrap the future if one is needed. Dropping the
    /// future kills the invocation.
    #[tracing::instrument(skip_all, fields(image = %spec.name, action = %action))]
    pub async fn run<P: Serialize + ?Sized>(
        &self,
        action: &str,
        cluster: &ClusterConfig,
        spec: &Spec,
        parameters: &P,
    ) -> std::result::Result<Vec<u8>, RunnerError> {
        cluster.validate()?;
        let extra_vars = serde_json::to_string(parameters)?;

        match self.config.pull_policy {
            PullPolicy::Never => (),
            PullPolicy::Always => self.pull_image(&spec.name).await?,
            PullPolicy::BestEffort => {
                if let Err(e) = self.pull_image(&spec.name).await {
                    warn!("pull failed, assuming the image is present: {e}");
                }
            }
        }

        let command = self.build_command(action, cluster, spec, &extra_vars);
        let redacted = command.get_unified_command();
        debug!(command = %redacted, "running image");
        let spawn_err = |error| RunnerError::Spawn {
            command: redacted.clone(),
            error,
        };
        let runner = command.run().await.map_err(spawn_err)?;
        debug!(pid = ?runner.pid(), "spawned");
        let comres = runner.wait_with_output().await.map_err(spawn_err)?;

        if comres.successful() {
            info!(status = ?comres.status, "image run finished");
            Ok(comres.combined)
        } else {
            Err(RunnerError::Execution {
                command: redacted,
                status: comres.status,
                output: comres.combined,
            })
        }
    }
}

async fn pull(docker: &Docker, image: &str) -> Result<()> {
    let reference = ImageReference::parse(image)?;
    info!(%reference, "pulling image");
    let options = CreateImageOptions {
        from_image: reference.repository.clone(),
        tag: reference.tag.clone(),
        ..Default::default()
    };
    let mut progress = pin!(docker.create_image(Some(options), None, None));
    while let Some(info) = progress.next().await {
        let info = info.stack_err_with_locationless(|| format!("pull of {reference} failed"))?;
        if let Some(error) = info.error {
            bail!("runtime reported an error while pulling {reference}: {error}")
        }
        let mut line = String::new();
        if let Some(id) = info.id {
            line.push_str(&id);
            line.push_str(": ");
        }
        if let Some(status) = info.status {
            line.push_str(&status);
        }
        if let Some(bar) = info.progress {
            line.push(' ');
            line.push_str(&bar);
        }
        if !line.is_empty() {
            println!("{line}");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, ffi::OsString};

    use serde_json::json;

    use super::*;
    use crate::Parameters;

    fn cluster() -> ClusterConfig {
        ClusterConfig::new("https://cluster.example.com:8443", "admin", "s3cret-pw")
    }

    fn spec() -> Spec {
        Spec::new("ansibleapp/etherpad-ansibleapp")
    }

    #[test]
    fn command_shape() {
        let runner = ImageRunner::new(RunnerConfig::default());
        let params = Parameters::default().answer("namespace", "etherpad");
        let extra_vars = serde_json::to_string(&params).unwrap();
        let command = runner.build_command("provision", &cluster(), &spec(), &extra_vars);
        assert_eq!(command.program, OsString::from("docker"));
        let args: Vec<String> = command
            .args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(args, vec![
            "run",
            "-e",
            "OPENSHIFT_TARGET=https://cluster.example.com:8443",
            "-e",
            "OPENSHIFT_USER=admin",
            "-e",
            "OPENSHIFT_PASS=s3cret-pw",
            "ansibleapp/etherpad-ansibleapp",
            "provision",
            "--extra-vars",
            r#"{"answers":{"namespace":"etherpad"},"kubecfg":{}}"#,
        ]);
        assert_eq!(args.iter().filter(|a| *a == "-e").count(), 3);
    }

    #[test]
    fn extra_run_args_follow_run() {
        let mut config = RunnerConfig::default().program("podman");
        config.extra_run_args = vec!["--rm".to_owned()];
        let runner = ImageRunner::new(config);
        let command = runner.build_command("deprovision", &cluster(), &spec(), "{}");
        assert_eq!(command.program, OsString::from("podman"));
        assert_eq!(command.args[0], OsString::from("run"));
        assert_eq!(command.args[1], OsString::from("--rm"));
        assert_eq!(command.args[2], OsString::from("-e"));
        assert_eq!(command.args.last().unwrap(), &OsString::from("{}"));
    }

    #[tokio::test]
    async fn successful_run_returns_output() {
        // `echo` stands in for the runtime CLI and prints the arguments it got
        let runner = ImageRunner::new(RunnerConfig::default().program("echo"));
        let output = runner
            .run("provision", &cluster(), &spec(), &json!({"answers": {"a": 1}}))
            .await
            .unwrap();
        let output = String::from_utf8(output).unwrap();
        assert_eq!(
            output,
            "run -e OPENSHIFT_TARGET=https://cluster.example.com:8443 -e OPENSHIFT_USER=admin -e \
             OPENSHIFT_PASS=s3cret-pw ansibleapp/etherpad-ansibleapp provision --extra-vars \
             {\"answers\":{\"a\":1}}\n"
        );
    }

    #[tokio::test]
    async fn failed_run_carries_output() {
        // `ls` fails on the nonexistent "run" path and complains on stderr
        let runner = ImageRunner::new(RunnerConfig::default().program("ls"));
        let err = runner
            .run("provision", &cluster(), &spec(), &Parameters::default())
            .await
            .unwrap_err();
        match &err {
            RunnerError::Execution {
                command,
                status,
                output,
            } => {
                assert!(!output.is_empty());
                assert!(!status.unwrap().success());
                assert!(command.starts_with("ls run -e"));
                assert!(command.contains("OPENSHIFT_PASS=<redacted>"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(err.output().is_some());
        assert!(!err.to_string().contains("s3cret-pw"));
    }

    #[tokio::test]
    async fn only_the_password_value_is_redacted() {
        let runner = ImageRunner::new(RunnerConfig::default().program("ls"));
        for cluster in [
            ClusterConfig::new("https://cluster.example.com:8443", "admin", "admin"),
            ClusterConfig::new("https://cluster.example.com:8443", "admin", "a"),
        ] {
            let err = runner
                .run("provision", &cluster, &spec(), &Parameters::default())
                .await
                .unwrap_err();
            let RunnerError::Execution { command, status, .. } = &err else {
                panic!("unexpected {err:?}")
            };
            assert_eq!(
                command,
                "ls run -e OPENSHIFT_TARGET=https://cluster.example.com:8443 -e \
                 OPENSHIFT_USER=admin -e OPENSHIFT_PASS=<redacted> \
                 ansibleapp/etherpad-ansibleapp provision --extra-vars \
                 {\"answers\":{},\"kubecfg\":{}}"
            );
            let message = err.to_string();
            assert!(message.contains(&format!("exited with {}", status.unwrap())));
            assert!(message.contains("exited with exit status: "));
            assert!(!message.contains("unix_wait_status"));
        }
    }

    #[tokio::test]
    async fn built_command_failures_do_not_show_the_password() {
        let runner = ImageRunner::new(RunnerConfig::default().program("ls"));
        let comres = runner
            .build_command("provision", &cluster(), &spec(), "{}")
            .run_to_completion()
            .await
            .unwrap();
        let err = comres.assert_success().unwrap_err();
        assert!(!format!("{err:?}").contains("s3cret-pw"));
        assert!(!format!("{comres}").contains("s3cret-pw"));
    }

    #[tokio::test]
    async fn unserializable_parameters_fail_before_spawning() {
        // the program does not exist, so reaching the spawn would give a different
        // error
        let runner = ImageRunner::new(RunnerConfig::default().program("nonexistent_runtime_91f2"));
        let mut params = HashMap::new();
        params.insert((1u8, 2u8), "map keys must be strings in JSON");
        let err = runner
            .run("provision", &cluster(), &spec(), &params)
            .await
            .unwrap_err();
        assert!(matches!(err, RunnerError::Serialization(_)), "{err:?}");
    }

    #[tokio::test]
    async fn spawn_failure() {
        let runner = ImageRunner::new(RunnerConfig::default().program("nonexistent_runtime_91f2"));
        let err = runner
            .run("provision", &cluster(), &spec(), &Parameters::default())
            .await
            .unwrap_err();
        match err {
            RunnerError::Spawn { command, .. } => {
                assert!(!command.contains("s3cret-pw"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_cluster_field_is_rejected() {
        let runner = ImageRunner::new(RunnerConfig::default().program("echo"));
        let cluster = ClusterConfig::new("https://cluster.example.com:8443", "", "pw");
        let err = runner
            .run("provision", &cluster, &spec(), &Parameters::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RunnerError::InvalidCluster { field: "user" }));
    }

    #[tokio::test]
    async fn pull_from_unreachable_runtime_fails() {
        // nothing listens on port 1
        let runner = ImageRunner::new(RunnerConfig::default().docker_endpoint("tcp://127.0.0.1:1"));
        let err = runner.pull_image("alpine:3.20").await.unwrap_err();
        assert!(
            matches!(err, RunnerError::Pull { ref image, .. } if image == "alpine:3.20"),
            "{err:?}"
        );

        let runner = ImageRunner::new(
            RunnerConfig::default().docker_endpoint("unix:///nonexistent/dir/docker.sock"),
        );
        let err = runner.pull_image("alpine:3.20").await.unwrap_err();
        assert!(
            matches!(err, RunnerError::ClientInit(_) | RunnerError::Pull { .. }),
            "{err:?}"
        );
    }

    #[tokio::test]
    async fn pull_policy_gates_run() {
        let config = RunnerConfig::default()
            .docker_endpoint("tcp://127.0.0.1:1")
            .program("echo");

        let runner = ImageRunner::new(config.clone().pull_policy(PullPolicy::Always));
        let err = runner
            .run("provision", &cluster(), &spec(), &Parameters::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RunnerError::Pull { .. }), "{err:?}");

        let runner = ImageRunner::new(config.pull_policy(PullPolicy::BestEffort));
        let output = runner
            .run("provision", &cluster(), &spec(), &Parameters::default())
            .await
            .unwrap();
        assert!(!output.is_empty());
    }

    #[tokio::test]
    async fn unsupported_endpoint_is_client_init_error() {
        let err = ImageRunner::connect(RunnerConfig::default().docker_endpoint("ftp://nowhere"))
            .await
            .unwrap_err();
        assert!(matches!(err, RunnerError::ClientInit(_)), "{err:?}");
    }
}
