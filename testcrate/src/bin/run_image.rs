//! Pulls and runs an automation image against a cluster, e.g.
//!
//! ```text
//! OPENSHIFT_PASS=admin cargo r --bin run_image -- --image \
//!     ansibleapp/etherpad-ansibleapp --action provision --target \
//!     https://cluster.example.com:8443 --user admin --pull always \
//!     --params '{"answers": {"namespace": "etherpad"}}'
//! ```

use std::path::PathBuf;

use ansibleapp::{ClusterConfig, ImageRunner, Parameters, PullPolicy, RunnerConfig, Spec};
use clap::Parser;
use stacked_errors::{Result, StackableErr};
use tracing::info;

#[derive(Parser, Debug)]
#[command(about)]
struct Args {
    /// The image reference to run
    #[arg(long)]
    image: String,
    /// The action the image performs, e.g. "provision" or "deprovision"
    #[arg(long)]
    action: String,
    #[arg(long, env = "OPENSHIFT_TARGET")]
    target: String,
    #[arg(long, env = "OPENSHIFT_USER")]
    user: String,
    #[arg(long, env = "OPENSHIFT_PASS", hide_env_values = true)]
    password: String,
    /// The extra-vars as a JSON object
    #[arg(long, default_value_t = String::from("{}"))]
    params: String,
    /// A JSON `RunnerConfig`, the flags below override its fields
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    docker_endpoint: Option<String>,
    #[arg(long)]
    program: Option<String>,
    /// "never", "always", or "best_effort"
    #[arg(long)]
    pull: Option<PullPolicy>,
    /// Forward the runtime output as it arrives
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let args = Args::parse();

    let mut config = if let Some(ref path) = args.config {
        let s = tokio::fs::read_to_string(path)
            .await
            .stack_err_with(|| format!("could not read config file {path:?}"))?;
        RunnerConfig::from_json_str(&s).stack()?
    } else {
        RunnerConfig::default()
    };
    if let Some(docker_endpoint) = args.docker_endpoint {
        config = config.docker_endpoint(docker_endpoint);
    }
    if let Some(program) = args.program {
        config = config.program(program);
    }
    if let Some(pull) = args.pull {
        config = config.pull_policy(pull);
    }
    if args.debug {
        config = config.debug(true);
    }

    let params: Parameters =
        serde_json::from_str(&args.params).stack_err("`--params` is not a JSON object")?;
    let cluster = ClusterConfig::new(args.target, args.user, args.password);
    let spec = Spec::new(args.image);

    let runner = ImageRunner::new(config);
    let output = runner
        .run(&args.action, &cluster, &spec, &params)
        .await
        .stack()?;
    info!("{} finished", args.action);
    if !runner.config().debug {
        print!("{}", String::from_utf8_lossy(&output));
    }
    Ok(())
}
