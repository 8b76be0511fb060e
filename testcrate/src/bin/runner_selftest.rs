//! Exercises `ImageRunner::run` without a container runtime. This program
//! calls itself as the runtime CLI: invoked as `runner_selftest run ...` it
//! checks the argument shape like a runtime would and echoes what it got.

use std::process::ExitCode;

use ansibleapp::{
    ClusterConfig, ImageRunner, Parameters, RunnerConfig, RunnerError, Spec, REDACTED,
};
use stacked_errors::{bail, ensure, ensure_eq, Result, StackableErr};
use tracing::info;

fn fake_runtime(args: &[String]) -> ExitCode {
    // run -e T -e U -e P <image> <action> --extra-vars <json>
    if (args.len() != 11) || (args[9] != "--extra-vars") {
        eprintln!("unexpected arguments {args:?}");
        return ExitCode::from(125)
    }
    for (flag, prefix) in args[1..7]
        .chunks(2)
        .zip(["OPENSHIFT_TARGET=", "OPENSHIFT_USER=", "OPENSHIFT_PASS="])
    {
        if (flag[0] != "-e") || !flag[1].starts_with(prefix) {
            eprintln!("bad environment assignment {flag:?}");
            return ExitCode::from(125)
        }
    }
    let (image, action, extra_vars) = (&args[7], &args[8], &args[10]);
    println!("image {image}");
    println!("action {action}");
    eprintln!("extra-vars {extra_vars}");
    if action == "fail" {
        eprintln!("the playbook failed");
        ExitCode::from(2)
    } else {
        ExitCode::SUCCESS
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.first().map(|s| s.as_str()) == Some("run") {
        return Ok(fake_runtime(&args))
    }

    tracing_subscriber::fmt().init();

    let program = std::env::current_exe().stack()?;
    let config = RunnerConfig::default()
        .program(program.to_string_lossy())
        .debug(true);
    let runner = ImageRunner::new(config);
    let cluster = ClusterConfig::new("https://cluster.example.com:8443", "admin", "hunter2");
    let spec = Spec::new("ansibleapp/etherpad-ansibleapp");
    let params = Parameters::default().answer("namespace", "etherpad");

    let output = runner
        .run("provision", &cluster, &spec, &params)
        .await
        .stack()?;
    let output = String::from_utf8_lossy(&output);
    ensure!(output.contains("image ansibleapp/etherpad-ansibleapp\n"));
    ensure!(output.contains("action provision\n"));
    ensure!(output.contains(r#"extra-vars {"answers":{"namespace":"etherpad"},"kubecfg":{}}"#));
    info!("provision succeeded");

    match runner.run("fail", &cluster, &spec, &params).await {
        Err(e @ RunnerError::Execution { .. }) => {
            let output = e.output().stack()?;
            ensure!(output.contains("the playbook failed"));
            let message = e.to_string();
            ensure!(!message.contains("hunter2"));
            ensure!(message.contains(REDACTED));
        }
        other => bail!("expected an execution error, got {other:?}"),
    }
    info!("failing action surfaced its output");

    let empty = ClusterConfig::new("", "admin", "hunter2");
    ensure_eq!(
        runner
            .run("provision", &empty, &spec, &params)
            .await
            .err()
            .map(|e| e.to_string()),
        Some("the cluster config field `target` is empty".to_owned())
    );

    println!("\nall checks passed");
    Ok(ExitCode::SUCCESS)
}
