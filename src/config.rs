use clap::{Args, Parser, Subcommand};
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "nginx-controller", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the NginxCluster custom resource definition as YAML
    Export,
    /// Run the controller against the cluster in the current kubeconfig
    Run(RunArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Seconds between resyncs of a healthy NginxCluster
    #[arg(long, env = "NGINX_CONTROLLER_RESYNC_SECS", default_value_t = 60)]
    pub resync_secs: u64,
    /// Seconds to wait before retrying a failed reconcile
    #[arg(long, env = "NGINX_CONTROLLER_ERROR_BACKOFF_SECS", default_value_t = 10)]
    pub error_backoff_secs: u64,
    /// Upper bound on a single reconcile, store calls included
    #[arg(long, env = "NGINX_CONTROLLER_RECONCILE_TIMEOUT_SECS", default_value_t = 30)]
    pub reconcile_timeout_secs: u64,
    /// Only watch this namespace instead of the whole cluster
    #[arg(long, env = "NGINX_CONTROLLER_NAMESPACE")]
    pub namespace: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    pub resync_interval: Duration,
    pub error_backoff: Duration,
    pub reconcile_timeout: Duration,
    pub namespace: Option<String>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        ControllerConfig {
            resync_interval: Duration::from_secs(60),
            error_backoff: Duration::from_secs(10),
            reconcile_timeout: Duration::from_secs(30),
            namespace: None,
        }
    }
}

impl From<RunArgs> for ControllerConfig {
    fn from(args: RunArgs) -> Self {
        ControllerConfig {
            resync_interval: Duration::from_secs(args.resync_secs),
            error_backoff: Duration::from_secs(args.error_backoff_secs),
            reconcile_timeout: Duration::from_secs(args.reconcile_timeout_secs),
            namespace: args.namespace,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_config(args: &[&str]) -> ControllerConfig {
        match Cli::try_parse_from(args).unwrap().command {
            Command::Run(run) => run.into(),
            other => panic!("expected run, got {:?}", other),
        }
    }

    #[test]
    fn test_run_defaults_match_default_config() {
        assert_eq!(run_config(&["nginx-controller", "run"]), ControllerConfig::default());
    }

    #[test]
    fn test_run_flags_override_defaults() {
        let config = run_config(&[
            "nginx-controller",
            "run",
            "--resync-secs",
            "300",
            "--namespace",
            "web",
        ]);
        assert_eq!(config.resync_interval, Duration::from_secs(300));
        assert_eq!(config.error_backoff, Duration::from_secs(10));
        assert_eq!(config.namespace.as_deref(), Some("web"));
    }

    #[test]
    fn test_export_takes_no_arguments() {
        assert!(matches!(
            Cli::try_parse_from(["nginx-controller", "export"]).unwrap().command,
            Command::Export
        ));
        assert!(Cli::try_parse_from(["nginx-controller", "export", "--resync-secs", "1"]).is_err());
    }
}
