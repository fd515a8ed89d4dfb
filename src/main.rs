use anyhow::Result;
use clap::Parser;
use kube::{Client, CustomResourceExt};
use nginx_controller::config::{Cli, Command};
use nginx_controller::{controller, NginxCluster};
use tracing::*;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match Cli::parse().command {
        Command::Export => {
            info!("exporting custom resource definition");
            println!("{}", serde_yaml::to_string(&NginxCluster::crd())?);
        }
        Command::Run(args) => {
            let client = Client::try_default().await?;
            controller::run(client, args.into()).await?;
        }
    }
    Ok(())
}
