use anyhow::Context;
use canopy_core::{Canopy, CanopyConfig};
use clap::{value_parser, Arg, ArgAction, Command};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("canopy-server")
        .version(canopy_server::VERSION)
        .about("Forest audit pipeline: evidence, analysis, certification and fire-risk alerts")
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .value_parser(value_parser!(PathBuf))
                .help("TOML configuration file; environment variables override it"),
        )
        .arg(
            Arg::new("port")
                .long("port")
                .short('p')
                .value_parser(value_parser!(u16))
                .help("Listen port (overrides config and PORT)"),
        )
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
        .arg(
            Arg::new("allow-missing-credentials")
                .long("allow-missing-credentials")
                .action(ArgAction::SetTrue)
                .help("Start even when collaborator secrets are absent"),
        )
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("log-json"));

    let mut config = CanopyConfig::load(matches.get_one::<PathBuf>("config").map(PathBuf::as_path))
        .context("loading configuration")?;
    if let Some(port) = matches.get_one::<u16>("port") {
        config.server.port = *port;
    }
    if let Err(e) = config.validate_credentials() {
        if matches.get_flag("allow-missing-credentials") {
            tracing::warn!(error = %e, "starting without full credentials");
        } else {
            return Err(e).context("refusing to start; pass --allow-missing-credentials for local runs");
        }
    }

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", config.server.host, config.server.port))?;
    let canopy = Canopy::from_config(config).context("building pipeline")?;

    canopy_server::serve(canopy, addr, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for shutdown signal");
        }
    })
    .await
    .context("serving")?;
    Ok(())
}
