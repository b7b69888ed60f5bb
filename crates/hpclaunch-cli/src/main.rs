//! hpclaunch: place a batch of instances across OpenStack regions.
//!
//! # Usage
//!
//! ```text
//! hpclaunch create --keypair-name ops --instance-count 10 --assign-public-ip
//! hpclaunch --config launch.toml create --keypair-name ops --format json
//! ```
//!
//! Credentials come from the usual `OS_*` environment variables or the
//! matching flags. Logs go to stderr; the report goes to stdout.

use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use tracing::{debug, warn};

use hpclaunch_cloud::AuthOptions;
use hpclaunch_core::LaunchConfig;

mod commands;
mod output;

#[derive(Parser)]
#[command(
    name = "hpclaunch",
    about = "Anti-affinity instance placement across OpenStack regions",
    version,
    propagate_version = true
)]
struct Cli {
    #[command(flatten)]
    auth: AuthArgs,

    /// Region list, group naming and poll budgets (launch.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone)]
struct AuthArgs {
    /// Keystone endpoint, e.g. https://api.example.com:5000/v3
    #[arg(long, env = "OS_AUTH_URL", global = true)]
    os_auth_url: Option<String>,

    #[arg(long, env = "OS_USERNAME", global = true)]
    os_username: Option<String>,

    #[arg(long, env = "OS_PASSWORD", global = true, hide_env_values = true)]
    os_password: Option<String>,

    /// Project (tenant) to scope the token to.
    #[arg(long, env = "OS_TENANT_NAME", global = true)]
    os_tenant_name: Option<String>,

    /// Region the session starts in. Placement still walks every
    /// configured region.
    #[arg(long, env = "OS_REGION_NAME", global = true)]
    os_region_name: Option<String>,

    #[arg(long, env = "OS_USER_DOMAIN_NAME", default_value = "Default", global = true)]
    os_user_domain_name: String,

    #[arg(long, env = "OS_PROJECT_DOMAIN_NAME", default_value = "Default", global = true)]
    os_project_domain_name: String,

    /// CA bundle for verifying the API certificates.
    #[arg(long, env = "OS_CACERT", global = true)]
    os_cacert: Option<PathBuf>,

    /// Skip TLS certificate verification.
    #[arg(long, global = true)]
    insecure: bool,
}

impl AuthArgs {
    /// All four of auth URL, username, password and tenant are required.
    fn into_options(self) -> anyhow::Result<AuthOptions> {
        let (Some(auth_url), Some(username), Some(password), Some(project_name)) = (
            self.os_auth_url,
            self.os_username,
            self.os_password,
            self.os_tenant_name,
        ) else {
            bail!(
                "please specify auth information: --os-auth-url, --os-username, \
                 --os-password and --os-tenant-name (or OS_AUTH_URL, OS_USERNAME, \
                 OS_PASSWORD, OS_TENANT_NAME)"
            );
        };

        Ok(AuthOptions {
            auth_url,
            username,
            password,
            project_name,
            user_domain_name: self.os_user_domain_name,
            project_domain_name: self.os_project_domain_name,
            cacert: self.os_cacert,
            insecure: self.insecure,
        })
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create instances, spreading them over regions under anti-affinity.
    Create(commands::create::CreateArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,hpclaunch=debug".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    if let Some(region) = &cli.auth.os_region_name {
        if config.region(region).is_none() {
            warn!(%region, "OS_REGION_NAME is not one of the configured placement regions");
        }
    }
    let auth = cli.auth.into_options()?;

    match cli.command {
        Commands::Create(args) => commands::create::run(&auth, &config, args).await,
    }
}

fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<LaunchConfig> {
    match path {
        Some(path) => {
            let config = LaunchConfig::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?;
            debug!(path = %path.display(), regions = config.regions.len(), "config loaded");
            Ok(config)
        }
        None => Ok(LaunchConfig::default()),
    }
}
