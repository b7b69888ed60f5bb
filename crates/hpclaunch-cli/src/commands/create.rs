use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::Args;
use tracing::info;

use hpclaunch_cloud::{AuthOptions, OpenStackCloud};
use hpclaunch_core::{LaunchConfig, LaunchSpec};
use hpclaunch_placement::Allocator;

use crate::output::{self, OutputFormat};

#[derive(Args, Debug, Clone)]
pub struct CreateArgs {
    /// Number of instances to create.
    #[arg(long, default_value = "5")]
    pub instance_count: u32,

    /// Attach a floating address from each region's public network.
    #[arg(long)]
    pub assign_public_ip: bool,

    /// cloud-init script passed as user data.
    #[arg(long)]
    pub path_cloud_init_script: Option<PathBuf>,

    /// Instances are named `<prefix><ordinal>`.
    #[arg(long, default_value = "instance-")]
    pub name_prefix: String,

    #[arg(long, default_value = "ubuntu-16.04-x86_64")]
    pub image_name: String,

    #[arg(long, default_value = "c1.c1r1")]
    pub flavor_name: String,

    #[arg(long, default_value = "private-net")]
    pub network_name: String,

    /// Root volume size in GB.
    #[arg(long, default_value = "20")]
    pub volume_size: u32,

    #[arg(long)]
    pub keypair_name: String,

    #[arg(long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

impl CreateArgs {
    pub fn launch_spec(&self) -> LaunchSpec {
        LaunchSpec {
            count: self.instance_count,
            name_prefix: self.name_prefix.clone(),
            image: self.image_name.clone(),
            flavor: self.flavor_name.clone(),
            network: self.network_name.clone(),
            volume_size: self.volume_size,
            keypair: self.keypair_name.clone(),
            assign_public_ip: self.assign_public_ip,
            cloud_init_path: self.path_cloud_init_script.clone(),
        }
    }
}

pub async fn run(auth: &AuthOptions, config: &LaunchConfig, args: CreateArgs) -> anyhow::Result<()> {
    let cloud = OpenStackCloud::connect(auth)
        .await
        .context("could not authenticate with the identity service")?;

    let spec = args.launch_spec();
    info!(
        count = spec.count,
        image = %spec.image,
        flavor = %spec.flavor,
        regions = ?config.region_names(),
        "starting placement"
    );

    let started = Instant::now();
    let mut allocator = Allocator::new(&cloud, config);
    let report = allocator.run(&spec.requests()).await;

    info!(
        placed = report.instances.len(),
        requested = spec.count,
        failed = ?report.failed_ordinals(),
        "Job finished in {:.1}s",
        started.elapsed().as_secs_f64()
    );

    println!("{}", output::render(&report.instances, args.format)?);
    Ok(())
}
