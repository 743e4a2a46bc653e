use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use mountie_core::{
    logging, Action, ConvergenceEngine, ConvergenceResult, DesiredSpec, MountsConfig, Runner,
    DEFAULT_SETTLE,
};
use mountie_hal::hal::SystemHal;
use mountie_hal::MountProbe;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "mountie")]
#[command(about = "Converge mount points to their declared state")]
struct Cli {
    /// Report what would change without touching the system
    #[arg(long, global = true)]
    dry_run: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use this file instead of /etc/fstab for boot entries
    #[arg(long, global = true)]
    fstab: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Converge every mount listed in a TOML config file
    Apply {
        #[arg(long)]
        config: PathBuf,
    },

    /// Mount the device unless something is already mounted there
    Mount(TargetArgs),

    /// Unmount the mount point if it is mounted
    #[command(alias = "unmount")]
    Umount(TargetArgs),

    /// Re-apply options to a mounted filesystem
    Remount(TargetArgs),

    /// Write the boot-time entry (or rewrite it when options changed)
    Enable(TargetArgs),

    /// Remove the boot-time entry
    Disable(TargetArgs),

    /// Print the probed state of a mount point
    Status {
        #[arg(long)]
        mount_point: PathBuf,
    },
}

#[derive(Debug, Args)]
struct TargetArgs {
    /// Device, label or UUID spec (e.g. /dev/sdb1, LABEL=DATA)
    #[arg(long)]
    device: String,

    #[arg(long)]
    mount_point: PathBuf,

    #[arg(short = 't', long)]
    fstype: Option<String>,

    /// Mount options, comma-separated or repeated
    #[arg(short = 'o', long, value_delimiter = ',')]
    options: Vec<String>,

    #[arg(long, default_value_t = 0)]
    dump: u32,

    #[arg(long, default_value_t = 0)]
    pass: u32,

    /// The filesystem cannot remount in place; remount unmounts and mounts again
    #[arg(long)]
    no_remount: bool,

    /// Seconds to wait between unmount and mount when remounting without support
    #[arg(long)]
    settle_secs: Option<u64>,
}

impl TargetArgs {
    fn to_spec(&self, action: Action) -> Result<DesiredSpec> {
        let mut spec = DesiredSpec::new(self.device.clone(), self.mount_point.clone())
            .context("invalid mount target")?
            .with_options(&self.options)
            .with_dump_pass(self.dump, self.pass)
            .with_supports_remount(!self.no_remount)
            .with_persist_at_boot(action == Action::Enable);
        if let Some(fstype) = &self.fstype {
            spec = spec.with_fstype(fstype.clone());
        }
        Ok(spec)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match &cli.command {
        Commands::Apply { config } => apply(&cli, config),
        Commands::Mount(target) => converge_one(&cli, Action::Mount, target),
        Commands::Umount(target) => converge_one(&cli, Action::Umount, target),
        Commands::Remount(target) => converge_one(&cli, Action::Remount, target),
        Commands::Enable(target) => converge_one(&cli, Action::Enable, target),
        Commands::Disable(target) => converge_one(&cli, Action::Disable, target),
        Commands::Status { mount_point } => status(&cli, mount_point),
    }
}

#[cfg(target_os = "linux")]
fn backend(fstab: Option<&Path>, timeout: Option<Duration>) -> impl SystemHal {
    let hal = mountie_hal::default_backend().with_command_timeout(timeout);
    match fstab {
        Some(path) => hal.with_fstab_path(path),
        None => hal,
    }
}

#[cfg(not(target_os = "linux"))]
fn backend(_fstab: Option<&Path>, _timeout: Option<Duration>) -> impl SystemHal {
    mountie_hal::default_backend()
}

fn apply(cli: &Cli, config_path: &Path) -> Result<()> {
    let config = MountsConfig::load(config_path)?;
    let resources = config.resources()?;
    let fstab = cli.fstab.as_deref().or(config.fstab.as_deref());
    let hal = backend(fstab, config.command_timeout());
    let engine = ConvergenceEngine::new(&hal).with_settle(config.settle());

    log::info!(
        "converging {} mount(s) from {}{}",
        resources.len(),
        config_path.display(),
        if cli.dry_run { " (dry run)" } else { "" }
    );
    let results = Runner::new(&engine, &hal, cli.dry_run).apply(&resources)?;
    print_results(&results);
    Ok(())
}

fn converge_one(cli: &Cli, action: Action, target: &TargetArgs) -> Result<()> {
    let spec = target.to_spec(action)?;
    let hal = backend(cli.fstab.as_deref(), None);
    let settle = target
        .settle_secs
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_SETTLE);
    let engine = ConvergenceEngine::new(&hal).with_settle(settle);

    let current = hal
        .current_state(&spec)
        .with_context(|| format!("Failed to probe {}", spec.mount_point.display()))?;
    let result = engine.converge(action, &spec, &current, cli.dry_run)?;
    print_results(&[result]);
    Ok(())
}

fn status(cli: &Cli, mount_point: &Path) -> Result<()> {
    let spec = DesiredSpec::new("", mount_point).context("invalid mount point")?;
    let hal = backend(cli.fstab.as_deref(), None);
    let state = hal
        .current_state(&spec)
        .with_context(|| format!("Failed to probe {}", mount_point.display()))?;

    println!("mount point: {}", mount_point.display());
    println!(
        "mounted:     {}",
        match &state.device {
            Some(device) => format!("yes ({device})"),
            None if state.is_mounted => "yes".to_string(),
            None => "no".to_string(),
        }
    );
    println!(
        "at boot:     {}",
        if state.is_enabled_at_boot { "yes" } else { "no" }
    );
    Ok(())
}

fn print_results(results: &[ConvergenceResult]) {
    for result in results {
        println!("{result}");
    }
}
