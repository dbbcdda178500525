use clap::Args;
use std::path::PathBuf;

/// Where the run configuration comes from. Shared by every subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigOptions {
    /// Run configuration file (YAML, TOML or JSON)
    #[arg(long, short = 'c', value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Override a setting; `key=value` lands in the command-line section,
    /// `.section.key=value` addresses a nested key directly
    #[arg(long = "override", short = 'o', value_name = "KEY=VALUE")]
    pub overrides: Vec<String>,

    /// Backend identifier (default: config file, then GENFLOW_BACKEND, then dryrun)
    #[arg(long, value_name = "NAME")]
    pub backend: Option<String>,

    /// Directory receiving the workflow, scripts and graph slices
    #[arg(long, value_name = "DIR")]
    pub submit_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct TransformArgs {
    #[command(flatten)]
    pub config: ConfigOptions,

    /// Computation graph document (JSON)
    #[arg(long, short = 'g', value_name = "FILE")]
    pub graph: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct SubmitArgs {
    #[command(flatten)]
    pub config: ConfigOptions,

    /// Computation graph document (JSON)
    #[arg(long, short = 'g', value_name = "FILE")]
    pub graph: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    #[command(flatten)]
    pub config: ConfigOptions,

    /// Print only this key, resolved through the search order
    #[arg(long, value_name = "KEY")]
    pub key: Option<String>,

    /// Print the environment variables genflow reads and exit
    #[arg(long)]
    pub env: bool,
}
