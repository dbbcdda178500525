pub mod args;
pub mod commands;

pub use args::{ConfigArgs, ConfigOptions, SubmitArgs, TransformArgs};
use clap::{Parser, Subcommand};
use std::path::Path;

const HELP_TEMPLATE: &str = "\
{name} {version}\n\
{about-with-newline}\n\
USAGE:\n    {usage}\n\
\nOPTIONS:\n{options}\n\
COMMANDS:\n{subcommands}\n";

#[derive(Parser, Debug)]
#[command(name = "genflow")]
#[command(version = crate::VERSION)]
#[command(about = "Turn computation graphs into generic workflows for batch backends")]
#[command(help_template = HELP_TEMPLATE)]
#[command(
    after_long_help = "Typical flow: inspect the resolved config, transform to check the workflow, then submit."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(
        about = "Build the generic workflow without submitting it",
        long_about = "Transform clusters the computation graph, resolves per-job settings and command lines, and writes the workflow and its configuration under the submit directory.",
        after_help = "Example:\n    genflow transform --config run.yaml --graph graph.json"
    )]
    Transform(TransformArgs),
    #[command(
        about = "Transform and hand the workflow to the backend",
        long_about = "Submit runs transform and passes the result to the selected backend, printing the backend's run id.",
        after_help = "Example:\n    genflow submit --config run.yaml --graph graph.json --backend dryrun"
    )]
    Submit(SubmitArgs),
    #[command(
        about = "Show the resolved run configuration",
        long_about = "Config loads defaults, backend defaults, the config file and overrides, then prints the merged result or one resolved key.",
        after_help = "Examples:\n    genflow config --config run.yaml\n    genflow config --config run.yaml --key submitPath"
    )]
    Config(ConfigArgs),
}

impl Command {
    /// Run configuration file named on the command line, if any.
    pub fn config_file(&self) -> Option<&Path> {
        let options = match self {
            Command::Transform(args) => &args.config,
            Command::Submit(args) => &args.config,
            Command::Config(args) => &args.config,
        };
        options.config.as_deref()
    }
}

pub fn run(args: Args) -> crate::Result<()> {
    match args.command {
        Command::Transform(transform_args) => commands::transform(transform_args),
        Command::Submit(submit_args) => commands::submit(submit_args),
        Command::Config(config_args) => commands::config(config_args),
    }
}
