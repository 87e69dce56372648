use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "wab-extender")]
#[command(about = "Deploys web application modules from a module layout into a web runtime")]
pub struct CliArgs {
    #[arg(long, help = "Module layout file (TOML)")]
    pub layout: PathBuf,

    #[arg(long, help = "Extender configuration file (TOML)")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Emit JSON formatted logs")]
    pub json: bool,
}
