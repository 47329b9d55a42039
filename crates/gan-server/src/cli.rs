use clap::Parser;
use std::path::PathBuf;

/// Command-line surface for the `gan-mcp` binary. Intentionally small: this server has a
/// single mode of operation (serve one MCP client over stdio), so there is no subcommand
/// tree here the way the sibling CLI binary has one.
#[derive(Parser)]
#[command(name = "gan-mcp", version, about = "MCP server for iterative, adversarial code-quality auditing")]
pub struct Cli {
    /// Path to the TOML config file. Defaults to `.gan/config.toml` under the resolved
    /// working directory, falling back to built-in defaults if absent.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Print the resolved configuration and exit without serving.
    #[arg(long)]
    pub print_config: bool,
}
