//! CLI argument parsing via clap.

use clap::{Parser, Subcommand};

/// Sign-in and session manager for the Mercato commerce platform.
#[derive(Debug, Parser)]
#[command(
    name = "mercato",
    version = mercato::build_info::VERSION,
    long_version = Box::leak(mercato::build_info::cli_version_text().into_boxed_str()) as &'static str
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Path to config file (default: ./mercato.toml or
    /// ~/.config/mercato/mercato.toml).
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<String>,

    /// Environment to operate on (default: config `default_environment`).
    #[arg(short = 'e', long = "env", global = true)]
    pub env: Option<String>,

    /// Disable color output.
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Sign in to an environment via the system browser.
    Login {
        /// Print the authorization URL instead of opening a browser, then
        /// read the pasted callback URL from stdin.
        #[arg(long = "no-browser")]
        no_browser: bool,
    },
    /// Sign out: revoke the session and clear saved tokens.
    Logout {
        /// Skip opening the IdP end-session page in the browser.
        #[arg(long = "local-only")]
        local_only: bool,
    },
    /// Show saved-session health for the environment.
    Status,
    /// Show the server-verified identity of the current session.
    Whoami,
    /// Print a fresh access token to stdout, refreshing when near expiry.
    Token,
}
