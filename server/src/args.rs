use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "PANEL_CONFIG", default_value = "config.toml")]
    pub config: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP server (default)
    Serve,

    /// Create a user in the credential database. Only the storage section of
    /// the configuration is used; no signing secret is required.
    AddUser {
        #[arg(long)]
        username: String,

        #[arg(long)]
        password: String,

        /// Role to grant; repeatable
        #[arg(long = "role")]
        roles: Vec<String>,
    },
}
