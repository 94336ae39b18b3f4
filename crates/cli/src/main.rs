// sitehub CLI - site-to-hub registration and signed hub calls

mod exit_codes;
mod hub;
mod users;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use exit_codes::{EXIT_ERROR, EXIT_SUCCESS, EXIT_USAGE};

#[derive(Parser)]
#[command(name = "sitehub")]
#[command(about = "Register this site with a hub and make signed calls on behalf of its users")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    /// Config directory holding hub.json and users.json [default: ~/.config/sitehub]
    #[arg(long, global = true, env = "SITEHUB_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write hub server and site identity to hub.json (keeps stored credentials)
    #[command(after_help = "\
Examples:
  sitehub init --server https://hub.example.org/ --site-url https://blog.example.com/ --title 'My Blog'
  sitehub init --server https://hub.example.org/ --site-url https://blog.example.com/ --title Blog --timeout 30")]
    Init {
        /// Hub base URL
        #[arg(long)]
        server: String,

        /// This site's public URL
        #[arg(long)]
        site_url: String,

        /// This site's title
        #[arg(long)]
        title: String,

        /// Request timeout in seconds (default: none)
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Show registration state for the site and optionally one user
    Status {
        /// User id or handle
        #[arg(long)]
        user: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the current registration token, issuing one if none is live
    Token,

    /// Register the site (and the given user) with the hub if needed
    Connect {
        /// User id or handle
        #[arg(long)]
        user: Option<String>,
    },

    /// Manage local users
    #[command(subcommand)]
    User(UserCommands),

    /// Make a signed call to a hub endpoint as a registered user
    #[command(after_help = "\
Examples:
  sitehub call hub/feeds/subscribe '{\"feed\":\"https://blog.example.com/feed\"}' --user alice")]
    Call {
        /// Endpoint relative to the hub server, e.g. hub/feeds/subscribe
        endpoint: String,

        /// JSON contents to sign and send
        contents: String,

        /// User id or handle
        #[arg(long)]
        user: String,
    },

    /// Print a signed link that logs a user into a hub page
    Link {
        /// Hub page, e.g. hub/page/settings
        endpoint: String,

        /// Where the hub should send the user afterwards
        callback: String,

        /// User id or handle
        #[arg(long)]
        user: String,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    /// Add a local user
    Add {
        handle: String,
        name: String,

        #[arg(long)]
        email: Option<String>,

        #[arg(long)]
        profile_url: Option<String>,
    },

    /// List local users and whether they hold hub credentials
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (", env!("SITEHUB_COMMIT"), ")",
        "\nclient:  sitehub-client ", env!("CARGO_PKG_VERSION"),
        "\ntarget:  ", env!("SITEHUB_TARGET"),
    )
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    // Also installs the log bridge, so the client's `log` records land here.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config_dir = cli.config_dir.unwrap_or_else(sitehub_config::default_config_dir);
    log::debug!("Using config directory {}", config_dir.display());

    let result = match cli.command {
        Commands::Init { server, site_url, title, timeout } => {
            hub::cmd_init(&config_dir, server, site_url, title, timeout)
        }
        Commands::Status { user, json } => hub::cmd_status(&config_dir, user, json),
        Commands::Token => hub::cmd_token(&config_dir),
        Commands::Connect { user } => hub::cmd_connect(&config_dir, user),
        Commands::User(user_cmd) => match user_cmd {
            UserCommands::Add { handle, name, email, profile_url } => {
                users::cmd_user_add(&config_dir, handle, name, email, profile_url)
            }
            UserCommands::List { json } => users::cmd_user_list(&config_dir, json),
        },
        Commands::Call { endpoint, contents, user } => {
            hub::cmd_call(&config_dir, endpoint, contents, user)
        }
        Commands::Link { endpoint, callback, user } => {
            hub::cmd_link(&config_dir, endpoint, callback, user)
        }
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn args(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self { code: EXIT_ERROR, message: msg.into(), hint: None }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}
