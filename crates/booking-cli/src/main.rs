//! Booking CLI - sign in to the booking API and keep the session fresh.

mod commands;
mod output;

use clap::{Parser, Subcommand};

/// Booking CLI - manage your booking API session.
#[derive(Parser)]
#[command(name = "booking")]
#[command(about = "Booking CLI for sign-in, session status, and authenticated requests")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text", global = true)]
    format: output::OutputFormat,

    /// Log level (trace, debug, info, warn, error); defaults to the config value
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Login with email and password
    Login {
        /// Account email (prompted when omitted)
        #[arg(short, long)]
        email: Option<String>,
        /// Account password (prompted when omitted)
        #[arg(long, env = "BOOKING_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Logout and clear the stored session
    Logout,

    /// Show the stored session and token expiry
    Status,

    /// Keep the session fresh until Ctrl-C
    Watch,

    /// Check whether a route may be opened
    Guard {
        /// Route path, e.g. /admin/movies
        path: String,
        /// Admit any signed-in user instead of administrators only
        #[arg(long)]
        any_role: bool,
    },

    /// Send an authenticated API request
    Request {
        /// HTTP method, e.g. GET or post
        method: String,
        /// Path relative to the API base URL
        path: String,
        /// JSON request body
        #[arg(short, long)]
        body: Option<String>,
    },

    /// Create an account
    Register {
        #[arg(short, long)]
        username: String,
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        address: String,
        #[arg(short, long)]
        phone: String,
        /// Account password (prompted when omitted)
        #[arg(long, env = "BOOKING_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let context = commands::Context::load()?;
    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| context.config.log_level.clone());
    let log_file = context.paths.log_file();
    booking_config_and_utils::init_logging(&level, Some(log_file.as_path()));

    match cli.command {
        Commands::Login { email, password } => {
            commands::login(&context, email, password, &cli.format).await
        }
        Commands::Logout => commands::logout(&context, &cli.format),
        Commands::Status => commands::status(&context, &cli.format),
        Commands::Watch => commands::watch(&context, &cli.format).await,
        Commands::Guard { path, any_role } => {
            commands::guard(&context, &path, any_role, &cli.format).await
        }
        Commands::Request { method, path, body } => {
            commands::request(&context, &method, &path, body.as_deref(), &cli.format).await
        }
        Commands::Register {
            username,
            email,
            address,
            phone,
            password,
        } => {
            let account = commands::NewAccount {
                username,
                email,
                address,
                phone_number: phone,
            };
            commands::register(&context, account, password, &cli.format).await
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let format = cli.format;

    if let Err(e) = run(cli).await {
        output::print_error(&format!("{:#}", e), &format);
        std::process::exit(1);
    }
}
