//! Tradepost CLI - Database migrations and operator tools.
//!
//! # Usage
//!
//! ```bash
//! # Create the records table
//! tp-cli migrate
//!
//! # Create a staff account (password from TRADEPOST_PASSWORD or stdin)
//! tp-cli user create -u alice -e alice@example.com -r admin
//!
//! # Print a bearer token for an existing user
//! tp-cli token issue -u alice
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `user create` - Create users, including staff roles
//! - `token issue` - Issue a bearer token

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

use commands::CliError;

#[derive(Parser)]
#[command(name = "tp-cli")]
#[command(author, version, about = "Tradepost CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Manage users
    User {
        #[command(subcommand)]
        action: UserAction,
    },
    /// Manage bearer tokens
    Token {
        #[command(subcommand)]
        action: TokenAction,
    },
}

#[derive(Subcommand)]
enum UserAction {
    /// Create a new user
    Create {
        /// Login name
        #[arg(short, long)]
        username: String,

        /// Email address
        #[arg(short, long)]
        email: String,

        /// Role (`customer`, `seller`, `agent`, `admin`)
        #[arg(short, long, default_value = "customer")]
        role: String,

        /// Display name (defaults to the username)
        #[arg(short, long)]
        name: Option<String>,
    },
}

#[derive(Subcommand)]
enum TokenAction {
    /// Issue a token for an existing user
    Issue {
        /// Login name
        #[arg(short, long)]
        username: String,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::User { action } => match action {
            UserAction::Create {
                username,
                email,
                role,
                name,
            } => {
                commands::user::create(&username, &email, &role, name.as_deref()).await?;
            }
        },
        Commands::Token { action } => match action {
            TokenAction::Issue { username } => commands::token::issue(&username).await?,
        },
    }
    Ok(())
}
