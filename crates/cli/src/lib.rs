pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

use commands::grant::GrantRequest;

#[derive(Debug, Parser)]
#[command(
    name = "gigboard",
    about = "Gigboard operator CLI",
    long_about = "Operate Gigboard migrations, readiness checks, config inspection, and posting grants.",
    after_help = "Examples:\n  gigboard doctor --json\n  gigboard grant credit @handle\n  gigboard user 123456789"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Validate config, bot token shape, and DB connectivity checks")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Report ledger totals: users, live listings, subscriptions, grants")]
    Stats,
    #[command(about = "Grant posting privileges to a user addressed by id or @handle")]
    Grant {
        #[command(subcommand)]
        kind: GrantKind,
    },
    #[command(about = "Show one user's entitlement ledger entry")]
    User {
        #[arg(help = "Numeric user id or @handle")]
        identifier: String,
    },
}

#[derive(Debug, Subcommand)]
enum GrantKind {
    #[command(about = "Unlimited posting until explicitly revoked")]
    Permanent {
        #[arg(help = "Numeric user id or @handle")]
        identifier: String,
    },
    #[command(about = "Time-boxed posting; repeated grants stack onto the current expiry")]
    Subscription {
        #[arg(help = "Numeric user id or @handle")]
        identifier: String,
        #[arg(long, default_value_t = 30, help = "Days to add")]
        days: u32,
    },
    #[command(about = "One additional posting credit")]
    Credit {
        #[arg(help = "Numeric user id or @handle")]
        identifier: String,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Stats => commands::stats::run(),
        Command::Grant { kind } => commands::grant::run(grant_request(kind)),
        Command::User { identifier } => commands::user::run(&identifier),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

fn grant_request(kind: GrantKind) -> GrantRequest {
    match kind {
        GrantKind::Permanent { identifier } => GrantRequest::Permanent { identifier },
        GrantKind::Subscription { identifier, days } => {
            GrantRequest::Subscription { identifier, days }
        }
        GrantKind::Credit { identifier } => GrantRequest::Credit { identifier },
    }
}
