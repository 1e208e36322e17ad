//! CLI module - operator and admin surface over the engine.
//!
//! Every command builds an [`Engine`](crate::state::Engine) against the
//! configured store, runs one operation and prints the result.

mod commands;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};

use crate::config::Config;

/// `AnimeRealm` - token-gated anime catalog and delivery engine
#[derive(Parser)]
#[command(name = "animerealm")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the dispatcher and scheduler until Ctrl+C
    #[command(alias = "-d", alias = "--daemon")]
    Daemon,

    /// Create a default config file
    #[command(alias = "--init")]
    Init,

    /// Show a user's balance, premium status and recent ledger entries
    Balance {
        user_id: i64,

        /// Number of ledger entries to show
        #[arg(short, long, default_value_t = 10)]
        history: u64,
    },

    /// Add tokens to a user
    Grant {
        user_id: i64,
        #[arg(value_parser = clap::value_parser!(i64).range(1..))]
        amount: i64,

        /// Idempotency key; repeat it to make the grant retry-safe
        #[arg(long)]
        key: Option<String>,
    },

    /// Remove tokens from a user
    Revoke {
        user_id: i64,
        #[arg(value_parser = clap::value_parser!(i64).range(1..))]
        amount: i64,

        #[arg(long)]
        key: Option<String>,
    },

    /// Grant premium until the given RFC 3339 time, or for a number of days
    Premium {
        user_id: i64,

        #[arg(long, conflicts_with = "days")]
        until: Option<DateTime<Utc>>,

        #[arg(long, default_value_t = 30)]
        days: i64,
    },

    /// Revoke premium
    Unpremium { user_id: i64 },

    /// Publish an episode and notify watchlisters
    Publish { episode_id: i32 },

    /// Hide a published episode
    Unpublish { episode_id: i32 },

    /// List the newest published episodes
    Latest {
        #[arg(short, long)]
        limit: Option<u64>,
    },

    /// List the most downloaded series
    Popular {
        #[arg(short, long)]
        limit: Option<u64>,
    },

    /// Show top downloaders
    Leaderboard {
        #[arg(short, long)]
        limit: Option<u64>,
    },

    /// Show system-wide counts
    Stats,

    /// List pending anime requests
    Requests {
        #[arg(short, long, default_value_t = 0)]
        page: u64,
    },

    /// Delete long-expired redeem links and run scheduled jobs once
    Compact,

    /// Irreversibly delete all data (owner only)
    Wipe {
        /// The caller's user id; must match general.owner_id
        #[arg(long = "as")]
        caller: i64,

        /// Required confirmation
        #[arg(long)]
        yes: bool,
    },

    /// Show whether a wipe is in progress
    WipeStatus,

    /// Clear the wipe-in-progress flag after a failed wipe
    ClearWipe,
}

pub async fn run_command(command: Commands, config: Config) -> anyhow::Result<()> {
    match command {
        Commands::Daemon => commands::cmd_daemon(config).await,
        Commands::Init => {
            Config::create_default_if_missing()?;
            println!("✓ Config file created. Edit config.toml and run again.");
            Ok(())
        }
        Commands::Balance { user_id, history } => {
            commands::cmd_balance(config, user_id, history).await
        }
        Commands::Grant { user_id, amount, key } => {
            commands::cmd_adjust(config, user_id, amount, key).await
        }
        Commands::Revoke { user_id, amount, key } => {
            commands::cmd_adjust(config, user_id, -amount, key).await
        }
        Commands::Premium {
            user_id,
            until,
            days,
        } => commands::cmd_premium(config, user_id, until, days).await,
        Commands::Unpremium { user_id } => commands::cmd_unpremium(config, user_id).await,
        Commands::Publish { episode_id } => commands::cmd_publish(config, episode_id).await,
        Commands::Unpublish { episode_id } => commands::cmd_unpublish(config, episode_id).await,
        Commands::Latest { limit } => commands::cmd_latest(config, limit).await,
        Commands::Popular { limit } => commands::cmd_popular(config, limit).await,
        Commands::Leaderboard { limit } => commands::cmd_leaderboard(config, limit).await,
        Commands::Stats => commands::cmd_stats(config).await,
        Commands::Requests { page } => commands::cmd_requests(config, page).await,
        Commands::Compact => commands::cmd_compact(config).await,
        Commands::Wipe { caller, yes } => commands::cmd_wipe(config, caller, yes).await,
        Commands::WipeStatus => commands::cmd_wipe_status(config).await,
        Commands::ClearWipe => commands::cmd_clear_wipe(config).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_revoke_with_key() {
        let cli = Cli::parse_from(["animerealm", "revoke", "42", "3", "--key", "refund-7"]);
        match cli.command {
            Some(Commands::Revoke { user_id, amount, key }) => {
                assert_eq!(user_id, 42);
                assert_eq!(amount, 3);
                assert_eq!(key.as_deref(), Some("refund-7"));
            }
            _ => panic!("expected revoke"),
        }
    }

    #[test]
    fn rejects_non_positive_amounts() {
        assert!(Cli::try_parse_from(["animerealm", "revoke", "42", "--", "-5"]).is_err());
        assert!(Cli::try_parse_from(["animerealm", "revoke", "42", "0"]).is_err());
        assert!(Cli::try_parse_from(["animerealm", "grant", "42", "--", "-9223372036854775808"]).is_err());
        assert!(Cli::try_parse_from(["animerealm", "grant", "42", "5"]).is_ok());
    }

    #[test]
    fn wipe_requires_caller() {
        assert!(Cli::try_parse_from(["animerealm", "wipe", "--yes"]).is_err());
        assert!(Cli::try_parse_from(["animerealm", "wipe", "--as", "1", "--yes"]).is_ok());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
