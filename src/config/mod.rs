pub mod policy;

use std::{path::PathBuf, time::Duration};

use clap::{Parser, Subcommand};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use dotenv::dotenv;

use crate::{
    error::{Error, Result},
    post::{Category, DEFAULT_LIFESPAN, NEARBY_RADIUS_KM},
};

pub use policy::SyncPolicy;

#[derive(Debug, Clone, Parser)]
#[command(version, about)]
pub struct Config {
    /// Your account email, used as voter identity
    #[arg(short, long, env = "USER_EMAIL")]
    user: Option<String>,
    /// Local cache database
    #[arg(short, long, env = "DATABASE", default_value = "./posts.db")]
    database: PathBuf,
    /// Base url of the remote document store [default: in-memory]
    #[arg(short, long, env = "REMOTE_URL")]
    remote: Option<String>,
    /// Remote collection name
    #[arg(long, env = "COLLECTION", default_value = "POSTS")]
    collection: String,
    /// Remote poll interval in milliseconds
    #[arg(long, default_value = "2000")]
    poll: u64,
    /// How writes reach both stores
    #[arg(long, default_value = "independent")]
    policy: SyncPolicy,
    /// Limit request concurrency
    #[arg(long, default_value = "5")]
    limit: usize,
    /// Retries for transient http failures
    #[arg(long, default_value = "0")]
    retries: u32,
    /// Reverse geocoding service
    #[arg(
        long,
        env = "GEOCODER_URL",
        default_value = "https://nominatim.openstreetmap.org/"
    )]
    geocoder: String,
    #[command(flatten)]
    pub verbose: Verbosity<InfoLevel>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// List every post
    List,
    /// Show a single post
    Show { id: String },
    /// List posts close to a location, nearest first
    Nearby {
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,
        #[arg(long, allow_negative_numbers = true)]
        lon: f64,
        /// Search radius in kilometers
        #[arg(long, default_value_t = NEARBY_RADIUS_KM)]
        radius: f64,
    },
    /// Follow remote changes until interrupted
    Watch,
    /// Push local posts missing from the remote store
    Sync,
    /// Create a new post
    Create {
        title: String,
        description: String,
        #[arg(long, allow_negative_numbers = true, default_value = "0")]
        lat: f64,
        #[arg(long, allow_negative_numbers = true, default_value = "0")]
        lon: f64,
        /// Url of an already uploaded photo
        #[arg(long)]
        photo: Option<String>,
        /// Days the post stays relevant
        #[arg(long, default_value_t = DEFAULT_LIFESPAN)]
        lifespan: u32,
        #[arg(short, long, default_value = "normal")]
        category: Category,
        /// Skip the postcode lookup
        #[arg(long)]
        no_geocode: bool,
    },
    Upvote { id: String },
    Downvote { id: String },
    /// Withdraw an upvote
    Unupvote { id: String },
    /// Withdraw a downvote
    Undownvote { id: String },
    /// Rate a post from 1 to 5
    Rate {
        id: String,
        #[arg(value_parser = clap::value_parser!(u8).range(1..=5))]
        value: u8,
    },
    /// Comment on a post
    Comment { id: String, text: String },
}

impl Command {
    /// Commands that write to the stores.
    pub const fn mutates(&self) -> bool {
        !matches!(
            self,
            Self::List | Self::Show { .. } | Self::Nearby { .. } | Self::Watch | Self::Sync
        )
    }
}

impl Config {
    /// Parse the configuration from the environment and command line arguments
    pub fn parse() -> Self {
        dotenv().ok();
        <Self as Parser>::parse()
    }
    /// Create a logger with the configured verbosity level
    pub fn init_logger(&self) {
        env_logger::Builder::new()
            .filter_level(self.verbose.log_level_filter())
            .format_target(false)
            .init();
    }
    /// The signed in user, required by every engagement command
    pub fn user(&self) -> Result<&str> {
        self.user
            .as_deref()
            .map(str::trim)
            .filter(|user| !user.is_empty())
            .ok_or_else(|| Error::validation("missing credentials, set --user or USER_EMAIL"))
    }
    pub const fn database(&self) -> &PathBuf {
        &self.database
    }
    pub fn remote(&self) -> Option<&str> {
        self.remote.as_deref().filter(|url| !url.is_empty())
    }
    pub fn collection(&self) -> &str {
        &self.collection
    }
    pub const fn poll(&self) -> Duration {
        Duration::from_millis(self.poll)
    }
    pub const fn policy(&self) -> SyncPolicy {
        self.policy
    }
    pub const fn limit(&self) -> usize {
        self.limit
    }
    pub const fn retries(&self) -> u32 {
        self.retries
    }
    pub fn geocoder(&self) -> &str {
        &self.geocoder
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        Config::try_parse_from(std::iter::once("notice-sync").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn defaults() {
        let config = parse(&["--user", "a@x.com", "list"]);
        assert_eq!(config.user().unwrap(), "a@x.com");
        assert_eq!(config.collection(), "POSTS");
        assert_eq!(config.policy(), SyncPolicy::Independent);
        assert_eq!(config.poll(), Duration::from_millis(2000));
        assert_eq!(config.retries(), 0);
    }

    #[test]
    fn blank_user_is_missing() {
        let config = parse(&["--user", " ", "list"]);
        assert!(matches!(config.user(), Err(Error::Validation(_))));
    }

    #[test]
    fn create_arguments() {
        let config = parse(&[
            "--policy", "write-through", "create", "Fire", "near park", "--lat", "41.15",
            "--lon", "-8.61", "-c", "event",
        ]);
        assert_eq!(config.policy(), SyncPolicy::WriteThrough);
        match config.command {
            Command::Create {
                lat,
                lon,
                category,
                lifespan,
                ..
            } => {
                assert_eq!(lat, 41.15);
                assert_eq!(lon, -8.61);
                assert_eq!(category, Category::Event);
                assert_eq!(lifespan, DEFAULT_LIFESPAN);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn nearby_arguments() {
        let config = parse(&["nearby", "--lat", "41.15", "--lon", "-8.61"]);
        match config.command {
            Command::Nearby { lat, lon, radius } => {
                assert_eq!(lat, 41.15);
                assert_eq!(lon, -8.61);
                assert_eq!(radius, NEARBY_RADIUS_KM);
            }
            other => panic!("unexpected command {:?}", other),
        }

        let config = parse(&["nearby", "--lat", "0", "--lon", "0", "--radius", "2.5"]);
        assert!(matches!(config.command, Command::Nearby { radius, .. } if radius == 2.5));
    }

    #[test]
    fn mutating_commands() {
        assert!(parse(&["upvote", "1"]).command.mutates());
        assert!(parse(&["comment", "1", "careful"]).command.mutates());
        assert!(parse(&["create", "Fire", "near park"]).command.mutates());
        assert!(!parse(&["list"]).command.mutates());
        assert!(!parse(&["nearby", "--lat", "0", "--lon", "0"]).command.mutates());
    }

    #[test]
    fn rating_out_of_range_is_rejected() {
        let args = ["notice-sync", "rate", "1", "6"];
        assert!(Config::try_parse_from(args).is_err());
    }
}
