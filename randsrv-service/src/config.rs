//! Configuration types and CLI/environment parsing for the randomness service.
//!
//! Binaries may have a more detailed config and can use the exposed [`RandsrvConfig`] and flatten it with `#[clap(flatten)]`.

use std::{num::NonZeroUsize, time::Duration};

use clap::Parser;
use randsrv_types::{EpochId, Tag};
use secrecy::SecretString;

/// The configuration for the randomness service core functionality.
///
/// It can be configured via environment variables or command line arguments using `clap`.
#[derive(Parser, Debug)]
pub struct RandsrvConfig {
    /// Length of one epoch. The key rotates after every epoch.
    #[clap(
        long,
        env = "RANDSRV_EPOCH_DURATION",
        default_value = "5s",
        value_parser = humantime::parse_duration
    )]
    pub epoch_duration: Duration,

    /// Number of epochs a key stays evaluable after it stopped being current.
    #[clap(long, env = "RANDSRV_RETENTION", default_value = "2")]
    pub retention: usize,

    /// Number of punctured epochs that are remembered (and reported as punctured) before they are forgotten.
    #[clap(long, env = "RANDSRV_PUNCTURED_HISTORY", default_value = "8")]
    pub punctured_history: usize,

    /// The id of the epoch minted at start-up. At most `u64::MAX / 2`.
    #[clap(
        long,
        env = "RANDSRV_FIRST_EPOCH",
        default_value = "0",
        value_parser = clap::value_parser!(u64).range(..=EpochId::MAX_FIRST.into_inner())
    )]
    pub first_epoch: u64,

    /// Comma separated list of tags that get an independent key component in every epoch.
    ///
    /// The untagged component is always available.
    #[clap(long, env = "RANDSRV_TAGS", value_delimiter = ',', value_parser = parse_tag)]
    pub tags: Vec<Tag>,

    /// Max number of points in one evaluation request.
    #[clap(long, env = "RANDSRV_MAX_POINTS", default_value = "1024")]
    pub max_points: NonZeroUsize,

    /// Max number of evaluations that run concurrently. Requests above are rejected.
    #[clap(long, env = "RANDSRV_MAX_CONCURRENT_EVALUATIONS", default_value = "128")]
    pub max_concurrent_evaluations: NonZeroUsize,

    /// Bearer token for the admin endpoints. The admin endpoints are disabled if not set.
    #[clap(long, env = "RANDSRV_ADMIN_TOKEN")]
    pub admin_token: Option<SecretString>,
}

impl RandsrvConfig {
    /// The id of the first epoch.
    pub fn first_epoch(&self) -> EpochId {
        EpochId::new(self.first_epoch)
    }
}

fn parse_tag(value: &str) -> Result<Tag, String> {
    if value.is_empty() {
        Err("tags must not be empty, the untagged component always exists".to_owned())
    } else {
        Ok(Tag::from(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = RandsrvConfig::try_parse_from(["randsrv"]).unwrap();
        assert_eq!(config.epoch_duration, Duration::from_secs(5));
        assert_eq!(config.retention, 2);
        assert_eq!(config.punctured_history, 8);
        assert_eq!(config.first_epoch(), EpochId::new(0));
        assert!(config.tags.is_empty());
        assert_eq!(config.max_points.get(), 1024);
        assert_eq!(config.max_concurrent_evaluations.get(), 128);
        assert!(config.admin_token.is_none());
    }

    #[test]
    fn parses_tags_and_durations() {
        let config = RandsrvConfig::try_parse_from([
            "randsrv",
            "--epoch-duration",
            "1h 30m",
            "--tags",
            "daily,weekly",
            "--first-epoch",
            "7",
        ])
        .unwrap();
        assert_eq!(config.epoch_duration, Duration::from_secs(90 * 60));
        assert_eq!(config.tags, vec![Tag::from("daily"), Tag::from("weekly")]);
        assert_eq!(config.first_epoch(), EpochId::new(7));
    }

    #[test]
    fn bounds_first_epoch() {
        let max = EpochId::MAX_FIRST.into_inner().to_string();
        let config = RandsrvConfig::try_parse_from(["randsrv", "--first-epoch", &max]).unwrap();
        assert_eq!(config.first_epoch(), EpochId::MAX_FIRST);

        let too_large = (EpochId::MAX_FIRST.into_inner() + 1).to_string();
        assert!(RandsrvConfig::try_parse_from(["randsrv", "--first-epoch", &too_large]).is_err());
        let max_u64 = u64::MAX.to_string();
        assert!(RandsrvConfig::try_parse_from(["randsrv", "--first-epoch", &max_u64]).is_err());
    }

    #[test]
    fn rejects_empty_tag() {
        assert!(RandsrvConfig::try_parse_from(["randsrv", "--tags", "a,,b"]).is_err());
    }
}
