use std::time::Duration;

use clap::Parser;

use common::{ProtocolArgs, ProtocolConfig};

use crate::ClusterConfig;

//
// For parsing the cluster layout and protocol settings.
//
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Number of workers competing for tasks.
    #[arg(short, long, default_value_t = 4)]
    pub workers: usize,

    /// Milliseconds between two events handed to the same participant.
    #[arg(short, long, default_value_t = 1)]
    pub tick_ms: u64,

    /// Seed for task choice and retry jitter. Random if unset.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Count the primes in [1, N], print the answer and exit. Can be repeated;
    /// without it, commands are read from stdin.
    #[arg(short, long = "submit", value_name = "N")]
    pub submit: Vec<u64>,

    #[command(flatten)]
    pub protocol: ProtocolArgs,
}

impl Args {
    /// Split into the cluster settings and the one-shot submissions.
    pub fn into_parts(self) -> anyhow::Result<(ClusterConfig, Vec<u64>)> {
        let config = ClusterConfig {
            workers: self.workers,
            tick: Duration::from_millis(self.tick_ms),
            protocol: ProtocolConfig::try_from(self.protocol)?,
            seed: self.seed,
        };
        Ok((config, self.submit))
    }
}

pub fn parse_args() -> Args {
    Args::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_shot_submissions_repeat() {
        let args = Args::parse_from([
            "standalone", "-w", "2", "--seed", "9", "-s", "30", "-s", "25000",
        ]);
        let (config, submit) = args.into_parts().unwrap();

        assert_eq!(config.workers, 2);
        assert_eq!(config.seed, Some(9));
        assert_eq!(config.tick, Duration::from_millis(1));
        assert_eq!(config.protocol, ProtocolConfig::default());
        assert_eq!(submit, vec![30, 25000]);
    }

    #[test]
    fn protocol_settings_are_validated() {
        let args = Args::parse_from(["standalone", "--claim-window", "0"]);
        assert!(args.into_parts().is_err());

        let args = Args::parse_from(["standalone", "--chunk-size", "100", "--no-jitter"]);
        let (config, _) = args.into_parts().unwrap();
        assert_eq!(config.protocol.chunk_size, 100);
        assert!(!config.protocol.retry.jitter);
    }
}
