use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use log::LevelFilter;
use missive::{Delta, WindowRequest, parse_instant};

/// Pull a Missive team inbox into a local msgpack cache
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Pull options; also accepted before the `pull` subcommand
    #[command(flatten)]
    pub pull: PullArgs,

    /// Cache directory
    #[arg(long, global = true, default_value = "missive.cache.d")]
    pub cache_dir: PathBuf,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch conversations and messages into the cache (default)
    Pull(PullArgs),
    /// Print each cached conversation and its message count
    Summary,
}

#[derive(Args, Debug, Default, Clone)]
pub struct PullArgs {
    /// Team inbox to pull
    #[arg(long, env = "INBOX_ID")]
    pub inbox_id: Option<String>,

    /// Missive API token
    #[arg(long, env = "MISSIVE_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Pull activity before this date (default: now)
    #[arg(long)]
    pub until: Option<String>,

    /// Pull activity from this date on
    #[arg(long, conflicts_with = "delta")]
    pub since: Option<String>,

    /// Pull activity within this span before --until, e.g. `--delta 2 weeks`
    #[arg(long, num_args = 2, value_names = ["COUNT", "UNIT"])]
    pub delta: Option<Vec<String>>,

    /// Conversations fetched concurrently (overrides settings.json)
    #[arg(long)]
    pub workers: Option<usize>,
}

impl PullArgs {
    fn or(self, fallback: &PullArgs) -> PullArgs {
        PullArgs {
            inbox_id: self.inbox_id.or_else(|| fallback.inbox_id.clone()),
            api_key: self.api_key.or_else(|| fallback.api_key.clone()),
            until: self.until.or_else(|| fallback.until.clone()),
            since: self.since.or_else(|| fallback.since.clone()),
            delta: self.delta.or_else(|| fallback.delta.clone()),
            workers: self.workers.or(fallback.workers),
        }
    }

    /// Turn the date flags into an unresolved window request
    pub fn window_request(&self) -> Result<WindowRequest> {
        let until = self.until.as_deref().map(parse_instant).transpose()?;
        let since = self.since.as_deref().map(parse_instant).transpose()?;
        let delta = match self.delta.as_deref() {
            None => None,
            Some([count, unit]) => {
                let count: i64 = count
                    .parse()
                    .with_context(|| format!("--delta count must be a whole number, got {:?}", count))?;
                Some(Delta::from_parts(count, unit)?)
            }
            Some(other) => bail!("--delta takes a count and a unit, got {:?}", other),
        };
        Ok(WindowRequest { until, since, delta })
    }
}

impl Cli {
    /// Pull options for this invocation, or `None` for `summary`
    ///
    /// Flags after `pull` win over the same flags given before it.
    pub fn pull_args(&self) -> Option<PullArgs> {
        match &self.command {
            None => Some(self.pull.clone()),
            Some(Command::Pull(args)) => Some(args.clone().or(&self.pull)),
            Some(Command::Summary) => None,
        }
    }

    pub fn log_level(&self) -> LevelFilter {
        match self.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            _ => LevelFilter::Debug,
        }
    }
}
