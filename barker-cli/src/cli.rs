use std::path::PathBuf;
use std::time::Duration;

use barker::{BarkerConfig, MaxCycles};
use clap::{Parser, Subcommand, crate_version};

use crate::log::{Level, LogOptions, Redirect};

#[derive(Parser, Debug)]
#[command(
    name = "barker",
    color = clap::ColorChoice::Auto,
    version = crate_version!(),
    about = "Live view of what a concurrent program is still busy with"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global_options: GlobalOptions,
}

#[derive(Clone, Debug, Parser)]
pub struct GlobalOptions {
    #[arg(
        long,
        global = true,
        help = "Log level.",
        default_value_t,
        value_enum
    )]
    pub log_level: Level,

    #[arg(
        long,
        global = true,
        env = "BARKER_LOG_FILE",
        help = "Append logs to this file instead of stderr."
    )]
    pub log_file: Option<PathBuf>,

    #[arg(long, global = true, help = "Disable colored log output.")]
    pub no_color: bool,

    #[arg(
        long = "redirect",
        global = true,
        value_name = "LEVEL=PATH",
        help = "Append logs of one level to their own file. Can be repeated."
    )]
    pub redirects: Vec<Redirect>,

    #[arg(
        long,
        global = true,
        value_enum,
        value_name = "LEVEL",
        help = "Drop logs of this level, including redirected ones. Can be repeated."
    )]
    pub suppress: Vec<Level>,

    #[arg(
        long,
        global = true,
        env = "BARKER_CONFIG",
        help = "YAML file with intervals and channel capacities."
    )]
    pub config: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        value_parser = humantime::parse_duration,
        help = "How often to print the activity tree, e.g. 10s."
    )]
    pub render_interval: Option<Duration>,

    #[arg(
        long,
        global = true,
        value_parser = humantime::parse_duration,
        help = "How often beacons report that they are still running."
    )]
    pub heartbeat_interval: Option<Duration>,

    #[arg(
        long,
        global = true,
        value_parser = humantime::parse_duration,
        help = "How often to log while waiting for running jobs."
    )]
    pub poll_interval: Option<Duration>,

    #[arg(
        long,
        global = true,
        allow_negative_numbers = true,
        help = "Stop logging the wait after this many polls (-1 for never)."
    )]
    pub max_poll_cycles: Option<i64>,
}

impl GlobalOptions {
    /// Colors are used unless disabled by flag or a non-empty `NO_COLOR`
    pub fn color(&self) -> bool {
        let no_color_env = std::env::var_os("NO_COLOR").is_some_and(|value| !value.is_empty());
        !self.no_color && !no_color_env
    }

    pub fn log_options(&self) -> LogOptions {
        LogOptions {
            level: self.log_level,
            log_file: self.log_file.clone(),
            color: self.color(),
            redirects: self.redirects.clone(),
            suppress: self.suppress.clone(),
        }
    }

    /// Load the config file (if any) and apply command line overrides on top
    pub fn resolve_config(&self) -> Result<BarkerConfig, barker::ConfigError> {
        let mut config = match &self.config {
            Some(path) => BarkerConfig::load(path)?,
            None => BarkerConfig::default(),
        };

        if let Some(interval) = self.render_interval {
            config.render_interval = interval;
        }
        if let Some(interval) = self.heartbeat_interval {
            config.heartbeat_interval = interval;
        }
        if let Some(interval) = self.poll_interval {
            config.poll_interval = interval;
        }
        if let Some(max) = self.max_poll_cycles {
            config.max_poll_cycles = MaxCycles::from(max);
        }

        config.validate()?;
        Ok(config)
    }
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    #[command(about = "Run simulated jobs and print the activity tree while they run.")]
    Demo {
        #[arg(long, default_value_t = 4, help = "Number of concurrent jobs.")]
        jobs: u32,

        #[arg(
            long,
            default_value = "2m",
            value_parser = humantime::parse_duration,
            help = "How long the slowest job runs."
        )]
        duration: Duration,

        #[arg(long, help = "Make this job number fail instead of finishing.")]
        fail_job: Option<u32>,
    },

    #[command(about = "Print the effective configuration as YAML.")]
    Config,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_cli_is_well_formed() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_demo() {
        let cli = Cli::try_parse_from([
            "barker",
            "demo",
            "--jobs",
            "3",
            "--duration",
            "30s",
            "--render-interval",
            "5s",
            "--max-poll-cycles",
            "-1",
        ])
        .unwrap();

        match cli.command {
            Commands::Demo {
                jobs,
                duration,
                fail_job,
            } => {
                assert_eq!(jobs, 3);
                assert_eq!(duration, Duration::from_secs(30));
                assert_eq!(fail_job, None);
            }
            Commands::Config => panic!("expected demo"),
        }
        assert_eq!(
            cli.global_options.render_interval,
            Some(Duration::from_secs(5))
        );
        assert_eq!(cli.global_options.max_poll_cycles, Some(-1));
    }

    #[test]
    fn test_overrides_apply_on_top_of_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "render_interval: 1m\npoll_interval: 3s").unwrap();

        let cli = Cli::try_parse_from([
            "barker",
            "--config",
            file.path().to_str().unwrap(),
            "--render-interval",
            "5s",
            "--max-poll-cycles",
            "2",
            "config",
        ])
        .unwrap();

        let config = cli.global_options.resolve_config().unwrap();
        assert_eq!(config.render_interval, Duration::from_secs(5));
        assert_eq!(config.poll_interval, Duration::from_secs(3));
        assert_eq!(config.max_poll_cycles, MaxCycles::Limit(2));
    }

    #[test]
    fn test_rejects_zero_override() {
        let cli = Cli::try_parse_from(["barker", "--render-interval", "0s", "config"]).unwrap();
        assert!(cli.global_options.resolve_config().is_err());
    }

    #[test]
    fn test_parse_log_routing() {
        let cli = Cli::try_parse_from([
            "barker",
            "--redirect",
            "warn=/tmp/warn.log",
            "--redirect",
            "error=/tmp/error.log",
            "--suppress",
            "debug",
            "--log-level",
            "debug",
            "config",
        ])
        .unwrap();

        let options = cli.global_options.log_options();
        assert_eq!(options.level, Level::Debug);
        assert_eq!(options.suppress, vec![Level::Debug]);
        assert_eq!(
            options.redirects,
            vec![
                Redirect {
                    level: tracing::Level::WARN,
                    path: PathBuf::from("/tmp/warn.log"),
                },
                Redirect {
                    level: tracing::Level::ERROR,
                    path: PathBuf::from("/tmp/error.log"),
                },
            ]
        );

        assert!(Cli::try_parse_from(["barker", "--redirect", "warn", "config"]).is_err());
    }
}
