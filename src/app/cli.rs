use clap::Parser;
use std::path::PathBuf;

/// Tame - turns the system volume down when audio gets too loud 🔉
#[derive(Parser, Debug)]
#[command(name = "tame", version, about)]
pub struct Args {
    /// Settings file (default: <config dir>/tame/settings.toml)
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Start paused (pass-through) for this run only; the saved state is kept
    #[arg(long)]
    pub disabled: bool,

    /// Apply the recommended attack/release/dampening preset, keeping the cap
    #[arg(long)]
    pub reset_advanced: bool,

    /// Run against a simulated device whose source sits at this level (0-1)
    #[arg(long, value_name = "LEVEL")]
    pub simulate: Option<f32>,

    /// Sink to control (default: the system default sink)
    #[arg(long)]
    pub sink: Option<String>,

    /// Also log to a daily file in the config directory
    #[arg(long)]
    pub log_file: bool,

    /// More output (-v debug, -vv trace)
    #[arg(long, short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Generate default settings.toml to stdout
    #[arg(long)]
    pub generate_config: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flags() {
        let args = Args::parse_from(["tame", "-vv", "--disabled", "--simulate", "0.8"]);
        assert_eq!(args.verbose, 2);
        assert!(args.disabled);
        assert_eq!(args.simulate, Some(0.8));
        assert!(args.config.is_none());
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }
}
