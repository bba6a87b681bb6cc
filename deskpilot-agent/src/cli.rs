//! Command-line interface.

use std::path::PathBuf;

use clap::Parser;

use crate::config::AgentConfig;
use crate::session::Mode;

#[derive(Parser, Debug)]
#[command(
    name = "deskpilot",
    version,
    about = "Drive the Windows desktop from a vision-language model"
)]
pub struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "deskpilot.toml")]
    pub config: PathBuf,

    /// Wait for Enter before every iteration.
    #[arg(long)]
    pub step: bool,

    /// Model identifier sent to the decision service.
    #[arg(long)]
    pub model: Option<String>,

    /// Chat-completions endpoint URL.
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Do not archive screenshots.
    #[arg(long)]
    pub no_dump: bool,

    /// Write the default configuration to the config path and exit.
    #[arg(long)]
    pub gen_config: bool,
}

impl Cli {
    pub fn mode(&self) -> Mode {
        if self.step { Mode::Step } else { Mode::Autonomous }
    }

    /// Command-line flags take precedence over the config file.
    pub fn apply_overrides(&self, config: &mut AgentConfig) {
        if let Some(model) = &self.model {
            config.decision.model = model.clone();
        }
        if let Some(endpoint) = &self.endpoint {
            config.decision.endpoint = endpoint.clone();
        }
        if self.no_dump {
            config.dump.enabled = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cli = Cli::parse_from(["deskpilot"]);
        assert_eq!(cli.config, PathBuf::from("deskpilot.toml"));
        assert_eq!(cli.mode(), Mode::Autonomous);

        let mut config = AgentConfig::default();
        cli.apply_overrides(&mut config);
        assert_eq!(config, AgentConfig::default());
    }

    #[test]
    fn overrides_apply() {
        let cli = Cli::parse_from([
            "deskpilot",
            "--step",
            "--model",
            "llava-7b",
            "--endpoint",
            "http://10.0.0.2:8080/v1/chat/completions",
            "--no-dump",
            "-c",
            "other.toml",
        ]);
        assert_eq!(cli.mode(), Mode::Step);
        assert_eq!(cli.config, PathBuf::from("other.toml"));

        let mut config = AgentConfig::default();
        cli.apply_overrides(&mut config);
        assert_eq!(config.decision.model, "llava-7b");
        assert_eq!(config.decision.endpoint, "http://10.0.0.2:8080/v1/chat/completions");
        assert!(!config.dump.enabled);
        assert_eq!(config.decision.timeout_secs, 120);
    }
}
