//! Command-line argument parsing for the domino client.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Domino client command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "domino-client", about = "Headless domino table client")]
pub struct CliArgs {
    /// Room WebSocket endpoint.
    #[arg(long)]
    pub server: Option<String>,

    /// Session token issued by the lobby API.
    #[arg(long)]
    pub token: Option<String>,

    /// Local player id, as assigned by the room API.
    #[arg(long)]
    pub player: Option<String>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Pick moves automatically.
    #[arg(long)]
    pub autoplay: bool,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(ref url) = args.server {
            self.network.server_url = url.clone();
        }
        if let Some(ref token) = args.token {
            self.network.auth_token = token.clone();
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
        if args.autoplay {
            self.game.autoplay = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_override() {
        let mut config = Config::default();
        let args = CliArgs {
            server: Some("ws://10.0.0.2:9000/ws".to_string()),
            autoplay: true,
            ..Default::default()
        };
        config.apply_cli_overrides(&args);
        assert_eq!(config.network.server_url, "ws://10.0.0.2:9000/ws");
        assert!(config.game.autoplay);
        // Non-overridden fields retain defaults
        assert_eq!(config.debug.log_level, "info");
        assert!(config.network.auth_token.is_empty());
    }

    #[test]
    fn test_cli_no_override() {
        let original = Config::default();
        let mut config = Config::default();
        config.apply_cli_overrides(&CliArgs::default());
        assert_eq!(config, original);
    }

    #[test]
    fn test_cli_parses_flags() {
        let args = CliArgs::parse_from([
            "domino-client",
            "--player",
            "p2",
            "--token",
            "secret",
            "--autoplay",
        ]);
        assert_eq!(args.player.as_deref(), Some("p2"));
        assert_eq!(args.token.as_deref(), Some("secret"));
        assert!(args.autoplay);
        assert!(args.server.is_none());
    }
}
