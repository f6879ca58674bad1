use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Subcommand};
use rnsnow_transport::{validate_channel, UdpRadio};

use crate::app::AppConfig;
use crate::exit::{transport_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod config;
pub mod discover;
pub mod ping;
pub mod run;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Bridge the serial link to the radio until interrupted.
    Run(RunArgs),
    /// Find the channel peers are on and print the result.
    Discover(DiscoverArgs),
    /// Broadcast liveness pings.
    Ping(PingArgs),
    /// Print the effective configuration.
    Config(ConfigArgs),
    /// Show version information.
    Version(VersionArgs),
}

/// Everything a command needs besides its own arguments.
pub struct Context {
    pub config: AppConfig,
    pub config_path: Option<PathBuf>,
    pub format: OutputFormat,
}

pub fn run(command: Command, ctx: Context) -> CliResult<i32> {
    match command {
        Command::Run(args) => run::run(args, ctx),
        Command::Discover(args) => discover::run(args, ctx),
        Command::Ping(args) => ping::run(args, ctx),
        Command::Config(args) => config::run(args, ctx),
        Command::Version(args) => version::run(args),
    }
}

/// Radio overrides shared by the commands that open the radio.
#[derive(Args, Debug, Default)]
pub struct RadioArgs {
    /// Local UDP endpoint for the radio.
    #[arg(long, value_name = "ADDR")]
    pub bind: Option<SocketAddr>,
    /// Peer endpoint to broadcast to (repeatable).
    #[arg(long = "peer", value_name = "ADDR")]
    pub peers: Vec<SocketAddr>,
    /// Operating channel (1-14).
    #[arg(long, short = 'c')]
    pub channel: Option<u8>,
}

impl RadioArgs {
    pub fn apply(&self, config: &mut AppConfig) -> CliResult<()> {
        if let Some(bind) = self.bind {
            config.radio.bind = bind;
        }
        for peer in &self.peers {
            if !config.radio.peers.contains(peer) {
                config.radio.peers.push(*peer);
            }
        }
        if let Some(channel) = self.channel {
            validate_channel(channel)
                .map_err(|err| CliError::new(USAGE, format!("--channel: {err}")))?;
            config.link.channel = channel;
        }
        Ok(())
    }
}

pub fn open_radio(config: &AppConfig) -> CliResult<UdpRadio> {
    UdpRadio::bind(
        config.radio.bind,
        config.radio.peers.clone(),
        config.link.channel,
    )
    .map_err(|err| transport_error("radio bind failed", err))
}

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub radio: RadioArgs,
    /// Serial device. Stdin/stdout when omitted.
    #[arg(long, value_name = "PATH")]
    pub serial: Option<String>,
    /// Serial baud rate.
    #[arg(long)]
    pub baud: Option<u32>,
    /// Skip channel discovery at startup.
    #[arg(long)]
    pub no_discovery: bool,
    /// Maintenance interval in milliseconds.
    #[arg(long, default_value = "20", value_parser = clap::value_parser!(u64).range(1..))]
    pub tick_ms: u64,
}

#[derive(Args, Debug)]
pub struct DiscoverArgs {
    #[command(flatten)]
    pub radio: RadioArgs,
    /// Listen window per probe in milliseconds.
    #[arg(long)]
    pub listen_ms: Option<u64>,
    /// Full scans before falling back to the default channel.
    #[arg(long)]
    pub attempts: Option<u32>,
    /// Probe rounds per channel.
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub probes: Option<u32>,
}

#[derive(Args, Debug)]
pub struct PingArgs {
    #[command(flatten)]
    pub radio: RadioArgs,
    /// Pings to send.
    #[arg(long, default_value = "1", value_parser = clap::value_parser!(u32).range(1..))]
    pub count: u32,
    /// Delay between pings in milliseconds.
    #[arg(long, default_value = "1000")]
    pub interval_ms: u64,
}

#[derive(Args, Debug, Default)]
pub struct ConfigArgs {
    /// Check the configuration and print nothing.
    #[arg(long)]
    pub check: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn radio_args_override_config() {
        let mut config = AppConfig::default();
        config.radio.peers.push("127.0.0.1:5001".parse().unwrap());
        let args = RadioArgs {
            bind: Some("127.0.0.1:5000".parse().unwrap()),
            peers: vec![
                "127.0.0.1:5001".parse().unwrap(),
                "127.0.0.1:5002".parse().unwrap(),
            ],
            channel: Some(11),
        };
        args.apply(&mut config).unwrap();

        assert_eq!(config.radio.bind.port(), 5000);
        assert_eq!(config.radio.peers.len(), 2);
        assert_eq!(config.link.channel, 11);
    }

    #[test]
    fn rejects_channel_out_of_range() {
        let args = RadioArgs {
            channel: Some(15),
            ..RadioArgs::default()
        };
        let err = args.apply(&mut AppConfig::default()).unwrap_err();
        assert_eq!(err.code, USAGE);
    }
}
