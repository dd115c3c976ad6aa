// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `optoma-bridge` command-line entry point.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use optoma_bridge::bridge::Bridge;
use optoma_bridge::command::CommandTable;
use optoma_bridge::config::{BridgeConfig, Lookups};
use optoma_bridge::protocol::{MqttBus, open_port};
use optoma_bridge::{Error, runtime};

/// Exit status for configuration and startup failures.
const EXIT_STARTUP: u8 = 1;

/// Bridge an Optoma projector's RS-232 port to an MQTT broker.
#[derive(Parser, Debug)]
#[command(name = "optoma-bridge")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Bridge configuration.
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Command table.
    #[arg(long, default_value = "commands.json")]
    commands: PathBuf,

    /// Lookup tables.
    #[arg(long, default_value = "lookups.json")]
    lookups: PathBuf,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let config = match BridgeConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("optoma-bridge: {e}");
            return ExitCode::from(EXIT_STARTUP);
        }
    };
    init_tracing(&config);

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start async runtime");
            return ExitCode::from(EXIT_STARTUP);
        }
    };

    match runtime.block_on(serve(&args, &config)) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            ExitCode::from(EXIT_STARTUP)
        }
    }
}

/// Loads the tables, connects both transports and runs until a fatal
/// condition, whose exit status is returned.
async fn serve(args: &Args, config: &BridgeConfig) -> Result<u8, Error> {
    let commands = CommandTable::load(&args.commands)?;
    let lookups = Lookups::load(&args.lookups)?;
    tracing::debug!(verbs = commands.verb_count(), "Command table loaded");

    let port = open_port(&config.serial_device, config.baud_rate)?;

    let mut builder = MqttBus::from_settings(&config.mqtt)?;
    if let Some(topic) = &config.status_topic {
        builder = builder.last_will(topic, "stop");
    }
    let (bus, events) = builder.build().await?;

    let bridge = Bridge::new(
        config,
        commands,
        lookups,
        tokio::time::Instant::now().into_std(),
    );
    let fatal = runtime::run(bridge, port, &bus, events).await;

    tracing::error!(error = %fatal, exit_code = fatal.exit_code(), "Bridge stopped");
    Ok(fatal.exit_code())
}

/// Installs the fmt subscriber. `RUST_LOG` wins over the config switches.
fn init_tracing(config: &BridgeConfig) {
    let directives = if config.raw_data {
        "warn,optoma_bridge=trace"
    } else if config.debug {
        "warn,optoma_bridge=debug"
    } else if config.verbose {
        "info"
    } else {
        "warn,optoma_bridge=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
