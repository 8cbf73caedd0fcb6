//! Locate command - run the master in-process and print location events.

use std::time::Duration;

use clap::ValueEnum;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use geomaster::backend::BackendOptions;
use geomaster::location::{Address, Capability, Position, PositionFields, Resources};
use geomaster::master::{ClientEvent, Requirements};
use geomaster::service::ClientHandle;
use geomaster::AccuracyLevel;

use crate::error::CliError;
use crate::runner::{cancel_on_ctrlc, CliRunner, GlobalOptions};

/// Resource a provider may be allowed to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ResourceArg {
    Network,
    Cell,
    Gps,
}

impl From<ResourceArg> for Resources {
    fn from(arg: ResourceArg) -> Self {
        match arg {
            ResourceArg::Network => Resources::NETWORK,
            ResourceArg::Cell => Resources::CELL,
            ResourceArg::Gps => Resources::GPS,
        }
    }
}

/// How events are written to stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    /// One JSON object per line
    Json,
}

/// Arguments for the locate command.
#[derive(Debug, Clone)]
pub struct LocateArgs {
    pub min_accuracy: AccuracyLevel,
    /// Allowed resources; empty allows all
    pub allow: Vec<ResourceArg>,
    pub require_updates: bool,
    /// Minimum seconds between updates
    pub interval: u64,
    /// Track the address as well as the position
    pub address: bool,
    /// Backend options as key/value pairs
    pub options: Vec<(String, String)>,
    /// Print the first position and exit
    pub once: bool,
    pub format: OutputFormat,
}

impl Default for LocateArgs {
    fn default() -> Self {
        Self {
            min_accuracy: AccuracyLevel::None,
            allow: Vec::new(),
            require_updates: false,
            interval: 0,
            address: false,
            options: Vec::new(),
            once: false,
            format: OutputFormat::Text,
        }
    }
}

impl LocateArgs {
    /// Client requirements described by the flags.
    pub fn requirements(&self) -> Requirements {
        let allowed = if self.allow.is_empty() {
            Resources::all()
        } else {
            self.allow
                .iter()
                .fold(Resources::empty(), |acc, r| acc | Resources::from(*r))
        };

        Requirements::default()
            .with_min_accuracy(self.min_accuracy)
            .with_min_update_interval(Duration::from_secs(self.interval))
            .with_require_updates(self.require_updates)
            .with_allowed_resources(allowed)
    }
}

/// Parse a `KEY=VALUE` backend option.
pub fn parse_option(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{}'", s)),
    }
}

/// Run the locate command.
pub fn run(options: &GlobalOptions, args: LocateArgs) -> Result<(), CliError> {
    let runner = CliRunner::new(options)?;
    runner.log_startup("locate");
    let runtime = runner.runtime()?;

    let shutdown = CancellationToken::new();
    cancel_on_ctrlc(&shutdown)?;

    runtime.block_on(locate(&runner, &args, &shutdown))
}

async fn locate(
    runner: &CliRunner,
    args: &LocateArgs,
    shutdown: &CancellationToken,
) -> Result<(), CliError> {
    let (handle, task) = runner.start_service(shutdown).await?;
    let mut client = handle.create_client().await?;

    client.set_requirements(args.requirements()).await?;
    client.position_start().await?;
    if args.address {
        client.address_start().await?;
    }
    if !args.options.is_empty() {
        let options: BackendOptions = args.options.iter().cloned().collect();
        client.set_options(options).await?;
    }

    let result = watch(&mut client, args, shutdown).await;

    drop(client);
    drop(handle);
    shutdown.cancel();
    if let Err(e) = task.await {
        warn!(error = %e, "Master service task failed");
    }
    result
}

async fn watch(
    client: &mut ClientHandle,
    args: &LocateArgs,
    shutdown: &CancellationToken,
) -> Result<(), CliError> {
    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            event = client.next_event() => event,
        };
        let Some(event) = event else {
            return Ok(());
        };

        println!("{}", format_event(&event, args.format)?);

        match event {
            ClientEvent::Invalidated => return Ok(()),
            ClientEvent::ProviderChanged {
                capability: Capability::Position,
                provider: Some(_),
            } if args.once => {
                let position = client.position().await?;
                println!(
                    "{}",
                    format_event(&ClientEvent::PositionChanged(position), args.format)?
                );
                return Ok(());
            }
            _ => {}
        }
    }
}

/// Render one event as a single output line.
pub fn format_event(event: &ClientEvent, format: OutputFormat) -> Result<String, CliError> {
    if format == OutputFormat::Json {
        let value = match event {
            ClientEvent::ProviderChanged {
                capability,
                provider,
            } => json!({ "event": "provider", "capability": capability, "provider": provider }),
            ClientEvent::PositionChanged(position) => {
                json!({ "event": "position", "position": position })
            }
            ClientEvent::AddressChanged(address) => {
                json!({ "event": "address", "address": address })
            }
            ClientEvent::Invalidated => json!({ "event": "invalidated" }),
        };
        return serde_json::to_string(&value).map_err(CliError::Output);
    }

    Ok(match event {
        ClientEvent::ProviderChanged {
            capability,
            provider: Some(details),
        } => format!(
            "{} provider: {} ({})",
            capability, details.name, details.description
        ),
        ClientEvent::ProviderChanged {
            capability,
            provider: None,
        } => format!("{} provider: none", capability),
        ClientEvent::PositionChanged(position) => format_position(position),
        ClientEvent::AddressChanged(address) => format_address(address),
        ClientEvent::Invalidated => "master shut down".to_string(),
    })
}

fn format_position(position: &Position) -> String {
    let mut out = format!(
        "position: {:.6}, {:.6}",
        position.latitude, position.longitude
    );
    if position.fields.contains(PositionFields::ALTITUDE) {
        out.push_str(&format!(", {:.1} m", position.altitude));
    }
    out.push_str(&format!(
        " [{}] at {}",
        position.accuracy,
        position.timestamp.to_rfc3339()
    ));
    out
}

fn format_address(address: &Address) -> String {
    let details: Vec<String> = address
        .details
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect();
    format!("address: {} [{}]", details.join(", "), address.accuracy)
}
