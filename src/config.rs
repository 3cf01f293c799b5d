use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{Field, SimulationParameters};
use crate::state::PushStatusRule;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

#[derive(Parser, Debug)]
#[command(name = "ticket-sim", about = "Drive a remote ticket-sale simulation")]
pub struct Args {
    #[arg(long, global = true, help = "TOML or JSON file with client settings and default parameters")]
    pub config: Option<PathBuf>,
    #[arg(long, global = true)]
    pub base_url: Option<String>,
    #[arg(long, global = true, value_enum, default_value_t = FormatArg::Human)]
    pub format: FormatArg,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(about = "Submit parameters and start a run")]
    Start {
        #[command(flatten)]
        parameters: ParameterArgs,
        #[arg(long, help = "Follow live updates after the run starts")]
        watch: bool,
        #[arg(long)]
        keep_running: bool,
        #[arg(
            long,
            requires = "watch",
            help = "Stop the run once an update reports no tickets remaining"
        )]
        stop_when_sold_out: bool,
    },
    #[command(about = "Stop the current run and print the final snapshot")]
    Stop,
    #[command(about = "Print the current details snapshot")]
    Fetch,
    #[command(about = "Follow live updates")]
    Watch {
        #[arg(long)]
        keep_running: bool,
    },
    #[command(about = "Interactive session reading commands from stdin")]
    Console {
        #[command(flatten)]
        parameters: ParameterArgs,
        #[arg(long)]
        keep_running: bool,
    },
    #[command(about = "Print the resolved parameters and endpoint")]
    ShowConfig {
        #[command(flatten)]
        parameters: ParameterArgs,
    },
}

// Values stay strings so they go through form validation.
#[derive(ClapArgs, Debug, Default, Clone)]
pub struct ParameterArgs {
    #[arg(long, allow_hyphen_values = true)]
    pub total_tickets: Option<String>,
    #[arg(long, allow_hyphen_values = true)]
    pub ticket_release_rate: Option<String>,
    #[arg(long, allow_hyphen_values = true)]
    pub customer_retrieval_rate: Option<String>,
    #[arg(long, allow_hyphen_values = true)]
    pub max_ticket_capacity: Option<String>,
    #[arg(long, allow_hyphen_values = true)]
    pub num_vendors: Option<String>,
    #[arg(long, allow_hyphen_values = true)]
    pub num_customers: Option<String>,
}

impl ParameterArgs {
    pub fn edits(&self) -> Vec<(Field, &str)> {
        let values = [
            (Field::TotalTickets, &self.total_tickets),
            (Field::TicketReleaseRate, &self.ticket_release_rate),
            (Field::CustomerRetrievalRate, &self.customer_retrieval_rate),
            (Field::MaxTicketCapacity, &self.max_ticket_capacity),
            (Field::NumVendors, &self.num_vendors),
            (Field::NumCustomers, &self.num_customers),
        ];
        values
            .into_iter()
            .filter_map(|(field, value)| value.as_deref().map(|value| (field, value)))
            .collect()
    }
}

#[derive(ValueEnum, Clone, Debug, PartialEq, Eq)]
pub enum FormatArg {
    Human,
    Json,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct FileConfig {
    pub base_url: Option<String>,
    pub timeout_ms: Option<u64>,
    pub keep_running_on_push: Option<bool>,
    pub parameters: Option<SimulationParameters>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ClientConfig {
    pub base_url: String,
    // start/stop/fetch only; the push stream is never timed out.
    pub timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: None,
        }
    }
}

impl ClientConfig {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[derive(Clone, Debug)]
pub struct Settings {
    pub client: ClientConfig,
    pub parameters: SimulationParameters,
    pub push_rule: PushStatusRule,
}

pub fn parse_args() -> Result<Args> {
    Args::try_parse().map_err(|e| Error::Cli(e.to_string()))
}

pub fn load_config(path: &Path) -> Result<FileConfig> {
    let contents = fs::read_to_string(path).map_err(|err| {
        Error::ConfigIo(format!(
            "failed to read config '{}': {}",
            path.display(),
            err
        ))
    })?;
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .unwrap_or("");

    match ext {
        "toml" => toml::from_str(&contents)
            .map_err(|err| Error::ConfigParse(format!("failed to parse TOML: {}", err))),
        "json" => serde_json::from_str(&contents)
            .map_err(|err| Error::ConfigParse(format!("failed to parse JSON: {}", err))),
        "" => Err(Error::UnsupportedConfigFormat("unknown".to_string())),
        _ => Err(Error::UnsupportedConfigFormat(ext.to_string())),
    }
}

pub fn build_settings(args: &Args, keep_running: bool) -> Result<Settings> {
    let file = match &args.config {
        Some(path) => load_config(path)?,
        None => FileConfig::default(),
    };

    let mut client = ClientConfig::default();
    if let Some(base_url) = args.base_url.clone().or(file.base_url) {
        client = client.with_base_url(base_url);
    }
    if let Some(timeout_ms) = file.timeout_ms {
        client = client.with_timeout(Duration::from_millis(timeout_ms));
    }

    let push_rule = if keep_running || file.keep_running_on_push.unwrap_or(false) {
        PushStatusRule::KeepRunning
    } else {
        PushStatusRule::MarkStopped
    };

    Ok(Settings {
        client,
        parameters: file.parameters.unwrap_or_default(),
        push_rule,
    })
}
