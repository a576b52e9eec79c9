mod departures;
mod route;
mod routes;
mod schedule;
mod stops;

use citytransit_core::TransitService;
use serde_json::Value;

use crate::cli::{Cli, Command};
use crate::error::CliError;

pub struct CommandResult {
    pub data: Value,
    pub warnings: Vec<String>,
}

impl CommandResult {
    pub fn ok(data: Value) -> Self {
        Self {
            data,
            warnings: Vec::new(),
        }
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }
}

pub async fn run(cli: &Cli) -> Result<CommandResult, CliError> {
    let mut builder = TransitService::builder().with_locale(cli.locale.clone());
    if let Some(dir) = &cli.snapshots {
        builder = builder.with_snapshot_dir(dir);
    }
    let service = builder.build();
    if cli.offline {
        service.set_offline(true);
    }
    let policy = cli.policy();

    match &cli.command {
        Command::Routes => routes::run(&service, policy).await,
        Command::Stops => stops::run(&service, policy).await,
        Command::Route(args) => route::run(&service, args, policy).await,
        Command::Departures(args) => departures::run(&service, args, policy).await,
        Command::Schedule(args) => schedule::run(&service, args, policy).await,
    }
}
