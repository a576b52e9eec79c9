use citytransit_core::{CachePolicy, TransitService};

use super::CommandResult;
use crate::cli::DeparturesArgs;
use crate::error::CliError;

pub async fn run(
    service: &TransitService,
    args: &DeparturesArgs,
    policy: CachePolicy,
) -> Result<CommandResult, CliError> {
    let arrivals = service.fetch_arrival_times(&args.stop_id, policy).await?;
    Ok(CommandResult::ok(arrivals))
}
