use citytransit_core::{CachePolicy, TransitService};

use super::CommandResult;
use crate::error::CliError;

pub async fn run(service: &TransitService, policy: CachePolicy) -> Result<CommandResult, CliError> {
    let stops = service.fetch_stops(policy).await?;
    let empty = stops.is_empty();

    let result = CommandResult::ok(serde_json::to_value(stops)?);
    if empty {
        return Ok(result.with_warning("no stops available from any source"));
    }
    Ok(result)
}
