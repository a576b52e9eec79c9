use citytransit_core::{CachePolicy, TransitService};

use super::CommandResult;
use crate::error::CliError;

pub async fn run(service: &TransitService, policy: CachePolicy) -> Result<CommandResult, CliError> {
    let routes = service.fetch_routes(policy).await?;
    let empty = routes.is_empty();

    let result = CommandResult::ok(serde_json::to_value(routes)?);
    if empty {
        return Ok(result.with_warning("no routes available from any source"));
    }
    Ok(result)
}
