use citytransit_core::{CachePolicy, TransitService};

use super::CommandResult;
use crate::cli::ScheduleArgs;
use crate::error::CliError;

pub async fn run(
    service: &TransitService,
    args: &ScheduleArgs,
    policy: CachePolicy,
) -> Result<CommandResult, CliError> {
    let schedules = service
        .fetch_schedule_for_stop(&args.route_id, &args.stops, policy)
        .await?;
    let empty = schedules.is_empty();

    let result = CommandResult::ok(serde_json::to_value(schedules)?);
    if empty {
        return Ok(result.with_warning("no scheduled departures at the requested stops"));
    }
    Ok(result)
}
