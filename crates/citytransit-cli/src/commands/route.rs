use citytransit_core::{CachePolicy, TransitService};
use serde_json::{json, Map, Value};

use super::CommandResult;
use crate::cli::RouteArgs;
use crate::error::CliError;

pub async fn run(
    service: &TransitService,
    args: &RouteArgs,
    policy: CachePolicy,
) -> Result<CommandResult, CliError> {
    let route = service.fetch_route_details(&args.id, policy).await?;
    let suffixes: Vec<String> = route
        .patterns
        .iter()
        .map(|pattern| pattern.suffix.clone())
        .collect();

    let mut warnings = Vec::new();
    let mut data = json!({ "route": serde_json::to_value(&route)? });

    if args.stops {
        let mut per_pattern = Map::new();
        for suffix in &suffixes {
            match service.fetch_route_stops(&args.id, suffix, policy).await {
                Ok(stops) => {
                    per_pattern.insert(suffix.clone(), serde_json::to_value(stops)?);
                }
                Err(error) => warnings.push(format!("stops for pattern '{suffix}': {error}")),
            }
        }
        data["stops"] = Value::Object(per_pattern);
    }

    if args.polyline {
        match service
            .fetch_route_polyline(&args.id, &suffixes, policy)
            .await
        {
            Ok(polylines) => data["polylines"] = serde_json::to_value(polylines)?,
            Err(error) => warnings.push(format!("polylines: {error}")),
        }
    }

    let mut result = CommandResult::ok(data);
    result.warnings = warnings;
    Ok(result)
}
