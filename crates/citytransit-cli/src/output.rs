use serde_json::Value;

use crate::cli::OutputFormat;
use crate::commands::CommandResult;
use crate::error::CliError;

pub fn render(result: &CommandResult, format: OutputFormat, pretty: bool) -> Result<(), CliError> {
    for warning in &result.warnings {
        eprintln!("warning: {warning}");
    }

    match format {
        OutputFormat::Json => {
            let payload = if pretty {
                serde_json::to_string_pretty(&result.data)?
            } else {
                serde_json::to_string(&result.data)?
            };
            println!("{payload}");
        }
        OutputFormat::Table => render_table(&result.data),
    }

    Ok(())
}

/// Compact listing for terminal use: one line per element, showing the
/// identifying fields transit entities share.
fn render_table(data: &Value) {
    let rows = match data {
        Value::Array(rows) => rows.as_slice(),
        other => std::slice::from_ref(other),
    };

    for row in rows {
        let id = field(row, &["id", "stopId", "patternSuffix"]);
        let name = field(row, &["shortName", "name", "headsign"]);
        let detail = field(row, &["longName", "_sourceId"]);
        println!("{id:<12} {name:<24} {detail}");
    }
}

fn field<'a>(row: &'a Value, keys: &[&str]) -> &'a str {
    keys.iter()
        .find_map(|key| row.get(key).and_then(Value::as_str))
        .unwrap_or("-")
}
