//! CLI argument definitions for citytransit.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `routes` | List all routes across all city networks |
//! | `stops` | List all stops, merged across networks |
//! | `route` | Show one route's details and patterns |
//! | `departures` | Live arrival times at a stop |
//! | `schedule` | Scheduled departures of a route at given stops |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--format` | `json` | Output format (json, table) |
//! | `--pretty` | `false` | Pretty-print JSON output |
//! | `--offline` | `false` | Serve from cache and snapshots only |
//! | `--refresh` | `false` | Skip the cache, force revalidation |
//! | `--snapshots` | none | Directory of bundled snapshot files |
//! | `--locale` | `en` | Locale for localized names |

use std::path::PathBuf;

use citytransit_core::CachePolicy;
use clap::{Args, Parser, Subcommand, ValueEnum};

/// Multi-city transit data CLI.
///
/// Fetches routes, stops, schedules, and live data from every registered
/// city network through one merged namespace, with tiered caching and
/// bundled snapshot fallbacks.
#[derive(Debug, Parser)]
#[command(
    name = "citytransit",
    author,
    version,
    about = "Multi-city transit data CLI"
)]
pub struct Cli {
    /// Output format for results.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Serve from the cache and bundled snapshots only; never touch the
    /// network.
    #[arg(long, global = true, default_value_t = false)]
    pub offline: bool,

    /// Skip the cache read and force a network revalidation.
    #[arg(long, global = true, default_value_t = false, conflicts_with = "offline")]
    pub refresh: bool,

    /// Directory of bundled snapshot files.
    #[arg(long, global = true)]
    pub snapshots: Option<PathBuf>,

    /// Locale for localized route and stop names.
    #[arg(long, global = true, default_value = "en")]
    pub locale: String,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn policy(&self) -> CachePolicy {
        if self.offline {
            CachePolicy::CacheOnly
        } else if self.refresh {
            CachePolicy::NetworkOnly
        } else {
            CachePolicy::Default
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List all routes across all city networks.
    Routes,
    /// List all stops, merged across networks by exact coordinates.
    Stops,
    /// Show one route's details with its patterns.
    Route(RouteArgs),
    /// Live arrival times at a stop.
    Departures(DeparturesArgs),
    /// Scheduled departures of a route at specific stops.
    Schedule(ScheduleArgs),
}

#[derive(Debug, Args)]
pub struct RouteArgs {
    /// App-space route id (e.g. "R1" or "h:204").
    pub id: String,

    /// Also fetch the stop sequence of each pattern.
    #[arg(long, default_value_t = false)]
    pub stops: bool,

    /// Also fetch each pattern's polyline.
    #[arg(long, default_value_t = false)]
    pub polyline: bool,
}

#[derive(Debug, Args)]
pub struct DeparturesArgs {
    /// App-space stop id.
    pub stop_id: String,
}

#[derive(Debug, Args)]
pub struct ScheduleArgs {
    /// App-space route id.
    pub route_id: String,

    /// App-space stop id to include; repeatable.
    #[arg(long = "stop", required = true)]
    pub stops: Vec<String>,
}
