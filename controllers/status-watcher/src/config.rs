//! Startup configuration.
//!
//! Flags with environment fallbacks, read once at startup and immutable
//! afterwards.

use clap::Parser;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Resource watched when none is configured
pub const DEFAULT_RESOURCE: &str = "clusters.v1beta1.cluster.x-k8s.io";

/// Command line / environment configuration
#[derive(Parser, Debug, Clone)]
#[command(name = "object-status-watcher", version, about = "Emits an event when watched objects report Ready")]
pub struct Config {
    /// Absolute path to the kubeconfig file (in-cluster config when unset)
    #[arg(long, env = "KUBECONFIG_PATH")]
    pub kubeconfig: Option<PathBuf>,

    /// Dump verbose output
    #[arg(long, env = "OBJECT_STATUS_WATCHER_DEBUG")]
    pub debug: bool,

    /// Full resync interval (e.g. "3m", "90s", "1h30m"; "0" disables resync)
    #[arg(
        long,
        env = "OBJECT_STATUS_WATCHER_RESYNC_INTERVAL",
        default_value = "3m",
        value_parser = parse_duration
    )]
    pub resync_interval: Duration,

    /// Namespace to list and watch (empty for all namespaces)
    #[arg(long, env = "OBJECT_STATUS_WATCHER_NAMESPACE", default_value = "")]
    pub namespace: String,

    /// Resource to watch, as `resource.version.group`
    #[arg(
        long,
        env = "OBJECT_STATUS_WATCHER_RESOURCE",
        default_value = DEFAULT_RESOURCE,
        value_parser = ResourceSelector::parse
    )]
    pub resource: ResourceSelector,
}

impl Config {
    /// Namespace filter, `None` meaning cluster-wide
    pub fn namespace_filter(&self) -> Option<&str> {
        let ns = self.namespace.trim();
        if ns.is_empty() { None } else { Some(ns) }
    }
}

/// Group/version/resource triple of the watched kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSelector {
    /// API group ("" for the core group)
    pub group: String,
    /// API version; empty when the selector named no version
    pub version: String,
    /// Plural resource name
    pub resource: String,
}

impl ResourceSelector {
    /// Parses `resource.version.group` or `resource.group`.
    ///
    /// Three or more dot-separated parts are read as resource, version and
    /// the remaining group. Two parts are resource and group, with the
    /// version left for discovery to pick. A bare name is a core resource.
    pub fn parse(arg: &str) -> Result<Self, String> {
        let arg = arg.trim();
        if arg.is_empty() {
            return Err("resource must not be empty".to_string());
        }

        let parts: Vec<&str> = arg.splitn(3, '.').collect();
        let selector = match parts.as_slice() {
            [resource] => Self {
                group: String::new(),
                version: String::new(),
                resource: (*resource).to_string(),
            },
            [resource, group] => Self {
                group: (*group).to_string(),
                version: String::new(),
                resource: (*resource).to_string(),
            },
            [resource, version, group] => Self {
                group: (*group).to_string(),
                version: (*version).to_string(),
                resource: (*resource).to_string(),
            },
            _ => return Err(format!("invalid resource {:?}", arg)),
        };

        if selector.resource.is_empty() || parts.iter().any(|p| p.is_empty()) {
            return Err(format!("invalid resource {:?}: empty segment", arg));
        }
        Ok(selector)
    }
}

impl fmt::Display for ResourceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.resource)?;
        if !self.version.is_empty() {
            write!(f, ".{}", self.version)?;
        }
        if !self.group.is_empty() {
            write!(f, ".{}", self.group)?;
        }
        Ok(())
    }
}

/// Parses a duration such as "3m", "1h30m", "1.5s" or "250ms".
///
/// A bare "0" is accepted and means zero.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.is_empty() {
        return Err("empty duration".to_string());
    }

    let mut total_nanos = 0f64;
    let mut rest = s;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_len == 0 {
            return Err(format!("invalid duration {:?}: expected a number", input));
        }
        let value: f64 = rest[..number_len]
            .parse()
            .map_err(|e| format!("invalid duration {:?}: {}", input, e))?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let nanos_per_unit = match &rest[..unit_len] {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            "" => return Err(format!("invalid duration {:?}: missing unit", input)),
            other => return Err(format!("invalid duration {:?}: unknown unit {:?}", input, other)),
        };
        rest = &rest[unit_len..];
        total_nanos += value * nanos_per_unit;
    }

    if !total_nanos.is_finite() || total_nanos >= u64::MAX as f64 {
        return Err(format!("invalid duration {:?}: out of range", input));
    }
    Ok(Duration::from_nanos(total_nanos.round() as u64))
}
