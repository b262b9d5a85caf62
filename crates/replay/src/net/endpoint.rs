use std::fmt;

use rand::Rng;

use super::params::ConnectionParams;

pub const DEFAULT_PORT: u16 = 8888;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Splits a configured `host` or `host:port` location.
pub fn parse_location(location: &str) -> Option<(String, Option<u16>)> {
    let location = location.trim();
    if location.is_empty() {
        return None;
    }

    match location.rsplit_once(':') {
        // A bare IPv6 literal has more than one colon; treat it as host only.
        Some((host, _)) if host.contains(':') => Some((location.to_string(), None)),
        Some((host, port)) => match port.parse::<u16>() {
            Ok(port) if !host.is_empty() => Some((host.to_string(), Some(port))),
            _ => {
                log::warn!("Ignoring server location '{}'", location);
                None
            }
        },
        None => Some((location.to_string(), None)),
    }
}

/// Expands configured locations and launch parameters into connection candidates.
///
/// Host: `server_hostname` if valid, else every configured location. Port: the
/// parameter range, else the parameter port, else the location's port, else `default_port`.
pub fn resolve_candidates(
    locations: &[String],
    params: &ConnectionParams,
    default_port: u16,
) -> Vec<Endpoint> {
    let hosts: Vec<(String, Option<u16>)> = match params.server_hostname() {
        Some(hostname) => vec![(hostname.to_string(), None)],
        None => locations
            .iter()
            .filter_map(|location| parse_location(location))
            .collect(),
    };
    let ports = params.ports();

    let mut candidates = Vec::new();
    for (host, own_port) in hosts {
        match ports {
            Some((first, last)) => {
                candidates.extend((first..=last).map(|port| Endpoint::new(host.clone(), port)));
            }
            None => candidates.push(Endpoint::new(host, own_port.unwrap_or(default_port))),
        }
    }

    candidates
}

/// Spreads clients over servers by starting each at a random candidate.
pub fn random_start_index(candidate_count: usize) -> usize {
    if candidate_count <= 1 {
        return 0;
    }
    rand::thread_rng().gen_range(0..candidate_count)
}
