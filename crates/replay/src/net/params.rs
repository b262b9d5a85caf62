use std::collections::BTreeMap;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

pub const SERVER_HOSTNAME: &str = "server_hostname";
pub const SERVER_PORT: &str = "server_port";
pub const SERVER_PORT_RANGE: &str = "server_port_range";

/// Key/value pairs from the launch URL query string.
///
/// All pairs are forwarded verbatim to the server in the handshake; the `server_*` keys
/// additionally steer endpoint resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionParams(BTreeMap<String, String>);

impl ConnectionParams {
    /// Parses `http://host/path?key=value&...`. Anything but exactly one `?` yields no params.
    pub fn from_url(url: &str) -> Self {
        let mut params = BTreeMap::<String, String>::new();

        let parts: Vec<&str> = url.split('?').collect();
        let [_, query] = parts.as_slice() else {
            return Self(params);
        };

        for pair in query.split('&') {
            let Some((key, value)) = pair.split_once('=') else {
                continue;
            };
            let key = percent_decode(key);
            if key.is_empty() {
                continue;
            }
            let value = percent_decode(value);

            params
                .entry(key)
                .and_modify(|existing| {
                    existing.push(',');
                    existing.push_str(&value);
                })
                .or_insert(value);
        }

        Self(params)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn server_hostname(&self) -> Option<&str> {
        let hostname = self.get(SERVER_HOSTNAME)?;
        if is_valid_hostname(hostname) {
            Some(hostname)
        } else {
            log::error!("Invalid {}: '{}'", SERVER_HOSTNAME, hostname);
            None
        }
    }

    pub fn server_port(&self) -> Option<u16> {
        let port = self.get(SERVER_PORT)?;
        match port.trim().parse::<u16>() {
            Ok(port) => Some(port),
            Err(_) => {
                log::error!("Invalid {}: '{}'", SERVER_PORT, port);
                None
            }
        }
    }

    /// `"A-B"`, returned in increasing order.
    pub fn server_port_range(&self) -> Option<(u16, u16)> {
        let range = self.get(SERVER_PORT_RANGE)?;
        let parsed = range.split_once('-').and_then(|(a, b)| {
            Some((a.trim().parse::<u16>().ok()?, b.trim().parse::<u16>().ok()?))
        });
        match parsed {
            Some((a, b)) => Some((a.min(b), a.max(b))),
            None => {
                log::error!("Invalid {}: '{}'", SERVER_PORT_RANGE, range);
                None
            }
        }
    }

    /// Effective port range: the explicit range wins over a single port.
    pub fn ports(&self) -> Option<(u16, u16)> {
        self.server_port_range()
            .or_else(|| self.server_port().map(|port| (port, port)))
    }
}

impl FromIterator<(String, String)> for ConnectionParams {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// IP literal or DNS name. Ports, brackets and other URL syntax are rejected.
pub fn is_valid_hostname(hostname: &str) -> bool {
    if hostname.parse::<IpAddr>().is_ok() {
        return true;
    }
    if hostname.is_empty() || hostname.len() > 255 {
        return false;
    }

    hostname.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    })
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' if i + 2 < bytes.len() => {
                match (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                    (Some(hi), Some(lo)) => {
                        out.push(hi << 4 | lo);
                        i += 2;
                    }
                    _ => out.push(b'%'),
                }
            }
            b => out.push(b),
        }
        i += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}
