//! Counter key generation.

use std::borrow::Cow;

/// Namespace prefix used when none is configured.
pub const DEFAULT_NAMESPACE: &str = "limiter";

/// Identifies one counter: a route, a caller, a tier duration and the end
/// of the window being counted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CounterKey {
    /// Matched route pattern, e.g. `/events/hourly`
    pub route: String,
    /// Caller network address
    pub identity: String,
    /// Tier window duration in seconds
    pub duration_secs: u64,
    /// Epoch second at which the window ends
    pub window_end: u64,
}

impl CounterKey {
    pub fn new(route: &str, identity: &str, duration_secs: u64, window_end: u64) -> Self {
        Self {
            route: route.to_string(),
            identity: identity.to_string(),
            duration_secs,
            window_end,
        }
    }

    /// Render the store key.
    ///
    /// Format: `{namespace}/{route}/{identity}/{duration}:{window_end}`.
    /// Route and identity are percent-escaped so neither can produce a `/`
    /// or `:` of its own (routes are full of slashes, IPv6 addresses of colons).
    pub fn render(&self, namespace: &str) -> String {
        format!(
            "{}/{}/{}/{}:{}",
            namespace,
            escape(&self.route),
            escape(&self.identity),
            self.duration_secs,
            self.window_end
        )
    }
}

fn escape(value: &str) -> Cow<'_, str> {
    if !value.contains(['%', '/', ':']) {
        return Cow::Borrowed(value);
    }

    let mut out = String::with_capacity(value.len() + 8);
    for c in value.chars() {
        match c {
            '%' => out.push_str("%25"),
            '/' => out.push_str("%2F"),
            ':' => out.push_str("%3A"),
            _ => out.push(c),
        }
    }
    Cow::Owned(out)
}
