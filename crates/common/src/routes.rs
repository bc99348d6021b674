//! Route table mapping public domains to targets reachable from the agent
//!
//! Requests arriving at the relay carry the public domain in their `Host`
//! header; the agent swaps it for the internal target before fetching. When
//! response rewriting is enabled, every internal target occurring in a
//! response is replaced by its public domain so links keep pointing at the
//! relay.

use regex::bytes::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::{borrow::Cow, collections::HashMap};
use tracing::debug;

use crate::error::{Result, TunnelError};

/// One configured pairing of a public domain and an internal target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct TunnelRoute {
    /// Domain the public caller uses (e.g. "a.example.com")
    pub external_domain: String,

    /// Host or host:port the agent can reach (e.g. "10.0.0.5:8080")
    pub internal_target: String,
}

impl TunnelRoute {
    pub fn new(external_domain: impl Into<String>, internal_target: impl Into<String>) -> Self {
        Self {
            external_domain: external_domain.into(),
            internal_target: internal_target.into(),
        }
    }
}

/// Immutable lookup table built once at startup
///
/// Shared between tasks behind an `Arc` without any locking.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<TunnelRoute>,
    by_domain: HashMap<String, usize>,
    by_target: HashMap<String, usize>,
    rewriter: Option<Regex>,
}

impl RouteTable {
    /// Build the table, rejecting empty fields and duplicate public domains
    pub fn new(routes: Vec<TunnelRoute>) -> Result<Self> {
        let mut by_domain = HashMap::with_capacity(routes.len());
        let mut by_target = HashMap::with_capacity(routes.len());

        for (idx, route) in routes.iter().enumerate() {
            if route.external_domain.trim().is_empty() || route.internal_target.trim().is_empty()
            {
                return Err(TunnelError::Config(format!(
                    "Route #{} has an empty domain or target",
                    idx + 1
                )));
            }

            let domain = route.external_domain.to_ascii_lowercase();
            if by_domain.insert(domain, idx).is_some() {
                return Err(TunnelError::Config(format!(
                    "Duplicate external domain: {}",
                    route.external_domain
                )));
            }

            // First route wins when several share a target
            by_target.entry(route.internal_target.clone()).or_insert(idx);
        }

        // Alternation in table order: at each position the earliest route wins,
        // and replaced text is never scanned again.
        let rewriter = if routes.is_empty() {
            None
        } else {
            let pattern = routes
                .iter()
                .map(|r| regex::escape(&r.internal_target))
                .collect::<Vec<_>>()
                .join("|");
            Some(Regex::new(&pattern).map_err(|e| TunnelError::Config(e.to_string()))?)
        };

        debug!("Loaded {} tunnel routes", routes.len());

        Ok(Self {
            routes,
            by_domain,
            by_target,
            rewriter,
        })
    }

    pub fn routes(&self) -> &[TunnelRoute] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Internal target for a public domain (case-insensitive, no port)
    pub fn resolve_internal(&self, domain: &str) -> Option<&str> {
        self.by_domain
            .get(&domain.to_ascii_lowercase())
            .map(|&idx| self.routes[idx].internal_target.as_str())
    }

    /// Public domain for an internal target
    pub fn resolve_external(&self, target: &str) -> Option<&str> {
        self.by_target
            .get(target)
            .map(|&idx| self.routes[idx].external_domain.as_str())
    }

    /// Replace every internal target in `input` with its public domain
    pub fn rewrite<'a>(&self, input: &'a [u8]) -> Cow<'a, [u8]> {
        match &self.rewriter {
            Some(re) => re.replace_all(input, |caps: &Captures| {
                let matched = String::from_utf8_lossy(&caps[0]);
                self.resolve_external(&matched)
                    .map(|domain| domain.as_bytes().to_vec())
                    .unwrap_or_else(|| caps[0].to_vec())
            }),
            None => Cow::Borrowed(input),
        }
    }
}
