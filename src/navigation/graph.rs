//! Route definitions and deterministic resolution of navigation requests

use super::params::NavParams;
use super::route::{RouteKey, RoutePattern};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Reverse;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// A resolved navigation target: canonical route key plus plain-data payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Destination {
    route: RouteKey,
    params: NavParams,
}

impl Destination {
    pub fn new(route: impl Into<RouteKey>, params: NavParams) -> Self {
        Self {
            route: route.into(),
            params,
        }
    }

    pub fn route(&self) -> &RouteKey {
        &self.route
    }

    pub fn params(&self) -> &NavParams {
        &self.params
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.params.is_empty() {
            write!(f, "{}", self.route)
        } else {
            write!(f, "{} {}", self.route, self.params)
        }
    }
}

/// What a resolver sees for a matched request
#[derive(Debug, Clone)]
pub struct RouteMatch {
    /// Canonical key of the matched route
    pub route: RouteKey,

    /// Key as requested (after alias expansion)
    pub requested: RouteKey,

    /// Pattern that matched
    pub pattern: String,

    /// Request payload with path captures merged in
    pub params: NavParams,
}

type Resolver = Arc<dyn Fn(&RouteMatch) -> Result<NavParams> + Send + Sync>;

/// Definition of one navigable route
pub struct Route {
    key: RouteKey,
    patterns: Vec<String>,
    required: Vec<String>,
    resolver: Option<Resolver>,
}

impl Route {
    /// Define a route; its key is always one of its patterns
    pub fn new(key: impl Into<RouteKey>) -> Self {
        let key = key.into();
        Self {
            patterns: vec![key.to_string()],
            key,
            required: Vec::new(),
            resolver: None,
        }
    }

    /// Add another pattern that resolves to this route
    pub fn pattern(mut self, pattern: &str) -> Self {
        self.patterns.push(pattern.to_string());
        self
    }

    /// Require a parameter to be present (from the payload or a capture)
    pub fn require(mut self, name: &str) -> Self {
        self.required.push(name.to_string());
        self
    }

    /// Normalize or validate the merged payload before it becomes a destination
    pub fn resolve_with<F>(mut self, resolver: F) -> Self
    where
        F: Fn(&RouteMatch) -> Result<NavParams> + Send + Sync + 'static,
    {
        self.resolver = Some(Arc::new(resolver));
        self
    }
}

/// Summary of a route for listings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteInfo {
    pub key: RouteKey,
    pub patterns: Vec<String>,
    pub required: Vec<String>,
}

struct CompiledPattern {
    pattern: RoutePattern,
    route: usize,
    seq: usize,
}

#[derive(Default)]
struct GraphInner {
    routes: Vec<Route>,
    patterns: Vec<CompiledPattern>,
    aliases: HashMap<RouteKey, RouteKey>,
}

/// Mapping from route patterns to destination definitions
///
/// Routes and aliases may be added at any time; resolution always sees a
/// consistent table and yields the same destination for the same request.
pub struct NavigationGraph {
    inner: RwLock<GraphInner>,
    default_route: RouteKey,
}

impl NavigationGraph {
    pub fn new(default_route: impl Into<RouteKey>) -> Self {
        Self {
            inner: RwLock::new(GraphInner::default()),
            default_route: default_route.into(),
        }
    }

    /// Builder form of `add_route`
    pub fn with_route(self, route: Route) -> Result<Self> {
        self.add_route(route)?;
        Ok(self)
    }

    pub fn add_route(&self, route: Route) -> Result<()> {
        let mut compiled = Vec::with_capacity(route.patterns.len());
        for raw in &route.patterns {
            compiled.push(RoutePattern::parse(raw)?);
        }

        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);

        if inner.routes.iter().any(|existing| existing.key == route.key) {
            return Err(Error::InvalidRoutePattern {
                pattern: route.key.to_string(),
                reason: "route is already defined".to_string(),
            });
        }
        for pattern in &compiled {
            if inner.patterns.iter().any(|cp| cp.pattern.as_str() == pattern.as_str()) {
                return Err(Error::InvalidRoutePattern {
                    pattern: pattern.to_string(),
                    reason: "pattern is already claimed by another route".to_string(),
                });
            }
        }

        let index = inner.routes.len();
        for pattern in compiled {
            let seq = inner.patterns.len();
            inner.patterns.push(CompiledPattern {
                pattern,
                route: index,
                seq,
            });
        }
        inner
            .patterns
            .sort_by_key(|cp| (Reverse(cp.pattern.specificity()), cp.seq));

        log::debug!("Added route '{}' ({})", route.key, route.patterns.join(", "));
        inner.routes.push(route);
        Ok(())
    }

    /// Redirect requests for `from` to `to` before matching
    pub fn alias(&self, from: impl Into<RouteKey>, to: impl Into<RouteKey>) -> Result<()> {
        let (from, to) = (from.into(), to.into());
        if from.is_empty() || to.is_empty() || from == to {
            return Err(Error::InvalidRoutePattern {
                pattern: from.to_string(),
                reason: format!("cannot alias to '{}'", to),
            });
        }

        log::debug!("Aliased route '{}' -> '{}'", from, to);
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .aliases
            .insert(from, to);
        Ok(())
    }

    /// Resolve a request to a destination
    ///
    /// Fails with `UnresolvedDestination` for unknown keys and with
    /// `InvalidNavigationParameter` when the payload does not satisfy the route.
    pub fn resolve(&self, route: &RouteKey, params: &NavParams) -> Result<Destination> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let requested = inner.aliases.get(route).unwrap_or(route);

        for cp in &inner.patterns {
            let Some(captures) = cp.pattern.matches(requested) else {
                continue;
            };
            let definition = &inner.routes[cp.route];

            let mut merged = params.clone();
            for (name, captured) in captures {
                match merged.get(&name) {
                    Some(existing) if !same_value(existing, &captured) => {
                        return Err(Error::invalid_param(
                            name,
                            format!(
                                "payload value {} conflicts with path segment '{}'",
                                existing, captured
                            ),
                        ));
                    }
                    Some(_) => {}
                    None => merged.insert_value(name, Value::String(captured)),
                }
            }

            if let Some(missing) = definition.required.iter().find(|name| !merged.contains(name)) {
                return Err(Error::invalid_param(
                    missing.as_str(),
                    format!("required by route '{}'", definition.key),
                ));
            }

            let params = match &definition.resolver {
                Some(resolver) => resolver(&RouteMatch {
                    route: definition.key.clone(),
                    requested: requested.clone(),
                    pattern: cp.pattern.to_string(),
                    params: merged,
                })?,
                None => merged,
            };

            let destination = Destination::new(definition.key.clone(), params);
            log::debug!("Resolved '{}' via '{}' to {}", route, cp.pattern, destination);
            return Ok(destination);
        }

        Err(Error::UnresolvedDestination(route.to_string()))
    }

    pub fn default_route(&self) -> &RouteKey {
        &self.default_route
    }

    /// Resolve the designated default route with an empty payload
    pub fn default_destination(&self) -> Result<Destination> {
        self.resolve(&self.default_route, &NavParams::new())
    }

    /// Whether a route with this canonical key exists
    pub fn contains(&self, key: &str) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .routes
            .iter()
            .any(|route| route.key.as_str() == key)
    }

    /// All routes in definition order
    pub fn routes(&self) -> Vec<RouteInfo> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .routes
            .iter()
            .map(|route| RouteInfo {
                key: route.key.clone(),
                patterns: route.patterns.clone(),
                required: route.required.clone(),
            })
            .collect()
    }

    pub fn aliases(&self) -> Vec<(RouteKey, RouteKey)> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut aliases: Vec<_> = inner
            .aliases
            .iter()
            .map(|(from, to)| (from.clone(), to.clone()))
            .collect();
        aliases.sort();
        aliases
    }
}

fn same_value(existing: &Value, captured: &str) -> bool {
    match existing {
        Value::String(s) => s == captured,
        Value::Number(n) => n.to_string() == captured,
        Value::Bool(b) => b.to_string() == captured,
        _ => false,
    }
}
