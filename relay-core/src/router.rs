//! # Handler Metadata & Router (§4.2)

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::RoutingError;
use crate::invoker::DynInvoker;
use crate::resolver::GenericResolveFn;

/// How a declared handler parameter should be supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterKind {
    /// Bound from the route's path segments, in declaration order.
    Path,
    /// Resolved from anything other than a path segment (context, headers,
    /// query, body, ...).
    Other,
}

/// Static description of one declared handler parameter (§3).
#[derive(Debug, Clone)]
pub struct ParameterMeta {
    /// 0-based position in the handler signature.
    pub index: usize,
    /// The parameter's declared Rust type, for diagnostics.
    pub type_name: &'static str,
    /// The parameter's `TypeId`, used by the `ArgumentResolver` registry.
    pub type_id: TypeId,
    /// Whether this parameter consumes the next path key.
    pub kind: ParameterKind,
    /// Non-registry resolution path for generic body-binding wrappers
    /// (`Json<T>`/`Form<T>`); `None` for parameters the `ArgumentResolver`
    /// registry handles (see the Open Question resolutions in
    /// `SPEC_FULL.md`). When present, the pipeline tries this before
    /// falling back to the registry.
    pub generic_resolve: Option<GenericResolveFn>,
}

impl ParameterMeta {
    /// Build a `ParameterMeta` for a concrete parameter type `T`. Its
    /// [`ParameterKind`] and generic resolution path both come from `T`'s
    /// [`crate::resolver::ParamBinding`] impl, so callers never pass them by
    /// hand and can't get them out of sync with the type.
    pub fn for_type<T: crate::resolver::ParamBinding>(index: usize) -> Self {
        Self {
            index,
            type_name: std::any::type_name::<T>(),
            type_id: TypeId::of::<T>(),
            kind: T::KIND,
            generic_resolve: T::GENERIC_RESOLVE,
        }
    }
}

/// Static description of one registered handler (§3: HandlerMeta).
#[derive(Clone)]
pub struct HandlerMeta {
    /// The owning controller's type name, for container warm-up (§4.2
    /// "controller-type enumeration").
    pub controller_type: TypeId,
    pub controller_type_name: &'static str,
    /// Declared parameters, in signature order.
    pub parameters: Vec<ParameterMeta>,
    /// The invoker that resolves arguments, calls the handler, and returns
    /// its outcome.
    pub invoker: Arc<dyn DynInvoker>,
    /// Route-scoped interceptors, appended after the global chain (§4.5).
    pub interceptors: Vec<Arc<dyn crate::interceptor::DynInterceptor>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Variable(String),
}

fn split_pattern(pattern: &str) -> Vec<Segment> {
    pattern
        .trim_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| {
            if let Some(name) = s.strip_prefix(':') {
                Segment::Variable(name.to_string())
            } else {
                Segment::Literal(s.to_string())
            }
        })
        .collect()
}

fn split_path(path: &str) -> Vec<&str> {
    path.trim_matches('/').split('/').filter(|s| !s.is_empty()).collect()
}

/// Two patterns are ambiguous per §4.2 if they share a segment count and, at
/// every position, either the literals match or at least one side is a
/// variable.
fn ambiguous(a: &[Segment], b: &[Segment]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).all(|(x, y)| match (x, y) {
        (Segment::Literal(lx), Segment::Literal(ly)) => lx == ly,
        _ => true,
    })
}

struct Route {
    pattern: String,
    segments: Vec<Segment>,
    meta: HandlerMeta,
}

/// The route table (§4.2). Registration is boot-only and fatal on conflict;
/// matching is read-only and happens per request.
#[derive(Default)]
pub struct Router {
    routes: HashMap<String, Vec<Route>>,
    global_prefix: Option<Vec<Segment>>,
}

impl Router {
    /// A router with no registered routes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the global path prefix prepended to every registered route
    /// (§4.8). Must be non-empty once stripped of slashes and must not
    /// itself contain a variable segment.
    pub fn with_global_prefix(mut self, prefix: &str) -> Result<Self, RoutingError> {
        let segments = split_pattern(prefix);
        if segments.is_empty() {
            return Err(RoutingError::InvalidPrefix {
                prefix: prefix.to_string(),
                reason: "prefix must contain at least one segment",
            });
        }
        if segments.iter().any(|s| matches!(s, Segment::Variable(_))) {
            return Err(RoutingError::InvalidPrefix {
                prefix: prefix.to_string(),
                reason: "prefix must not contain variable segments",
            });
        }
        self.global_prefix = Some(segments);
        Ok(self)
    }

    /// Register a handler for `method` at `pattern`. Checks the new pattern
    /// against every prior registration for the same method and rejects
    /// ambiguity (§4.2).
    pub fn register(&mut self, method: &str, pattern: &str, meta: HandlerMeta) -> Result<(), RoutingError> {
        let method = method.to_ascii_uppercase();
        let mut segments = self.global_prefix.clone().unwrap_or_default();
        segments.extend(split_pattern(pattern));

        let existing = self.routes.entry(method.clone()).or_default();
        for route in existing.iter() {
            if ambiguous(&route.segments, &segments) {
                return Err(RoutingError::Ambiguous {
                    method,
                    new: pattern.to_string(),
                    existing: route.pattern.clone(),
                });
            }
        }

        existing.push(Route {
            pattern: pattern.to_string(),
            segments,
            meta,
        });
        Ok(())
    }

    /// Match `method`/`path` against the route table. First registered
    /// match wins (§4.2). Returns the matched handler plus the bound path
    /// parameters and the ordered path keys.
    pub fn match_route(
        &self,
        method: &str,
        path: &str,
    ) -> Result<(&HandlerMeta, HashMap<String, String>, Vec<String>), RoutingError> {
        let method = method.to_ascii_uppercase();
        let incoming = split_path(path);

        if let Some(routes) = self.routes.get(&method) {
            for route in routes {
                if route.segments.len() != incoming.len() {
                    continue;
                }
                let mut params = HashMap::new();
                let mut path_keys = Vec::new();
                let mut matched = true;
                for (seg, value) in route.segments.iter().zip(incoming.iter()) {
                    match seg {
                        Segment::Literal(lit) => {
                            if lit != value {
                                matched = false;
                                break;
                            }
                        }
                        Segment::Variable(name) => {
                            params.insert(name.clone(), value.to_string());
                            path_keys.push(name.clone());
                        }
                    }
                }
                if matched {
                    return Ok((&route.meta, params, path_keys));
                }
            }
        }

        Err(RoutingError::NotFound {
            method,
            path: path.to_string(),
        })
    }

    /// The deduplicated set of controller types across every registered
    /// handler, used to warm the container before accepting traffic
    /// (§4.2: "controller-type enumeration").
    pub fn controller_types(&self) -> Vec<TypeId> {
        let mut seen = Vec::new();
        for routes in self.routes.values() {
            for route in routes {
                if !seen.contains(&route.meta.controller_type) {
                    seen.push(route.meta.controller_type);
                }
            }
        }
        seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoker::testing::noop_invoker;

    fn meta() -> HandlerMeta {
        HandlerMeta {
            controller_type: TypeId::of::<()>(),
            controller_type_name: "()",
            parameters: Vec::new(),
            invoker: noop_invoker(),
            interceptors: Vec::new(),
        }
    }

    #[test]
    fn matches_literal_and_variable_segments() {
        let mut router = Router::new();
        router.register("GET", "/users/:id", meta()).unwrap();
        let (_, params, keys) = router.match_route("GET", "/users/42").unwrap();
        assert_eq!(params.get("id"), Some(&"42".to_string()));
        assert_eq!(keys, vec!["id".to_string()]);
    }

    #[test]
    fn first_registered_match_wins() {
        let mut router = Router::new();
        router.register("GET", "/users/:id", meta()).unwrap();
        let err = router.register("GET", "/users/:name", meta()).unwrap_err();
        assert!(matches!(err, RoutingError::Ambiguous { .. }));
    }

    #[test]
    fn distinct_segment_counts_are_not_ambiguous() {
        let mut router = Router::new();
        router.register("GET", "/users/:id", meta()).unwrap();
        router.register("GET", "/users/:id/orders", meta()).unwrap();
    }

    #[test]
    fn miss_reports_not_found() {
        let router = Router::new();
        let err = router.match_route("GET", "/nope").unwrap_err();
        assert!(matches!(err, RoutingError::NotFound { .. }));
    }

    #[test]
    fn global_prefix_is_prepended() {
        let mut router = Router::new().with_global_prefix("/api/v1").unwrap();
        router.register("GET", "/users/:id", meta()).unwrap();
        let (_, params, _) = router.match_route("GET", "/api/v1/users/7").unwrap();
        assert_eq!(params.get("id"), Some(&"7".to_string()));
    }

    #[test]
    fn rejects_variable_global_prefix() {
        let err = Router::new().with_global_prefix("/:bad").unwrap_err();
        assert!(matches!(err, RoutingError::InvalidPrefix { .. }));
    }
}
