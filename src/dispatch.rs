use axum::http::Method;

use crate::error::{ApiError, ConfigError};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

impl Segment {
    fn is_literal(&self) -> bool {
        matches!(self, Segment::Literal(_))
    }

    // same shape, ignoring parameter names
    fn overlaps(&self, other: &Segment) -> bool {
        match (self, other) {
            (Segment::Literal(a), Segment::Literal(b)) => a == b,
            (Segment::Param(_), Segment::Param(_)) => true,
            _ => false,
        }
    }
}

struct Route<H> {
    method: Method,
    pattern: String,
    segments: Vec<Segment>,
    handler: H,
}

impl<H> Route<H> {
    fn matches(&self, path: &[&str]) -> bool {
        self.segments.len() == path.len()
            && self.segments.iter().zip(path).all(|(seg, part)| match seg {
                Segment::Literal(lit) => lit == part,
                Segment::Param(_) => true,
            })
    }

    fn literal_mask(&self) -> Vec<bool> {
        self.segments.iter().map(Segment::is_literal).collect()
    }
}

/// Named parameters captured from a matched path, in pattern order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams(Vec<(String, String)>);

impl PathParams {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

pub struct RouteMatch<'a, H> {
    pub handler: &'a H,
    pub pattern: &'a str,
    pub params: PathParams,
}

pub struct RouteTable<H> {
    routes: Vec<Route<H>>,
}

impl<H> Default for RouteTable<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> RouteTable<H> {
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    /// Add a route. Fails if the pattern is malformed or the same
    /// (method, pattern) shape is already registered; the table is left
    /// untouched on failure.
    pub fn register(&mut self, method: Method, pattern: &str, handler: H) -> Result<(), ConfigError> {
        let segments = parse_pattern(pattern)?;

        let collides = self.routes.iter().any(|route| {
            route.method == method
                && route.segments.len() == segments.len()
                && route.segments.iter().zip(&segments).all(|(a, b)| a.overlaps(b))
        });
        if collides {
            return Err(ConfigError::RouteCollision {
                method: method.to_string(),
                pattern: pattern.to_string(),
            });
        }

        self.routes.push(Route {
            method,
            pattern: pattern.to_string(),
            segments,
            handler,
        });
        Ok(())
    }

    // Among matching routes the one with a literal at the first differing
    // segment wins, so `/api/incidents/stats` beats `/api/incidents/{id}`
    pub fn dispatch(&self, method: &Method, path: &str) -> Result<RouteMatch<'_, H>, ApiError> {
        let parts: Vec<&str> = split_path(path).collect();

        let route = self
            .routes
            .iter()
            .filter(|route| route.method == *method && route.matches(&parts))
            .max_by(|a, b| a.literal_mask().cmp(&b.literal_mask()))
            .ok_or_else(|| ApiError::NotFound(format!("Route {method} {path} not found")))?;

        let params = route
            .segments
            .iter()
            .zip(&parts)
            .filter_map(|(seg, part)| match seg {
                Segment::Param(name) => Some((name.clone(), (*part).to_string())),
                Segment::Literal(_) => None,
            })
            .collect();

        Ok(RouteMatch {
            handler: &route.handler,
            pattern: &route.pattern,
            params: PathParams(params),
        })
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn routes(&self) -> impl Iterator<Item = (&Method, &str)> {
        self.routes.iter().map(|r| (&r.method, r.pattern.as_str()))
    }
}

fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

fn parse_pattern(pattern: &str) -> Result<Vec<Segment>, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: reason.to_string(),
    };

    if !pattern.starts_with('/') {
        return Err(invalid("must start with '/'"));
    }

    let mut segments = Vec::new();
    for part in split_path(pattern) {
        let segment = match part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
            Some(name) => {
                if name.is_empty() || name.contains(['{', '}']) {
                    return Err(invalid("parameter name must be non-empty"));
                }
                if segments
                    .iter()
                    .any(|s| matches!(s, Segment::Param(n) if n == name))
                {
                    return Err(invalid("duplicate parameter name"));
                }
                Segment::Param(name.to_string())
            }
            None if part.contains(['{', '}']) => {
                return Err(invalid("parameters must span a whole segment"));
            }
            None => Segment::Literal(part.to_string()),
        };
        segments.push(segment);
    }
    Ok(segments)
}
