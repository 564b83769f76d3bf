//! Maps dashboard paths to views.
//!
//! Routes are full-match patterns made of literal and parameter segments. Each route
//! has a shape: collections are canonically addressed with a trailing `/`, items
//! without. A request using the other form is redirected (301) to the canonical one.

mod routes;

pub use routes::{Facet, View};

use std::fmt;

use thiserror::Error;
use url::form_urlencoded;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Segment {
    Literal(&'static str),
    Param,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Shape {
    Collection,
    Item,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Route {
    pub pattern: Vec<Segment>,
    pub shape: Shape,
    pub view: View,
}

impl Route {
    pub fn new(pattern: Vec<Segment>, shape: Shape, view: View) -> Self {
        Self {
            pattern,
            shape,
            view,
        }
    }

    fn matches(&self, segments: &[String]) -> bool {
        self.pattern.len() == segments.len()
            && self
                .pattern
                .iter()
                .zip(segments)
                .all(|(pattern, segment)| match pattern {
                    _ if segment.is_empty() => false,
                    Segment::Literal(lit) => *lit == segment.as_str(),
                    Segment::Param => true,
                })
    }

    /// Two patterns overlap when some path could match both.
    fn overlaps(&self, other: &Route) -> bool {
        self.pattern.len() == other.pattern.len()
            && self
                .pattern
                .iter()
                .zip(&other.pattern)
                .all(|pair| match pair {
                    (Segment::Literal(a), Segment::Literal(b)) => a == b,
                    _ => true,
                })
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.pattern {
            match segment {
                Segment::Literal(lit) => write!(f, "/{}", lit)?,
                Segment::Param => f.write_str("/{}")?,
            }
        }
        if self.shape == Shape::Collection {
            f.write_str("/")?;
        }
        Ok(())
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RouteTableError {
    #[error("routes {0} and {1} overlap")]
    Overlap(String, String),
}

/// A matched route and its decoded parameters, in path order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteMatch {
    pub view: View,
    pub captures: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RouteOutcome {
    Matched(RouteMatch),
    /// Absolute location to send a 301 to.
    Redirect(String),
    NotFound,
}

/// Ordered, pairwise disjoint route table.
#[derive(Clone, Debug)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn new(routes: Vec<Route>) -> Result<Self, RouteTableError> {
        for (i, a) in routes.iter().enumerate() {
            if let Some(b) = routes[i + 1..].iter().find(|b| a.overlaps(b)) {
                return Err(RouteTableError::Overlap(a.to_string(), b.to_string()));
            }
        }
        Ok(Self { routes })
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Resolves `path` (prefix already stripped). `prefix` and `raw_query` are only
    /// used to build redirect locations.
    pub fn resolve(&self, prefix: &str, path: &str, raw_query: Option<&str>) -> RouteOutcome {
        let Some((segments, trailing_slash)) = split_path(path) else {
            return RouteOutcome::NotFound;
        };

        let Some(route) = self.routes.iter().find(|r| r.matches(&segments)) else {
            return RouteOutcome::NotFound;
        };

        let canonical_slash = route.shape == Shape::Collection;
        if trailing_slash != canonical_slash {
            let mut location = format!("{}{}", prefix, encode_path(&segments, route.shape));
            if let Some(query) = raw_query.filter(|q| !q.is_empty()) {
                location.push('?');
                location.push_str(&reencode_query(query));
            }
            return RouteOutcome::Redirect(location);
        }

        let captures = route
            .pattern
            .iter()
            .zip(segments)
            .filter(|(p, _)| **p == Segment::Param)
            .map(|(_, s)| s)
            .collect();

        RouteOutcome::Matched(RouteMatch {
            view: route.view,
            captures,
        })
    }
}

/// Splits a path into percent-decoded segments and reports whether it ended with `/`.
///
/// Returns `None` when a segment is not valid UTF-8 once decoded.
pub fn split_path(path: &str) -> Option<(Vec<String>, bool)> {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    let trailing_slash = trimmed.ends_with('/');
    let trimmed = trimmed.strip_suffix('/').unwrap_or(trimmed);
    if trimmed.is_empty() {
        return Some((Vec::new(), trailing_slash));
    }

    let segments = trimmed
        .split('/')
        .map(|s| urlencoding::decode(s).ok().map(|d| d.into_owned()))
        .collect::<Option<Vec<_>>>()?;
    Some((segments, trailing_slash))
}

/// Builds a path from decoded segments, each one percent-encoded on its own.
pub fn encode_path<S: AsRef<str>>(segments: &[S], shape: Shape) -> String {
    let mut path = String::new();
    for segment in segments {
        path.push('/');
        path.push_str(&urlencoding::encode(segment.as_ref()));
    }
    if shape == Shape::Collection || segments.is_empty() {
        path.push('/');
    }
    path
}

/// Parses then re-serializes a query string, keeping pair order.
pub fn reencode_query(raw: &str) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in form_urlencoded::parse(raw.as_bytes()) {
        serializer.append_pair(&key, &value);
    }
    serializer.finish()
}

/// Serializes already-decoded query pairs.
pub fn encode_query(pairs: &[(String, String)]) -> String {
    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}
