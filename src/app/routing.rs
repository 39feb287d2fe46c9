//! URL rule matching.
//!
//! Rules are `/`-separated; a `<name>` segment captures one path segment
//! (an optional converter prefix such as `<int:id>` is accepted and
//! ignored). Static segments win over captures when several rules match.

use std::sync::Arc;

use percent_encoding::percent_decode_str;

use super::handler::Handler;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Static(String),
    Param(String),
}

struct Route {
    rule: String,
    segments: Vec<Segment>,
    handler: Arc<dyn Handler>,
}

impl Route {
    fn matches(&self, parts: &[&str]) -> Option<Vec<(String, String)>> {
        if parts.len() != self.segments.len() {
            return None;
        }

        let mut params = Vec::new();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Static(s) if s == part => {}
                Segment::Static(_) => return None,
                Segment::Param(name) => {
                    let value = percent_decode_str(part).decode_utf8_lossy().into_owned();
                    params.push((name.clone(), value));
                }
            }
        }
        Some(params)
    }

    fn static_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, Segment::Static(_)))
            .count()
    }
}

/// Matched handler plus captured parameters.
pub struct Match {
    pub handler: Arc<dyn Handler>,
    pub params: Vec<(String, String)>,
}

#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `rule`, replacing an earlier registration
    /// of the same rule.
    pub fn add(&mut self, rule: &str, handler: Arc<dyn Handler>) {
        let segments = parse_rule(rule);
        if let Some(route) = self.routes.iter_mut().find(|r| r.segments == segments) {
            route.rule = rule.to_string();
            route.handler = handler;
            return;
        }
        self.routes.push(Route {
            rule: rule.to_string(),
            segments,
            handler,
        });
    }

    pub fn resolve(&self, path: &str) -> Option<Match> {
        let parts = split_path(path);
        let mut best: Option<(&Route, Vec<(String, String)>)> = None;

        for route in &self.routes {
            if let Some(params) = route.matches(&parts) {
                let better = match &best {
                    Some((current, _)) => route.static_count() > current.static_count(),
                    None => true,
                };
                if better {
                    best = Some((route, params));
                }
            }
        }

        best.map(|(route, params)| Match {
            handler: Arc::clone(&route.handler),
            params,
        })
    }

    /// Registered rules in registration order.
    pub fn rules(&self) -> Vec<&str> {
        self.routes.iter().map(|r| r.rule.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn parse_rule(rule: &str) -> Vec<Segment> {
    split_path(rule)
        .into_iter()
        .map(|part| match part.strip_prefix('<').and_then(|p| p.strip_suffix('>')) {
            Some(inner) => {
                let name = inner.rsplit(':').next().unwrap_or(inner);
                Segment::Param(name.to_string())
            }
            None => Segment::Static(part.to_string()),
        })
        .collect()
}
