//! Compressed routing trie.
//!
//! Static text is stored radix-style: edges carry multi-byte prefixes and are
//! split at the longest common prefix when a new pattern diverges. Dynamic
//! segments get their own edge kinds, tried in a fixed order at every node:
//!
//! ```text
//! static  >  regex  >  param  >  catch-all
//! ```
//!
//! Matching backtracks: a static hit that dead-ends further down is retried
//! against the dynamic siblings, so a catch-all registered first never
//! shadows a more specific route.

use std::mem;
use std::sync::Arc;

use regex::Regex;

use crate::context::RouteContext;
use crate::error::RouteError;
use crate::handler::BoxedHandler;
use crate::method::{METHOD_COUNT, Method};
use crate::router::{Route, Router};

// ── Edge kinds ────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Kind {
    Static   = 0,
    Regex    = 1,
    Param    = 2,
    CatchAll = 3,
}

impl Kind {
    /// Match priority. Also the layout of `Node::children`.
    const ORDER: [Kind; 4] = [Kind::Static, Kind::Regex, Kind::Param, Kind::CatchAll];
}

/// Which endpoint slots a registration fills.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum MethodFilter {
    One(Method),
    /// Every method without an explicit endpoint of its own.
    All,
}

impl std::fmt::Display for MethodFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::One(m) => f.write_str(m.as_str()),
            Self::All    => f.write_str("ALL"),
        }
    }
}

// ── Endpoints ─────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub(crate) struct Endpoint {
    pub(crate) handler: BoxedHandler,
    pub(crate) pattern: String,
    pub(crate) param_keys: Vec<String>,
    explicit: bool,
}

pub(crate) struct Endpoints {
    slots: [Option<Endpoint>; METHOD_COUNT],
    any: Option<Endpoint>,
    /// Set on mount points; such nodes are plumbing, not user routes.
    stub: bool,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self { slots: std::array::from_fn(|_| None), any: None, stub: false }
    }
}

impl Endpoints {
    pub(crate) fn get(&self, method: Method) -> Option<&Endpoint> {
        self.slots[method.index()].as_ref()
    }

    fn is_empty(&self) -> bool {
        self.any.is_none() && self.slots.iter().all(Option::is_none)
    }

    /// Methods with a handler at this node, in [`Method::ALL`] order.
    fn methods(&self) -> impl Iterator<Item = Method> + '_ {
        Method::ALL.into_iter().filter(|m| self.slots[m.index()].is_some())
    }

    fn set(&mut self, filter: MethodFilter, endpoint: Endpoint, stub: bool) -> Result<(), RouteError> {
        let duplicate = |pattern: &str| RouteError::Duplicate {
            method: filter.to_string(),
            pattern: pattern.to_owned(),
        };
        match filter {
            MethodFilter::One(method) => {
                let slot = &mut self.slots[method.index()];
                if slot.as_ref().is_some_and(|e| e.explicit) {
                    return Err(duplicate(&endpoint.pattern));
                }
                *slot = Some(Endpoint { explicit: true, ..endpoint });
            }
            MethodFilter::All => {
                if self.any.is_some() {
                    return Err(duplicate(&endpoint.pattern));
                }
                for slot in &mut self.slots {
                    if !slot.as_ref().is_some_and(|e| e.explicit) {
                        *slot = Some(endpoint.clone());
                    }
                }
                self.any = Some(endpoint);
            }
        }
        self.stub |= stub;
        Ok(())
    }
}

// ── Pattern segments ──────────────────────────────────────────────────────────

/// The next piece of a route pattern, as seen from the current insert position.
struct Segment<'p> {
    kind: Kind,
    key: &'p str,
    /// Anchored regex source; empty for every other kind.
    regex: String,
    /// Byte that ends a param value on the request path.
    tail: u8,
    /// Bytes of the pattern this segment spans.
    len: usize,
}

impl<'p> Segment<'p> {
    fn parse(search: &'p str, pattern: &str) -> Result<Self, RouteError> {
        match search.as_bytes().first() {
            Some(b'{') => Self::param(search, pattern),
            Some(b'*') => {
                if search.len() > 1 {
                    return Err(RouteError::WildcardNotLast(pattern.to_owned()));
                }
                Ok(Self { kind: Kind::CatchAll, key: "*", regex: String::new(), tail: 0, len: 1 })
            }
            _ => {
                let len = search.find(|c| c == '{' || c == '*').unwrap_or(search.len());
                Ok(Self { kind: Kind::Static, key: "", regex: String::new(), tail: 0, len })
            }
        }
    }

    fn param(search: &'p str, pattern: &str) -> Result<Self, RouteError> {
        // Braces nest so quantifiers like `{3}` can live inside a regex.
        let mut depth = 0usize;
        let mut close = None;
        for (i, b) in search.bytes().enumerate() {
            match b {
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        close = Some(i);
                        break;
                    }
                }
                _ => {}
            }
        }
        let close = close.ok_or_else(|| RouteError::UnclosedParam(pattern.to_owned()))?;

        let inner = &search[1..close];
        let (key, regex) = inner.split_once(':').unwrap_or((inner, ""));
        if key.is_empty() {
            return Err(RouteError::EmptyParamName(pattern.to_owned()));
        }

        let len = close + 1;
        let tail = search.as_bytes().get(len).copied().unwrap_or(b'/');
        let (kind, regex) = if regex.is_empty() {
            (Kind::Param, String::new())
        } else {
            (Kind::Regex, anchored(regex))
        };
        Ok(Self { kind, key, regex, tail, len })
    }
}

fn anchored(regex: &str) -> String {
    let mut out = String::with_capacity(regex.len() + 2);
    if !regex.starts_with('^') {
        out.push('^');
    }
    out.push_str(regex);
    if !regex.ends_with('$') {
        out.push('$');
    }
    out
}

/// Capture keys of `pattern`, in path order. Validates the whole pattern.
fn param_keys(pattern: &str) -> Result<Vec<String>, RouteError> {
    let mut keys: Vec<String> = Vec::new();
    let mut search = pattern;
    while !search.is_empty() {
        let seg = Segment::parse(search, pattern)?;
        if seg.kind != Kind::Static {
            if keys.iter().any(|k| k == seg.key) {
                return Err(RouteError::DuplicateParam {
                    pattern: pattern.to_owned(),
                    key: seg.key.to_owned(),
                });
            }
            keys.push(seg.key.to_owned());
        }
        search = &search[seg.len..];
    }
    Ok(keys)
}

/// Length in bytes of the longest common prefix, always on a char boundary.
fn common_prefix_len(a: &str, b: &str) -> usize {
    a.chars()
        .zip(b.chars())
        .take_while(|(x, y)| x == y)
        .map(|(c, _)| c.len_utf8())
        .sum()
}

fn first_char(s: &str) -> char {
    s.chars().next().unwrap_or('\0')
}

// ── Node ──────────────────────────────────────────────────────────────────────

/// One edge of the trie plus whatever hangs off it.
pub(crate) struct Node {
    kind: Kind,
    /// First byte of `prefix` for static edges; `{` or `*` otherwise.
    label: char,
    tail: u8,
    /// Static text, or the anchored regex source for regex edges.
    prefix: String,
    regex: Option<Regex>,
    children: [Vec<Node>; 4],
    pub(crate) endpoints: Endpoints,
    pub(crate) subroutes: Option<Arc<Router>>,
}

impl Node {
    pub(crate) fn root() -> Self {
        Self::static_edge(String::new())
    }

    fn static_edge(prefix: String) -> Self {
        Self {
            kind: Kind::Static,
            label: first_char(&prefix),
            tail: 0,
            prefix,
            regex: None,
            children: Default::default(),
            endpoints: Endpoints::default(),
            subroutes: None,
        }
    }

    fn dynamic_edge(seg: &Segment<'_>, pattern: &str) -> Result<Self, RouteError> {
        let regex = match seg.kind {
            Kind::Regex => Some(Regex::new(&seg.regex).map_err(|e| RouteError::InvalidRegex {
                pattern: pattern.to_owned(),
                regex: seg.regex.clone(),
                reason: e.to_string(),
            })?),
            _ => None,
        };
        Ok(Self {
            kind: seg.kind,
            label: if seg.kind == Kind::CatchAll { '*' } else { '{' },
            tail: seg.tail,
            prefix: seg.regex.clone(),
            regex,
            children: Default::default(),
            endpoints: Endpoints::default(),
            subroutes: None,
        })
    }

    fn is_leaf(&self) -> bool {
        !self.endpoints.is_empty()
    }

    // ── Insert ────────────────────────────────────────────────────────────────

    /// Registers `handler` under `pattern` and returns the terminal node.
    pub(crate) fn insert(
        &mut self,
        filter: MethodFilter,
        pattern: &str,
        handler: BoxedHandler,
        stub: bool,
    ) -> Result<&mut Node, RouteError> {
        if !pattern.starts_with('/') {
            return Err(RouteError::MissingLeadingSlash(pattern.to_owned()));
        }
        let param_keys = param_keys(pattern)?;
        let node = self.insert_path(pattern, pattern)?;
        let endpoint = Endpoint {
            handler,
            pattern: pattern.to_owned(),
            param_keys,
            explicit: false,
        };
        node.endpoints.set(filter, endpoint, stub)?;
        Ok(node)
    }

    fn insert_path(&mut self, search: &str, pattern: &str) -> Result<&mut Node, RouteError> {
        if search.is_empty() {
            return Ok(self);
        }
        let seg = Segment::parse(search, pattern)?;

        if seg.kind == Kind::Static {
            let text = &search[..seg.len];
            let statics = &mut self.children[Kind::Static as usize];
            return match statics.binary_search_by_key(&first_char(text), |n| n.label) {
                Err(at) => {
                    statics.insert(at, Node::static_edge(text.to_owned()));
                    statics[at].insert_path(&search[seg.len..], pattern)
                }
                Ok(at) => {
                    let child = &mut statics[at];
                    let common = common_prefix_len(text, &child.prefix);
                    if common < child.prefix.len() {
                        child.split(common);
                    }
                    child.insert_path(&search[common..], pattern)
                }
            };
        }

        let siblings = &mut self.children[seg.kind as usize];
        let at = match siblings.iter().position(|n| n.tail == seg.tail && n.prefix == seg.regex) {
            Some(at) => at,
            None => {
                let node = Node::dynamic_edge(&seg, pattern)?;
                // Registration order, except `/`-tailed params go last so that
                // `{a}-{b}` style segments get a chance before a plain `{a}`.
                let at = if seg.tail == b'/' {
                    siblings.len()
                } else {
                    siblings.iter().position(|n| n.tail == b'/').unwrap_or(siblings.len())
                };
                siblings.insert(at, node);
                at
            }
        };
        siblings[at].insert_path(&search[seg.len..], pattern)
    }

    /// Cuts this static edge after `at` bytes; the remainder moves one level down.
    fn split(&mut self, at: usize) {
        let head = self.prefix[..at].to_owned();
        let mut lower = mem::replace(self, Node::static_edge(head));
        lower.prefix = lower.prefix.split_off(at);
        lower.label = first_char(&lower.prefix);
        self.children[Kind::Static as usize].push(lower);
    }

    // ── Match ─────────────────────────────────────────────────────────────────

    /// Resolves `path` for `method`, recording captures on `ctx`.
    ///
    /// On a path hit with a method miss, returns `None` and leaves
    /// `ctx.method_not_allowed` set with the node's methods in
    /// `ctx.methods_allowed`.
    pub(crate) fn find_route<'n>(
        &'n self,
        ctx: &mut RouteContext,
        method: Method,
        path: &str,
    ) -> Option<(&'n Node, &'n Endpoint)> {
        ctx.route_params.clear();
        ctx.methods_allowed.clear();
        ctx.method_not_allowed = false;

        let node = self.find(ctx, method, path)?;
        let endpoint = node.endpoints.get(method)?;

        ctx.commit_route_params();
        ctx.route_patterns.push(endpoint.pattern.clone());
        Some((node, endpoint))
    }

    fn find<'n>(&'n self, ctx: &mut RouteContext, method: Method, search: &str) -> Option<&'n Node> {
        for kind in Kind::ORDER {
            let edges = &self.children[kind as usize];
            if edges.is_empty() {
                continue;
            }
            match kind {
                Kind::Static => {
                    let Some(label) = search.chars().next() else { continue };
                    let Ok(at) = edges.binary_search_by_key(&label, |n| n.label) else { continue };
                    let edge = &edges[at];
                    let Some(rest) = search.strip_prefix(edge.prefix.as_str()) else { continue };
                    if let Some(found) = edge.arrive(ctx, method, rest) {
                        return Some(found);
                    }
                }
                Kind::Regex | Kind::Param => {
                    for edge in edges {
                        let end = match search.bytes().position(|b| b == edge.tail) {
                            Some(0) => continue,
                            Some(end) => end,
                            None if edge.tail == b'/' => search.len(),
                            None => continue,
                        };
                        let value = &search[..end];
                        if value.is_empty() {
                            continue;
                        }
                        match &edge.regex {
                            Some(regex) if !regex.is_match(value) => continue,
                            None if value.contains('/') => continue,
                            _ => {}
                        }

                        ctx.route_params.values.push(value.to_owned());
                        if let Some(found) = edge.arrive(ctx, method, &search[end..]) {
                            return Some(found);
                        }
                        ctx.route_params.values.pop();
                    }
                }
                Kind::CatchAll => {
                    ctx.route_params.values.push(search.to_owned());
                    if let Some(found) = edges[0].arrive(ctx, method, "") {
                        return Some(found);
                    }
                    ctx.route_params.values.pop();
                }
            }
        }
        None
    }

    /// Called once an edge has consumed its part of the path.
    fn arrive<'n>(&'n self, ctx: &mut RouteContext, method: Method, rest: &str) -> Option<&'n Node> {
        if rest.is_empty() && self.is_leaf() {
            if let Some(endpoint) = self.endpoints.get(method) {
                ctx.route_params.keys.extend(endpoint.param_keys.iter().cloned());
                return Some(self);
            }
            for allowed in self.endpoints.methods() {
                ctx.allow(allowed);
            }
            ctx.method_not_allowed = true;
        }
        self.find(ctx, method, rest)
    }

    // ── Introspection ─────────────────────────────────────────────────────────

    /// Whether a node exists for exactly this pattern.
    pub(crate) fn find_pattern(&self, search: &str) -> bool {
        self.locate(search).is_some()
    }

    /// Whether this exact pattern already has an endpoint for every method.
    pub(crate) fn has_any_endpoint(&self, search: &str) -> bool {
        self.locate(search).is_some_and(|n| n.endpoints.any.is_some())
    }

    fn locate(&self, search: &str) -> Option<&Node> {
        if search.is_empty() {
            return Some(self);
        }
        let seg = Segment::parse(search, search).ok()?;

        if seg.kind == Kind::Static {
            let statics = &self.children[Kind::Static as usize];
            let at = statics.binary_search_by_key(&first_char(search), |n| n.label).ok()?;
            let edge = &statics[at];
            return edge.locate(search.strip_prefix(edge.prefix.as_str())?);
        }

        self.children[seg.kind as usize]
            .iter()
            .find(|n| n.tail == seg.tail && n.prefix == seg.regex)?
            .locate(&search[seg.len..])
    }

    fn walk<'n, F: FnMut(&'n Node)>(&'n self, visit: &mut F) {
        if self.is_leaf() {
            visit(self);
        }
        for edges in &self.children {
            for edge in edges {
                edge.walk(visit);
            }
        }
    }

    /// Registered routes, grouped by pattern, depth-first in match order.
    pub(crate) fn routes(&self) -> Vec<Route> {
        let mut out = Vec::new();
        self.walk(&mut |node: &Node| {
            let eps = &node.endpoints;
            if eps.stub && node.subroutes.is_none() {
                return;
            }

            let mut grouped: Vec<Route> = Vec::new();
            if let Some(any) = &eps.any {
                grouped.push(Route::new(any.pattern.clone(), true));
            }
            for method in Method::ALL {
                let Some(ep) = eps.get(method).filter(|e| e.explicit) else { continue };
                match grouped.iter_mut().find(|r| r.pattern == ep.pattern) {
                    Some(route) => route.methods.push(method),
                    None => {
                        let mut route = Route::new(ep.pattern.clone(), false);
                        route.methods.push(method);
                        grouped.push(route);
                    }
                }
            }
            if let (Some(sub), Some(first)) = (&node.subroutes, grouped.first_mut()) {
                first.sub_routes = sub.routes();
            }
            out.extend(grouped);
        });
        out
    }
}
