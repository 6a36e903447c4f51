//! Trie mapping path segments to bound content.
//!
//! Each node keeps its literal edges apart from its single wildcard edge.
//! Lookups always try the literal edge first. When the literal subtree cannot
//! consume the rest of the path, the search backs up and retries through the
//! wildcard edge, so an identity value that happens to equal a literal
//! segment still reaches its own route.

use crate::errors::{StoreError, StoreResult};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    Literal(String),
    Wildcard,
}

impl Segment {
    pub fn literal(value: impl Into<String>) -> Self {
        Self::Literal(value.into())
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(value) => f.write_str(value),
            Self::Wildcard => f.write_str("*"),
        }
    }
}

pub fn pattern_to_string(pattern: &[Segment]) -> String {
    pattern
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("/")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupMode {
    Silent,
    Strict,
}

#[derive(Debug, Clone)]
pub struct RouteNode<C> {
    literals: BTreeMap<String, RouteNode<C>>,
    wildcard: Option<Box<RouteNode<C>>>,
    content: Option<C>,
}

impl<C> Default for RouteNode<C> {
    fn default() -> Self {
        Self {
            literals: BTreeMap::new(),
            wildcard: None,
            content: None,
        }
    }
}

impl<C> RouteNode<C> {
    pub fn content(&self) -> Option<&C> {
        self.content.as_ref()
    }

    /// Depth-first search for a node reached by consuming all of `segments`
    /// and satisfying `accept`. Literal edges are tried before the wildcard.
    fn search<S, F>(&self, segments: &[S], accept: &F) -> Option<&RouteNode<C>>
    where
        S: AsRef<str>,
        F: Fn(&RouteNode<C>) -> bool,
    {
        let Some((head, rest)) = segments.split_first() else {
            return accept(self).then_some(self);
        };
        self.literals
            .get(head.as_ref())
            .and_then(|node| node.search(rest, accept))
            .or_else(|| {
                self.wildcard
                    .as_deref()
                    .and_then(|node| node.search(rest, accept))
            })
    }

    fn child_mut(&mut self, segment: &Segment) -> &mut RouteNode<C> {
        match segment {
            Segment::Literal(value) => self.literals.entry(value.clone()).or_default(),
            Segment::Wildcard => &mut **self.wildcard.get_or_insert_with(Box::default),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RouteTable<C> {
    root: RouteNode<C>,
    routes: usize,
}

impl<C> Default for RouteTable<C> {
    fn default() -> Self {
        Self {
            root: RouteNode::default(),
            routes: 0,
        }
    }
}

impl<C: PartialEq> RouteTable<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct patterns carrying content.
    pub fn len(&self) -> usize {
        self.routes
    }

    pub fn is_empty(&self) -> bool {
        self.routes == 0
    }

    pub fn root(&self) -> &RouteNode<C> {
        &self.root
    }

    /// Binds `content` at the end of `pattern`. Binding the same content twice
    /// is a no-op; binding different content fails.
    pub fn register(&mut self, pattern: &[Segment], content: C) -> StoreResult<()> {
        let mut node = &mut self.root;
        for segment in pattern {
            node = node.child_mut(segment);
        }
        match &node.content {
            Some(existing) if *existing == content => Ok(()),
            Some(_) => Err(StoreError::DuplicateRoute(format!(
                "'{}' is already bound to different content",
                pattern_to_string(pattern)
            ))),
            None => {
                node.content = Some(content);
                self.routes += 1;
                Ok(())
            }
        }
    }

    pub fn lookup<S: AsRef<str>>(
        &self,
        segments: &[S],
        mode: LookupMode,
    ) -> StoreResult<Option<&RouteNode<C>>> {
        match (self.lookup_silent(segments), mode) {
            (Some(node), _) => Ok(Some(node)),
            (None, LookupMode::Silent) => Ok(None),
            (None, LookupMode::Strict) => Err(StoreError::NoSuchRoute(join_segments(segments))),
        }
    }

    pub fn lookup_silent<S: AsRef<str>>(&self, segments: &[S]) -> Option<&RouteNode<C>> {
        self.root.search(segments, &|_: &RouteNode<C>| true)
    }

    /// Content bound at the end of a route matching `segments`. Unlike
    /// `lookup_silent`, an intermediate node reached through a literal edge
    /// does not stop the search when a wildcard route carries content.
    pub fn resolve<S: AsRef<str>>(&self, segments: &[S]) -> Option<&C> {
        self.root
            .search(segments, &|node: &RouteNode<C>| node.content.is_some())
            .and_then(|node| node.content())
    }

    pub fn lookup_strict<S: AsRef<str>>(&self, segments: &[S]) -> StoreResult<&RouteNode<C>> {
        self.lookup(segments, LookupMode::Strict)?
            .ok_or_else(|| StoreError::NoSuchRoute(join_segments(segments)))
    }
}

fn join_segments<S: AsRef<str>>(segments: &[S]) -> String {
    segments
        .iter()
        .map(|segment| segment.as_ref())
        .collect::<Vec<&str>>()
        .join("/")
}
