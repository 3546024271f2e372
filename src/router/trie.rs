//! Segment trie used for per-method route matching.
//!
//! Each HTTP method owns one trie. A node has literal children keyed by the
//! exact segment text plus at most one parameter child. Every route that puts
//! a `<name>` segment at the same position shares that parameter child, and
//! the most recent registration decides its name.
//!
//! Matching walks the trie depth-first. At every level the literal child is
//! tried before the parameter child, and a failed literal subtree backtracks
//! into the parameter branch, so literal segments win at every depth.

use smallvec::SmallVec;
use std::collections::HashMap;
use std::sync::Arc;

use super::core::{Handler, ParamVec};

/// Path segments of a request or route pattern.
pub(crate) type Segments<'a> = SmallVec<[&'a str; 8]>;

/// Split a path on `/`, dropping empty segments.
///
/// Leading, trailing and repeated slashes are therefore insignificant.
/// `.`, `..` and backslashes are kept as ordinary segments.
pub(crate) fn split_path(path: &str) -> Segments<'_> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Parameter name of a `<name>` segment.
fn param_name(segment: &str) -> Option<&str> {
    segment.strip_prefix('<')?.strip_suffix('>')
}

#[derive(Clone, Default)]
pub(crate) struct RouteNode {
    children: HashMap<String, RouteNode>,
    param_child: Option<Box<RouteNode>>,
    /// Only set on parameter children.
    param_name: Option<Arc<str>>,
    handler: Option<Handler>,
}

impl RouteNode {
    /// Walk (creating as needed) the nodes for `segments` and bind `handler`
    /// at the last one. A second registration for the same node replaces the
    /// handler.
    pub(crate) fn insert(&mut self, segments: &[&str], handler: Handler) {
        let mut node = self;
        for segment in segments {
            node = match param_name(segment) {
                Some(name) => {
                    let child = node.param_child.get_or_insert_with(Box::default);
                    child.param_name = Some(Arc::from(name));
                    child.as_mut()
                }
                None => node.children.entry((*segment).to_string()).or_default(),
            };
        }
        node.handler = Some(handler);
    }

    /// Find the handler for `segments`, recording parameter bindings.
    ///
    /// On success `params` holds exactly the bindings of the matched branch;
    /// bindings pushed on abandoned branches are popped again.
    pub(crate) fn search<'a>(&'a self, segments: &[&str], params: &mut ParamVec) -> Option<&'a Handler> {
        let Some((segment, rest)) = segments.split_first() else {
            return self.handler.as_ref();
        };

        if let Some(child) = self.children.get(*segment) {
            if let Some(handler) = child.search(rest, params) {
                return Some(handler);
            }
        }

        if let Some(child) = &self.param_child {
            let name = child.param_name.clone().unwrap_or_else(|| Arc::from(""));
            params.push((name, (*segment).to_string()));
            if let Some(handler) = child.search(rest, params) {
                return Some(handler);
            }
            params.pop();
        }

        None
    }

    /// Whether any route terminates at or below this node.
    pub(crate) fn matches(&self, segments: &[&str]) -> bool {
        let mut scratch = ParamVec::new();
        self.search(segments, &mut scratch).is_some()
    }

    /// Collect the pattern of every bound node, rebuilt from the current
    /// parameter names.
    pub(crate) fn patterns(&self) -> Vec<String> {
        let mut out = Vec::new();
        let mut prefix = Vec::new();
        self.collect(&mut prefix, &mut out);
        out
    }

    fn collect(&self, prefix: &mut Vec<String>, out: &mut Vec<String>) {
        if self.handler.is_some() {
            out.push(format!("/{}", prefix.join("/")));
        }

        let mut literals: Vec<(&String, &RouteNode)> = self.children.iter().collect();
        literals.sort_by(|a, b| a.0.cmp(b.0));
        for (segment, child) in literals {
            prefix.push(segment.clone());
            child.collect(prefix, out);
            prefix.pop();
        }

        if let Some(child) = &self.param_child {
            let name = child.param_name.as_deref().unwrap_or_default();
            prefix.push(format!("<{name}>"));
            child.collect(prefix, out);
            prefix.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Request, Response};

    fn handler(tag: &'static str) -> Handler {
        Arc::new(move |_req: &Request| -> anyhow::Result<Response> { Ok(Response::text(tag)) })
    }

    #[test]
    fn test_split_path_ignores_slash_variation() {
        let expected: Segments<'_> = SmallVec::from_slice(&["a", "b"]);
        assert_eq!(split_path("/a/b/"), expected);
        assert_eq!(split_path("a//b"), expected);
        assert_eq!(split_path("///a/b///"), expected);
        assert!(split_path("/").is_empty());
        assert!(split_path("").is_empty());
    }

    #[test]
    fn test_dot_segments_are_opaque() {
        let segments: Segments<'_> = SmallVec::from_slice(&["..", ".", "a\\b"]);
        assert_eq!(split_path("/.././a\\b"), segments);
    }

    #[test]
    fn test_param_name() {
        assert_eq!(param_name("<id>"), Some("id"));
        assert_eq!(param_name("<>"), Some(""));
        assert_eq!(param_name("<id"), None);
        assert_eq!(param_name("id"), None);
    }

    #[test]
    fn test_insert_and_search_binds_params() {
        let mut root = RouteNode::default();
        root.insert(&["user", "<uid>", "post", "<pid>"], handler("post"));

        let mut params = ParamVec::new();
        assert!(root.search(&["user", "u1", "post", "p9"], &mut params).is_some());
        let bound: Vec<(&str, &str)> = params.iter().map(|(k, v)| (k.as_ref(), v.as_str())).collect();
        assert_eq!(bound, vec![("uid", "u1"), ("pid", "p9")]);
    }

    #[test]
    fn test_failed_branch_bindings_are_discarded() {
        let mut root = RouteNode::default();
        root.insert(&["a", "<x>", "c"], handler("param"));
        root.insert(&["a", "b", "d"], handler("literal"));

        // "b" matches the literal child first, fails on "c", then backtracks.
        let mut params = ParamVec::new();
        assert!(root.search(&["a", "b", "c"], &mut params).is_some());
        assert_eq!(params.len(), 1);
        assert_eq!(params[0].1, "b");

        let mut params = ParamVec::new();
        assert!(root.search(&["a", "b", "x"], &mut params).is_none());
        assert!(params.is_empty());
    }

    #[test]
    fn test_no_prefix_matching() {
        let mut root = RouteNode::default();
        root.insert(&["a"], handler("a"));
        assert!(!root.matches(&["a", "b"]));
        assert!(!root.matches(&[]));
        assert!(root.matches(&["a"]));
    }

    #[test]
    fn test_patterns_use_latest_param_name() {
        let mut root = RouteNode::default();
        root.insert(&[], handler("root"));
        root.insert(&["item", "<id>"], handler("item"));
        root.insert(&["item", "<key>", "edit"], handler("edit"));
        root.insert(&["about"], handler("about"));
        assert_eq!(
            root.patterns(),
            vec!["/", "/about", "/item/<key>", "/item/<key>/edit"]
        );
    }
}
