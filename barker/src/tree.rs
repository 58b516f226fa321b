//! Hierarchical registry of running activities keyed by path segments.
//!
//! The tree only ever holds nodes that carry at least one activity or have
//! at least one child; removing the last activity of a branch prunes every
//! ancestor that becomes empty. The root always exists.

use std::collections::{HashMap, HashSet};

/// Name of the root node as it appears in a rendered tree
pub const ROOT_NAME: &str = "/";

/// Split a slash-delimited path into cleaned segments.
///
/// `.` segments are dropped, `..` removes the preceding segment, and `..`
/// above the root of an absolute path is discarded. Leading `..` segments of
/// a relative path are kept. Empty, `.` and `/` resolve to no segments.
pub fn split_path(path: &str) -> Vec<String> {
    let absolute = path.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();

    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => match segments.last() {
                Some(&last) if last != ".." => {
                    segments.pop();
                }
                _ if absolute => {}
                _ => segments.push(".."),
            },
            part => segments.push(part),
        }
    }

    segments.into_iter().map(str::to_owned).collect()
}

/// One path segment and the activities currently running at it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityNode {
    name: String,
    activities: HashSet<String>,
    children: HashMap<String, ActivityNode>,
}

impl ActivityNode {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            activities: HashSet::new(),
            children: HashMap::new(),
        }
    }

    /// The path segment this node stands for
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Activities at this exact node, sorted
    pub fn activities(&self) -> Vec<&str> {
        let mut activities: Vec<&str> = self.activities.iter().map(String::as_str).collect();
        activities.sort_unstable();
        activities
    }

    /// Children of this node, sorted by segment name
    pub fn children(&self) -> Vec<&ActivityNode> {
        let mut children: Vec<&ActivityNode> = self.children.values().collect();
        children.sort_unstable_by(|a, b| a.name.cmp(&b.name));
        children
    }

    /// A node with no activities and no children has no reason to exist
    fn is_prunable(&self) -> bool {
        self.activities.is_empty() && self.children.is_empty()
    }

    /// Apply an add/remove below this node.
    ///
    /// Returns whether this node is now prunable so the parent can drop it.
    fn update(&mut self, segments: &[String], activity: &str, add: bool) -> bool {
        match segments.split_first() {
            None => {
                if add {
                    self.activities.insert(activity.to_owned());
                } else {
                    self.activities.remove(activity);
                }
            }
            Some((head, rest)) => {
                let child = if add {
                    Some(
                        self.children
                            .entry(head.clone())
                            .or_insert_with(|| ActivityNode::new(head.clone())),
                    )
                } else {
                    // Nothing to remove below a missing segment
                    self.children.get_mut(head)
                };

                if let Some(child) = child {
                    if child.update(rest, activity, add) {
                        self.children.remove(head);
                    }
                }
            }
        }

        self.is_prunable()
    }

    fn find(&self, segments: &[String]) -> Option<&ActivityNode> {
        match segments.split_first() {
            None => Some(self),
            Some((head, rest)) => self.children.get(head)?.find(rest),
        }
    }

    fn count(&self) -> usize {
        1 + self.children.values().map(ActivityNode::count).sum::<usize>()
    }

    fn render_into(&self, out: &mut String, depth: usize) {
        out.push_str(&"  ".repeat(depth));
        out.push_str(&self.name);
        if !self.activities.is_empty() {
            out.push_str(" [");
            out.push_str(&self.activities().join(", "));
            out.push(']');
        }
        out.push('\n');

        for child in self.children() {
            child.render_into(out, depth + 1);
        }
    }
}

/// The activity registry owned by the aggregator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityTree {
    root: ActivityNode,
}

impl Default for ActivityTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityTree {
    pub fn new() -> Self {
        Self {
            root: ActivityNode::new(ROOT_NAME),
        }
    }

    pub fn root(&self) -> &ActivityNode {
        &self.root
    }

    /// Install (`add = true`) or remove `activity` at `path`.
    ///
    /// Intermediate nodes are created on add. On remove, nodes left without
    /// activities and children are pruned up to (but excluding) the root.
    /// Removing something that is not there is a no-op.
    pub fn update(&mut self, path: &str, activity: &str, add: bool) {
        let segments = split_path(path);
        // The root has no parent to prune it, so its verdict is ignored
        let _ = self.root.update(&segments, activity, add);
    }

    /// `true` when nothing is running anywhere
    pub fn is_empty(&self) -> bool {
        self.root.is_prunable()
    }

    /// Sorted activities at the exact node `path` resolves to, if that node exists
    pub fn activities_at(&self, path: &str) -> Option<Vec<String>> {
        self.root.find(&split_path(path)).map(|node| {
            node.activities()
                .into_iter()
                .map(str::to_owned)
                .collect()
        })
    }

    /// Number of nodes, root included
    pub fn node_count(&self) -> usize {
        self.root.count()
    }

    /// Render the tree, one line per node.
    ///
    /// Each line is `<indent><name>` followed by ` [a, b]` when the node has
    /// activities; indent is two spaces per depth level. Activities and
    /// children are sorted so the output does not depend on insertion order.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.root.render_into(&mut out, 0);
        out
    }
}
