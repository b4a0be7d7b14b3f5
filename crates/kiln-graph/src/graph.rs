//! URL-keyed dependency graph with mirrored edges.
//!
//! Nodes live in a single map keyed by served URL and are never removed; only
//! edges are pruned. Every edge is stored twice (`dependencies` on the importer,
//! `dependents` on the imported module) and both halves are always updated
//! together. Adding an edge that exists or removing one that doesn't is a no-op.

use indexmap::IndexSet;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::message::HmrMessage;

/// A served module and its import edges.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyNode {
    /// URLs that import this module.
    pub dependents: IndexSet<String>,
    /// URLs this module imports.
    pub dependencies: IndexSet<String>,
    /// The module uses `import.meta.hot` and can receive update messages.
    pub is_hmr_enabled: bool,
    /// The module registered itself as an update boundary.
    pub is_hmr_accepted: bool,
    pending_replacement_count: u32,
}

impl DependencyNode {
    /// True while at least one change is waiting for this module to be re-fetched.
    pub fn needs_replacement(&self) -> bool {
        self.pending_replacement_count > 0
    }

    pub fn pending_replacement_count(&self) -> u32 {
        self.pending_replacement_count
    }
}

/// Arena of [`DependencyNode`]s indexed by served URL.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    nodes: FxHashMap<String, DependencyNode>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_entry(&self, url: &str) -> Option<&DependencyNode> {
        self.nodes.get(url)
    }

    pub fn contains(&self, url: &str) -> bool {
        self.nodes.contains_key(url)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn entry_mut(&mut self, url: &str) -> &mut DependencyNode {
        self.nodes.entry(url.to_string()).or_default()
    }

    /// Record the imports of `url` after a (re)build.
    ///
    /// Diffs the previous dependency set against `imports`, adding mirrored
    /// edges for new imports and removing them for imports that disappeared.
    pub fn set_entry<I, S>(&mut self, url: &str, imports: I, is_hmr_enabled: bool)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let next: IndexSet<String> = imports.into_iter().map(Into::into).collect();
        let previous = self.entry_mut(url).dependencies.clone();

        for stale in previous.iter().filter(|dep| !next.contains(*dep)) {
            self.remove_edge(url, stale);
        }
        for added in next.iter().filter(|dep| !previous.contains(*dep)) {
            self.add_edge(url, added);
        }

        self.entry_mut(url).is_hmr_enabled = is_hmr_enabled;
    }

    /// Add the edge `from` imports `to`. Creates either node if missing.
    pub fn add_edge(&mut self, from: &str, to: &str) {
        self.entry_mut(from).dependencies.insert(to.to_string());
        self.entry_mut(to).dependents.insert(from.to_string());
    }

    /// Remove the edge `from` imports `to`, if present.
    pub fn remove_edge(&mut self, from: &str, to: &str) {
        if let Some(node) = self.nodes.get_mut(from) {
            node.dependencies.shift_remove(to);
        }
        if let Some(node) = self.nodes.get_mut(to) {
            node.dependents.shift_remove(from);
        }
    }

    /// Increment (`true`) or decrement (`false`) the pending replacement count.
    ///
    /// Overlapping changes to a shared dependency each hold their own mark, so
    /// one request completing doesn't clear another's pending state.
    pub fn mark_entry_for_replacement(&mut self, url: &str, state: bool) {
        let Some(node) = self.nodes.get_mut(url) else {
            return;
        };
        if state {
            node.pending_replacement_count += 1;
        } else {
            node.pending_replacement_count = node.pending_replacement_count.saturating_sub(1);
        }
    }

    /// Handle `{type: "hotAccept"}` from a client: the module becomes an update boundary.
    pub fn accept(&mut self, url: &str) {
        let node = self.entry_mut(url);
        node.is_hmr_accepted = true;
        node.is_hmr_enabled = true;
    }

    /// Propagate a change to `url` through its dependents.
    ///
    /// Emits an update for every HMR-enabled module on the way, stops at
    /// modules that accept their own updates, and emits a reload when a path
    /// reaches a module nobody imports without crossing a boundary.
    pub fn bubble(&mut self, url: &str) -> Vec<HmrMessage> {
        let mut visited = FxHashSet::default();
        let mut messages = Vec::new();
        self.bubble_into(url, &mut visited, &mut messages);
        messages
    }

    fn bubble_into(
        &mut self,
        url: &str,
        visited: &mut FxHashSet<String>,
        messages: &mut Vec<HmrMessage>,
    ) {
        if !visited.insert(url.to_string()) {
            return;
        }

        let Some(node) = self.nodes.get(url) else {
            messages.push(HmrMessage::Reload);
            return;
        };

        if node.is_hmr_enabled {
            messages.push(HmrMessage::update(url));
        }
        if node.is_hmr_accepted {
            return;
        }
        if node.dependents.is_empty() {
            messages.push(HmrMessage::Reload);
            return;
        }

        let dependents: Vec<String> = node.dependents.iter().cloned().collect();
        self.mark_entry_for_replacement(url, true);
        for dependent in dependents {
            self.bubble_into(&dependent, visited, messages);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> DependencyGraph {
        // a imports b, b imports c
        let mut graph = DependencyGraph::new();
        graph.set_entry("/a.js", ["/b.js"], true);
        graph.set_entry("/b.js", ["/c.js"], false);
        graph.set_entry("/c.js", Vec::<String>::new(), false);
        graph
    }

    #[test]
    fn test_set_entry_replaces_edges() {
        let mut graph = DependencyGraph::new();
        graph.set_entry("/a.js", ["/b.js"], true);
        graph.set_entry("/a.js", ["/c.js"], true);

        let b = graph.get_entry("/b.js").unwrap();
        assert!(!b.dependents.contains("/a.js"));

        let c = graph.get_entry("/c.js").unwrap();
        assert!(c.dependents.contains("/a.js"));

        let a = graph.get_entry("/a.js").unwrap();
        assert_eq!(a.dependencies.iter().collect::<Vec<_>>(), vec!["/c.js"]);
    }

    #[test]
    fn test_nodes_survive_edge_removal() {
        let mut graph = DependencyGraph::new();
        graph.set_entry("/a.js", ["/b.js"], false);
        graph.set_entry("/a.js", Vec::<String>::new(), false);

        assert!(graph.contains("/b.js"));
        assert!(graph.get_entry("/b.js").unwrap().dependents.is_empty());
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn test_edge_operations_are_idempotent() {
        let mut graph = DependencyGraph::new();
        graph.add_edge("/a.js", "/b.js");
        graph.add_edge("/a.js", "/b.js");
        assert_eq!(graph.get_entry("/a.js").unwrap().dependencies.len(), 1);
        assert_eq!(graph.get_entry("/b.js").unwrap().dependents.len(), 1);

        graph.remove_edge("/a.js", "/b.js");
        graph.remove_edge("/a.js", "/b.js");
        graph.remove_edge("/missing.js", "/b.js");
        assert!(graph.get_entry("/a.js").unwrap().dependencies.is_empty());
        assert!(graph.get_entry("/b.js").unwrap().dependents.is_empty());
    }

    #[test]
    fn test_set_entry_updates_hmr_flag() {
        let mut graph = DependencyGraph::new();
        graph.set_entry("/a.js", Vec::<String>::new(), true);
        assert!(graph.get_entry("/a.js").unwrap().is_hmr_enabled);
        graph.set_entry("/a.js", Vec::<String>::new(), false);
        assert!(!graph.get_entry("/a.js").unwrap().is_hmr_enabled);
    }

    #[test]
    fn test_replacement_counting() {
        let mut graph = DependencyGraph::new();
        graph.set_entry("/a.js", Vec::<String>::new(), false);

        graph.mark_entry_for_replacement("/a.js", true);
        graph.mark_entry_for_replacement("/a.js", true);
        graph.mark_entry_for_replacement("/a.js", false);
        assert!(graph.get_entry("/a.js").unwrap().needs_replacement());

        graph.mark_entry_for_replacement("/a.js", false);
        assert!(!graph.get_entry("/a.js").unwrap().needs_replacement());

        graph.mark_entry_for_replacement("/a.js", false);
        assert_eq!(graph.get_entry("/a.js").unwrap().pending_replacement_count(), 0);
    }

    #[test]
    fn test_bubble_escalates_to_single_reload() {
        let mut graph = chain();
        let messages = graph.bubble("/c.js");

        let reloads = messages.iter().filter(|m| m.is_reload()).count();
        assert_eq!(reloads, 1);
        assert_eq!(messages.last(), Some(&HmrMessage::Reload));
    }

    #[test]
    fn test_bubble_stops_at_accept_boundary() {
        let mut graph = chain();
        graph.accept("/b.js");

        let messages = graph.bubble("/c.js");
        assert_eq!(messages, vec![HmrMessage::update("/b.js")]);
        assert!(!graph.get_entry("/a.js").unwrap().needs_replacement());
    }

    #[test]
    fn test_bubble_marks_intermediate_nodes() {
        let mut graph = chain();
        graph.accept("/b.js");
        graph.bubble("/c.js");

        assert!(graph.get_entry("/c.js").unwrap().needs_replacement());
        assert!(!graph.get_entry("/b.js").unwrap().needs_replacement());
    }

    #[test]
    fn test_bubble_self_accepting_module() {
        let mut graph = DependencyGraph::new();
        graph.set_entry("/style.css.proxy.js", Vec::<String>::new(), true);
        graph.accept("/style.css.proxy.js");

        assert_eq!(
            graph.bubble("/style.css.proxy.js"),
            vec![HmrMessage::update("/style.css.proxy.js")]
        );
    }

    #[test]
    fn test_bubble_terminates_on_cycle() {
        let mut graph = DependencyGraph::new();
        graph.set_entry("/a.js", ["/b.js"], false);
        graph.set_entry("/b.js", ["/a.js"], false);

        // Neither module has a root dependent, so the walk just stops.
        let messages = graph.bubble("/a.js");
        assert!(messages.is_empty());
    }

    #[test]
    fn test_bubble_unknown_url_reloads() {
        let mut graph = DependencyGraph::new();
        assert_eq!(graph.bubble("/nowhere.js"), vec![HmrMessage::Reload]);
    }
}
