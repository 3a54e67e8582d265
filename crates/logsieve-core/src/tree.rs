use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::debug;

use logsieve_types::{ChangeEvent, NodeState};

/// Snapshot of a single tree node, for display and inspection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeView {
    /// Last path segment, e.g. "Pool" for "App.Db.Pool"
    pub name: String,

    /// Full dotted path from the root
    pub path: String,

    /// Current enable state
    pub state: NodeState,

    /// Number of direct children
    pub child_count: usize,
}

/// One node in the namespace arena.
struct Node {
    name: String,
    path: String,
    state: NodeState,
    parent: Option<usize>,
    children: BTreeMap<String, usize>,
}

struct TreeInner {
    /// Arena storage; index 0 is the synthetic root
    nodes: Vec<Node>,

    /// Full dotted path -> arena index, non-root nodes only
    index: HashMap<String, usize>,

    /// Change notification channel, if wired up
    notifier: Option<mpsc::UnboundedSender<ChangeEvent>>,
}

impl TreeInner {
    fn fresh() -> Self {
        Self {
            nodes: vec![Node {
                name: String::new(),
                path: String::new(),
                state: NodeState::Checked,
                parent: None,
                children: BTreeMap::new(),
            }],
            index: HashMap::new(),
            notifier: None,
        }
    }

    fn view(&self, idx: usize) -> NodeView {
        let node = &self.nodes[idx];
        NodeView {
            name: node.name.clone(),
            path: node.path.clone(),
            state: node.state,
            child_count: node.children.len(),
        }
    }

    /// Force `state` onto a node and its whole subtree.
    fn force_down(&mut self, idx: usize, state: NodeState) {
        let mut pending = vec![idx];
        while let Some(i) = pending.pop() {
            self.nodes[i].state = state;
            pending.extend(self.nodes[i].children.values().copied());
        }
    }

    /// Recompute a node's state from its children.
    fn recompute(&self, idx: usize) -> NodeState {
        let mut saw_checked = false;
        let mut saw_unchecked = false;
        let mut saw_mixed = false;
        for &child in self.nodes[idx].children.values() {
            match self.nodes[child].state {
                NodeState::Checked => saw_checked = true,
                NodeState::Unchecked => saw_unchecked = true,
                NodeState::Indeterminate => saw_mixed = true,
            }
        }
        match (saw_checked, saw_unchecked, saw_mixed) {
            // childless nodes keep whatever state they hold
            (false, false, false) => self.nodes[idx].state,
            (true, false, false) => NodeState::Checked,
            (false, true, false) => NodeState::Unchecked,
            _ => NodeState::Indeterminate,
        }
    }

    fn send(&self, event: ChangeEvent) {
        if let Some(tx) = &self.notifier {
            let _ = tx.send(event);
        }
    }
}

/// Hierarchical registry of dot-separated logger names.
///
/// Every logger path maps to one node; enabling or disabling a node cascades
/// to its whole subtree, and ancestors track whether their descendants are
/// uniformly enabled, uniformly disabled, or mixed. Cheap to clone; clones
/// share state.
#[derive(Clone)]
pub struct LoggerTree {
    inner: Arc<RwLock<TreeInner>>,
}

impl LoggerTree {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(TreeInner::fresh())),
        }
    }

    /// Wire up the channel that receives state-change notifications.
    pub fn set_notifier(&self, tx: mpsc::UnboundedSender<ChangeEvent>) {
        self.inner.write().notifier = Some(tx);
    }

    /// Register a dotted logger path, creating any missing nodes.
    ///
    /// Newly created nodes inherit Unchecked from an Unchecked parent and
    /// start Checked otherwise, so a freshly seen logger under a disabled
    /// subtree stays hidden. Returns true if the leaf node was created by
    /// this call; registering a known path is a no-op returning false, as is
    /// a name with an empty segment. Records under such a name still flow,
    /// they just cannot be toggled.
    pub fn register(&self, path: &str) -> bool {
        // empty segments ("", ".", ".A") would build nodes whose paths
        // collide with the root's or each other's in the index
        if path.split('.').any(str::is_empty) {
            return false;
        }
        let mut inner = self.inner.write();
        if inner.index.contains_key(path) {
            return false;
        }

        let mut parent = 0usize;
        let mut full = String::new();
        let mut created_leaf = false;
        for segment in path.split('.') {
            if !full.is_empty() {
                full.push('.');
            }
            full.push_str(segment);

            match inner.nodes[parent].children.get(segment).copied() {
                Some(child) => {
                    parent = child;
                    created_leaf = false;
                }
                None => {
                    let state = match inner.nodes[parent].state {
                        NodeState::Unchecked => NodeState::Unchecked,
                        _ => NodeState::Checked,
                    };
                    let child = inner.nodes.len();
                    inner.nodes.push(Node {
                        name: segment.to_string(),
                        path: full.clone(),
                        state,
                        parent: Some(parent),
                        children: BTreeMap::new(),
                    });
                    inner.nodes[parent].children.insert(segment.to_string(), child);
                    inner.index.insert(full.clone(), child);
                    parent = child;
                    created_leaf = true;
                }
            }
        }

        if created_leaf {
            debug!(logger = path, "registered new logger");
        }
        created_leaf
    }

    /// Enable or disable a node and its whole subtree.
    ///
    /// The state is forced onto every descendant, then ancestors are
    /// recomputed from their children. The climb stops once a recompute
    /// leaves an ancestor unchanged, except that the root always gets a
    /// final recompute. Returns false if the path is unknown.
    pub fn set_state(&self, path: &str, enabled: bool) -> bool {
        let mut inner = self.inner.write();
        let Some(&idx) = inner.index.get(path) else {
            return false;
        };

        let state = NodeState::from_enabled(enabled);
        inner.force_down(idx, state);

        let mut cursor = inner.nodes[idx].parent;
        while let Some(ancestor) = cursor {
            let next = inner.recompute(ancestor);
            if inner.nodes[ancestor].state == next {
                if ancestor == 0 {
                    break;
                }
                // stop climbing, but the root still gets recomputed
                cursor = Some(0);
                continue;
            }
            inner.nodes[ancestor].state = next;
            cursor = inner.nodes[ancestor].parent;
        }

        inner.send(ChangeEvent::StateChanged {
            path: path.to_string(),
            state,
        });
        true
    }

    /// Whether records from this logger should pass the namespace filter.
    ///
    /// Exact lookup: a path that has never been registered defaults to
    /// enabled, so records are visible before the consumer has toggled
    /// anything.
    pub fn is_enabled(&self, path: &str) -> bool {
        let inner = self.inner.read();
        match inner.index.get(path) {
            Some(&idx) => inner.nodes[idx].state == NodeState::Checked,
            None => true,
        }
    }

    /// Look up a single node by full path. Empty path returns the root.
    pub fn node(&self, path: &str) -> Option<NodeView> {
        let inner = self.inner.read();
        if path.is_empty() {
            return Some(inner.view(0));
        }
        inner.index.get(path).map(|&idx| inner.view(idx))
    }

    /// Direct children of a node, sorted by segment. Empty path lists the
    /// top-level loggers; an unknown path yields an empty list.
    pub fn children(&self, path: &str) -> Vec<NodeView> {
        let inner = self.inner.read();
        let idx = if path.is_empty() {
            Some(0)
        } else {
            inner.index.get(path).copied()
        };
        match idx {
            Some(idx) => inner.nodes[idx]
                .children
                .values()
                .map(|&child| inner.view(child))
                .collect(),
            None => Vec::new(),
        }
    }

    /// All nodes whose full path contains `text`, case-insensitive, sorted
    /// by path.
    pub fn search(&self, text: &str) -> Vec<NodeView> {
        let needle = text.to_lowercase();
        let inner = self.inner.read();
        let mut found: Vec<NodeView> = inner
            .index
            .iter()
            .filter(|(path, _)| path.to_lowercase().contains(&needle))
            .map(|(_, &idx)| inner.view(idx))
            .collect();
        found.sort_by(|a, b| a.path.cmp(&b.path));
        found
    }

    /// Number of registered nodes, excluding the root.
    pub fn len(&self) -> usize {
        self.inner.read().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().index.is_empty()
    }

    /// Drop every node and start over with a fresh Checked root. Keeps the
    /// notifier wiring.
    pub fn reset(&self) {
        let mut inner = self.inner.write();
        let notifier = inner.notifier.take();
        *inner = TreeInner::fresh();
        inner.notifier = notifier;
    }
}

impl Default for LoggerTree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_of(tree: &LoggerTree, path: &str) -> NodeState {
        tree.node(path).unwrap().state
    }

    #[test]
    fn test_register_is_idempotent() {
        let tree = LoggerTree::new();
        assert!(tree.register("A.B.C"));
        assert!(!tree.register("A.B.C"));
        assert_eq!(tree.len(), 3);
    }

    #[test]
    fn test_register_reuses_existing_prefix() {
        let tree = LoggerTree::new();
        assert!(tree.register("A.B.C"));
        assert!(tree.register("A.B.D"));
        assert_eq!(tree.len(), 4);
        let names: Vec<String> = tree
            .children("A.B")
            .into_iter()
            .map(|n| n.name)
            .collect();
        assert_eq!(names, vec!["C", "D"]);
    }

    #[test]
    fn test_set_state_marks_ancestors_mixed() {
        let tree = LoggerTree::new();
        tree.register("A.B.C");
        tree.register("A.B.D");

        assert!(tree.set_state("A.B.C", false));

        assert_eq!(state_of(&tree, "A.B.C"), NodeState::Unchecked);
        assert_eq!(state_of(&tree, "A.B.D"), NodeState::Checked);
        assert_eq!(state_of(&tree, "A.B"), NodeState::Indeterminate);
        assert_eq!(state_of(&tree, "A"), NodeState::Indeterminate);
    }

    #[test]
    fn test_set_state_cascades_down_and_back() {
        let tree = LoggerTree::new();
        tree.register("A.B.C");
        tree.register("A.B.D");
        tree.register("A.E");

        tree.set_state("A", false);
        for path in ["A", "A.B", "A.B.C", "A.B.D", "A.E"] {
            assert_eq!(state_of(&tree, path), NodeState::Unchecked, "{path}");
        }

        tree.set_state("A", true);
        for path in ["A", "A.B", "A.B.C", "A.B.D", "A.E"] {
            assert_eq!(state_of(&tree, path), NodeState::Checked, "{path}");
        }
    }

    #[test]
    fn test_reenabling_leaf_restores_ancestors() {
        let tree = LoggerTree::new();
        tree.register("A.B.C");
        tree.register("A.B.D");

        tree.set_state("A.B.C", false);
        tree.set_state("A.B.C", true);

        assert_eq!(state_of(&tree, "A.B"), NodeState::Checked);
        assert_eq!(state_of(&tree, "A"), NodeState::Checked);
    }

    #[test]
    fn test_new_nodes_inherit_disabled_parent() {
        let tree = LoggerTree::new();
        tree.register("A.B");
        tree.set_state("A", false);

        tree.register("A.B.New");
        tree.register("A.Other");

        assert_eq!(state_of(&tree, "A.B.New"), NodeState::Unchecked);
        assert_eq!(state_of(&tree, "A.Other"), NodeState::Unchecked);
        assert!(!tree.is_enabled("A.B.New"));
        assert!(!tree.is_enabled("A.Other"));
    }

    #[test]
    fn test_new_node_under_mixed_parent_starts_checked() {
        let tree = LoggerTree::new();
        tree.register("A.B");
        tree.register("A.C");
        tree.set_state("A.B", false);
        assert_eq!(state_of(&tree, "A"), NodeState::Indeterminate);

        tree.register("A.D");
        assert_eq!(state_of(&tree, "A.D"), NodeState::Checked);
        assert_eq!(state_of(&tree, "A"), NodeState::Indeterminate);
    }

    #[test]
    fn test_unknown_logger_defaults_to_enabled() {
        let tree = LoggerTree::new();
        assert!(tree.is_enabled("Never.Seen"));
        tree.register("Never.Seen");
        assert!(tree.is_enabled("Never.Seen"));
    }

    #[test]
    fn test_indeterminate_node_is_not_enabled() {
        let tree = LoggerTree::new();
        tree.register("A.B");
        tree.register("A.C");
        tree.set_state("A.B", false);
        assert!(!tree.is_enabled("A"));
        assert!(tree.is_enabled("A.C"));
    }

    #[test]
    fn test_root_tracks_overall_state() {
        let tree = LoggerTree::new();
        tree.register("A.B");
        tree.register("C");

        tree.set_state("A", false);
        assert_eq!(state_of(&tree, ""), NodeState::Indeterminate);

        tree.set_state("C", false);
        assert_eq!(state_of(&tree, ""), NodeState::Unchecked);

        tree.set_state("A", true);
        assert_eq!(state_of(&tree, ""), NodeState::Indeterminate);
    }

    #[test]
    fn test_set_state_on_unknown_path() {
        let tree = LoggerTree::new();
        assert!(!tree.set_state("No.Such", false));
    }

    #[test]
    fn test_empty_path_registers_nothing() {
        let tree = LoggerTree::new();
        assert!(!tree.register(""));
        assert!(tree.is_empty());
    }

    #[test]
    fn test_empty_segments_are_rejected() {
        let tree = LoggerTree::new();
        assert!(!tree.register("."));
        assert!(!tree.register(".A"));
        assert!(!tree.register("A..B"));
        assert!(!tree.register("A."));

        // nothing reachable from the root, nothing indexed
        assert!(tree.is_empty());
        assert!(tree.children("").is_empty());

        // a real top-level name still registers cleanly afterwards
        assert!(tree.register("A"));
        assert_eq!(tree.node("A").unwrap().path, "A");
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_search_is_case_insensitive() {
        let tree = LoggerTree::new();
        tree.register("App.Db.Pool");
        tree.register("App.Http");

        let hits = tree.search("db");
        let paths: Vec<String> = hits.into_iter().map(|n| n.path).collect();
        assert_eq!(paths, vec!["App.Db", "App.Db.Pool"]);

        assert!(tree.search("zzz").is_empty());
    }

    #[test]
    fn test_reset_drops_all_nodes() {
        let tree = LoggerTree::new();
        tree.register("A.B");
        tree.set_state("A.B", false);
        tree.reset();

        assert!(tree.is_empty());
        assert!(tree.children("").is_empty());
        assert!(tree.is_enabled("A.B"));
    }

    #[test]
    fn test_state_change_notification() {
        let tree = LoggerTree::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        tree.set_notifier(tx);
        tree.register("A.B");

        tree.set_state("A.B", false);

        let event = rx.try_recv().unwrap();
        assert_eq!(
            event,
            ChangeEvent::StateChanged {
                path: "A.B".to_string(),
                state: NodeState::Unchecked,
            }
        );
    }

    #[test]
    fn test_register_on_racing_clones() {
        let tree = LoggerTree::new();
        let clone = tree.clone();
        let handle = std::thread::spawn(move || {
            for i in 0..200 {
                clone.register(&format!("Load.Worker{i}"));
            }
        });
        for i in 0..200 {
            tree.register(&format!("Load.Worker{i}"));
        }
        handle.join().unwrap();

        // 200 leaves plus the shared "Load" parent, each exactly once
        assert_eq!(tree.len(), 201);
        assert_eq!(tree.children("Load").len(), 200);
    }
}
