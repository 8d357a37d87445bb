//! Static link ordering
//!
//! A single-pass linker resolves symbols left to right, so every static
//! archive must appear after every archive that needs it. [`transitive_orders`]
//! expands direct dependency lists into each node's full link order, and
//! [`order_deps`] combines those orders for one node's declared dependencies.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// Result of ordering one node's static dependencies
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderedDeps<N> {
    /// Transitive closure in link order
    pub all: Vec<N>,
    /// `all` restricted to the node's declared direct dependencies
    pub declared: Vec<N>,
}

/// Order `direct` and its transitive closure for a one-pass link
///
/// `transitive` maps each node to its own transitive dependencies, already in
/// link order. Lists are not expanded further, so cyclic maps need no special
/// handling. Dependencies are placed after everything that needs them;
/// unrelated nodes keep their relative order. Duplicates keep their last
/// position.
pub fn order_deps<N>(direct: &[N], transitive: &HashMap<N, Vec<N>>) -> OrderedDeps<N>
where
    N: Clone + Eq + Hash,
{
    let mut all = Vec::new();
    for dep in direct {
        all.push(dep.clone());
        if let Some(order) = transitive.get(dep) {
            all.extend(order.iter().cloned());
        }
    }
    let all = last_unique(all);

    let direct_set: HashSet<&N> = direct.iter().collect();
    let declared = all
        .iter()
        .filter(|n| direct_set.contains(n))
        .cloned()
        .collect();

    OrderedDeps { all, declared }
}

/// Full link order of every node reachable from `roots`
///
/// `deps_by_node` holds direct dependency lists. Nodes are resolved depth
/// first in `roots` order. A node reached again while it is still being
/// expanded is listed but not expanded a second time, so cycles terminate.
pub fn transitive_orders<N>(roots: &[N], deps_by_node: &HashMap<N, Vec<N>>) -> HashMap<N, Vec<N>>
where
    N: Clone + Eq + Hash,
{
    let mut resolver = Resolver {
        deps_by_node,
        memo: HashMap::new(),
        active: HashSet::new(),
    };
    for root in roots {
        resolver.closure(root);
    }
    resolver.memo
}

struct Resolver<'a, N> {
    deps_by_node: &'a HashMap<N, Vec<N>>,
    memo: HashMap<N, Vec<N>>,
    /// Nodes on the current recursion stack
    active: HashSet<N>,
}

impl<N: Clone + Eq + Hash> Resolver<'_, N> {
    fn closure(&mut self, node: &N) -> Vec<N> {
        if let Some(order) = self.memo.get(node) {
            return order.clone();
        }
        if !self.active.insert(node.clone()) {
            return Vec::new();
        }

        let mut order = Vec::new();
        if let Some(deps) = self.deps_by_node.get(node) {
            for dep in deps {
                order.push(dep.clone());
                order.extend(self.closure(dep));
            }
        }

        self.active.remove(node);
        let order = last_unique(order);
        self.memo.insert(node.clone(), order.clone());
        order
    }
}

/// Remove duplicates, keeping the first occurrence of each element
pub fn first_unique<N: Clone + Eq + Hash>(items: impl IntoIterator<Item = N>) -> Vec<N> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

/// Remove duplicates, keeping the last occurrence of each element
pub fn last_unique<N: Clone + Eq + Hash>(items: impl IntoIterator<Item = N>) -> Vec<N> {
    let items: Vec<N> = items.into_iter().collect();
    let mut kept = first_unique(items.into_iter().rev());
    kept.reverse();
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case(&["a"], &["a"])]
    #[case(&["a", "b"], &["a", "b"])]
    #[case(&["a", "a"], &["a"])]
    #[case(&["a", "b", "a"], &["a", "b"])]
    #[case(&["b", "a", "a"], &["b", "a"])]
    #[case(&["a", "a", "b"], &["a", "b"])]
    #[case(&["a", "b", "a", "b"], &["a", "b"])]
    #[case(
        &["liblog", "libdl", "libc++", "libdl", "libc", "libm"],
        &["liblog", "libdl", "libc++", "libc", "libm"]
    )]
    fn test_first_unique(#[case] input: &[&str], #[case] expected: &[&str]) {
        assert_eq!(first_unique(input.iter().copied()), expected.to_vec());
    }

    #[rstest]
    #[case(&["a"], &["a"])]
    #[case(&["a", "b"], &["a", "b"])]
    #[case(&["a", "a"], &["a"])]
    #[case(&["a", "b", "a"], &["b", "a"])]
    #[case(&["b", "a", "a"], &["b", "a"])]
    #[case(&["a", "a", "b"], &["a", "b"])]
    #[case(&["a", "b", "a", "b"], &["a", "b"])]
    #[case(
        &["liblog", "libdl", "libc++", "libdl", "libc", "libm"],
        &["liblog", "libc++", "libdl", "libc", "libm"]
    )]
    fn test_last_unique(#[case] input: &[&str], #[case] expected: &[&str]) {
        assert_eq!(last_unique(input.iter().copied()), expected.to_vec());
    }

    #[test]
    fn test_self_loop_terminates() {
        let mut deps = HashMap::new();
        deps.insert("a", vec!["a"]);
        let ordered = order_deps(&["a"], &deps);
        assert_eq!(ordered.all, vec!["a"]);
        assert_eq!(ordered.declared, vec!["a"]);
    }

    #[test]
    fn test_transitive_orders_expand_direct_lists() {
        let mut deps = HashMap::new();
        deps.insert("a", vec!["b", "c"]);
        deps.insert("b", vec!["c"]);
        deps.insert("c", vec!["d"]);

        let orders = transitive_orders(&["a"], &deps);
        assert_eq!(orders["a"], vec!["b", "c", "d"]);
        assert_eq!(orders["b"], vec!["c", "d"]);
        assert_eq!(orders["d"], Vec::<&str>::new());
    }

    #[test]
    fn test_transitive_orders_terminate_on_cycles() {
        let mut deps = HashMap::new();
        deps.insert("a", vec!["b"]);
        deps.insert("b", vec!["c"]);
        deps.insert("c", vec!["a"]);

        let orders = transitive_orders(&["b"], &deps);
        // the revisited node is emitted but not expanded again
        assert_eq!(orders["b"], vec!["c", "a", "b"]);
        assert_eq!(orders["c"], vec!["a", "b"]);
        assert_eq!(orders["a"], vec!["b"]);
    }

    #[test]
    fn test_empty_input() {
        let deps: HashMap<&str, Vec<&str>> = HashMap::new();
        let ordered = order_deps(&[], &deps);
        assert!(ordered.all.is_empty());
        assert!(ordered.declared.is_empty());
    }
}
