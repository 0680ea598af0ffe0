//! Columnar decision tree.
//!
//! A [`Tree`] stores every node attribute in its own [`ColumnStore`], indexed
//! by node id. Node 0 is the root; ids are assigned sequentially by
//! [`Tree::alloc_node`] and never reused. Variable-length node data (leaf
//! vectors and category lists) lives in shared append-only stores addressed
//! by per-node `[begin, end)` offsets.
//!
//! Category ranges must be assigned in ascending node-id order within a tree:
//! [`Tree::set_categorical_split`] refuses to run if any later node already
//! owns categories, which keeps the category offsets non-decreasing.

use crate::core::column_store::ColumnStore;
use crate::core::constants::{MAX_SPLIT_INDEX, NO_CHILD};
use crate::core::error::{FormatError, Result, TreeliteError};
use crate::core::types::{NodeId, Operator, TreeNodeType, TypedValue};
use crate::ensure;

/// A single decision tree stored as parallel node columns.
///
/// `T` is the threshold type and `L` the leaf output type.
#[derive(Debug, Clone, PartialEq)]
pub struct Tree<T, L> {
    pub(crate) num_nodes: i32,
    pub(crate) has_categorical_split: bool,

    pub(crate) node_type: ColumnStore<TreeNodeType>,
    pub(crate) cleft: ColumnStore<i32>,
    pub(crate) cright: ColumnStore<i32>,
    pub(crate) split_index: ColumnStore<i32>,
    pub(crate) default_left: ColumnStore<bool>,
    pub(crate) leaf_value: ColumnStore<L>,
    pub(crate) threshold: ColumnStore<T>,
    pub(crate) cmp: ColumnStore<Operator>,
    pub(crate) category_list_right_child: ColumnStore<bool>,

    pub(crate) leaf_vector: ColumnStore<L>,
    pub(crate) leaf_vector_begin: ColumnStore<u64>,
    pub(crate) leaf_vector_end: ColumnStore<u64>,
    pub(crate) category_list: ColumnStore<u32>,
    pub(crate) category_list_begin: ColumnStore<u64>,
    pub(crate) category_list_end: ColumnStore<u64>,

    pub(crate) data_count: ColumnStore<u64>,
    pub(crate) data_count_present: ColumnStore<bool>,
    pub(crate) sum_hess: ColumnStore<f64>,
    pub(crate) sum_hess_present: ColumnStore<bool>,
    pub(crate) gain: ColumnStore<f64>,
    pub(crate) gain_present: ColumnStore<bool>,

    pub(crate) num_opt_field_per_tree: i32,
    pub(crate) num_opt_field_per_node: i32,
}

impl<T: TypedValue, L: TypedValue> Default for Tree<T, L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TypedValue, L: TypedValue> Tree<T, L> {
    /// Create a tree with no nodes.
    pub fn new() -> Self {
        Self {
            num_nodes: 0,
            has_categorical_split: false,
            node_type: ColumnStore::new(),
            cleft: ColumnStore::new(),
            cright: ColumnStore::new(),
            split_index: ColumnStore::new(),
            default_left: ColumnStore::new(),
            leaf_value: ColumnStore::new(),
            threshold: ColumnStore::new(),
            cmp: ColumnStore::new(),
            category_list_right_child: ColumnStore::new(),
            leaf_vector: ColumnStore::new(),
            leaf_vector_begin: ColumnStore::new(),
            leaf_vector_end: ColumnStore::new(),
            category_list: ColumnStore::new(),
            category_list_begin: ColumnStore::new(),
            category_list_end: ColumnStore::new(),
            data_count: ColumnStore::new(),
            data_count_present: ColumnStore::new(),
            sum_hess: ColumnStore::new(),
            sum_hess_present: ColumnStore::new(),
            gain: ColumnStore::new(),
            gain_present: ColumnStore::new(),
            num_opt_field_per_tree: 0,
            num_opt_field_per_node: 0,
        }
    }

    /// Reset to a single root leaf with output 0.
    pub fn init(&mut self) -> Result<()> {
        *self = Self::new();
        let root = self.alloc_node()?;
        self.set_leaf(root, L::default())
    }

    /// Append a fresh leaf-initialized node and return its id.
    pub fn alloc_node(&mut self) -> Result<NodeId> {
        let nd = self.num_nodes as usize;
        self.check_column_sizes(nd)?;
        ensure!(
            self.num_nodes < i32::MAX,
            TreeliteError::structural("tree has too many nodes")
        );

        self.num_nodes += 1;
        self.node_type.push(TreeNodeType::LeafNode);
        self.cleft.push(NO_CHILD);
        self.cright.push(NO_CHILD);
        self.split_index.push(-1);
        self.default_left.push(false);
        self.leaf_value.push(L::default());
        self.threshold.push(T::default());
        self.cmp.push(Operator::None);
        self.category_list_right_child.push(false);
        let leaf_oft = self.leaf_vector.len() as u64;
        self.leaf_vector_begin.push(leaf_oft);
        self.leaf_vector_end.push(leaf_oft);
        let cat_oft = self.category_list.len() as u64;
        self.category_list_begin.push(cat_oft);
        self.category_list_end.push(cat_oft);
        self.data_count.push(0);
        self.data_count_present.push(false);
        self.sum_hess.push(0.0);
        self.sum_hess_present.push(false);
        self.gain.push(0.0);
        self.gain_present.push(false);
        Ok(nd)
    }

    /// Allocate two nodes and wire them as the children of `nid`.
    ///
    /// The node type of `nid` is left unchanged; follow with a split setter.
    pub fn add_childs(&mut self, nid: NodeId) -> Result<()> {
        self.check_node(nid)?;
        let left = self.alloc_node()?;
        let right = self.alloc_node()?;
        self.cleft[nid] = left as i32;
        self.cright[nid] = right as i32;
        Ok(())
    }

    /// Set both children of `nid` to existing node ids.
    pub fn set_children(&mut self, nid: NodeId, left: NodeId, right: NodeId) -> Result<()> {
        self.check_node(nid)?;
        self.check_node(left)?;
        self.check_node(right)?;
        self.cleft[nid] = left as i32;
        self.cright[nid] = right as i32;
        Ok(())
    }

    /// Turn `nid` into a numerical test `feature[split_index] <cmp> threshold`.
    pub fn set_numerical_split(
        &mut self,
        nid: NodeId,
        split_index: u32,
        threshold: T,
        default_left: bool,
        cmp: Operator,
    ) -> Result<()> {
        self.check_node(nid)?;
        check_split_index(split_index)?;
        self.split_index[nid] = split_index as i32;
        self.default_left[nid] = default_left;
        self.threshold[nid] = threshold;
        self.cmp[nid] = cmp;
        self.node_type[nid] = TreeNodeType::NumericalTestNode;
        self.category_list_right_child[nid] = false;
        Ok(())
    }

    /// Turn `nid` into a categorical test on `feature[split_index]`.
    ///
    /// `categories` is stored sorted ascending. When `category_list_right_child`
    /// is set, matching rows go to the right child; otherwise to the left.
    /// Categorical splits must be set in ascending node-id order.
    pub fn set_categorical_split(
        &mut self,
        nid: NodeId,
        split_index: u32,
        default_left: bool,
        categories: &[u32],
        category_list_right_child: bool,
    ) -> Result<()> {
        self.check_node(nid)?;
        check_split_index(split_index)?;

        let end_oft = self.category_list.len() as u64;
        let num_nodes = self.num_nodes as usize;
        for later in nid + 1..num_nodes {
            ensure!(
                self.category_list_begin[later] == self.category_list_end[later]
                    && self.category_list_end[later] == end_oft,
                TreeliteError::structural(format!(
                    "categorical split on node {} must be set before node {} receives categories",
                    nid, later
                ))
            );
        }

        let mut sorted = categories.to_vec();
        sorted.sort_unstable();
        self.category_list.extend_from_slice(&sorted);
        let new_end_oft = self.category_list.len() as u64;
        self.category_list_begin[nid] = end_oft;
        self.category_list_end[nid] = new_end_oft;
        for later in nid + 1..num_nodes {
            self.category_list_begin[later] = new_end_oft;
            self.category_list_end[later] = new_end_oft;
        }

        self.split_index[nid] = split_index as i32;
        self.default_left[nid] = default_left;
        self.node_type[nid] = TreeNodeType::CategoricalTestNode;
        self.category_list_right_child[nid] = category_list_right_child;
        self.cmp[nid] = Operator::None;
        self.has_categorical_split = true;
        Ok(())
    }

    /// Make `nid` a leaf with a scalar output.
    pub fn set_leaf(&mut self, nid: NodeId, value: L) -> Result<()> {
        self.check_node(nid)?;
        self.leaf_value[nid] = value;
        self.leaf_vector_end[nid] = self.leaf_vector_begin[nid];
        self.cleft[nid] = NO_CHILD;
        self.cright[nid] = NO_CHILD;
        self.node_type[nid] = TreeNodeType::LeafNode;
        Ok(())
    }

    /// Make `nid` a leaf with a vector output.
    pub fn set_leaf_vector(&mut self, nid: NodeId, values: &[L]) -> Result<()> {
        self.check_node(nid)?;
        let begin = self.leaf_vector.len() as u64;
        self.leaf_vector.extend_from_slice(values);
        self.leaf_vector_begin[nid] = begin;
        self.leaf_vector_end[nid] = self.leaf_vector.len() as u64;
        self.cleft[nid] = NO_CHILD;
        self.cright[nid] = NO_CHILD;
        self.node_type[nid] = TreeNodeType::LeafNode;
        Ok(())
    }

    /// Record the number of training rows that reached `nid`.
    pub fn set_data_count(&mut self, nid: NodeId, count: u64) -> Result<()> {
        self.check_node(nid)?;
        self.data_count[nid] = count;
        self.data_count_present[nid] = true;
        Ok(())
    }

    /// Record the hessian sum of the training rows that reached `nid`.
    pub fn set_sum_hess(&mut self, nid: NodeId, sum_hess: f64) -> Result<()> {
        self.check_node(nid)?;
        self.sum_hess[nid] = sum_hess;
        self.sum_hess_present[nid] = true;
        Ok(())
    }

    /// Record the loss reduction of the split at `nid`.
    pub fn set_gain(&mut self, nid: NodeId, gain: f64) -> Result<()> {
        self.check_node(nid)?;
        self.gain[nid] = gain;
        self.gain_present[nid] = true;
        Ok(())
    }

    /// Number of allocated nodes.
    pub fn num_nodes(&self) -> usize {
        self.num_nodes as usize
    }

    /// Whether any node holds a categorical split.
    pub fn has_categorical_split(&self) -> bool {
        self.has_categorical_split
    }

    /// Node kind.
    #[inline]
    pub fn node_type(&self, nid: NodeId) -> TreeNodeType {
        self.node_type[nid]
    }

    /// Left child id, or -1 for leaves.
    #[inline]
    pub fn left_child(&self, nid: NodeId) -> i32 {
        self.cleft[nid]
    }

    /// Right child id, or -1 for leaves.
    #[inline]
    pub fn right_child(&self, nid: NodeId) -> i32 {
        self.cright[nid]
    }

    /// Child visited when the tested feature is missing.
    #[inline]
    pub fn default_child(&self, nid: NodeId) -> i32 {
        if self.default_left[nid] {
            self.cleft[nid]
        } else {
            self.cright[nid]
        }
    }

    /// Feature index tested at `nid`.
    #[inline]
    pub fn split_index(&self, nid: NodeId) -> u32 {
        self.split_index[nid] as u32
    }

    /// Whether missing values go left at `nid`.
    #[inline]
    pub fn default_left(&self, nid: NodeId) -> bool {
        self.default_left[nid]
    }

    /// Whether `nid` is a leaf.
    #[inline]
    pub fn is_leaf(&self, nid: NodeId) -> bool {
        self.cleft[nid] == NO_CHILD
    }

    /// Scalar leaf output.
    #[inline]
    pub fn leaf_value(&self, nid: NodeId) -> L {
        self.leaf_value[nid]
    }

    /// Vector leaf output; empty when the leaf holds a scalar.
    #[inline]
    pub fn leaf_vector(&self, nid: NodeId) -> &[L] {
        let begin = self.leaf_vector_begin[nid] as usize;
        let end = self.leaf_vector_end[nid] as usize;
        if begin >= end {
            return &[];
        }
        &self.leaf_vector.as_slice()[begin..end]
    }

    /// Whether `nid` carries a vector output.
    #[inline]
    pub fn has_leaf_vector(&self, nid: NodeId) -> bool {
        self.leaf_vector_begin[nid] != self.leaf_vector_end[nid]
    }

    /// Threshold of a numerical test.
    #[inline]
    pub fn threshold(&self, nid: NodeId) -> T {
        self.threshold[nid]
    }

    /// Comparison operator of a numerical test.
    #[inline]
    pub fn comparison_op(&self, nid: NodeId) -> Operator {
        self.cmp[nid]
    }

    /// Sorted category list of a categorical test; empty elsewhere.
    #[inline]
    pub fn category_list(&self, nid: NodeId) -> &[u32] {
        let begin = self.category_list_begin[nid] as usize;
        let end = self.category_list_end[nid] as usize;
        if begin >= end {
            return &[];
        }
        &self.category_list.as_slice()[begin..end]
    }

    /// Whether matching categories are routed to the right child.
    #[inline]
    pub fn category_list_right_child(&self, nid: NodeId) -> bool {
        self.category_list_right_child[nid]
    }

    /// Training row count at `nid`, if recorded.
    pub fn data_count(&self, nid: NodeId) -> Option<u64> {
        self.data_count_present[nid].then(|| self.data_count[nid])
    }

    /// Hessian sum at `nid`, if recorded.
    pub fn sum_hess(&self, nid: NodeId) -> Option<f64> {
        self.sum_hess_present[nid].then(|| self.sum_hess[nid])
    }

    /// Split gain at `nid`, if recorded.
    pub fn gain(&self, nid: NodeId) -> Option<f64> {
        self.gain_present[nid].then(|| self.gain[nid])
    }

    /// Check that every per-node column and every offset range is consistent,
    /// and that the nodes form a single tree rooted at node 0.
    ///
    /// Column lengths that disagree with the node count are format errors;
    /// everything else is structural.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.num_nodes >= 0,
            TreeliteError::structural(format!("negative node count {}", self.num_nodes))
        );
        let n = self.num_nodes as usize;
        self.check_column_sizes(n)?;
        for nid in 0..n {
            let (lb, le) = (self.leaf_vector_begin[nid], self.leaf_vector_end[nid]);
            ensure!(
                lb <= le && le <= self.leaf_vector.len() as u64,
                structural_range("leaf vector", nid, lb, le)
            );
            let (cb, ce) = (self.category_list_begin[nid], self.category_list_end[nid]);
            ensure!(
                cb <= ce && ce <= self.category_list.len() as u64,
                structural_range("category list", nid, cb, ce)
            );
            let (l, r) = (self.cleft[nid], self.cright[nid]);
            ensure!(
                (l == NO_CHILD) == (r == NO_CHILD),
                TreeliteError::structural(format!(
                    "node {} has exactly one child ({}, {})",
                    nid, l, r
                ))
            );
            ensure!(
                l < self.num_nodes && r < self.num_nodes && l >= NO_CHILD && r >= NO_CHILD,
                TreeliteError::structural(format!("node {} has out-of-range children", nid))
            );
            let is_leaf_type = self.node_type[nid] == TreeNodeType::LeafNode;
            ensure!(
                is_leaf_type == (l == NO_CHILD),
                TreeliteError::structural(format!(
                    "node {} has type {} but children ({}, {})",
                    nid, self.node_type[nid], l, r
                ))
            );
        }
        if n > 0 {
            self.check_single_rooted()?;
        }
        Ok(())
    }

    /// Every node must be reachable from node 0 along exactly one path.
    /// Children must already be known to be in range.
    fn check_single_rooted(&self) -> Result<()> {
        let mut visited = vec![false; self.num_nodes()];
        let mut stack = vec![0usize];
        while let Some(nid) = stack.pop() {
            ensure!(
                !visited[nid],
                TreeliteError::structural(format!(
                    "node {} is reachable along more than one path",
                    nid
                ))
            );
            visited[nid] = true;
            if !self.is_leaf(nid) {
                stack.push(self.cright[nid] as NodeId);
                stack.push(self.cleft[nid] as NodeId);
            }
        }
        if let Some(orphan) = visited.iter().position(|&v| !v) {
            return Err(TreeliteError::structural(format!(
                "node {} is not reachable from the root (orphaned node)",
                orphan
            )));
        }
        Ok(())
    }

    fn check_node(&self, nid: NodeId) -> Result<()> {
        ensure!(
            nid < self.num_nodes as usize,
            TreeliteError::structural(format!(
                "node {} does not exist (tree has {} nodes)",
                nid, self.num_nodes
            ))
        );
        Ok(())
    }

    fn check_column_sizes(&self, n: usize) -> Result<()> {
        let sizes = [
            ("node_type", self.node_type.len()),
            ("cleft", self.cleft.len()),
            ("cright", self.cright.len()),
            ("split_index", self.split_index.len()),
            ("default_left", self.default_left.len()),
            ("leaf_value", self.leaf_value.len()),
            ("threshold", self.threshold.len()),
            ("cmp", self.cmp.len()),
            ("category_list_right_child", self.category_list_right_child.len()),
            ("leaf_vector_begin", self.leaf_vector_begin.len()),
            ("leaf_vector_end", self.leaf_vector_end.len()),
            ("category_list_begin", self.category_list_begin.len()),
            ("category_list_end", self.category_list_end.len()),
            ("data_count", self.data_count.len()),
            ("data_count_present", self.data_count_present.len()),
            ("sum_hess", self.sum_hess.len()),
            ("sum_hess_present", self.sum_hess_present.len()),
            ("gain", self.gain.len()),
            ("gain_present", self.gain_present.len()),
        ];
        for (column, len) in sizes {
            ensure!(
                len == n,
                FormatError::ColumnLength {
                    column,
                    expected: n,
                    actual: len,
                }
            );
        }
        Ok(())
    }
}

fn check_split_index(split_index: u32) -> Result<()> {
    ensure!(
        split_index < MAX_SPLIT_INDEX,
        TreeliteError::structural(format!(
            "split_index {} must be less than {}",
            split_index, MAX_SPLIT_INDEX
        ))
    );
    Ok(())
}

fn structural_range(what: &str, nid: NodeId, begin: u64, end: u64) -> TreeliteError {
    TreeliteError::structural(format!(
        "node {} has invalid {} range [{}, {})",
        nid, what, begin, end
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stump() -> Tree<f32, f32> {
        let mut tree = Tree::<f32, f32>::new();
        tree.init().unwrap();
        tree.add_childs(0).unwrap();
        tree.set_numerical_split(0, 0, 0.5, true, Operator::Lt).unwrap();
        tree.set_leaf(1, -1.0).unwrap();
        tree.set_leaf(2, 1.0).unwrap();
        tree
    }

    #[test]
    fn test_init_creates_root_leaf() {
        let mut tree = Tree::<f64, f64>::new();
        assert_eq!(tree.num_nodes(), 0);
        tree.init().unwrap();
        assert_eq!(tree.num_nodes(), 1);
        assert!(tree.is_leaf(0));
        assert_eq!(tree.leaf_value(0), 0.0);
        assert!(tree.leaf_vector(0).is_empty());
    }

    #[test]
    fn test_alloc_node_ids_are_sequential() {
        let mut tree = Tree::<f32, f32>::new();
        for expected in 0..5 {
            assert_eq!(tree.alloc_node().unwrap(), expected);
        }
        // nodes 1..5 hang off nothing
        let err = tree.validate().unwrap_err();
        assert_eq!(err.category(), "structural");
        assert!(err.to_string().contains("orphaned"));
    }

    #[test]
    fn test_numerical_split() {
        let tree = stump();
        assert_eq!(tree.node_type(0), TreeNodeType::NumericalTestNode);
        assert_eq!(tree.left_child(0), 1);
        assert_eq!(tree.right_child(0), 2);
        assert_eq!(tree.default_child(0), 1);
        assert_eq!(tree.comparison_op(0), Operator::Lt);
        assert_eq!(tree.threshold(0), 0.5);
        assert!(tree.category_list(0).is_empty());
        tree.validate().unwrap();
    }

    #[test]
    fn test_split_index_limit() {
        let mut tree = stump();
        assert!(tree
            .set_numerical_split(0, MAX_SPLIT_INDEX, 0.0, false, Operator::Le)
            .is_err());
        assert!(tree
            .set_numerical_split(0, MAX_SPLIT_INDEX - 1, 0.0, false, Operator::Le)
            .is_ok());
    }

    #[test]
    fn test_categorical_split_sorts_and_marks() {
        let mut tree = Tree::<f64, f64>::new();
        tree.init().unwrap();
        tree.add_childs(0).unwrap();
        tree.set_categorical_split(0, 2, false, &[5, 1, 3], true).unwrap();
        tree.set_leaf(1, 0.0).unwrap();
        tree.set_leaf(2, 1.0).unwrap();
        assert!(tree.has_categorical_split());
        assert_eq!(tree.category_list(0), &[1, 3, 5]);
        assert!(tree.category_list_right_child(0));
        assert_eq!(tree.comparison_op(0), Operator::None);
        assert!(tree.category_list(1).is_empty());
        tree.validate().unwrap();
    }

    #[test]
    fn test_categorical_split_order_enforced() {
        let mut tree = Tree::<f64, f64>::new();
        tree.init().unwrap();
        tree.add_childs(0).unwrap();
        tree.add_childs(1).unwrap();
        tree.set_categorical_split(1, 0, false, &[2], false).unwrap();
        assert!(tree.set_categorical_split(0, 0, false, &[4], false).is_err());
    }

    #[test]
    fn test_leaf_vector() {
        let mut tree = stump();
        tree.set_leaf_vector(1, &[0.1, 0.9]).unwrap();
        assert!(tree.has_leaf_vector(1));
        assert_eq!(tree.leaf_vector(1), &[0.1, 0.9]);
        assert!(!tree.has_leaf_vector(2));
        tree.set_leaf(1, 3.0).unwrap();
        assert!(!tree.has_leaf_vector(1));
        assert_eq!(tree.leaf_value(1), 3.0);
    }

    #[test]
    fn test_optional_stats() {
        let mut tree = stump();
        assert_eq!(tree.data_count(0), None);
        tree.set_data_count(0, 100).unwrap();
        tree.set_sum_hess(0, 12.5).unwrap();
        tree.set_gain(0, 0.25).unwrap();
        assert_eq!(tree.data_count(0), Some(100));
        assert_eq!(tree.sum_hess(0), Some(12.5));
        assert_eq!(tree.gain(0), Some(0.25));
        assert_eq!(tree.gain(1), None);
    }

    #[test]
    fn test_clone_is_deep() {
        let tree = stump();
        let mut copy = tree.clone();
        copy.set_leaf(1, 42.0).unwrap();
        assert_eq!(tree.leaf_value(1), -1.0);
        assert_eq!(copy.leaf_value(1), 42.0);
    }

    #[test]
    fn test_validate_detects_desync() {
        let mut tree = stump();
        tree.gain.push(0.0);
        let err = tree.validate().unwrap_err();
        assert_eq!(err.category(), "format");
        assert!(err.to_string().contains("gain"));
        assert!(tree.alloc_node().is_err());
    }

    #[test]
    fn test_validate_rejects_cycles_and_shared_children() {
        let mut tree = stump();
        tree.add_childs(1).unwrap();
        tree.set_numerical_split(1, 0, 0.0, true, Operator::Lt).unwrap();
        tree.validate().unwrap();

        tree.set_children(1, 0, 3).unwrap();
        let err = tree.validate().unwrap_err();
        assert_eq!(err.category(), "structural");
        assert!(err.to_string().contains("more than one path"));

        tree.set_children(1, 2, 3).unwrap();
        assert!(tree.validate().is_err());
    }

    #[test]
    fn test_setters_reject_unknown_nodes() {
        let mut tree = stump();
        assert!(tree.set_leaf(3, 1.0).is_err());
        assert!(tree.set_leaf_vector(3, &[1.0]).is_err());
        assert!(tree.set_data_count(3, 1).is_err());
        assert!(tree.set_sum_hess(3, 1.0).is_err());
        assert!(tree.set_gain(3, 1.0).is_err());
        assert!(tree.leaf_vector.is_empty());
        tree.validate().unwrap();
    }
}
