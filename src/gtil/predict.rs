//! Row-parallel tree evaluation.

use crate::core::constants::ALL_SLOTS;
use crate::core::error::{Result, TreeliteError};
use crate::core::types::{FloatValue, NodeId, Operator, TreeNodeType, TypedValue};
use crate::core::utils::threading::{ThreadConfig, Threading};
use crate::dispatch_preset;
use crate::ensure;
use crate::gtil::config::{Configuration, PredictKind};
use crate::gtil::output_shape::get_output_size;
use crate::gtil::postprocessor::PostProcessor;
use crate::model_builder::metadata::expected_leaf_shape;
use crate::tree::model::Model;
use crate::tree::tree::Tree;
use ndarray::{Array3, ArrayView1, ArrayView2, ArrayViewMut3, ShapeError};

/// Predict `num_row` rows of `input` (row-major, `num_row x num_feature`)
/// into `output`, which must hold [`get_output_size`] elements.
///
/// The element type must match the model's leaf output type.
pub fn predict<I: FloatValue>(
    model: &Model,
    input: &[I],
    num_row: usize,
    output: &mut [I],
    config: &Configuration,
) -> Result<()> {
    let leaf_output_type = model.leaf_output_type();
    ensure!(
        I::TYPE_INFO == leaf_output_type,
        TreeliteError::type_mismatch(format!(
            "incorrect input type passed to predict(); expected {}, got {}",
            leaf_output_type,
            I::TYPE_INFO
        ))
    );
    let num_feature = usize::try_from(model.num_feature).map_err(|_| {
        TreeliteError::config(format!("model has invalid num_feature {}", model.num_feature))
    })?;
    let expected_input = num_row.checked_mul(num_feature);
    ensure!(
        expected_input == Some(input.len()),
        TreeliteError::dimension_mismatch(
            format!("{} x {} input values", num_row, num_feature),
            format!("{} values", input.len())
        )
    );
    let expected_output = get_output_size(model, num_row as u64, config);
    ensure!(
        output.len() as u64 == expected_output,
        TreeliteError::dimension_mismatch(
            format!("{} output values", expected_output),
            format!("{} values", output.len())
        )
    );

    validate_model(model, config.pred_kind)?;
    let thread_config = config.thread_config()?;
    let input_view = ArrayView2::from_shape((num_row, num_feature), input).map_err(shape_error)?;
    log::debug!(
        "Predicting {} rows with {} trees ({}, {} threads)",
        num_row,
        model.num_tree(),
        config.pred_kind,
        thread_config.nthread()
    );

    dispatch_preset!(model.variant(), preset => {
        let ctx = PredictContext::new(model, &preset.trees, input_view, &thread_config);
        match config.pred_kind {
            PredictKind::Default => {
                let postprocessor = PostProcessor::from_model(model)?;
                ctx.predict_sum(output, Some(&postprocessor))
            }
            PredictKind::Raw => ctx.predict_sum(output, None),
            PredictKind::LeafId => ctx.predict_leaf(output),
            PredictKind::PerTree => ctx.predict_per_tree(output),
        }
    })
}

/// Leaf id reached by `row` in `tree`.
pub fn evaluate_tree<T, L, I>(tree: &Tree<T, L>, row: &ArrayView1<'_, I>) -> NodeId
where
    T: TypedValue,
    L: TypedValue,
    I: FloatValue,
{
    let mut nid: NodeId = 0;
    while !tree.is_leaf(nid) {
        let fvalue = row[tree.split_index(nid) as usize];
        let next = if fvalue.is_nan() {
            tree.default_child(nid)
        } else if tree.node_type(nid) == TreeNodeType::CategoricalTestNode {
            next_node_categorical(
                fvalue,
                tree.category_list(nid),
                tree.category_list_right_child(nid),
                tree.left_child(nid),
                tree.right_child(nid),
            )
        } else {
            next_node(
                fvalue,
                I::cast_from(tree.threshold(nid)),
                tree.comparison_op(nid),
                tree.left_child(nid),
                tree.right_child(nid),
            )
        };
        nid = next as NodeId;
    }
    nid
}

#[inline]
fn next_node<I: FloatValue>(fvalue: I, threshold: I, op: Operator, left: i32, right: i32) -> i32 {
    if op.compare(fvalue, threshold) {
        left
    } else {
        right
    }
}

#[inline]
fn next_node_categorical<I: FloatValue>(
    fvalue: I,
    category_list: &[u32],
    category_list_right_child: bool,
    left: i32,
    right: i32,
) -> i32 {
    let matched = category_matches(fvalue, category_list);
    if matched == category_list_right_child {
        right
    } else {
        left
    }
}

/// Whether `fvalue` names one of the (sorted) categories.
///
/// Only non-negative integral values that are exactly representable in `I`
/// and fit in 32 bits can match.
pub fn category_matches<I: FloatValue>(fvalue: I, category_list: &[u32]) -> bool {
    let max_representable = (u32::MAX as f64).min((1u64 << I::MANTISSA_DIGITS) as f64);
    let value = fvalue.as_f64();
    if value < 0.0 || value > max_representable || value.fract() != 0.0 {
        return false;
    }
    category_list.binary_search(&(value as u32)).is_ok()
}

fn shape_error(err: ShapeError) -> TreeliteError {
    TreeliteError::dimension_mismatch("row-major buffer", err.to_string())
}

/// Check everything the prediction kernels index into, so the parallel
/// section cannot fail halfway.
fn validate_model(model: &Model, pred_kind: PredictKind) -> Result<()> {
    let num_tree = model.num_tree();
    ensure!(
        model.num_target >= 1 && model.num_class.len() == model.num_target as usize,
        TreeliteError::config(format!(
            "num_class has {} entries but num_target = {}",
            model.num_class.len(),
            model.num_target
        ))
    );
    ensure!(
        model.num_class.iter().all(|c| c >= 1),
        TreeliteError::config("every target needs at least one class")
    );
    ensure!(
        model.leaf_vector_shape.len() == 2,
        TreeliteError::config(format!(
            "leaf_vector_shape must have 2 entries, got {}",
            model.leaf_vector_shape.len()
        ))
    );
    ensure!(
        model.target_id.len() == num_tree && model.class_id.len() == num_tree,
        TreeliteError::structural(format!(
            "target_id/class_id have {}/{} entries for {} trees",
            model.target_id.len(),
            model.class_id.len(),
            num_tree
        ))
    );

    let needs_leaf_outputs = pred_kind != PredictKind::LeafId;
    let needs_routing = matches!(pred_kind, PredictKind::Default | PredictKind::Raw);
    let max_num_class = model.max_num_class();
    let leaf_shape = [model.leaf_vector_shape[0], model.leaf_vector_shape[1]];
    if needs_routing {
        let expected_scores = model.num_target as usize * max_num_class as usize;
        ensure!(
            model.base_scores.len() == expected_scores,
            TreeliteError::config(format!(
                "base_scores must have {} entries (num_target * max_num_class), got {}",
                expected_scores,
                model.base_scores.len()
            ))
        );
        for tree_id in 0..num_tree {
            let (target_id, class_id) = (model.target_id[tree_id], model.class_id[tree_id]);
            let class_bound = if target_id == ALL_SLOTS {
                max_num_class
            } else {
                ensure!(
                    target_id >= 0 && (target_id as u32) < model.num_target,
                    TreeliteError::structural(format!(
                        "tree {} has invalid target_id {}",
                        tree_id, target_id
                    ))
                );
                model.num_class[target_id as usize]
            };
            ensure!(
                class_id == ALL_SLOTS || (class_id >= 0 && (class_id as u32) < class_bound),
                TreeliteError::structural(format!(
                    "tree {} has invalid class_id {}",
                    tree_id, class_id
                ))
            );
            let expected = expected_leaf_shape(target_id, class_id, model.num_target, max_num_class);
            ensure!(
                expected == leaf_shape,
                TreeliteError::structural(format!(
                    "tree {} (target_id = {}, class_id = {}) needs leaf_vector_shape {:?}, model has {:?}",
                    tree_id, target_id, class_id, expected, leaf_shape
                ))
            );
        }
    }

    let num_feature = model.num_feature.max(0) as u32;
    let leaf_len = leaf_shape[0] as usize * leaf_shape[1] as usize;
    dispatch_preset!(model.variant(), preset => {
        for (tree_id, tree) in preset.trees.iter().enumerate() {
            ensure!(
                tree.num_nodes() > 0,
                TreeliteError::structural(format!("tree {} has no nodes", tree_id))
            );
            tree.validate().map_err(|err| {
                log::debug!("Tree {} failed validation", tree_id);
                err
            })?;
            for nid in 0..tree.num_nodes() {
                if tree.is_leaf(nid) {
                    if !needs_leaf_outputs {
                        continue;
                    }
                    let has_vector = tree.has_leaf_vector(nid);
                    ensure!(
                        !has_vector || tree.leaf_vector(nid).len() == leaf_len,
                        TreeliteError::structural(format!(
                            "tree {} node {} has a leaf vector of length {}, expected {}",
                            tree_id,
                            nid,
                            tree.leaf_vector(nid).len(),
                            leaf_len
                        ))
                    );
                    ensure!(
                        has_vector
                            || !needs_routing
                            || (model.target_id[tree_id] != ALL_SLOTS
                                && model.class_id[tree_id] != ALL_SLOTS),
                        TreeliteError::structural(format!(
                            "tree {} node {} has a scalar leaf but the tree produces a vector",
                            tree_id, nid
                        ))
                    );
                    continue;
                }
                ensure!(
                    tree.split_index(nid) < num_feature,
                    TreeliteError::structural(format!(
                        "tree {} node {} splits on feature {} but num_feature = {}",
                        tree_id,
                        nid,
                        tree.split_index(nid),
                        num_feature
                    ))
                );
                ensure!(
                    tree.node_type(nid) == TreeNodeType::CategoricalTestNode
                        || tree.comparison_op(nid) != Operator::None,
                    TreeliteError::format(format!(
                        "tree {} node {} has no comparison operator",
                        tree_id, nid
                    ))
                );
            }
        }
    });
    Ok(())
}

/// Where a tree's leaf output lands in the `[target, class]` score block.
struct Routing<'m> {
    num_target: usize,
    max_num_class: usize,
    num_class: &'m [u32],
    target_id: &'m [i32],
    class_id: &'m [i32],
    base_scores: &'m [f64],
}

impl Routing<'_> {
    fn stride(&self) -> usize {
        self.num_target * self.max_num_class
    }

    /// Visit every `(target, class)` slot fed by `tree_id`, together with the
    /// offset of that slot inside the tree's leaf vector.
    fn for_each_slot<F: FnMut(usize, usize)>(&self, tree_id: usize, mut f: F) {
        let (target_id, class_id) = (self.target_id[tree_id], self.class_id[tree_id]);
        let mc = self.max_num_class;
        match (target_id == ALL_SLOTS, class_id == ALL_SLOTS) {
            (true, true) => {
                for t in 0..self.num_target {
                    for c in 0..self.num_class[t] as usize {
                        f(t * mc + c, t * mc + c);
                    }
                }
            }
            (true, false) => {
                let c = class_id as usize;
                for t in 0..self.num_target {
                    f(t * mc + c, t);
                }
            }
            (false, true) => {
                let t = target_id as usize;
                for c in 0..self.num_class[t] as usize {
                    f(t * mc + c, c);
                }
            }
            (false, false) => f(target_id as usize * mc + class_id as usize, 0),
        }
    }

    fn accumulate<T, L, I>(&self, tree: &Tree<T, L>, tree_id: usize, leaf: NodeId, scores: &mut [I])
    where
        T: TypedValue,
        L: TypedValue,
        I: FloatValue,
    {
        if tree.has_leaf_vector(leaf) {
            let leaf_vector = tree.leaf_vector(leaf);
            self.for_each_slot(tree_id, |slot, offset| {
                scores[slot] = scores[slot] + I::cast_from(leaf_vector[offset]);
            });
        } else {
            let slot = self.target_id[tree_id] as usize * self.max_num_class
                + self.class_id[tree_id] as usize;
            scores[slot] = scores[slot] + I::cast_from(tree.leaf_value(leaf));
        }
    }

    /// Number of trees feeding each slot.
    fn tree_counts(&self, num_tree: usize) -> Vec<f64> {
        let mut counts = vec![0.0; self.stride()];
        for tree_id in 0..num_tree {
            self.for_each_slot(tree_id, |slot, _| counts[slot] += 1.0);
        }
        counts
    }

    fn finalize<I: FloatValue>(
        &self,
        scores: &mut [I],
        tree_counts: Option<&[f64]>,
        postprocessor: Option<&PostProcessor>,
    ) {
        for t in 0..self.num_target {
            let begin = t * self.max_num_class;
            let end = begin + self.num_class[t] as usize;
            for slot in begin..end {
                let mut score = scores[slot];
                if let Some(counts) = tree_counts {
                    if counts[slot] > 0.0 {
                        score = score / I::cast_from(counts[slot]);
                    }
                }
                scores[slot] = score + I::cast_from(self.base_scores[slot]);
            }
            if let Some(postprocessor) = postprocessor {
                postprocessor.apply(&mut scores[begin..end]);
            }
        }
    }
}

struct PredictContext<'m, 'i, T, L, I> {
    model: &'m Model,
    trees: &'m [Tree<T, L>],
    input: ArrayView2<'i, I>,
    threads: &'m ThreadConfig,
}

impl<'m, 'i, T, L, I> PredictContext<'m, 'i, T, L, I>
where
    T: TypedValue,
    L: TypedValue,
    I: FloatValue,
{
    fn new(
        model: &'m Model,
        trees: &'m [Tree<T, L>],
        input: ArrayView2<'i, I>,
        threads: &'m ThreadConfig,
    ) -> Self {
        Self {
            model,
            trees,
            input,
            threads,
        }
    }

    fn num_row(&self) -> usize {
        self.input.nrows()
    }

    fn routing(&self) -> Routing<'m> {
        Routing {
            num_target: self.model.num_target as usize,
            max_num_class: self.model.max_num_class() as usize,
            num_class: self.model.num_class.as_slice(),
            target_id: self.model.target_id.as_slice(),
            class_id: self.model.class_id.as_slice(),
            base_scores: self.model.base_scores.as_slice(),
        }
    }

    /// Summed scores, laid out `[target, row, class]`.
    fn predict_sum(&self, output: &mut [I], postprocessor: Option<&PostProcessor>) -> Result<()> {
        let routing = self.routing();
        let stride = routing.stride();
        let tree_counts = self
            .model
            .average_tree_output
            .then(|| routing.tree_counts(self.trees.len()));
        let kernel = |first_row: usize, block: &mut [I]| -> Result<()> {
            for (offset, scores) in block.chunks_mut(stride).enumerate() {
                scores.fill(I::zero());
                let row = self.input.row(first_row + offset);
                for (tree_id, tree) in self.trees.iter().enumerate() {
                    let leaf = evaluate_tree(tree, &row);
                    routing.accumulate(tree, tree_id, leaf, scores);
                }
                routing.finalize(scores, tree_counts.as_deref(), postprocessor);
            }
            Ok(())
        };

        if routing.num_target == 1 {
            return Threading::for_row_blocks(self.threads, output, stride, kernel);
        }
        // Rows are not contiguous in the `[target, row, class]` layout, so
        // score into `[row, target, class]` and transpose.
        let num_row = self.num_row();
        let mut by_row = Array3::<I>::zeros((num_row, routing.num_target, routing.max_num_class));
        let by_row_slice = by_row
            .as_slice_mut()
            .ok_or_else(|| TreeliteError::dimension_mismatch("contiguous score buffer", "strided"))?;
        Threading::for_row_blocks(self.threads, by_row_slice, stride, kernel)?;
        let mut out_view = ArrayViewMut3::from_shape(
            (routing.num_target, num_row, routing.max_num_class),
            output,
        )
        .map_err(shape_error)?;
        out_view.assign(&by_row.permuted_axes([1, 0, 2]));
        Ok(())
    }

    /// Leaf ids, laid out `[row, tree]`.
    fn predict_leaf(&self, output: &mut [I]) -> Result<()> {
        let num_tree = self.trees.len();
        Threading::for_row_blocks(self.threads, output, num_tree, |first_row, block| {
            for (offset, leaf_ids) in block.chunks_mut(num_tree).enumerate() {
                let row = self.input.row(first_row + offset);
                for (slot, tree) in leaf_ids.iter_mut().zip(self.trees) {
                    *slot = I::cast_from(evaluate_tree(tree, &row) as u32);
                }
            }
            Ok(())
        })
    }

    /// Unsummed leaf outputs, laid out `[row, tree, leaf_len]`.
    fn predict_per_tree(&self, output: &mut [I]) -> Result<()> {
        let num_tree = self.trees.len();
        let leaf_len: usize = self.model.leaf_vector_shape.iter().map(|d| d as usize).product();
        let stride = num_tree * leaf_len;
        Threading::for_row_blocks(self.threads, output, stride, |first_row, block| {
            for (offset, row_out) in block.chunks_mut(stride).enumerate() {
                row_out.fill(I::zero());
                let row = self.input.row(first_row + offset);
                for (tree_out, tree) in row_out.chunks_mut(leaf_len).zip(self.trees) {
                    let leaf = evaluate_tree(tree, &row);
                    if tree.has_leaf_vector(leaf) {
                        for (dst, &v) in tree_out.iter_mut().zip(tree.leaf_vector(leaf)) {
                            *dst = I::cast_from(v);
                        }
                    } else {
                        tree_out[0] = I::cast_from(tree.leaf_value(leaf));
                    }
                }
            }
            Ok(())
        })
    }
}
