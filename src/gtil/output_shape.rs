//! Output buffer shapes, so callers can allocate before predicting.

use crate::gtil::config::{Configuration, PredictKind};
use crate::tree::model::Model;

/// Shape of the output written by [`crate::gtil::predict`] for `num_row` rows.
///
/// - `Default`/`Raw`: `[num_target, num_row, max_num_class]` when the model
///   has several targets, else `[num_row, max_num_class]`
/// - `LeafId`: `[num_row, num_tree]`
/// - `PerTree`: `[num_row, num_tree, leaf_vector_shape[0] * leaf_vector_shape[1]]`
pub fn get_output_shape(model: &Model, num_row: u64, config: &Configuration) -> Vec<u64> {
    let num_tree = model.num_tree() as u64;
    let max_num_class = u64::from(model.max_num_class());
    match config.pred_kind {
        PredictKind::Default | PredictKind::Raw => {
            if model.num_target > 1 {
                vec![u64::from(model.num_target), num_row, max_num_class]
            } else {
                vec![num_row, max_num_class]
            }
        }
        PredictKind::LeafId => vec![num_row, num_tree],
        PredictKind::PerTree => {
            let leaf_len: u64 = model.leaf_vector_shape.iter().map(u64::from).product();
            vec![num_row, num_tree, leaf_len]
        }
    }
}

/// Number of elements in the output buffer.
pub fn get_output_size(model: &Model, num_row: u64, config: &Configuration) -> u64 {
    get_output_shape(model, num_row, config).iter().product()
}
