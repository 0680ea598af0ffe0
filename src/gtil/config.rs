//! Prediction configuration.

use crate::core::error::{Result, TreeliteError};
use crate::core::utils::threading::ThreadConfig;
use crate::ensure;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of output produced by [`crate::gtil::predict`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PredictKind {
    /// Sum of tree outputs plus base scores, post-processed
    #[default]
    #[serde(rename = "default")]
    Default,
    /// Sum of tree outputs plus base scores, without post-processing
    #[serde(rename = "raw")]
    Raw,
    /// Leaf node id reached in every tree
    #[serde(rename = "leaf_id")]
    LeafId,
    /// Leaf output of every tree, not summed
    #[serde(rename = "score_per_tree")]
    PerTree,
}

impl PredictKind {
    /// Name accepted by [`Configuration::from_json`].
    pub fn as_str(&self) -> &'static str {
        match self {
            PredictKind::Default => "default",
            PredictKind::Raw => "raw",
            PredictKind::LeafId => "leaf_id",
            PredictKind::PerTree => "score_per_tree",
        }
    }
}

impl fmt::Display for PredictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PredictKind {
    type Err = TreeliteError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "default" => Ok(PredictKind::Default),
            "raw" => Ok(PredictKind::Raw),
            "leaf_id" => Ok(PredictKind::LeafId),
            "score_per_tree" => Ok(PredictKind::PerTree),
            other => Err(TreeliteError::config(format!(
                "unknown predict_type {:?}; expected one of default, raw, leaf_id, score_per_tree",
                other
            ))),
        }
    }
}

/// Options of a single prediction call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    /// Output kind
    pub pred_kind: PredictKind,
    /// Worker threads: 0 for all cores, -1 for single-threaded, N > 0 exact
    pub nthread: i32,
}

impl Configuration {
    /// Default prediction on all cores.
    pub fn new() -> Self {
        Self {
            pred_kind: PredictKind::Default,
            nthread: 0,
        }
    }

    /// Set the output kind
    pub fn with_pred_kind(mut self, pred_kind: PredictKind) -> Self {
        self.pred_kind = pred_kind;
        self
    }

    /// Set the worker thread count
    pub fn with_nthread(mut self, nthread: i32) -> Self {
        self.nthread = nthread;
        self
    }

    /// Parse `{"predict_type": "...", "nthread": N}`; both keys are optional.
    pub fn from_json(json_str: &str) -> Result<Self> {
        #[derive(Deserialize)]
        #[serde(deny_unknown_fields)]
        struct RawConfiguration {
            #[serde(default)]
            predict_type: Option<String>,
            #[serde(default)]
            nthread: Option<i32>,
        }

        let raw: RawConfiguration = serde_json::from_str(json_str)?;
        let mut config = Self::new();
        if let Some(predict_type) = raw.predict_type {
            config.pred_kind = predict_type.parse()?;
        }
        if let Some(nthread) = raw.nthread {
            config.nthread = nthread;
        }
        config.validate()?;
        Ok(config)
    }

    /// Check the thread count sentinel.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.nthread >= -1,
            TreeliteError::config(format!(
                "nthread must be -1, 0 or a positive integer, got {}",
                self.nthread
            ))
        );
        Ok(())
    }

    pub(crate) fn thread_config(&self) -> Result<ThreadConfig> {
        self.validate()?;
        ThreadConfig::new(self.nthread)
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new()
    }
}
