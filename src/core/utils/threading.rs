//! Threading utilities built on Rayon.
//!
//! Prediction parallelizes over rows with a static schedule: the row range is
//! cut into at most `nthread` contiguous blocks, one per worker, and each
//! worker owns the output slice of its block. No work stealing across blocks
//! is needed because per-row cost is near uniform.

use crate::core::error::{Result, TreeliteError};
use rayon::prelude::*;
use std::cmp::min;

/// Resolved worker count for one parallel call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadConfig {
    nthread: usize,
}

impl ThreadConfig {
    /// Resolve a requested thread count.
    ///
    /// `0` uses every available core, `-1` forces single-threaded execution,
    /// and a positive value is used as is. Anything else is rejected.
    pub fn new(nthread: i32) -> Result<Self> {
        let resolved = match nthread {
            0 => num_cpus::get().max(1),
            -1 => 1,
            n if n > 0 => n as usize,
            n => {
                return Err(TreeliteError::invalid_parameter(
                    "nthread",
                    n.to_string(),
                    "must be -1, 0, or a positive integer",
                ))
            }
        };
        Ok(Self { nthread: resolved })
    }

    /// Single-threaded configuration.
    pub fn single() -> Self {
        Self { nthread: 1 }
    }

    /// Number of worker threads.
    pub fn nthread(&self) -> usize {
        self.nthread
    }
}

impl Default for ThreadConfig {
    fn default() -> Self {
        Self {
            nthread: num_cpus::get().max(1),
        }
    }
}

/// Threading helpers mirroring a static OpenMP schedule
#[derive(Debug)]
pub struct Threading;

impl Threading {
    /// Number of blocks and block size for splitting `cnt` items across
    /// `num_threads` workers, with at least `min_cnt_per_block` items per block.
    pub fn block_info(num_threads: usize, cnt: usize, min_cnt_per_block: usize) -> (usize, usize) {
        let min_cnt_per_block = min_cnt_per_block.max(1);
        let nblock = min(num_threads.max(1), cnt.div_ceil(min_cnt_per_block));
        if nblock > 1 {
            (nblock, cnt.div_ceil(nblock))
        } else {
            (1, cnt)
        }
    }

    /// Run `inner_fun(first_row, rows_out)` over contiguous row blocks of `out`.
    ///
    /// `out` holds `row_stride` elements per row; every block receives the
    /// disjoint slice covering its rows. The first error raised by any block
    /// is returned.
    pub fn for_row_blocks<T, F>(
        config: &ThreadConfig,
        out: &mut [T],
        row_stride: usize,
        inner_fun: F,
    ) -> Result<()>
    where
        T: Send,
        F: Fn(usize, &mut [T]) -> Result<()> + Send + Sync,
    {
        if row_stride == 0 || out.is_empty() {
            return Ok(());
        }
        let num_row = out.len() / row_stride;
        let (nblock, block_size) = Self::block_info(config.nthread(), num_row, 1);
        if nblock <= 1 {
            return inner_fun(0, out);
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.nthread())
            .build()
            .map_err(|e| TreeliteError::threading(e.to_string()))?;
        pool.install(|| {
            out.par_chunks_mut(block_size * row_stride)
                .enumerate()
                .try_for_each(|(block_id, chunk)| inner_fun(block_id * block_size, chunk))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_config_sentinels() {
        assert_eq!(ThreadConfig::new(-1).unwrap().nthread(), 1);
        assert_eq!(ThreadConfig::new(3).unwrap().nthread(), 3);
        assert!(ThreadConfig::new(0).unwrap().nthread() >= 1);
        assert!(ThreadConfig::new(-2).is_err());
    }

    #[test]
    fn test_block_info() {
        assert_eq!(Threading::block_info(4, 10, 1), (4, 3));
        assert_eq!(Threading::block_info(4, 2, 1), (2, 1));
        assert_eq!(Threading::block_info(1, 10, 1), (1, 10));
        assert_eq!(Threading::block_info(8, 0, 1), (1, 0));
        assert_eq!(Threading::block_info(8, 10, 4), (3, 4));
    }

    #[test]
    fn test_for_row_blocks_covers_all_rows() {
        let config = ThreadConfig::new(4).unwrap();
        let mut out = vec![0usize; 11 * 2];
        Threading::for_row_blocks(&config, &mut out, 2, |first_row, chunk| {
            for (i, row) in chunk.chunks_mut(2).enumerate() {
                row[0] = first_row + i;
                row[1] = 1;
            }
            Ok(())
        })
        .unwrap();
        for (row_id, row) in out.chunks(2).enumerate() {
            assert_eq!(row[0], row_id);
            assert_eq!(row[1], 1);
        }
    }

    #[test]
    fn test_for_row_blocks_propagates_error() {
        let config = ThreadConfig::new(2).unwrap();
        let mut out = vec![0u8; 8];
        let result = Threading::for_row_blocks(&config, &mut out, 1, |first_row, _| {
            if first_row > 0 {
                Err(TreeliteError::config("boom"))
            } else {
                Ok(())
            }
        });
        assert!(result.is_err());
    }
}
