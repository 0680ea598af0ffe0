//! Format version numbers and fixed limits shared across the crate.

/// Major version of the serialization format written by this library.
pub const VER_MAJOR: i32 = 4;

/// Minor version of the serialization format written by this library.
pub const VER_MINOR: i32 = 0;

/// Patch version of the serialization format written by this library.
pub const VER_PATCH: i32 = 0;

/// Legacy version that remains loadable despite a different major version.
pub const LEGACY_COMPATIBLE_VERSION: (i32, i32) = (3, 9);

/// Exclusive upper bound for split feature indices.
/// The top bit of a 32-bit index is reserved for the default-left flag.
pub const MAX_SPLIT_INDEX: u32 = (1u32 << 31) - 1;

/// Sentinel child id for leaf nodes.
pub const NO_CHILD: i32 = -1;

/// Sentinel target/class id meaning "tree produces the whole axis".
pub const ALL_SLOTS: i32 = -1;

/// Default `sigmoid_alpha` for the sigmoid and multiclass_ova post-processors.
pub const DEFAULT_SIGMOID_ALPHA: f32 = 1.0;

/// Default `ratio_c` for the exponential_standard_ratio post-processor.
pub const DEFAULT_RATIO_C: f32 = 1.0;

/// Default free-form attribute string attached to a model.
pub const DEFAULT_ATTRIBUTES: &str = "{}";

/// Crate version.
pub const TREELITE_RUST_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Version string of the serialization format.
pub fn format_version_string() -> String {
    format!("{}.{}.{}", VER_MAJOR, VER_MINOR, VER_PATCH)
}
