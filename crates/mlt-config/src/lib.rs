//! Hierarchical job configuration: a YAML tree with command-line overrides
//! and `${...}` interpolation, plus flattening into dotted parameters.

mod error;
pub mod flatten;
pub mod interpolate;
pub mod load;
mod node;
pub mod overrides;

pub use error::{ConfigError, Result};
pub use flatten::{collect_params, flatten_params, ParamEntry};
pub use load::{config_file, load_mapping, parse_mapping, ComposedConfig, ResolvedConfig};
pub use node::{ConfigNode, Mapping, Scalar};
pub use overrides::{apply_overrides, parse_overrides, Override, OverrideOp};
