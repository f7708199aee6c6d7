//! Config composition for AlphaFold3 training runs
//!
//! A run's configuration is assembled from named alternatives kept in a
//! [`ConfigRegistry`] (`data/pdb`, `model/alphafold3`, `trainer/default`,
//! ...), combined by a [`Composer`] with an experiment overlay and
//! command-line overrides, and finally passed through a [`Resolver`] that
//! expands placeholder expressions:
//!
//! - `${data.crop_size}` interpolates another key of the merged tree
//! - `${now:%Y-%m-%d_%H-%M-%S}` formats the run's timestamp
//! - `${oc.env:HOME}` reads an environment variable
//! - `${resolve_variable:torch.float32}` becomes a deferred [`CallableRef`]
//! - `${int_divide:${data.batch_size},${trainer.devices}}` and friends do
//!   integer arithmetic
//!
//! ```
//! use af3_config::{Composer, ConfigNode, ConfigRegistry, GroupSelection};
//!
//! let mut registry = ConfigRegistry::new();
//! registry.register("data", "pdb", serde_yaml::from_str("crop_size: 384").unwrap());
//!
//! let overlay: ConfigNode = serde_yaml::from_str("data: {crop_size: 5120}").unwrap();
//! let defaults: Vec<GroupSelection> = vec!["data=pdb".parse().unwrap()];
//! let config = Composer::new(&registry).compose(&defaults, Some(&overlay)).unwrap();
//!
//! assert_eq!(config.get_path(&"data.crop_size".parse().unwrap()).and_then(|v| v.as_i64()), Some(5120));
//! ```

pub mod composer;
pub mod defaults;
pub mod error;
pub mod loader;
pub mod merge;
pub mod overrides;
pub mod path;
pub mod registry;
pub mod resolver;
pub mod value;

pub use composer::{Composer, Composition, EXPERIMENT_GROUP};
pub use defaults::{DefaultEntry, DefaultsList, OverrideDirective};
pub use error::{Error, Result};
pub use loader::RegistryLoader;
pub use merge::{merge_at, merge_nodes};
pub use overrides::{CommandLineOverride, OverrideAction};
pub use path::{KeyPath, PathSegment};
pub use registry::{ConfigRegistry, GroupSelection};
pub use resolver::Resolver;
pub use value::{CallableRef, ConfigNode, Value};
