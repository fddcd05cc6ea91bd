//! Configuration — TOML loading and resolved types.
//!
//! - `raw` — serde targets mirroring the TOML file shape.
//! - `types` — resolved structs that subsystems consume.
//! - `load` — file reading, `[meta] base` inheritance, env overrides.

mod load;
mod raw;
mod types;

pub use load::{expand_home, load, load_from};
pub use types::*;
