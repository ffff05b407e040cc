#![doc = include_str!("../README.md")]

pub(crate) mod internal_prelude {
    #[allow(unused_imports)]
    pub(crate) use tracing::{debug, error, info, trace, warn};

    pub(crate) use crate::errors::*;
}

pub mod errors {
    #[allow(unused_imports)]
    pub use color_eyre::eyre::{bail, eyre, ContextCompat, WrapErr};
    pub use color_eyre::Result;
}

pub mod cli;
pub mod client;
pub mod daemon;
pub mod tracing;
