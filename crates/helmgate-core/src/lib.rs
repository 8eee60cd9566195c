//! helmgate Core - the plumbing under the chart/release backend
//!
//! This crate provides:
//! - `CommandRunner`: runs the package-manager tool with bounded-time output capture
//! - `archive`: safe extraction of `.tgz` chart archives
//! - `Layout`: the on-disk working directory shared by the tool and the cache
//! - `Settings`: configuration file
//! - `FormatRegistry`: decoders for the tool's structured output

pub mod archive;
pub mod config;
pub mod error;
pub mod exec;
pub mod format;
pub mod layout;

pub use config::Settings;
pub use error::{CoreError, Result};
pub use exec::{CommandResult, CommandRunner, CommandSpec, PoolConfig};
pub use format::{Decoder, FormatRegistry};
pub use layout::Layout;
