//! Standard exit codes for CLI operations
//!
//! These exit codes follow Unix conventions and sysexits.h where applicable.

/// General error - unspecified failure
pub const ERROR: u8 = 1;

/// Tool error - the package-manager command could not run or reported failure
pub const TOOL_ERROR: u8 = 2;

/// Artifact error - chart could not be downloaded or extracted
pub const ARTIFACT_ERROR: u8 = 3;

/// Cluster error - API unreachable or no schema version accepted
pub const CLUSTER_ERROR: u8 = 4;

/// IO error - file not found, permission denied, etc.
pub const IO_ERROR: u8 = 5;

/// Timeout - a command ran past its deadline
pub const TIMEOUT: u8 = 6;

/// Usage error - invalid arguments or options (following sysexits.h convention)
pub const USAGE_ERROR: u8 = 64;

/// Configuration error (sysexits.h EX_CONFIG)
pub const CONFIG_ERROR: u8 = 78;
