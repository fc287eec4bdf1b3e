//! Input and output transports (filesystem today).

/// Batch listing and staged atomic writes on the local filesystem.
pub mod fs;
