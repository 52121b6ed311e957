//! Filter for notifications caused by our own output.
//!
//! Every successful index run rewrites `<root>/<output-name>`, and the staging
//! file it is built in lives in the same directory. Without this filter each
//! run would mark its root dirty again and the dispatcher would never idle.

use std::ffi::{OsStr, OsString};

/// Suffix of the staging file an index run writes before installing it.
pub const STAGING_SUFFIX: &str = ".tmp";

/// Recognizes the reserved output name and its staging files.
#[derive(Debug, Clone)]
pub struct OutputFilter {
    output_name: OsString,
    staging_prefix: String,
}

impl OutputFilter {
    pub fn new(output_name: &str) -> Self {
        Self {
            output_name: OsString::from(output_name),
            staging_prefix: staging_prefix(output_name),
        }
    }

    /// True if a notification about `name` must not mark its root dirty.
    pub fn is_ignored(&self, name: &OsStr) -> bool {
        if name == self.output_name {
            return true;
        }
        match name.to_str() {
            Some(name) => name.starts_with(&self.staging_prefix) && name.ends_with(STAGING_SUFFIX),
            None => false,
        }
    }
}

/// `tags` -> `.tags.`
pub fn staging_prefix(output_name: &str) -> String {
    format!(".{output_name}.")
}
