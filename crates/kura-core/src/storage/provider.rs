use std::fmt::Debug;

use crate::error::Result;

/// Optional hook mirroring storage bytes to a remote location.
///
/// The manager stores the reference and hands it to each file-based
/// backend constructed afterwards; it owns no protocol beyond that.
/// File specs are passed in their portable (macro-collapsed) form so the
/// remote side is installation independent.
pub trait StreamProvider: Send + Sync + Debug {
    /// Fetch the remote copy for `file_spec`, if one exists
    fn read(&self, file_spec: &str) -> Result<Option<Vec<u8>>>;

    /// Mirror freshly written bytes for `file_spec`
    fn write(&self, file_spec: &str, content: &[u8]) -> Result<()>;
}
