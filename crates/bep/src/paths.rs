//! Resolution of tool-emitted file URIs to local paths.
//!
//! Events reference artifacts by URI; where those land on disk depends on
//! the tool's installation (output base, remote cache mounts), so the
//! mapping is a collaborator the orchestrator injects.

use std::path::PathBuf;

/// Maps an event-carried URI to an on-disk location
pub trait PathResolver: Send + Sync {
    /// `None` when the URI does not refer to anything locally readable
    fn resolve_uri(&self, uri: &str) -> Option<PathBuf>;
}

/// Resolver for the common case: artifacts are plain local files published
/// as `file://` URIs
#[derive(Debug, Default)]
pub struct LocalPathResolver;

impl PathResolver for LocalPathResolver {
    fn resolve_uri(&self, uri: &str) -> Option<PathBuf> {
        let path = uri.strip_prefix("file://")?;
        if path.is_empty() {
            return None;
        }
        Some(PathBuf::from(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_file_uris() {
        let resolver = LocalPathResolver;
        assert_eq!(
            resolver.resolve_uri("file:///tmp/out/lib.a"),
            Some(PathBuf::from("/tmp/out/lib.a"))
        );
    }

    #[test]
    fn rejects_non_file_schemes() {
        let resolver = LocalPathResolver;
        assert_eq!(resolver.resolve_uri("bytestream://cas/abc"), None);
        assert_eq!(resolver.resolve_uri("file://"), None);
    }
}
