//! Sandbox URI parsing.
//!
//! URIs look like `file://<authority>/<path>[?networkid=<id>]`. Dot
//! segments are kept as written; traversal is checked on the raw text.

use dfs_protocol::constants::{DOCS_AUTHORITY, FILE_SCHEME, MEDIA_AUTHORITY, NETWORK_PARA};
use percent_encoding::percent_decode_str;

use crate::FileOpsError;

/// A parsed `file://` URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUri {
    /// Bundle name, `media`, `docs`, or empty for a bare path.
    pub authority: String,
    /// Percent-decoded absolute path.
    pub path: String,
    /// Device holding the file, when the URI points at a peer.
    pub network_id: Option<String>,
}

impl FileUri {
    pub fn parse(uri: &str) -> Result<Self, FileOpsError> {
        let rest = uri
            .strip_prefix(FILE_SCHEME)
            .ok_or_else(|| FileOpsError::InvalidUri(format!("not a file uri: {uri}")))?;

        let (body, network_id) = match rest.find(NETWORK_PARA) {
            Some(pos) => (
                &rest[..pos],
                Some(rest[pos + NETWORK_PARA.len()..].to_string()),
            ),
            None => (rest, None),
        };
        // Any other query is not ours; drop it.
        let body = body.split('?').next().unwrap_or(body);

        let slash = body
            .find('/')
            .ok_or_else(|| FileOpsError::InvalidUri(format!("missing path: {uri}")))?;
        let authority = body[..slash].to_string();
        let path = percent_decode_str(&body[slash..])
            .decode_utf8()
            .map_err(|e| FileOpsError::InvalidUri(format!("{uri}: {e}")))?
            .into_owned();

        Ok(Self {
            authority,
            path,
            network_id: network_id.filter(|id| !id.is_empty()),
        })
    }

    /// Whether the file lives on another device.
    pub fn is_remote(&self) -> bool {
        self.network_id.is_some()
    }

    pub fn is_media(&self) -> bool {
        self.authority == MEDIA_AUTHORITY
    }

    pub fn is_docs(&self) -> bool {
        self.authority == DOCS_AUTHORITY
    }

    /// Last path segment.
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or_default()
    }
}

/// Returns `uri` without its `?networkid=` suffix.
pub fn strip_network_param(uri: &str) -> &str {
    match uri.find(NETWORK_PARA) {
        Some(pos) => &uri[..pos],
        None => uri,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bundle_uri() {
        let uri = FileUri::parse("file://com.demo.a/data/storage/el2/base/a.txt").unwrap();
        assert_eq!(uri.authority, "com.demo.a");
        assert_eq!(uri.path, "/data/storage/el2/base/a.txt");
        assert!(uri.network_id.is_none());
        assert!(!uri.is_remote());
    }

    #[test]
    fn parses_bare_path_uri() {
        let uri = FileUri::parse("file:///tmp/a/src.txt").unwrap();
        assert_eq!(uri.authority, "");
        assert_eq!(uri.path, "/tmp/a/src.txt");
    }

    #[test]
    fn extracts_network_id() {
        let uri = FileUri::parse("file://docs/storage/a.txt?networkid=abc123").unwrap();
        assert_eq!(uri.network_id.as_deref(), Some("abc123"));
        assert!(uri.is_remote());
        assert!(uri.is_docs());
        assert_eq!(uri.path, "/storage/a.txt");
    }

    #[test]
    fn decodes_percent_escapes() {
        let uri = FileUri::parse("file://media/Photo/1/IMG%20001.jpg").unwrap();
        assert!(uri.is_media());
        assert_eq!(uri.path, "/Photo/1/IMG 001.jpg");
        assert_eq!(uri.file_name(), "IMG 001.jpg");
    }

    #[test]
    fn keeps_dot_segments_verbatim() {
        let uri = FileUri::parse("file://app/data/../secret").unwrap();
        assert_eq!(uri.path, "/data/../secret");
    }

    #[test]
    fn rejects_other_schemes() {
        assert!(matches!(
            FileUri::parse("http://host/x"),
            Err(FileOpsError::InvalidUri(_))
        ));
    }

    #[test]
    fn rejects_missing_path() {
        assert!(FileUri::parse("file://bundle").is_err());
    }

    #[test]
    fn strips_network_param() {
        assert_eq!(strip_network_param("file://a/b?networkid=x"), "file://a/b");
        assert_eq!(strip_network_param("file://a/b"), "file://a/b");
    }
}
