//! Filename codec for asset transfers.
//!
//! The transport only carries `(source, destination)` path pairs, so the
//! session metadata rides inside the destination name:
//!
//! ```text
//! <dstBundleName>/ASSET_TEMP/<relativePath><marker>srcBundleName=<src>&sessionId=<sid>
//! ```
//!
//! `<marker>` is [`ASSET_FLAG_SINGLE`] or [`ASSET_FLAG_ZIP`]. A received path
//! may additionally carry the receive root in front of the bundle name; the
//! bundle name is then the segment following [`RECV_ROOT_INFIX`].
//!
//! Call sites never slice these strings themselves; everything goes through
//! [`WireName::encode`] and [`WireName::decode`].

use std::path::Path;

use crate::constants::{
    ASSET_FLAG_SINGLE, ASSET_FLAG_ZIP, ASSET_TEMP_DIR, DISTRIBUTED_FILES_PATH, FILE_SCHEME,
    QUERY_SESSION_ID, QUERY_SRC_BUNDLE, RECV_ROOT_INFIX,
};

/// Characters that would make a name field ambiguous on the wire.
const RESERVED_CHARS: &[char] = &['/', '?', '&', '='];

/// Errors produced while encoding or decoding a wire name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("no asset marker in {0}")]
    MissingMarker(String),

    #[error("malformed metadata query: {0}")]
    MalformedQuery(String),

    #[error("missing ASSET_TEMP segment in {0}")]
    MissingTempDir(String),

    #[error("illegal {field}: {value:?}")]
    IllegalField { field: &'static str, value: String },

    #[error("{path} is not inside bundle {bundle}")]
    NotInBundle { path: String, bundle: String },
}

/// How the receiver must treat the transported file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BundleKind {
    /// The file is the asset itself.
    Single,
    /// The file is a zip archive to be unpacked.
    Zip,
}

impl BundleKind {
    /// Returns the wire marker for this kind.
    pub fn marker(self) -> &'static str {
        match self {
            BundleKind::Single => ASSET_FLAG_SINGLE,
            BundleKind::Zip => ASSET_FLAG_ZIP,
        }
    }
}

/// Decoded form of an asset destination filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireName {
    pub dst_bundle_name: String,
    pub src_bundle_name: String,
    pub session_id: String,
    /// Path of the file relative to the bundle root.
    pub relative_path: String,
    pub kind: BundleKind,
}

impl WireName {
    /// Builds the wire name for a sender-side file.
    ///
    /// The relative path is `file` relative to `bundle_root`, the directory
    /// the source bundle's files are resolved under.
    pub fn for_send(
        file: &Path,
        bundle_root: &Path,
        src_bundle_name: &str,
        dst_bundle_name: &str,
        session_id: &str,
        kind: BundleKind,
    ) -> Result<Self, CodecError> {
        let relative = file
            .strip_prefix(bundle_root)
            .map_err(|_| CodecError::NotInBundle {
                path: file.display().to_string(),
                bundle: bundle_root.display().to_string(),
            })?;
        let name = Self {
            dst_bundle_name: dst_bundle_name.to_string(),
            src_bundle_name: src_bundle_name.to_string(),
            session_id: session_id.to_string(),
            relative_path: relative.to_string_lossy().replace('\\', "/"),
            kind,
        };
        name.validate()?;
        Ok(name)
    }

    /// Encodes into the transport destination filename.
    pub fn encode(&self) -> Result<String, CodecError> {
        self.validate()?;
        Ok(format!(
            "{}{}{QUERY_SRC_BUNDLE}{}{QUERY_SESSION_ID}{}",
            self.staged_path(),
            self.kind.marker(),
            self.src_bundle_name,
            self.session_id,
        ))
    }

    /// Decodes a transport filename, with or without the receive root in front.
    pub fn decode(path: &str) -> Result<Self, CodecError> {
        let (pos, kind) =
            find_marker(path).ok_or_else(|| CodecError::MissingMarker(path.to_string()))?;
        let prefix = &path[..pos];
        let query = &path[pos + kind.marker().len()..];

        let (src_bundle_name, session_id) = query
            .strip_prefix(QUERY_SRC_BUNDLE)
            .and_then(|rest| rest.rsplit_once(QUERY_SESSION_ID))
            .ok_or_else(|| CodecError::MalformedQuery(query.to_string()))?;

        let prefix = match prefix.find(RECV_ROOT_INFIX) {
            Some(i) => &prefix[i + RECV_ROOT_INFIX.len()..],
            None => prefix,
        };
        let (dst_bundle_name, relative_path) = prefix
            .split_once('/')
            .and_then(|(dst, rest)| {
                rest.strip_prefix(ASSET_TEMP_DIR)
                    .and_then(|r| r.strip_prefix('/'))
                    .map(|rel| (dst, rel))
            })
            .ok_or_else(|| CodecError::MissingTempDir(path.to_string()))?;

        let name = Self {
            dst_bundle_name: dst_bundle_name.to_string(),
            src_bundle_name: src_bundle_name.to_string(),
            session_id: session_id.to_string(),
            relative_path: relative_path.to_string(),
            kind,
        };
        name.validate()?;
        Ok(name)
    }

    /// `<dst>/ASSET_TEMP/<relative>`: where the file lands before the move.
    pub fn staged_path(&self) -> String {
        format!(
            "{}/{ASSET_TEMP_DIR}/{}",
            self.dst_bundle_name, self.relative_path
        )
    }

    /// `<dst>/ASSET_TEMP`: the per-bundle directory removed after a session.
    pub fn temp_dir(&self) -> String {
        temp_dir_of(&self.dst_bundle_name)
    }

    fn validate(&self) -> Result<(), CodecError> {
        check_name("dstBundleName", &self.dst_bundle_name)?;
        check_name("srcBundleName", &self.src_bundle_name)?;
        check_name("sessionId", &self.session_id)?;

        let rel = &self.relative_path;
        if rel.is_empty()
            || rel.starts_with('/')
            || rel.contains(ASSET_FLAG_SINGLE)
            || rel.contains(ASSET_FLAG_ZIP)
            || rel.contains(RECV_ROOT_INFIX)
        {
            return Err(CodecError::IllegalField {
                field: "relativePath",
                value: rel.clone(),
            });
        }
        Ok(())
    }
}

/// Strips the marker and query, returning the true file path and its kind.
pub fn strip_marker(path: &str) -> Option<(&str, BundleKind)> {
    find_marker(path).map(|(pos, kind)| (&path[..pos], kind))
}

/// `<dst>/ASSET_TEMP` for a destination bundle.
pub fn temp_dir_of(dst_bundle_name: &str) -> String {
    format!("{dst_bundle_name}/{ASSET_TEMP_DIR}")
}

/// Application-visible URI of a received file.
pub fn receive_uri(dst_bundle_name: &str, relative_path: &str) -> String {
    format!("{FILE_SCHEME}{dst_bundle_name}{DISTRIBUTED_FILES_PATH}/{relative_path}")
}

fn find_marker(path: &str) -> Option<(usize, BundleKind)> {
    let single = path.find(ASSET_FLAG_SINGLE).map(|p| (p, BundleKind::Single));
    let zip = path.find(ASSET_FLAG_ZIP).map(|p| (p, BundleKind::Zip));
    match (single, zip) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

fn check_name(field: &'static str, value: &str) -> Result<(), CodecError> {
    if value.is_empty() || value.contains(RESERVED_CHARS) {
        return Err(CodecError::IllegalField {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}
