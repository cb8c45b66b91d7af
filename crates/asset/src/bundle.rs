use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use dfs_file_ops::{ensure_dir, ensure_parent};
use dfs_protocol::BundleKind;
use rand::Rng;
use zip::write::SimpleFileOptions;

use crate::AssetError;

/// Transport unit of one asset.
pub enum Bundle {
    /// The only file of the asset, sent as is.
    Single(PathBuf),
    /// A zip built for this transfer; removed when dropped.
    Zip(TempBundle),
}

impl Bundle {
    pub fn path(&self) -> &Path {
        match self {
            Bundle::Single(path) => path,
            Bundle::Zip(zip) => zip.path(),
        }
    }

    pub fn kind(&self) -> BundleKind {
        match self {
            Bundle::Single(_) => BundleKind::Single,
            Bundle::Zip(_) => BundleKind::Zip,
        }
    }
}

/// A temporary zip archive, deleted on drop.
#[derive(Debug)]
pub struct TempBundle {
    path: PathBuf,
}

impl TempBundle {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempBundle {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to remove temp bundle");
            }
        }
    }
}

/// Packs `files` into one transport unit.
///
/// A single file is its own bundle. Several files go into a new zip inside
/// `root`, each entry named by its path relative to `root`.
pub fn pack(root: &Path, files: &[PathBuf]) -> Result<Bundle, AssetError> {
    match files {
        [] => Err(AssetError::InvalidArgument("no files to bundle".into())),
        [only] => Ok(Bundle::Single(only.clone())),
        _ => {
            let mut entries = Vec::with_capacity(files.len());
            for file in files {
                let rel = file.strip_prefix(root).map_err(|_| {
                    AssetError::InvalidArgument(format!(
                        "{} is outside {}",
                        file.display(),
                        root.display()
                    ))
                })?;
                entries.push((file.as_path(), rel.to_string_lossy().replace('\\', "/")));
            }

            let bundle = TempBundle {
                path: unused_zip_path(root),
            };
            write_zip(&bundle.path, &entries)?;
            tracing::debug!(path = %bundle.path.display(), entries = entries.len(), "packed asset bundle");
            Ok(Bundle::Zip(bundle))
        }
    }
}

/// Extracts `zip` under `dest`, recreating its directory structure.
///
/// Returns the extracted files in archive order, or nothing at all when
/// the archive cannot be read.
pub fn unpack(zip: &Path, dest: &Path) -> Vec<PathBuf> {
    match try_unpack(zip, dest) {
        Ok(files) => files,
        Err(e) => {
            tracing::warn!(path = %zip.display(), error = %e, "failed to unpack asset bundle");
            Vec::new()
        }
    }
}

fn try_unpack(zip: &Path, dest: &Path) -> Result<Vec<PathBuf>, AssetError> {
    let mut archive = zip::ZipArchive::new(File::open(zip)?)?;
    let mut extracted = Vec::with_capacity(archive.len());

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let Some(rel) = entry.enclosed_name().map(|p| p.to_path_buf()) else {
            tracing::warn!(name = entry.name(), "skipping zip entry with unsafe name");
            continue;
        };
        let out = dest.join(rel);
        if entry.is_dir() {
            ensure_dir(&out)?;
            continue;
        }
        ensure_parent(&out)?;
        let mut file = File::create(&out)?;
        io::copy(&mut entry, &mut file)?;
        extracted.push(out);
    }
    Ok(extracted)
}

fn write_zip(path: &Path, entries: &[(&Path, String)]) -> Result<(), AssetError> {
    let mut writer = zip::ZipWriter::new(File::create(path)?);
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    for (source_path, name) in entries {
        let mut source = File::open(source_path)?;
        writer.start_file(name.as_str(), options)?;
        io::copy(&mut source, &mut writer)?;
    }
    writer.finish()?;
    Ok(())
}

/// `<epoch_ms>_<random>.zip` inside `root`, not yet taken.
fn unused_zip_path(root: &Path) -> PathBuf {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    loop {
        let mut salt = [0u8; 4];
        rand::thread_rng().fill(&mut salt);
        let candidate = root.join(format!("{millis}_{}.zip", hex::encode(salt)));
        if !candidate.exists() {
            return candidate;
        }
    }
}
