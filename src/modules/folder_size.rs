use crate::config::{self, FolderSizeConfig};
use crate::error::{FailureClass, ModuleError, Result};
use crate::host::ErrorSeverity;
use crate::item::{Batch, DataItem};
use crate::stage::{Disposition, Stage, StageContext};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Probe that reports the total size of a folder each time it is triggered.
///
/// The delivered batch is only a trigger; its content is ignored.
#[derive(Debug, Clone)]
pub struct FolderSizeProbe {
    folder: PathBuf,
}

impl FolderSizeProbe {
    /// Fails if the folder does not exist
    pub fn new(config: FolderSizeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            folder: config.folder_name,
        })
    }

    pub fn from_config(document: &str) -> Result<Self> {
        Self::new(config::parse(document)?)
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }
}

impl Stage for FolderSizeProbe {
    fn handle(&self, _batch: Batch, cx: &StageContext<'_>) -> Result<Disposition> {
        match folder_size(&self.folder) {
            Ok(size) => Ok(Disposition::Complete(Some(Batch::single(DataItem::sample(
                format!("Folder size is '{}' bytes", size),
            ))))),
            Err(err) => match FailureClass::of_io(&err, true) {
                FailureClass::Fatal => Err(ModuleError::fatal(
                    format!("Cannot compute size of folder {}", self.folder.display()),
                    err,
                )),
                FailureClass::Transient => {
                    cx.report(ErrorSeverity::Warning, &ModuleError::Io(err));
                    Ok(Disposition::Complete(None))
                }
            },
        }
    }

    fn name(&self) -> &str {
        "folder-size-probe"
    }
}

/// Total size in bytes of the regular files below `root`. Symbolic links are
/// not followed.
///
/// A missing `root` fails with `NotFound`. Files and subdirectories that
/// vanish during the walk are skipped.
pub fn folder_size(root: &Path) -> io::Result<u64> {
    let mut pending = Vec::new();
    let mut total = dir_size(root, &mut pending)?;
    while let Some(dir) = pending.pop() {
        total += skip_vanished(dir_size(&dir, &mut pending))?;
    }
    Ok(total)
}

/// Size of the regular files directly in `dir`; subdirectories are queued
fn dir_size(dir: &Path, pending: &mut Vec<PathBuf>) -> io::Result<u64> {
    let mut total = 0;
    for entry in fs::read_dir(dir)? {
        let Some(entry) = skip_vanished(entry.map(Some))? else {
            continue;
        };
        let Some(file_type) = skip_vanished(entry.file_type().map(Some))? else {
            continue;
        };
        if file_type.is_dir() {
            pending.push(entry.path());
        } else if file_type.is_file() {
            if let Some(metadata) = skip_vanished(entry.metadata().map(Some))? {
                total += metadata.len();
            }
        }
    }
    Ok(total)
}

fn skip_vanished<T: Default>(result: io::Result<T>) -> io::Result<T> {
    match result {
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(T::default()),
        other => other,
    }
}
