use crate::codec::Encoded;
use crate::db::Db;
use crate::errors::{StoreError, StoreResult};
use crate::models::Resource;
use crate::paths::basename_for;
use std::fmt;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// One filesystem side effect of a save batch. Actions borrow the resources
/// they store and do nothing until performed.
pub enum Action<'a> {
    PrepareDirectory {
        path: PathBuf,
    },
    StoreBlob {
        path: PathBuf,
        resource: &'a dyn Resource,
        view: String,
        extension: String,
    },
}

impl Action<'_> {
    pub fn path(&self) -> &Path {
        match self {
            Self::PrepareDirectory { path } | Self::StoreBlob { path, .. } => path,
        }
    }

    pub fn is_prepare_directory(&self) -> bool {
        matches!(self, Self::PrepareDirectory { .. })
    }
}

impl fmt::Debug for Action<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PrepareDirectory { path } => f
                .debug_struct("PrepareDirectory")
                .field("path", path)
                .finish(),
            Self::StoreBlob {
                path,
                resource,
                view,
                extension,
            } => f
                .debug_struct("StoreBlob")
                .field("path", path)
                .field("resource", &resource.resource_type().name())
                .field("view", view)
                .field("extension", extension)
                .finish(),
        }
    }
}

/// Executes planned actions. `FsSink` writes to disk; other sinks can record
/// or batch actions instead.
pub trait ActionSink {
    fn perform(&mut self, db: &Db, action: &Action<'_>) -> StoreResult<()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FsSink;

impl ActionSink for FsSink {
    fn perform(&mut self, db: &Db, action: &Action<'_>) -> StoreResult<()> {
        match action {
            Action::PrepareDirectory { path } => fs::create_dir_all(path)
                .map_err(|error| StoreError::Io(format!("{}: {}", path.to_string_lossy(), error))),
            Action::StoreBlob {
                path,
                resource,
                view,
                extension,
            } => {
                let encoded = db.encode(*resource, view, extension)?;
                write_blob(path, &encoded)
            }
        }
    }
}

fn write_blob(path: &Path, encoded: &Encoded) -> StoreResult<()> {
    let io_error = |error: std::io::Error| StoreError::Io(format!("{}: {}", path.to_string_lossy(), error));
    let mut file = File::create(path).map_err(io_error)?;
    match encoded {
        Encoded::Whole(bytes) => file.write_all(bytes).map_err(io_error)?,
        Encoded::Chunks(chunks) => {
            for chunk in chunks {
                file.write_all(chunk).map_err(io_error)?;
            }
        }
    }
    file.flush().map_err(io_error)
}

/// Orders the actions needed to store every resource under every view and
/// extension: the directory first, then one blob per (extension, view).
pub(crate) fn plan<'a>(
    db: &Db,
    root: &Path,
    resources: &[&'a dyn Resource],
    views: &[&str],
    exts: &[&str],
) -> StoreResult<Vec<Action<'a>>> {
    for ext in exts {
        if !db.accepts_extension(ext) {
            return Err(StoreError::UnsupportedExtension(format!(
                "'{}' is not one of [{}]",
                ext,
                db.extensions().join(", ")
            )));
        }
    }

    let mut actions = Vec::with_capacity(resources.len() * (1 + views.len() * exts.len()));
    for &resource in resources {
        let kind = resource.resource_type();
        for view in views {
            kind.view_fields(view)?;
        }
        let dir = db.path_for(root, resource)?;
        actions.push(Action::PrepareDirectory { path: dir.clone() });
        for ext in exts {
            for view in views {
                actions.push(Action::StoreBlob {
                    path: dir.join(basename_for(view, ext)),
                    resource,
                    view: (*view).to_string(),
                    extension: (*ext).to_string(),
                });
            }
        }
    }
    Ok(actions)
}
