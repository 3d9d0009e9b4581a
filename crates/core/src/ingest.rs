use crate::error::IngestError;
use crate::models::{Location, SourceItem};
use crate::traits::RecordSource;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

/// Lists the regular files directly inside `folder`, sorted by path.
///
/// Every file is returned, tagged with its format, so unsupported files show
/// up in the run report instead of vanishing.
pub fn discover_source_items(folder: &Path) -> Result<Vec<SourceItem>, IngestError> {
    if !folder.is_dir() {
        return Err(IngestError::InvalidArgument(format!(
            "not a directory: {}",
            folder.display()
        )));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(folder).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|error| {
            IngestError::Io(
                error
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("directory walk failed")),
            )
        })?;

        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    files.sort_unstable();

    files.into_iter().map(source_item_for_file).collect()
}

fn source_item_for_file(path: PathBuf) -> Result<SourceItem, IngestError> {
    // Non UTF-8 names keep their item; the id carries replacement characters.
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| IngestError::MissingFileName(path.display().to_string()))?;

    Ok(SourceItem::new(name, Location::File(path)))
}

/// Where a run reads its items from.
#[derive(Clone)]
pub enum IngestSource {
    Directory(PathBuf),
    Records(Arc<dyn RecordSource>),
}

impl IngestSource {
    pub async fn enumerate(&self) -> Result<Vec<SourceItem>, IngestError> {
        match self {
            Self::Directory(folder) => {
                let folder = folder.clone();
                tokio::task::spawn_blocking(move || discover_source_items(&folder))
                    .await
                    .map_err(|error| IngestError::Io(std::io::Error::other(error)))?
            }
            Self::Records(records) => records.scan().await,
        }
    }
}

impl fmt::Debug for IngestSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Directory(folder) => f.debug_tuple("Directory").field(folder).finish(),
            Self::Records(_) => f.write_str("Records"),
        }
    }
}
