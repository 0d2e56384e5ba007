//! Loading input documents from a directory.

use std::path::Path;

use anyhow::Context;
use narrascope_ai::Document;

/// Every `*.txt` file directly under `dir`, sorted by file name. The file
/// name (extension included) becomes the document's `file_id`.
pub fn load_dir(dir: &Path) -> anyhow::Result<Vec<Document>> {
    let entries =
        std::fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))?;

    let mut paths = Vec::new();
    for entry in entries {
        let path = entry
            .with_context(|| format!("listing {}", dir.display()))?
            .path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "txt") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut docs = Vec::with_capacity(paths.len());
    for path in paths {
        let Some(file_id) = path.file_name().and_then(|n| n.to_str()) else {
            tracing::warn!(path = %path.display(), "skipping non-UTF-8 file name");
            continue;
        };
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        docs.push(Document::new(file_id, text));
    }
    Ok(docs)
}
