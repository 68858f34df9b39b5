use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// File names in `folder` whose extension matches `extension` (without the
/// dot, any case), sorted by name. Subdirectories are ignored.
pub fn discover_work_items(folder: &Path, extension: &str) -> Result<Vec<String>> {
    let extension = extension.trim_start_matches('.');
    let entries = fs::read_dir(folder)
        .with_context(|| format!("Failed to list work folder {}", folder.display()))?;

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("Failed to read {}", folder.display()))?;
        if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }
        let path = entry.path();
        let matches = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(extension));
        if matches {
            if let Some(name) = path.file_name().and_then(|name| name.to_str()) {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}
