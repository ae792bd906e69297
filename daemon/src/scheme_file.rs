//! Reference scheme deserializer: JSON files into the DTO. Any format
//! able to produce an [`Ischeme`] can replace this.

use std::path::Path;

use klish_core::Ischeme;

/// Read and merge scheme files in order. Entry-level merging (duplicate
/// views) is the loader's job; this only concatenates the DTOs.
pub fn read_scheme_files(paths: &[impl AsRef<Path>]) -> anyhow::Result<Ischeme> {
    let mut merged = Ischeme::default();
    for path in paths {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("can't read scheme {}: {e}", path.display()))?;
        let part: Ischeme = serde_json::from_str(&text)
            .map_err(|e| anyhow::anyhow!("bad scheme {}: {e}", path.display()))?;
        merged.plugins.extend(part.plugins);
        merged.entries.extend(part.entries);
    }
    Ok(merged)
}
