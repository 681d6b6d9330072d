use std::path::{Path, PathBuf};

/// Computes the rotated sibling paths that may hold content written before
/// the current file, in the order they should be drained.
pub trait RotationNamingStrategy: Send + Sync {
    /// Returns candidate paths oldest-content-first. Candidates that do not
    /// exist on disk are simply not returned; absence is never an error.
    fn rotated_candidates(&self, path: &Path) -> Vec<PathBuf>;
}

/// Numeric-suffix rotation (`app.log.1`, `app.log.2`, ...), where a larger
/// suffix holds older content. Candidates are returned largest-suffix-first
/// so the oldest backlog is drained before newer rotations.
#[derive(Debug, Default, Clone, Copy)]
pub struct NumberSuffixStrategy;

impl RotationNamingStrategy for NumberSuffixStrategy {
    fn rotated_candidates(&self, path: &Path) -> Vec<PathBuf> {
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            return Vec::new();
        };
        let Some(parent) = path.parent() else {
            return Vec::new();
        };

        let prefix = format!("{}.", file_name);
        let entries = match std::fs::read_dir(parent) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };

        let mut numbered: Vec<(u64, PathBuf)> = entries
            .flatten()
            .filter_map(|entry| {
                let name = entry.file_name();
                let name = name.to_str()?;
                let suffix = name.strip_prefix(&prefix)?;
                let number: u64 = suffix.parse().ok()?;
                Some((number, entry.path()))
            })
            .collect();

        numbered.sort_by(|a, b| b.0.cmp(&a.0));
        numbered.into_iter().map(|(_, path)| path).collect()
    }
}
