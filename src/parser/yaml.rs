use std::path::Path;

use log::info;

use super::dataset;
use super::types::Suite;
use crate::error::ConfigError;

/// Load, normalize and shape-check a suite document, pulling in any
/// dataset files referenced by its tests (resolved relative to the
/// suite file).
pub fn load_suite(path: &Path) -> Result<Suite, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut suite = parse_suite(&raw)?;

    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    for (test_id, test) in suite.tests.iter_mut() {
        if let Some(data_file) = &test.data_file {
            let data_path = base_dir.join(data_file);
            let rows = dataset::load_rows(&data_path)?;
            info!("test '{}' bound to {} dataset rows", test_id, rows.len());
            test.dataset = Some(rows);
        }
    }
    Ok(suite)
}

/// Parse a suite from YAML text. Datasets referenced by `dataFile` are
/// not loaded here; use [`load_suite`] for that.
pub fn parse_suite(raw: &str) -> Result<Suite, ConfigError> {
    let mut suite: Suite = serde_yaml::from_str(raw)?;
    suite.normalize();
    suite.validate()?;
    Ok(suite)
}
