use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use log::debug;

use super::types::DatasetRow;
use crate::error::ConfigError;

/// Load dataset rows from a tabular file. `.csv` files use the header
/// row as column names; `.json` files hold an array of flat string
/// objects. Anything else is a configuration error.
pub fn load_rows(path: &Path) -> Result<Vec<DatasetRow>, ConfigError> {
    let rows = match path.extension().and_then(|e| e.to_str()) {
        Some("csv") => load_csv(path)?,
        Some("json") => load_json(path)?,
        _ => return Err(ConfigError::UnsupportedDatasetFormat(path.to_path_buf())),
    };
    debug!("loaded {} dataset rows from {}", rows.len(), path.display());
    Ok(rows)
}

fn load_csv(path: &Path) -> Result<Vec<DatasetRow>, ConfigError> {
    let file = File::open(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = csv::Reader::from_reader(file);
    let mut rows = Vec::new();
    for record in reader.deserialize() {
        let row: HashMap<String, String> = record.map_err(|e| ConfigError::Dataset {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        rows.push(row);
    }
    Ok(rows)
}

fn load_json(path: &Path) -> Result<Vec<DatasetRow>, ConfigError> {
    let file = File::open(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_reader(file).map_err(|e| ConfigError::Dataset {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_csv_rows_keyed_by_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.csv");
        let mut file = File::create(&path).unwrap();
        writeln!(file, "username,password").unwrap();
        writeln!(file, "alice,secret1").unwrap();
        writeln!(file, "bob,secret2").unwrap();

        let rows = load_rows(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["username"], "alice");
        assert_eq!(rows[1]["password"], "secret2");
    }

    #[test]
    fn test_json_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        std::fs::write(&path, r#"[{"username": "alice"}, {"username": "bob"}]"#).unwrap();

        let rows = load_rows(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1]["username"], "bob");
    }

    #[test]
    fn test_unsupported_extension_is_config_error() {
        let err = load_rows(Path::new("users.xlsx")).unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedDatasetFormat(_)));
    }
}
