use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::io::Read;
use std::path::Path;

/// Reads the file at `path`, or stdin when `path` is `-`.
pub fn read_source(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut source = String::new();
        std::io::stdin()
            .read_to_string(&mut source)
            .context("Could not read stdin")?;
        return Ok(source);
    }
    fs::read_to_string(path).with_context(|| format!("Could not read {}", path.display()))
}

pub fn to_json<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

/// Prints `value` as pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    // We're printing command output to stdout, so we don't use tracing
    println!("{}", to_json(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_read_source_from_file() {
        let dir = TempDir::new().unwrap();
        let path = testing::fixtures::write_fixture(dir.path(), "snippet.py", "x = y\n").unwrap();
        assert_eq!(read_source(&path).unwrap(), "x = y\n");
        assert!(read_source(&dir.path().join("missing.py")).is_err());
    }

    #[test]
    fn test_to_json_is_pretty() {
        let json = to_json(&serde_json::json!({"a": 1})).unwrap();
        assert_eq!(json, "{\n  \"a\": 1\n}");
    }
}
