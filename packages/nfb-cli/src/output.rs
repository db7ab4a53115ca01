use serde::Serialize;
use std::io::Write;
use std::path::Path;

/// Serialize `value` and write it to `output_path`, or stdout when `None`.
pub fn write_json<T: Serialize>(
    value: &T,
    compact: bool,
    output_path: Option<&str>,
) -> Result<(), String> {
    let json = if compact {
        serde_json::to_string(value)
    } else {
        serde_json::to_string_pretty(value)
    }
    .map_err(|e| format!("JSON serialization failed: {}", e))?;

    match output_path {
        Some(path) => std::fs::write(Path::new(path), json)
            .map_err(|e| format!("Failed to write report '{}': {}", path, e)),
        None => {
            let mut handle = std::io::stdout().lock();
            writeln!(handle, "{}", json).map_err(|e| format!("Failed to write to stdout: {}", e))
        }
    }
}
