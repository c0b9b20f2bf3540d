use anyhow::{Result, anyhow};
use std::path::Path;

/// Object keys longer than this are rejected by S3.
pub const MAX_OBJECT_KEY_LEN: usize = 1024;

/// Extensions never accepted into the imagery buckets
const BLOCKED_EXTENSIONS: &[&str] = &[
    "exe", "dll", "so", "dylib", "com", "bat", "cmd", "ps1", "sh", "bash", "msi", "scr", "jar",
];

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub code: &'static str,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Sanitizes an uploaded filename into a single safe key segment
pub fn sanitize_filename(filename: &str) -> Result<String> {
    // Get only the filename component (remove any path)
    let name = Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");

    if name.is_empty() {
        return Err(anyhow!(ValidationError {
            code: "INVALID_FILENAME",
            message: "Filename cannot be empty".to_string(),
        }));
    }

    if filename.contains("..") || filename.contains('/') || filename.contains('\\') {
        tracing::warn!("Path components stripped from upload name: {}", filename);
    }

    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_control() || matches!(c, '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | ';')
            {
                '_'
            } else {
                c
            }
        })
        .collect();

    // Limit length safely for UTF-8
    let sanitized = if sanitized.len() > 255 {
        let mut end = 255;
        while !sanitized.is_char_boundary(end) {
            end -= 1;
        }
        sanitized[..end].to_string()
    } else {
        sanitized
    };

    if let Some(ext) = Path::new(&sanitized).extension().and_then(|e| e.to_str()) {
        let ext_lower = ext.to_lowercase();
        if BLOCKED_EXTENSIONS.contains(&ext_lower.as_str()) {
            return Err(anyhow!(ValidationError {
                code: "BLOCKED_EXTENSION",
                message: format!("File extension '.{}' is not allowed", ext_lower),
            }));
        }
    }

    if sanitized.starts_with('.') {
        return Err(anyhow!(ValidationError {
            code: "HIDDEN_FILE",
            message: "Hidden files (starting with '.') are not allowed".to_string(),
        }));
    }

    Ok(sanitized)
}

/// Checks an object key requested for download
pub fn validate_object_key(key: &str) -> Result<()> {
    if key.trim().is_empty() {
        return Err(anyhow!(ValidationError {
            code: "INVALID_KEY",
            message: "Object key cannot be empty".to_string(),
        }));
    }

    if key.len() > MAX_OBJECT_KEY_LEN {
        return Err(anyhow!(ValidationError {
            code: "INVALID_KEY",
            message: format!("Object key exceeds {} bytes", MAX_OBJECT_KEY_LEN),
        }));
    }

    if key.chars().any(char::is_control) {
        return Err(anyhow!(ValidationError {
            code: "INVALID_KEY",
            message: "Object key contains control characters".to_string(),
        }));
    }

    Ok(())
}
