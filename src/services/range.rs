//! `Range: bytes=...` parsing and resolution against an object size.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RangeError {
    #[error("malformed range header: {0}")]
    Malformed(String),

    #[error("range not satisfiable for object of {size} bytes")]
    Unsatisfiable { size: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeSpec {
    /// `bytes=start-` or `bytes=start-end`
    FromStart { start: u64, end: Option<u64> },
    /// `bytes=-n`, the last `n` bytes
    Suffix(u64),
}

/// Parses a `Range` header value.
///
/// Returns `Ok(None)` for headers that should be ignored (other units or
/// multiple ranges), which serves the whole object.
pub fn parse_range_header(value: &str) -> Result<Option<RangeSpec>, RangeError> {
    let value = value.trim();
    let Some((unit, spec)) = value.split_once('=') else {
        return Err(RangeError::Malformed(value.to_string()));
    };

    if !unit.trim().eq_ignore_ascii_case("bytes") || spec.contains(',') {
        return Ok(None);
    }

    let malformed = || RangeError::Malformed(value.to_string());
    let (start, end) = spec.split_once('-').ok_or_else(malformed)?;
    let (start, end) = (start.trim(), end.trim());

    match (start.is_empty(), end.is_empty()) {
        (true, true) => Err(malformed()),
        (true, false) => {
            let suffix = end.parse::<u64>().map_err(|_| malformed())?;
            Ok(Some(RangeSpec::Suffix(suffix)))
        }
        (false, _) => {
            let start = start.parse::<u64>().map_err(|_| malformed())?;
            let end = if end.is_empty() {
                None
            } else {
                Some(end.parse::<u64>().map_err(|_| malformed())?)
            };
            if end.is_some_and(|end| end < start) {
                return Err(malformed());
            }
            Ok(Some(RangeSpec::FromStart { start, end }))
        }
    }
}

impl RangeSpec {
    /// Inclusive `(start, end)` window within an object of `size` bytes.
    pub fn resolve(self, size: u64) -> Result<(u64, u64), RangeError> {
        if size == 0 {
            return Err(RangeError::Unsatisfiable { size });
        }
        let last = size - 1;

        match self {
            RangeSpec::FromStart { start, .. } if start > last => {
                Err(RangeError::Unsatisfiable { size })
            }
            RangeSpec::FromStart { start, end } => Ok((start, end.unwrap_or(last).min(last))),
            RangeSpec::Suffix(0) => Err(RangeError::Unsatisfiable { size }),
            RangeSpec::Suffix(n) => Ok((size.saturating_sub(n), last)),
        }
    }
}
