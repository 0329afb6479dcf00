//! Knowledge version records
//!
//! A version is an immutable `{AREA}_v{major}.{minor}` snapshot of accumulated
//! knowledge for one area. Numbering is decided by the registry; this module
//! holds the record shape, the display format and area canonicalization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An immutable named snapshot of knowledge for one area
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionRecord {
    /// Row id, `{AREA}_{major}_{minor}`
    pub id: String,
    /// Canonical area name
    pub area: String,
    pub major: u32,
    pub minor: u32,
    /// Canonical display string, `{AREA}_v{major}.{minor}`
    pub version_str: String,
    /// Category tag, e.g. `caso_resuelto` or `documento`
    pub kind: String,
    pub created_at: DateTime<Utc>,
    pub incident_id: Option<String>,
    pub description: Option<String>,
    pub lesson_learned: Option<String>,
    pub keywords: Vec<String>,
}

/// Canonical display string for a version
pub fn format_version(area: &str, major: u32, minor: u32) -> String {
    format!("{area}_v{major}.{minor}")
}

/// Row id for a version
pub fn version_row_id(area: &str, major: u32, minor: u32) -> String {
    format!("{area}_{major}_{minor}")
}

/// Canonicalize an area name before any numbering decision
///
/// Uppercases, folds Spanish accents, collapses runs of non-alphanumerics to a
/// single `_` and trims leading/trailing `_`, so case/accent variants of the
/// same area share one counter ("línea 3" and "LÍNEA 3" → `LINEA_3`).
pub fn canonicalize_area(area: &str) -> String {
    let mut folded = String::with_capacity(area.len());
    for c in area.to_uppercase().chars() {
        folded.push(match c {
            'Á' => 'A',
            'É' => 'E',
            'Í' => 'I',
            'Ó' => 'O',
            'Ú' | 'Ü' => 'U',
            'Ñ' => 'N',
            other => other,
        });
    }

    let mut result = String::with_capacity(folded.len());
    let mut last_was_sep = true; // trims leading separators
    for c in folded.chars() {
        if c.is_ascii_alphanumeric() {
            result.push(c);
            last_was_sep = false;
        } else if !last_was_sep {
            result.push('_');
            last_was_sep = true;
        }
    }
    if result.ends_with('_') {
        result.pop();
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalize_uppercases_and_replaces() {
        assert_eq!(canonicalize_area("Soldadura"), "SOLDADURA");
        assert_eq!(canonicalize_area("línea 3"), "LINEA_3");
        assert_eq!(canonicalize_area("LÍNEA 3"), "LINEA_3");
    }

    #[test]
    fn test_canonicalize_collapses_and_trims() {
        assert_eq!(canonicalize_area("  pintura -- horno  "), "PINTURA_HORNO");
        assert_eq!(canonicalize_area("__a__b__"), "A_B");
    }

    #[test]
    fn test_canonicalize_folds_enye() {
        assert_eq!(canonicalize_area("señalización"), "SENALIZACION");
    }

    #[test]
    fn test_format_version() {
        assert_eq!(format_version("SOLDADURA", 1, 0), "SOLDADURA_v1.0");
        assert_eq!(version_row_id("SOLDADURA", 1, 0), "SOLDADURA_1_0");
    }
}
