//! Fixed-width digit codes (ISCO, CBO/COD, SOC without separators).
//!
//! Every classification handled by the engine is a string of ASCII digits
//! whose prefixes form the hierarchy: `"2512"` belongs to minor group `"251"`,
//! sub-major group `"25"` and major group `"2"`.

use serde::Deserialize;
use thiserror::Error;

/// Maximum supported code width.
pub const MAX_WIDTH: usize = 9;

/// How raw codes are brought to the finest resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct CodeFormat {
    /// Number of digits at the finest resolution.
    #[serde(default = "default_width")]
    pub width: usize,
    /// Left-pad shorter codes with zeros (`"111"` -> `"0111"`).
    #[serde(default = "default_true")]
    pub zero_pad: bool,
    /// Cut longer codes down to `width` (6-digit CBO -> 4-digit family).
    #[serde(default)]
    pub truncate_longer: bool,
}

fn default_width() -> usize {
    4
}

fn default_true() -> bool {
    true
}

impl Default for CodeFormat {
    fn default() -> Self {
        Self {
            width: default_width(),
            zero_pad: true,
            truncate_longer: false,
        }
    }
}

impl CodeFormat {
    /// Normalize a raw code to exactly `width` digits.
    pub fn normalize(&self, raw: &str) -> Result<String, MalformedCode> {
        let mut code = raw.trim();
        // Codes that went through a spreadsheet as floats come back as "2512.0".
        if let Some(stripped) = code.strip_suffix(".0") {
            code = stripped;
        }

        if code.is_empty() {
            return Err(MalformedCode::Empty);
        }
        if !code.bytes().all(|b| b.is_ascii_digit()) {
            return Err(MalformedCode::NonDigit(code.to_string()));
        }

        match code.len().cmp(&self.width) {
            std::cmp::Ordering::Equal => Ok(code.to_string()),
            std::cmp::Ordering::Less if self.zero_pad => {
                Ok(format!("{code:0>width$}", width = self.width))
            }
            std::cmp::Ordering::Less => Err(MalformedCode::TooShort {
                len: code.len(),
                width: self.width,
            }),
            std::cmp::Ordering::Greater if self.truncate_longer => {
                Ok(code[..self.width].to_string())
            }
            std::cmp::Ordering::Greater => Err(MalformedCode::TooLong {
                len: code.len(),
                width: self.width,
            }),
        }
    }
}

/// Why a code was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedCode {
    #[error("empty code")]
    Empty,
    #[error("non-digit characters in '{0}'")]
    NonDigit(String),
    #[error("{len} digits, expected {width}")]
    TooShort { len: usize, width: usize },
    #[error("{len} digits, expected {width}")]
    TooLong { len: usize, width: usize },
}

/// Prefix of `code` at `level` digits. Codes shorter than `level` are
/// returned whole.
pub fn truncate(code: &str, level: usize) -> &str {
    // Normalized codes are ASCII, so byte slicing is char slicing.
    if code.len() <= level {
        code
    } else {
        &code[..level]
    }
}
