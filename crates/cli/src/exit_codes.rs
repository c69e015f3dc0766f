//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract; scripts rely on them.
//!
//! | Code | Meaning                                                  |
//! |------|----------------------------------------------------------|
//! | 0    | Success                                                  |
//! | 2    | Usage error (bad args, missing file, unknown column)     |
//! | 3    | Invalid config (TOML, cascade, vocabulary mismatch)      |
//! | 4    | Runtime error (unreadable table, malformed reference)    |
//! | 5    | Run completed with validation warnings (e.g. coverage)   |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into the relevant command's error handling

use occwalk_crosswalk::CrosswalkError;

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// Usage error - bad arguments, missing input file or column.
pub const EXIT_USAGE: u8 = 2;

/// Config failed to parse or validate.
pub const EXIT_INVALID_CONFIG: u8 = 3;

/// Input tables could not be read or are structurally broken.
pub const EXIT_RUNTIME: u8 = 4;

/// Run finished but validation checks reported issues.
pub const EXIT_WARNINGS: u8 = 5;

/// Map an engine error to its exit code.
pub fn crosswalk_exit_code(err: &CrosswalkError) -> u8 {
    match err {
        CrosswalkError::ConfigParse(_)
        | CrosswalkError::ConfigValidation(_)
        | CrosswalkError::VocabularyMismatch { .. } => EXIT_INVALID_CONFIG,
        CrosswalkError::MissingColumn { .. }
        | CrosswalkError::MalformedReferenceCode { .. }
        | CrosswalkError::ScoreParse { .. }
        | CrosswalkError::Io(_) => EXIT_RUNTIME,
    }
}
