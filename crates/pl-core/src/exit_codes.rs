//! Exit codes for the playlog CLI.
//!
//! Exit codes communicate the run outcome without requiring output parsing.

/// Exit codes for playlog commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Command completed
    Clean = 0,

    /// Ingestion completed but skipped malformed rows
    RowsSkipped = 1,

    /// Configuration or field mapping error
    ConfigError = 10,

    /// Malformed input or unreadable input files
    InputError = 11,

    /// Store unavailable, statement rejected, or write failed
    StoreError = 12,

    /// I/O error outside the store
    IoError = 13,

    /// Internal/unknown error
    InternalError = 99,
}

impl ExitCode {
    /// Convert to i32 for process exit.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Check if this exit code indicates success.
    pub fn is_success(self) -> bool {
        matches!(self, ExitCode::Clean | ExitCode::RowsSkipped)
    }

    /// Check if this exit code indicates an error requiring attention.
    pub fn is_error(self) -> bool {
        (self as i32) >= 10
    }

    /// Exit code for a unified error, by error code category.
    pub fn for_error(err: &pl_common::Error) -> Self {
        match err.code() {
            10..=19 => ExitCode::ConfigError,
            20..=29 => ExitCode::InputError,
            30..=39 => ExitCode::StoreError,
            60..=69 => ExitCode::IoError,
            _ => ExitCode::InternalError,
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code as u8)
    }
}
