//! Exit codes.

use ignition_core::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum CliExitCode {
    Success = 0,
    /// Bad configuration, invalid input or a broken component.
    Error = 1,
    /// The command ran, but the outcome was a rejection, a failed ignition
    /// or a non-compliant score.
    Negative = 2,
}

impl CliExitCode {
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl From<CliExitCode> for i32 {
    fn from(code: CliExitCode) -> Self {
        code.code()
    }
}

/// Every `CoreError` is an error exit; decisions never arrive as errors.
pub fn exit_code_for_error(_err: &CoreError) -> i32 {
    CliExitCode::Error.code()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(CliExitCode::Success.code(), 0);
        assert_eq!(i32::from(CliExitCode::Negative), 2);
        let err = CoreError::ConfigError("bad".into());
        assert_eq!(exit_code_for_error(&err), 1);
    }
}
