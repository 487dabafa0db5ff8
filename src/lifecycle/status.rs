use std::fmt;
use std::process::ExitCode;

// Signed errno-style result of one lifecycle stage. Zero is success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExitStatus(i32);

impl ExitStatus {
    pub const SUCCESS: ExitStatus = ExitStatus(0);

    pub const fn new(code: i32) -> Self {
        Self(code)
    }

    // Build a failure status from a positive errno value.
    pub const fn from_errno(errno: i32) -> Self {
        Self(-errno)
    }

    pub const fn is_success(self) -> bool {
        self.0 == 0
    }

    // First error wins: a coordinator-side failure shadows whatever the worker reported.
    pub fn compose(coordinator: Option<ExitStatus>, worker: ExitStatus) -> ExitStatus {
        match coordinator {
            Some(status) if !status.is_success() => status,
            _ => worker,
        }
    }

    // Negated status truncated to a byte; a failure never collapses to exit code 0.
    pub fn exit_code(self) -> u8 {
        if self.is_success() {
            return 0;
        }
        match (self.0.wrapping_neg() & 0xff) as u8 {
            0 => 1,
            code => code,
        }
    }
}

impl From<ExitStatus> for ExitCode {
    fn from(status: ExitStatus) -> Self {
        ExitCode::from(status.exit_code())
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
