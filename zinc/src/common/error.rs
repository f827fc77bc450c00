// vim: tw=80

use std::fmt;

use nix::errno::Errno;

/// A scheduler-level error, modeled on the errno codes the surrounding
/// block layer already speaks rather than a bespoke enum.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Error(Errno);

impl Error {
    /// A request classified as `Other` (including zone-append, §1) was
    /// rejected at insert rather than silently mis-routed.
    pub fn unsupported_operation() -> Self {
        Error(Errno::ENOTSUP)
    }

    /// Attach failed: the scheduler could not size its per-priority
    /// indices for the device's geometry.
    pub fn out_of_memory() -> Self {
        Error(Errno::ENOMEM)
    }

    /// A request targets a zone outside the attached device's range.
    pub fn invalid_zone() -> Self {
        Error(Errno::EINVAL)
    }

    pub fn errno(&self) -> Errno {
        self.0
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for Error {}

impl From<Errno> for Error {
    fn from(e: Errno) -> Self {
        Error(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displays_as_errno() {
        let e = Error::unsupported_operation();
        assert_eq!(e.errno(), Errno::ENOTSUP);
        assert!(!format!("{e}").is_empty());
    }
}
