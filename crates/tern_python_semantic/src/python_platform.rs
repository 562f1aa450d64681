use std::fmt;

/// The platform a checked program is assumed to run on. Drives static
/// evaluation of `sys.platform` and `os.name` guards.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum PythonPlatform {
    Darwin,
    Linux,
    Windows,
    /// No platform was configured; platform guards are not statically
    /// decidable.
    #[default]
    Unspecified,
}

impl PythonPlatform {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Darwin" => Some(Self::Darwin),
            "Linux" => Some(Self::Linux),
            "Windows" => Some(Self::Windows),
            _ => None,
        }
    }

    /// The value of `sys.platform` on this platform.
    pub fn sys_platform(self) -> Option<&'static str> {
        match self {
            Self::Darwin => Some("darwin"),
            Self::Linux => Some("linux"),
            Self::Windows => Some("win32"),
            Self::Unspecified => None,
        }
    }

    /// The value of `os.name` on this platform.
    pub fn os_name(self) -> Option<&'static str> {
        match self {
            Self::Darwin | Self::Linux => Some("posix"),
            Self::Windows => Some("nt"),
            Self::Unspecified => None,
        }
    }
}

impl fmt::Display for PythonPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Darwin => f.write_str("Darwin"),
            Self::Linux => f.write_str("Linux"),
            Self::Windows => f.write_str("Windows"),
            Self::Unspecified => f.write_str("unspecified"),
        }
    }
}
