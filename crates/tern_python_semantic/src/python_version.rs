use std::fmt;

/// A Python language version, ordered so that version guards can compare
/// against `(major, minor)` tuples.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PythonVersion {
    pub major: u8,
    pub minor: u8,
}

impl PythonVersion {
    pub const PY37: PythonVersion = PythonVersion { major: 3, minor: 7 };
    pub const PY38: PythonVersion = PythonVersion { major: 3, minor: 8 };
    pub const PY39: PythonVersion = PythonVersion { major: 3, minor: 9 };

    /// Decodes the `major * 256 + minor` configuration encoding.
    pub fn from_hex(value: u16) -> Self {
        Self {
            major: (value >> 8) as u8,
            minor: (value & 0xff) as u8,
        }
    }

    pub fn as_tuple(self) -> (u8, u8) {
        (self.major, self.minor)
    }
}

impl Default for PythonVersion {
    fn default() -> Self {
        Self::PY38
    }
}

impl TryFrom<&str> for PythonVersion {
    type Error = std::num::ParseIntError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let (major, minor) = value.split_once('.').unwrap_or((value, "0"));
        Ok(Self {
            major: major.parse()?,
            minor: minor.parse()?,
        })
    }
}

impl fmt::Display for PythonVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let PythonVersion { major, minor } = self;
        write!(f, "{major}.{minor}")
    }
}

#[cfg(test)]
mod tests {
    use super::PythonVersion;

    #[test]
    fn hex_encoding_round_trips() {
        let version = PythonVersion::from_hex(0x0308);
        assert_eq!(version, PythonVersion::PY38);
        assert_eq!(version.to_string(), "3.8");
    }

    #[test]
    fn ordering_follows_version_tuples() {
        assert!(PythonVersion::PY39 > PythonVersion::PY38);
        assert!(PythonVersion { major: 4, minor: 0 } > PythonVersion::PY39);
    }

    #[test]
    fn parses_dotted_versions() {
        assert_eq!(
            PythonVersion::try_from("3.11").unwrap(),
            PythonVersion {
                major: 3,
                minor: 11
            }
        );
    }
}
