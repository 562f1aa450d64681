use crate::python_version::PythonVersion;

/// Version bucket names probed inside a typeshed tree, most specific
/// first: every `major.minor` at or below the selected version in
/// descending order, then the bare major version, then the
/// cross-version bucket.
pub fn stdlib_version_dirs(version: PythonVersion) -> Vec<String> {
    let mut dirs = Vec::with_capacity(version.minor as usize + 3);
    for minor in (0..=version.minor).rev() {
        dirs.push(format!("{}.{}", version.major, minor));
    }
    dirs.push(format!("{}", version.major));
    dirs.push("2and3".to_string());
    dirs
}

#[cfg(test)]
mod tests {
    use super::stdlib_version_dirs;
    use crate::python_version::PythonVersion;

    #[test]
    fn fan_out_descends_then_falls_back() {
        let dirs = stdlib_version_dirs(PythonVersion { major: 3, minor: 2 });
        assert_eq!(dirs, ["3.2", "3.1", "3.0", "3", "2and3"]);
    }
}
