use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use cligate_core::GatewayError;

fn is_executable(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// Locate the backend executable. Paths with a separator are checked as
/// given; bare names are searched on `PATH`.
pub fn resolve_executable(cli_path: &str) -> Result<PathBuf, GatewayError> {
    let not_found = || GatewayError::CliNotFound(cli_path.to_string());
    if cli_path.is_empty() {
        return Err(not_found());
    }

    if cli_path.contains('/') {
        let path = PathBuf::from(cli_path);
        return if is_executable(&path) { Ok(path) } else { Err(not_found()) };
    }

    let search = std::env::var_os("PATH").ok_or_else(not_found)?;
    std::env::split_paths(&search)
        .map(|dir| dir.join(cli_path))
        .find(|candidate| is_executable(candidate))
        .ok_or_else(not_found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{script_dir, write_script};

    #[test]
    fn absolute_executable_resolves() {
        let dir = script_dir();
        let cli = write_script(&dir, "fake-cli", "true");
        assert_eq!(resolve_executable(&cli).unwrap(), PathBuf::from(&cli));
    }

    #[test]
    fn non_executable_file_is_not_found() {
        let dir = script_dir();
        let path = dir.path().join("plain");
        std::fs::write(&path, "data").unwrap();
        let err = resolve_executable(path.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, GatewayError::CliNotFound(_)));
    }

    #[test]
    fn bare_name_searches_path() {
        assert!(resolve_executable("sh").is_ok());
        let err = resolve_executable("surely-no-such-cli-xyz").unwrap_err();
        assert_eq!(err, GatewayError::CliNotFound("surely-no-such-cli-xyz".into()));
    }

    #[test]
    fn empty_path_is_not_found() {
        assert!(resolve_executable("").is_err());
    }
}
