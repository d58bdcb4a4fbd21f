//! WSL path translation.
//!
//! When the requested shell is a Linux subsystem distro running on
//! Windows, paths supplied by the client arrive in the Windows UNC form
//! (`\\wsl$\<distro>\home\user` or `\\wsl.localhost\<distro>\home\user`)
//! and must be translated to the POSIX path the subsystem actually sees
//! (`/home/user`) before the adapter spawns the child there. This is a
//! pure function, independently testable without a real subsystem.

/// Translate a Windows WSL UNC path to its POSIX equivalent. Paths that
/// don't match the UNC WSL form are returned unchanged (including plain
/// POSIX paths on non-Windows hosts, which are the common case).
#[must_use]
pub fn translate_wsl_path(path: &str) -> String {
    for prefix in ["\\\\wsl$\\", "\\\\wsl.localhost\\"] {
        if let Some(rest) = path.strip_prefix(prefix) {
            // rest = "<distro>\home\user\..."; drop the distro segment,
            // then flip backslashes to forward slashes.
            if let Some(idx) = rest.find('\\') {
                let posix_tail = &rest[idx..];
                return posix_tail.replace('\\', "/");
            }
            return "/".to_string();
        }
    }
    path.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translates_wsl_dollar_form() {
        let translated = translate_wsl_path(r"\\wsl$\Ubuntu\home\user\project");
        assert_eq!(translated, "/home/user/project");
    }

    #[test]
    fn translates_wsl_localhost_form() {
        let translated = translate_wsl_path(r"\\wsl.localhost\Ubuntu-22.04\home\user");
        assert_eq!(translated, "/home/user");
    }

    #[test]
    fn leaves_plain_posix_paths_unchanged() {
        assert_eq!(translate_wsl_path("/home/user/project"), "/home/user/project");
    }

    #[test]
    fn leaves_plain_windows_paths_unchanged() {
        assert_eq!(translate_wsl_path(r"C:\Users\user\project"), r"C:\Users\user\project");
    }

    #[test]
    fn handles_distro_root_with_no_trailing_path() {
        let translated = translate_wsl_path(r"\\wsl$\Ubuntu");
        assert_eq!(translated, "/");
    }
}
