//! Read-only access to the Windows registry.
//!
//! Three things are read here: the display names under the uninstall keys
//! (installed-software lookup), the persisted machine and user `Path`
//! values (PATH refresh after an installer ran) and the OS build number
//! (catalog applicability). On other platforms every reader reports nothing.

use crate::catalog::OsRelease;
#[cfg(windows)]
use crate::pathmatch;
use std::collections::HashSet;
use std::ffi::OsString;

#[cfg(windows)]
const UNINSTALL_KEY: &str = r"SOFTWARE\Microsoft\Windows\CurrentVersion\Uninstall";
#[cfg(windows)]
const UNINSTALL_KEY_WOW64: &str = r"SOFTWARE\WOW6432Node\Microsoft\Windows\CurrentVersion\Uninstall";
#[cfg(windows)]
const MACHINE_ENVIRONMENT_KEY: &str =
    r"SYSTEM\CurrentControlSet\Control\Session Manager\Environment";
#[cfg(windows)]
const USER_ENVIRONMENT_KEY: &str = "Environment";
#[cfg(windows)]
const CURRENT_VERSION_KEY: &str = r"SOFTWARE\Microsoft\Windows NT\CurrentVersion";

/// Source of installed-software display names
pub trait UninstallRegistry: Send + Sync {
    fn display_names(&self) -> std::io::Result<Vec<String>>;
}

/// Reads HKLM (64 and 32 bit views) and HKCU uninstall entries
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRegistry;

#[cfg(windows)]
impl UninstallRegistry for SystemRegistry {
    fn display_names(&self) -> std::io::Result<Vec<String>> {
        use winreg::RegKey;
        use winreg::enums::{HKEY_CURRENT_USER, HKEY_LOCAL_MACHINE};

        let mut names = Vec::new();
        let mut seen = HashSet::new();
        let roots = [
            (HKEY_LOCAL_MACHINE, UNINSTALL_KEY),
            (HKEY_LOCAL_MACHINE, UNINSTALL_KEY_WOW64),
            (HKEY_CURRENT_USER, UNINSTALL_KEY),
        ];

        for (hive, path) in roots {
            let key = match RegKey::predef(hive).open_subkey(path) {
                Ok(key) => key,
                Err(e) => {
                    tracing::debug!(path, error = %e, "uninstall key not readable");
                    continue;
                }
            };

            for subkey_name in key.enum_keys().flatten() {
                let Ok(entry) = key.open_subkey(&subkey_name) else {
                    continue;
                };
                if let Ok(name) = entry.get_value::<String, _>("DisplayName")
                    && !name.trim().is_empty()
                    && seen.insert(name.to_lowercase())
                {
                    names.push(name);
                }
            }
        }

        Ok(names)
    }
}

#[cfg(not(windows))]
impl UninstallRegistry for SystemRegistry {
    fn display_names(&self) -> std::io::Result<Vec<String>> {
        Ok(Vec::new())
    }
}

/// Persisted machine + user PATH, expanded and merged.
///
/// `None` when the registry cannot be read (or off Windows).
pub fn machine_and_user_path() -> Option<OsString> {
    #[cfg(windows)]
    {
        use winreg::RegKey;
        use winreg::enums::{HKEY_CURRENT_USER, HKEY_LOCAL_MACHINE};

        let read = |hive, path: &str| -> Option<String> {
            RegKey::predef(hive)
                .open_subkey(path)
                .ok()?
                .get_value::<String, _>("Path")
                .ok()
        };

        let machine = read(HKEY_LOCAL_MACHINE, MACHINE_ENVIRONMENT_KEY);
        let user = read(HKEY_CURRENT_USER, USER_ENVIRONMENT_KEY);
        if machine.is_none() && user.is_none() {
            return None;
        }

        let machine = pathmatch::expand_env(&machine.unwrap_or_default());
        let user = pathmatch::expand_env(&user.unwrap_or_default());
        Some(OsString::from(merge_path_lists(&machine, &user)))
    }

    #[cfg(not(windows))]
    {
        None
    }
}

/// Join two `;`-separated PATH lists, machine entries first, dropping
/// empty and duplicate (case-insensitive, trailing-slash-insensitive) entries.
pub fn merge_path_lists(machine: &str, user: &str) -> String {
    let mut seen = HashSet::new();
    machine
        .split(';')
        .chain(user.split(';'))
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter(|entry| {
            let key = entry.trim_end_matches(['\\', '/']).to_lowercase();
            seen.insert(key)
        })
        .collect::<Vec<_>>()
        .join(";")
}

/// Detect the running Windows release from `CurrentBuild`.
pub fn detect_os_release() -> Option<OsRelease> {
    #[cfg(windows)]
    {
        use winreg::RegKey;
        use winreg::enums::HKEY_LOCAL_MACHINE;

        let build: String = RegKey::predef(HKEY_LOCAL_MACHINE)
            .open_subkey(CURRENT_VERSION_KEY)
            .ok()?
            .get_value("CurrentBuild")
            .ok()?;
        build.trim().parse().ok().map(OsRelease::from_build)
    }

    #[cfg(not(windows))]
    {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_path_lists_orders_machine_first() {
        let merged = merge_path_lists(r"C:\Windows;C:\Windows\System32", r"C:\Users\me\bin");
        assert_eq!(merged, r"C:\Windows;C:\Windows\System32;C:\Users\me\bin");
    }

    #[test]
    fn test_merge_path_lists_dedups_case_insensitively() {
        let merged = merge_path_lists(
            r"C:\Program Files\Git\cmd;;C:\Tools\",
            r"c:\program files\git\cmd\;C:\tools;D:\extra",
        );
        assert_eq!(merged, r"C:\Program Files\Git\cmd;C:\Tools\;D:\extra");
    }

    #[test]
    fn test_merge_path_lists_empty() {
        assert_eq!(merge_path_lists("", ""), "");
        assert_eq!(merge_path_lists(";;", "C:\\a"), "C:\\a");
    }

    #[cfg(not(windows))]
    #[test]
    fn test_non_windows_readers_report_nothing() {
        assert!(SystemRegistry.display_names().unwrap().is_empty());
        assert!(machine_and_user_path().is_none());
        assert!(detect_os_release().is_none());
    }
}
