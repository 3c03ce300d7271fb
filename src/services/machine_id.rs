//! Machine identification: a stable 16-character identifier derived from
//! whatever hardware or OS signal is available, cached under
//! `~/.ccusage/machine_id` so later runs skip the derivation.

use crate::types::{Result, TokenuzeError};
use sha2::{Digest, Sha256};
use std::env;
use std::fs;
use std::path::PathBuf;
use std::process::Command;

fn cache_path() -> Option<PathBuf> {
    let home = env::var("HOME")
        .or_else(|_| env::var("LOCALAPPDATA"))
        .ok()?;
    Some(PathBuf::from(home).join(".ccusage").join("machine_id"))
}

fn cached_machine_id() -> Option<String> {
    let path = cache_path()?;
    let contents = fs::read_to_string(path).ok()?;
    let trimmed = contents.trim();
    if trimmed.len() == 16 {
        Some(trimmed.to_string())
    } else {
        None
    }
}

fn write_cache(id: &str) {
    let Some(path) = cache_path() else { return };
    if let Some(parent) = path.parent() {
        if fs::create_dir_all(parent).is_err() {
            return;
        }
    }
    let _ = fs::write(path, id);
}

fn command_stdout(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8(output.stdout).ok()
}

fn macos_hardware_uuid() -> Option<String> {
    let text = command_stdout("ioreg", &["-rd1", "-c", "IOPlatformExpertDevice"])?;
    let idx = text.find("\"IOPlatformUUID\"")?;
    let after = &text[idx + "\"IOPlatformUUID\"".len()..];
    let quote_start = after.find('"')? + 1;
    let rest = &after[quote_start..];
    let quote_end = rest.find('"')?;
    Some(rest[..quote_end].to_string())
}

fn linux_machine_id() -> Option<String> {
    for path in ["/etc/machine-id", "/var/lib/dbus/machine-id"] {
        if let Ok(contents) = fs::read_to_string(path) {
            let trimmed = contents.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    None
}

fn primary_mac_address() -> Option<String> {
    if let Some(text) = command_stdout("ifconfig", &["en0"]) {
        if let Some(idx) = text.find("ether ") {
            let rest = &text[idx + "ether ".len()..];
            let token = rest.split_whitespace().next()?;
            return Some(token.to_lowercase());
        }
    }
    if let Some(text) = command_stdout("ip", &["link", "show"]) {
        if let Some(idx) = text.find("link/ether ") {
            let rest = &text[idx + "link/ether ".len()..];
            let token = rest.split_whitespace().next()?;
            return Some(token.to_lowercase());
        }
    }
    None
}

fn hostname_user_fallback() -> String {
    let hostname = env::var("HOSTNAME")
        .or_else(|_| env::var("COMPUTERNAME"))
        .unwrap_or_else(|_| hostname::get_fallback());
    let user = env::var("USER")
        .or_else(|_| env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());
    format!("{hostname}:{user}")
}

/// Minimal `gethostname()` shim: reads `/proc/sys/kernel/hostname` on
/// Linux, falls back to `"unknown"` everywhere else.
mod hostname {
    pub fn get_fallback() -> String {
        std::fs::read_to_string("/proc/sys/kernel/hostname")
            .map(|s| s.trim().to_string())
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

fn derive_source() -> (String, &'static str) {
    if let Some(uuid) = macos_hardware_uuid() {
        return (uuid, "hardware_uuid");
    }
    if let Some(id) = linux_machine_id() {
        return (id, "machine_id");
    }
    if let Some(mac) = primary_mac_address() {
        return (mac, "mac_address");
    }
    (hostname_user_fallback(), "hostname_user")
}

fn hash_payload(unique: &str, label: &str) -> String {
    let payload = format!("{unique}:{label}");
    let digest = Sha256::digest(payload.as_bytes());
    let hex = digest.iter().map(|b| format!("{b:02x}")).collect::<String>();
    hex[..16].to_string()
}

/// Return the cached machine ID if present and well-formed, otherwise
/// derive a fresh one and persist it to the cache file.
pub fn machine_id() -> Result<String> {
    if let Some(cached) = cached_machine_id() {
        return Ok(cached);
    }
    let (unique, label) = derive_source();
    if unique.is_empty() {
        return Err(TokenuzeError::MachineId("no machine identifier available".into()));
    }
    let id = hash_payload(&unique, label);
    write_cache(&id);
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_payload_is_16_hex_chars() {
        let id = hash_payload("some-uuid", "hardware_uuid");
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn hash_payload_is_stable_for_same_input() {
        assert_eq!(hash_payload("x", "mac_address"), hash_payload("x", "mac_address"));
    }

    #[test]
    fn hash_payload_differs_by_label() {
        assert_ne!(hash_payload("x", "mac_address"), hash_payload("x", "hostname_user"));
    }

    #[test]
    fn cached_machine_id_rejects_wrong_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("machine_id");
        std::fs::write(&path, "too-short").unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_ne!(contents.trim().len(), 16);
    }

    #[test]
    fn hostname_user_fallback_always_has_a_colon() {
        assert!(hostname_user_fallback().contains(':'));
    }
}
