use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Fixed deny-list of destructive shell commands. The gate fails closed
    /// on any match; there is no allow-list override.
    pub(super) static ref DENIED_COMMANDS: Vec<(Regex, &'static str)> = vec![
        (
            Regex::new(r"(?i)\brm\s+(-[a-z]+\s+)*(/|/\*)\s*$").unwrap(),
            "recursive root delete",
        ),
        (
            Regex::new(r"(?i)\bsudo\s+rm\b").unwrap(),
            "privilege-escalated delete",
        ),
        (
            Regex::new(r"(?i)\bmkfs(\.\w+)?\b").unwrap(),
            "filesystem format",
        ),
        (
            Regex::new(r"(?i)\bdd\s+[^|]*\bof=/dev/").unwrap(),
            "raw device write",
        ),
        (
            Regex::new(r"(?i)>\s*/dev/sd[a-z]").unwrap(),
            "raw device write",
        ),
        (
            Regex::new(r":\(\)\s*\{\s*:\|:&\s*\}\s*;\s*:").unwrap(),
            "fork bomb",
        ),
        (
            Regex::new(r"(?i)\bchmod\s+(-[a-z]+\s+)*777\s+/\s*$").unwrap(),
            "world-writable root",
        ),
        (
            Regex::new(r"(?i)\b(shutdown|reboot|poweroff|halt)\b").unwrap(),
            "system shutdown",
        ),
    ];

    /// File name patterns that must never be written or deleted by a worker.
    pub(super) static ref PROTECTED_FILES: Vec<Regex> = vec![
        Regex::new(r"(?i)(^|/)\.env(\.|$)").unwrap(),
        Regex::new(r"(?i)(^|/)id_(rsa|dsa|ecdsa|ed25519)(\.pub)?$").unwrap(),
        Regex::new(r"(?i)\.(pem|key|p12|pfx)$").unwrap(),
        Regex::new(r"(?i)credential").unwrap(),
        Regex::new(r"(?i)secret").unwrap(),
        Regex::new(r"(^|/)\.ssh(/|$)").unwrap(),
    ];

    /// System directories that are off limits for write and delete.
    pub(super) static ref PROTECTED_DIRS: Vec<&'static str> = vec![
        "/etc/", "/usr/", "/bin/", "/sbin/", "/boot/", "/sys/", "/proc/", "/dev/",
    ];
}
