//! Text rules applied to raw Compose YAML during security checks.

use crate::validator::Severity;
use regex::Regex;
use std::sync::LazyLock;

/// A pattern checked against the whole document text.
#[derive(Debug)]
pub struct TextRule {
    pub name: &'static str,
    pub pattern: &'static LazyLock<Regex>,
    pub severity: Severity,
    pub message: &'static str,
}

/// `privileged: true` in any service.
pub static PRIVILEGED_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?im)privileged:\s*["']?true\b"#).unwrap());

/// A literal `--privileged` flag, e.g. inside a command.
pub static PRIVILEGED_FLAG_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)--privileged").unwrap());

pub static HOST_NETWORK_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?im)network_mode:\s*["']?host\b"#).unwrap());

pub static HOST_PID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?im)\bpid:\s*["']?host\b"#).unwrap());

pub static HOST_IPC_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?im)\bipc:\s*["']?host\b"#).unwrap());

pub static ROOT_USER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?im)\buser:\s*["']?root\b"#).unwrap());

pub static ROOT_UID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?im)\buser:\s*["']?0\b"#).unwrap());

/// Bind mounts whose host source is a system directory. Only sequence
/// items (block `- ` or flow `[`/`,`) and long-syntax `source:` keys are
/// matched, so container targets such as `/etc/nginx` are not flagged.
pub static SYSTEM_DIR_MOUNT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?im)((^\s*-|[\[,])\s*["']?(/etc/|/var/lib/docker/|/proc/|/sys/)[^:\s"']*:|\bsource:\s*["']?(/etc/|/var/lib/docker/|/proc/|/sys/))"#,
    )
    .unwrap()
});

pub static DEVICE_MOUNT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?im)((^\s*-|[\[,])\s*["']?/dev/[^:\s"']*:|\bsource:\s*["']?/dev/)"#).unwrap()
});

pub static ENGINE_SOCKET_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?im)((^\s*-|[\[,])\s*["']?(/var)?/run/docker\.sock:|\bsource:\s*["']?(/var)?/run/docker\.sock\b)"#,
    )
    .unwrap()
});

pub static RESTART_ALWAYS_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?im)\brestart:\s*["']?always\b"#).unwrap());

/// Port entries published on the `*` wildcard.
pub static WILDCARD_BIND_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?im)(^\s*-\s*|ports:.*[\[,]\s*)["']?\*:"#).unwrap());

/// Port entries published on every interface.
pub static ALL_INTERFACES_BIND_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?im)(^\s*-\s*|ports:.*[\[,]\s*)["']?0\.0\.0\.0:"#).unwrap()
});

/// Capabilities that are refused in `cap_add`.
pub const DANGEROUS_CAPABILITIES: &[&str] = &["SYS_ADMIN", "NET_ADMIN", "SYS_MODULE", "SYS_RAWIO"];

/// Compose service keys.
pub static SERVICE_NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9_.-]*$").unwrap());

/// Appliance app names.
pub static APP_NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9-]*[a-z0-9]$").unwrap());

/// Security rules in evaluation order.
pub fn security_rules() -> Vec<TextRule> {
    vec![
        TextRule {
            name: "privileged",
            pattern: &PRIVILEGED_PATTERN,
            severity: Severity::Error,
            message: "Privileged containers are not allowed",
        },
        TextRule {
            name: "privileged_flag",
            pattern: &PRIVILEGED_FLAG_PATTERN,
            severity: Severity::Error,
            message: "Privileged mode is not allowed",
        },
        TextRule {
            name: "host_network",
            pattern: &HOST_NETWORK_PATTERN,
            severity: Severity::Error,
            message: "Host network mode should be avoided",
        },
        TextRule {
            name: "host_pid",
            pattern: &HOST_PID_PATTERN,
            severity: Severity::Error,
            message: "Host PID namespace is not allowed",
        },
        TextRule {
            name: "host_ipc",
            pattern: &HOST_IPC_PATTERN,
            severity: Severity::Error,
            message: "Host IPC namespace is not allowed",
        },
        TextRule {
            name: "root_user",
            pattern: &ROOT_USER_PATTERN,
            severity: Severity::Error,
            message: "Running as root user is discouraged",
        },
        TextRule {
            name: "root_uid",
            pattern: &ROOT_UID_PATTERN,
            severity: Severity::Error,
            message: "Running as UID 0 (root) is discouraged",
        },
        TextRule {
            name: "system_dir_mount",
            pattern: &SYSTEM_DIR_MOUNT_PATTERN,
            severity: Severity::Error,
            message: "System directory bind mounts are not allowed",
        },
        TextRule {
            name: "device_mount",
            pattern: &DEVICE_MOUNT_PATTERN,
            severity: Severity::Warning,
            message: "Device bind mounts require special consideration",
        },
        TextRule {
            name: "engine_socket",
            pattern: &ENGINE_SOCKET_PATTERN,
            severity: Severity::Error,
            message: "Docker socket access is not allowed",
        },
        TextRule {
            name: "restart_always",
            pattern: &RESTART_ALWAYS_PATTERN,
            severity: Severity::Warning,
            message: "Warning: Consider using 'unless-stopped' instead of 'always'",
        },
        TextRule {
            name: "wildcard_bind",
            pattern: &WILDCARD_BIND_PATTERN,
            severity: Severity::Warning,
            message: "Warning: Avoid binding to all interfaces (*) for security",
        },
        TextRule {
            name: "all_interfaces_bind",
            pattern: &ALL_INTERFACES_BIND_PATTERN,
            severity: Severity::Warning,
            message: "Warning: Avoid binding to all interfaces (0.0.0.0) for security",
        },
    ]
}

pub fn is_dangerous_capability(cap: &str) -> bool {
    DANGEROUS_CAPABILITIES.contains(&cap)
}
