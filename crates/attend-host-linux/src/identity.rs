//! Machine identity from network interface hardware addresses

use async_trait::async_trait;
use attend_host_api::{HostResult, IdentityResolver};
use attend_util::MachineId;
use std::path::{Path, PathBuf};
use tracing::debug;

const SYS_CLASS_NET: &str = "/sys/class/net";

/// A network interface as seen in sysfs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceInfo {
    pub name: String,
    pub address: Option<MachineId>,
    pub is_up: bool,
}

/// Pick the identity interface: skip loopback and zero addresses, prefer
/// interfaces that are up, then the lowest name
pub fn select_identity(interfaces: &[InterfaceInfo]) -> Option<MachineId> {
    let mut candidates: Vec<&InterfaceInfo> = interfaces
        .iter()
        .filter(|i| i.name != "lo")
        .filter(|i| i.address.as_ref().is_some_and(|a| !a.is_unspecified()))
        .collect();

    candidates.sort_by(|a, b| b.is_up.cmp(&a.is_up).then_with(|| a.name.cmp(&b.name)));
    candidates.first().and_then(|i| i.address.clone())
}

/// [`IdentityResolver`] reading `/sys/class/net/*/address`
pub struct SysfsIdentity {
    root: PathBuf,
}

impl SysfsIdentity {
    pub fn new() -> Self {
        Self {
            root: PathBuf::from(SYS_CLASS_NET),
        }
    }

    /// Read interfaces from another directory (for testing)
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub async fn interfaces(&self) -> HostResult<Vec<InterfaceInfo>> {
        let mut dir = tokio::fs::read_dir(&self.root).await?;
        let mut interfaces = Vec::new();

        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let path = entry.path();
            interfaces.push(InterfaceInfo {
                address: read_trimmed(&path.join("address"))
                    .await
                    .and_then(|a| MachineId::parse(&a)),
                is_up: read_trimmed(&path.join("operstate"))
                    .await
                    .is_some_and(|s| s == "up"),
                name,
            });
        }

        Ok(interfaces)
    }
}

impl Default for SysfsIdentity {
    fn default() -> Self {
        Self::new()
    }
}

async fn read_trimmed(path: &Path) -> Option<String> {
    tokio::fs::read_to_string(path)
        .await
        .ok()
        .map(|s| s.trim().to_string())
}

#[async_trait]
impl IdentityResolver for SysfsIdentity {
    async fn machine_identity(&self) -> HostResult<Option<MachineId>> {
        let interfaces = self.interfaces().await?;
        let identity = select_identity(&interfaces);
        debug!(
            interfaces = interfaces.len(),
            identity = ?identity.as_ref().map(|m| m.as_str()),
            "Resolved machine identity"
        );
        Ok(identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iface(name: &str, mac: &str, up: bool) -> InterfaceInfo {
        InterfaceInfo {
            name: name.into(),
            address: MachineId::parse(mac),
            is_up: up,
        }
    }

    #[test]
    fn prefers_up_interfaces() {
        let interfaces = vec![
            iface("lo", "00:00:00:00:00:00", true),
            iface("eth0", "aa:bb:cc:00:00:01", false),
            iface("wlan0", "aa:bb:cc:00:00:02", true),
        ];
        assert_eq!(
            select_identity(&interfaces).unwrap().as_str(),
            "AA:BB:CC:00:00:02"
        );
    }

    #[test]
    fn falls_back_to_lowest_name() {
        let interfaces = vec![
            iface("wlan0", "aa:bb:cc:00:00:02", false),
            iface("eth0", "aa:bb:cc:00:00:01", false),
            iface("dummy0", "00:00:00:00:00:00", true),
        ];
        assert_eq!(
            select_identity(&interfaces).unwrap().as_str(),
            "AA:BB:CC:00:00:01"
        );
    }

    #[test]
    fn none_without_usable_interface() {
        let interfaces = vec![iface("lo", "00:00:00:00:00:00", true)];
        assert!(select_identity(&interfaces).is_none());
    }

    #[tokio::test]
    async fn reads_sysfs_layout() {
        let root = tempfile::tempdir().unwrap();
        for (name, mac, state) in [
            ("lo", "00:00:00:00:00:00", "unknown"),
            ("enp3s0", "3c:7c:3f:12:34:56", "up"),
        ] {
            let dir = root.path().join(name);
            std::fs::create_dir(&dir).unwrap();
            std::fs::write(dir.join("address"), format!("{}\n", mac)).unwrap();
            std::fs::write(dir.join("operstate"), format!("{}\n", state)).unwrap();
        }

        let identity = SysfsIdentity::with_root(root.path());
        assert_eq!(
            identity.machine_identity().await.unwrap().unwrap().as_str(),
            "3C:7C:3F:12:34:56"
        );
    }
}
