//! Loopback alias and privilege handling for the metadata address.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::net::Ipv4Addr;
use tokio::process::Command;
use tracing::{debug, info};

#[async_trait]
pub trait NetworkPlatform: Send + Sync {
    /// Make the privileges needed to bind and configure the address available
    fn raise_capabilities(&self) -> Result<()>;

    async fn configure_address(&self, addr: Ipv4Addr) -> Result<()>;

    async fn remove_address(&self, addr: Ipv4Addr) -> Result<()>;

    fn drop_privileges(&self) -> Result<()>;

    /// Whether the process can still change network configuration
    fn is_privileged(&self) -> bool;
}

/// Platform implementation for the current OS
pub fn native() -> Box<dyn NetworkPlatform> {
    #[cfg(target_os = "linux")]
    {
        Box::new(linux::LinuxPlatform)
    }
    #[cfg(target_os = "macos")]
    {
        Box::new(macos::MacosPlatform)
    }
    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        tracing::warn!("Network setup is not supported on this platform, assuming the address is configured");
        Box::new(UnmanagedPlatform)
    }
}

/// Add the address, removing a stale alias and retrying once on failure
pub async fn setup_address(platform: &dyn NetworkPlatform, addr: Ipv4Addr) -> Result<()> {
    if let Err(e) = platform.configure_address(addr).await {
        debug!("Configuring {} failed ({:#}), removing and retrying", addr, e);
        if let Err(e) = platform.remove_address(addr).await {
            debug!("Removing {} failed: {:#}", addr, e);
        }
        platform
            .configure_address(addr)
            .await
            .with_context(|| format!("Failed to configure {}", addr))?;
    }

    info!("Configured {} on the loopback interface", addr);
    Ok(())
}

/// Leaves addresses and privileges to the operator
pub struct UnmanagedPlatform;

#[async_trait]
impl NetworkPlatform for UnmanagedPlatform {
    fn raise_capabilities(&self) -> Result<()> {
        Ok(())
    }

    async fn configure_address(&self, _addr: Ipv4Addr) -> Result<()> {
        Ok(())
    }

    async fn remove_address(&self, _addr: Ipv4Addr) -> Result<()> {
        Ok(())
    }

    fn drop_privileges(&self) -> Result<()> {
        Ok(())
    }

    fn is_privileged(&self) -> bool {
        false
    }
}

async fn run_command(program: &str, args: &[&str]) -> Result<()> {
    debug!("Running {} {}", program, args.join(" "));

    let output = Command::new(program)
        .args(args)
        .output()
        .await
        .with_context(|| format!("Failed to run {}", program))?;

    if !output.status.success() {
        bail!(
            "{} {} exited with {}: {}",
            program,
            args.join(" "),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(())
}

#[cfg(unix)]
mod privileges {
    use anyhow::{bail, Result};
    use std::io;
    use tracing::{info, warn};

    pub fn is_root() -> bool {
        unsafe { libc::geteuid() == 0 }
    }

    fn env_id(name: &str) -> Option<u32> {
        std::env::var(name).ok()?.parse().ok()
    }

    /// Switch from root back to the user who invoked sudo
    pub fn drop_to_invoking_user() -> Result<()> {
        if !is_root() {
            return Ok(());
        }

        let (uid, gid) = match (env_id("SUDO_UID"), env_id("SUDO_GID")) {
            (Some(uid), Some(gid)) => (uid, gid),
            _ => {
                warn!("SUDO_UID/SUDO_GID not set, continuing to run as root");
                return Ok(());
            }
        };

        unsafe {
            if libc::setgroups(0, std::ptr::null()) != 0 {
                bail!("setgroups failed: {}", io::Error::last_os_error());
            }
            if libc::setgid(gid) != 0 {
                bail!("setgid({}) failed: {}", gid, io::Error::last_os_error());
            }
            if libc::setuid(uid) != 0 {
                bail!("setuid({}) failed: {}", uid, io::Error::last_os_error());
            }
            if libc::setuid(0) == 0 {
                bail!("root privileges could be regained after dropping them");
            }
        }

        info!("Dropped privileges to uid {} gid {}", uid, gid);
        Ok(())
    }
}

#[cfg(target_os = "linux")]
mod linux {
    use anyhow::{Context, Result};
    use async_trait::async_trait;
    use caps::{CapSet, Capability};
    use std::net::Ipv4Addr;
    use tracing::{debug, warn};

    use super::{privileges, run_command, NetworkPlatform};

    const REQUIRED_CAPS: [Capability; 4] = [
        Capability::CAP_NET_BIND_SERVICE,
        Capability::CAP_NET_ADMIN,
        Capability::CAP_SETUID,
        Capability::CAP_SETGID,
    ];

    pub struct LinuxPlatform;

    #[async_trait]
    impl NetworkPlatform for LinuxPlatform {
        fn raise_capabilities(&self) -> Result<()> {
            let mut raised = Vec::new();

            for cap in REQUIRED_CAPS {
                if !caps::has_cap(None, CapSet::Permitted, cap)
                    .with_context(|| format!("Failed to read capability {}", cap))?
                {
                    warn!("Capability {} is not permitted for this process", cap);
                    continue;
                }

                for set in [CapSet::Effective, CapSet::Inheritable, CapSet::Ambient] {
                    caps::raise(None, set, cap)
                        .with_context(|| format!("Failed to raise {} in {:?}", cap, set))?;
                }
                raised.push(cap);
            }

            debug!("Raised ambient capabilities {:?}", raised);
            Ok(())
        }

        async fn configure_address(&self, addr: Ipv4Addr) -> Result<()> {
            run_command("ip", &["addr", "add", &format!("{}/32", addr), "dev", "lo"]).await
        }

        async fn remove_address(&self, addr: Ipv4Addr) -> Result<()> {
            run_command("ip", &["addr", "del", &format!("{}/32", addr), "dev", "lo"]).await
        }

        fn drop_privileges(&self) -> Result<()> {
            privileges::drop_to_invoking_user()?;
            if privileges::is_root() {
                return Ok(());
            }

            for set in [
                CapSet::Ambient,
                CapSet::Effective,
                CapSet::Inheritable,
                CapSet::Permitted,
            ] {
                caps::clear(None, set).with_context(|| format!("Failed to clear {:?}", set))?;
            }
            Ok(())
        }

        fn is_privileged(&self) -> bool {
            privileges::is_root()
        }
    }
}

#[cfg(target_os = "macos")]
mod macos {
    use anyhow::Result;
    use async_trait::async_trait;
    use std::net::Ipv4Addr;

    use super::{privileges, run_command, NetworkPlatform};

    pub struct MacosPlatform;

    #[async_trait]
    impl NetworkPlatform for MacosPlatform {
        fn raise_capabilities(&self) -> Result<()> {
            Ok(())
        }

        async fn configure_address(&self, addr: Ipv4Addr) -> Result<()> {
            run_command("ifconfig", &["lo0", "alias", &addr.to_string(), "up"]).await
        }

        async fn remove_address(&self, addr: Ipv4Addr) -> Result<()> {
            run_command("ifconfig", &["lo0", "-alias", &addr.to_string()]).await
        }

        fn drop_privileges(&self) -> Result<()> {
            privileges::drop_to_invoking_user()
        }

        fn is_privileged(&self) -> bool {
            privileges::is_root()
        }
    }
}
