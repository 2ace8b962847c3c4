//! Node configuration: defaults, then the TOML file, then CLI flags.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use strand_net::{HostConfig, SecurityMode};
use strand_proto::{PeerAddress, TransportProtocol};
use tracing::info;

/// Default listen port.
pub const DEFAULT_PORT: u16 = 4001;

/// Default config file location.
pub const DEFAULT_CONFIG_PATH: &str = "~/.strand/config.toml";

/// Settings read from the config file. Every key is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// Interface to bind
    pub listen_host: Option<IpAddr>,
    /// UDP port to bind
    pub listen_port: Option<u16>,
    /// Peer to send one echo to
    pub target: Option<PeerAddress>,
    /// Disable Noise
    pub insecure: Option<bool>,
    /// Key seed; 0 means random
    pub seed: Option<u64>,
    /// Dial and upgrade timeout in seconds
    pub dial_timeout_secs: Option<u64>,
    /// Idle connection timeout in seconds
    pub idle_timeout_secs: Option<u64>,
    /// Shutdown drain limit in seconds
    pub drain_timeout_secs: Option<u64>,
}

/// Overrides given on the command line.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub listen_host: Option<IpAddr>,
    pub listen_port: Option<u16>,
    pub target: Option<PeerAddress>,
    pub insecure: bool,
    pub seed: Option<u64>,
}

/// Effective node configuration.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub listen_host: IpAddr,
    pub listen_port: u16,
    pub target: Option<PeerAddress>,
    pub insecure: bool,
    pub seed: u64,
    pub dial_timeout: Duration,
    pub idle_timeout: Duration,
    pub drain_timeout: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let host = HostConfig::default();
        Self {
            listen_host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            listen_port: DEFAULT_PORT,
            target: None,
            insecure: false,
            seed: 0,
            dial_timeout: host.dial_timeout,
            idle_timeout: host.idle_timeout,
            drain_timeout: host.drain_timeout,
        }
    }
}

impl NodeConfig {
    /// Builds the effective configuration.
    ///
    /// A missing file at the default location is not an error; a missing
    /// file the operator named explicitly is.
    pub fn load(path: &Path, explicit: bool, overrides: Overrides) -> Result<Self> {
        let path = expand_tilde(path);
        let file = if path.exists() {
            read_file(&path)?
        } else if explicit {
            bail!("Config file {} not found", path.display());
        } else {
            info!(path = %path.display(), "No config file, using defaults");
            FileConfig::default()
        };

        let config = Self::default().merge_file(file).merge_cli(overrides);
        config.validate()?;
        Ok(config)
    }

    fn merge_file(mut self, file: FileConfig) -> Self {
        if let Some(host) = file.listen_host {
            self.listen_host = host;
        }
        if let Some(port) = file.listen_port {
            self.listen_port = port;
        }
        if file.target.is_some() {
            self.target = file.target;
        }
        if let Some(insecure) = file.insecure {
            self.insecure = insecure;
        }
        if let Some(seed) = file.seed {
            self.seed = seed;
        }
        if let Some(secs) = file.dial_timeout_secs {
            self.dial_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = file.idle_timeout_secs {
            self.idle_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = file.drain_timeout_secs {
            self.drain_timeout = Duration::from_secs(secs);
        }
        self
    }

    fn merge_cli(mut self, cli: Overrides) -> Self {
        if let Some(host) = cli.listen_host {
            self.listen_host = host;
        }
        if let Some(port) = cli.listen_port {
            self.listen_port = port;
        }
        if cli.target.is_some() {
            self.target = cli.target;
        }
        if cli.insecure {
            self.insecure = true;
        }
        if let Some(seed) = cli.seed {
            self.seed = seed;
        }
        self
    }

    fn validate(&self) -> Result<()> {
        if self.listen_port == 0 {
            bail!("Listen port must be between 1 and 65535");
        }
        if self.dial_timeout.is_zero() {
            bail!("Dial timeout must be positive");
        }
        if self.idle_timeout.is_zero() {
            bail!("Idle timeout must be positive");
        }
        if let Some(target) = &self.target {
            if target.transport().protocol != TransportProtocol::QuicV1 {
                bail!("Unsupported transport in target {}, expected /udp/<port>/quic-v1", target);
            }
        }
        Ok(())
    }

    /// Returns the socket address to bind.
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.listen_host, self.listen_port)
    }

    /// Returns the key seed, `None` for a random identity.
    pub fn key_seed(&self) -> Option<u64> {
        (self.seed != 0).then_some(self.seed)
    }

    /// Converts to the host configuration.
    pub fn host_config(&self) -> HostConfig {
        let security = if self.insecure {
            SecurityMode::Plaintext
        } else {
            SecurityMode::Noise
        };
        HostConfig {
            listen_addr: self.listen_addr(),
            security,
            dial_timeout: self.dial_timeout,
            idle_timeout: self.idle_timeout,
            drain_timeout: self.drain_timeout,
            ..HostConfig::default()
        }
    }
}

fn read_file(path: &Path) -> Result<FileConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file {}", path.display()))
}

/// Expand ~ to home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use strand_core::Keypair;
    use strand_proto::{compose, TransportAddress};

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn peer() -> PeerAddress {
        let node_id = Keypair::generate(Some(42)).unwrap().node_id();
        compose(&TransportAddress::quic("127.0.0.1:4001".parse().unwrap()), node_id)
    }

    #[test]
    fn test_defaults_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let config = NodeConfig::load(&path, false, Overrides::default()).unwrap();
        assert_eq!(config.listen_addr(), "127.0.0.1:4001".parse().unwrap());
        assert_eq!(config.key_seed(), None);
        assert!(config.target.is_none());
        assert_eq!(config.host_config().security, SecurityMode::Noise);
    }

    #[test]
    fn test_explicit_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        assert!(NodeConfig::load(&path, true, Overrides::default()).is_err());
    }

    #[test]
    fn test_file_values() {
        let file = write_config(&format!(
            "listen_host = \"0.0.0.0\"\nlisten_port = 5000\ninsecure = true\nseed = 42\n\
             target = \"{}\"\ndial_timeout_secs = 3\n",
            peer()
        ));
        let config = NodeConfig::load(file.path(), true, Overrides::default()).unwrap();
        assert_eq!(config.listen_addr(), "0.0.0.0:5000".parse().unwrap());
        assert!(config.insecure);
        assert_eq!(config.key_seed(), Some(42));
        assert_eq!(config.target, Some(peer()));

        let host = config.host_config();
        assert_eq!(host.security, SecurityMode::Plaintext);
        assert_eq!(host.dial_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_cli_overrides_file() {
        let file = write_config("listen_port = 5000\nseed = 7\n");
        let overrides = Overrides {
            listen_port: Some(6000),
            seed: Some(9),
            ..Default::default()
        };
        let config = NodeConfig::load(file.path(), true, overrides).unwrap();
        assert_eq!(config.listen_port, 6000);
        assert_eq!(config.seed, 9);
    }

    #[test]
    fn test_rejects_port_zero() {
        let overrides = Overrides {
            listen_port: Some(0),
            ..Default::default()
        };
        let dir = tempfile::tempdir().unwrap();
        let err = NodeConfig::load(&dir.path().join("none.toml"), false, overrides).unwrap_err();
        assert!(err.to_string().contains("Listen port"));

        let file = write_config("listen_port = 0\n");
        assert!(NodeConfig::load(file.path(), true, Overrides::default()).is_err());
    }

    #[test]
    fn test_rejects_bad_file() {
        let file = write_config("listen_port = \"four\"\n");
        assert!(NodeConfig::load(file.path(), true, Overrides::default()).is_err());

        let file = write_config("unknown_key = 1\n");
        assert!(NodeConfig::load(file.path(), true, Overrides::default()).is_err());

        let file = write_config("target = \"/ip4/127.0.0.1/udp/1/quic-v1\"\n");
        assert!(NodeConfig::load(file.path(), true, Overrides::default()).is_err());
    }

    #[test]
    fn test_rejects_non_quic_target() {
        let node_id = Keypair::generate(Some(42)).unwrap().node_id();
        for protocol in [TransportProtocol::Tcp, TransportProtocol::Udp] {
            let transport =
                TransportAddress::from_socket_addr("127.0.0.1:4001".parse().unwrap(), protocol);
            let overrides = Overrides {
                target: Some(compose(&transport, node_id)),
                ..Default::default()
            };
            let dir = tempfile::tempdir().unwrap();
            let err = NodeConfig::load(&dir.path().join("none.toml"), false, overrides).unwrap_err();
            assert!(err.to_string().contains("Unsupported transport"), "{}", err);
        }
    }

    #[test]
    fn test_drain_timeout_from_file() {
        let file = write_config("drain_timeout_secs = 2\n");
        let config = NodeConfig::load(file.path(), true, Overrides::default()).unwrap();
        assert_eq!(config.host_config().drain_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_expand_tilde() {
        let plain = PathBuf::from("/etc/strand.toml");
        assert_eq!(expand_tilde(&plain), plain);
        if let Some(home) = dirs::home_dir() {
            assert_eq!(
                expand_tilde(Path::new("~/.strand/config.toml")),
                home.join(".strand/config.toml")
            );
        }
    }
}
