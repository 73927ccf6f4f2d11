use std::{
    net::{Ipv4Addr, SocketAddr},
    time::Duration,
};

pub const DEFAULT_PORT: u16 = 50007;
pub const DEFAULT_WIDTH: u32 = 32;
pub const DEFAULT_HEIGHT: u32 = 16;

#[derive(Clone, Debug)]
pub struct Config {
    pub width: u32,
    pub height: u32,
    pub refresh: RefreshConfig,
    /// `None` runs without the network control channel.
    pub server: Option<ServerConfig>,
    /// How long each component gets to wind down before shutdown is fatal.
    pub shutdown_timeout: Duration,
}
impl Config {
    pub fn headless(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            server: None,
            ..Self::default()
        }
    }
}
impl Default for Config {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            refresh: RefreshConfig::default(),
            server: Some(ServerConfig::default()),
            shutdown_timeout: Duration::from_secs(2),
        }
    }
}

#[derive(Clone, Debug)]
pub struct RefreshConfig {
    /// Longest the refresher waits for the buffer before recommitting the
    /// previous frame.
    pub lock_timeout: Duration,
    pub stats_interval: Duration,
}
impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_millis(2),
            stats_interval: Duration::from_secs(5),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub max_connections: usize,
    /// Accept polling period and socket read timeout. Bounds how long a stop
    /// request can go unnoticed.
    pub poll_interval: Duration,
    pub connection_join_timeout: Duration,
}
impl ServerConfig {
    /// Loopback on an ephemeral port.
    pub fn loopback() -> Self {
        Self {
            bind: SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
            ..Self::default()
        }
    }
}
impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            max_connections: 16,
            poll_interval: Duration::from_millis(50),
            connection_join_timeout: Duration::from_secs(1),
        }
    }
}
