pub mod config;
pub mod errors;
pub mod port_name;
pub mod types;

pub use config::{ChainProfile, PortMap, RtpLinkConfig, TransportEndpointConfig};
pub use errors::{ConfigError, DecodeError, StartupError, WiringError};
pub use port_name::{decode_port_name, DecodedPortName, PortRequest, PortTemplate};
pub use types::*;
