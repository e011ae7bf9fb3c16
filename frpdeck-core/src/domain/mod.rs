//! Data carried between the core and the backend

mod config;
mod process;
mod proxy;
mod version;

pub use config::{Auth, AuthMethod, ClientConfig, Switches, WebServer};
pub use process::ProcessState;
pub use proxy::{DomainKind, HttpProxy, HttpSwitch, HttpsProxy, Proxy, ProxyCommon};
pub use version::{ActiveRecord, VersionRecord};
