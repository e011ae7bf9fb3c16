use super::proxy::Proxy;
use serde::{Deserialize, Serialize};

/// How frpc authenticates against the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    #[default]
    Token,
    Oidc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Auth {
    pub method: AuthMethod,
    pub token: String,
}

/// frpc admin web server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct WebServer {
    pub addr: String,
    pub port: u16,
    pub user: String,
    pub password: String,
}

/// Which optional sections are enabled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Switches {
    pub auth: bool,
    pub web_server: bool,
}

/// Client configuration as stored by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    pub server_addr: String,
    pub server_port: u16,
    #[serde(default)]
    pub auth: Auth,
    #[serde(default)]
    pub web_server: WebServer,
    #[serde(default)]
    pub proxies: Vec<Proxy>,
    #[serde(default, rename = "switch")]
    pub switches: Switches,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1".to_string(),
            server_port: 7000,
            auth: Auth::default(),
            web_server: WebServer {
                addr: "127.0.0.1".to_string(),
                port: 7400,
                user: String::new(),
                password: String::new(),
            },
            proxies: Vec::new(),
            switches: Switches::default(),
        }
    }
}
