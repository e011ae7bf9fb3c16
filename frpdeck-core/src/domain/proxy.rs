use serde::{Deserialize, Deserializer, Serialize};
use std::ops::{Deref, DerefMut};
use uuid::Uuid;

/// How an HTTP proxy is addressed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DomainKind {
    #[default]
    Sub,
    Custom,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct HttpSwitch {
    pub domain: DomainKind,
    pub auth: bool,
}

/// A proxy entry, tagged by its frp type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Proxy {
    Http(HttpProxy),
    Https(HttpsProxy),
}

impl Proxy {
    pub fn common(&self) -> &ProxyCommon {
        match self {
            Proxy::Http(p) => &p.common,
            Proxy::Https(p) => &p.common,
        }
    }

    pub fn common_mut(&mut self) -> &mut ProxyCommon {
        match self {
            Proxy::Http(p) => &mut p.common,
            Proxy::Https(p) => &mut p.common,
        }
    }
}

impl Deref for Proxy {
    type Target = ProxyCommon;

    fn deref(&self) -> &Self::Target {
        self.common()
    }
}

impl DerefMut for Proxy {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.common_mut()
    }
}

fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

// Blank ids are replaced too, not only missing ones.
fn blank_as_generated_id<'de, D>(de: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let id = Option::<String>::deserialize(de)?;
    Ok(match id {
        Some(s) if !s.trim().is_empty() => s,
        _ => generate_id(),
    })
}

/// Fields shared by every proxy type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProxyCommon {
    #[serde(default = "generate_id", deserialize_with = "blank_as_generated_id")]
    pub id: String,
    pub name: String,
    pub enable: bool,
    #[serde(rename = "localIP", default)]
    pub local_ip: String,
    #[serde(rename = "localPort", default)]
    pub local_port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct HttpProxy {
    #[serde(flatten)]
    pub common: ProxyCommon,
    #[serde(default)]
    pub subdomain: String,
    #[serde(default)]
    pub custom_domains: Vec<String>,
    #[serde(default)]
    pub locations: Vec<String>,
    #[serde(default)]
    pub http_user: String,
    #[serde(default)]
    pub http_password: String,
    #[serde(default)]
    pub switch: HttpSwitch,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct HttpsProxy {
    #[serde(flatten)]
    pub common: ProxyCommon,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_id_is_generated() {
        let json = serde_json::json!({
            "type": "https",
            "id": "  ",
            "name": "web",
            "enable": true,
            "localIP": "127.0.0.1",
            "localPort": 8443
        });
        let proxy: Proxy = serde_json::from_value(json).unwrap();
        assert!(!proxy.id.trim().is_empty());
        assert_eq!(proxy.name, "web");
        assert_eq!(proxy.local_port, 8443);
    }

    #[test]
    fn test_http_proxy_tag() {
        let proxy = Proxy::Http(HttpProxy {
            common: ProxyCommon {
                id: "p1".into(),
                name: "site".into(),
                enable: true,
                local_ip: "127.0.0.1".into(),
                local_port: 8080,
            },
            subdomain: "site".into(),
            ..Default::default()
        });

        let json = serde_json::to_value(&proxy).unwrap();
        assert_eq!(json["type"], "http");
        assert_eq!(json["localPort"], 8080);
        assert_eq!(json["subdomain"], "site");
    }
}
