use std::net::SocketAddr;

use anyhow::Result;
use blob_store::BlobStorageConfig;
use figment::{
    providers::{Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkPolicyConfig {
    /// Expiry for "standard" secure links, seconds.
    pub standard_expiry_secs: u64,
    /// Expiry for single-use "temporary" secure links, seconds.
    pub temporary_expiry_secs: u64,
    /// Ttl handed to the blob store's native signer, seconds.
    pub presigned_expiry_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for LinkPolicyConfig {
    fn default() -> Self {
        LinkPolicyConfig {
            standard_expiry_secs: 24 * 60 * 60,
            temporary_expiry_secs: 15 * 60,
            presigned_expiry_secs: 60 * 60,
            sweep_interval_secs: 60 * 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: String,
    /// Base url prepended to issued secure paths and public file urls.
    pub public_base_url: String,
    pub structured_logging: bool,
    pub blob_storage: BlobStorageConfig,
    pub links: LinkPolicyConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            listen_addr: "0.0.0.0:8900".to_string(),
            public_base_url: "http://localhost:8900".to_string(),
            structured_logging: false,
            blob_storage: Default::default(),
            links: Default::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_path(path: &str) -> Result<ServerConfig> {
        let config_str = std::fs::read_to_string(path)?;
        let config: ServerConfig = Figment::from(Serialized::defaults(ServerConfig::default()))
            .merge(Yaml::string(&config_str))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.listen_addr.parse::<SocketAddr>().is_err() {
            return Err(anyhow::anyhow!(
                "invalid listen address: {}",
                self.listen_addr
            ));
        }
        if self.blob_storage.path.is_none() {
            return Err(anyhow::anyhow!("blob storage path must be set"));
        }
        if url::Url::parse(&self.public_base_url).is_err() {
            return Err(anyhow::anyhow!(
                "invalid public base url: {}",
                self.public_base_url
            ));
        }
        if self.links.standard_expiry_secs == 0 ||
            self.links.temporary_expiry_secs == 0 ||
            self.links.sweep_interval_secs == 0
        {
            return Err(anyhow::anyhow!("link expiry and sweep intervals must be non-zero"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        ServerConfig::default().validate().unwrap();
    }

    #[test]
    fn test_bad_listen_addr_rejected() {
        let config = ServerConfig {
            listen_addr: "not-an-addr".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_expiry_rejected() {
        let config = ServerConfig {
            links: LinkPolicyConfig {
                temporary_expiry_secs: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
