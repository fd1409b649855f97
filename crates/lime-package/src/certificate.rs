//! Certificate generation contract
//!
//! Issuing certificates is delegated to a [`CertificateProvider`]; this module
//! only defines the request a plugin hands over and the PEM result it gets
//! back.

use crate::names::{impl_named_enum, NamedEnum};
use crate::provider::PluginError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Private key algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum KeyAlgorithm {
    #[default]
    Ecdsa,
    Rsa,
}

impl KeyAlgorithm {
    const RSA_SIZES: std::ops::RangeInclusive<u32> = 2048..=8192;

    /// Size used when a request leaves it at zero
    pub fn default_size(&self) -> u32 {
        match self {
            KeyAlgorithm::Ecdsa => 256,
            KeyAlgorithm::Rsa => 4096,
        }
    }

    /// Zero means "use the default size"
    pub fn valid_size(&self, size: u32) -> bool {
        match self {
            KeyAlgorithm::Ecdsa => matches!(size, 0 | 256 | 384 | 521),
            KeyAlgorithm::Rsa => size == 0 || Self::RSA_SIZES.contains(&size),
        }
    }
}

impl NamedEnum for KeyAlgorithm {
    const KIND: &'static str = "key algorithm";
    const NAMES: &'static [(Self, &'static str)] =
        &[(KeyAlgorithm::Ecdsa, "ecdsa"), (KeyAlgorithm::Rsa, "rsa")];
}

impl_named_enum!(KeyAlgorithm);

/// Key parameters of a request
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KeyRequest {
    pub algorithm: KeyAlgorithm,
    #[serde(default)]
    pub size: u32,
}

impl KeyRequest {
    /// Requested size, or the algorithm default when unset
    pub fn effective_size(&self) -> u32 {
        if self.size == 0 {
            self.algorithm.default_size()
        } else {
            self.size
        }
    }
}

/// Subject distinguished name fields
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CertificateName {
    #[serde(rename = "C", default)]
    pub country: String,
    #[serde(rename = "ST", default)]
    pub province: String,
    #[serde(rename = "L", default)]
    pub locality: String,
    #[serde(rename = "O", default)]
    pub organization: String,
    #[serde(rename = "OU", default, skip_serializing_if = "String::is_empty")]
    pub organizational_unit: String,
    #[serde(
        rename = "serialNumber",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub serial_number: String,
}

/// Where the generated certificate and key are written
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CertificatePath {
    #[serde(rename = "cert")]
    pub certificate: String,
    pub key: String,
}

/// A certificate to issue, as found in an action item payload
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateRequest {
    pub key: KeyRequest,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub common_name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub names: Vec<CertificateName>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hosts: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub serial_number: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub usage: Vec<String>,
    /// Lifetime in seconds
    #[serde(default, skip_serializing_if = "is_zero")]
    pub expires: u64,
    #[serde(rename = "ca", default)]
    pub is_ca: bool,
    pub path: CertificatePath,
}

fn is_zero(value: &u64) -> bool {
    *value == 0
}

impl CertificateRequest {
    pub fn lifetime(&self) -> Duration {
        Duration::from_secs(self.expires)
    }

    /// Check key size and output paths
    pub fn validate(&self) -> Result<(), PluginError> {
        if !self.key.algorithm.valid_size(self.key.size) {
            return Err(PluginError::Certificate(format!(
                "invalid {} key size {}",
                self.key.algorithm, self.key.size
            )));
        }
        if self.path.certificate.is_empty() || self.path.key.is_empty() {
            return Err(PluginError::Certificate(
                "certificate and key paths are required".to_string(),
            ));
        }
        Ok(())
    }
}

/// PEM encoded certificate and private key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    pub certificate: Vec<u8>,
    pub key: Vec<u8>,
}

/// Issues certificates on behalf of plugins
pub trait CertificateProvider: Send + Sync {
    fn generate(&self, request: &CertificateRequest) -> Result<Certificate, PluginError>;
}
