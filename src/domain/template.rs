//! Channel templates, versions, and provider bindings
//!
//! Loaded once per send as a tree and discarded; the delivery core only
//! consumes the activated approved version and its bindings.

use serde::{Deserialize, Serialize};

use crate::domain::types::{AuditStatus, Channel, OwnerType};
use crate::error::{KuryrError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelTemplate {
    pub id: u64,
    pub owner_id: u64,
    pub owner_type: OwnerType,
    pub name: String,
    pub channel: Channel,
    /// Zero means the template was never published.
    pub activated_version_id: u64,
    pub versions: Vec<TemplateVersion>,
}

impl ChannelTemplate {
    pub fn activated_version(&self) -> Option<&TemplateVersion> {
        if self.activated_version_id == 0 {
            return None;
        }
        self.versions.iter().find(|v| v.id == self.activated_version_id)
    }

    /// Resolve the binding a driver needs: the activated approved version and
    /// its entry for `provider_id`.
    pub fn resolve_binding(&self, provider_id: u64) -> Result<(&TemplateVersion, &ProviderBinding)> {
        let version = self
            .activated_version()
            .ok_or(KuryrError::NoActivatedTemplateVersion { tpl_id: self.id })?;

        if !version.audit_status.is_approved() {
            return Err(KuryrError::NotApprovedTemplateVersion {
                tpl_id: self.id,
                version_id: version.id,
            });
        }

        let binding = version
            .providers
            .iter()
            .find(|p| p.provider_id == provider_id)
            .ok_or_else(|| {
                KuryrError::record_not_found(format!(
                    "template {} version {} has no binding for provider {provider_id}",
                    self.id, version.id
                ))
            })?;

        Ok((version, binding))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateVersion {
    pub id: u64,
    pub tpl_id: u64,
    pub name: String,
    /// Sender signature shown to receivers, e.g. the SMS sign name.
    pub signature: String,
    pub content: String,
    pub audit_status: AuditStatus,
    pub providers: Vec<ProviderBinding>,
}

/// Per-provider entry of a template version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderBinding {
    pub id: u64,
    pub tpl_id: u64,
    pub tpl_version_id: u64,
    pub provider_id: u64,
    pub provider_name: String,
    pub provider_channel: Channel,
    /// Template id on the provider's side.
    pub provider_tpl_id: String,
    pub audit_status: AuditStatus,
}
