//! Built-in identity provider and mapper types.

use std::collections::HashMap;
use std::sync::Arc;

use crate::provider::{
    IdentityProviderFactory, IdentityProviderMapperFactory, ProviderMetadata, SpiError,
    require_keys,
};
use crate::registry::ProviderTypeRegistry;

/// Persistent SAML name id format, applied when a SAML provider declares none.
pub const SAML_PERSISTENT_NAME_ID: &str = "urn:oasis:names:tc:SAML:2.0:nameid-format:persistent";

/// Registers every built-in factory.
pub fn register_all(registry: &ProviderTypeRegistry) {
    registry.insert_identity_provider(Arc::new(SamlIdentityProviderFactory));
    registry.insert_identity_provider(Arc::new(OidcIdentityProviderFactory));
    registry.insert_mapper(Arc::new(HardcodedRoleMapperFactory));
    registry.insert_mapper(Arc::new(HardcodedAttributeMapperFactory));
    registry.insert_mapper(Arc::new(SamlAttributeMapperFactory));
    registry.insert_mapper(Arc::new(OidcClaimMapperFactory));
}

fn check_url(id: &str, config: &HashMap<String, String>, key: &str) -> Result<(), SpiError> {
    match config.get(key) {
        Some(url) if !(url.starts_with("https://") || url.starts_with("http://")) => Err(
            SpiError::invalid_config(id, format!("'{key}' must be an http(s) URL")),
        ),
        _ => Ok(()),
    }
}

fn check_bool(id: &str, config: &HashMap<String, String>, key: &str) -> Result<(), SpiError> {
    match config.get(key).map(String::as_str) {
        None | Some("true" | "false") => Ok(()),
        Some(_) => Err(SpiError::invalid_config(
            id,
            format!("'{key}' must be true or false"),
        )),
    }
}

// ============================================================================
// Identity provider types
// ============================================================================

/// SAML 2.0 identity providers, the type federations usually introduce.
#[derive(Debug, Default)]
pub struct SamlIdentityProviderFactory;

impl IdentityProviderFactory for SamlIdentityProviderFactory {
    fn id(&self) -> &'static str {
        "saml"
    }

    fn metadata(&self) -> ProviderMetadata {
        ProviderMetadata {
            id: "saml",
            name: "SAML v2.0",
            description: "SAML 2.0 identity provider",
        }
    }

    fn apply_defaults(&self, config: &mut HashMap<String, String>) {
        config
            .entry("nameIDPolicyFormat".to_string())
            .or_insert_with(|| SAML_PERSISTENT_NAME_ID.to_string());
        config
            .entry("principalType".to_string())
            .or_insert_with(|| "SUBJECT".to_string());
        config
            .entry("postBindingResponse".to_string())
            .or_insert_with(|| "true".to_string());
    }

    fn validate(&self, alias: &str, config: &HashMap<String, String>) -> Result<(), SpiError> {
        if alias.trim().is_empty() {
            return Err(SpiError::invalid_config(self.id(), "alias is empty"));
        }
        check_url(self.id(), config, "singleSignOnServiceUrl")?;
        check_url(self.id(), config, "singleLogoutServiceUrl")?;
        check_bool(self.id(), config, "postBindingResponse")?;
        check_bool(self.id(), config, "wantAuthnRequestsSigned")
    }
}

/// `OpenID` Connect identity providers.
#[derive(Debug, Default)]
pub struct OidcIdentityProviderFactory;

impl IdentityProviderFactory for OidcIdentityProviderFactory {
    fn id(&self) -> &'static str {
        "oidc"
    }

    fn metadata(&self) -> ProviderMetadata {
        ProviderMetadata {
            id: "oidc",
            name: "OpenID Connect v1.0",
            description: "OpenID Connect identity provider",
        }
    }

    fn apply_defaults(&self, config: &mut HashMap<String, String>) {
        config
            .entry("clientAuthMethod".to_string())
            .or_insert_with(|| "client_secret_post".to_string());
    }

    fn validate(&self, alias: &str, config: &HashMap<String, String>) -> Result<(), SpiError> {
        if alias.trim().is_empty() {
            return Err(SpiError::invalid_config(self.id(), "alias is empty"));
        }
        require_keys(self.id(), config, &["clientId"])?;
        check_url(self.id(), config, "authorizationUrl")?;
        check_url(self.id(), config, "tokenUrl")
    }
}

// ============================================================================
// Mapper types
// ============================================================================

/// Grants a fixed role to every user brokered through the provider.
#[derive(Debug, Default)]
pub struct HardcodedRoleMapperFactory;

impl IdentityProviderMapperFactory for HardcodedRoleMapperFactory {
    fn id(&self) -> &'static str {
        "hardcoded-role-idp-mapper"
    }

    fn metadata(&self) -> ProviderMetadata {
        ProviderMetadata {
            id: "hardcoded-role-idp-mapper",
            name: "Hardcoded Role",
            description: "Grants the configured role to brokered users",
        }
    }

    fn validate(&self, config: &HashMap<String, String>) -> Result<(), SpiError> {
        require_keys(self.id(), config, &["role"])
    }
}

/// Sets a fixed user attribute.
#[derive(Debug, Default)]
pub struct HardcodedAttributeMapperFactory;

impl IdentityProviderMapperFactory for HardcodedAttributeMapperFactory {
    fn id(&self) -> &'static str {
        "hardcoded-attribute-idp-mapper"
    }

    fn metadata(&self) -> ProviderMetadata {
        ProviderMetadata {
            id: "hardcoded-attribute-idp-mapper",
            name: "Hardcoded Attribute",
            description: "Sets the configured attribute on brokered users",
        }
    }

    fn validate(&self, config: &HashMap<String, String>) -> Result<(), SpiError> {
        require_keys(self.id(), config, &["attribute"])
    }
}

/// Copies a SAML assertion attribute into a user attribute.
#[derive(Debug, Default)]
pub struct SamlAttributeMapperFactory;

impl IdentityProviderMapperFactory for SamlAttributeMapperFactory {
    fn id(&self) -> &'static str {
        "saml-user-attribute-idp-mapper"
    }

    fn metadata(&self) -> ProviderMetadata {
        ProviderMetadata {
            id: "saml-user-attribute-idp-mapper",
            name: "Attribute Importer",
            description: "Imports a SAML attribute into a user attribute",
        }
    }

    fn compatible_providers(&self) -> &'static [&'static str] {
        &["saml"]
    }

    fn validate(&self, config: &HashMap<String, String>) -> Result<(), SpiError> {
        require_keys(self.id(), config, &["user.attribute"])?;
        if !config.contains_key("attribute.name") && !config.contains_key("attribute.friendly.name")
        {
            return Err(SpiError::invalid_config(
                self.id(),
                "one of 'attribute.name' or 'attribute.friendly.name' is required",
            ));
        }
        Ok(())
    }
}

/// Copies an OIDC token claim into a user attribute.
#[derive(Debug, Default)]
pub struct OidcClaimMapperFactory;

impl IdentityProviderMapperFactory for OidcClaimMapperFactory {
    fn id(&self) -> &'static str {
        "oidc-user-attribute-idp-mapper"
    }

    fn metadata(&self) -> ProviderMetadata {
        ProviderMetadata {
            id: "oidc-user-attribute-idp-mapper",
            name: "Claim Importer",
            description: "Imports a token claim into a user attribute",
        }
    }

    fn compatible_providers(&self) -> &'static [&'static str] {
        &["oidc"]
    }

    fn validate(&self, config: &HashMap<String, String>) -> Result<(), SpiError> {
        require_keys(self.id(), config, &["claim", "user.attribute"])
    }
}
