//! Well-known identifiers of the default realm resources.

/// Client ids of the built-in clients.
pub mod client_ids {
    /// Account management client.
    pub const ACCOUNT: &str = "account";
    /// Account console client.
    pub const ACCOUNT_CONSOLE: &str = "account-console";
    /// Per-realm management client holding the admin roles.
    pub const REALM_MANAGEMENT: &str = "realm-management";
    /// Identity brokering client.
    pub const BROKER: &str = "broker";
    /// Admin console client.
    pub const ADMIN_CONSOLE: &str = "security-admin-console";
    /// Command-line admin client.
    pub const ADMIN_CLI: &str = "admin-cli";

    /// Suffix of the master admin client id kept in the admin realm.
    pub const MASTER_ADMIN_SUFFIX: &str = "-realm";
}

/// Role of the broker client allowing retrieval of stored provider tokens.
pub const READ_TOKEN_ROLE: &str = "read-token";

/// Client attribute selecting the PKCE challenge method.
pub const PKCE_METHOD_ATTRIBUTE: &str = "pkce.code.challenge.method";

/// Root URL placeholder resolved against the server base URL.
pub const AUTH_BASE_URL: &str = "${authBaseUrl}";

/// Root URL placeholder resolved against the admin base URL.
pub const AUTH_ADMIN_URL: &str = "${authAdminUrl}";

/// Client id of the client that administers `realm_name` from the admin realm.
#[must_use]
pub fn master_admin_client_id(realm_name: &str) -> String {
    format!("{realm_name}{}", client_ids::MASTER_ADMIN_SUFFIX)
}

/// Localizable display name of a built-in client.
pub(crate) fn client_label(client_id: &str) -> String {
    format!("${{client_{client_id}}}")
}

/// Localizable description of a built-in role.
pub(crate) fn role_label(role_name: &str) -> String {
    format!("${{role_{role_name}}}")
}

/// Base path of the account console for a realm.
pub(crate) fn account_base_url(realm_name: &str) -> String {
    format!("/realms/{realm_name}/account/")
}

/// Base path of the admin console for a realm.
pub(crate) fn admin_console_base_url(realm_name: &str) -> String {
    format!("/admin/{realm_name}/console/")
}
