pub mod admin;
pub mod backup;
pub mod items;
pub mod migrate;

use anyhow::{Context, Result};
use daybook_client::ApiClient;

use crate::Account;

/// Build a client and log in with the configured credentials.
pub async fn connect(account: &Account) -> Result<ApiClient> {
    let client = ApiClient::new(&account.api_url)?;
    let email = account
        .email
        .as_deref()
        .context("No account email: pass --email or set DAYBOOK_EMAIL")?;
    let password = account
        .password
        .as_deref()
        .context("No password: pass --password or set DAYBOOK_PASSWORD")?;
    client
        .login(email, password)
        .await
        .with_context(|| format!("Failed to log in to {} as {}", account.api_url, email))?;
    tracing::debug!("Logged in as {}", email);
    Ok(client)
}
