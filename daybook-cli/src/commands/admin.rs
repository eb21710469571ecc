//! Administrator commands. Non-admin accounts are refused before any
//! admin endpoint is called.

use anyhow::{bail, Result};
use daybook::model::UserProfile;
use daybook_client::ApiClient;

fn ensure_admin(profile: &UserProfile) -> Result<()> {
    if !profile.is_admin() {
        bail!(
            "{} has role {}; admin commands require ADMIN",
            profile.email,
            profile.role
        );
    }
    Ok(())
}

pub async fn run_stats(client: &ApiClient) -> Result<()> {
    ensure_admin(&client.me().await?)?;
    let stats = client.admin_stats().await?;
    println!("Users:  {}", stats.total_users);
    println!("Items:  {}", stats.total_items);
    println!("Blocks: {}", stats.total_blocks);
    println!("Files:  {}", stats.total_files);
    Ok(())
}

pub async fn run_users(client: &ApiClient) -> Result<()> {
    ensure_admin(&client.me().await?)?;
    for user in client.admin_users().await? {
        let locked = user
            .locked_until
            .map(|t| format!("  locked until {}", t.to_rfc3339()))
            .unwrap_or_default();
        println!(
            "{}  {:<5}  {:>4} items  {}{}",
            user.id,
            user.role.as_str(),
            user.item_count,
            user.email,
            locked
        );
    }
    Ok(())
}
