//! Account and workspace item commands.

use anyhow::Result;
use chrono::NaiveDate;
use daybook::workspace::CreateItem;
use daybook_client::ApiClient;

pub async fn run_login(client: &ApiClient) -> Result<()> {
    let me = client.me().await?;
    println!("Logged in as {} ({}), role {}", me.email, me.nickname, me.role);
    Ok(())
}

pub async fn run_list(client: &ApiClient, query: Option<&str>, date: Option<NaiveDate>) -> Result<()> {
    let items = client.items(query, date).await?;
    if items.is_empty() {
        println!("No items");
        return Ok(());
    }
    for item in items {
        let due = item
            .due_date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{}  {:<10}  {:<6}  {}",
            item.id,
            due,
            item.status.as_str(),
            item.title
        );
    }
    Ok(())
}

pub async fn run_add(
    client: &ApiClient,
    title: String,
    due_date: Option<NaiveDate>,
    template_type: Option<String>,
) -> Result<()> {
    let item = client
        .create_item(&CreateItem {
            title,
            parent_id: None,
            due_date,
            template_type,
        })
        .await?;
    println!("Created {} ({})", item.id, item.title);
    Ok(())
}

pub async fn run_board(client: &ApiClient, month: &str) -> Result<()> {
    let rows = client.board(month).await?;
    println!("Board for {} ({} items)", month, rows.len());
    for row in rows {
        let due = row.due_date.map(|d| d.to_string()).unwrap_or_default();
        println!("{}  {}  [{}/{}]", due, row.title, row.checklist_done, row.checklist_total);
        if !row.today_work.is_empty() {
            println!("    work:  {}", row.today_work);
        }
        if !row.issue.is_empty() {
            println!("    issue: {}", row.issue);
        }
        if !row.memo.is_empty() {
            println!("    memo:  {}", row.memo);
        }
    }
    Ok(())
}
