//! Client against a real daybook server.

use bytes::Bytes;
use daybook::backup::ImportMode;
use daybook::model::Role;
use daybook::workspace::{CreateItem, DayNoteUpdate};
use daybook::{ApiServer, Config, Daybook};
use daybook_client::{ApiClient, ClientError, ItemDocument};
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;

const PNG: &[u8] = b"\x89PNG\r\n\x1a\nclient test image";

async fn start_server() -> (TempDir, String) {
    let temp = TempDir::new().unwrap();
    let mut config = Config::with_data_dir(temp.path());
    config.auth.argon2_memory_kib = 1024;
    config.auth.argon2_iterations = 1;
    config.auth.secure_cookies = false;

    let app = Daybook::open(config).unwrap();
    app.bootstrap().await.unwrap();
    let server = ApiServer::new(Arc::new(app));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        server.serve_on(listener).await.unwrap();
    });
    tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
    (temp, base_url)
}

async fn signed_in(base: &str, email: &str) -> ApiClient {
    let client = ApiClient::new(base).unwrap();
    client.register(email, None, "correct horse").await.unwrap();
    client.login(email, "correct horse").await.unwrap();
    client
}

#[tokio::test]
async fn test_uploaded_image_is_stored_relative() {
    let (_temp, base) = start_server().await;
    let client = signed_in(&base, "writer@example.com").await;

    let item = client
        .create_item(&CreateItem {
            title: "Standup".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();

    let uploaded = client
        .upload_file(item.id, "board.png", Bytes::from_static(PNG))
        .await
        .unwrap();
    assert_eq!(uploaded.mime_type, "image/png");

    let mut document = client.load_document(item.id).await.unwrap();
    assert_eq!(document, ItemDocument::default());
    document.insert_image(&uploaded.url, client.links());
    client.save_document(item.id, &document).await.unwrap();

    let stored = client.blocks(item.id).await.unwrap();
    let content: Value = serde_json::from_str(&stored.blocks[0].content).unwrap();
    let html = content["html"].as_str().unwrap();
    assert!(html.contains(&format!("src=\"{}\"", uploaded.url)), "{}", html);
    assert!(!html.contains(&base));

    let reloaded = client.load_document(item.id).await.unwrap();
    assert!(reloaded
        .html
        .contains(&format!("src=\"{}{}\"", base, uploaded.url)));

    // Saving the reloaded document again changes nothing.
    client.save_document(item.id, &reloaded).await.unwrap();
    let again = client.blocks(item.id).await.unwrap();
    assert_eq!(again.blocks[0].content, stored.blocks[0].content);
}

#[tokio::test]
async fn test_backup_moves_between_accounts() {
    let (_temp, base) = start_server().await;
    let source = signed_in(&base, "source@example.com").await;
    let target = signed_in(&base, "target@example.com").await;

    let date = chrono::NaiveDate::from_ymd_opt(2024, 4, 1).unwrap();
    let item = source
        .create_item(&CreateItem {
            title: "Quarter kickoff".to_string(),
            due_date: Some(date),
            ..Default::default()
        })
        .await
        .unwrap();
    let uploaded = source
        .upload_file(item.id, "plan.png", Bytes::from_static(PNG))
        .await
        .unwrap();
    let mut document = ItemDocument::default();
    document.insert_image(&uploaded.url, source.links());
    source.save_document(item.id, &document).await.unwrap();
    source
        .save_day_note(
            date,
            &DayNoteUpdate {
                issue: Some("budget".to_string()),
                memo: None,
            },
        )
        .await
        .unwrap();

    let archive = source.export_backup().await.unwrap();
    let report = target
        .import_backup("backup.zip", archive, ImportMode::Merge)
        .await
        .unwrap();
    assert_eq!(report.imported_items, 1);
    assert_eq!(report.imported_files, 1);
    assert!(report.errors.is_empty(), "{:?}", report.errors);

    let items = target.items(None, None).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].title, "Quarter kickoff");
    assert_eq!(items[0].due_date, Some(date));

    let note = target.day_note(date).await.unwrap();
    assert_eq!(note.issue, "budget");

    let files = target.files(items[0].id).await.unwrap();
    assert_eq!(files.len(), 1);
    assert_ne!(files[0].url, uploaded.url);
    let restored = target.load_document(items[0].id).await.unwrap();
    assert!(restored.html.contains(&files[0].url));
    assert!(!restored.html.contains(&uploaded.url));

    // The source account is untouched.
    assert_eq!(source.items(None, None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_role_gates_admin_calls() {
    let (_temp, base) = start_server().await;
    let user = signed_in(&base, "plain@example.com").await;
    assert_eq!(user.me().await.unwrap().role, Role::User);
    match user.admin_stats().await {
        Err(ClientError::Api { status, .. }) => assert_eq!(status, 403),
        other => panic!("expected 403, got {:?}", other),
    }

    let admin = ApiClient::new(&base).unwrap();
    admin.login("admin@example.com", "Admin1234!").await.unwrap();
    assert_eq!(admin.me().await.unwrap().role, Role::Admin);
    let stats = admin.admin_stats().await.unwrap();
    assert_eq!(stats.total_users, 2);
}

#[tokio::test]
async fn test_logout_forgets_token() {
    let (_temp, base) = start_server().await;
    let client = signed_in(&base, "leaver@example.com").await;
    client.logout().await.unwrap();
    assert!(!client.session().is_authenticated());
    assert!(matches!(client.me().await, Err(ClientError::SessionExpired)));
}
