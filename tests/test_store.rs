use serde_json::json;
use std::collections::BTreeMap;
use tempfile::TempDir;

use fleet_admin::profile::{IndexEntry, Profile, ProfileDraft, ProfileStore};

fn profile(uid: &str, name: &str) -> Profile {
    let draft = ProfileDraft {
        name: name.to_string(),
        description: String::new(),
        users: vec![],
        groups: vec!["staff".to_string()],
    };
    let mut settings = BTreeMap::new();
    settings.insert("org.gnome.gsettings".to_string(), json!([]));
    Profile::new(uid, draft, settings)
}

fn entry(url: &str, name: &str) -> IndexEntry {
    IndexEntry {
        url: url.to_string(),
        display_name: name.to_string(),
    }
}

#[tokio::test]
async fn test_ensure_index_creates_empty_list() {
    let dir = TempDir::new().unwrap();
    let store = ProfileStore::new(dir.path().join("profiles"));

    store.ensure_index_exists().await.unwrap();

    let raw = std::fs::read_to_string(store.index_path()).unwrap();
    assert_eq!(raw, "[]");
}

#[tokio::test]
async fn test_ensure_index_keeps_existing_index() {
    let dir = TempDir::new().unwrap();
    let store = ProfileStore::new(dir.path());
    store.upsert_index_entry(entry("1", "One")).await.unwrap();

    store.ensure_index_exists().await.unwrap();
    store.ensure_index_exists().await.unwrap();

    assert_eq!(store.read_index().await.unwrap(), vec![entry("1", "One")]);
}

#[tokio::test]
async fn test_index_is_served_verbatim() {
    let dir = TempDir::new().unwrap();
    let store = ProfileStore::new(dir.path());
    let on_disk = br#"[{"url": "7", "displayName": "Hand written"}]"#;
    std::fs::write(store.index_path(), on_disk).unwrap();

    assert_eq!(store.read_index_raw().await.unwrap(), on_disk.to_vec());
}

#[tokio::test]
async fn test_profile_document_layout() {
    let dir = TempDir::new().unwrap();
    let store = ProfileStore::new(dir.path());

    store.write_profile(&profile("42", "Lab")).await.unwrap();

    let raw = std::fs::read(store.profile_path("42")).unwrap();
    let doc: serde_json::Value = serde_json::from_slice(&raw).unwrap();
    assert_eq!(
        doc,
        json!({
            "uid": "42",
            "name": "Lab",
            "description": "",
            "settings": {"org.gnome.gsettings": []},
            "applies-to": {"users": [], "groups": ["staff"]},
            "etag": "placeholder"
        })
    );
}

#[tokio::test]
async fn test_missing_profile_reads_as_none() {
    let dir = TempDir::new().unwrap();
    let store = ProfileStore::new(dir.path());

    assert!(store.read_profile_raw("nope").await.unwrap().is_none());
    assert!(store.read_profile("nope").await.unwrap().is_none());
}

#[tokio::test]
async fn test_upsert_replaces_entry_in_place() {
    let dir = TempDir::new().unwrap();
    let store = ProfileStore::new(dir.path());

    store.upsert_index_entry(entry("1", "One")).await.unwrap();
    store.upsert_index_entry(entry("2", "Two")).await.unwrap();
    store.upsert_index_entry(entry("1", "Uno")).await.unwrap();

    assert_eq!(
        store.read_index().await.unwrap(),
        vec![entry("1", "Uno"), entry("2", "Two")]
    );
}

#[tokio::test]
async fn test_delete_removes_file_and_index_entry() {
    let dir = TempDir::new().unwrap();
    let store = ProfileStore::new(dir.path());
    let p = profile("42", "Lab");
    store.write_profile(&p).await.unwrap();
    store.upsert_index_entry(p.index_entry()).await.unwrap();
    store.upsert_index_entry(entry("43", "Other")).await.unwrap();

    store.delete_profile("42").await.unwrap();

    assert!(!store.profile_path("42").exists());
    assert_eq!(store.read_index().await.unwrap(), vec![entry("43", "Other")]);
}

#[tokio::test]
async fn test_delete_of_unknown_profile_succeeds() {
    let dir = TempDir::new().unwrap();
    let store = ProfileStore::new(dir.path());

    store.delete_profile("abc").await.unwrap();

    assert!(store.read_index().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_corrupt_index_is_reported() {
    let dir = TempDir::new().unwrap();
    let store = ProfileStore::new(dir.path());
    std::fs::write(store.index_path(), b"{not json").unwrap();

    assert!(store.read_index().await.is_err());
    assert!(store.upsert_index_entry(entry("1", "One")).await.is_err());
}

#[tokio::test]
async fn test_concurrent_upserts_keep_every_entry() {
    let dir = TempDir::new().unwrap();
    let store = std::sync::Arc::new(ProfileStore::new(dir.path()));

    let mut tasks = Vec::new();
    for i in 0..16 {
        let store = store.clone();
        tasks.push(tokio::spawn(async move {
            store
                .upsert_index_entry(entry(&i.to_string(), "P"))
                .await
                .unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(store.read_index().await.unwrap().len(), 16);
}

#[tokio::test]
async fn test_no_temporary_files_left_behind() {
    let dir = TempDir::new().unwrap();
    let store = ProfileStore::new(dir.path());
    store.write_profile(&profile("1", "One")).await.unwrap();
    store.upsert_index_entry(entry("1", "One")).await.unwrap();

    let mut names: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();

    assert_eq!(names, vec!["1.json", "index.json"]);
}
