//! End-to-end flow across both managers sharing one database: secrets are
//! created through the version manager, wired to clients through the
//! access-control manager, and read back as sanitized views.

use std::collections::BTreeMap;
use std::path::Path;

use keyrack_store::{
    AccessControl, ClientStore, GroupStore, NewSecret, SecretVersions, open_connection,
};
use keyrack_types::{Client, Group};

fn seed_identity(path: &Path, client_name: &str, group_name: &str) -> (Client, Group) {
    let conn = open_connection(path).expect("open seed connection");
    let clients = ClientStore::new(&conn);
    let groups = GroupStore::new(&conn);
    clients.create_client(client_name).expect("create client");
    groups.create_group(group_name).expect("create group");
    (
        clients
            .client_by_name(client_name)
            .expect("query")
            .expect("present"),
        groups
            .group_by_name(group_name)
            .expect("query")
            .expect("present"),
    )
}

#[test]
fn provision_grant_and_read_back_sanitized() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("keyrack.db");

    let mut secrets = SecretVersions::open(&path).expect("open secrets");
    let mut acl = AccessControl::open(&path).expect("open acl");
    let (client, group) = seed_identity(&path, "web-frontend", "web-services");

    let mut metadata = BTreeMap::new();
    metadata.insert("rotation".to_string(), "quarterly".to_string());
    let series_id = secrets
        .create_secret(&NewSecret {
            name: "db-pass",
            encrypted_content: "ZW5jcnlwdGVkLXBheWxvYWQ=",
            version: "v1",
            created_by: "ops",
            metadata,
            description: "production database password",
            type_tag: Some("password"),
            generation_options: None,
        })
        .expect("create secret");

    acl.enroll_client(client.id, group.id).expect("enroll");
    acl.allow_access(series_id, group.id).expect("allow");

    let visible = acl
        .sanitized_secrets_for_client(&client)
        .expect("sanitized set");
    assert_eq!(visible.len(), 1);
    let sanitized = visible.iter().next().expect("one entry");
    assert_eq!(sanitized.name, "db-pass");
    assert_eq!(sanitized.version, "v1");
    assert_eq!(
        sanitized.metadata.get("rotation").map(String::as_str),
        Some("quarterly")
    );

    let one = acl
        .sanitized_secret_for(&client, "db-pass", "v1")
        .expect("lookup")
        .expect("authorized");
    assert_eq!(one.series_id, series_id);
}

#[test]
fn deleting_the_last_version_revokes_visibility() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("keyrack.db");

    let mut secrets = SecretVersions::open(&path).expect("open secrets");
    let mut acl = AccessControl::open(&path).expect("open acl");
    let (client, group) = seed_identity(&path, "web-frontend", "web-services");

    let series_id = secrets
        .create_secret(&NewSecret {
            name: "api-key",
            encrypted_content: "a2V5LW1hdGVyaWFs",
            version: "",
            created_by: "ops",
            description: "third-party API key",
            ..NewSecret::default()
        })
        .expect("create secret");

    acl.enroll_client(client.id, group.id).expect("enroll");
    acl.allow_access(series_id, group.id).expect("allow");

    secrets
        .delete_secret_by_name_and_version("api-key", "")
        .expect("delete last version");

    // The emptied series is gone, and with it every sanitized view.
    assert!(secrets.secrets_by_id(series_id).expect("query").is_empty());
    assert!(
        acl.sanitized_secrets_for_client(&client)
            .expect("sanitized set")
            .is_empty()
    );
    assert_eq!(
        acl.sanitized_secret_for(&client, "api-key", "")
            .expect("lookup"),
        None
    );
}
