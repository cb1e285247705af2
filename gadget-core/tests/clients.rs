use gadget_core::artifactory::{
    aql_next_cursor, aql_offset, is_item_path, ArtifactRecord, ArtifactoryClient, ArtifactoryConfig,
};
use gadget_core::bitbucket::{
    parse_repo_ref, BitbucketClient, BitbucketConfig, PermissionRecord, RepositoryRecord,
    DEFAULT_API_URL,
};
use gadget_core::contract::{
    DeleteError, Deleter, DeletionTask, FetchError, Page, PageRequest, PageSource,
};
use serde_json::json;

fn artifactory() -> ArtifactoryClient {
    ArtifactoryClient::new(&ArtifactoryConfig {
        server: "repo.example.com".into(),
        username: "ci".into(),
        password: "secret".into(),
    })
    .expect("client builds")
}

fn bitbucket() -> BitbucketClient {
    BitbucketClient::new(&BitbucketConfig {
        username: "ci".into(),
        password: "app-password".into(),
        api_url: DEFAULT_API_URL.into(),
    })
    .expect("client builds")
}

#[test]
fn page_reads_values_items_or_results() {
    for key in ["values", "items", "results"] {
        let body = json!({ key: [{ "id": 1 }, { "id": 2 }], "next": "https://next" });
        let page = Page::from_json(&body).expect("page parses");
        assert_eq!(page.items.len(), 2, "key {key}");
        assert_eq!(page.next.as_deref(), Some("https://next"));
    }
}

#[test]
fn page_treats_null_or_missing_next_as_last() {
    let null_next = Page::from_json(&json!({ "values": [{ "id": 1 }], "next": null })).unwrap();
    assert_eq!(null_next.next, None);

    let missing = Page::from_json(&json!({ "values": [{ "id": 1 }], "size": 1 })).unwrap();
    assert_eq!(missing.next, None);
}

#[test]
fn page_rejects_unexpected_shapes() {
    assert!(matches!(
        Page::from_json(&json!([1, 2, 3])),
        Err(FetchError::Decode(_))
    ));
    assert!(matches!(
        Page::from_json(&json!({ "size": 0 })),
        Err(FetchError::Decode(_))
    ));
    assert!(matches!(
        Page::from_json(&json!({ "values": [1] })),
        Err(FetchError::Decode(_))
    ));
}

#[test]
fn aql_cursor_is_next_offset_of_full_pages() {
    assert_eq!(aql_offset(&PageRequest::initial("https://x")).unwrap(), 0);
    assert_eq!(aql_offset(&PageRequest::Cursor("2000".into())).unwrap(), 2000);
    assert!(aql_offset(&PageRequest::Cursor("abc".into())).is_err());

    assert_eq!(aql_next_cursor(0, 1000, 1000).as_deref(), Some("1000"));
    assert_eq!(aql_next_cursor(1000, 999, 1000), None);
}

#[test]
fn artifactory_urls() {
    let client = artifactory();
    assert_eq!(
        client.artifact_url("libs", "com/acme/app/1.0/app.jar").as_str(),
        "https://repo.example.com/artifactory/libs/com/acme/app/1.0/app.jar"
    );
    assert_eq!(
        client.aql_url().as_str(),
        "https://repo.example.com/artifactory/api/search/aql"
    );
}

#[test]
fn artifactory_accepts_full_server_url() {
    let client = ArtifactoryClient::new(&ArtifactoryConfig {
        server: "http://localhost:8081/".into(),
        username: "admin".into(),
        password: String::new(),
    })
    .unwrap();
    assert_eq!(
        client.aql_url().as_str(),
        "http://localhost:8081/artifactory/api/search/aql"
    );
}

#[test]
fn artifact_record_paths() {
    let item = json!({
        "repo": "libs", "path": "com/acme", "name": "app.jar",
        "created": "2020-01-01T00:00:00.000Z", "updated": "2020-02-01T00:00:00.000Z",
        "size": 10
    });
    let record = ArtifactRecord::from_item(item.as_object().unwrap()).unwrap();
    assert_eq!(record.repo_path(), "com/acme/app.jar");
    assert_eq!(record.display_path(), "libs:com/acme/app.jar");

    let root = json!({ "repo": "libs", "path": ".", "name": "index.yaml" });
    let record = ArtifactRecord::from_item(root.as_object().unwrap()).unwrap();
    assert_eq!(record.repo_path(), "index.yaml");
    assert_eq!(record.created, None);
}

#[tokio::test]
async fn artifactory_refuses_foreign_targets() {
    let err = artifactory()
        .delete(&DeletionTask::repository("ws", "repo"))
        .await
        .expect_err("repository targets are not artifacts");
    assert!(matches!(err, DeleteError::Failed(_)));
}

#[test]
fn item_paths_must_be_below_repository_root() {
    assert!(is_item_path("com/acme/app.jar"));
    assert!(is_item_path("./team/app/1.0.0"));
    for root in ["", ".", "/", "./", "team/..", "../other-repo"] {
        assert!(!is_item_path(root), "{root:?} must be refused");
    }
}

#[tokio::test]
async fn artifactory_never_deletes_a_repository_root() {
    for path in [".", ""] {
        let err = artifactory()
            .delete(&DeletionTask::artifact("docker-local", path))
            .await
            .expect_err("repository root must not be deleted");
        match err {
            DeleteError::Failed(detail) => assert!(detail.contains("refusing"), "{detail}"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}

#[test]
fn bitbucket_listing_urls() {
    let client = bitbucket();
    assert_eq!(
        client.repositories_request("acme").as_str(),
        "https://api.bitbucket.org/2.0/repositories/acme?sort=name"
    );
    assert_eq!(
        client.members_request("acme").as_str(),
        "https://api.bitbucket.org/2.0/workspaces/acme/members"
    );
    assert_eq!(
        client.workspace_permissions_request("acme").as_str(),
        "https://api.bitbucket.org/2.0/workspaces/acme/permissions"
    );
    assert_eq!(
        client.repository_permissions_request("acme").as_str(),
        "https://api.bitbucket.org/2.0/workspaces/acme/permissions/repositories?sort=user.nickname"
    );
    assert_eq!(
        client.branches_request("acme", "api").as_str(),
        "https://api.bitbucket.org/2.0/repositories/acme/api/refs/branches"
    );
}

#[tokio::test]
async fn bitbucket_rejects_cursor_to_other_host() {
    let err = bitbucket()
        .fetch_page(&PageRequest::Cursor(
            "https://evil.example.com/2.0/repositories/acme?page=2".into(),
        ))
        .await
        .expect_err("foreign cursor must not be followed");
    assert!(matches!(err, FetchError::Decode(_)));
}

#[test]
fn repo_refs_need_workspace_and_slug() {
    assert_eq!(parse_repo_ref("acme/api"), Some(("acme", "api")));
    assert_eq!(parse_repo_ref("acme"), None);
    assert_eq!(parse_repo_ref("acme/"), None);
    assert_eq!(parse_repo_ref("/api"), None);
    assert_eq!(parse_repo_ref("acme/api/extra"), None);
}

#[test]
fn bitbucket_records_parse_from_items() {
    let repo = json!({
        "name": "api", "full_name": "acme/api", "language": "rust",
        "project": { "key": "PLAT" }, "created_on": "2019-05-01T09:00:00.123456+00:00"
    });
    let record = RepositoryRecord::from_item(repo.as_object().unwrap()).unwrap();
    assert_eq!(record.project.unwrap().key, "PLAT");

    let perm = json!({
        "permission": "write",
        "user": { "display_name": "Ada", "nickname": "ada", "uuid": "{1}" },
        "repository": { "name": "api", "full_name": "acme/api" }
    });
    let record = PermissionRecord::from_item(perm.as_object().unwrap()).unwrap();
    assert_eq!(record.permission, "write");
    assert_eq!(record.repository.unwrap().full_name.as_deref(), Some("acme/api"));
}
