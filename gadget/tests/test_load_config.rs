use gadget::load_config::{load_config, resolve_config_path};
use serial_test::serial;
use std::env;
use std::fs::write;
use tempfile::{tempdir, NamedTempFile};

const FULL_CONFIG: &str = r#"
artifactory:
  server: repo.example.com
  username: ci-bot
  password: from-file
bitbucket:
  username: ci-bot
  password: app-password
"#;

fn config_file(yaml: &str) -> NamedTempFile {
    let config_file = NamedTempFile::new().expect("temp file");
    write(config_file.path(), yaml).unwrap();
    config_file
}

/// Both vendor sections load, with the Bitbucket API URL defaulted.
#[test]
#[serial]
fn test_load_config_reads_both_sections() {
    env::remove_var("ARTIFACTORY_PASSWORD");
    env::remove_var("BITBUCKET_PASSWORD");
    let config_file = config_file(FULL_CONFIG);

    let config = load_config(config_file.path()).expect("Config should load");

    let artifactory = config.artifactory().expect("artifactory section");
    assert_eq!(artifactory.server, "repo.example.com");
    assert_eq!(artifactory.username, "ci-bot");
    assert_eq!(artifactory.password, "from-file");

    let bitbucket = config.bitbucket().expect("bitbucket section");
    assert_eq!(bitbucket.password, "app-password");
    assert_eq!(bitbucket.api_url, "https://api.bitbucket.org");
}

#[test]
#[serial]
fn test_env_passwords_override_file() {
    let config_file = config_file(FULL_CONFIG);
    env::set_var("ARTIFACTORY_PASSWORD", "from-env");
    env::set_var("BITBUCKET_PASSWORD", "bb-from-env");

    let config = load_config(config_file.path()).expect("Config should load");

    env::remove_var("ARTIFACTORY_PASSWORD");
    env::remove_var("BITBUCKET_PASSWORD");
    assert_eq!(config.artifactory().unwrap().password, "from-env");
    assert_eq!(config.bitbucket().unwrap().password, "bb-from-env");
}

/// A missing section is only an error once a task asks for it.
#[test]
#[serial]
fn test_missing_section_fails_on_access() {
    let config_file = config_file("artifactory:\n  server: localhost\n  username: admin\n");

    let config = load_config(config_file.path()).expect("Config should load");

    assert!(config.artifactory().is_ok());
    let err = config.bitbucket().expect_err("no bitbucket section");
    assert!(err.to_string().contains("bitbucket"), "got: {err}");
}

#[test]
#[serial]
fn test_empty_file_loads_empty_config() {
    let config_file = config_file("");
    let config = load_config(config_file.path()).expect("empty config is valid");
    assert!(config.artifactory().is_err());
    assert!(config.bitbucket().is_err());
}

#[test]
fn test_load_config_missing_file_fails() {
    let dir = tempdir().unwrap();
    let err = load_config(dir.path().join("absent.yaml")).expect_err("should fail");
    assert!(err.to_string().contains("Failed to read config file"), "got: {err}");
}

#[test]
fn test_load_config_invalid_yaml_fails() {
    let config_file = config_file("artifactory: [not, a, mapping");
    let err = load_config(config_file.path()).expect_err("should fail");
    assert!(err.to_string().contains("Failed to parse config YAML"), "got: {err}");
}

#[test]
fn test_resolve_prefers_explicit_path() {
    let dir = tempdir().unwrap();
    let existing = dir.path().join("found.yaml");
    write(&existing, FULL_CONFIG).unwrap();
    let explicit = dir.path().join("explicit.yaml");

    let path = resolve_config_path(Some(&explicit), &[existing]).unwrap();
    assert_eq!(path, explicit);
}

#[test]
fn test_resolve_takes_first_existing_candidate() {
    let dir = tempdir().unwrap();
    let home = dir.path().join(".tasker_conf.yaml");
    let local = dir.path().join("tasker_conf.yaml");
    write(&local, FULL_CONFIG).unwrap();

    let path = resolve_config_path(None, &[home.clone(), local.clone()]).unwrap();
    assert_eq!(path, local);

    write(&home, FULL_CONFIG).unwrap();
    let path = resolve_config_path(None, &[home.clone(), local]).unwrap();
    assert_eq!(path, home);
}

#[test]
fn test_resolve_without_candidates_fails() {
    let dir = tempdir().unwrap();
    let err = resolve_config_path(None, &[dir.path().join("nope.yaml")]).expect_err("should fail");
    assert!(err.to_string().contains("No config file found"), "got: {err}");
}
