use assert_cmd::Command;
use predicates::prelude::*;
use std::fs::write;
use tempfile::{tempdir, NamedTempFile};

#[test]
fn help_lists_vendor_commands() {
    let mut cmd = Command::cargo_bin("gadget").expect("Binary exists");
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("artifactory").and(predicate::str::contains("bitbucket")));
}

#[test]
fn missing_config_file_fails() {
    let dir = tempdir().unwrap();
    let mut cmd = Command::cargo_bin("gadget").expect("Binary exists");
    cmd.arg("--config")
        .arg(dir.path().join("absent.yaml"))
        .args(["bitbucket", "repos", "--workspace", "acme"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read config file"));
}

#[test]
fn delete_repo_rejects_non_path_repo() {
    let config = NamedTempFile::new().expect("Creating temp config file failed");
    write(
        config.path(),
        b"bitbucket:\n  username: ci\n  password: secret\n",
    )
    .expect("Writing temp config failed");

    let mut cmd = Command::cargo_bin("gadget").expect("Binary exists");
    cmd.arg("--config")
        .arg(config.path())
        .args(["bitbucket", "delete-repo", "--repo", "just-a-name"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Repo is not a path-like value"));
}

#[test]
fn cleanup_requires_artifactory_section() {
    let config = NamedTempFile::new().expect("Creating temp config file failed");
    write(config.path(), b"bitbucket:\n  username: ci\n").expect("Writing temp config failed");

    let mut cmd = Command::cargo_bin("gadget").expect("Binary exists");
    cmd.arg("--config").arg(config.path()).args([
        "artifactory",
        "artifact-cleanup",
        "--repo",
        "libs",
        "--date",
        "6mo",
    ]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("artifactory"));
}

#[test]
fn load_permissions_reads_input_without_config() {
    let dir = tempdir().unwrap();
    let mut cmd = Command::cargo_bin("gadget").expect("Binary exists");
    cmd.current_dir(dir.path())
        .env("HOME", dir.path())
        .args(["bitbucket", "load-permissions", "--input", "absent.json"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read absent.json"));
}

#[test]
fn zero_threads_is_rejected() {
    let mut cmd = Command::cargo_bin("gadget").expect("Binary exists");
    cmd.args([
        "artifactory",
        "artifact-cleanup",
        "--repo",
        "libs",
        "--date",
        "6mo",
        "--threads",
        "0",
    ]);
    cmd.assert().failure().code(2);
}

use std::sync::{Arc, Mutex};
use tracing_subscriber::prelude::*; // needed for .with()
use tracing_subscriber::{layer::Context, Layer, Registry};

/// Custom Layer to collect emitted event messages.
struct EventCollector {
    events: Arc<Mutex<Vec<String>>>,
}

impl<S> Layer<S> for EventCollector
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        self.events.lock().unwrap().push(format!("{:?}", event));
    }
}

#[tokio::test]
async fn emits_trace_initialised_event() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let collector = EventCollector {
        events: events.clone(),
    };
    let subscriber = Registry::default().with(collector);
    let _guard = tracing::subscriber::set_default(subscriber);

    use gadget::cli::{run, BitbucketCommand, Cli, Commands};

    // A config path that does not exist: run fails, but only after tracing starts.
    let cli = Cli {
        config: Some(std::path::PathBuf::from("dummy.yaml")),
        command: Commands::Bitbucket(BitbucketCommand::Repos {
            workspace: "acme".to_string(),
        }),
    };

    let result = run(cli).await;
    assert!(result.is_err());

    let event_msgs = events.lock().unwrap();
    assert!(
        event_msgs.iter().any(|msg| msg.contains("trace_initialised")),
        "Expected a 'trace_initialised' trace event, got: {:?}",
        event_msgs
    );
}

#[test]
fn cleanup_defaults_to_five_workers_and_half_second_throttle() {
    use clap::Parser;
    use gadget::cli::{ArtifactoryCommand, Cli, Commands};

    let cli = Cli::try_parse_from([
        "gadget",
        "artifactory",
        "artifact-cleanup",
        "--repo",
        "libs",
        "--date",
        "6mo",
    ])
    .expect("arguments parse");

    match cli.command {
        Commands::Artifactory(ArtifactoryCommand::ArtifactCleanup(args)) => {
            assert_eq!(args.threads.get(), 5);
            assert_eq!(args.throttle_ms, 500);
            assert!(!args.purge);
        }
        _ => panic!("unexpected command"),
    }
}
