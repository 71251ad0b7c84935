//! Integration tests for deploying files to many targets
//!
//! These run the whole use case: path mapping, plugin dispatch, per-file
//! results, cancellation and the final state.

mod common;

use common::mock_plugins::{CancelAfterFirst, FailingOn};
use common::test_fixtures::{environment, registry_with, WorkspaceFixture};
use multideploy::application::use_cases::{DeployFilesUseCase, DeployObserver, TargetSummary};
use multideploy::domain::entities::Target;
use multideploy::domain::value_objects::{DeployState, FileStatus, MappingRule, PluginType};
use multideploy::infrastructure::plugins::local::LocalPlugin;
use multideploy::infrastructure::plugins::DeployPlugin;
use pretty_assertions::assert_eq;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct CountingObserver {
    files: AtomicUsize,
    targets: Mutex<Vec<String>>,
    states: Mutex<Vec<DeployState>>,
}

impl DeployObserver for CountingObserver {
    fn on_state_changed(&self, state: DeployState) {
        self.states.lock().unwrap().push(state);
    }

    fn on_file_completed(&self, _target: &str, _file: &Path, _status: &FileStatus) {
        self.files.fetch_add(1, Ordering::SeqCst);
    }

    fn on_target_completed(&self, summary: &TargetSummary) {
        self.targets.lock().unwrap().push(summary.target.clone());
    }
}

fn three_files(workspace: &WorkspaceFixture) -> Vec<PathBuf> {
    vec![
        workspace.write_file("one.txt", "1"),
        workspace.write_file("two.txt", "2"),
        workspace.write_file("three.txt", "3"),
    ]
}

#[tokio::test]
async fn test_local_target_copies_mapped_file() {
    let workspace = WorkspaceFixture::new();
    let file = workspace.write_file("src/a.txt", "hello");

    let target = Target::new("out", PluginType::LOCAL)
        .with_setting("dir", "out")
        .with_mapping(MappingRule::prefix("src/", ""));
    let registry = registry_with(vec![Arc::new(LocalPlugin::new())]);
    let use_case = DeployFilesUseCase::new(environment(&workspace, registry, vec![target.clone()]));

    let summary = use_case.deploy(&[file], &[target]).await.unwrap();

    assert_eq!(summary.state, DeployState::Completed);
    assert_eq!(summary.succeeded(), 1);
    assert_eq!(workspace.read_file("out/a.txt"), "hello");
    assert_eq!(
        summary.targets[0].files[0].target_path.as_deref(),
        Some("a.txt")
    );
}

#[tokio::test]
async fn test_unmapped_file_keeps_its_workspace_path() {
    let workspace = WorkspaceFixture::new();
    let file = workspace.write_file("src/a.txt", "hello");

    let target = Target::new("t1", PluginType::LOCAL).with_setting("dir", "out");
    let registry = registry_with(vec![Arc::new(LocalPlugin::new())]);
    let use_case = DeployFilesUseCase::new(environment(&workspace, registry, vec![target.clone()]));

    let summary = use_case.deploy(&[file], &[target]).await.unwrap();

    assert_eq!(summary.state, DeployState::Completed);
    assert_eq!(summary.succeeded(), 1);
    assert_eq!(
        summary.targets[0].files[0].target_path.as_deref(),
        Some("src/a.txt")
    );
    assert_eq!(workspace.read_file("out/src/a.txt"), "hello");
    assert!(!workspace.path("out/a.txt").exists());
}

#[tokio::test]
async fn test_one_failure_keeps_other_files() {
    let workspace = WorkspaceFixture::new();
    let files = three_files(&workspace);

    let plugin = Arc::new(FailingOn::new(PluginType::TEST, &["two.txt"]));
    let registry = registry_with(vec![plugin.clone() as Arc<dyn DeployPlugin>]);
    let target = Target::new("t", PluginType::TEST);
    let observer = Arc::new(CountingObserver::default());
    let use_case = DeployFilesUseCase::new(environment(&workspace, registry, vec![target.clone()]))
        .with_observer(observer.clone());

    let summary = use_case.deploy(&files, &[target]).await.unwrap();

    assert_eq!(summary.succeeded(), 2);
    assert_eq!(summary.failed(), 1);
    assert_eq!(summary.state, DeployState::CompletedWithErrors);
    assert_eq!(summary.message(), "1 of 3 files failed");
    assert!(matches!(
        summary.targets[0].files[1].status,
        FileStatus::Failed(_)
    ));
    assert_eq!(plugin.deployed(), vec!["one.txt", "three.txt"]);

    assert_eq!(observer.files.load(Ordering::SeqCst), 3);
    assert_eq!(*observer.targets.lock().unwrap(), vec!["t".to_string()]);
    assert_eq!(
        observer.states.lock().unwrap().last(),
        Some(&DeployState::CompletedWithErrors)
    );
}

#[tokio::test]
async fn test_cancel_after_first_file() {
    let workspace = WorkspaceFixture::new();
    let files = three_files(&workspace);

    let plugin = Arc::new(CancelAfterFirst::new());
    let registry = registry_with(vec![plugin.clone() as Arc<dyn DeployPlugin>]);
    let target = Target::new("t", PluginType::TEST);
    let use_case = DeployFilesUseCase::new(environment(&workspace, registry, vec![target.clone()]));
    let state = use_case.subscribe();

    let summary = use_case.deploy(&files, &[target]).await.unwrap();

    let statuses: Vec<FileStatus> = summary.targets[0]
        .files
        .iter()
        .map(|file| file.status.clone())
        .collect();
    assert_eq!(
        statuses,
        vec![
            FileStatus::Succeeded,
            FileStatus::Canceled,
            FileStatus::Canceled
        ]
    );
    assert_eq!(summary.state, DeployState::Canceled);
    assert_eq!(*state.borrow(), DeployState::Canceled);
    assert_eq!(plugin.deployed.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_every_file_is_reported_for_every_target() {
    let workspace = WorkspaceFixture::new();
    let files = three_files(&workspace);

    let registry = registry_with(vec![Arc::new(FailingOn::new(PluginType::TEST, &["one.txt"]))]);
    let targets = vec![
        Target::new("a", PluginType::TEST),
        Target::new("b", PluginType::TEST),
        Target::new("orphan", "unknown"),
        Target::new("mapped", PluginType::TEST).with_mapping(MappingRule::regex("(", "x")),
    ];
    let observer = Arc::new(CountingObserver::default());
    let use_case = DeployFilesUseCase::new(environment(&workspace, registry, targets.clone()))
        .with_observer(observer.clone());

    let summary = use_case.deploy(&files, &targets).await.unwrap();

    assert_eq!(summary.total(), files.len() * targets.len());
    assert_eq!(
        summary.succeeded() + summary.failed() + summary.canceled(),
        summary.total()
    );
    // 1 failure each on a and b, every file of the unknown type and the broken mapping
    assert_eq!(summary.failed(), 2 + 3 + 3);
    assert_eq!(observer.files.load(Ordering::SeqCst), summary.total());
    assert_eq!(observer.targets.lock().unwrap().len(), targets.len());
}

#[tokio::test]
async fn test_targets_run_independently() {
    let workspace = WorkspaceFixture::new();
    let file = workspace.write_file("index.html", "<html/>");

    let targets = vec![
        Target::new("first", PluginType::LOCAL).with_setting("dir", "first"),
        Target::new("second", PluginType::LOCAL)
            .with_setting("dir", "second")
            .with_mapping(MappingRule::prefix("", "www/")),
    ];
    let registry = registry_with(vec![Arc::new(LocalPlugin::new())]);
    let use_case = DeployFilesUseCase::new(environment(&workspace, registry, targets.clone()));

    let summary = use_case.deploy(&[file], &targets).await.unwrap();

    assert_eq!(summary.state, DeployState::Completed);
    assert_eq!(workspace.read_file("first/index.html"), "<html/>");
    assert_eq!(workspace.read_file("second/www/index.html"), "<html/>");
}
