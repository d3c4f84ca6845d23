mod common;
use crate::common::{init_tracing, wait_until};

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use fleetvisor::agent::{AgentModule, ModuleEvent, ModuleSettings, ModuleStatus};
use fleetvisor::exec::{BackoffPolicy, RealProcessLauncher};
use fleetvisor::fs::RealFileSystem;
use fleetvisor::history::DirectoryHistory;
use fleetvisor::materialize::Materializer;
use fleetvisor::merge::{ModuleIdentity, YamlMergeStrategy};
use fleetvisor_test_utils::{fragments, with_timeout};

/// Script that records the config file it was started with, then idles.
fn write_child_script(dir: &Path, log: &Path) -> PathBuf {
    let script = dir.join("child.sh");
    std::fs::write(
        &script,
        format!(
            "#!/bin/sh\necho \"$2\" >> '{}'\nexec sleep 30\n",
            log.display()
        ),
    )
    .unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
    script
}

fn started_with(log: &Path) -> Vec<String> {
    std::fs::read_to_string(log)
        .map(|s| s.lines().map(str::to_string).collect())
        .unwrap_or_default()
}

#[tokio::test]
async fn config_change_restarts_child_on_new_location() {
    init_tracing();
    let tmp = tempfile::tempdir().unwrap();
    let log = tmp.path().join("started");
    let script = write_child_script(tmp.path(), &log);
    let root = tmp.path().join("state");

    let fs = Arc::new(RealFileSystem);
    let materializer = Materializer::with_fs(&root, Arc::new(YamlMergeStrategy::new()), fs.clone());
    let history = DirectoryHistory::new(5, fs);
    let module = AgentModule::new(
        ModuleSettings::new("demo", script.to_string_lossy()),
        ModuleIdentity {
            instance_id: "e2e".to_string(),
            module: "demo".to_string(),
        },
        materializer,
        Box::new(history),
        Arc::new(RealProcessLauncher::new(BackoffPolicy::default())),
    );
    let mut status = module.status();

    let (tx, rx) = mpsc::channel(4);
    let run = tokio::spawn(module.run(rx));

    tx.send(ModuleEvent::ConfigPushed {
        fragments: fragments(&[("base.yaml", "level: 1\n")]),
    })
    .await
    .unwrap();
    assert!(wait_until(Duration::from_secs(5), || started_with(&log).len() == 1).await);

    let first = PathBuf::from(&started_with(&log)[0]);
    assert!(first.starts_with(&root));
    assert!(std::fs::read_to_string(&first).unwrap().contains("level: 1"));

    tx.send(ModuleEvent::ConfigPushed {
        fragments: fragments(&[("base.yaml", "level: 2\n")]),
    })
    .await
    .unwrap();
    assert!(wait_until(Duration::from_secs(5), || started_with(&log).len() == 2).await);

    let second = PathBuf::from(&started_with(&log)[1]);
    assert_ne!(first, second);
    assert!(std::fs::read_to_string(&second).unwrap().contains("level: 2"));

    // The old location is left alone.
    assert!(first.exists());

    with_timeout(status.wait_for(|s| matches!(s, ModuleStatus::Running { generation: 2, .. })))
        .await
        .unwrap();

    tx.send(ModuleEvent::Shutdown).await.unwrap();
    with_timeout(run).await.unwrap().unwrap();
    assert_eq!(*status.borrow(), ModuleStatus::Stopped);
}
