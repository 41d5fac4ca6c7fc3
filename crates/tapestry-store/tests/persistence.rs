//! Restart behaviour: what one process writes, the next one reads back.

use tapestry_core::{
    ActionKind, Intention, Ledger, ManualCommand, Region, Sentinel, ThreadDraft, TimeOfDay,
    Valkyrie,
};
use tapestry_store::{DataDir, Notification, Persister, Store};

#[tokio::test]
async fn ledger_and_log_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let data = DataDir::at(dir.path().join("nested"));
    data.ensure().unwrap();

    let woven = {
        let meta = Store::open(&data.db_path()).unwrap();
        let (persister, mut notifications) =
            Persister::spawn(Store::open(&data.db_path()).unwrap());
        let (ledger, err) = Ledger::load_from(&meta);
        assert!(err.is_none());
        let mut ledger = ledger.with_sink(persister.handle());

        for i in 0..4 {
            ledger
                .append(
                    ThreadDraft::new(Intention::KNOWN[i], TimeOfDay::Midday, Region::Medina)
                        .with_title("Copper lanterns"),
                )
                .unwrap();
        }

        let snapshot = ledger.snapshot();
        let report = Sentinel::default().assess(&snapshot);
        let mut valkyrie = Valkyrie::default();
        meta.append_log_entry(valkyrie.evaluate(&report, &snapshot))
            .unwrap();
        meta.append_log_entry(valkyrie.manual_override(
            ManualCommand {
                action: ActionKind::DeployScout,
                target: Some(Region::Medina),
            },
            &snapshot,
        ))
        .unwrap();

        persister.shutdown().await;
        let mut persisted = false;
        while let Ok(n) = notifications.try_recv() {
            persisted |= matches!(n, Notification::Persisted { threads: 4 });
        }
        assert!(persisted);
        snapshot.to_vec()
    };

    let store = Store::open(&data.db_path()).unwrap();
    let (ledger, err) = Ledger::load_from(&store);
    assert!(err.is_none());
    assert_eq!(ledger.snapshot().to_vec(), woven);
    assert!(ledger.verify_integrity().verified);

    let mut valkyrie = Valkyrie::default();
    valkyrie.restore_log(store.load_execution_log().unwrap());
    assert_eq!(valkyrie.execution_log().len(), 2);
    assert_eq!(valkyrie.execution_log()[1].action, ActionKind::DeployScout);
}

#[test]
fn data_dir_layout() {
    let dir = tempfile::tempdir().unwrap();
    let data = DataDir::at(dir.path());
    assert_eq!(data.db_path(), dir.path().join("tapestry.db"));
    assert_eq!(data.policy_path(), dir.path().join("policy.toml"));
}
