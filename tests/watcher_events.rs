// tests/watcher_events.rs

use std::path::PathBuf;

use notify::event::{
    AccessKind, CreateKind, DataChange, Event, EventKind, ModifyKind, RemoveKind, RenameMode,
};

use dockwatch::watch::{change_events, ChangeEvent, ChangeKind};

fn event(kind: EventKind, paths: &[&str]) -> Event {
    paths
        .iter()
        .fold(Event::new(kind), |ev, p| ev.add_path(PathBuf::from(p)))
}

#[test]
fn create_modify_remove_map_directly() {
    let created = event(EventKind::Create(CreateKind::File), &["/project/new.R"]);
    assert_eq!(
        change_events(&created),
        vec![ChangeEvent::new("/project/new.R", ChangeKind::Created)]
    );

    let modified = event(
        EventKind::Modify(ModifyKind::Data(DataChange::Content)),
        &["/project/util.R"],
    );
    assert_eq!(
        change_events(&modified),
        vec![ChangeEvent::new("/project/util.R", ChangeKind::Modified)]
    );

    let removed = event(EventKind::Remove(RemoveKind::File), &["/project/old.R"]);
    assert_eq!(
        change_events(&removed),
        vec![ChangeEvent::new("/project/old.R", ChangeKind::Deleted)]
    );
}

#[test]
fn rename_reports_both_paths_as_modified() {
    let renamed = event(
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
        &["/project/api.R~", "/project/api.R"],
    );
    assert_eq!(
        change_events(&renamed),
        vec![
            ChangeEvent::new("/project/api.R~", ChangeKind::Modified),
            ChangeEvent::new("/project/api.R", ChangeKind::Modified),
        ]
    );
}

#[test]
fn access_and_unknown_events_are_dropped() {
    for kind in [
        EventKind::Access(AccessKind::Read),
        EventKind::Any,
        EventKind::Other,
    ] {
        assert!(change_events(&event(kind, &["/project/util.R"])).is_empty());
    }
}
