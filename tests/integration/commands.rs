//! Command handlers against a real clone.

use crate::helpers::{RemoteFixture, SITE_URL, commands, initialized_store, plan};
use nautilus::store::{NewTask, ProjectStatus, TaskStatus, TaskUpdate};
use nautilus::{NautilusError, ProjectPlan};

#[tokio::test]
async fn init_writes_project_backlog_and_schema_in_one_commit() {
    let fixture = RemoteFixture::new();
    let store = fixture.open_store("clone").await;
    let reply = commands(&store)
        .init(plan(&["Spring tides", "Neap tides"]))
        .await
        .expect("init");
    assert!(reply.starts_with("Project ready: Oceans"));
    assert_eq!(fixture.commit_count(), 1);
    assert_eq!(fixture.last_subject(), "Initialize project: oceans");

    let project = store.read_project().await.expect("read").expect("project");
    assert_eq!(project.status, ProjectStatus::Active);
    assert_eq!(project.site_url, SITE_URL);

    let backlog = store.read_backlog().await.expect("read");
    let schema = store.read_schema().await.expect("read");
    let ids: Vec<String> = backlog.tasks.iter().map(|t| t.id.clone()).collect();
    assert_eq!(schema.sections[0].subsections[0].task_ids, ids);
    assert!(backlog.tasks.iter().all(|t| t.category == "tides"));
}

#[tokio::test]
async fn init_without_tasks_is_rejected() {
    let fixture = RemoteFixture::new();
    let store = fixture.open_store("clone").await;
    let empty = ProjectPlan {
        title: "Empty".to_owned(),
        ..Default::default()
    };
    let err = commands(&store).init(empty).await.expect_err("no tasks");
    assert!(matches!(err, NautilusError::InvalidPlan(_)));
    assert_eq!(fixture.commit_count(), 0);
}

#[tokio::test]
async fn add_puts_task_first_and_reactivates_completed_project() {
    let fixture = RemoteFixture::new();
    let store = initialized_store(&fixture, &["T1", "T2"]).await;
    store
        .update_project(|p| p.status = ProjectStatus::Completed)
        .await
        .expect("complete");

    let reply = commands(&store)
        .add(NewTask::new("Rogue waves", "Why they form", "Open Ocean"))
        .await
        .expect("add");
    assert!(reply.starts_with("Added to backlog: Rogue waves"));
    assert_eq!(fixture.last_subject(), "Add backlog task: Rogue waves");

    let backlog = store.read_backlog().await.expect("read");
    let titles: Vec<&str> = backlog.tasks.iter().map(|t| t.title.as_str()).collect();
    assert_eq!(titles, ["Rogue waves", "T1", "T2"]);
    assert_eq!(backlog.tasks[0].category, "open-ocean");

    let schema = store.read_schema().await.expect("read");
    let section = schema.find_section("open-ocean").expect("new section");
    assert_eq!(section.order, 1);
    assert_eq!(section.subsections[0].task_ids, vec![backlog.tasks[0].id.clone()]);

    let project = store.read_project().await.expect("read").expect("project");
    assert_eq!(project.status, ProjectStatus::Active);
}

#[tokio::test]
async fn add_to_existing_section_goes_to_front_of_subsection() {
    let fixture = RemoteFixture::new();
    let store = initialized_store(&fixture, &["T1"]).await;
    commands(&store)
        .add(NewTask::new("T0", "", "Tides"))
        .await
        .expect("add");

    let schema = store.read_schema().await.expect("read");
    assert_eq!(schema.sections.len(), 1);
    let backlog = store.read_backlog().await.expect("read");
    assert_eq!(
        schema.sections[0].subsections[0].task_ids[0],
        backlog.tasks[0].id
    );
}

#[tokio::test]
async fn pause_and_resume_round_trip() {
    let fixture = RemoteFixture::new();
    let store = initialized_store(&fixture, &["First"]).await;
    let cmds = commands(&store);

    assert_eq!(
        cmds.resume().await.expect("resume"),
        "Research is already running."
    );
    assert_eq!(
        cmds.pause().await.expect("pause"),
        "Research paused. Use resume to continue."
    );
    assert_eq!(fixture.last_subject(), "Pause research heartbeat");
    assert!(cmds.pause().await.expect("pause").contains("already paused"));

    let reply = cmds.add(NewTask::new("Second", "", "")).await.expect("add");
    assert!(reply.contains("currently paused"));

    assert_eq!(
        cmds.resume().await.expect("resume"),
        "Research resumed. Next task: Second"
    );
    assert_eq!(fixture.last_subject(), "Resume research heartbeat");
}

#[tokio::test]
async fn status_and_backlog_summaries() {
    let fixture = RemoteFixture::new();
    let store = initialized_store(&fixture, &["A", "B", "C"]).await;
    let backlog = store.read_backlog().await.expect("read");
    store
        .update_task(&backlog.tasks[0].id, TaskUpdate::status(TaskStatus::Failed))
        .await
        .expect("fail");
    store
        .update_task(&backlog.tasks[1].id, TaskUpdate::status(TaskStatus::InProgress))
        .await
        .expect("claim");

    let cmds = commands(&store);
    let status = cmds.status().await.expect("status");
    assert!(status.contains("Progress: 0/3 tasks completed (1 failed)"));
    assert!(status.contains("In progress: B"));
    assert!(status.contains(&format!("Site: {SITE_URL}")));

    let listing = cmds.backlog().await.expect("backlog");
    assert_eq!(listing, "Backlog: 1 tasks pending\n\nTides (1)\n  - C");
}

#[tokio::test]
async fn recover_requeues_and_commits() {
    let fixture = RemoteFixture::new();
    let store = initialized_store(&fixture, &["A"]).await;
    let cmds = commands(&store);
    assert_eq!(cmds.recover().await.expect("recover"), "No interrupted tasks found.");

    let id = store.read_backlog().await.expect("read").tasks[0].id.clone();
    store
        .update_task(&id, TaskUpdate::status(TaskStatus::InProgress))
        .await
        .expect("claim");
    assert_eq!(cmds.recover().await.expect("recover"), "Requeued 1 interrupted tasks.");
    assert_eq!(fixture.last_subject(), "Requeue 1 interrupted research tasks");
}

#[tokio::test]
async fn commands_without_project_explain_how_to_start() {
    let fixture = RemoteFixture::new();
    let store = fixture.open_store("clone").await;
    let cmds = commands(&store);
    for reply in [
        cmds.status().await.expect("status"),
        cmds.backlog().await.expect("backlog"),
        cmds.pause().await.expect("pause"),
        cmds.add(NewTask::new("x", "", "")).await.expect("add"),
    ] {
        assert!(reply.starts_with("No project found"), "{reply}");
    }
}
