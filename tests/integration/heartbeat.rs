//! Heartbeat cycles end to end: research, settle, commit, notify.

use crate::helpers::{
    FailingNotifier, FailingSite, GatedResearch, PanickingResearch, RecordingNotifier,
    RemoteFixture, SITE_URL, ScriptedResearch, StalledNotifier, exists, heartbeat,
    heartbeat_with_site, initialized_store,
};
use nautilus::notify::Notification;
use nautilus::site::{ManifestSiteBuilder, PAGES_PATH, TOC_PATH};
use nautilus::store::{ProjectStatus, TaskStatus, TaskUpdate};
use nautilus::{CycleOutcome, GitError, Heartbeat, NautilusError, SkipReason};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn successful_cycle_completes_task_in_one_commit() {
    let fixture = RemoteFixture::new();
    let store = initialized_store(&fixture, &["Spring tides"]).await;
    let commits_before = fixture.commit_count();
    let project_before = store.read_project().await.expect("read").expect("project");

    let research = Arc::new(ScriptedResearch::succeeding("# Spring tides\n\nBody.").observing(&store));
    let notifier = Arc::new(RecordingNotifier::default());
    let hb = heartbeat(&store, research.clone(), notifier.clone());

    let outcome = hb.tick().await.expect("tick").expect("not busy");
    let CycleOutcome::TaskCompleted { task_id, output_path } = outcome else {
        panic!("unexpected outcome: {outcome:?}");
    };
    assert_eq!(output_path, "content/tides/spring-tides.md");

    // The task was persisted as in_progress before research ran.
    assert_eq!(
        *research.seen_status.lock().expect("lock"),
        vec![TaskStatus::InProgress]
    );

    let backlog = store.read_backlog().await.expect("read");
    let task = backlog.find(&task_id).expect("task");
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.output_path.as_deref(), Some(output_path.as_str()));

    let project = store.read_project().await.expect("read").expect("project");
    assert_ne!(project.updated_at, project_before.updated_at);
    assert_eq!(Some(project.updated_at), task.completed_at);
    assert_eq!(project.status, ProjectStatus::Active);

    assert_eq!(fixture.commit_count(), commits_before + 1);
    assert_eq!(fixture.last_subject(), "Complete research task: Spring tides");
    let article = fixture.remote_file(&output_path).expect("article pushed");
    assert!(article.starts_with("---\ntitle: \"Spring tides\"\n"));
    assert!(article.ends_with("# Spring tides\n\nBody.\n"));
    assert!(fixture.remote_file(TOC_PATH).is_some());
    let pages = fixture.remote_file(PAGES_PATH).expect("pages pushed");
    assert!(pages.contains("\"route\": \"tides/spring-tides\""));

    assert_eq!(
        notifier.sent(),
        vec![Notification::TaskCompleted {
            task_title: "Spring tides".to_owned(),
            page_url: format!("{SITE_URL}/tides/spring-tides"),
            follow_up_topics: vec!["Rogue waves".to_owned()],
        }]
    );
}

#[tokio::test]
async fn failed_research_marks_task_failed_in_one_commit() {
    let fixture = RemoteFixture::new();
    let store = initialized_store(&fixture, &["Neap tides", "King tides"]).await;
    let commits_before = fixture.commit_count();
    let project_before = store.read_project().await.expect("read").expect("project");

    let research = Arc::new(ScriptedResearch::failing("model timed out").observing(&store));
    let notifier = Arc::new(RecordingNotifier::default());
    let hb = heartbeat(&store, research.clone(), notifier.clone());

    let outcome = hb.tick().await.expect("tick").expect("not busy");
    let CycleOutcome::TaskFailed { task_id, error } = outcome else {
        panic!("unexpected outcome: {outcome:?}");
    };
    assert!(error.contains("model timed out"));
    assert_eq!(
        *research.seen_status.lock().expect("lock"),
        vec![TaskStatus::InProgress]
    );

    let backlog = store.read_backlog().await.expect("read");
    let failed = backlog.find(&task_id).expect("task");
    assert_eq!(failed.title, "Neap tides");
    assert_eq!(failed.status, TaskStatus::Failed);
    assert!(failed.output_path.is_none());
    assert_eq!(backlog.count(TaskStatus::Queued), 1);

    let project = store.read_project().await.expect("read").expect("project");
    assert!(project.updated_at > project_before.updated_at);

    assert_eq!(fixture.commit_count(), commits_before + 1);
    assert_eq!(fixture.last_subject(), "Mark research task failed: Neap tides");
    assert!(!exists(store.repo().local_path(), "content/tides/neap-tides.md"));

    let sent = notifier.sent();
    assert_eq!(sent.len(), 1);
    assert!(matches!(
        &sent[0],
        Notification::TaskFailed { task_title, error_message }
            if task_title == "Neap tides" && error_message.contains("model timed out")
    ));
}

#[tokio::test]
async fn interrupted_task_is_recovered_and_researched() {
    let fixture = RemoteFixture::new();
    let store = initialized_store(&fixture, &["Tidal bores", "Rip currents"]).await;
    let backlog = store.read_backlog().await.expect("read");
    let stuck = backlog.tasks[0].id.clone();
    store
        .update_task(&stuck, TaskUpdate::status(TaskStatus::InProgress))
        .await
        .expect("claim");
    store.commit_and_push("Crash mid-cycle").await.expect("commit");

    // A fresh process with its own clone.
    let restarted = fixture.open_store("restarted").await;
    let notifier = Arc::new(RecordingNotifier::default());
    let hb = heartbeat(
        &restarted,
        Arc::new(ScriptedResearch::succeeding("Recovered.")),
        notifier.clone(),
    );

    let outcome = hb.tick().await.expect("tick").expect("not busy");
    assert!(matches!(outcome, CycleOutcome::TaskCompleted { ref task_id, .. } if *task_id == stuck));

    let backlog = restarted.read_backlog().await.expect("read");
    assert_eq!(backlog.count(TaskStatus::InProgress), 0);
    assert_eq!(backlog.count(TaskStatus::Completed), 1);
    assert_eq!(backlog.count(TaskStatus::Queued), 1);
}

#[tokio::test]
async fn finished_backlog_completes_project_once() {
    let fixture = RemoteFixture::new();
    let store = initialized_store(&fixture, &["Only task"]).await;
    let notifier = Arc::new(RecordingNotifier::default());
    let hb = heartbeat(
        &store,
        Arc::new(ScriptedResearch::succeeding("Done.")),
        notifier.clone(),
    );

    assert!(matches!(
        hb.tick().await.expect("tick"),
        Some(CycleOutcome::TaskCompleted { .. })
    ));
    let commits_before = fixture.commit_count();

    assert_eq!(
        hb.tick().await.expect("tick"),
        Some(CycleOutcome::ProjectCompleted)
    );
    let project = store.read_project().await.expect("read").expect("project");
    assert_eq!(project.status, ProjectStatus::Completed);
    assert_eq!(fixture.commit_count(), commits_before + 1);
    assert_eq!(
        fixture.last_subject(),
        "Mark project completed: no queued tasks remain"
    );

    assert_eq!(
        hb.tick().await.expect("tick"),
        Some(CycleOutcome::Skipped(SkipReason::ProjectStatus(
            ProjectStatus::Completed
        )))
    );
    let completions = notifier
        .sent()
        .into_iter()
        .filter(|n| matches!(n, Notification::ProjectCompleted { .. }))
        .count();
    assert_eq!(completions, 1);
}

#[tokio::test]
async fn tick_while_busy_is_dropped() {
    let fixture = RemoteFixture::new();
    let store = initialized_store(&fixture, &["Slow task", "Next task"]).await;
    let started = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let hb = heartbeat(
        &store,
        Arc::new(GatedResearch {
            started: started.clone(),
            release: release.clone(),
        }),
        Arc::new(RecordingNotifier::default()),
    );

    let running = tokio::spawn({
        let hb = hb.clone();
        async move { hb.tick().await }
    });
    tokio::time::timeout(Duration::from_secs(30), started.notified())
        .await
        .expect("research started");

    assert!(hb.tick().await.expect("tick").is_none());
    let backlog = store.read_backlog().await.expect("read");
    assert_eq!(backlog.count(TaskStatus::InProgress), 1);

    release.notify_one();
    let outcome = running.await.expect("join").expect("tick");
    assert!(matches!(outcome, Some(CycleOutcome::TaskCompleted { .. })));

    let backlog = store.read_backlog().await.expect("read");
    assert_eq!(backlog.count(TaskStatus::InProgress), 0);
    assert_eq!(backlog.count(TaskStatus::Queued), 1);
}

#[tokio::test]
async fn paused_project_is_left_alone() {
    let fixture = RemoteFixture::new();
    let store = initialized_store(&fixture, &["A"]).await;
    crate::helpers::commands(&store).pause().await.expect("pause");
    let commits_before = fixture.commit_count();

    let hb = heartbeat(
        &store,
        Arc::new(ScriptedResearch::succeeding("x")),
        Arc::new(RecordingNotifier::default()),
    );
    assert_eq!(
        hb.tick().await.expect("tick"),
        Some(CycleOutcome::Skipped(SkipReason::ProjectStatus(
            ProjectStatus::Paused
        )))
    );
    assert_eq!(fixture.commit_count(), commits_before);
}

#[tokio::test]
async fn rejected_push_aborts_tick_and_next_tick_still_runs() {
    let fixture = RemoteFixture::new();
    let store = initialized_store(&fixture, &["First", "Second"]).await;
    let commits_before = fixture.commit_count();
    let notifier = Arc::new(RecordingNotifier::default());
    let hb = heartbeat(
        &store,
        Arc::new(ScriptedResearch::succeeding("Body.")),
        notifier.clone(),
    );

    fixture.reject_pushes();
    let err = hb.tick().await.expect_err("push declined");
    assert!(matches!(
        err,
        NautilusError::Git(GitError::PushRejected { .. })
    ));
    assert_eq!(fixture.rejected_push_attempts(), 1);
    assert_eq!(fixture.commit_count(), commits_before);
    assert!(notifier.sent().is_empty());

    fixture.accept_pushes();
    let outcome = hb.tick().await.expect("tick").expect("not busy");
    assert!(matches!(outcome, CycleOutcome::TaskCompleted { .. }));
    assert_eq!(fixture.commit_count(), commits_before + 2);
    assert_eq!(fixture.last_subject(), "Complete research task: Second");

    let backlog = store.read_backlog().await.expect("read");
    assert_eq!(backlog.count(TaskStatus::Completed), 2);
}

#[tokio::test]
async fn notification_errors_do_not_change_the_outcome() {
    let fixture = RemoteFixture::new();
    let store = initialized_store(&fixture, &["Works", "Breaks"]).await;

    let hb = heartbeat(
        &store,
        Arc::new(ScriptedResearch::succeeding("Body.")),
        Arc::new(FailingNotifier),
    );
    assert!(matches!(
        hb.tick().await.expect("tick"),
        Some(CycleOutcome::TaskCompleted { .. })
    ));

    let hb = heartbeat(
        &store,
        Arc::new(ScriptedResearch::failing("quota exceeded")),
        Arc::new(FailingNotifier),
    );
    assert!(matches!(
        hb.tick().await.expect("tick"),
        Some(CycleOutcome::TaskFailed { .. })
    ));
    assert_eq!(
        fixture.last_subject(),
        "Mark research task failed: Breaks"
    );
}

#[tokio::test]
async fn stalled_notifier_cannot_hold_up_the_cycle() {
    let fixture = RemoteFixture::new();
    let store = initialized_store(&fixture, &["A", "B"]).await;
    let hb = Arc::new(
        Heartbeat::new(
            store.clone(),
            Arc::new(ScriptedResearch::succeeding("Body.")),
            Arc::new(StalledNotifier),
            Arc::new(ManifestSiteBuilder::new(store.clone())),
            Duration::from_secs(3600),
        )
        .with_notify_timeout(Duration::from_millis(200)),
    );

    for _ in 0..2 {
        let outcome = tokio::time::timeout(Duration::from_secs(30), hb.tick())
            .await
            .expect("cycle finished")
            .expect("tick");
        assert!(matches!(outcome, Some(CycleOutcome::TaskCompleted { .. })));
    }
    let backlog = store.read_backlog().await.expect("read");
    assert_eq!(backlog.count(TaskStatus::Completed), 2);
}

#[tokio::test]
async fn site_failure_is_best_effort_on_failure_and_completion() {
    let fixture = RemoteFixture::new();
    let store = initialized_store(&fixture, &["Only"]).await;
    let notifier = Arc::new(RecordingNotifier::default());
    let hb = heartbeat_with_site(
        &store,
        Arc::new(ScriptedResearch::failing("no sources")),
        notifier.clone(),
        Arc::new(FailingSite),
    );

    let outcome = hb.tick().await.expect("tick");
    assert!(matches!(outcome, Some(CycleOutcome::TaskFailed { .. })));
    assert_eq!(fixture.last_subject(), "Mark research task failed: Only");

    assert_eq!(
        hb.tick().await.expect("tick"),
        Some(CycleOutcome::ProjectCompleted)
    );
    assert_eq!(
        fixture.last_subject(),
        "Mark project completed: no queued tasks remain"
    );
    assert_eq!(notifier.sent().len(), 2);
}

#[tokio::test]
async fn site_failure_after_research_fails_the_task() {
    let fixture = RemoteFixture::new();
    let store = initialized_store(&fixture, &["Only"]).await;
    let hb = heartbeat_with_site(
        &store,
        Arc::new(ScriptedResearch::succeeding("Body.")),
        Arc::new(RecordingNotifier::default()),
        Arc::new(FailingSite),
    );

    let outcome = hb.tick().await.expect("tick").expect("not busy");
    let CycleOutcome::TaskFailed { error, .. } = outcome else {
        panic!("unexpected outcome: {outcome:?}");
    };
    assert!(error.contains("site generator missing"), "{error}");
    let backlog = store.read_backlog().await.expect("read");
    assert_eq!(backlog.count(TaskStatus::Failed), 1);
}

#[tokio::test]
async fn panicking_research_fails_the_task() {
    let fixture = RemoteFixture::new();
    let store = initialized_store(&fixture, &["Crashes"]).await;
    let notifier = Arc::new(RecordingNotifier::default());
    let hb = heartbeat(&store, Arc::new(PanickingResearch), notifier.clone());

    let outcome = hb.tick().await.expect("tick").expect("not busy");
    let CycleOutcome::TaskFailed { error, .. } = outcome else {
        panic!("unexpected outcome: {outcome:?}");
    };
    assert!(error.contains("research backend crashed"), "{error}");
    let backlog = store.read_backlog().await.expect("read");
    assert_eq!(backlog.count(TaskStatus::Failed), 1);
    assert_eq!(backlog.count(TaskStatus::InProgress), 0);
    assert_eq!(fixture.last_subject(), "Mark research task failed: Crashes");
    assert_eq!(notifier.sent().len(), 1);
}

#[tokio::test]
async fn timer_loop_survives_panicking_research() {
    let fixture = RemoteFixture::new();
    let store = initialized_store(&fixture, &["A", "B"]).await;
    let hb = Arc::new(Heartbeat::new(
        store.clone(),
        Arc::new(PanickingResearch),
        Arc::new(RecordingNotifier::default()),
        Arc::new(ManifestSiteBuilder::new(store.clone())),
        Duration::from_secs(1),
    ));
    let handle = hb.start(CancellationToken::new());

    let drained = tokio::time::timeout(Duration::from_secs(30), async {
        loop {
            let backlog = store.read_backlog().await.expect("read");
            if backlog.count(TaskStatus::Failed) == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    })
    .await;
    assert!(drained.is_ok(), "both tasks should fail across two ticks");
    assert!(!handle.is_stopped());

    handle.stop();
    tokio::time::timeout(Duration::from_secs(30), handle.join())
        .await
        .expect("loop stopped");
}
