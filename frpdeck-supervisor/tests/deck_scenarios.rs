//! End-to-end scenarios: backend events in, reconciled state out

use frpdeck_core::prelude::*;
use frpdeck_core::testing::{FixedClock, StubFacade};
use frpdeck_supervisor::{Deck, LocalRunner, SupervisorError};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn versions() -> Vec<VersionRecord> {
    vec![
        VersionRecord::new("v1", "v0.60.0", "http://x/v1").installed().active(),
        VersionRecord::new("v2", "v0.61.0", "http://x/v2").installed(),
        VersionRecord::new("v3", "v0.62.0", "http://x/v3"),
    ]
}

async fn deck_with(config: DeckConfig) -> (Arc<StubFacade>, EventBus, Deck) {
    let facade = Arc::new(StubFacade::new());
    facade.set_versions(versions());
    let bus = EventBus::new();
    let deck = Deck::with_clock(
        facade.clone(),
        bus.clone(),
        config,
        Arc::new(FixedClock::at_hms(10, 0, 0)),
    );
    deck.hydrate().await.unwrap();
    (facade, bus, deck)
}

async fn deck() -> (Arc<StubFacade>, EventBus, Deck) {
    deck_with(DeckConfig::default()).await
}

/// Let handler tasks drain; with paused time this only returns once idle
async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

/// Poll until the exit event has been applied (real time)
async fn until_stopped(deck: &Deck) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while deck.process().is_running().await {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .unwrap();
}

fn log_texts(entries: &[LogEntry]) -> Vec<&str> {
    entries.iter().map(|e| e.text.as_str()).collect()
}

#[tokio::test(start_paused = true)]
async fn test_download_lifecycle() {
    let (facade, bus, deck) = deck().await;

    deck.downloads().start_download("v3", "http://x/v3").await.unwrap();
    assert_eq!(facade.count("download_version"), 1);

    bus.publish_raw("download-progress", json!({"name": "v3", "progress": 30}))
        .unwrap();
    settle().await;
    assert_eq!(deck.downloads().progress("v3").await, Some(30));

    bus.publish_raw("download-progress", json!({"name": "v3", "progress": 100}))
        .unwrap();
    settle().await;
    assert_eq!(deck.downloads().progress("v3").await, Some(100));

    tokio::time::sleep(deck.config().downloads.grace_delay).await;
    settle().await;

    assert_eq!(deck.downloads().progress("v3").await, None);
    assert!(deck.catalog().get("v3").await.unwrap().installed);
}

#[tokio::test(start_paused = true)]
async fn test_completion_notified_once() {
    let (_, bus, deck) = deck().await;
    let mut updates = deck.watch();

    deck.downloads().start_download("v3", "http://x/v3").await.unwrap();
    for _ in 0..3 {
        bus.publish(BackendEvent::DownloadProgress {
            name: "v3".into(),
            progress: 100,
        });
    }
    tokio::time::sleep(Duration::from_secs(2)).await;

    let mut completed = 0;
    while let Ok(update) = updates.try_recv() {
        if let DeckUpdate::Notice {
            notice: Notice::DownloadCompleted(name),
        } = update
        {
            assert_eq!(name, "v3");
            completed += 1;
        }
    }
    assert_eq!(completed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_progress_replay_is_idempotent() {
    let (_, bus, deck) = deck().await;
    deck.downloads().start_download("v3", "http://x/v3").await.unwrap();

    let event = BackendEvent::DownloadProgress {
        name: "v3".into(),
        progress: 45,
    };
    bus.publish(event.clone());
    settle().await;
    let once = (deck.downloads().snapshot().await, deck.catalog().list().await);

    bus.publish(event);
    settle().await;
    let twice = (deck.downloads().snapshot().await, deck.catalog().list().await);

    assert_eq!(once, twice);
}

#[tokio::test(start_paused = true)]
async fn test_activation_race() {
    let (_, bus, deck) = deck().await;
    assert_eq!(deck.catalog().active().await.unwrap().name, "v1");

    deck.activation().activate("v2").await.unwrap();
    bus.publish_raw("activation-status", json!({"status": true}))
        .unwrap();
    settle().await;

    assert!(!deck.catalog().get("v1").await.unwrap().active);
    assert!(deck.catalog().get("v2").await.unwrap().active);
    assert_eq!(deck.catalog().active_count().await, 1);
    assert!(!deck.activation().is_pending().await);
}

#[tokio::test(start_paused = true)]
async fn test_busy_rejection() {
    let (facade, _, deck) = deck().await;

    deck.activation().activate("v2").await.unwrap();
    let err = deck.activation().activate("v3").await.unwrap_err();

    assert!(matches!(err, DeckError::Busy { ref pending } if pending == "v2"));
    assert_eq!(deck.activation().intent().await.target(), Some("v2"));
    assert_eq!(facade.count("activate_version"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_never_two_active() {
    let (_, bus, deck) = deck().await;

    for target in ["v2", "v3", "v1", "v2"] {
        deck.activation().activate(target).await.unwrap();
        // Stale confirmation for another version, then the real one
        bus.publish(BackendEvent::ActivationStatus {
            status: true,
            name: Some("v0".into()),
        });
        bus.publish(BackendEvent::ActivationStatus {
            status: true,
            name: Some(target.into()),
        });
        settle().await;
        assert!(deck.catalog().active_count().await <= 1);
        assert_eq!(deck.catalog().active().await.unwrap().name, target);
    }

    // Confirmation with nothing pending changes nothing
    bus.publish(BackendEvent::ActivationStatus {
        status: true,
        name: None,
    });
    settle().await;
    assert_eq!(deck.catalog().active().await.unwrap().name, "v2");
}

#[tokio::test(start_paused = true)]
async fn test_process_exit() {
    let (_, bus, deck) = deck().await;

    deck.process().start("/opt/frpc/frpc", "/etc/frpc.toml").await.unwrap();
    assert!(deck.process().is_running().await);

    bus.publish_raw("process-stdout", json!("start proxy success"))
        .unwrap();
    bus.publish_raw("process-exit", json!({"code": 1})).unwrap();
    settle().await;

    assert!(!deck.process().is_running().await);
    assert_eq!(deck.process().exit_code().await, Some(1));
    let entries = deck.logs().entries().await;
    let last = entries.last().unwrap();
    assert_eq!(last.stream, LogStream::System);
    assert!(last.text.contains('1'));
    assert_eq!(entries[0].text, "start proxy success");
}

#[tokio::test(start_paused = true)]
async fn test_log_ordering_across_chunks() {
    let (_, bus, deck) = deck().await;
    deck.process().start("/opt/frpc/frpc", "/etc/frpc.toml").await.unwrap();

    bus.publish(BackendEvent::ProcessStdout {
        text: "a\nb\n".into(),
    });
    bus.publish(BackendEvent::ProcessStdout { text: "c\n".into() });
    settle().await;

    let entries = deck.logs().entries().await;
    let texts: Vec<_> = entries.iter().map(|e| e.text.as_str()).collect();
    assert_eq!(texts, ["a", "b", "c"]);
    assert!(entries.windows(2).all(|w| w[0].seq < w[1].seq));
    assert_eq!(
        deck.logs().render_text().await,
        "[10:00:00] STDOUT a\n[10:00:00] STDOUT b\n[10:00:00] STDOUT c"
    );
}

#[tokio::test(start_paused = true)]
async fn test_bounded_log_memory() {
    let config = DeckConfig::builder().log_capacity(50).build();
    let (_, bus, deck) = deck_with(config).await;
    deck.process().start("/opt/frpc/frpc", "/etc/frpc.toml").await.unwrap();

    for i in 0..57 {
        bus.publish(BackendEvent::ProcessStderr {
            text: format!("line {i}\n"),
        });
    }
    settle().await;

    let entries = deck.logs().entries().await;
    assert_eq!(entries.len(), 50);
    assert_eq!(entries[0].text, "line 7");
    assert_eq!(entries[49].text, "line 56");
}

#[tokio::test(start_paused = true)]
async fn test_restart_after_exit() {
    let (facade, bus, deck) = deck().await;

    deck.process().start("/opt/frpc/frpc", "/etc/frpc.toml").await.unwrap();
    let err = deck
        .process()
        .start("/opt/frpc/frpc", "/etc/frpc.toml")
        .await
        .unwrap_err();
    assert!(matches!(err, SupervisorError::Deck(DeckError::AlreadyRunning)));

    deck.process().stop().await.unwrap();
    bus.publish(BackendEvent::ProcessExit { code: None });
    settle().await;

    let pid = deck.process().start("/opt/frpc/frpc", "/etc/frpc.toml").await.unwrap();
    assert_eq!(pid, 4243);
    assert_eq!(facade.count("start_frpc"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_detached_deck_ignores_events() {
    let (_, bus, deck) = deck().await;
    deck.process().start("/opt/frpc/frpc", "/etc/frpc.toml").await.unwrap();

    deck.detach();
    bus.publish(BackendEvent::ProcessStdout { text: "lost\n".into() });
    settle().await;
    assert!(deck.logs().is_empty().await);

    assert!(deck.attach().await.unwrap());
    bus.publish(BackendEvent::ProcessStdout { text: "kept\n".into() });
    settle().await;
    assert_eq!(deck.logs().len().await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_last_output_kept_before_exit() {
    for _ in 0..100 {
        let bus = EventBus::new();
        let deck = Deck::new(Arc::new(StubFacade::new()), bus.clone(), DeckConfig::default());
        deck.hydrate().await.unwrap();
        deck.process().start("/opt/frpc/frpc", "/etc/frpc.toml").await.unwrap();

        bus.publish(BackendEvent::ProcessStderr {
            text: "login to server failed\n".into(),
        });
        bus.publish(BackendEvent::ProcessExit { code: Some(1) });
        until_stopped(&deck).await;

        assert_eq!(
            log_texts(&deck.logs().entries().await),
            ["login to server failed", "[frpc] exited code=1"]
        );
    }
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_runner_output_logged_before_exit() {
    for _ in 0..20 {
        let bus = EventBus::new();
        let deck = Deck::new(Arc::new(StubFacade::new()), bus.clone(), DeckConfig::default());
        deck.hydrate().await.unwrap();
        deck.process().start("/opt/frpc/frpc", "/etc/frpc.toml").await.unwrap();

        // `sh -c <script>` stands in for `frpc -c <config>`
        let runner = LocalRunner::new(bus.clone());
        runner
            .start("sh", "echo starting; echo 'login to server failed' >&2; exit 1")
            .await
            .unwrap();
        until_stopped(&deck).await;

        let entries = deck.logs().entries().await;
        let texts = log_texts(&entries);
        assert_eq!(texts.len(), 3);
        assert!(texts.contains(&"starting"));
        assert!(texts.contains(&"login to server failed"));
        assert_eq!(texts[2], "[frpc] exited code=1");
        assert_eq!(entries[2].stream, LogStream::System);
    }
}
