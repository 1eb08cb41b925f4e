//! Pairing flow tests driven through a scripted linker.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use wa_pairing_broker::error::{LinkError, PairingError};
use wa_pairing_broker::link::{CloseReason, LinkEvent};
use wa_pairing_broker::pairing::{spawn_sweeper, PairingService, StatusReport};
use wa_pairing_broker::phone::PhoneNumber;
use wa_pairing_broker::session::decode_session_string;

use super::test_utils::{
    dir_entry_count, eventually, fast_config, service, wait_closed, wait_receiver_dropped,
    MockLinker, MOCK_STORE_FILE,
};

fn phone(raw: &str) -> PhoneNumber {
    PhoneNumber::parse(raw).unwrap()
}

// =============================================================================
// Requesting Codes
// =============================================================================

#[tokio::test]
async fn test_request_code_registers_pending_session() {
    let work = TempDir::new().unwrap();
    let linker = MockLinker::with_code("ABCD1234");
    let service = service(linker.clone(), work.path());

    let ticket = service.request_code(phone("+1 (555) 010-9999")).await.unwrap();

    assert_eq!(ticket.code, "ABCD-1234");
    assert_eq!(ticket.session_id.len(), 16);
    assert_eq!(service.status(&ticket.session_id).await, StatusReport::Pending);

    let link = linker.last_link();
    assert_eq!(link.request.phone.digits(), "15550109999");
    assert_eq!(link.request.auth_dir, work.path().join(&ticket.session_id));
    assert_eq!(link.request.device_name, "TEST BOT");
    assert!(link.request.auth_dir.is_dir());
    assert!(!link.device.is_closed());
}

#[tokio::test]
async fn test_request_code_creates_missing_work_dir() {
    let work = TempDir::new().unwrap();
    let nested = work.path().join("a").join("b");
    let service = service(MockLinker::with_code("ABCD1234"), &nested);

    let ticket = service.request_code(phone("15550109999")).await.unwrap();

    assert!(nested.join(&ticket.session_id).is_dir());
}

#[tokio::test]
async fn test_concurrent_requests_get_distinct_sessions() {
    let work = TempDir::new().unwrap();
    let service = service(MockLinker::with_code("ABCD1234"), work.path());

    let mut tasks = Vec::new();
    for i in 0..8 {
        let service = Arc::clone(&service);
        tasks.push(tokio::spawn(async move {
            service
                .request_code(phone(&format!("1555010000{}", i)))
                .await
                .unwrap()
        }));
    }

    let mut ids = HashSet::new();
    for task in tasks {
        ids.insert(task.await.unwrap().session_id);
    }

    assert_eq!(ids.len(), 8);
    assert_eq!(service.registry().len().await, 8);
    assert_eq!(dir_entry_count(work.path()), 8);
}

#[tokio::test]
async fn test_code_timeout_abandons_session() {
    let work = TempDir::new().unwrap();
    let linker = MockLinker::silent();
    let service = service(linker.clone(), work.path());

    let err = service.request_code(phone("15550109999")).await.unwrap_err();

    assert!(matches!(err, PairingError::CodeUnavailable { .. }));
    assert!(service.registry().is_empty().await);
    assert_eq!(dir_entry_count(work.path()), 0);
    assert!(linker.last_link().device.is_closed());
}

#[tokio::test]
async fn test_link_closed_before_code() {
    let work = TempDir::new().unwrap();
    let linker = MockLinker::closing(CloseReason::Error("stream error 515".to_string()));
    let service = service(linker.clone(), work.path());

    let err = service.request_code(phone("15550109999")).await.unwrap_err();

    match err {
        PairingError::CodeUnavailable { reason } => assert!(reason.contains("515")),
        other => panic!("expected CodeUnavailable, got {:?}", other),
    }
    assert!(service.registry().is_empty().await);
    assert_eq!(dir_entry_count(work.path()), 0);
}

#[tokio::test]
async fn test_link_start_failure_cleans_up() {
    let work = TempDir::new().unwrap();
    let service = service(MockLinker::failing(), work.path());

    let err = service.request_code(phone("15550109999")).await.unwrap_err();

    assert!(matches!(err, PairingError::Link(LinkError::Connect(_))));
    assert!(service.registry().is_empty().await);
    assert_eq!(dir_entry_count(work.path()), 0);
}

#[tokio::test]
async fn test_dropped_request_discards_session() {
    let work = TempDir::new().unwrap();
    let linker = MockLinker::silent();
    let config = fast_config(work.path()).with_code_timeout(Duration::from_secs(30));
    let service = Arc::new(PairingService::new(linker.clone(), config));

    let svc = Arc::clone(&service);
    let request = tokio::spawn(async move { svc.request_code(phone("15550109999")).await });

    let svc = Arc::clone(&service);
    assert!(
        eventually(|| {
            let svc = Arc::clone(&svc);
            async move { svc.registry().len().await == 1 }
        })
        .await
    );

    // Same as an HTTP client hanging up mid-request
    request.abort();

    let svc = Arc::clone(&service);
    assert!(
        eventually(|| {
            let svc = Arc::clone(&svc);
            async move { svc.registry().is_empty().await }
        })
        .await
    );
    let link = linker.last_link();
    assert!(wait_closed(&link.device).await);
    assert!(wait_receiver_dropped(&link).await);
    let work_dir = work.path().to_path_buf();
    assert!(
        eventually(|| {
            let work_dir = work_dir.clone();
            async move { dir_entry_count(&work_dir) == 0 }
        })
        .await
    );
}

// =============================================================================
// Link Lifecycle
// =============================================================================

#[tokio::test]
async fn test_connected_link_publishes_and_delivers_session() {
    let work = TempDir::new().unwrap();
    let linker = MockLinker::with_code("ABCD1234");
    let service = service(linker.clone(), work.path());

    let ticket = service.request_code(phone("15550109999")).await.unwrap();
    let link = linker.last_link();
    link.emit(LinkEvent::Connected);

    assert!(wait_closed(&link.device).await);

    let session = match service.status(&ticket.session_id).await {
        StatusReport::Connected { session: Some(session) } => session,
        other => panic!("expected connected with session, got {:?}", other),
    };

    let files = decode_session_string(&session).unwrap();
    assert_eq!(
        files.get(MOCK_STORE_FILE).map(Vec::as_slice),
        Some(b"creds-for-15550109999".as_slice())
    );

    let sent = link.device.sent();
    assert_eq!(sent.len(), 3);
    assert!(sent.iter().all(|(to, _)| to == "15550109999"));
    assert!(sent[0].1.contains("TEST BOT"));
    assert_eq!(sent[1].1, session);
    assert!(sent[2].1.contains("SESSION_DATA"));
}

#[tokio::test]
async fn test_send_failure_keeps_session_connected() {
    let work = TempDir::new().unwrap();
    let linker = MockLinker::with_code("ABCD1234").with_failing_sends();
    let service = service(linker.clone(), work.path());

    let ticket = service.request_code(phone("15550109999")).await.unwrap();
    let link = linker.last_link();
    link.emit(LinkEvent::Connected);

    assert!(wait_closed(&link.device).await);

    assert!(matches!(
        service.status(&ticket.session_id).await,
        StatusReport::Connected { session: Some(_) }
    ));
    assert_eq!(link.device.send_attempts(), 1);
    assert!(link.device.sent().is_empty());
}

#[tokio::test]
async fn test_encode_failure_marks_failed() {
    let work = TempDir::new().unwrap();
    let linker = MockLinker::with_code("ABCD1234");
    let service = service(linker.clone(), work.path());

    let ticket = service.request_code(phone("15550109999")).await.unwrap();
    let link = linker.last_link();

    // Nothing left to pack once connected
    std::fs::remove_dir_all(&link.request.auth_dir).unwrap();
    link.emit(LinkEvent::Connected);

    assert!(wait_closed(&link.device).await);
    assert_eq!(service.status(&ticket.session_id).await, StatusReport::Failed);
    assert_eq!(link.device.send_attempts(), 0);
    assert!(link.device.sent().is_empty());
}

#[tokio::test]
async fn test_refreshed_code_keeps_pending() {
    let work = TempDir::new().unwrap();
    let linker = MockLinker::with_code("ABCD1234");
    let service = service(linker.clone(), work.path());

    let ticket = service.request_code(phone("15550109999")).await.unwrap();
    let link = linker.last_link();
    link.emit(LinkEvent::PairingCode("WXYZ9876".to_string()));
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(service.status(&ticket.session_id).await, StatusReport::Pending);
    assert!(!link.device.is_closed());
    assert!(!link.receiver_dropped());
}

#[tokio::test]
async fn test_link_error_marks_failed() {
    let work = TempDir::new().unwrap();
    let linker = MockLinker::with_code("ABCD1234");
    let service = service(linker.clone(), work.path());

    let ticket = service.request_code(phone("15550109999")).await.unwrap();
    linker
        .last_link()
        .emit(LinkEvent::Closed(CloseReason::Error("connection reset".to_string())));

    let svc = Arc::clone(&service);
    let id = ticket.session_id.clone();
    assert!(
        eventually(|| {
            let svc = Arc::clone(&svc);
            let id = id.clone();
            async move { svc.status(&id).await == StatusReport::Failed }
        })
        .await
    );
}

#[tokio::test]
async fn test_logged_out_leaves_status_pending() {
    let work = TempDir::new().unwrap();
    let linker = MockLinker::with_code("ABCD1234");
    let service = service(linker.clone(), work.path());

    let ticket = service.request_code(phone("15550109999")).await.unwrap();
    let link = linker.last_link();
    link.emit(LinkEvent::Closed(CloseReason::LoggedOut));
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(service.status(&ticket.session_id).await, StatusReport::Pending);

    // The link can still complete afterwards
    link.emit(LinkEvent::Connected);
    assert!(wait_closed(&link.device).await);
    assert!(matches!(
        service.status(&ticket.session_id).await,
        StatusReport::Connected { .. }
    ));
}

#[tokio::test]
async fn test_failure_after_connect_keeps_connected() {
    let work = TempDir::new().unwrap();
    let linker = MockLinker::with_code("ABCD1234");
    let service = service(linker.clone(), work.path());

    let ticket = service.request_code(phone("15550109999")).await.unwrap();
    let link = linker.last_link();
    link.emit(LinkEvent::Connected);

    assert!(wait_closed(&link.device).await);

    // The watcher has finished; late events have no receiver
    let _ = link
        .events
        .send(LinkEvent::Closed(CloseReason::Error("late".to_string())));
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(matches!(
        service.status(&ticket.session_id).await,
        StatusReport::Connected { session: Some(_) }
    ));
}

// =============================================================================
// Expiry
// =============================================================================

#[tokio::test]
async fn test_sweep_removes_expired_sessions() {
    let work = TempDir::new().unwrap();
    let linker = MockLinker::with_code("ABCD1234");
    let config = fast_config(work.path()).with_session_ttl(Duration::from_millis(50));
    let service = Arc::new(PairingService::new(linker.clone(), config));

    let ticket = service.request_code(phone("15550109999")).await.unwrap();
    assert_eq!(service.sweep_expired().await, 0);

    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(service.sweep_expired().await, 1);
    assert_eq!(service.status(&ticket.session_id).await, StatusReport::NotFound);
    assert_eq!(dir_entry_count(work.path()), 0);
    assert_eq!(linker.last_link().device.close_count(), 1);
}

#[tokio::test]
async fn test_sweep_stops_link_watcher() {
    let work = TempDir::new().unwrap();
    let linker = MockLinker::with_code("ABCD1234");
    let config = fast_config(work.path()).with_session_ttl(Duration::from_millis(20));
    let service = Arc::new(PairingService::new(linker.clone(), config));

    let ticket = service.request_code(phone("15550109999")).await.unwrap();
    let link = linker.last_link();
    assert!(!link.receiver_dropped());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(service.sweep_expired().await, 1);

    assert!(wait_receiver_dropped(&link).await);

    // A late connection for the swept session goes nowhere
    assert!(link.events.send(LinkEvent::Connected).is_err());
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(service.status(&ticket.session_id).await, StatusReport::NotFound);
    assert!(link.device.sent().is_empty());
    assert_eq!(link.device.close_count(), 1);
}

#[tokio::test]
async fn test_sweep_during_linger_stops_watcher() {
    let work = TempDir::new().unwrap();
    let linker = MockLinker::with_code("ABCD1234");
    let config = fast_config(work.path())
        .with_session_ttl(Duration::from_millis(20))
        .with_linger(Duration::from_secs(30));
    let service = Arc::new(PairingService::new(linker.clone(), config));

    let ticket = service.request_code(phone("15550109999")).await.unwrap();
    let link = linker.last_link();
    link.emit(LinkEvent::Connected);

    let device = Arc::clone(&link.device);
    assert!(
        eventually(|| {
            let device = Arc::clone(&device);
            async move { device.sent().len() == 3 }
        })
        .await
    );
    assert!(!link.device.is_closed());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(service.sweep_expired().await, 1);

    assert!(wait_receiver_dropped(&link).await);
    assert_eq!(service.status(&ticket.session_id).await, StatusReport::NotFound);
    assert_eq!(link.device.close_count(), 1);
}

#[tokio::test]
async fn test_sweep_keeps_fresh_sessions() {
    let work = TempDir::new().unwrap();
    let linker = MockLinker::with_code("ABCD1234");
    let config = fast_config(work.path()).with_session_ttl(Duration::from_secs(60));
    let service = Arc::new(PairingService::new(linker, config));

    let ticket = service.request_code(phone("15550109999")).await.unwrap();

    assert_eq!(service.sweep_expired().await, 0);
    assert_eq!(service.status(&ticket.session_id).await, StatusReport::Pending);
}

#[tokio::test]
async fn test_sweeper_task_runs_periodically() {
    let work = TempDir::new().unwrap();
    let linker = MockLinker::with_code("ABCD1234");
    let config = fast_config(work.path()).with_session_ttl(Duration::from_millis(30));
    let service = Arc::new(PairingService::new(linker, config));

    service.request_code(phone("15550109999")).await.unwrap();
    service.request_code(phone("15550108888")).await.unwrap();

    let sweeper = spawn_sweeper(Arc::clone(&service), Duration::from_millis(20));

    let svc = Arc::clone(&service);
    assert!(
        eventually(|| {
            let svc = Arc::clone(&svc);
            async move { svc.registry().is_empty().await }
        })
        .await
    );
    assert_eq!(dir_entry_count(work.path()), 0);

    sweeper.abort();
}
