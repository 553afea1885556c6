//! Concurrency Tests
//!
//! Readers on other threads, and worker threads reporting back through the
//! control queue.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use uuid::Uuid;

use trackstate::config::{MachineId, NetworkConfig};
use trackstate::control::ControlQueue;
use trackstate::layers::{LayerKind, LayerRegistry, NoteEvent};
use trackstate::network::{
    client_check, LogoutListener, LogoutOutcome, LogoutTransport, LogoutWorker,
    TransportResponse,
};
use trackstate::{Config, Project, Result, TrackError};

// === Registry readers ===

#[test]
fn test_readers_during_mutation_see_consistent_layers() {
    let mut project = Project::new("Song", &Config::default());
    let stable = project.add_layer(LayerKind::Piano, "Stable").unwrap();
    let registry = project.registry();
    let stop = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let registry: Arc<LayerRegistry> = Arc::clone(&registry);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                while !stop.load(Ordering::Acquire) {
                    // The stable layer is never removed, so it must always resolve
                    let found = registry.find(&stable).and_then(|w| w.upgrade());
                    assert!(found.is_some());

                    for layer in registry.all_layers(false) {
                        assert!(!layer.read().name().is_empty());
                    }
                }
            })
        })
        .collect();

    for i in 0..200 {
        let id = project
            .add_layer(LayerKind::Automation, format!("Temp {}", i))
            .unwrap();
        project
            .add_event(&id, NoteEvent::new(60, i as f32, 1.0, 0.5))
            .unwrap();
        if i % 3 == 0 {
            project.move_layer(&id, 0).unwrap();
        }
        project.remove_layer(&id).unwrap();
        project.checkpoint();
    }

    stop.store(true, Ordering::Release);
    for reader in readers {
        reader.join().unwrap();
    }

    assert_eq!(project.layer_ids(), vec![stable]);
}

#[test]
fn test_removed_layer_does_not_resolve() {
    let mut project = Project::new("Song", &Config::default());
    let id = project.add_layer(LayerKind::Piano, "Gone").unwrap();

    let weak = project.find_layer(&id).unwrap();
    project.remove_layer(&id).unwrap();
    project.clear_undo_history();

    assert!(project.find_layer(&id).is_none());
    assert!(weak.upgrade().is_none());
}

#[test]
fn test_concurrent_first_lookups_share_one_index() {
    let registry = Arc::new(LayerRegistry::new());
    let ids: Vec<Uuid> = (0..50)
        .map(|i| {
            let layer = trackstate::layers::Layer::new(LayerKind::Piano, format!("L{}", i));
            let id = layer.id();
            registry.insert(layer).unwrap();
            id
        })
        .collect();
    let ids = Arc::new(ids);

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let registry = Arc::clone(&registry);
            let ids = Arc::clone(&ids);
            thread::spawn(move || {
                for id in ids.iter().skip(t).step_by(3) {
                    assert!(registry.find(id).and_then(|w| w.upgrade()).is_some());
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
}

// === Logout ===

/// Replays a fixed sequence of transport results.
struct ScriptedTransport {
    script: Mutex<Vec<Result<TransportResponse>>>,
    calls: AtomicUsize,
    queries: Mutex<Vec<Vec<(String, String)>>>,
}

impl ScriptedTransport {
    fn new(mut script: Vec<Result<TransportResponse>>) -> Self {
        script.reverse();
        Self {
            script: Mutex::new(script),
            calls: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
        }
    }
}

impl LogoutTransport for ScriptedTransport {
    fn get(&self, _url: &str, query: &[(&str, String)]) -> Result<TransportResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().push(
            query
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        );
        self.script
            .lock()
            .pop()
            .unwrap_or_else(|| Err(TrackError::ConnectionFailed {
                reason: "script exhausted".to_string(),
            }))
    }
}

#[derive(Clone, Default)]
struct Outcomes(Arc<Mutex<Vec<LogoutOutcome>>>);

impl LogoutListener for Outcomes {
    fn on_success(&mut self) {
        self.0.lock().push(LogoutOutcome::Ok);
    }

    fn on_rejected(&mut self) {
        self.0.lock().push(LogoutOutcome::Rejected);
    }

    fn on_connection_failed(&mut self) {
        self.0.lock().push(LogoutOutcome::ConnectionFailed);
    }
}

fn network_config() -> NetworkConfig {
    NetworkConfig {
        machine_id: MachineId::new("machine-1"),
        salt: "pepper".to_string(),
        ..NetworkConfig::default()
    }
}

fn no_response() -> Result<TransportResponse> {
    Err(TrackError::ConnectionFailed {
        reason: "unreachable".to_string(),
    })
}

fn response(status: u16) -> Result<TransportResponse> {
    Ok(TransportResponse {
        status,
        body: String::new(),
    })
}

/// Run one logout through the control queue and collect what the listener heard.
fn run_logout(transport: Arc<ScriptedTransport>) -> Vec<LogoutOutcome> {
    let worker = LogoutWorker::new(network_config(), transport);
    let queue: ControlQueue<()> = ControlQueue::new();
    let outcomes = Outcomes::default();

    let handle = worker
        .logout(Box::new(outcomes.clone()), queue.poster())
        .unwrap();

    // The listener only runs when the control thread pumps
    handle.join().unwrap();
    assert!(outcomes.0.lock().is_empty());
    assert!(!worker.is_running());

    queue.pump_timeout(&mut (), Duration::from_secs(5));
    let heard = outcomes.0.lock().clone();
    heard
}

#[test]
fn test_logout_three_failures_reported_once() {
    let transport = Arc::new(ScriptedTransport::new(vec![
        no_response(),
        no_response(),
        no_response(),
    ]));

    let heard = run_logout(Arc::clone(&transport));
    assert_eq!(heard, vec![LogoutOutcome::ConnectionFailed]);
    assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
}

#[test]
fn test_logout_succeeds_after_retry() {
    let transport = Arc::new(ScriptedTransport::new(vec![no_response(), response(200)]));

    let heard = run_logout(Arc::clone(&transport));
    assert_eq!(heard, vec![LogoutOutcome::Ok]);
    assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_logout_rejected_is_not_retried() {
    let transport = Arc::new(ScriptedTransport::new(vec![response(403)]));

    let heard = run_logout(Arc::clone(&transport));
    assert_eq!(heard, vec![LogoutOutcome::Rejected]);
    assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_logout_sends_device_and_check() {
    let transport = Arc::new(ScriptedTransport::new(vec![response(200)]));
    run_logout(Arc::clone(&transport));

    let queries = transport.queries.lock();
    assert_eq!(
        queries[0],
        vec![
            ("deviceId".to_string(), "machine-1".to_string()),
            (
                "clientCheck".to_string(),
                client_check("machine-1", "pepper")
            ),
        ]
    );
}
