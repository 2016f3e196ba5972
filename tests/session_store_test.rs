use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use synclens::session::{SessionData, SessionStore};

fn payload(k: &str, v: &str) -> SessionData {
    HashMap::from([(k.to_string(), v.to_string())])
}

#[test]
fn test_session_lifecycle_with_expiry() {
    let store = SessionStore::new(Duration::from_millis(100));
    let id = store.create(payload("k", "v"));
    assert_eq!(store.get(&id), Some(payload("k", "v")));
    assert_eq!(store.active_count(), 1);

    thread::sleep(Duration::from_millis(200));
    assert_eq!(store.active_count(), 0);
    assert_eq!(store.get(&id), None);
    assert!(!store.update(&id, payload("k", "w")));
}

#[test]
fn test_sweep_removes_only_expired() {
    let store = SessionStore::new(Duration::from_millis(300));
    let stale = store.create(payload("who", "stale"));
    thread::sleep(Duration::from_millis(200));
    let fresh = store.create(payload("who", "fresh"));
    thread::sleep(Duration::from_millis(200));

    assert_eq!(store.sweep(), 1);
    assert_eq!(store.sweep(), 0);
    assert_eq!(store.get(&stale), None);
    assert_eq!(store.get(&fresh), Some(payload("who", "fresh")));
}

#[test]
fn test_update_then_get_reads_own_write() {
    let store = SessionStore::new(Duration::from_secs(60));
    let id = store.create(payload("connection_string", "mongodb://old"));
    assert!(store.update(&id, payload("connection_string", "mongodb://new")));
    assert_eq!(store.get(&id), Some(payload("connection_string", "mongodb://new")));
}

#[test]
fn test_concurrent_create_get_delete() {
    let store = Arc::new(SessionStore::new(Duration::from_secs(60)));
    let threads = 8;
    let per_thread = 200;

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let store = store.clone();
            thread::spawn(move || {
                let mut kept = Vec::new();
                for i in 0..per_thread {
                    let value = format!("{t}-{i}");
                    let id = store.create(payload("value", &value));
                    assert_eq!(store.get(&id), Some(payload("value", &value)));
                    if i % 2 == 0 {
                        assert!(store.delete(&id));
                        assert_eq!(store.get(&id), None);
                    } else {
                        kept.push((id, value));
                    }
                }
                kept
            })
        })
        .collect();

    let kept: Vec<(String, String)> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();

    assert_eq!(kept.len(), threads * per_thread / 2);
    let ids: HashSet<&String> = kept.iter().map(|(id, _)| id).collect();
    assert_eq!(ids.len(), kept.len());
    assert_eq!(store.active_count(), kept.len());
    for (id, value) in &kept {
        assert_eq!(store.get(id), Some(payload("value", value)));
    }
}

#[test]
fn test_concurrent_sweep_with_traffic() {
    let store = Arc::new(SessionStore::new(Duration::from_millis(200)));

    let sweeper = {
        let store = store.clone();
        thread::spawn(move || {
            for _ in 0..50 {
                store.sweep();
                thread::sleep(Duration::from_millis(1));
            }
        })
    };
    let workers: Vec<_> = (0..4)
        .map(|_| {
            let store = store.clone();
            thread::spawn(move || {
                for _ in 0..100 {
                    let id = store.create(payload("k", "v"));
                    // A session read right after creation is always live
                    assert!(store.get(&id).is_some());
                }
            })
        })
        .collect();

    sweeper.join().unwrap();
    for worker in workers {
        worker.join().unwrap();
    }

    thread::sleep(Duration::from_millis(300));
    assert_eq!(store.active_count(), 0);
}
