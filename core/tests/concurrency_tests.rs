use kb_core::{Document, EngineConfig, IndexManager, Interrupt, Relevance, StaticSource};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

fn corpus(n: usize) -> Vec<Document> {
    (0..n)
        .map(|i| Document::new(format!("doc{i:04}"), format!("note {i}"), format!("shared topic{} term{}", i % 7, i)))
        .collect()
}

#[test]
fn readers_never_see_half_applied_documents() {
    let m = Arc::new(IndexManager::new(EngineConfig::default()).unwrap());
    m.rebuild(&StaticSource::new(corpus(50)), &Interrupt::none()).unwrap();
    let stop = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let reader = m.reader();
            let stop = stop.clone();
            thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    // Postings and vector for "flip" are published together, so a
                    // similarity-only hit for it would mean a half-applied mutation.
                    let hits = reader.search("flipflop", 10);
                    assert!(hits.len() <= 1);
                    for h in &hits {
                        assert_eq!(h.document_id, "flip");
                        assert_eq!(h.relevance, Relevance::Exact);
                    }
                }
            })
        })
        .collect();

    for round in 0..200 {
        let doc = Document::new("flip", "Flip", format!("flipflop round{round}"));
        m.on_updated(&doc).unwrap();
        if round % 3 == 0 {
            m.on_deleted("flip").unwrap();
        }
        if round % 50 == 0 {
            m.refresh().unwrap();
        }
    }
    stop.store(true, Ordering::Relaxed);
    for r in readers {
        r.join().unwrap();
    }
}

#[test]
fn cancelled_rebuild_keeps_previous_index() {
    let m = IndexManager::new(EngineConfig::default()).unwrap();
    m.rebuild(&StaticSource::new(corpus(10)), &Interrupt::none()).unwrap();
    let flag = Arc::new(AtomicBool::new(true));
    let res = m.rebuild(&StaticSource::new(corpus(100)), &Interrupt::with_flag(flag));
    assert!(res.is_err());
    assert_eq!(m.len(), 10);

    let g = m.reader().graph_with(&Interrupt::with_flag(Arc::new(AtomicBool::new(true))));
    assert!(g.is_err());
}

#[test]
fn staleness_window_is_reported() {
    let m = IndexManager::new(EngineConfig::default()).unwrap();
    m.rebuild(&StaticSource::new(corpus(10)), &Interrupt::none()).unwrap();
    assert!(!m.is_stale());
    m.on_created(&Document::new("new", "New", "fresh words")).unwrap();
    assert!(m.is_stale());
    // The new document's own vector is usable before any refresh.
    assert!(m.reader().explain_connections("new").is_ok());
    m.refresh().unwrap();
    assert!(!m.is_stale());
}
