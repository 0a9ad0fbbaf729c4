use std::thread;

use fact_retriever::{FactRetriever, SimpleTokenizer, SqliteFactStore, DEFAULT_MAX_RESULTS};

fn main() {
    tracing_subscriber::fmt::init();

    let dir = tempfile::tempdir().unwrap();
    let store = SqliteFactStore::open(dir.path().join("facts.db")).unwrap();
    let mut retriever = FactRetriever::<_, _>::new(store, SimpleTokenizer);

    // the master ingests directly into the global index
    retriever.ingest("coordinator facts merge worker streams").unwrap();

    // each worker gets its own builder over the shared store and allocator
    let handles: Vec<_> = (0..4)
        .map(|w| {
            let mut worker = retriever.share().unwrap();
            thread::spawn(move || {
                for i in 0..250 {
                    worker
                        .ingest(&format!("worker {w} observed sample {i} of the stream"))
                        .unwrap();
                }
                worker.shutdown().unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    // fold the worker streams into the global vocabulary and triples
    retriever.merge().unwrap();
    println!(
        "indexed {} facts over {} tokens",
        retriever.fact_count(),
        retriever.token_count()
    );

    for fact in retriever.retrieve("worker stream sample", 3).unwrap() {
        println!("  -> {}", fact.unwrap());
    }
    for (fact_id, score) in retriever
        .rank("coordinator merge", DEFAULT_MAX_RESULTS)
        .unwrap()
    {
        println!("  fact {fact_id} scored {score:.4}");
    }
}
