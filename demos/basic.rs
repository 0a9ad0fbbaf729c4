use fact_retriever::{FactRetriever, MemoryFactStore, SimpleTokenizer, DEFAULT_MAX_RESULTS};

fn main() {
    tracing_subscriber::fmt::init();

    // build an in-memory index
    let mut retriever = FactRetriever::<_, _>::new(MemoryFactStore::new(), SimpleTokenizer);
    for fact in [
        "Rust compiles to fast native code",
        "The borrow checker enforces memory safety",
        "Cargo builds and tests Rust projects",
        "Sqlite stores facts durably on disk",
    ] {
        retriever.ingest(fact).unwrap();
    }

    // rank and resolve
    let query = "fast rust code";
    println!("query: {query}");
    for (fact_id, score) in retriever.rank(query, DEFAULT_MAX_RESULTS).unwrap() {
        println!("  fact {fact_id} scored {score:.4}");
    }
    for fact in retriever.retrieve(query, 2).unwrap() {
        println!("  -> {}", fact.unwrap());
    }
}
