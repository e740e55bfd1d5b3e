//! Builds partial word counts on several threads, merges them bucket by
//! bucket and round-trips the result through both encodings.
//!
//! Run with `RUST_LOG=debug` to see the table's own log lines.

use std::thread;

use tracing_subscriber::EnvFilter;
use twolevel_rs::{Cell, Slot, TwoLevelHashMap};

const TEXT: &str = "the quick brown fox jumps over the lazy dog and the dog sleeps \
                    while the fox runs over the hill and far away from the dog";

fn count_words(words: &[&str]) -> TwoLevelHashMap<String, u64> {
    let mut counts = TwoLevelHashMap::<String, u64>::new();
    for word in words {
        match counts.emplace(word.to_string()) {
            Slot::Occupied(mut slot) => *slot.get_mut() += 1,
            Slot::Vacant(slot) => {
                slot.finish(1);
            }
        }
    }
    counts
}

fn main() -> twolevel_rs::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let words: Vec<&str> = TEXT.split_whitespace().collect();
    let partials: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = words.chunks(8).map(|chunk| s.spawn(move || count_words(chunk))).collect();
        handles.into_iter().filter_map(|h| h.join().ok()).collect()
    });
    println!("{} partial states", partials.len());

    let mut total = TwoLevelHashMap::<String, u64>::new();
    for partial in partials {
        total.merge(partial, |acc, n| *acc += n);
    }

    let mut top: Vec<_> = total.iter().map(|c| (c.key().clone(), *c.mapped())).collect();
    top.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    println!("\nTop words:");
    for (word, count) in top.iter().take(5) {
        println!("  {:<8} {}", word, count);
    }

    let non_empty = total.buckets().iter().filter(|b| !twolevel_rs::FlatTable::is_empty(*b)).count();
    println!("\n{} distinct words in {} of 256 buckets", total.len(), non_empty);

    let mut binary = Vec::new();
    total.write(&mut binary)?;
    let mut text = Vec::new();
    total.write_text(&mut text)?;
    println!("binary: {} bytes, text: {} bytes", binary.len(), text.len());

    let mut restored = TwoLevelHashMap::<String, u64>::new();
    restored.read(&mut binary.as_slice())?;
    println!("restored {} words, 'the' -> {:?}", restored.len(), restored.get(&"the".to_string()));
    Ok(())
}
