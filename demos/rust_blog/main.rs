//! Basic MirrorDB Example - Blog Mirror
//!
//! This example demonstrates core MirrorDB functionality:
//! - Hydrating the local mirror from the posts API
//! - Live queries that follow every change
//! - Optimistic insert/update/delete with server confirmation
//! - Automatic rollback when the server rejects a mutation
//!
//! The "network" is the in-memory reference server behind the loopback
//! client, so the example runs self-contained.
//!
//! Run with: cargo run -p rust_blog

use mirrordb_core::{CoreError, Query};
use mirrordb_protocol::{PostDraft, PostId, PostPatch};
use mirrordb_sync::{HttpTransport, InMemoryServer, LoopbackClient, SyncedCollection};
use std::sync::Arc;
use std::time::Duration;

fn main() -> Result<(), CoreError> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // The "remote": an in-memory posts API with two existing posts.
    let server = Arc::new(InMemoryServer::new());
    server.seed(&[
        PostDraft::new("Hello MirrorDB", "A local mirror with optimistic writes.")
            .with_author("ann"),
        PostDraft::new("Why live queries", "Subscribers follow the store, not the network.")
            .with_author("ben"),
    ]);

    let transport = HttpTransport::new("http://blog.demo/api", LoopbackClient::new(Arc::clone(&server)));
    let collection = SyncedCollection::new(transport);

    // Hydrate the mirror.
    let count = collection.refresh()?;
    println!("[*] Pulled {count} posts from the server");

    // A live query: prints the title list on every change.
    let _feed = collection.subscribe(Query::all(), |rows| {
        let titles: Vec<&str> = rows.iter().map(|p| p.title.as_str()).collect();
        println!("  feed -> {titles:?}");
    });

    // Optimistic insert: visible in the feed before the server
    // confirms (the latency keeps the window open long enough to see).
    server.set_latency(Duration::from_millis(50));
    println!("\n[+] Drafting a new post (optimistic)...");
    let pending = collection.insert(
        PostDraft::new("Optimistic UI", "Apply first, confirm later.").with_author("ann"),
    )?;
    let temp_id = pending.keys()[0];
    println!("    in flight under temporary {temp_id}");

    pending.wait()?;
    let new_id = collection
        .posts()
        .into_iter()
        .find(|p| p.title == "Optimistic UI")
        .map(|p| p.id)
        .unwrap_or(temp_id);
    println!("    committed as {new_id}");

    // Optimistic update of a single field.
    println!("\n[~] Editing the post body...");
    collection
        .update(new_id, PostPatch::new().content("Apply first, confirm later. Roll back on failure."))?
        .wait()?;
    println!("    update confirmed");

    // A rejected mutation rolls back automatically.
    println!("\n[!] Next request will fail server-side...");
    server.fail_next(1);
    let outcome = collection
        .update(new_id, PostPatch::new().title("This edit will not stick"))?
        .wait();
    match outcome {
        Ok(()) => println!("    unexpectedly succeeded"),
        Err(failure) => println!("    rolled back: {failure}"),
    }

    // Delete a post.
    println!("\n[-] Deleting the oldest post...");
    collection.delete(PostId::new(1))?.wait()?;

    let remaining = collection.posts();
    println!("\n[#] Final mirror state ({} posts):", remaining.len());
    for post in &remaining {
        println!("  {} {} by {}", post.id, post.title, post.author);
    }
    println!("    server agrees: {} posts", server.post_count());

    Ok(())
}
