//! Submit-and-poll example
//!
//! This example demonstrates the client lifecycle:
//! - Configuring the upstream server and service key
//! - Opening a SQLite-backed task store
//! - Subscribing to events
//! - Submitting a reference-to-video task and waiting for its polling session
//!
//! Reads `VIDU_SERVER` and `VIDU_KEY` from the environment.

use vidu_bridge::config::{ApiConfig, PersistenceConfig, StorageBackend};
use vidu_bridge::{Config, Event, PollOutcome, ReferenceToVideoRequest, ViduClient};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing for logging (optional)
    // Uncomment if you add tracing-subscriber to your dependencies:
    // tracing_subscriber::fmt::init();

    let config = Config {
        api: ApiConfig {
            server: std::env::var("VIDU_SERVER").ok(),
            api_key: std::env::var("VIDU_KEY").ok(),
            ..Default::default()
        },
        persistence: PersistenceConfig {
            backend: StorageBackend::Sqlite {
                path: "vidu-tasks.db".into(),
            },
        },
        ..Default::default()
    };

    let client = ViduClient::open(config).await?;

    // Print every state change as it is stored
    let mut events = client.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                Event::TaskCreated { id, model } => println!("created {id} ({model})"),
                Event::TaskUpdated { id, state } => println!("{id}: {state}"),
                Event::PollingStopped { id, outcome } => println!("{id}: polling stopped, {outcome:?}"),
                Event::RequestFailed { url, message, .. } => eprintln!("request to {url} failed: {message}"),
                _ => {}
            }
        }
    });

    let submission = client
        .submit_reference_to_video(ReferenceToVideoRequest {
            model: "vidu2.0".to_string(),
            images: vec!["https://example.com/reference.png".to_string()],
            prompt: "a paper boat drifting down a rainy street".to_string(),
            ..Default::default()
        })
        .await?;

    println!("submitted task {}", submission.record.id);

    if let Some(poll) = submission.poll {
        if poll.wait().await == PollOutcome::Completed {
            if let Some(task) = client.store().get(&submission.record.id).await? {
                println!("video: {}", task.download_url().unwrap_or("<none>"));
            }
        }
    }

    let stats = client.store().stats().await?;
    println!(
        "{} tasks stored, {}% succeeded, {} credits used",
        stats.total, stats.success_rate, stats.total_credits
    );

    client.shutdown().await?;
    Ok(())
}
