// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Example: Track a few events with the augur-analytics SDK.
//!
//! Run with:
//!   AUGUR_WRITE_KEY=wk_xxx cargo run --example track -p augur-analytics

use std::sync::Arc;
use std::time::Duration;

use augur_analytics::{AnalyticsClient, Properties, StaticPage, TrackOptions};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	tracing_subscriber::fmt()
		.with_env_filter(
			EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| EnvFilter::new("info,augur_analytics=debug")),
		)
		.init();

	let write_key =
		std::env::var("AUGUR_WRITE_KEY").expect("AUGUR_WRITE_KEY environment variable required");
	let endpoint =
		std::env::var("AUGUR_ENDPOINT").unwrap_or_else(|_| "http://localhost:8080".to_string());

	println!("Initializing analytics client...");
	println!("  Endpoint: {}", endpoint);

	let client = AnalyticsClient::builder()
		.write_key(&write_key)
		.endpoint(&endpoint)
		.feed_id("example")
		.batch_size(5)
		.debug(true)
		.page_context(Arc::new(StaticPage::new(
			"/examples/track",
			format!("{endpoint}/examples/track"),
			"Track example",
		)))
		.build()
		.await?;

	println!("  Session: {}", client.session_id());

	if let Some(report) = client.wait_for_offline_drain().await {
		println!("  Replayed {} persisted events", report.delivered);
	}

	client.page(Properties::new()).await?;
	client
		.identify(
			"example@example.com",
			Properties::new().insert("plan", "free"),
		)
		.await?;
	client
		.track_with(
			"example_run",
			Properties::new().insert("iteration", 1),
			TrackOptions::new()
				.event_name("Example run")
				.event_description("Event sent by the track example"),
		)
		.await?;
	client
		.timing("example", "startup", Duration::from_millis(42), None)
		.await?;
	client.metric("queue_depth", 3.0, Some("events".to_string())).await?;

	println!("\nQueued {} events, shutting down...", client.queue_len().await);
	client.shutdown().await?;

	println!("Done.");
	Ok(())
}
