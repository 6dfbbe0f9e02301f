//! Batch enrichment job.
//!
//! Runs the full enrichment pipeline over every plot that has no layer
//! enrichment yet, with a small bounded worker pool pulling from a shared
//! offset cursor. Each worker processes one plot fully before taking the
//! next and sleeps between plots to respect upstream rate limits (Nominatim
//! allows 1 request/second).

use failsafe::futures::CircuitBreaker;
use moka::future::Cache;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use plot_enrichment_api::circuit_breaker::create_db_circuit_breaker;
use plot_enrichment_api::clients::ClientRegistry;
use plot_enrichment_api::config::Config;
use plot_enrichment_api::db::Database;
use plot_enrichment_api::db_storage::PlotStorage;
use plot_enrichment_api::enrichment::enrich_location;
use plot_enrichment_api::handlers::AppState;
use plot_enrichment_api::models::EnrichLocationRequest;
use plot_enrichment_api::translation_client::TranslationClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    println!("=== Batch Plot Enrichment ===\n");

    let config = Config::from_env()?;

    println!("Connecting to database...");
    let db = Database::new(&config.database_url).await?;
    println!("✓ Database connected\n");

    let translation_client = config
        .translation_api_url
        .as_ref()
        .and_then(|url| {
            TranslationClient::new(url.clone(), config.translation_api_key.clone()).ok()
        });

    let state = Arc::new(AppState {
        db: db.pool.clone(),
        config: config.clone(),
        registry: Arc::new(ClientRegistry::new()),
        translation_client,
        geocode_cache: Cache::builder()
            .time_to_live(Duration::from_secs(86_400))
            .max_capacity(50_000)
            .build(),
        layer_cache: Cache::builder()
            .time_to_live(Duration::from_secs(3_600))
            .max_capacity(10_000)
            .build(),
    });

    let cursor = Arc::new(AtomicI64::new(0));
    let success_count = Arc::new(AtomicUsize::new(0));
    let fail_count = Arc::new(AtomicUsize::new(0));

    let workers = config.batch_concurrency;
    let delay = Duration::from_millis(config.batch_delay_ms);
    println!("Starting {} worker(s), {:?} between plots", workers, delay);

    let mut handles = Vec::with_capacity(workers);
    for worker_id in 0..workers {
        let state = state.clone();
        let cursor = cursor.clone();
        let success_count = success_count.clone();
        let fail_count = fail_count.clone();

        handles.push(tokio::spawn(async move {
            let storage = PlotStorage::new(state.db.clone());
            // One breaker per worker: a dead database fails the worker's
            // remaining plots fast instead of timing each one out.
            let breaker = create_db_circuit_breaker();

            loop {
                let offset = cursor.fetch_add(1, Ordering::SeqCst);
                let plots = match storage.plots_needing_enrichment(1, offset).await {
                    Ok(plots) => plots,
                    Err(e) => {
                        tracing::error!("[worker {}] cursor query failed: {}", worker_id, e);
                        break;
                    }
                };
                let Some(plot) = plots.into_iter().next() else {
                    tracing::info!("[worker {}] cursor drained at offset {}", worker_id, offset);
                    break;
                };

                tracing::info!(
                    "[worker {}] enriching plot {} at ({}, {})",
                    worker_id,
                    plot.id,
                    plot.latitude,
                    plot.longitude
                );

                let request = EnrichLocationRequest {
                    latitude: plot.latitude,
                    longitude: plot.longitude,
                    plot_id: Some(plot.id),
                    store_results: true,
                    translate: false,
                    target_language: "en".to_string(),
                };

                match breaker.call(enrich_location(state.clone(), request)).await {
                    Ok(response) => {
                        if response.enrichments_failed.is_empty() {
                            tracing::info!(
                                "[worker {}] ✓ plot {}: {} stage(s) run",
                                worker_id,
                                plot.id,
                                response.enrichments_run.len()
                            );
                        } else {
                            tracing::warn!(
                                "[worker {}] plot {} partially enriched, failed stages: {:?}",
                                worker_id,
                                plot.id,
                                response.enrichments_failed
                            );
                        }
                        success_count.fetch_add(1, Ordering::SeqCst);
                    }
                    Err(failsafe::Error::Rejected) => {
                        tracing::error!(
                            "[worker {}] circuit open, dropping plot {}",
                            worker_id,
                            plot.id
                        );
                        fail_count.fetch_add(1, Ordering::SeqCst);
                    }
                    Err(failsafe::Error::Inner(e)) => {
                        tracing::error!("[worker {}] ✗ plot {} failed: {}", worker_id, plot.id, e);
                        fail_count.fetch_add(1, Ordering::SeqCst);
                    }
                }

                tokio::time::sleep(delay).await;
            }
        }));
    }

    for handle in handles {
        let _ = handle.await;
    }

    let success = success_count.load(Ordering::SeqCst);
    let failed = fail_count.load(Ordering::SeqCst);
    let total = success + failed;

    println!("\n=== Batch Enrichment Complete ===");
    println!("Total processed: {}", total);
    println!("✓ Success: {}", success);
    println!("✗ Failed: {}", failed);
    if total > 0 {
        println!(
            "Success rate: {:.1}%",
            (success as f64 / total as f64) * 100.0
        );
    }

    Ok(())
}
