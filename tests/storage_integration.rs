use std::env;
use uuid::Uuid;

use plot_enrichment_api::db::Database;
use plot_enrichment_api::db_storage::PlotStorage;

/// Integration smoke test for the defensive JSONB merge upsert.
/// Marked ignored to avoid running against production by accident; set
/// TEST_DATABASE_URL (with a geo.plots table) to run.
#[tokio::test]
#[ignore]
async fn upsert_merges_disjoint_enrichment_keys() -> anyhow::Result<()> {
    let db_url = env::var("TEST_DATABASE_URL")
        .or_else(|_| env::var("DATABASE_URL"))
        .map_err(|_| anyhow::anyhow!("Set TEST_DATABASE_URL or DATABASE_URL to run this test"))?;

    let db = Database::new(&db_url).await?;
    let storage = PlotStorage::new(db.pool.clone());

    // Fresh plot id so repeated runs do not collide.
    let plot_id = Uuid::new_v4();

    // Writer 1: zoning only.
    storage
        .upsert_enrichment(
            plot_id,
            38.7223,
            -9.1393,
            &serde_json::json!({"zoning": {"label": "Espaços urbanos"}}),
        )
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;

    // Writer 2: layers only. Must not clobber the zoning key.
    storage
        .upsert_enrichment(
            plot_id,
            38.7223,
            -9.1393,
            &serde_json::json!({"layers": {"found": 7}}),
        )
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;

    let plot = storage
        .get_plot(plot_id)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?
        .ok_or_else(|| anyhow::anyhow!("plot vanished"))?;

    let data = plot
        .enrichment_data
        .ok_or_else(|| anyhow::anyhow!("no enrichment_data"))?;
    assert_eq!(data["zoning"]["label"], "Espaços urbanos");
    assert_eq!(data["layers"]["found"], 7);

    Ok(())
}

/// The authoritative-coordinate update fires only when the pair changes.
#[tokio::test]
#[ignore]
async fn real_coordinates_update_only_on_change() -> anyhow::Result<()> {
    let db_url = env::var("TEST_DATABASE_URL")
        .or_else(|_| env::var("DATABASE_URL"))
        .map_err(|_| anyhow::anyhow!("Set TEST_DATABASE_URL or DATABASE_URL to run this test"))?;

    let db = Database::new(&db_url).await?;
    let storage = PlotStorage::new(db.pool.clone());

    let plot_id = Uuid::new_v4();
    storage
        .upsert_enrichment(plot_id, 38.7223, -9.1393, &serde_json::json!({}))
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;

    let first = storage
        .maybe_update_real_coordinates(plot_id, 38.7224, -9.1394)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    assert!(first, "first write must update");

    let second = storage
        .maybe_update_real_coordinates(plot_id, 38.7224, -9.1394)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    assert!(!second, "identical pair must not update");

    Ok(())
}
