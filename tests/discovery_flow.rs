use anyhow::Result;
use chrono::{Duration, Utc};
use curbside::clock::ManualClock;
use curbside::config::Config;
use curbside::domain::{Category, Condition, ListingLocation, ListingStatus, NewListing};
use curbside::engine::Engine;
use curbside::events::ListingEvent;
use curbside::monitor::{
    InMemoryGeofences, LocalDiscoveryClient, LocationMonitor, MonitorEvent, MonitorRuntime,
    QueryOptions,
};
use curbside::storage::InMemoryListingStore;
use curbside::{CurbsideError, GeoPoint, NearbyQuery};
use std::sync::Arc;

fn engine() -> Result<(Engine, Arc<ManualClock>)> {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let engine = Engine::new(&Config::default(), Arc::new(InMemoryListingStore::new()), clock.clone())?;
    Ok((engine, clock))
}

fn new_listing(owner: &str, lat: f64, lon: f64) -> NewListing {
    NewListing {
        owner_id: owner.to_string(),
        title: "Walnut bookshelf".to_string(),
        description: Some("Five shelves, a little scuffed".to_string()),
        category: Category::Storage,
        condition: Condition::Good,
        location: ListingLocation {
            point: GeoPoint { latitude: lat, longitude: lon },
            address: "Valencia St & 18th".to_string(),
        },
        image_urls: vec![],
        ai_tags: vec!["bookshelf".into(), "walnut".into()],
        confidence_score: Some(0.87),
    }
}

#[tokio::test]
async fn created_listing_is_immediately_discoverable() -> Result<()> {
    let (engine, _) = engine()?;
    let created = engine.lifecycle.create_listing(new_listing("finder", 37.7612, -122.4212)).await?;

    let page = engine.discovery.nearby(&NearbyQuery::new(created.location.point, 1.0)).await?;
    assert_eq!(page.total, 1);
    assert_eq!(page.listings[0].listing.id, created.id);
    assert!(page.listings[0].distance_meters < 1e-6);
    assert_eq!(created.expires_at - created.created_at, Duration::days(7));
    Ok(())
}

#[tokio::test]
async fn claim_removes_listing_from_discovery_and_emits_event() -> Result<()> {
    let (engine, _) = engine()?;
    let mut events = engine.events.subscribe();
    let created = engine.lifecycle.create_listing(new_listing("finder", 37.7612, -122.4212)).await?;

    let collected = engine.claims.claim(created.id, "collector").await?;
    assert_eq!(collected.status, ListingStatus::Collected);

    let page = engine.discovery.nearby(&NearbyQuery::new(created.location.point, 500.0)).await?;
    assert_eq!(page.total, 0);
    assert!(!engine.index.contains(&created.id));

    assert!(matches!(events.recv().await?, ListingEvent::Created { .. }));
    match events.recv().await? {
        ListingEvent::Collected { listing_id, collector_id, .. } => {
            assert_eq!(listing_id, created.id);
            assert_eq!(collector_id, "collector");
        }
        other => panic!("unexpected event {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn delete_removes_listing_from_results_and_index() -> Result<()> {
    let (engine, _) = engine()?;
    let created = engine.lifecycle.create_listing(new_listing("finder", 37.7612, -122.4212)).await?;

    let err = engine.lifecycle.delete_listing(created.id, "stranger").await.unwrap_err();
    assert!(matches!(err, CurbsideError::Forbidden(_)));

    let deleted = engine.lifecycle.delete_listing(created.id, "finder").await?;
    assert_eq!(deleted.status, ListingStatus::Deleted);
    assert!(!engine.index.contains(&created.id));
    let page = engine.discovery.nearby(&NearbyQuery::new(created.location.point, 500.0)).await?;
    assert!(page.listings.is_empty());

    let err = engine.claims.claim(created.id, "collector").await.unwrap_err();
    assert_eq!(err.code(), "already_resolved");
    Ok(())
}

#[tokio::test]
async fn expiry_is_lazy_then_swept_once() -> Result<()> {
    let (engine, clock) = engine()?;
    let created = engine.lifecycle.create_listing(new_listing("finder", 37.7612, -122.4212)).await?;
    clock.advance(Duration::days(7));

    // Not swept yet: still indexed but never returned
    assert!(engine.index.contains(&created.id));
    let page = engine.discovery.nearby(&NearbyQuery::new(created.location.point, 500.0)).await?;
    assert_eq!(page.total, 0);

    let first = engine.lifecycle.sweep_expired().await?;
    assert_eq!(first.expired, 1);
    assert!(!engine.index.contains(&created.id));
    let after_first = engine.lifecycle.get_listing(created.id).await?;

    let second = engine.lifecycle.sweep_expired().await?;
    assert_eq!(second.expired, 0);
    assert_eq!(engine.lifecycle.get_listing(created.id).await?, after_first);

    let err = engine.claims.claim(created.id, "collector").await.unwrap_err();
    assert_eq!(err.code(), "expired");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_claims_and_sweep_leave_one_winner() -> Result<()> {
    for _ in 0..10 {
        let (engine, clock) = engine()?;
        let created = engine.lifecycle.create_listing(new_listing("finder", 37.7612, -122.4212)).await?;
        let id = created.id;

        let claims: Vec<_> = ["a", "b", "c"]
            .into_iter()
            .map(|who| {
                let claims = engine.claims.clone();
                tokio::spawn(async move { claims.claim(id, who).await })
            })
            .collect();
        let mut winners = Vec::new();
        for handle in claims {
            if let Ok(listing) = handle.await? {
                winners.push(listing);
            }
        }
        assert_eq!(winners.len(), 1);

        clock.advance(Duration::days(8));
        let report = engine.lifecycle.sweep_expired().await?;
        assert_eq!(report.expired, 0);

        let stored = engine.lifecycle.get_listing(id).await?;
        assert_eq!(stored.status, ListingStatus::Collected);
        assert_eq!(stored.collected_by, winners[0].collected_by);
        assert_eq!(stored.version, 2);
    }
    Ok(())
}

#[tokio::test]
async fn rebuild_index_restores_only_live_listings() -> Result<()> {
    let (engine, _) = engine()?;
    let live = engine.lifecycle.create_listing(new_listing("finder", 37.7612, -122.4212)).await?;
    let gone = engine.lifecycle.create_listing(new_listing("finder", 37.7613, -122.4212)).await?;
    engine.claims.claim(gone.id, "collector").await?;

    // Simulate index loss
    engine.index.remove(&live.id);
    assert!(engine.index.is_empty());

    assert_eq!(engine.lifecycle.rebuild_index().await?, 1);
    assert!(engine.index.contains(&live.id));
    assert!(!engine.index.contains(&gone.id));
    Ok(())
}

#[tokio::test]
async fn monitor_follows_user_through_local_discovery() -> Result<()> {
    let (engine, _) = engine()?;
    let near_start = engine.lifecycle.create_listing(new_listing("finder", 37.7700, -122.4194)).await?;
    let further_north = engine.lifecycle.create_listing(new_listing("finder", 37.7900, -122.4194)).await?;

    let fences = Arc::new(InMemoryGeofences::new());
    let monitor = LocationMonitor::new(fences.clone(), 1_000.0, 0.1)?;
    let client = Arc::new(LocalDiscoveryClient::new(engine.discovery.clone()));
    let handle = MonitorRuntime::new(monitor, client)
        .with_options(QueryOptions { retries: 0, ..QueryOptions::default() })
        .with_software_geofences(fences)
        .spawn();
    let mut updates = handle.subscribe();

    handle.start(Some(GeoPoint::new(37.7700, -122.4194)?)).await?;
    let first = match updates.recv().await? {
        MonitorEvent::Updated(update) => update,
        other => panic!("unexpected event {other:?}"),
    };
    let ids: Vec<_> = first.page.listings.iter().map(|l| l.listing.id).collect();
    assert_eq!(ids, vec![near_start.id]);

    handle.location(GeoPoint::new(37.7900, -122.4194)?).await?;
    let second = match updates.recv().await? {
        MonitorEvent::Updated(update) => update,
        other => panic!("unexpected event {other:?}"),
    };
    assert!(second.generation > first.generation);
    let ids: Vec<_> = second.page.listings.iter().map(|l| l.listing.id).collect();
    assert_eq!(ids, vec![further_north.id]);

    handle.shutdown().await;
    Ok(())
}
