//! Async driver for a [`LocationMonitor`].
//!
//! Commands (fixes, geofence transitions, radius changes) arrive on an mpsc
//! channel and are applied to the monitor in order. Queries run on their own
//! tasks so a slow response never blocks newer input; when one completes its
//! generation is checked and superseded results are dropped before anything
//! reaches subscribers.

use super::geofence::InMemoryGeofences;
use super::location::{LocationMonitor, RefreshRequest};
use super::ports::{GeofenceEvent, NearbyClient};
use crate::config::MonitorConfig;
use crate::constants;
use crate::discovery::{NearbyPage, NearbyQuery};
use crate::domain::Category;
use crate::error::{CurbsideError, Result};
use crate::geo::GeoPoint;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const COMMAND_BUFFER: usize = 64;
const EVENT_BUFFER: usize = 64;

#[derive(Debug, Clone)]
pub enum MonitorCommand {
    Start(Option<GeoPoint>),
    Stop,
    Location(GeoPoint),
    Geofence(GeofenceEvent),
    UpdateRadius(f64),
}

#[derive(Debug, Clone)]
pub struct NearbyUpdate {
    pub generation: u64,
    pub center: GeoPoint,
    pub radius_m: f64,
    pub page: NearbyPage,
}

#[derive(Debug, Clone)]
pub enum MonitorEvent {
    Updated(NearbyUpdate),
    QueryFailed { generation: u64, error: String },
}

#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub timeout: Duration,
    /// Extra attempts after the first, for retryable failures only.
    pub retries: u32,
    pub backoff: Duration,
    pub page_size: usize,
    pub category: Option<Category>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(constants::DEFAULT_QUERY_TIMEOUT_SECS),
            retries: constants::DEFAULT_QUERY_RETRIES,
            backoff: Duration::from_millis(250),
            page_size: constants::DEFAULT_PAGE_SIZE,
            category: None,
        }
    }
}

impl From<&MonitorConfig> for QueryOptions {
    fn from(config: &MonitorConfig) -> Self {
        Self {
            timeout: config.query_timeout(),
            retries: config.query_retries,
            ..Self::default()
        }
    }
}

/// Run a nearby query with a client-side timeout, retrying transient
/// failures. Only safe because the query is read-only.
pub async fn fetch_with_retry(
    client: &dyn NearbyClient,
    query: &NearbyQuery,
    options: &QueryOptions,
) -> Result<NearbyPage> {
    let mut attempt = 0u32;
    loop {
        let outcome = match tokio::time::timeout(options.timeout, client.nearby(query)).await {
            Ok(result) => result,
            Err(_) => Err(CurbsideError::Timeout(options.timeout)),
        };
        match outcome {
            Ok(page) => return Ok(page),
            Err(e) if e.is_retryable() && attempt < options.retries => {
                attempt += 1;
                debug!(attempt, error = %e, "Retrying nearby query");
                tokio::time::sleep(options.backoff * attempt).await;
            }
            Err(e) => return Err(e),
        }
    }
}

pub struct MonitorRuntime {
    monitor: LocationMonitor,
    client: Arc<dyn NearbyClient>,
    options: QueryOptions,
    geofences: Option<Arc<InMemoryGeofences>>,
}

impl MonitorRuntime {
    pub fn new(monitor: LocationMonitor, client: Arc<dyn NearbyClient>) -> Self {
        Self {
            monitor,
            client,
            options: QueryOptions::default(),
            geofences: None,
        }
    }

    pub fn with_options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }

    /// Evaluate these geofences against every location fix. They should be
    /// the same registrar the monitor was built with.
    pub fn with_software_geofences(mut self, geofences: Arc<InMemoryGeofences>) -> Self {
        self.geofences = Some(geofences);
        self
    }

    pub fn spawn(self) -> MonitorHandle {
        let (commands, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let task = tokio::spawn(self.run(command_rx, events.clone()));
        MonitorHandle { commands, events, task }
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<MonitorCommand>,
        events: broadcast::Sender<MonitorEvent>,
    ) {
        let (done_tx, mut done_rx) = mpsc::unbounded_channel();
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => match self.apply(command) {
                        Ok(Some(request)) => self.dispatch(request, done_tx.clone()),
                        Ok(None) => {}
                        Err(e) => warn!(error = %e, "Monitor command rejected"),
                    },
                    None => break,
                },
                Some((request, result)) = done_rx.recv() => self.deliver(request, result, &events),
            }
        }
        self.monitor.stop();
        debug!("Monitor runtime exited");
    }

    fn apply(&mut self, command: MonitorCommand) -> Result<Option<RefreshRequest>> {
        match command {
            MonitorCommand::Start(point) => self.monitor.start(point),
            MonitorCommand::Stop => {
                self.monitor.stop();
                Ok(None)
            }
            MonitorCommand::Location(point) => {
                let mut request = self.monitor.on_location(point)?;
                if let Some(geofences) = &self.geofences {
                    for event in geofences.evaluate(&point) {
                        if let Some(newer) = self.monitor.on_geofence(&event)? {
                            request = Some(newer);
                        }
                    }
                }
                Ok(request)
            }
            MonitorCommand::Geofence(event) => self.monitor.on_geofence(&event),
            MonitorCommand::UpdateRadius(radius_m) => self.monitor.update_search_radius(radius_m),
        }
    }

    fn dispatch(
        &self,
        request: RefreshRequest,
        done: mpsc::UnboundedSender<(RefreshRequest, Result<NearbyPage>)>,
    ) {
        let client = self.client.clone();
        let options = self.options.clone();
        tokio::spawn(async move {
            let mut query =
                NearbyQuery::new(request.center, request.radius_m).page(1, options.page_size);
            query.category = options.category;
            let result = fetch_with_retry(client.as_ref(), &query, &options).await;
            let _ = done.send((request, result));
        });
    }

    fn deliver(
        &self,
        request: RefreshRequest,
        result: Result<NearbyPage>,
        events: &broadcast::Sender<MonitorEvent>,
    ) {
        if !self.monitor.accepts(request.generation) {
            debug!(
                generation = request.generation,
                current = self.monitor.generation(),
                "Discarding stale nearby response"
            );
            return;
        }
        let event = match result {
            Ok(page) => MonitorEvent::Updated(NearbyUpdate {
                generation: request.generation,
                center: request.center,
                radius_m: request.radius_m,
                page,
            }),
            Err(e) => {
                warn!(generation = request.generation, error = %e, "Nearby query failed");
                MonitorEvent::QueryFailed { generation: request.generation, error: e.to_string() }
            }
        };
        // No subscribers is fine
        let _ = events.send(event);
    }
}

pub struct MonitorHandle {
    commands: mpsc::Sender<MonitorCommand>,
    events: broadcast::Sender<MonitorEvent>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.events.subscribe()
    }

    pub async fn send(&self, command: MonitorCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| CurbsideError::ShutDown("location monitor"))
    }

    pub async fn start(&self, last_known: Option<GeoPoint>) -> Result<()> {
        self.send(MonitorCommand::Start(last_known)).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.send(MonitorCommand::Stop).await
    }

    pub async fn location(&self, point: GeoPoint) -> Result<()> {
        self.send(MonitorCommand::Location(point)).await
    }

    pub async fn geofence(&self, event: GeofenceEvent) -> Result<()> {
        self.send(MonitorCommand::Geofence(event)).await
    }

    pub async fn update_search_radius(&self, radius_m: f64) -> Result<()> {
        self.send(MonitorCommand::UpdateRadius(radius_m)).await
    }

    /// Close the command channel and wait for the driver to stop.
    pub async fn shutdown(self) {
        drop(self.commands);
        if let Err(e) = self.task.await {
            warn!(error = %e, "Monitor runtime task panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::location::SEARCH_REGION_ID;
    use crate::monitor::ports::GeofenceTransition;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Answers with an empty page after a per-call delay; optionally fails
    /// the first few calls with a retryable error.
    struct ScriptedClient {
        delays: Mutex<Vec<Duration>>,
        failures_left: AtomicUsize,
        calls: AtomicUsize,
    }

    impl ScriptedClient {
        fn new(delays: Vec<Duration>, failures: usize) -> Self {
            Self {
                delays: Mutex::new(delays),
                failures_left: AtomicUsize::new(failures),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl NearbyClient for ScriptedClient {
        async fn nearby(&self, query: &NearbyQuery) -> Result<NearbyPage> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let delay = {
                let mut delays = self.delays.lock().unwrap();
                if delays.is_empty() { Duration::ZERO } else { delays.remove(0) }
            };
            tokio::time::sleep(delay).await;
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(CurbsideError::Storage("flaky backend".into()));
            }
            Ok(NearbyPage { listings: vec![], page: query.page, page_size: query.page_size, total: 0 })
        }
    }

    fn sf() -> GeoPoint {
        GeoPoint::new(37.7749, -122.4194).unwrap()
    }

    fn fast_options() -> QueryOptions {
        QueryOptions {
            timeout: Duration::from_millis(500),
            retries: 2,
            backoff: Duration::from_millis(5),
            ..QueryOptions::default()
        }
    }

    async fn next_update(rx: &mut broadcast::Receiver<MonitorEvent>) -> MonitorEvent {
        tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn stale_response_is_dropped() {
        let fences = Arc::new(InMemoryGeofences::new());
        let monitor = LocationMonitor::new(fences.clone(), 1_000.0, 0.1).unwrap();
        // First query is slow and finishes after the second one
        let client = Arc::new(ScriptedClient::new(
            vec![Duration::from_millis(150), Duration::ZERO],
            0,
        ));
        let handle = MonitorRuntime::new(monitor, client.clone()).with_options(fast_options()).spawn();
        let mut rx = handle.subscribe();

        handle.start(Some(sf())).await.unwrap();
        handle.update_search_radius(2_000.0).await.unwrap();

        match next_update(&mut rx).await {
            MonitorEvent::Updated(update) => {
                assert_eq!(update.generation, 2);
                assert_eq!(update.radius_m, 2_000.0);
            }
            other => panic!("unexpected event {other:?}"),
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(rx.try_recv().is_err(), "generation 1 must be discarded");
        assert_eq!(client.calls.load(Ordering::SeqCst), 2);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn retries_transient_failures() {
        let fences = Arc::new(InMemoryGeofences::new());
        let monitor = LocationMonitor::new(fences, 1_000.0, 0.1).unwrap();
        let client = Arc::new(ScriptedClient::new(vec![], 2));
        let handle = MonitorRuntime::new(monitor, client.clone()).with_options(fast_options()).spawn();
        let mut rx = handle.subscribe();

        handle.start(Some(sf())).await.unwrap();
        assert!(matches!(next_update(&mut rx).await, MonitorEvent::Updated(_)));
        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn timeout_surfaces_as_query_failure() {
        let fences = Arc::new(InMemoryGeofences::new());
        let monitor = LocationMonitor::new(fences, 1_000.0, 0.1).unwrap();
        let client = Arc::new(ScriptedClient::new(vec![Duration::from_secs(5)], 0));
        let options = QueryOptions {
            timeout: Duration::from_millis(50),
            retries: 0,
            ..fast_options()
        };
        let handle = MonitorRuntime::new(monitor, client).with_options(options).spawn();
        let mut rx = handle.subscribe();

        handle.start(Some(sf())).await.unwrap();
        match next_update(&mut rx).await {
            MonitorEvent::QueryFailed { generation, error } => {
                assert_eq!(generation, 1);
                assert!(error.contains("timed out"));
            }
            other => panic!("unexpected event {other:?}"),
        }
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn geofence_transition_refreshes_at_last_fix() {
        let fences = Arc::new(InMemoryGeofences::new());
        let monitor = LocationMonitor::new(fences.clone(), 500.0, 0.5).unwrap();
        let client = Arc::new(ScriptedClient::new(vec![], 0));
        let handle = MonitorRuntime::new(monitor, client)
            .with_options(fast_options())
            .spawn();
        let mut rx = handle.subscribe();

        handle.start(Some(sf())).await.unwrap();
        next_update(&mut rx).await;
        let nudged = GeoPoint::new(37.7749 + 0.001, -122.4194).unwrap();
        handle.location(nudged).await.unwrap();
        handle
            .geofence(GeofenceEvent {
                region_id: SEARCH_REGION_ID.into(),
                transition: GeofenceTransition::Exit,
            })
            .await
            .unwrap();

        match next_update(&mut rx).await {
            MonitorEvent::Updated(update) => {
                assert_eq!(update.generation, 2);
                assert_eq!(update.center, nudged);
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(fences.region(SEARCH_REGION_ID).unwrap().center, nudged);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn leaving_the_area_refreshes_once() {
        let fences = Arc::new(InMemoryGeofences::new());
        let monitor = LocationMonitor::new(fences.clone(), 500.0, 1.0).unwrap();
        let client = Arc::new(ScriptedClient::new(vec![], 0));
        let handle = MonitorRuntime::new(monitor, client.clone())
            .with_options(fast_options())
            .with_software_geofences(fences.clone())
            .spawn();
        let mut rx = handle.subscribe();

        handle.start(Some(sf())).await.unwrap();
        next_update(&mut rx).await;
        handle.location(sf()).await.unwrap();
        let outside = GeoPoint::new(37.7749 + 0.0046, -122.4194).unwrap();
        handle.location(outside).await.unwrap();

        match next_update(&mut rx).await {
            MonitorEvent::Updated(update) => assert_eq!(update.center, outside),
            other => panic!("unexpected event {other:?}"),
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(client.calls.load(Ordering::SeqCst), 2);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_stops_monitoring() {
        let fences = Arc::new(InMemoryGeofences::new());
        let monitor = LocationMonitor::new(fences.clone(), 1_000.0, 0.1).unwrap();
        let handle = MonitorRuntime::new(monitor, Arc::new(ScriptedClient::new(vec![], 0))).spawn();
        handle.start(Some(sf())).await.unwrap();
        handle.shutdown().await;

        assert!(fences.regions().is_empty());
    }
}
