use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use crate::errors::{AppError, AppResult};
use crate::gateway::LocationCallback;
use crate::geocoding::{GeocodeFeature, ReverseGeocoder};
use crate::location::{Coordinates, ResolvedLocation};
use crate::map::{MapCreateRequest, MapHandle, MapWidgetFactory, MarkerId};

pub fn collector() -> (LocationCallback, Arc<Mutex<Vec<ResolvedLocation>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let callback: LocationCallback = Arc::new(move |resolved| sink.lock().push(resolved));
    (callback, seen)
}

enum Reply {
    Named,
    Empty,
    Fail(String),
}

struct GeocoderState {
    calls: Vec<Coordinates>,
    reply: Reply,
    delays: VecDeque<Duration>,
}

pub struct FakeGeocoder {
    state: Mutex<GeocoderState>,
}

impl FakeGeocoder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(GeocoderState {
                calls: Vec::new(),
                reply: Reply::Named,
                delays: VecDeque::new(),
            }),
        })
    }

    pub fn calls(&self) -> Vec<Coordinates> {
        self.state.lock().calls.clone()
    }

    pub fn respond_empty(&self) {
        self.state.lock().reply = Reply::Empty;
    }

    pub fn fail_with(&self, message: &str) {
        self.state.lock().reply = Reply::Fail(message.to_string());
    }

    pub fn delay_next(&self, delay: Duration) {
        self.state.lock().delays.push_back(delay);
    }
}

pub fn place_name(at: Coordinates) -> String {
    format!("Place at {:.4},{:.4}", at.longitude, at.latitude)
}

#[async_trait]
impl ReverseGeocoder for FakeGeocoder {
    async fn reverse_geocode(
        &self,
        at: Coordinates,
        token: &SecretString,
    ) -> AppResult<Vec<GeocodeFeature>> {
        assert!(!token.expose_secret().is_empty());
        let delay = {
            let mut state = self.state.lock();
            state.calls.push(at);
            state.delays.pop_front()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let reply = match &self.state.lock().reply {
            Reply::Named => Ok(vec![GeocodeFeature {
                place_name: place_name(at),
            }]),
            Reply::Empty => Ok(Vec::new()),
            Reply::Fail(message) => Err(AppError::Config(message.clone())),
        };
        reply
    }
}

#[derive(Debug, Default)]
pub struct MapLog {
    pub created: usize,
    pub removed: usize,
    pub created_centers: Vec<Coordinates>,
    pub sources: Vec<String>,
    pub layers: Vec<Value>,
    pub source_updates: Vec<Value>,
    pub markers_added: usize,
    pub live_markers: Vec<MarkerId>,
    pub fly_to: Vec<(Coordinates, f64)>,
}

impl MapLog {
    pub fn live_maps(&self) -> usize {
        self.created - self.removed
    }
}

#[derive(Clone, Default)]
pub struct FakeMapFactory {
    log: Arc<Mutex<MapLog>>,
    fail_next: Arc<Mutex<bool>>,
}

impl FakeMapFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> parking_lot::MutexGuard<'_, MapLog> {
        self.log.lock()
    }

    pub fn fail_next(&self) {
        *self.fail_next.lock() = true;
    }
}

impl MapWidgetFactory for FakeMapFactory {
    fn create_map(&self, request: MapCreateRequest<'_>) -> AppResult<Box<dyn MapHandle>> {
        if std::mem::take(&mut *self.fail_next.lock()) {
            return Err(AppError::Map("simulated widget failure".into()));
        }
        assert!(!request.access_token.expose_secret().is_empty());
        let mut log = self.log.lock();
        log.created += 1;
        log.created_centers.push(request.center);
        Ok(Box::new(FakeMap {
            log: Arc::clone(&self.log),
            next_marker: 0,
        }))
    }
}

struct FakeMap {
    log: Arc<Mutex<MapLog>>,
    next_marker: u64,
}

impl MapHandle for FakeMap {
    fn add_source(&mut self, id: &str, _data: Value) -> AppResult<()> {
        let mut log = self.log.lock();
        if log.sources.iter().any(|s| s == id) {
            return Err(AppError::Map(format!("source `{id}` already exists")));
        }
        log.sources.push(id.to_string());
        Ok(())
    }

    fn add_layer(&mut self, layer: Value) -> AppResult<()> {
        let mut log = self.log.lock();
        if log.layers.iter().any(|l| l["id"] == layer["id"]) {
            return Err(AppError::Map("layer already exists".into()));
        }
        log.layers.push(layer);
        Ok(())
    }

    fn set_source_data(&mut self, id: &str, data: Value) -> AppResult<()> {
        let mut log = self.log.lock();
        if !log.sources.iter().any(|s| s == id) {
            return Err(AppError::Map(format!("source `{id}` missing")));
        }
        log.source_updates.push(data);
        Ok(())
    }

    fn add_marker(&mut self, _at: Coordinates) -> AppResult<MarkerId> {
        self.next_marker += 1;
        let marker = MarkerId(self.next_marker);
        let mut log = self.log.lock();
        log.markers_added += 1;
        log.live_markers.push(marker);
        Ok(marker)
    }

    fn remove_marker(&mut self, marker: MarkerId) {
        self.log.lock().live_markers.retain(|m| *m != marker);
    }

    fn fly_to(&mut self, center: Coordinates, zoom: f64) {
        self.log.lock().fly_to.push((center, zoom));
    }

    fn remove(&mut self) {
        let mut log = self.log.lock();
        log.removed += 1;
        log.sources.clear();
        log.layers.clear();
        log.live_markers.clear();
    }
}
