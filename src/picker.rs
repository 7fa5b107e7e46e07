use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::runtime::Handle;
use tracing::{debug, info, trace, warn};

use crate::config::{PickerConfig, PickerOptions};
use crate::errors::{AppError, AppResult};
use crate::gateway::{GeocodeGateway, LocationCallback};
use crate::geocoding::ReverseGeocoder;
use crate::location::{
    ActiveLocation, Coordinates, ParsedLocation, ResolvedLocation, CENTER_TOLERANCE_DEG,
};
use crate::map::{MapContainer, MapEvent, MapLifecycle, MapPhase, MapWidgetFactory};
use crate::overlay::{CircleStyle, OverlayManager};

/// Snapshot of a picker for host-side diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct PickerStatus {
    pub phase: MapPhase,
    pub active_location: Option<ActiveLocation>,
    pub seed_name: String,
    pub overlay_created: bool,
    pub marker_placed: bool,
    pub persistent_circle: bool,
    pub pending_lookup: Option<Coordinates>,
}

/// Drives one embedded map: lifecycle, pin position, privacy circle and
/// debounced address lookups.
///
/// Nothing on this surface returns an error once constructed; failures are
/// logged and the picker degrades to a non-interactive state.
#[derive(Clone)]
pub struct LocationPicker {
    state: Arc<Mutex<PickerState>>,
}

struct PickerState {
    options: PickerOptions,
    seed: ParsedLocation,
    last_input: String,
    lifecycle: MapLifecycle,
    overlay: OverlayManager,
    active: Option<ActiveLocation>,
    /// Whether `active` came from real coordinates rather than the default
    /// point.
    has_selection: bool,
    created_center: Option<Coordinates>,
    gateway: Option<GeocodeGateway>,
    geocoder: Arc<dyn ReverseGeocoder>,
    on_select: LocationCallback,
    debounce: std::time::Duration,
    runtime: Handle,
}

impl LocationPicker {
    /// Must be called from within a tokio runtime.
    pub fn new<F>(
        config: &PickerConfig,
        options: PickerOptions,
        factory: Arc<dyn MapWidgetFactory>,
        geocoder: Arc<dyn ReverseGeocoder>,
        on_select: F,
    ) -> AppResult<Self>
    where
        F: Fn(ResolvedLocation) + Send + Sync + 'static,
    {
        let runtime = Handle::try_current().map_err(|_| AppError::NoRuntime)?;
        let seed = ParsedLocation::parse(&options.initial_location);
        let state = PickerState {
            last_input: options.initial_location.clone(),
            options,
            seed,
            lifecycle: MapLifecycle::new(factory, config.map_style.clone(), config.default_zoom),
            overlay: OverlayManager::new(CircleStyle::with_radius(config.circle_radius_px)),
            active: None,
            has_selection: false,
            created_center: None,
            gateway: None,
            geocoder,
            on_select: Arc::new(on_select),
            debounce: config.debounce_window(),
            runtime,
        };
        Ok(Self {
            state: Arc::new(Mutex::new(state)),
        })
    }

    /// Creates the map inside `container` unless a live or in-flight
    /// instance exists already.
    pub fn mount(&self, container: &MapContainer) -> MapPhase {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let center = state.seed.coordinates();
        let credentials = Arc::clone(&state.options.credentials);

        match state
            .lifecycle
            .initialize(container, center, credentials.as_ref())
        {
            Ok(true) => {
                state.active = Some(ActiveLocation::new(center, state.lifecycle.default_zoom()));
                state.has_selection = !state.seed.is_fallback();
                state.created_center = Some(center);
                state.gateway = Some(GeocodeGateway::new(
                    Arc::clone(&state.geocoder),
                    credentials,
                    Arc::clone(&state.on_select),
                    state.debounce,
                    state.runtime.clone(),
                ));
            }
            Ok(false) => {}
            Err(AppError::MissingCredential) => {
                warn!(container = %container.element_id, "no access token; map stays inert");
            }
            Err(err) => {
                warn!(?err, container = %container.element_id, "map initialization failed");
            }
        }
        state.lifecycle.phase()
    }

    pub fn handle_event(&self, event: MapEvent) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        match event {
            MapEvent::StyleLoaded => state.on_style_loaded(),
            MapEvent::Click {
                longitude,
                latitude,
            } => state.on_click(Coordinates::new(longitude, latitude)),
            MapEvent::MoveEnd { center, zoom } => state.on_pan_end(center, zoom),
            MapEvent::Error(message) => state.on_map_error(&message),
        }
    }

    /// Host-side change of the seed location after construction.
    pub fn set_initial_location(&self, input: &str) {
        self.state.lock().on_external_change(input);
    }

    /// Releases the map and drops any pending lookup. Safe to call twice.
    pub fn unmount(&self) {
        self.state.lock().teardown();
    }

    pub fn phase(&self) -> MapPhase {
        self.state.lock().lifecycle.phase()
    }

    pub fn active_location(&self) -> Option<ActiveLocation> {
        self.state.lock().active
    }

    pub fn seed(&self) -> ParsedLocation {
        self.state.lock().seed.clone()
    }

    pub fn status(&self) -> PickerStatus {
        let state = self.state.lock();
        let overlay = state.lifecycle.instance().map(|i| i.overlay());
        PickerStatus {
            phase: state.lifecycle.phase(),
            active_location: state.active,
            seed_name: state.seed.name.clone(),
            overlay_created: overlay.map(|o| o.layer_created()).unwrap_or(false),
            marker_placed: overlay.and_then(|o| o.marker()).is_some(),
            persistent_circle: state.options.persistent_circle,
            pending_lookup: state.gateway.as_ref().and_then(|g| g.pending()),
        }
    }
}

impl PickerState {
    fn on_style_loaded(&mut self) {
        if !self.lifecycle.mark_style_loaded() {
            return;
        }
        let Some(active) = self.active else {
            warn!("map ready without an active location");
            return;
        };
        let at = active.coordinates();
        let has_selection = self.has_selection;
        let persistent = self.options.persistent_circle;
        let drifted = self
            .created_center
            .map(|created| !created.within(&at, CENTER_TOLERANCE_DEG))
            .unwrap_or(false);
        info!(lng = at.longitude, lat = at.latitude, has_selection, "map ready");

        let Some(instance) = self.lifecycle.ready_instance_mut() else {
            return;
        };
        if drifted {
            instance.handle.fly_to(at, active.zoom_level);
        }
        if has_selection {
            self.overlay.show(instance, at);
            self.request_lookup(at);
        } else if persistent {
            if let Err(err) = self.overlay.ensure_overlay(instance, at) {
                warn!(?err, "failed to draw persistent privacy circle");
            }
        }
    }

    fn on_click(&mut self, at: Coordinates) {
        if !at.is_valid() {
            warn!(lng = at.longitude, lat = at.latitude, "ignoring click outside valid range");
            return;
        }
        if !self.lifecycle.is_ready() {
            debug!(phase = %self.lifecycle.phase(), "click before map ready; ignoring");
            return;
        }
        let zoom = self.current_zoom();
        self.active = Some(ActiveLocation::new(at, zoom));
        self.has_selection = true;
        trace!(lng = at.longitude, lat = at.latitude, "pin moved by click");
        self.apply_selection(at);
    }

    fn on_external_change(&mut self, input: &str) {
        if input == self.last_input {
            return;
        }
        self.last_input = input.to_string();
        let parsed = ParsedLocation::parse(input);
        let at = parsed.coordinates();
        let has_point = !parsed.is_fallback();
        self.seed = parsed;

        let mounted = !matches!(
            self.lifecycle.phase(),
            MapPhase::Uninitialized | MapPhase::TornDown
        );
        if mounted && !has_point {
            debug!(name = %self.seed.name, "external location has no coordinates; pin unchanged");
            return;
        }

        match self.lifecycle.phase() {
            MapPhase::Ready => {
                let zoom = self.current_zoom();
                self.active = Some(ActiveLocation::new(at, zoom));
                self.has_selection = true;
                if let Some(instance) = self.lifecycle.ready_instance_mut() {
                    instance.handle.fly_to(at, zoom);
                }
                debug!(lng = at.longitude, lat = at.latitude, "recentred on external location");
                self.apply_selection(at);
            }
            MapPhase::Initializing | MapPhase::StyleLoading => {
                self.active = Some(ActiveLocation::new(at, self.current_zoom()));
                self.has_selection = true;
                debug!("location changed before map ready; applied on style load");
            }
            MapPhase::Uninitialized | MapPhase::TornDown => {
                debug!("location changed while unmounted; kept as seed");
            }
        }
    }

    fn on_pan_end(&mut self, center: Coordinates, zoom: f64) {
        if !self.lifecycle.is_ready() {
            return;
        }
        let Some(active) = self.active else {
            return;
        };
        if center.within(&active.coordinates(), CENTER_TOLERANCE_DEG) {
            trace!("move end matches active location; treating as programmatic");
            return;
        }
        self.active = Some(ActiveLocation::new(center, zoom));
        trace!(lng = center.longitude, lat = center.latitude, zoom, "user pan recorded");
    }

    fn on_map_error(&mut self, message: &str) {
        self.lifecycle.report_error(message);
        if self.lifecycle.phase() == MapPhase::Uninitialized {
            self.release_mount();
        }
    }

    fn apply_selection(&mut self, at: Coordinates) {
        if let Some(instance) = self.lifecycle.ready_instance_mut() {
            self.overlay.show(instance, at);
            self.request_lookup(at);
        }
    }

    fn request_lookup(&self, at: Coordinates) {
        match &self.gateway {
            Some(gateway) => gateway.lookup(at),
            None => debug!("no gateway for this mount; skipping lookup"),
        }
    }

    fn current_zoom(&self) -> f64 {
        self.active
            .map(|a| a.zoom_level)
            .unwrap_or_else(|| self.lifecycle.default_zoom())
    }

    fn release_mount(&mut self) {
        if let Some(gateway) = self.gateway.take() {
            gateway.close();
        }
        self.active = None;
        self.has_selection = false;
        self.created_center = None;
    }

    fn teardown(&mut self) {
        self.release_mount();
        self.lifecycle.teardown();
    }
}

impl Drop for PickerState {
    fn drop(&mut self) {
        self.teardown();
    }
}
