use std::fmt;
use std::sync::Arc;

use secrecy::SecretString;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::credentials::CredentialProvider;
use crate::errors::{AppError, AppResult};
use crate::location::Coordinates;
use crate::overlay::OverlayState;

/// Host element the map widget renders into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapContainer {
    pub element_id: String,
    pub attached: bool,
}

impl MapContainer {
    pub fn attached(element_id: impl Into<String>) -> Self {
        Self {
            element_id: element_id.into(),
            attached: true,
        }
    }

    pub fn detached(element_id: impl Into<String>) -> Self {
        Self {
            element_id: element_id.into(),
            attached: false,
        }
    }
}

pub struct MapCreateRequest<'a> {
    pub container: &'a MapContainer,
    pub style: &'a str,
    pub center: Coordinates,
    pub zoom: f64,
    pub access_token: &'a SecretString,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MarkerId(pub u64);

/// Events the embedded widget reports back to the picker.
#[derive(Debug, Clone, PartialEq)]
pub enum MapEvent {
    StyleLoaded,
    Click { longitude: f64, latitude: f64 },
    MoveEnd { center: Coordinates, zoom: f64 },
    Error(String),
}

/// Entry point into the external map-widget library.
pub trait MapWidgetFactory: Send + Sync {
    fn create_map(&self, request: MapCreateRequest<'_>) -> AppResult<Box<dyn MapHandle>>;
}

/// A live widget instance. Implementations must not call back into the
/// picker synchronously; widget events are delivered via
/// `LocationPicker::handle_event`.
pub trait MapHandle: Send {
    fn add_source(&mut self, id: &str, data: Value) -> AppResult<()>;
    fn add_layer(&mut self, layer: Value) -> AppResult<()>;
    fn set_source_data(&mut self, id: &str, data: Value) -> AppResult<()>;
    fn add_marker(&mut self, at: Coordinates) -> AppResult<MarkerId>;
    fn remove_marker(&mut self, marker: MarkerId);
    fn fly_to(&mut self, center: Coordinates, zoom: f64);
    fn remove(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MapPhase {
    Uninitialized,
    Initializing,
    StyleLoading,
    Ready,
    TornDown,
}

impl MapPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            MapPhase::Uninitialized => "uninitialized",
            MapPhase::Initializing => "initializing",
            MapPhase::StyleLoading => "style_loading",
            MapPhase::Ready => "ready",
            MapPhase::TornDown => "torn_down",
        }
    }

    fn accepts_initialize(&self) -> bool {
        matches!(self, MapPhase::Uninitialized | MapPhase::TornDown)
    }
}

impl fmt::Display for MapPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Widget handle plus the overlay bookkeeping tied to it.
///
/// The handle is owned by the lifecycle and unreachable from outside the
/// crate:
///
/// ```compile_fail
/// fn poke(instance: &mut location_picker::MapInstance) {
///     instance.handle.remove();
/// }
/// ```
///
/// ```compile_fail
/// fn poke(lifecycle: &mut location_picker::MapLifecycle) {
///     let _ = lifecycle.ready_instance_mut();
/// }
/// ```
pub struct MapInstance {
    pub(crate) handle: Box<dyn MapHandle>,
    pub(crate) overlay: OverlayState,
}

impl MapInstance {
    pub fn overlay(&self) -> &OverlayState {
        &self.overlay
    }
}

impl MapInstance {
    pub(crate) fn new(handle: Box<dyn MapHandle>) -> Self {
        Self {
            handle,
            overlay: OverlayState::default(),
        }
    }
}

/// Owns the one widget instance of a mount and its phase.
pub struct MapLifecycle {
    factory: Arc<dyn MapWidgetFactory>,
    style: String,
    zoom: f64,
    phase: MapPhase,
    instance: Option<MapInstance>,
}

impl MapLifecycle {
    pub fn new(factory: Arc<dyn MapWidgetFactory>, style: impl Into<String>, zoom: f64) -> Self {
        Self {
            factory,
            style: style.into(),
            zoom,
            phase: MapPhase::Uninitialized,
            instance: None,
        }
    }

    pub fn phase(&self) -> MapPhase {
        self.phase
    }

    pub fn default_zoom(&self) -> f64 {
        self.zoom
    }

    pub fn is_ready(&self) -> bool {
        self.phase == MapPhase::Ready
    }

    /// Creates the widget unless one is already live or being created.
    ///
    /// Returns `Ok(false)` when the call was collapsed into an existing
    /// instance. On failure the guard is released so a later attempt can
    /// succeed.
    pub fn initialize(
        &mut self,
        container: &MapContainer,
        center: Coordinates,
        credentials: &dyn CredentialProvider,
    ) -> AppResult<bool> {
        if !self.phase.accepts_initialize() {
            debug!(phase = %self.phase, "map already initializing or live; skipping");
            return Ok(false);
        }
        self.phase = MapPhase::Initializing;

        match self.create(container, center, credentials) {
            Ok(handle) => {
                self.instance = Some(MapInstance::new(handle));
                self.phase = MapPhase::StyleLoading;
                info!(
                    container = %container.element_id,
                    lng = center.longitude,
                    lat = center.latitude,
                    "map created; waiting for style"
                );
                Ok(true)
            }
            Err(err) => {
                self.phase = MapPhase::Uninitialized;
                Err(err)
            }
        }
    }

    fn create(
        &self,
        container: &MapContainer,
        center: Coordinates,
        credentials: &dyn CredentialProvider,
    ) -> AppResult<Box<dyn MapHandle>> {
        let token = credentials
            .effective_token()
            .ok_or(AppError::MissingCredential)?;
        if !container.attached {
            return Err(AppError::Map(format!(
                "container `{}` is not attached",
                container.element_id
            )));
        }
        self.factory.create_map(MapCreateRequest {
            container,
            style: &self.style,
            center,
            zoom: self.zoom,
            access_token: &token,
        })
    }

    /// Moves `StyleLoading` to `Ready`. Returns whether the transition
    /// happened.
    pub fn mark_style_loaded(&mut self) -> bool {
        if self.phase != MapPhase::StyleLoading {
            debug!(phase = %self.phase, "ignoring style load outside style loading");
            return false;
        }
        self.phase = MapPhase::Ready;
        true
    }

    /// Widget-reported failure. Before readiness the instance is discarded
    /// and the guard released so the host can retry.
    pub fn report_error(&mut self, message: &str) {
        match self.phase {
            MapPhase::Initializing | MapPhase::StyleLoading => {
                warn!(error = message, "map failed before becoming ready; resetting");
                self.release();
                self.phase = MapPhase::Uninitialized;
            }
            phase => warn!(error = message, %phase, "map widget reported an error"),
        }
    }

    /// Instance access gated on readiness.
    pub(crate) fn ready_instance_mut(&mut self) -> Option<&mut MapInstance> {
        if self.phase != MapPhase::Ready {
            return None;
        }
        self.instance.as_mut()
    }

    pub fn instance(&self) -> Option<&MapInstance> {
        self.instance.as_ref()
    }

    pub fn teardown(&mut self) {
        if self.phase == MapPhase::TornDown && self.instance.is_none() {
            return;
        }
        self.release();
        self.phase = MapPhase::TornDown;
        debug!("map torn down");
    }

    fn release(&mut self) {
        if let Some(mut instance) = self.instance.take() {
            if let Some(marker) = instance.overlay.take_marker() {
                instance.handle.remove_marker(marker);
            }
            instance.handle.remove();
        }
    }
}
