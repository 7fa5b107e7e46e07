use serde_json::{json, Value};
use tracing::{trace, warn};

use crate::errors::AppResult;
use crate::location::Coordinates;
use crate::map::{MapInstance, MarkerId};

pub const PRIVACY_SOURCE_ID: &str = "privacy-radius";
pub const PRIVACY_LAYER_ID: &str = "privacy-radius-fill";

#[derive(Debug, Default)]
pub struct OverlayState {
    layer_created: bool,
    marker: Option<MarkerId>,
}

impl OverlayState {
    pub fn layer_created(&self) -> bool {
        self.layer_created
    }

    pub fn marker(&self) -> Option<MarkerId> {
        self.marker
    }

    pub(crate) fn take_marker(&mut self) -> Option<MarkerId> {
        self.marker.take()
    }
}

#[derive(Debug, Clone)]
pub struct CircleStyle {
    pub radius_px: f64,
    pub fill_color: String,
    pub fill_opacity: f64,
    pub stroke_color: String,
    pub stroke_width: f64,
}

impl CircleStyle {
    pub fn with_radius(radius_px: f64) -> Self {
        Self {
            radius_px,
            fill_color: "#3b82f6".into(),
            fill_opacity: 0.2,
            stroke_color: "#2563eb".into(),
            stroke_width: 2.0,
        }
    }

    fn layer(&self) -> Value {
        json!({
            "id": PRIVACY_LAYER_ID,
            "type": "circle",
            "source": PRIVACY_SOURCE_ID,
            "paint": {
                "circle-radius": self.radius_px,
                "circle-color": self.fill_color,
                "circle-opacity": self.fill_opacity,
                "circle-stroke-color": self.stroke_color,
                "circle-stroke-width": self.stroke_width,
            }
        })
    }
}

pub fn point_feature(at: Coordinates) -> Value {
    json!({
        "type": "Feature",
        "properties": {},
        "geometry": {
            "type": "Point",
            "coordinates": at.as_pair(),
        }
    })
}

/// Keeps one privacy circle and one marker on a ready map.
#[derive(Debug, Clone)]
pub struct OverlayManager {
    style: CircleStyle,
}

impl OverlayManager {
    pub fn new(style: CircleStyle) -> Self {
        Self { style }
    }

    /// Adds the circle source and layer on first use, then only moves the
    /// source geometry.
    pub fn ensure_overlay(&self, map: &mut MapInstance, at: Coordinates) -> AppResult<()> {
        if map.overlay.layer_created {
            map.handle
                .set_source_data(PRIVACY_SOURCE_ID, point_feature(at))?;
            trace!(lng = at.longitude, lat = at.latitude, "privacy circle moved");
            return Ok(());
        }

        map.handle.add_source(
            PRIVACY_SOURCE_ID,
            json!({ "type": "geojson", "data": point_feature(at) }),
        )?;
        map.handle.add_layer(self.style.layer())?;
        map.overlay.layer_created = true;
        trace!(lng = at.longitude, lat = at.latitude, "privacy circle created");
        Ok(())
    }

    pub fn place_marker(&self, map: &mut MapInstance, at: Coordinates) -> AppResult<()> {
        if let Some(previous) = map.overlay.marker.take() {
            map.handle.remove_marker(previous);
        }
        let marker = map.handle.add_marker(at)?;
        map.overlay.marker = Some(marker);
        Ok(())
    }

    /// Circle and marker together; failures are logged, never raised.
    pub fn show(&self, map: &mut MapInstance, at: Coordinates) {
        if let Err(err) = self.ensure_overlay(map, at) {
            warn!(?err, lng = at.longitude, lat = at.latitude, "failed to update privacy circle");
        }
        if let Err(err) = self.place_marker(map, at) {
            warn!(?err, lng = at.longitude, lat = at.latitude, "failed to place marker");
        }
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use super::*;
    use crate::map::{MapContainer, MapCreateRequest, MapWidgetFactory};
    use crate::test_support::FakeMapFactory;

    fn instance(maps: &FakeMapFactory) -> MapInstance {
        let handle = maps
            .create_map(MapCreateRequest {
                container: &MapContainer::attached("overlay-test"),
                style: "mapbox://styles/test",
                center: Coordinates::new(55.27, 25.2),
                zoom: 12.0,
                access_token: &SecretString::from("pk.test".to_string()),
            })
            .unwrap();
        MapInstance::new(handle)
    }

    #[test]
    fn repeated_updates_mutate_existing_source() {
        let maps = FakeMapFactory::new();
        let mut map = instance(&maps);
        let manager = OverlayManager::new(CircleStyle::with_radius(40.0));
        let at = Coordinates::new(55.27, 25.2);

        for _ in 0..5 {
            manager.ensure_overlay(&mut map, at).unwrap();
        }

        assert!(map.overlay.layer_created());
        let log = maps.log();
        assert_eq!(log.layers.len(), 1);
        assert_eq!(log.layers[0]["paint"]["circle-radius"], 40.0);
        assert_eq!(log.source_updates.len(), 4);
    }

    #[test]
    fn marker_is_replaced_not_leaked() {
        let maps = FakeMapFactory::new();
        let mut map = instance(&maps);
        let manager = OverlayManager::new(CircleStyle::with_radius(40.0));

        manager.place_marker(&mut map, Coordinates::new(55.0, 25.0)).unwrap();
        let first = map.overlay.marker();
        manager.place_marker(&mut map, Coordinates::new(54.0, 24.0)).unwrap();

        assert_ne!(map.overlay.marker(), first);
        let log = maps.log();
        assert_eq!(log.markers_added, 2);
        assert_eq!(log.live_markers, vec![map.overlay.marker().unwrap()]);
    }

    #[test]
    fn point_feature_uses_lng_lat_order() {
        let feature = point_feature(Coordinates::new(54.0, 24.0));
        assert_eq!(feature["geometry"]["coordinates"], serde_json::json!([54.0, 24.0]));
    }
}
