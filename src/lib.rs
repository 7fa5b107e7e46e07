mod config;
mod credentials;
mod errors;
mod gateway;
mod geocoding;
mod location;
mod map;
mod overlay;
mod picker;
#[cfg(test)]
mod test_support;

use once_cell::sync::OnceCell;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use config::{PickerConfig, PickerOptions, PublicPickerConfig};
pub use credentials::{
    CredentialProvider, FallbackCredentials, StaticToken, TokenVault, ACCESS_TOKEN_ACCOUNT,
};
pub use errors::{AppError, AppResult};
pub use gateway::{GeocodeGateway, LocationCallback};
pub use geocoding::{best_match, GeocodeFeature, HttpReverseGeocoder, ReverseGeocoder};
pub use location::{
    ActiveLocation, Coordinates, LocationSource, ParsedLocation, ResolvedLocation,
    CENTER_TOLERANCE_DEG, DEFAULT_COORDINATES,
};
pub use map::{
    MapContainer, MapCreateRequest, MapEvent, MapHandle, MapInstance, MapLifecycle, MapPhase,
    MapWidgetFactory, MarkerId,
};
pub use overlay::{
    point_feature, CircleStyle, OverlayManager, OverlayState, PRIVACY_LAYER_ID, PRIVACY_SOURCE_ID,
};
pub use picker::{LocationPicker, PickerStatus};

/// Installs the global tracing subscriber once; later calls are no-ops.
pub fn init_tracing() {
    static INIT: OnceCell<()> = OnceCell::new();
    let _ = INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,location_picker=debug"));
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init();
    });
}
