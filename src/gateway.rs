use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, trace, warn};

use crate::credentials::CredentialProvider;
use crate::geocoding::{best_match, ReverseGeocoder};
use crate::location::{Coordinates, ResolvedLocation};

pub type LocationCallback = Arc<dyn Fn(ResolvedLocation) + Send + Sync>;

/// Debounced reverse-geocoding for one mount.
///
/// Holds at most one pending lookup: scheduling a new one aborts the
/// previous timer. Each lookup is tagged with a sequence number and its
/// result is only delivered while it is still the latest scheduled lookup
/// and the gateway is open.
#[derive(Clone)]
pub struct GeocodeGateway {
    inner: Arc<GatewayInner>,
}

struct GatewayInner {
    geocoder: Arc<dyn ReverseGeocoder>,
    credentials: Arc<dyn CredentialProvider>,
    on_resolved: LocationCallback,
    window: Duration,
    runtime: Handle,
    slot: Mutex<LookupSlot>,
}

#[derive(Default)]
struct LookupSlot {
    latest: u64,
    pending: Option<PendingLookup>,
    closed: bool,
}

struct PendingLookup {
    seq: u64,
    at: Coordinates,
    task: JoinHandle<()>,
}

impl GeocodeGateway {
    pub fn new(
        geocoder: Arc<dyn ReverseGeocoder>,
        credentials: Arc<dyn CredentialProvider>,
        on_resolved: LocationCallback,
        window: Duration,
        runtime: Handle,
    ) -> Self {
        Self {
            inner: Arc::new(GatewayInner {
                geocoder,
                credentials,
                on_resolved,
                window,
                runtime,
                slot: Mutex::new(LookupSlot::default()),
            }),
        }
    }

    pub fn lookup(&self, at: Coordinates) {
        let mut slot = self.inner.slot.lock();
        if slot.closed {
            debug!(lng = at.longitude, lat = at.latitude, "gateway closed; dropping lookup");
            return;
        }
        if let Some(previous) = slot.pending.take() {
            previous.task.abort();
            trace!(
                seq = previous.seq,
                lng = previous.at.longitude,
                lat = previous.at.latitude,
                "superseded pending lookup"
            );
        }
        slot.latest += 1;
        let seq = slot.latest;
        let inner = Arc::clone(&self.inner);
        let task = self.inner.runtime.spawn(inner.run(seq, at));
        slot.pending = Some(PendingLookup { seq, at, task });
    }

    /// Coordinate waiting for its debounce window to elapse, if any.
    pub fn pending(&self) -> Option<Coordinates> {
        self.inner.slot.lock().pending.as_ref().map(|p| p.at)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.slot.lock().closed
    }

    /// Drops the pending timer and suppresses any later delivery.
    pub fn close(&self) {
        let mut slot = self.inner.slot.lock();
        if slot.closed {
            return;
        }
        slot.closed = true;
        if let Some(pending) = slot.pending.take() {
            pending.task.abort();
        }
        debug!("geocode gateway closed");
    }
}

impl GatewayInner {
    async fn run(self: Arc<Self>, seq: u64, at: Coordinates) {
        sleep(self.window).await;
        {
            let mut slot = self.slot.lock();
            if slot.closed || slot.latest != seq {
                return;
            }
            if slot.pending.as_ref().map(|p| p.seq) == Some(seq) {
                slot.pending = None;
            }
        }

        let Some(token) = self.credentials.effective_token() else {
            warn!(
                lng = at.longitude,
                lat = at.latitude,
                "no access token; skipping reverse geocode"
            );
            return;
        };

        match self.geocoder.reverse_geocode(at, &token).await {
            Ok(features) => match best_match(at, &features) {
                Some(resolved) => self.deliver(seq, resolved),
                None => debug!(lng = at.longitude, lat = at.latitude, "reverse geocode found nothing"),
            },
            Err(err) => warn!(
                ?err,
                lng = at.longitude,
                lat = at.latitude,
                "reverse geocode failed"
            ),
        }
    }

    fn deliver(&self, seq: u64, resolved: ResolvedLocation) {
        let current = {
            let slot = self.slot.lock();
            !slot.closed && slot.latest == seq
        };
        if !current {
            debug!(seq, address = %resolved.address, "discarding stale geocode response");
            return;
        }
        (self.on_resolved)(resolved);
    }
}
