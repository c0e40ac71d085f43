use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Location {
    Known(Coordinates),
    Unknown,
}

/// One best-effort location fix. Implementations report failure through
/// the Result; the provider turns that into `Location::Unknown`.
#[async_trait]
pub trait LocationSource: Send + Sync {
    async fn fix(&self) -> anyhow::Result<Coordinates>;
}

/// Coordinates pinned on the command line.
pub struct FixedSource(pub Coordinates);

#[async_trait]
impl LocationSource for FixedSource {
    async fn fix(&self) -> anyhow::Result<Coordinates> {
        Ok(self.0)
    }
}

/// Coarse GeoIP lookup, the best a terminal client can do without device
/// hardware.
pub struct GeoIpSource {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct GeoIpResponse {
    status: String,
    #[serde(default)]
    lat: f64,
    #[serde(default)]
    lon: f64,
}

impl GeoIpSource {
    pub fn new() -> Self {
        Self::with_base_url("http://ip-api.com")
    }

    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.to_string(),
        }
    }
}

#[async_trait]
impl LocationSource for GeoIpSource {
    async fn fix(&self) -> anyhow::Result<Coordinates> {
        let url = format!("{}/json", self.base_url);
        let response: GeoIpResponse = self.client.get(&url).send().await?.json().await?;
        if response.status != "success" {
            anyhow::bail!("geoip lookup returned status {:?}", response.status);
        }
        Ok(Coordinates {
            latitude: response.lat,
            longitude: response.lon,
        })
    }
}

/// Owns the "last known location" cache. A refresh that fails or times
/// out yields `Unknown` to the caller but keeps the previous fix cached.
pub struct LocationProvider {
    source: Box<dyn LocationSource>,
    last_known: Location,
}

impl LocationProvider {
    pub fn new(source: Box<dyn LocationSource>) -> Self {
        Self {
            source,
            last_known: Location::Unknown,
        }
    }

    /// Single bounded fix attempt. Never raises; callers fall back on
    /// [`crate::composer::FALLBACK_COORDINATES`] via `Location::Unknown`.
    pub async fn refresh(&mut self, timeout: Duration) -> Location {
        match tokio::time::timeout(timeout, self.source.fix()).await {
            Ok(Ok(coords)) => {
                debug!(lat = coords.latitude, lon = coords.longitude, "location fix");
                self.last_known = Location::Known(coords);
                self.last_known
            }
            Ok(Err(err)) => {
                debug!(%err, "location fix failed");
                Location::Unknown
            }
            Err(_) => {
                debug!(?timeout, "location fix timed out");
                Location::Unknown
            }
        }
    }

    pub fn last_known(&self) -> Location {
        self.last_known
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingSource;

    #[async_trait]
    impl LocationSource for FailingSource {
        async fn fix(&self) -> anyhow::Result<Coordinates> {
            anyhow::bail!("permission denied")
        }
    }

    struct SlowSource;

    #[async_trait]
    impl LocationSource for SlowSource {
        async fn fix(&self) -> anyhow::Result<Coordinates> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Coordinates {
                latitude: 1.0,
                longitude: 1.0,
            })
        }
    }

    const OSLO: Coordinates = Coordinates {
        latitude: 59.9139,
        longitude: 10.7522,
    };

    #[tokio::test]
    async fn successful_fix_updates_the_cache() {
        let mut provider = LocationProvider::new(Box::new(FixedSource(OSLO)));
        assert_eq!(provider.last_known(), Location::Unknown);

        let fix = provider.refresh(Duration::from_secs(1)).await;
        assert_eq!(fix, Location::Known(OSLO));
        assert_eq!(provider.last_known(), Location::Known(OSLO));
    }

    #[tokio::test]
    async fn failure_yields_unknown_without_raising() {
        let mut provider = LocationProvider::new(Box::new(FailingSource));
        let fix = provider.refresh(Duration::from_secs(1)).await;
        assert_eq!(fix, Location::Unknown);
    }

    #[tokio::test]
    async fn timeout_yields_unknown_and_keeps_the_old_fix() {
        let mut provider = LocationProvider::new(Box::new(FixedSource(OSLO)));
        provider.refresh(Duration::from_secs(1)).await;

        provider.source = Box::new(SlowSource);
        let fix = provider.refresh(Duration::from_millis(100)).await;
        assert_eq!(fix, Location::Unknown);
        assert_eq!(provider.last_known(), Location::Known(OSLO));
    }
}
