//! File-backed business directory.
//!
//! The catalog is a JSON document listing named places (used for geocoding)
//! and businesses tagged with the services they offer:
//!
//! ```json
//! {
//!   "places": [{ "name": "Whitefield", "lat": 12.9698, "lng": 77.75 }],
//!   "businesses": [{
//!     "id": "swift-cabs", "name": "Swift Cabs", "services": ["cab", "taxi"],
//!     "phone": "+91-80-5550101", "location": { "lat": 12.97, "lng": 77.74 },
//!     "rating": 4.6, "review_count": 212, "reviews": ["On time, polite driver"]
//!   }]
//! }
//! ```

use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use haggle_core::domain::business::{Business, GeoPoint};
use haggle_core::ports::{BusinessDirectory, CollaboratorError, SearchLocation};

const SERVICE: &str = "directory";

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Catalog {
    pub places: Vec<Place>,
    pub businesses: Vec<CatalogEntry>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Place {
    pub name: String,
    pub lat: f64,
    pub lng: f64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CatalogEntry {
    #[serde(flatten)]
    pub business: Business,
    #[serde(default)]
    pub services: Vec<String>,
}

pub struct CatalogDirectory {
    catalog: Catalog,
}

impl CatalogDirectory {
    pub fn new(catalog: Catalog) -> Self {
        Self { catalog }
    }

    pub fn from_json(json: &str) -> Result<Self, CollaboratorError> {
        serde_json::from_str(json)
            .map(Self::new)
            .map_err(|error| CollaboratorError::invalid(SERVICE, error.to_string()))
    }

    pub async fn load(path: &Path) -> Result<Self, CollaboratorError> {
        let raw = tokio::fs::read_to_string(path).await.map_err(|error| {
            CollaboratorError::unavailable(SERVICE, format!("{}: {error}", path.display()))
        })?;
        let directory = Self::from_json(&raw)?;
        info!(
            event_name = "directory.catalog.loaded",
            path = %path.display(),
            places = directory.catalog.places.len(),
            businesses = directory.catalog.businesses.len(),
            "business catalog loaded"
        );
        Ok(directory)
    }

    fn locate(&self, address: &str) -> Option<GeoPoint> {
        let needle = address.trim().to_ascii_lowercase();
        if needle.is_empty() {
            return None;
        }
        self.catalog
            .places
            .iter()
            .find(|place| {
                let name = place.name.to_ascii_lowercase();
                needle.contains(&name) || name.contains(&needle)
            })
            .map(|place| GeoPoint::new(place.lat, place.lng))
    }
}

fn offers(entry: &CatalogEntry, service_kind: &str) -> bool {
    let wanted = service_kind.trim().to_ascii_lowercase();
    entry.services.iter().any(|service| {
        let service = service.to_ascii_lowercase();
        wanted.contains(&service) || service.contains(&wanted)
    })
}

#[async_trait]
impl BusinessDirectory for CatalogDirectory {
    async fn search(
        &self,
        service_kind: &str,
        location: &SearchLocation,
        radius_km: f64,
    ) -> Result<Vec<Business>, CollaboratorError> {
        let origin = location.point.or_else(|| self.locate(&location.address));

        let mut matches: Vec<Business> = self
            .catalog
            .businesses
            .iter()
            .filter(|entry| offers(entry, service_kind))
            .filter_map(|entry| {
                let mut business = entry.business.clone();
                if let (Some(origin), Some(at)) = (origin, business.location) {
                    let distance = origin.distance_km(&at);
                    if distance > radius_km {
                        return None;
                    }
                    business.distance_km = Some(distance);
                }
                Some(business)
            })
            .collect();

        matches.sort_by(|a, b| {
            let (a, b) = (a.distance_km.unwrap_or(f64::MAX), b.distance_km.unwrap_or(f64::MAX));
            a.total_cmp(&b)
        });

        debug!(
            event_name = "directory.search",
            service_kind,
            address = %location.address,
            geocoded = origin.is_some(),
            results = matches.len(),
            "catalog search finished"
        );
        Ok(matches)
    }

    async fn geocode(&self, address: &str) -> Result<Option<GeoPoint>, CollaboratorError> {
        Ok(self.locate(address))
    }
}
