//! Date-proximity show matching.

use std::collections::HashMap;

use chrono::NaiveDate;
use tracing::{debug, instrument, warn};

use flexdocs_shared::{DocumentType, ShowMatch};

use crate::{CatalogShow, ShowCatalog};

/// Matches meeting documents to catalog shows by date.
///
/// Listings are cached per city for the lifetime of the matcher (one run).
/// Failed lookups are not cached.
pub struct ShowMatcher<C> {
    catalog: C,
    tolerance_days: u32,
    cache: HashMap<String, Vec<CatalogShow>>,
}

impl<C: ShowCatalog> ShowMatcher<C> {
    pub fn new(catalog: C, tolerance_days: u32) -> Self {
        Self {
            catalog,
            tolerance_days,
            cache: HashMap::new(),
        }
    }

    /// Find the show closest to `meeting_date` for `city`.
    ///
    /// Returns `None` when nothing falls within the tolerance, and also when
    /// the catalog cannot be reached: the document then goes to manual review.
    #[instrument(skip(self), fields(tolerance = self.tolerance_days))]
    pub async fn match_show(
        &mut self,
        city: &str,
        meeting_date: NaiveDate,
        document_type: DocumentType,
    ) -> Option<ShowMatch> {
        if !self.cache.contains_key(city) {
            match self.catalog.shows_for_city(city).await {
                Ok(shows) => {
                    self.cache.insert(city.to_string(), shows);
                }
                Err(e) => {
                    warn!(error = %e, "catalog lookup failed, treating as no match");
                    return None;
                }
            }
        }

        let shows = self.cache.get(city)?;
        let found = closest_show(shows, meeting_date, self.tolerance_days);
        match &found {
            Some(m) => debug!(show_id = %m.show_id, day_offset = m.day_offset, "show matched"),
            None => debug!(candidates = shows.len(), "no show within tolerance"),
        }
        found
    }
}

/// Pick the show whose date is nearest to `meeting_date`, within `tolerance_days`.
///
/// Ties keep the earliest candidate in catalog order. Shows without a
/// parseable date are ignored.
pub(crate) fn closest_show(
    shows: &[CatalogShow],
    meeting_date: NaiveDate,
    tolerance_days: u32,
) -> Option<ShowMatch> {
    let tolerance = i64::from(tolerance_days);
    let mut best: Option<(&CatalogShow, i64)> = None;

    for show in shows {
        let Some(air_date) = show.air_date() else {
            continue;
        };
        let offset = (air_date - meeting_date).num_days();
        if offset.abs() > tolerance {
            continue;
        }
        if best.is_none_or(|(_, b)| offset.abs() < b.abs()) {
            best = Some((show, offset));
        }
    }

    best.map(|(show, offset)| ShowMatch {
        show_id: show.id.clone(),
        title: show.title.clone(),
        confidence: 1.0 - offset.abs() as f64 / (tolerance + 1) as f64,
        day_offset: offset,
    })
}
