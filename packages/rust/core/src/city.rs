//! Static city → mount point table.

use std::collections::HashMap;

use flexdocs_shared::CityMapping;

/// Exact-match lookup over the configured city table.
///
/// Loaded once at start and never mutated. Names are compared byte for
/// byte: no case folding, no trimming, no fuzzy matching.
#[derive(Debug, Clone)]
pub struct CityMapper {
    mappings: Vec<CityMapping>,
    index: HashMap<String, usize>,
}

impl CityMapper {
    /// Build the table. On duplicate names the first entry wins.
    pub fn new(mappings: Vec<CityMapping>) -> Self {
        let mut index = HashMap::with_capacity(mappings.len());
        for (i, mapping) in mappings.iter().enumerate() {
            index.entry(mapping.city_name.clone()).or_insert(i);
        }
        Self { mappings, index }
    }

    /// Look up a city. `None` means the document needs manual review.
    pub fn lookup(&self, city: &str) -> Option<&CityMapping> {
        self.index.get(city).map(|&i| &self.mappings[i])
    }

    /// All mappings in table order.
    pub fn iter(&self) -> impl Iterator<Item = &CityMapping> {
        self.mappings.iter()
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}
