//! Forward location search: free-text pattern preparation, the matching
//! visitors over the admin hierarchy and the ranked result set.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::error::Result;
use crate::location::{
    Address, AddressVisitor, AdminRegion, AdminRegionVisitor, Location, LocationVisitor, Poi,
    VisitorAction,
};
use crate::model::ObjectFileRef;

/// Quality of a pattern hit. Declared best-first, so the derived order sorts
/// better qualities ahead of worse ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchQuality {
    Match,
    Candidate,
    None,
}

/// One candidate slicing of the search text into patterns. Empty strings mean
/// "not constrained".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchEntry {
    pub admin_region_pattern: String,
    pub location_pattern: String,
    pub address_pattern: String,
}

/// A forward search request: candidate slicings plus a shared result limit.
///
/// Matching is raw byte-wise substring matching; patterns are not lowercased
/// or Unicode-folded. A name is a `Match` when it equals the pattern and a
/// `Candidate` when it merely contains it.
#[derive(Debug, Clone)]
pub struct LocationSearch {
    pub searches: Vec<SearchEntry>,
    pub limit: usize,
}

impl LocationSearch {
    pub fn new(limit: usize) -> Self {
        Self {
            searches: Vec::new(),
            limit,
        }
    }

    /// Tokenizes free text and generates candidate
    /// (admin, location, address) slicings of sizes 1, 2 and 3, in both
    /// natural and rotated pattern orderings, to cover the ambiguity of
    /// "street number city" vs "city street number" style input.
    pub fn initialize_search_entries(&mut self, text: &str) {
        let tokens = tokenize(text);
        if tokens.is_empty() {
            return;
        }

        if tokens.len() >= 3 {
            for slice in group_tokens(&tokens, 3) {
                self.searches.push(SearchEntry {
                    location_pattern: slice[0].clone(),
                    address_pattern: slice[1].clone(),
                    admin_region_pattern: slice[2].clone(),
                });
                self.searches.push(SearchEntry {
                    location_pattern: slice[1].clone(),
                    address_pattern: slice[2].clone(),
                    admin_region_pattern: slice[0].clone(),
                });
            }
        }

        if tokens.len() >= 2 {
            for slice in group_tokens(&tokens, 2) {
                self.searches.push(SearchEntry {
                    location_pattern: slice[0].clone(),
                    admin_region_pattern: slice[1].clone(),
                    ..SearchEntry::default()
                });
                self.searches.push(SearchEntry {
                    location_pattern: slice[1].clone(),
                    admin_region_pattern: slice[0].clone(),
                    ..SearchEntry::default()
                });
            }
        }

        for slice in group_tokens(&tokens, 1) {
            self.searches.push(SearchEntry {
                admin_region_pattern: slice[0].clone(),
                ..SearchEntry::default()
            });
        }
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|token| !token.is_empty())
        .map(str::to_owned)
        .collect()
}

/// All ways of splitting `tokens` into `parts` consecutive non-empty groups,
/// each group joined back into one pattern.
fn group_tokens(tokens: &[String], parts: usize) -> Vec<Vec<String>> {
    let mut result = Vec::new();
    if parts == 0 || tokens.len() < parts {
        return result;
    }
    if parts == 1 {
        result.push(vec![tokens.join(" ")]);
        return result;
    }

    for head_len in 1..=tokens.len() - (parts - 1) {
        let head = tokens[..head_len].join(" ");
        for mut tail in group_tokens(&tokens[head_len..], parts - 1) {
            let mut slice = Vec::with_capacity(parts);
            slice.push(head.clone());
            slice.append(&mut tail);
            result.push(slice);
        }
    }
    result
}

/// `(match, candidate)` for `pattern` against `name`: a match is an exact hit
/// reached through the prefix test, a candidate is any substring hit.
fn match_name(name: &str, pattern: &str) -> (bool, bool) {
    let is_match = name.starts_with(pattern) && name.len() == pattern.len();
    let candidate = name.contains(pattern);
    (is_match, candidate)
}

#[derive(Debug, Clone)]
pub(crate) struct AdminRegionResult {
    pub(crate) admin_region: Arc<AdminRegion>,
    pub(crate) is_match: bool,
}

/// Admin-hierarchy visitor collecting regions whose name or alias hits the
/// pattern. Alias hits substitute the alias name and node into the reported
/// region.
pub(crate) struct AdminRegionMatchVisitor {
    pattern: String,
    limit: usize,
    pub(crate) results: Vec<AdminRegionResult>,
    pub(crate) limit_reached: bool,
}

impl AdminRegionMatchVisitor {
    pub(crate) fn new(pattern: &str, limit: usize) -> Self {
        Self {
            pattern: pattern.to_owned(),
            limit,
            results: Vec::new(),
            limit_reached: false,
        }
    }

    fn record(&mut self, region: AdminRegion, is_match: bool) {
        if self.results.len() >= self.limit {
            self.limit_reached = true;
            return;
        }
        self.results.push(AdminRegionResult {
            admin_region: Arc::new(region),
            is_match,
        });
        if self.results.len() >= self.limit {
            self.limit_reached = true;
        }
    }
}

impl AdminRegionVisitor for AdminRegionMatchVisitor {
    fn visit(&mut self, region: &AdminRegion) -> Result<VisitorAction> {
        let (is_match, candidate) = match_name(&region.name, &self.pattern);
        if is_match || candidate {
            self.record(region.clone(), is_match);
        }

        for alias in &region.aliases {
            let (is_match, candidate) = match_name(&alias.name, &self.pattern);
            if is_match || candidate {
                let mut hit = region.clone();
                hit.alias_name = alias.name.clone();
                hit.alias_object = ObjectFileRef::Node(alias.object_offset);
                self.record(hit, is_match);
            }
        }

        if self.limit_reached {
            Ok(VisitorAction::Stop)
        } else {
            Ok(VisitorAction::VisitChildren)
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct PoiResult {
    pub(crate) admin_region: Arc<AdminRegion>,
    pub(crate) poi: Arc<Poi>,
    pub(crate) is_match: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct LocationResult {
    pub(crate) admin_region: Arc<AdminRegion>,
    pub(crate) location: Arc<Location>,
    pub(crate) is_match: bool,
}

/// Location visitor collecting POIs and locations whose name hits the
/// pattern; the limit spans both result lists.
pub(crate) struct LocationMatchVisitor {
    pattern: String,
    limit: usize,
    pub(crate) poi_results: Vec<PoiResult>,
    pub(crate) location_results: Vec<LocationResult>,
    pub(crate) limit_reached: bool,
}

impl LocationMatchVisitor {
    pub(crate) fn new(pattern: &str, limit: usize) -> Self {
        Self {
            pattern: pattern.to_owned(),
            limit,
            poi_results: Vec::new(),
            location_results: Vec::new(),
            limit_reached: false,
        }
    }

    fn total(&self) -> usize {
        self.poi_results.len() + self.location_results.len()
    }
}

impl LocationVisitor for LocationMatchVisitor {
    fn visit_poi(&mut self, region: &AdminRegion, poi: &Poi) -> Result<bool> {
        let (is_match, candidate) = match_name(&poi.name, &self.pattern);
        if is_match || candidate {
            if self.total() >= self.limit {
                self.limit_reached = true;
            } else {
                self.poi_results.push(PoiResult {
                    admin_region: Arc::new(region.clone()),
                    poi: Arc::new(poi.clone()),
                    is_match,
                });
                self.limit_reached = self.total() >= self.limit;
            }
        }
        Ok(!self.limit_reached)
    }

    fn visit_location(&mut self, region: &AdminRegion, location: &Location) -> Result<bool> {
        let (is_match, candidate) = match_name(&location.name, &self.pattern);
        if is_match || candidate {
            if self.total() >= self.limit {
                self.limit_reached = true;
            } else {
                self.location_results.push(LocationResult {
                    admin_region: Arc::new(region.clone()),
                    location: Arc::new(location.clone()),
                    is_match,
                });
                self.limit_reached = self.total() >= self.limit;
            }
        }
        Ok(!self.limit_reached)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct AddressResult {
    pub(crate) location: Arc<Location>,
    pub(crate) address: Arc<Address>,
    pub(crate) is_match: bool,
}

pub(crate) struct AddressMatchVisitor {
    pattern: String,
    limit: usize,
    pub(crate) results: Vec<AddressResult>,
    pub(crate) limit_reached: bool,
}

impl AddressMatchVisitor {
    pub(crate) fn new(pattern: &str, limit: usize) -> Self {
        Self {
            pattern: pattern.to_owned(),
            limit,
            results: Vec::new(),
            limit_reached: false,
        }
    }
}

impl AddressVisitor for AddressMatchVisitor {
    fn visit_address(
        &mut self,
        _region: &AdminRegion,
        location: &Location,
        address: &Address,
    ) -> Result<bool> {
        let (is_match, candidate) = match_name(&address.name, &self.pattern);
        if is_match || candidate {
            if self.results.len() >= self.limit {
                self.limit_reached = true;
            } else {
                self.results.push(AddressResult {
                    location: Arc::new(location.clone()),
                    address: Arc::new(address.clone()),
                    is_match,
                });
                self.limit_reached = self.results.len() >= self.limit;
            }
        }
        Ok(!self.limit_reached)
    }
}

/// One ranked search result. Populated combinations are (region),
/// (region, poi), (region, location) and (region, location, address).
#[derive(Debug, Clone)]
pub struct SearchResultEntry {
    pub admin_region: Option<Arc<AdminRegion>>,
    pub poi: Option<Arc<Poi>>,
    pub location: Option<Arc<Location>>,
    pub address: Option<Arc<Address>>,
    pub admin_region_match_quality: MatchQuality,
    pub poi_match_quality: MatchQuality,
    pub location_match_quality: MatchQuality,
    pub address_match_quality: MatchQuality,
}

impl SearchResultEntry {
    /// Lexicographic ranking: qualities first (best ahead), then names.
    pub(crate) fn compare(&self, other: &Self) -> Ordering {
        self.admin_region_match_quality
            .cmp(&other.admin_region_match_quality)
            .then_with(|| {
                self.location_match_quality
                    .cmp(&other.location_match_quality)
            })
            .then_with(|| self.address_match_quality.cmp(&other.address_match_quality))
            .then_with(|| self.poi_match_quality.cmp(&other.poi_match_quality))
            .then_with(|| compare_names(&self.admin_region, &other.admin_region, |r| r.name.as_str()))
            .then_with(|| compare_names(&self.location, &other.location, |l| l.name.as_str()))
            .then_with(|| compare_names(&self.address, &other.address, |a| a.name.as_str()))
            .then_with(|| compare_names(&self.poi, &other.poi, |p| p.name.as_str()))
    }

    /// Identity equality used for deduplication: two entries are the same
    /// result when they reference the same stored objects.
    pub(crate) fn same_identity(&self, other: &Self) -> bool {
        let region_identity = |entry: &Self| {
            entry
                .admin_region
                .as_ref()
                .map(|r| (r.object, r.alias_object))
        };
        let poi_identity = |entry: &Self| entry.poi.as_ref().map(|p| p.object);
        let location_identity =
            |entry: &Self| entry.location.as_ref().map(|l| l.location_offset);
        let address_identity = |entry: &Self| entry.address.as_ref().map(|a| a.address_offset);

        region_identity(self) == region_identity(other)
            && poi_identity(self) == poi_identity(other)
            && location_identity(self) == location_identity(other)
            && address_identity(self) == address_identity(other)
    }
}

fn compare_names<T, F: Fn(&T) -> &str>(
    left: &Option<Arc<T>>,
    right: &Option<Arc<T>>,
    name: F,
) -> Ordering {
    match (left, right) {
        (Some(left), Some(right)) => name(left).cmp(name(right)),
        _ => Ordering::Equal,
    }
}

/// Outcome of [`Database::search_for_locations`](crate::db::Database::search_for_locations):
/// deduplicated entries ranked best-first, plus whether any visitor ran into
/// the limit.
#[derive(Debug, Clone, Default)]
pub struct LocationSearchResult {
    pub results: Vec<SearchResultEntry>,
    pub limit_reached: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_splits_on_whitespace_and_commas() {
        assert_eq!(
            tokenize("Main Street 10, Springfield"),
            vec!["Main", "Street", "10", "Springfield"]
        );
        assert!(tokenize("  ,, ").is_empty());
    }

    #[test]
    fn group_tokens_enumerates_consecutive_slicings() {
        let tokens: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        let slices = group_tokens(&tokens, 2);
        assert_eq!(
            slices,
            vec![
                vec!["a".to_string(), "b c".to_string()],
                vec!["a b".to_string(), "c".to_string()],
            ]
        );
        assert_eq!(group_tokens(&tokens, 3).len(), 1);
        assert_eq!(group_tokens(&tokens, 1), vec![vec!["a b c".to_string()]]);
    }

    #[test]
    fn three_token_input_produces_expected_slicing() {
        let mut search = LocationSearch::new(50);
        search.initialize_search_entries("Main Street 10 Springfield");

        assert!(search.searches.iter().any(|entry| {
            entry.location_pattern == "Main Street"
                && entry.address_pattern == "10"
                && entry.admin_region_pattern == "Springfield"
        }));
        // The whole text is also tried as a single region pattern.
        assert!(search
            .searches
            .iter()
            .any(|entry| entry.admin_region_pattern == "Main Street 10 Springfield"
                && entry.location_pattern.is_empty()));
    }

    #[test]
    fn match_semantics_are_exact_vs_substring() {
        assert_eq!(match_name("Springfield", "Springfield"), (true, true));
        assert_eq!(match_name("Springfield", "Spring"), (false, true));
        assert_eq!(match_name("West Springfield", "Spring"), (false, true));
        assert_eq!(match_name("Springfield", "field "), (false, false));
    }

    #[test]
    fn quality_ordering_prefers_matches() {
        assert!(MatchQuality::Match < MatchQuality::Candidate);
        assert!(MatchQuality::Candidate < MatchQuality::None);
    }
}
