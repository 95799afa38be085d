//! Aggregate → medal classification.
//!
//! Precedence is first match in the order the bands are given: once a band
//! contains the aggregate, later bands are not consulted, even when their
//! ranges are narrower. Callers pass [`MedalBandRegistry::active_bands_ordered`].
//!
//! [`MedalBandRegistry::active_bands_ordered`]: super::bands::MedalBandRegistry::active_bands_ordered

use super::domain::MedalBand;

/// First active band containing `aggregate`, if any.
pub fn matching_band(aggregate: Option<f64>, bands: &[MedalBand]) -> Option<&MedalBand> {
    let aggregate = aggregate?;
    bands
        .iter()
        .filter(|band| band.active)
        .find(|band| band.contains(aggregate))
}

/// Medal label for `aggregate`, or `None` when it is absent or no band matches.
pub fn classify<'a>(aggregate: Option<f64>, bands: &'a [MedalBand]) -> Option<&'a str> {
    matching_band(aggregate, bands).map(|band| band.label.as_str())
}
