//! Raw stage-token normalization.
//!
//! The native engines report lifecycle phases as loosely formatted strings
//! – different casing, stray whitespace, sometimes abbreviated. Everything
//! funnels through [`parse_stage`] before the rest of the bridge sees it.

use crate::session::types::VpnStage;

/// Normalize a raw platform stage token into a [`VpnStage`].
///
/// `None`, blank, `"idle"`, and `"invalid"` tokens (case/whitespace
/// insensitive) mean no active session and map to
/// [`VpnStage::Disconnected`]. Any other token resolves to the first stage
/// in declaration order whose canonical name contains it as a substring, so
/// abbreviated or prefixed tokens still land on the right stage. Tokens that
/// match nothing come back as [`VpnStage::Unknown`].
///
/// Total – never fails, never panics.
pub fn parse_stage(raw: Option<&str>) -> VpnStage {
    let token = raw.unwrap_or_default().trim().to_lowercase();
    if token.is_empty() || token == "idle" || token == "invalid" {
        return VpnStage::Disconnected;
    }
    VpnStage::ALL
        .into_iter()
        .find(|stage| stage.name().contains(token.as_str()))
        .unwrap_or(VpnStage::Unknown)
}
