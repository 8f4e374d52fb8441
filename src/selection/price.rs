//! Price tier selection
//!
//! Tiers outside the configured price window are never chosen, even when
//! nothing else is on offer. Among the rest, the priority table decides:
//! the first table entry whose name occurs in the tier text gives its rank,
//! lower rank wins, and ties keep page order.

use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, warn};

use crate::config::{PriceRange, PriorityEntry};
use crate::error::{Error, Result};

/// Rank given to tiers that match no priority entry
pub const UNRANKED: u32 = 999;

/// A price option as scraped from the item page
#[derive(Debug, Clone, PartialEq)]
pub struct RawTier {
    /// Full tier label, e.g. "VIP 内场 ¥880"
    pub text: String,
    /// Price label, e.g. "¥880"
    pub value_text: String,
}

/// A purchasable price option with its computed rank
#[derive(Debug, Clone, PartialEq)]
pub struct PriceTier {
    pub text: String,
    pub value: f64,
    pub rank: u32,
    /// Position on the page, used to click the tier
    pub index: usize,
}

impl PriceTier {
    /// Unranked tier at `index`
    pub fn new(text: impl Into<String>, value: f64, index: usize) -> Self {
        Self {
            text: text.into(),
            value,
            rank: UNRANKED,
            index,
        }
    }
}

fn price_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+(?:\.\d+)?").expect("valid price regex"))
}

/// Parse a displayed price. Ranges like "¥180-880" yield the lower bound.
pub fn parse_price(text: &str) -> Result<f64> {
    let cleaned = text.replace(',', "");
    let m = price_regex()
        .find(&cleaned)
        .ok_or_else(|| Error::Parse(format!("no price in '{}'", text.trim())))?;

    m.as_str()
        .parse::<f64>()
        .map_err(|e| Error::Parse(format!("bad price '{}': {}", m.as_str(), e)))
}

/// Convert scraped tiers, dropping the ones whose price can't be read
pub fn parse_tiers(raw: &[RawTier]) -> Vec<PriceTier> {
    raw.iter()
        .enumerate()
        .filter_map(|(index, tier)| match parse_price(&tier.value_text) {
            Ok(value) => Some(PriceTier::new(tier.text.trim(), value, index)),
            Err(e) => {
                warn!("Skipping price tier '{}': {}", tier.text.trim(), e);
                None
            }
        })
        .collect()
}

/// Rank of the first priority entry contained in `text`, else [`UNRANKED`]
pub fn rank_for(text: &str, priority: &[PriorityEntry]) -> u32 {
    priority
        .iter()
        .find(|entry| text.contains(entry.name.as_str()))
        .map(|entry| entry.rank)
        .unwrap_or(UNRANKED)
}

/// Pick the best tier within `window` according to `priority`.
///
/// Returns `None` when no tier is in the window.
pub fn select_best_price(
    tiers: &[PriceTier],
    window: &PriceRange,
    priority: &[PriorityEntry],
) -> Option<PriceTier> {
    let mut candidates: Vec<PriceTier> = tiers
        .iter()
        .filter(|tier| window.contains(tier.value))
        .map(|tier| PriceTier {
            rank: rank_for(&tier.text, priority),
            ..tier.clone()
        })
        .collect();

    if candidates.is_empty() {
        if !tiers.is_empty() {
            debug!(
                "None of {} tiers within [{}, {}]",
                tiers.len(),
                window.min,
                window.max
            );
        }
        return None;
    }

    // Vec::sort_by_key is stable: equal ranks keep page order
    candidates.sort_by_key(|tier| tier.rank);
    candidates.into_iter().next()
}
