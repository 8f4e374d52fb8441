//! Choosing among ranked alternatives: price tiers and recipients

pub mod price;
pub mod recipient;

pub use price::{parse_price, parse_tiers, select_best_price, PriceTier, RawTier};
pub use recipient::{select_recipients, RecipientCandidate, RecipientOutcome, RecipientToggle};
