//! Recipient (ticket holder) selection
//!
//! Orders need one named, ID-verified recipient per ticket. Configured names
//! are matched exactly first; when some are missing or refuse to toggle, the
//! remaining slots are filled from the rest of the pool in page order.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::driver::ElementRef;
use crate::error::Result;

/// One entry in the page's recipient list
#[derive(Debug, Clone, PartialEq)]
pub struct RecipientCandidate {
    pub name: String,
    pub selected: bool,
    /// Checkbox element, absent for candidates built outside a page
    pub element: Option<ElementRef>,
}

impl RecipientCandidate {
    pub fn new(name: impl Into<String>, selected: bool) -> Self {
        Self {
            name: name.into(),
            selected,
            element: None,
        }
    }

    pub fn with_element(mut self, element: ElementRef) -> Self {
        self.element = Some(element);
        self
    }
}

/// Interaction primitive used to tick a recipient and read the result back
#[async_trait]
pub trait RecipientToggle: Send {
    async fn toggle(&mut self, candidate: &RecipientCandidate) -> Result<()>;

    async fn is_selected(&mut self, candidate: &RecipientCandidate) -> Result<bool>;
}

/// Result of a selection run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipientOutcome {
    /// Confirmed recipients in the order they were selected
    pub selected: Vec<String>,
    pub required: usize,
}

impl RecipientOutcome {
    pub fn success(&self) -> bool {
        self.selected.len() >= self.required
    }
}

/// Select `required` recipients, preferring `configured` names.
///
/// `candidates` is updated in place with the read-back selection state.
/// Never confirms more than `required` recipients.
pub async fn select_recipients<T>(
    toggle: &mut T,
    candidates: &mut [RecipientCandidate],
    configured: &[String],
    required: usize,
) -> RecipientOutcome
where
    T: RecipientToggle + ?Sized,
{
    // Candidates already handled in this run, confirmed or not
    let mut tried = vec![false; candidates.len()];
    let mut selected: Vec<String> = Vec::with_capacity(required);

    // Exact-match phase
    for name in configured {
        if selected.len() >= required {
            break;
        }

        let wanted = name.trim();
        let Some(idx) = (0..candidates.len())
            .find(|&i| !tried[i] && candidates[i].name.trim() == wanted)
        else {
            warn!("Recipient '{}' not found in the recipient list", wanted);
            continue;
        };

        tried[idx] = true;
        if confirm_selected(toggle, &mut candidates[idx]).await {
            info!("Selected recipient: {}", wanted);
            selected.push(candidates[idx].name.trim().to_string());
        } else {
            warn!("Could not select recipient {}, skipping", wanted);
        }
    }

    // Fill phase
    if selected.len() < required {
        debug!(
            "{} of {} recipients after exact matching, filling from pool",
            selected.len(),
            required
        );

        for idx in 0..candidates.len() {
            if selected.len() >= required {
                break;
            }
            if tried[idx] {
                continue;
            }

            tried[idx] = true;
            if confirm_selected(toggle, &mut candidates[idx]).await {
                info!("Selected additional recipient: {}", candidates[idx].name.trim());
                selected.push(candidates[idx].name.trim().to_string());
            }
        }
    }

    let outcome = RecipientOutcome { selected, required };
    if outcome.success() {
        info!(
            "Selected {} recipient(s): {}",
            outcome.selected.len(),
            outcome.selected.join(", ")
        );
    } else {
        warn!(
            "Not enough recipients: need {}, selected {}",
            required,
            outcome.selected.len()
        );
    }
    outcome
}

/// Tick a candidate if needed and confirm it reads back as selected
async fn confirm_selected<T>(toggle: &mut T, candidate: &mut RecipientCandidate) -> bool
where
    T: RecipientToggle + ?Sized,
{
    // Pre-ticked by the site counts as confirmed
    if candidate.selected {
        return true;
    }

    if let Err(e) = toggle.toggle(candidate).await {
        warn!("Clicking recipient {} failed: {}", candidate.name.trim(), e);
        return false;
    }

    match toggle.is_selected(candidate).await {
        Ok(state) => {
            candidate.selected = state;
            state
        }
        Err(e) => {
            warn!("Reading selection of {} failed: {}", candidate.name.trim(), e);
            false
        }
    }
}
