//! Search candidates and their sale status

use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::config::{PriceRange, SiteConfig};
use crate::error::{Error, Result};
use crate::selection::parse_price;

/// Date format of search result time texts, e.g. `2024.05.01 19:30`
pub const SHOW_DATE_FORMAT: &str = "%Y.%m.%d";

/// One search result as read from the page, before filtering
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawCandidate {
    pub title: String,
    pub venue: String,
    pub time_text: String,
    pub price_text: String,
    pub link: String,
}

/// A search result that passed the date and price filters
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub title: String,
    pub venue: String,
    pub time_text: String,
    pub price_text: String,
    /// Last status text seen for this candidate, updated on every poll
    pub status_text: String,
    pub link: String,
    pub date: NaiveDate,
    pub price: f64,
}

impl Candidate {
    /// Parse and validate a raw search result
    pub fn from_raw(raw: RawCandidate) -> Result<Self> {
        let date = parse_show_date(&raw.time_text)?;
        let price = parse_price(&raw.price_text)?;

        Ok(Self {
            title: raw.title.trim().to_string(),
            venue: raw.venue.trim().to_string(),
            time_text: raw.time_text.trim().to_string(),
            price_text: raw.price_text.trim().to_string(),
            status_text: String::new(),
            link: raw.link.trim().to_string(),
            date,
            price,
        })
    }
}

/// Status of one candidate at one poll
#[derive(Debug, Clone, PartialEq)]
pub struct TicketStatus {
    pub candidate: Candidate,
    pub can_buy: bool,
    pub status_text: String,
}

/// Parse the leading date of a time text. `2024.05.01-05.03 19:30` yields May 1st.
pub fn parse_show_date(time_text: &str) -> Result<NaiveDate> {
    let token = time_text
        .split_whitespace()
        .next()
        .and_then(|t| t.split('-').next())
        .unwrap_or_default();

    NaiveDate::parse_from_str(token, SHOW_DATE_FORMAT)
        .map_err(|e| Error::Parse(format!("bad show date '{}': {}", time_text.trim(), e)))
}

/// Keep the search results that parse and fall inside the date range and price window
pub fn filter_candidates(
    raw: Vec<RawCandidate>,
    date_range: Option<(NaiveDate, NaiveDate)>,
    window: &PriceRange,
) -> Vec<Candidate> {
    let total = raw.len();
    let kept: Vec<Candidate> = raw
        .into_iter()
        .filter_map(|item| {
            let title = item.title.trim().to_string();
            match Candidate::from_raw(item) {
                Ok(c) => Some(c),
                Err(e) => {
                    warn!("Dropping search result '{}': {}", title, e);
                    None
                }
            }
        })
        .filter(|c| match date_range {
            Some((start, end)) => c.date >= start && c.date <= end,
            None => true,
        })
        .filter(|c| window.contains(c.price))
        .collect();

    debug!("{} of {} search results match the filters", kept.len(), total);
    kept
}

/// Status vocabulary of the site
#[derive(Debug, Clone, Default)]
pub struct StatusKeywords {
    pub buy: Vec<String>,
    pub rush: Vec<String>,
    pub sold_out: Vec<String>,
}

impl StatusKeywords {
    pub fn from_site(site: &SiteConfig) -> Self {
        Self {
            buy: site.buy_keywords.clone(),
            rush: site.rush_keywords.clone(),
            sold_out: site.sold_out_keywords.clone(),
        }
    }

    pub fn can_buy(&self, text: &str) -> bool {
        !self.is_sold_out(text) && contains_any(text, &self.buy)
    }

    /// Sale opens imminently
    pub fn is_imminent(&self, text: &str) -> bool {
        contains_any(text, &self.rush)
    }

    pub fn is_sold_out(&self, text: &str) -> bool {
        contains_any(text, &self.sold_out)
    }
}

fn contains_any(text: &str, keywords: &[String]) -> bool {
    keywords
        .iter()
        .any(|k| !k.is_empty() && text.contains(k.as_str()))
}
