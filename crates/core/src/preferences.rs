//! Product listing preferences carried in a client-side cookie.
//!
//! The cookie value is standard base64 of five comma separated fields:
//!
//! ```text
//! pageSize,sortOption,availability,priceFilterFlag,low-high
//! ```
//!
//! Decoding never fails. Anything that is not a well formed, enabled
//! combination falls back to the configured defaults, and the result is
//! flagged so the caller can rewrite the cookie.

use std::fmt;
use std::str::FromStr;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

const FIELD_SEPARATOR: char = ',';
const RANGE_SEPARATOR: char = '-';

/// A preference token that is not part of the closed option set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} option: {value}")]
pub struct UnknownOption {
    kind: &'static str,
    value: String,
}

/// Listing sort order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOption {
    PriceAsc,
    PriceDesc,
    NameAsc,
    NameDesc,
    Newest,
}

impl SortOption {
    /// Every sort order the storefront knows how to run.
    pub const ALL: [Self; 5] = [
        Self::PriceAsc,
        Self::PriceDesc,
        Self::NameAsc,
        Self::NameDesc,
        Self::Newest,
    ];

    /// Cookie and config token.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PriceAsc => "price_asc",
            Self::PriceDesc => "price_desc",
            Self::NameAsc => "name_asc",
            Self::NameDesc => "name_desc",
            Self::Newest => "newest",
        }
    }
}

impl fmt::Display for SortOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortOption {
    type Err = UnknownOption;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|option| option.as_str() == s)
            .ok_or_else(|| UnknownOption {
                kind: "sort",
                value: s.to_owned(),
            })
    }
}

/// Stock availability filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    All,
    InStock,
}

impl Availability {
    /// Every availability filter the storefront knows how to run.
    pub const ALL: [Self; 2] = [Self::All, Self::InStock];

    /// Cookie and config token.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::InStock => "in_stock",
        }
    }
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Availability {
    type Err = UnknownOption;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|option| option.as_str() == s)
            .ok_or_else(|| UnknownOption {
                kind: "availability",
                value: s.to_owned(),
            })
    }
}

/// Inclusive whole-unit price bounds, `low <= high`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PriceRange {
    low: u32,
    high: u32,
}

impl PriceRange {
    /// Returns `None` when `low > high`.
    #[must_use]
    pub const fn new(low: u32, high: u32) -> Option<Self> {
        if low <= high {
            Some(Self { low, high })
        } else {
            None
        }
    }

    #[must_use]
    pub const fn low(&self) -> u32 {
        self.low
    }

    #[must_use]
    pub const fn high(&self) -> u32 {
        self.high
    }
}

/// What the shopper chose for the product listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    pub page_size: u32,
    pub sort: SortOption,
    pub availability: Availability,
    /// `None` when the price filter is switched off.
    pub price_range: Option<PriceRange>,
}

/// The enabled option set, validated once when configuration loads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreferenceOptions {
    page_sizes: Vec<u32>,
    sort_options: Vec<SortOption>,
    availability: Vec<Availability>,
    defaults: Preferences,
}

/// Problems with a configured option set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PreferenceOptionsError {
    #[error("at least one {0} option must be enabled")]
    Empty(&'static str),
    #[error("page size must be positive")]
    ZeroPageSize,
    #[error("default {0} is not among the enabled options")]
    DefaultNotEnabled(&'static str),
}

impl PreferenceOptions {
    /// Build an option set.
    ///
    /// # Errors
    ///
    /// Fails when a list is empty, a page size is zero, or a default is not
    /// among the enabled options.
    pub fn new(
        page_sizes: Vec<u32>,
        sort_options: Vec<SortOption>,
        availability: Vec<Availability>,
        defaults: Preferences,
    ) -> Result<Self, PreferenceOptionsError> {
        if page_sizes.is_empty() {
            return Err(PreferenceOptionsError::Empty("page size"));
        }
        if sort_options.is_empty() {
            return Err(PreferenceOptionsError::Empty("sort"));
        }
        if availability.is_empty() {
            return Err(PreferenceOptionsError::Empty("availability"));
        }
        if page_sizes.contains(&0) {
            return Err(PreferenceOptionsError::ZeroPageSize);
        }
        if !page_sizes.contains(&defaults.page_size) {
            return Err(PreferenceOptionsError::DefaultNotEnabled("page size"));
        }
        if !sort_options.contains(&defaults.sort) {
            return Err(PreferenceOptionsError::DefaultNotEnabled("sort"));
        }
        if !availability.contains(&defaults.availability) {
            return Err(PreferenceOptionsError::DefaultNotEnabled("availability"));
        }

        Ok(Self {
            page_sizes,
            sort_options,
            availability,
            defaults,
        })
    }

    #[must_use]
    pub fn page_sizes(&self) -> &[u32] {
        &self.page_sizes
    }

    #[must_use]
    pub fn sort_options(&self) -> &[SortOption] {
        &self.sort_options
    }

    #[must_use]
    pub fn availability_options(&self) -> &[Availability] {
        &self.availability
    }

    #[must_use]
    pub const fn defaults(&self) -> Preferences {
        self.defaults
    }

    /// Whether every field of `preferences` is an enabled option.
    #[must_use]
    pub fn accepts(&self, preferences: &Preferences) -> bool {
        self.page_sizes.contains(&preferences.page_size)
            && self.sort_options.contains(&preferences.sort)
            && self.availability.contains(&preferences.availability)
    }
}

/// Result of [`decode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedPreferences {
    pub preferences: Preferences,
    /// Set when the cookie was missing or rejected.
    pub is_default: bool,
}

/// Encode preferences into a cookie value.
#[must_use]
pub fn encode(preferences: &Preferences) -> String {
    let (flag, range) = preferences
        .price_range
        .map_or((0, PriceRange { low: 0, high: 0 }), |range| (1, range));
    let raw = format!(
        "{page_size}{FIELD_SEPARATOR}{sort}{FIELD_SEPARATOR}{availability}{FIELD_SEPARATOR}{flag}{FIELD_SEPARATOR}{low}{RANGE_SEPARATOR}{high}",
        page_size = preferences.page_size,
        sort = preferences.sort,
        availability = preferences.availability,
        low = range.low,
        high = range.high,
    );
    STANDARD.encode(raw)
}

/// Decode a cookie value, falling back to the configured defaults.
#[must_use]
pub fn decode(cookie: Option<&str>, options: &PreferenceOptions) -> DecodedPreferences {
    match cookie.and_then(|value| parse(value, options)) {
        Some(preferences) => DecodedPreferences {
            preferences,
            is_default: false,
        },
        None => DecodedPreferences {
            preferences: options.defaults,
            is_default: true,
        },
    }
}

fn parse(cookie: &str, options: &PreferenceOptions) -> Option<Preferences> {
    let bytes = STANDARD.decode(cookie.trim()).ok()?;
    let text = String::from_utf8(bytes).ok()?;

    let mut fields = text.split(FIELD_SEPARATOR);
    let page_size = fields.next()?.parse::<u32>().ok()?;
    let sort = fields.next()?.parse::<SortOption>().ok()?;
    let availability = fields.next()?.parse::<Availability>().ok()?;
    let flag = fields.next()?;
    let range = parse_range(fields.next()?)?;
    if fields.next().is_some() {
        return None;
    }

    let price_range = match flag {
        "0" => None,
        "1" => Some(range),
        _ => return None,
    };

    let preferences = Preferences {
        page_size,
        sort,
        availability,
        price_range,
    };
    options.accepts(&preferences).then_some(preferences)
}

fn parse_range(raw: &str) -> Option<PriceRange> {
    let (low, high) = raw.split_once(RANGE_SEPARATOR)?;
    PriceRange::new(low.parse().ok()?, high.parse().ok()?)
}
