use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Rule-defined extremes for qualitative integer phrases
/// ("as high as possible" maps to `high`, "minimum" to `low`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Qualitative {
    pub low: i64,
    pub high: i64,
}

/// Typed validation rule for one slot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SlotRule {
    Enum {
        values: Vec<String>,
    },
    Integer {
        #[serde(default)]
        allowed_values: Vec<i64>,
        #[serde(default)]
        min: Option<i64>,
        #[serde(default)]
        max: Option<i64>,
        #[serde(default)]
        qualitative: Option<Qualitative>,
    },
    Set {
        values: Vec<String>,
        /// canonical value -> trigger keywords beyond the value itself
        #[serde(default)]
        synonyms: BTreeMap<String, Vec<String>>,
    },
    Age {
        bands: Vec<String>,
        #[serde(default)]
        numeric_min: Option<i64>,
        #[serde(default)]
        numeric_max: Option<i64>,
    },
    Location,
    FreeText,
}

fn default_priority() -> u32 {
    999
}

/// A slot rule plus its ask-ordering priority (lower asks first;
/// undeclared slots sort last).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SlotRuleEntry {
    #[serde(flatten)]
    pub rule: SlotRule,
    #[serde(default = "default_priority")]
    pub priority: u32,
}

impl SlotRuleEntry {
    pub fn new(rule: SlotRule, priority: u32) -> Self {
        Self { rule, priority }
    }
}

pub type ProductRules = BTreeMap<String, SlotRuleEntry>;

/// Per-product typed rule table, normally loaded from config.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleTable {
    pub products: BTreeMap<String, ProductRules>,
}

impl RuleTable {
    pub fn for_product(&self, product: &str) -> Option<&ProductRules> {
        self.products.get(&product.to_ascii_lowercase())
    }

    pub fn priority(&self, product: &str, slot: &str) -> u32 {
        self.for_product(product)
            .and_then(|rules| rules.get(slot))
            .map(|entry| entry.priority)
            .unwrap_or_else(default_priority)
    }
}

/// Outcome of running the rule interpreter over a slot map.
///
/// `slots` holds only values that satisfy their rule (normalized);
/// `guidance` holds a reusable re-ask message per dropped slot.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub slots: BTreeMap<String, String>,
    pub guidance: BTreeMap<String, String>,
    pub dropped: Vec<String>,
}

impl ValidationReport {
    pub fn changed(&self, original: &BTreeMap<String, String>) -> bool {
        self.slots != *original
    }
}

/// Generic interpreter over the rule table. Values outside their domain
/// are dropped, never clamped; each drop produces user guidance that is
/// reused verbatim on the next re-ask. Re-validating an already valid
/// map is a no-op.
pub fn validate_slots(rules: &ProductRules, slots: &BTreeMap<String, String>) -> ValidationReport {
    let mut report = ValidationReport { slots: slots.clone(), ..Default::default() };

    for (slot_name, entry) in rules {
        let Some(raw) = slots.get(slot_name) else { continue };
        let text = raw.trim();
        if text.is_empty() {
            drop_slot(&mut report, slot_name, empty_guidance(slot_name, &entry.rule));
            continue;
        }

        match &entry.rule {
            SlotRule::Enum { values } => match normalize_enum(slot_name, text, values) {
                Some(normalized) => {
                    report.slots.insert(slot_name.clone(), normalized);
                }
                None => {
                    let label = slot_label(slot_name);
                    drop_slot(
                        &mut report,
                        slot_name,
                        format!(
                            "Your last answer for '{label}' was not one of the accepted options. \
                             Please reply with ONE of: {}.",
                            values.join(", ")
                        ),
                    );
                }
            },
            SlotRule::Integer { allowed_values, min, max, qualitative } => {
                let label = slot_label(slot_name);
                let Some(value) = parse_integer(text, *qualitative) else {
                    drop_slot(
                        &mut report,
                        slot_name,
                        format!(
                            "I couldn't detect a valid number for '{label}'. \
                             Please reply with digits only (for example: 14, 26, 500, 2000)."
                        ),
                    );
                    continue;
                };
                if !allowed_values.is_empty() {
                    if allowed_values.contains(&value) {
                        report.slots.insert(slot_name.clone(), value.to_string());
                    } else {
                        let allowed = allowed_values
                            .iter()
                            .map(i64::to_string)
                            .collect::<Vec<_>>()
                            .join(", ");
                        drop_slot(
                            &mut report,
                            slot_name,
                            format!(
                                "{value} is not an accepted value for '{label}'. \
                                 Please reply with ONE of: {allowed}."
                            ),
                        );
                    }
                } else if min.is_some_and(|bound| value < bound)
                    || max.is_some_and(|bound| value > bound)
                {
                    drop_slot(
                        &mut report,
                        slot_name,
                        format!(
                            "{value} is outside the acceptable range for '{label}'. \
                             Please provide a number {}.",
                            range_phrase(*min, *max)
                        ),
                    );
                } else {
                    report.slots.insert(slot_name.clone(), value.to_string());
                }
            }
            SlotRule::Set { values, synonyms } => {
                match normalize_set(text, values, synonyms) {
                    Some(normalized) => {
                        report.slots.insert(slot_name.clone(), normalized);
                    }
                    None => {
                        let label = slot_label(slot_name);
                        drop_slot(
                            &mut report,
                            slot_name,
                            format!(
                                "I didn't catch any clear selections for '{label}'. \
                                 Please mention at least one of: {}.",
                                values.join(", ")
                            ),
                        );
                    }
                }
            }
            SlotRule::Age { bands, numeric_min, numeric_max } => {
                let label = slot_label(slot_name);
                let lowered = text.to_ascii_lowercase();
                if bands.iter().any(|band| band.to_ascii_lowercase() == lowered) {
                    report.slots.insert(slot_name.clone(), text.to_owned());
                    continue;
                }
                let Some(value) = parse_integer(text, None) else {
                    drop_slot(
                        &mut report,
                        slot_name,
                        format!(
                            "I couldn't detect a valid age for '{label}'. \
                             Please reply with a whole number of years (for example: 30)."
                        ),
                    );
                    continue;
                };
                if numeric_min.is_some_and(|bound| value < bound)
                    || numeric_max.is_some_and(|bound| value > bound)
                {
                    drop_slot(
                        &mut report,
                        slot_name,
                        format!(
                            "{value} is outside the acceptable age range for '{label}'. \
                             Please provide an age {}.",
                            range_phrase(*numeric_min, *numeric_max)
                        ),
                    );
                } else {
                    report.slots.insert(slot_name.clone(), value.to_string());
                }
            }
            SlotRule::Location | SlotRule::FreeText => {
                let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
                report.slots.insert(slot_name.clone(), normalized);
            }
        }
    }

    if report.changed(slots) {
        debug!(dropped = ?report.dropped, "slot validation adjusted slot map");
    }
    report
}

fn drop_slot(report: &mut ValidationReport, slot_name: &str, guidance: String) {
    report.slots.remove(slot_name);
    report.guidance.insert(slot_name.to_owned(), guidance);
    report.dropped.push(slot_name.to_owned());
}

fn empty_guidance(slot_name: &str, rule: &SlotRule) -> String {
    let label = slot_label(slot_name);
    match rule {
        SlotRule::Location => format!(
            "I didn't catch a clear place for '{label}'. \
             Please share a city, region, or country in a few words."
        ),
        _ => format!("I didn't catch any details for '{label}'. Please reply with a short answer."),
    }
}

fn slot_label(slot_name: &str) -> String {
    slot_name.replace('_', " ")
}

fn range_phrase(min: Option<i64>, max: Option<i64>) -> String {
    match (min, max) {
        (Some(low), Some(high)) => format!("between {low} and {high}"),
        (Some(low), None) => format!("of at least {low}"),
        (None, Some(high)) => format!("of at most {high}"),
        (None, None) => "in a sensible range".to_owned(),
    }
}

/// Digits are extracted from free text; a trailing/embedded `k` acts as a
/// thousands multiplier for values under 1000. Qualitative phrases map to
/// the rule-defined extremes when the rule declares them.
fn parse_integer(raw: &str, qualitative: Option<Qualitative>) -> Option<i64> {
    let text = raw.trim().to_ascii_lowercase();
    if text.is_empty() {
        return None;
    }
    let digits: String = text.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        if let Some(extremes) = qualitative {
            const HIGH_MARKERS: [&str; 6] =
                ["higher", "highest", "max", "maximum", "as high as possible", "best coverage"];
            const LOW_MARKERS: [&str; 6] =
                ["lower", "lowest", "min", "minimum", "as low as possible", "budget"];
            if HIGH_MARKERS.iter().any(|marker| text.contains(marker)) {
                return Some(extremes.high);
            }
            if LOW_MARKERS.iter().any(|marker| text.contains(marker)) {
                return Some(extremes.low);
            }
        }
        return None;
    }
    let mut value: i64 = digits.parse().ok()?;
    if text.contains('k') && value < 1000 {
        value *= 1000;
    }
    Some(value)
}

/// Direct match first, then synonym families: generic yes/no, coverage
/// scope, occupational risk, add-on preference, purchase frequency, and
/// scam experience.
fn normalize_enum(slot_name: &str, raw: &str, values: &[String]) -> Option<String> {
    let text = raw.trim().to_ascii_lowercase();
    let allowed: Vec<String> = values.iter().map(|value| value.to_ascii_lowercase()).collect();
    if allowed.contains(&text) {
        return Some(text);
    }

    let pick = |candidate: &str| -> Option<String> {
        allowed.contains(&candidate.to_owned()).then(|| candidate.to_owned())
    };
    let contains_any =
        |markers: &[&str]| markers.iter().any(|marker| text.contains(marker));

    const YES_MARKERS: [&str; 12] = [
        "yes", "yeah", "yep", "yup", "sure", "ok", "okay", "alright", "of course", "absolutely",
        "definitely", "go ahead",
    ];
    const NO_MARKERS: [&str; 10] = [
        "no", "nope", "nah", "not really", "not now", "skip", "pass", "no thanks",
        "not interested", "never",
    ];

    // Yes/no style slots.
    if allowed.iter().all(|value| value == "yes" || value == "no") {
        if contains_any(&YES_MARKERS) {
            return pick("yes");
        }
        if contains_any(&NO_MARKERS) {
            return pick("no");
        }
    }

    if slot_name == "coverage_scope" {
        if contains_any(&["just me", "myself", "for me", "solo", "alone", "only me", "self", "single", "individual"]) {
            return pick("self");
        }
        if contains_any(&["family", "for us", "whole family", "entire family"])
            && !text.contains("group")
        {
            return pick("family");
        }
        if contains_any(&["group of adults", "adult group", "group adults", "friends"]) {
            return pick("group_adults");
        }
        if contains_any(&["group of families", "family group", "multiple families"]) {
            return pick("group_families");
        }
    }

    if slot_name == "risk_level" {
        if text.contains("low") {
            return pick("low");
        }
        if contains_any(&["medium", "mid", "moderate"]) {
            return pick("medium");
        }
        if text.contains("high") {
            return pick("high");
        }
    }

    if slot_name == "add_ons" {
        if contains_any(&YES_MARKERS) || contains_any(&["add-on", "addon", "add ons", "extras"]) {
            return pick("required");
        }
        if contains_any(&NO_MARKERS) || contains_any(&["no extras", "no add"]) {
            return pick("not_required");
        }
    }

    if slot_name == "purchase_frequency" {
        if contains_any(&["everyday", "every day", "daily", "7 days"]) {
            return pick("daily");
        }
        if contains_any(&["once a week", "twice a week", "weekly"]) {
            return pick("weekly");
        }
        if contains_any(&["once a month", "twice a month", "monthly"]) {
            return pick("monthly");
        }
        if contains_any(&["rarely", "seldom", "occasionally", "few times a year"]) {
            return pick("rarely");
        }
    }

    if slot_name == "scam_exp" {
        if contains_any(&["almost", "nearly", "close call"]) {
            return pick("almost");
        }
        if contains_any(&["yes", "yep", "yup", "scammed"]) {
            return pick("yes");
        }
        if contains_any(&NO_MARKERS) {
            return pick("no");
        }
    }

    None
}

/// Keyword → canonical mapping with an "all" shortcut; selections come
/// back comma-separated in the rule's declared order.
fn normalize_set(
    raw: &str,
    values: &[String],
    synonyms: &BTreeMap<String, Vec<String>>,
) -> Option<String> {
    let text = raw.to_ascii_lowercase();
    let mut selected: Vec<&String> = values
        .iter()
        .filter(|value| {
            if text.contains(&value.to_ascii_lowercase()) {
                return true;
            }
            synonyms
                .get(value.as_str())
                .is_some_and(|keywords| {
                    keywords.iter().any(|keyword| text.contains(&keyword.to_ascii_lowercase()))
                })
        })
        .collect();

    if selected.is_empty()
        && ["all", "everything", "both"].iter().any(|keyword| text.contains(keyword))
    {
        selected = values.iter().collect();
    }

    if selected.is_empty() {
        return None;
    }
    Some(selected.iter().map(|value| value.as_str()).collect::<Vec<_>>().join(", "))
}

/// Built-in rule table matching [`crate::catalog::default_catalog`].
pub fn default_rule_table() -> RuleTable {
    let mut products = BTreeMap::new();

    products.insert(
        "travel".to_owned(),
        BTreeMap::from([
            (
                "coverage_scope".to_owned(),
                SlotRuleEntry::new(
                    SlotRule::Enum {
                        values: vec![
                            "self".to_owned(),
                            "family".to_owned(),
                            "group_adults".to_owned(),
                            "group_families".to_owned(),
                        ],
                    },
                    1,
                ),
            ),
            ("destination".to_owned(), SlotRuleEntry::new(SlotRule::Location, 2)),
        ]),
    );

    products.insert(
        "maid".to_owned(),
        BTreeMap::from([
            (
                "duration_of_insurance".to_owned(),
                SlotRuleEntry::new(
                    SlotRule::Integer {
                        allowed_values: vec![14, 26],
                        min: None,
                        max: None,
                        qualitative: None,
                    },
                    1,
                ),
            ),
            ("maid_country".to_owned(), SlotRuleEntry::new(SlotRule::Location, 2)),
            (
                "coverage_above_mom_minimum".to_owned(),
                SlotRuleEntry::new(
                    SlotRule::Enum { values: vec!["yes".to_owned(), "no".to_owned()] },
                    3,
                ),
            ),
            (
                "add_ons".to_owned(),
                SlotRuleEntry::new(
                    SlotRule::Enum {
                        values: vec!["required".to_owned(), "not_required".to_owned()],
                    },
                    4,
                ),
            ),
        ]),
    );

    products.insert(
        "personalaccident".to_owned(),
        BTreeMap::from([
            (
                "coverage_scope".to_owned(),
                SlotRuleEntry::new(
                    SlotRule::Enum { values: vec!["self".to_owned(), "family".to_owned()] },
                    1,
                ),
            ),
            (
                "risk_level".to_owned(),
                SlotRuleEntry::new(
                    SlotRule::Enum {
                        values: vec!["low".to_owned(), "medium".to_owned(), "high".to_owned()],
                    },
                    2,
                ),
            ),
            (
                "desired_amount".to_owned(),
                SlotRuleEntry::new(
                    SlotRule::Integer {
                        allowed_values: Vec::new(),
                        min: Some(500),
                        max: Some(3500),
                        qualitative: Some(Qualitative { low: 500, high: 3500 }),
                    },
                    3,
                ),
            ),
        ]),
    );

    products.insert(
        "home".to_owned(),
        BTreeMap::from([
            (
                "risk_concerns".to_owned(),
                SlotRuleEntry::new(
                    SlotRule::Set {
                        values: vec![
                            "fire".to_owned(),
                            "water damage".to_owned(),
                            "theft".to_owned(),
                        ],
                        synonyms: BTreeMap::from([
                            (
                                "water damage".to_owned(),
                                vec![
                                    "water".to_owned(),
                                    "flood".to_owned(),
                                    "leak".to_owned(),
                                    "pipe burst".to_owned(),
                                ],
                            ),
                            (
                                "theft".to_owned(),
                                vec![
                                    "burglary".to_owned(),
                                    "break-in".to_owned(),
                                    "stolen".to_owned(),
                                ],
                            ),
                        ]),
                    },
                    1,
                ),
            ),
            (
                "coverage_amount".to_owned(),
                SlotRuleEntry::new(
                    SlotRule::Integer {
                        allowed_values: Vec::new(),
                        min: Some(1),
                        max: None,
                        qualitative: None,
                    },
                    2,
                ),
            ),
        ]),
    );

    products.insert(
        "early".to_owned(),
        BTreeMap::from([
            (
                "existing_cover".to_owned(),
                SlotRuleEntry::new(
                    SlotRule::Enum { values: vec!["yes".to_owned(), "no".to_owned()] },
                    1,
                ),
            ),
            (
                "dependants".to_owned(),
                SlotRuleEntry::new(
                    SlotRule::Enum { values: vec!["yes".to_owned(), "no".to_owned()] },
                    2,
                ),
            ),
        ]),
    );

    products.insert(
        "fraud".to_owned(),
        BTreeMap::from([
            (
                "purchase_frequency".to_owned(),
                SlotRuleEntry::new(
                    SlotRule::Enum {
                        values: vec![
                            "daily".to_owned(),
                            "weekly".to_owned(),
                            "monthly".to_owned(),
                            "rarely".to_owned(),
                        ],
                    },
                    1,
                ),
            ),
            (
                "scam_exp".to_owned(),
                SlotRuleEntry::new(
                    SlotRule::Enum {
                        values: vec!["yes".to_owned(), "almost".to_owned(), "no".to_owned()],
                    },
                    2,
                ),
            ),
        ]),
    );

    products.insert(
        "hospital".to_owned(),
        BTreeMap::from([
            (
                "age".to_owned(),
                SlotRuleEntry::new(
                    SlotRule::Age {
                        bands: vec![
                            "below 25".to_owned(),
                            "25-35".to_owned(),
                            "36-45".to_owned(),
                            "above 45".to_owned(),
                        ],
                        numeric_min: Some(18),
                        numeric_max: Some(75),
                    },
                    1,
                ),
            ),
            ("occupation".to_owned(), SlotRuleEntry::new(SlotRule::FreeText, 2)),
            (
                "support".to_owned(),
                SlotRuleEntry::new(
                    SlotRule::Enum { values: vec!["yes".to_owned(), "no".to_owned()] },
                    3,
                ),
            ),
            (
                "coverage".to_owned(),
                SlotRuleEntry::new(
                    SlotRule::Integer {
                        allowed_values: vec![100, 200, 300],
                        min: None,
                        max: None,
                        qualitative: None,
                    },
                    4,
                ),
            ),
        ]),
    );

    RuleTable { products }
}
