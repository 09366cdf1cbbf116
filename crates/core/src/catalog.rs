use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Canned aside triggered when a keyword appears while a slot is collected.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AsideResponse {
    pub trigger: String,
    pub response: String,
}

/// Per-slot catalog entry: wording inputs for the slot engine.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotSpec {
    pub description: String,
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub exceptions: Vec<AsideResponse>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDefinition {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub required_slots: Vec<String>,
    #[serde(default)]
    pub slots: BTreeMap<String, SlotSpec>,
}

/// Source of truth for products, aliases, required slots, and canned copy.
///
/// Keys are normalized (lowercase) product keys; `resolve` maps display
/// names and aliases back onto them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCatalog {
    pub products: BTreeMap<String, ProductDefinition>,
}

impl ProductCatalog {
    pub fn get(&self, key: &str) -> Option<&ProductDefinition> {
        self.products.get(&key.to_ascii_lowercase())
    }

    /// Normalize a product mention to a catalog key, via key, display
    /// name, or alias. Returns `None` for unknown mentions.
    pub fn resolve(&self, mention: &str) -> Option<String> {
        let cleaned = mention.trim().to_ascii_lowercase();
        if cleaned.is_empty() {
            return None;
        }
        if self.products.contains_key(&cleaned) {
            return Some(cleaned);
        }
        for (key, product) in &self.products {
            if product.name.to_ascii_lowercase() == cleaned {
                return Some(key.clone());
            }
            if product.aliases.iter().any(|alias| alias.to_ascii_lowercase() == cleaned) {
                return Some(key.clone());
            }
        }
        None
    }

    pub fn required_slots(&self, key: &str) -> &[String] {
        self.get(key).map(|product| product.required_slots.as_slice()).unwrap_or(&[])
    }

    /// Comma-separated display names, for product clarification questions.
    pub fn display_names(&self) -> String {
        self.products.values().map(|product| product.name.as_str()).collect::<Vec<_>>().join(", ")
    }

    /// First aside whose trigger appears in `text`, checked across every
    /// required slot of the product.
    pub fn matching_aside(&self, key: &str, text: &str) -> Option<(String, AsideResponse)> {
        let product = self.get(key)?;
        let lowered = text.to_ascii_lowercase();
        for slot_name in &product.required_slots {
            let Some(spec) = product.slots.get(slot_name) else { continue };
            for aside in &spec.exceptions {
                if lowered.contains(&aside.trigger.to_ascii_lowercase()) {
                    return Some((slot_name.clone(), aside.clone()));
                }
            }
        }
        None
    }
}

/// Built-in catalog covering the supported product lines. A deployment
/// normally overrides this from config; tests and defaults use it as-is.
pub fn default_catalog() -> ProductCatalog {
    let mut products = BTreeMap::new();

    products.insert(
        "travel".to_owned(),
        ProductDefinition {
            name: "Travel".to_owned(),
            aliases: vec![
                "travel protect360".to_owned(),
                "travel protect 360".to_owned(),
                "travel protect".to_owned(),
            ],
            required_slots: vec!["coverage_scope".to_owned(), "destination".to_owned()],
            slots: BTreeMap::from([
                (
                    "coverage_scope".to_owned(),
                    SlotSpec {
                        description: "Coverage for self, family, a group of adults, or a group of families.".to_owned(),
                        question: Some(
                            "Who will be covered on this trip? Is it just yourself, your family, a group of adults, or a group of families?".to_owned(),
                        ),
                        exceptions: Vec::new(),
                    },
                ),
                (
                    "destination".to_owned(),
                    SlotSpec {
                        description: "Country the user is travelling to.".to_owned(),
                        question: Some("Which country will you be traveling to?".to_owned()),
                        exceptions: Vec::new(),
                    },
                ),
            ]),
        },
    );

    products.insert(
        "maid".to_owned(),
        ProductDefinition {
            name: "Maid".to_owned(),
            aliases: vec![
                "maid protect360".to_owned(),
                "maid protect 360".to_owned(),
                "helper insurance".to_owned(),
            ],
            required_slots: vec![
                "duration_of_insurance".to_owned(),
                "maid_country".to_owned(),
                "coverage_above_mom_minimum".to_owned(),
                "add_ons".to_owned(),
            ],
            slots: BTreeMap::from([
                (
                    "duration_of_insurance".to_owned(),
                    SlotSpec {
                        description: "Policy duration (14 or 26 months).".to_owned(),
                        question: None,
                        exceptions: Vec::new(),
                    },
                ),
                (
                    "maid_country".to_owned(),
                    SlotSpec {
                        description: "Helper's country of origin (country name only).".to_owned(),
                        question: None,
                        exceptions: Vec::new(),
                    },
                ),
                (
                    "coverage_above_mom_minimum".to_owned(),
                    SlotSpec {
                        description: "Whether coverage beyond the MOM minimum is wanted (yes/no).".to_owned(),
                        question: None,
                        exceptions: Vec::new(),
                    },
                ),
                (
                    "add_ons".to_owned(),
                    SlotSpec {
                        description: "Whether optional add-on coverages are wanted (required/not_required).".to_owned(),
                        question: None,
                        exceptions: Vec::new(),
                    },
                ),
            ]),
        },
    );

    products.insert(
        "personalaccident".to_owned(),
        ProductDefinition {
            name: "PersonalAccident".to_owned(),
            aliases: vec![
                "family protect360".to_owned(),
                "family protect 360".to_owned(),
                "family protect".to_owned(),
                "pa insurance".to_owned(),
                "personal accident".to_owned(),
                "pa".to_owned(),
                "accident plan".to_owned(),
            ],
            required_slots: vec![
                "coverage_scope".to_owned(),
                "risk_level".to_owned(),
                "desired_amount".to_owned(),
            ],
            slots: BTreeMap::from([
                (
                    "coverage_scope".to_owned(),
                    SlotSpec {
                        description: "Coverage for yourself or your family.".to_owned(),
                        question: None,
                        exceptions: Vec::new(),
                    },
                ),
                (
                    "risk_level".to_owned(),
                    SlotSpec {
                        description: "Occupational risk level: low, medium, or high.".to_owned(),
                        question: None,
                        exceptions: Vec::new(),
                    },
                ),
                (
                    "desired_amount".to_owned(),
                    SlotSpec {
                        description: "Desired coverage amount between $500 and $3,500.".to_owned(),
                        question: None,
                        exceptions: Vec::new(),
                    },
                ),
            ]),
        },
    );

    products.insert(
        "home".to_owned(),
        ProductDefinition {
            name: "Home".to_owned(),
            aliases: vec![
                "home protect360".to_owned(),
                "home protect 360".to_owned(),
                "home insurance".to_owned(),
            ],
            required_slots: vec!["risk_concerns".to_owned(), "coverage_amount".to_owned()],
            slots: BTreeMap::from([
                (
                    "risk_concerns".to_owned(),
                    SlotSpec {
                        description: "Specific worries such as fire, water damage, or theft.".to_owned(),
                        question: None,
                        exceptions: Vec::new(),
                    },
                ),
                (
                    "coverage_amount".to_owned(),
                    SlotSpec {
                        description: "Estimated total value of renovations, contents and valuables.".to_owned(),
                        question: None,
                        exceptions: Vec::new(),
                    },
                ),
            ]),
        },
    );

    products.insert(
        "early".to_owned(),
        ProductDefinition {
            name: "Early".to_owned(),
            aliases: vec![
                "early protect360".to_owned(),
                "early protect".to_owned(),
                "critical illness".to_owned(),
                "early protect 360".to_owned(),
            ],
            required_slots: vec!["existing_cover".to_owned(), "dependants".to_owned()],
            slots: BTreeMap::from([
                (
                    "existing_cover".to_owned(),
                    SlotSpec {
                        description: "Whether the user already has critical illness coverage (yes/no).".to_owned(),
                        question: Some(
                            "Do you already have any insurance that pays a lump sum if you're diagnosed with a critical illness?".to_owned(),
                        ),
                        exceptions: vec![
                            AsideResponse {
                                trigger: "medical insurance".to_owned(),
                                response: "That's excellent. Medical insurance helps pay your hospital and treatment bills. Critical illness insurance complements it with a cash payout you can use for income replacement, rehabilitation, or expenses hospital plans don't cover.".to_owned(),
                            },
                            AsideResponse {
                                trigger: "young".to_owned(),
                                response: "Serious illnesses can occur at any age. Buying protection earlier often means lower premiums and getting covered before any health issues arise.".to_owned(),
                            },
                            AsideResponse {
                                trigger: "healthy".to_owned(),
                                response: "Serious illnesses can occur at any age. Buying protection earlier often means lower premiums and getting covered before any health issues arise.".to_owned(),
                            },
                        ],
                    },
                ),
                (
                    "dependants".to_owned(),
                    SlotSpec {
                        description: "Whether family members rely on the user's income or care (yes/no).".to_owned(),
                        question: Some(
                            "Do you have family members who rely on your income or care?".to_owned(),
                        ),
                        exceptions: Vec::new(),
                    },
                ),
            ]),
        },
    );

    products.insert(
        "car".to_owned(),
        ProductDefinition {
            name: "Car".to_owned(),
            aliases: vec![
                "car protect360".to_owned(),
                "car protect 360".to_owned(),
                "motor insurance".to_owned(),
            ],
            required_slots: Vec::new(),
            slots: BTreeMap::new(),
        },
    );

    products.insert(
        "fraud".to_owned(),
        ProductDefinition {
            name: "Fraud".to_owned(),
            aliases: vec![
                "fraud protect360".to_owned(),
                "fraud protect".to_owned(),
                "scam protection".to_owned(),
            ],
            required_slots: vec!["purchase_frequency".to_owned(), "scam_exp".to_owned()],
            slots: BTreeMap::from([
                (
                    "purchase_frequency".to_owned(),
                    SlotSpec {
                        description: "How often the user shops online (daily, weekly, monthly, rarely).".to_owned(),
                        question: Some(
                            "How often do you shop online - daily, weekly, or monthly?".to_owned(),
                        ),
                        exceptions: Vec::new(),
                    },
                ),
                (
                    "scam_exp".to_owned(),
                    SlotSpec {
                        description: "Whether the user has experienced or almost fallen for an online scam (yes/almost/no).".to_owned(),
                        question: Some(
                            "Have you ever experienced or nearly fallen for an online scam?".to_owned(),
                        ),
                        exceptions: Vec::new(),
                    },
                ),
            ]),
        },
    );

    products.insert(
        "hospital".to_owned(),
        ProductDefinition {
            name: "Hospital".to_owned(),
            aliases: vec![
                "hospital protect360".to_owned(),
                "hospital protect".to_owned(),
                "hospital cash".to_owned(),
            ],
            required_slots: vec![
                "age".to_owned(),
                "occupation".to_owned(),
                "support".to_owned(),
                "coverage".to_owned(),
            ],
            slots: BTreeMap::from([
                (
                    "age".to_owned(),
                    SlotSpec {
                        description: "User age or age band (below 25, 25-35, 36-45, above 45).".to_owned(),
                        question: None,
                        exceptions: Vec::new(),
                    },
                ),
                (
                    "occupation".to_owned(),
                    SlotSpec {
                        description: "Short occupation description.".to_owned(),
                        question: None,
                        exceptions: Vec::new(),
                    },
                ),
                (
                    "support".to_owned(),
                    SlotSpec {
                        description: "Whether the user supports anyone financially (yes/no).".to_owned(),
                        question: None,
                        exceptions: Vec::new(),
                    },
                ),
                (
                    "coverage".to_owned(),
                    SlotSpec {
                        description: "Desired daily hospital cash (100, 200, or 300).".to_owned(),
                        question: None,
                        exceptions: Vec::new(),
                    },
                ),
            ]),
        },
    );

    ProductCatalog { products }
}
