use std::collections::BTreeMap;

use tracing::debug;

/// Deterministic tier selection from normalized slots. The tier is a
/// pure function of product and slot values so repeated turns with the
/// same answers always recommend the same plan. `None` means the product
/// carries fixed messaging instead of a tiered plan.
pub fn select_tier(product: &str, slots: &BTreeMap<String, String>) -> Option<&'static str> {
    let get = |name: &str| slots.get(name).map(String::as_str).unwrap_or("");
    let parse = |name: &str| get(name).parse::<i64>().ok();

    let tier = match product.to_ascii_lowercase().as_str() {
        "travel" => Some("Gold"),
        "maid" => match get("coverage_above_mom_minimum") {
            "yes" => Some("Premier"),
            _ => Some("Enhanced"),
        },
        "personalaccident" => match parse("desired_amount") {
            Some(amount) if (500..=1000).contains(&amount) => Some("Silver"),
            Some(amount) if (1001..=2500).contains(&amount) => Some("Premier"),
            Some(amount) if (2501..=3500).contains(&amount) => Some("Platinum"),
            _ => Some("Premier"),
        },
        "home" => match parse("coverage_amount") {
            Some(amount) if amount <= 100_000 => Some("Silver"),
            Some(amount) if amount <= 200_000 => Some("Gold"),
            Some(_) => Some("Platinum"),
            None => Some("Gold"),
        },
        "early" => None,
        "fraud" => match get("purchase_frequency") {
            "daily" => Some("Platinum"),
            _ => Some("Gold"),
        },
        "hospital" => {
            let choices = [100_i64, 200, 300];
            let value = parse("coverage").filter(|value| *value > 0).unwrap_or(200);
            let nearest = choices
                .into_iter()
                .min_by_key(|choice| (choice - value).abs())
                .unwrap_or(200);
            match nearest {
                100 => Some("Silver"),
                300 => Some("Titanium"),
                _ => Some("Premier"),
            }
        }
        "car" => Some("Standard"),
        _ => None,
    };

    debug!(product, ?tier, "tier selected");
    tier
}
