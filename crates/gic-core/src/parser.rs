//! Location qualifier parser: resolves free-form phrases like "in the bubble"
//! or "inside 500 from Colonia" into `(origin system name, radius LY)`.

const BUBBLE_RADIUS: f64 = 1000.0;
const GALAXY_RADIUS: f64 = 1_000_000.0;
const COLONIA_RADIUS: f64 = 500.0;
const NEAR_RADIUS: f64 = 100.0;
const CLAMP_MIN: f64 = 0.01;
const CLAMP_MAX: f64 = 100_000.0;

/// A resolved location qualifier.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationQualifier {
    pub origin: String,
    pub radius_ly: f64,
}

impl LocationQualifier {
    fn new(origin: impl Into<String>, radius_ly: f64) -> Self {
        Self { origin: origin.into(), radius_ly }
    }
}

/// Parses free-form text into a `LocationQualifier`, or `None` if unrecognized.
///
/// Patterns are tried in the order given in the spec; the first match wins.
pub fn parse(text: &str) -> Option<LocationQualifier> {
    let normalized = collapse_whitespace(&text.to_lowercase());

    if is_bubble(&normalized) {
        return Some(LocationQualifier::new("Sol", BUBBLE_RADIUS));
    }
    if normalized == "in the galaxy" {
        return Some(LocationQualifier::new("Sol", GALAXY_RADIUS));
    }
    if normalized == "at colonia" {
        return Some(LocationQualifier::new("Colonia", COLONIA_RADIUS));
    }
    if let Some(name) = normalized.strip_prefix("near ") {
        let name = name.trim();
        if !name.is_empty() {
            return Some(LocationQualifier::new(title_case(name), NEAR_RADIUS));
        }
    }
    if let Some(rest) = normalized.strip_prefix("inside ") {
        return parse_inside(rest);
    }

    None
}

/// Matches "in the bub(b)le", i.e. both "in the buble" and "in the bubble".
fn is_bubble(normalized: &str) -> bool {
    normalized == "in the bubble" || normalized == "in the buble"
}

fn parse_inside(rest: &str) -> Option<LocationQualifier> {
    let mut parts = rest.splitn(2, " from ");
    let number = parts.next()?.trim();
    let name = parts.next()?.trim();
    if name.is_empty() {
        return None;
    }

    let n: f64 = number.parse().ok()?;
    if n <= CLAMP_MIN {
        return None;
    }
    let radius = n.clamp(CLAMP_MIN, CLAMP_MAX);
    Some(LocationQualifier::new(title_case(name), radius))
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Restores a plausible display-case system name from lowercased input
/// (e.g. "colonia" -> "Colonia", "alpha centauri" -> "Alpha Centauri").
fn title_case(s: &str) -> String {
    s.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bubble_is_case_insensitive() {
        let a = parse("IN THE BUBBLE").unwrap();
        let b = parse("in the bubble").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, LocationQualifier::new("Sol", 1000.0));
    }

    #[test]
    fn galaxy_resolves_to_sol_with_million_ly() {
        let q = parse("in the galaxy").unwrap();
        assert_eq!(q, LocationQualifier::new("Sol", 1_000_000.0));
    }

    #[test]
    fn at_colonia() {
        let q = parse("at Colonia").unwrap();
        assert_eq!(q, LocationQualifier::new("Colonia", 500.0));
    }

    #[test]
    fn near_name() {
        let q = parse("near Deciat").unwrap();
        assert_eq!(q, LocationQualifier::new("Deciat", 100.0));
    }

    #[test]
    fn inside_n_from_name() {
        let q = parse("inside 500 from Colonia").unwrap();
        assert_eq!(q, LocationQualifier::new("Colonia", 500.0));
    }

    #[test]
    fn inside_clamps_upper_bound() {
        let q = parse("inside 200000 from Sol").unwrap();
        assert_eq!(q, LocationQualifier::new("Sol", 100_000.0));
    }

    #[test]
    fn inside_at_or_below_min_is_unrecognized() {
        assert!(parse("inside 0.01 from Sol").is_none());
        assert!(parse("inside 0 from Sol").is_none());
        assert!(parse("inside -5 from Sol").is_none());
    }

    #[test]
    fn garbage_is_unrecognized() {
        assert!(parse("garbage").is_none());
    }

    #[test]
    fn extra_whitespace_is_tolerated() {
        let q = parse("  inside   500   from   Colonia  ").unwrap();
        assert_eq!(q, LocationQualifier::new("Colonia", 500.0));
    }
}
