// ===============================
// src/classifier.rs
// ===============================
use crate::domain::{ByCategory, Category, ConsideringAction, Position};

/// Category of a single position: sign of the quantity when held,
/// otherwise the stated intent.
pub fn categorize(position: &Position) -> Category {
    match position.quantity {
        Some(q) if q > 0 => Category::Holding,
        Some(q) if q < 0 => Category::ShortSelling,
        _ => match position.considering_action {
            ConsideringAction::Buy => Category::ConsideringBuy,
            ConsideringAction::ShortSell => Category::ConsideringShortSell,
        },
    }
}

/// Split positions into the four buckets, keeping input order within each.
pub fn categorize_all(positions: &[Position]) -> ByCategory<Vec<Position>> {
    let mut out: ByCategory<Vec<Position>> = ByCategory::default();
    for p in positions {
        out.get_mut(categorize(p)).push(p.clone());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<Position> {
        vec![
            Position::new("A").with_quantity(100),
            Position::new("B").with_quantity(-50),
            Position::new("C"),
            Position::new("D").with_considering_action(ConsideringAction::ShortSell),
            Position::new("E").with_quantity(0),
            Position::new("F")
                .with_quantity(0)
                .with_considering_action(ConsideringAction::ShortSell),
            Position::new("G").with_quantity(1),
            Position::new("H").with_quantity(-1).with_considering_action(ConsideringAction::Buy),
        ]
    }

    fn symbols(v: &[Position]) -> Vec<&str> {
        v.iter().map(|p| p.symbol.as_str()).collect()
    }

    #[test]
    fn buckets_by_quantity_sign_then_intent() {
        let out = categorize_all(&sample());
        assert_eq!(symbols(&out.holding), ["A", "G"]);
        assert_eq!(symbols(&out.short_selling), ["B", "H"]);
        assert_eq!(symbols(&out.considering_buy), ["C", "E"]);
        assert_eq!(symbols(&out.considering_short_sell), ["D", "F"]);
    }

    #[test]
    fn buckets_partition_the_input() {
        let input = sample();
        let out = categorize_all(&input);

        let mut seen: Vec<&str> = out.iter().flat_map(|(_, v)| symbols(v)).collect();
        seen.sort_unstable();
        let mut expected = symbols(&input);
        expected.sort_unstable();
        assert_eq!(seen, expected);

        for p in &input {
            let hits = out.iter().filter(|(_, v)| v.contains(p)).count();
            assert_eq!(hits, 1, "{} must be in exactly one bucket", p.symbol);
            assert!(out.get(categorize(p)).contains(p));
        }
    }

    #[test]
    fn empty_input_still_has_all_keys() {
        let out = categorize_all(&[]);
        assert_eq!(out.iter().count(), 4);
        assert!(out.iter().all(|(_, v)| v.is_empty()));
    }
}
