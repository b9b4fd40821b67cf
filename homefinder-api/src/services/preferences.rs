use serde::Serialize;

/// A favorited property reduced to the dimensions preference inference
/// looks at.
#[derive(Debug, Clone)]
pub struct FavoriteSample {
    pub city: String,
    pub property_type: String,
    pub price: f64,
}

/// Implicit preference profile derived from a user's recent favorites.
///
/// Cities and types are ranked by descending frequency; ties keep first-seen
/// order. An empty sample yields "no preference" on every dimension - the
/// matching engine applies its flat defaults instead of hard-filtering.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferenceProfile {
    pub price_ceiling: Option<f64>,
    pub cities: Vec<String>,
    pub property_types: Vec<String>,
    pub based_on_favorites: usize,
}

/// Derive a preference profile from up to the 10 most recent favorites.
///
/// `explicit_max_price` short-circuits price inference: the stated filter
/// wins, the mean of favorited prices is only used when no filter was given.
pub fn infer(favorites: &[FavoriteSample], explicit_max_price: Option<f64>) -> PreferenceProfile {
    let price_ceiling = explicit_max_price.or_else(|| {
        if favorites.is_empty() {
            None
        } else {
            let total: f64 = favorites.iter().map(|f| f.price).sum();
            Some(total / favorites.len() as f64)
        }
    });

    PreferenceProfile {
        price_ceiling,
        cities: ranked_by_frequency(favorites.iter().map(|f| f.city.as_str())),
        property_types: ranked_by_frequency(favorites.iter().map(|f| f.property_type.as_str())),
        based_on_favorites: favorites.len(),
    }
}

/// Distinct values ordered by descending count. The accumulator is a Vec so
/// insertion order is preserved; the stable sort keeps it for equal counts.
fn ranked_by_frequency<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for value in values {
        match counts.iter_mut().find(|(v, _)| v == value) {
            Some((_, count)) => *count += 1,
            None => counts.push((value.to_string(), 1)),
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts.into_iter().map(|(v, _)| v).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(city: &str, property_type: &str, price: f64) -> FavoriteSample {
        FavoriteSample {
            city: city.into(),
            property_type: property_type.into(),
            price,
        }
    }

    #[test]
    fn empty_favorites_yield_no_preference() {
        let profile = infer(&[], None);
        assert_eq!(profile.price_ceiling, None);
        assert!(profile.cities.is_empty());
        assert!(profile.property_types.is_empty());
        assert_eq!(profile.based_on_favorites, 0);
    }

    #[test]
    fn price_ceiling_is_mean_of_favorited_prices() {
        let favorites = vec![
            sample("Tunis", "apartment", 100_000.0),
            sample("Tunis", "apartment", 200_000.0),
        ];
        let profile = infer(&favorites, None);
        assert_eq!(profile.price_ceiling, Some(150_000.0));
    }

    #[test]
    fn explicit_max_price_wins_over_inference() {
        let favorites = vec![sample("Tunis", "apartment", 100_000.0)];
        let profile = infer(&favorites, Some(80_000.0));
        assert_eq!(profile.price_ceiling, Some(80_000.0));
    }

    #[test]
    fn cities_ranked_by_frequency_with_first_seen_ties() {
        let favorites = vec![
            sample("Sousse", "house", 1.0),
            sample("Tunis", "apartment", 1.0),
            sample("Tunis", "studio", 1.0),
            sample("Sfax", "villa", 1.0),
        ];
        let profile = infer(&favorites, None);
        assert_eq!(profile.cities, vec!["Tunis", "Sousse", "Sfax"]);
    }

    #[test]
    fn types_keep_first_seen_order_on_equal_counts() {
        let favorites = vec![
            sample("Tunis", "villa", 1.0),
            sample("Tunis", "studio", 1.0),
        ];
        let profile = infer(&favorites, None);
        assert_eq!(profile.property_types, vec!["villa", "studio"]);
    }
}
