use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use homefinder_shared::clients::db::DbPool;
use homefinder_shared::errors::{AppError, AppResult, ErrorCode};
use homefinder_shared::types::auth::UserRole;

use crate::models::{Property, PublicUser, User};
use crate::schema::{favorites, messages, properties, users};
use crate::services::preferences::{self, FavoriteSample, PreferenceProfile};

// -- Buyer-recommendation weights (0-100 total) --
const W_PRICE: f64 = 40.0;
const W_CITY: f64 = 30.0;
const W_TYPE: f64 = 20.0;
const W_ROOMS: f64 = 10.0;
// Defaults when a dimension has no stated preference: absence is not
// penalized to zero.
const PRICE_NO_PREFERENCE: f64 = 20.0;
const ROOMS_PARTIAL: f64 = 5.0;

// -- Potential-buyer weights (independent 3-criterion model) --
const BUYER_W_CITY: i32 = 40;
const BUYER_W_TYPE: i32 = 30;
const BUYER_W_PRICE: i32 = 30;
/// Favorite counts as a price signal when within ±20% of the target.
const BUYER_PRICE_BAND: f64 = 0.20;

const RECOMMENDATION_CAP: usize = 20;
const POTENTIAL_BUYER_CAP: usize = 10;
const SUGGESTION_CAP: usize = 15;

const FAVORITE_SAMPLE_LIMIT: i64 = 10;
const ACTIVITY_SAMPLE_LIMIT: usize = 5;

// ---------------------------------------------------------------------------
// Filters and effective preferences
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuyerFilters {
    pub max_price: Option<f64>,
    pub city: Option<String>,
    #[serde(rename = "type")]
    pub property_type: Option<String>,
    pub min_rooms: Option<i32>,
}

/// The preference set a recommendation run actually scores against:
/// explicit filters where given, inferred profile everywhere else.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectivePreferences {
    pub price_ceiling: Option<f64>,
    pub cities: Vec<String>,
    pub property_types: Vec<String>,
    pub min_rooms: Option<i32>,
    pub based_on_favorites: usize,
}

pub fn effective_preferences(
    filters: &BuyerFilters,
    profile: PreferenceProfile,
) -> EffectivePreferences {
    let cities = match &filters.city {
        Some(city) => vec![city.clone()],
        None => profile.cities,
    };
    let property_types = match &filters.property_type {
        Some(property_type) => vec![property_type.clone()],
        None => profile.property_types,
    };

    EffectivePreferences {
        // `infer` already applied the explicit max price if one was given
        price_ceiling: profile.price_ceiling,
        cities,
        property_types,
        min_rooms: filters.min_rooms,
        based_on_favorites: profile.based_on_favorites,
    }
}

// ---------------------------------------------------------------------------
// Scoring (pure)
// ---------------------------------------------------------------------------

/// 0-100 relevance of a candidate property against a preference set.
///
/// Price (40): full score at or under the ceiling, linear decay past it,
/// floored at 0; a flat 20 when no price preference exists at all.
/// City (30) and type (20): exact set membership, otherwise 0.
/// Rooms (10): full score only when a minimum was stated and met; an
/// unstated or unmet minimum gets partial credit.
pub fn score_property(
    prefs: &EffectivePreferences,
    price: f64,
    city: &str,
    property_type: &str,
    rooms: i32,
) -> f64 {
    let price_score = match prefs.price_ceiling {
        Some(max) if price <= max => W_PRICE,
        Some(max) => (W_PRICE - W_PRICE * (price - max).abs() / max).max(0.0),
        None => PRICE_NO_PREFERENCE,
    };

    let city_score = if prefs.cities.iter().any(|c| c == city) {
        W_CITY
    } else {
        0.0
    };

    let type_score = if prefs.property_types.iter().any(|t| t == property_type) {
        W_TYPE
    } else {
        0.0
    };

    let rooms_score = match prefs.min_rooms {
        Some(min) if rooms >= min => W_ROOMS,
        _ => ROOMS_PARTIAL,
    };

    price_score + city_score + type_score + rooms_score
}

#[derive(Debug, Serialize)]
pub struct ScoredProperty {
    #[serde(flatten)]
    pub property: Property,
    pub match_score: f64,
    pub is_favorite: bool,
}

/// Score, rank and cap buyer recommendations. Properties owned by the
/// requester never appear in the result.
pub fn rank_for_buyer(
    requester_id: Uuid,
    prefs: &EffectivePreferences,
    candidates: Vec<Property>,
    favorite_ids: &HashSet<Uuid>,
) -> Vec<ScoredProperty> {
    let mut scored: Vec<ScoredProperty> = candidates
        .into_iter()
        .filter(|p| p.owner_id != requester_id)
        .map(|property| {
            let match_score = score_property(
                prefs,
                property.price,
                &property.city,
                &property.property_type,
                property.rooms,
            );
            let is_favorite = favorite_ids.contains(&property.id);
            ScoredProperty {
                property,
                match_score,
                is_favorite,
            }
        })
        .collect();

    scored.sort_by(|a, b| {
        b.match_score
            .partial_cmp(&a.match_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.property.created_at.cmp(&a.property.created_at))
    });
    scored.truncate(RECOMMENDATION_CAP);
    scored
}

/// 0-100 fit of a candidate buyer's favorites against a target property.
pub fn score_potential_buyer(
    target_city: &str,
    target_type: &str,
    target_price: f64,
    buyer_favorites: &[FavoriteSample],
) -> i32 {
    let mut score = 0;

    if buyer_favorites.iter().any(|f| f.city == target_city) {
        score += BUYER_W_CITY;
    }
    if buyer_favorites.iter().any(|f| f.property_type == target_type) {
        score += BUYER_W_TYPE;
    }

    let low = target_price * (1.0 - BUYER_PRICE_BAND);
    let high = target_price * (1.0 + BUYER_PRICE_BAND);
    if buyer_favorites.iter().any(|f| f.price >= low && f.price <= high) {
        score += BUYER_W_PRICE;
    }

    score
}

#[derive(Debug, Serialize)]
pub struct PotentialBuyer {
    #[serde(flatten)]
    pub user: PublicUser,
    pub total_favorites: usize,
    pub match_score: i32,
}

/// Rank candidate buyers against a target property. Users with no
/// favorites carry no signal and are excluded from the pool.
pub fn rank_potential_buyers(
    target: &Property,
    candidates: Vec<(PublicUser, Vec<FavoriteSample>)>,
) -> Vec<PotentialBuyer> {
    let mut ranked: Vec<PotentialBuyer> = candidates
        .into_iter()
        .filter(|(_, favorites)| !favorites.is_empty())
        .map(|(user, favorites)| PotentialBuyer {
            match_score: score_potential_buyer(
                &target.city,
                &target.property_type,
                target.price,
                &favorites,
            ),
            total_favorites: favorites.len(),
            user,
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.match_score
            .cmp(&a.match_score)
            .then_with(|| b.total_favorites.cmp(&a.total_favorites))
    });
    ranked.truncate(POTENTIAL_BUYER_CAP);
    ranked
}

// ---------------------------------------------------------------------------
// Smart suggestions (pure part)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceRange {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityInsights {
    pub preferred_city: Option<String>,
    pub preferred_type: Option<String>,
    pub price_range: Option<PriceRange>,
    pub based_on: ActivityCounts,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityCounts {
    pub favorites: usize,
    pub conversations: usize,
}

impl ActivityInsights {
    fn is_empty(&self) -> bool {
        self.preferred_city.is_none() && self.preferred_type.is_none() && self.price_range.is_none()
    }
}

/// Extract top city, top type and the observed price band from the
/// activity sample (recent favorites plus recently messaged-about
/// properties). Mode with first-occurrence tie-break.
pub fn analyze_activity(favorites: &[Property], messaged: &[Property]) -> ActivityInsights {
    let sample: Vec<&Property> = favorites.iter().chain(messaged.iter()).collect();

    let mut city_counts: Vec<(&str, usize)> = Vec::new();
    let mut type_counts: Vec<(&str, usize)> = Vec::new();
    let mut price_range: Option<PriceRange> = None;

    for property in &sample {
        bump(&mut city_counts, &property.city);
        bump(&mut type_counts, &property.property_type);
        price_range = Some(match price_range {
            None => PriceRange { min: property.price, max: property.price },
            Some(range) => PriceRange {
                min: range.min.min(property.price),
                max: range.max.max(property.price),
            },
        });
    }

    ActivityInsights {
        preferred_city: mode(&city_counts),
        preferred_type: mode(&type_counts),
        price_range,
        based_on: ActivityCounts {
            favorites: favorites.len(),
            conversations: messaged.len(),
        },
    }
}

fn bump<'a>(counts: &mut Vec<(&'a str, usize)>, value: &'a str) {
    match counts.iter_mut().find(|(v, _)| *v == value) {
        Some((_, count)) => *count += 1,
        None => counts.push((value, 1)),
    }
}

fn mode(counts: &[(&str, usize)]) -> Option<String> {
    counts
        .iter()
        .max_by(|a, b| a.1.cmp(&b.1).then(Ordering::Greater))
        .map(|(v, _)| v.to_string())
}

/// Filter and order suggestion candidates.
///
/// With an empty activity sample the list is recency-only and unfiltered.
/// Otherwise a candidate qualifies by matching the top city OR top type OR
/// falling inside the observed price band; candidates matching both top
/// city and top type form the priority bucket, recency orders the rest.
pub fn rank_suggestions(insights: &ActivityInsights, candidates: Vec<Property>) -> Vec<Property> {
    let mut suggestions: Vec<Property> = if insights.is_empty() {
        candidates
    } else {
        candidates
            .into_iter()
            .filter(|p| {
                let city_match = insights.preferred_city.as_deref() == Some(p.city.as_str());
                let type_match =
                    insights.preferred_type.as_deref() == Some(p.property_type.as_str());
                let price_match = insights
                    .price_range
                    .as_ref()
                    .is_some_and(|r| p.price >= r.min && p.price <= r.max);
                city_match || type_match || price_match
            })
            .collect()
    };

    suggestions.sort_by(|a, b| {
        priority_bucket(insights, a)
            .cmp(&priority_bucket(insights, b))
            .then_with(|| b.created_at.cmp(&a.created_at))
    });
    suggestions.truncate(SUGGESTION_CAP);
    suggestions
}

fn priority_bucket(insights: &ActivityInsights, property: &Property) -> u8 {
    let city_match = insights.preferred_city.as_deref() == Some(property.city.as_str());
    let type_match = insights.preferred_type.as_deref() == Some(property.property_type.as_str());
    if city_match && type_match {
        1
    } else {
        2
    }
}

// ---------------------------------------------------------------------------
// Service (storage-backed)
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct RecommendationResult {
    pub recommendations: Vec<ScoredProperty>,
    pub preferences: EffectivePreferences,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertySummary {
    pub id: Uuid,
    pub title: String,
    pub city: String,
    #[serde(rename = "type")]
    pub property_type: String,
    pub price: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PotentialBuyersResult {
    pub property: PropertySummary,
    pub potential_buyers: Vec<PotentialBuyer>,
}

#[derive(Debug, Serialize)]
pub struct SuggestionsResult {
    pub suggestions: Vec<Property>,
    pub insights: ActivityInsights,
}

/// Matching engine with an injected pool - constructed once per process,
/// isolated construction in tests.
#[derive(Clone)]
pub struct MatchingService {
    db: DbPool,
}

impl MatchingService {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    /// Ranked property recommendations for a buyer. Read-only; trusts the
    /// caller-supplied identity (the route layer authenticates).
    pub fn recommend_for_buyer(
        &self,
        user_id: Uuid,
        filters: &BuyerFilters,
    ) -> AppResult<RecommendationResult> {
        let mut conn = self.db.get().map_err(|e| AppError::internal(e.to_string()))?;

        let recent_favorites: Vec<(String, String, f64)> = favorites::table
            .inner_join(properties::table)
            .filter(favorites::user_id.eq(user_id))
            .order(favorites::created_at.desc())
            .limit(FAVORITE_SAMPLE_LIMIT)
            .select((properties::city, properties::property_type, properties::price))
            .load(&mut conn)?;

        let samples: Vec<FavoriteSample> = recent_favorites
            .into_iter()
            .map(|(city, property_type, price)| FavoriteSample { city, property_type, price })
            .collect();

        let profile = preferences::infer(&samples, filters.max_price);
        let prefs = effective_preferences(filters, profile);

        let candidates: Vec<Property> = properties::table
            .filter(properties::owner_id.ne(user_id))
            .order(properties::created_at.desc())
            .load(&mut conn)?;

        let favorite_ids: HashSet<Uuid> = favorites::table
            .filter(favorites::user_id.eq(user_id))
            .select(favorites::property_id)
            .load::<Uuid>(&mut conn)?
            .into_iter()
            .collect();

        let recommendations = rank_for_buyer(user_id, &prefs, candidates, &favorite_ids);

        tracing::debug!(
            user_id = %user_id,
            results = recommendations.len(),
            based_on_favorites = prefs.based_on_favorites,
            "buyer recommendations computed"
        );

        Ok(RecommendationResult { recommendations, preferences: prefs })
    }

    /// Candidate buyers for a property the requester owns.
    pub fn find_potential_buyers(
        &self,
        user_id: Uuid,
        property_id: Uuid,
    ) -> AppResult<PotentialBuyersResult> {
        let mut conn = self.db.get().map_err(|e| AppError::internal(e.to_string()))?;

        let property: Property = properties::table
            .find(property_id)
            .first(&mut conn)
            .optional()?
            .ok_or_else(|| AppError::new(ErrorCode::PropertyNotFound, "property not found"))?;

        if property.owner_id != user_id {
            return Err(AppError::new(
                ErrorCode::NotPropertyOwner,
                "you do not own this property",
            ));
        }

        let buyers: Vec<User> = users::table
            .filter(users::role.eq(UserRole::Buyer.to_string()))
            .filter(users::id.ne(user_id))
            .load(&mut conn)?;

        let buyer_ids: Vec<Uuid> = buyers.iter().map(|u| u.id).collect();
        let rows: Vec<(Uuid, (String, String, f64))> = favorites::table
            .inner_join(properties::table)
            .filter(favorites::user_id.eq_any(&buyer_ids))
            .select((
                favorites::user_id,
                (properties::city, properties::property_type, properties::price),
            ))
            .load(&mut conn)?;

        let mut by_user: HashMap<Uuid, Vec<FavoriteSample>> = HashMap::new();
        for (owner, (city, property_type, price)) in rows {
            by_user
                .entry(owner)
                .or_default()
                .push(FavoriteSample { city, property_type, price });
        }

        let candidates: Vec<(PublicUser, Vec<FavoriteSample>)> = buyers
            .into_iter()
            .map(|user| {
                let favorites = by_user.remove(&user.id).unwrap_or_default();
                (PublicUser::from(user), favorites)
            })
            .collect();

        let potential_buyers = rank_potential_buyers(&property, candidates);

        Ok(PotentialBuyersResult {
            property: PropertySummary {
                id: property.id,
                title: property.title,
                city: property.city,
                property_type: property.property_type,
                price: property.price,
            },
            potential_buyers,
        })
    }

    /// Suggestions inferred from recent favorites and conversations.
    pub fn smart_suggestions(&self, user_id: Uuid) -> AppResult<SuggestionsResult> {
        let mut conn = self.db.get().map_err(|e| AppError::internal(e.to_string()))?;

        let recent_favorites: Vec<Property> = favorites::table
            .inner_join(properties::table)
            .filter(favorites::user_id.eq(user_id))
            .order(favorites::created_at.desc())
            .limit(ACTIVITY_SAMPLE_LIMIT as i64)
            .select(properties::all_columns)
            .load(&mut conn)?;

        // Properties the user exchanged messages about, as the non-owner
        // party; deduplicated keeping the most recent mention first.
        let messaged_rows: Vec<Property> = messages::table
            .inner_join(
                properties::table.on(messages::property_id.eq(properties::id.nullable())),
            )
            .filter(messages::sender_id.eq(user_id).or(messages::receiver_id.eq(user_id)))
            .filter(properties::owner_id.ne(user_id))
            .order(messages::created_at.desc())
            .select(properties::all_columns)
            .load(&mut conn)?;

        let mut seen = HashSet::new();
        let messaged: Vec<Property> = messaged_rows
            .into_iter()
            .filter(|p| seen.insert(p.id))
            .take(ACTIVITY_SAMPLE_LIMIT)
            .collect();

        let insights = analyze_activity(&recent_favorites, &messaged);

        let favorite_ids: HashSet<Uuid> = favorites::table
            .filter(favorites::user_id.eq(user_id))
            .select(favorites::property_id)
            .load::<Uuid>(&mut conn)?
            .into_iter()
            .collect();

        let candidates: Vec<Property> = properties::table
            .filter(properties::owner_id.ne(user_id))
            .order(properties::created_at.desc())
            .load::<Property>(&mut conn)?
            .into_iter()
            .filter(|p| !favorite_ids.contains(&p.id))
            .collect();

        let suggestions = rank_suggestions(&insights, candidates);

        Ok(SuggestionsResult { suggestions, insights })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn prefs(
        price_ceiling: Option<f64>,
        cities: &[&str],
        property_types: &[&str],
        min_rooms: Option<i32>,
    ) -> EffectivePreferences {
        EffectivePreferences {
            price_ceiling,
            cities: cities.iter().map(|s| s.to_string()).collect(),
            property_types: property_types.iter().map(|s| s.to_string()).collect(),
            min_rooms,
            based_on_favorites: 0,
        }
    }

    fn property(city: &str, property_type: &str, price: f64, rooms: i32, age_days: i64) -> Property {
        let created = Utc::now() - Duration::days(age_days);
        Property {
            id: Uuid::new_v4(),
            title: format!("{property_type} in {city}"),
            description: "test listing".into(),
            property_type: property_type.into(),
            transaction_type: "sale".into(),
            price,
            surface: 100.0,
            rooms,
            bedrooms: rooms.max(1) - 1,
            bathrooms: 1,
            address: "1 Test St".into(),
            city: city.into(),
            latitude: 36.8,
            longitude: 10.18,
            images: vec![],
            owner_id: Uuid::new_v4(),
            created_at: created,
            updated_at: created,
        }
    }

    fn fav(city: &str, property_type: &str, price: f64) -> FavoriteSample {
        FavoriteSample {
            city: city.into(),
            property_type: property_type.into(),
            price,
        }
    }

    #[test]
    fn price_at_exact_ceiling_scores_full_weight() {
        let p = prefs(Some(200_000.0), &[], &[], None);
        let score = score_property(&p, 200_000.0, "Nowhere", "house", 1);
        // 40 price + 0 city + 0 type + 5 rooms
        assert_eq!(score, 45.0);
    }

    #[test]
    fn missing_price_preference_scores_flat_twenty() {
        let p = prefs(None, &[], &[], None);
        let score = score_property(&p, 999_999.0, "Nowhere", "house", 1);
        assert_eq!(score, 25.0);
    }

    #[test]
    fn price_decay_is_linear_and_floored_at_zero() {
        let p = prefs(Some(100_000.0), &[], &[], None);
        // 50% over: 40 - 40*0.5 = 20
        let halfway = score_property(&p, 150_000.0, "Nowhere", "house", 1);
        assert_eq!(halfway, 25.0);
        // 200% over: decay bottoms out at 0, only rooms credit remains
        let far = score_property(&p, 300_000.0, "Nowhere", "house", 1);
        assert_eq!(far, 5.0);
    }

    #[test]
    fn no_city_or_type_match_contributes_zero() {
        let p = prefs(None, &["Tunis"], &["apartment"], None);
        let score = score_property(&p, 100_000.0, "Sfax", "villa", 1);
        // 20 price default + 0 + 0 + 5 rooms
        assert_eq!(score, 25.0);
    }

    #[test]
    fn stated_and_met_minimum_rooms_scores_full_weight() {
        let p = prefs(None, &[], &[], Some(3));
        assert_eq!(score_property(&p, 1.0, "X", "y", 3), 30.0);
        assert_eq!(score_property(&p, 1.0, "X", "y", 2), 25.0);
    }

    #[test]
    fn tunis_apartment_scenario_components() {
        // Inferred from favorites: avg price 150k, city Tunis, type apartment.
        let p = prefs(Some(150_000.0), &["Tunis"], &["apartment"], None);
        let score = score_property(&p, 150_000.0, "Tunis", "apartment", 3);
        // price 40 + city 30 + type 20 + rooms partial 5
        assert_eq!(score, 95.0);
    }

    #[test]
    fn requester_owned_properties_are_never_recommended() {
        let requester = Uuid::new_v4();
        let mut own = property("Tunis", "apartment", 100_000.0, 3, 1);
        own.owner_id = requester;
        let other = property("Tunis", "apartment", 100_000.0, 3, 2);

        let p = prefs(None, &["Tunis"], &["apartment"], None);
        let ranked = rank_for_buyer(requester, &p, vec![own, other.clone()], &HashSet::new());

        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].property.id, other.id);
    }

    #[test]
    fn score_ties_break_by_most_recent_listing() {
        let requester = Uuid::new_v4();
        let older = property("Tunis", "apartment", 100_000.0, 3, 10);
        let newer = property("Tunis", "apartment", 100_000.0, 3, 1);

        let p = prefs(Some(150_000.0), &["Tunis"], &["apartment"], None);
        let ranked = rank_for_buyer(
            requester,
            &p,
            vec![older.clone(), newer.clone()],
            &HashSet::new(),
        );

        assert_eq!(ranked[0].property.id, newer.id);
        assert_eq!(ranked[1].property.id, older.id);
        assert_eq!(ranked[0].match_score, ranked[1].match_score);
    }

    #[test]
    fn recommendations_are_capped_at_twenty() {
        let requester = Uuid::new_v4();
        let candidates: Vec<Property> = (0..30)
            .map(|i| property("Tunis", "apartment", 100_000.0, 3, i))
            .collect();
        let p = prefs(None, &[], &[], None);
        let ranked = rank_for_buyer(requester, &p, candidates, &HashSet::new());
        assert_eq!(ranked.len(), 20);
    }

    #[test]
    fn favorite_annotation_is_set_from_the_requesters_favorites() {
        let requester = Uuid::new_v4();
        let liked = property("Tunis", "apartment", 100_000.0, 3, 1);
        let other = property("Sfax", "house", 100_000.0, 3, 2);
        let favorite_ids: HashSet<Uuid> = [liked.id].into();

        let p = prefs(None, &[], &[], None);
        let ranked = rank_for_buyer(requester, &p, vec![liked.clone(), other], &favorite_ids);

        let entry = ranked.iter().find(|s| s.property.id == liked.id).unwrap();
        assert!(entry.is_favorite);
        assert!(ranked.iter().filter(|s| s.property.id != liked.id).all(|s| !s.is_favorite));
    }

    #[test]
    fn potential_buyer_price_band_bounds_are_inclusive() {
        // Target 100k: band is [80k, 120k]
        assert_eq!(score_potential_buyer("X", "y", 100_000.0, &[fav("A", "b", 80_000.0)]), 30);
        assert_eq!(score_potential_buyer("X", "y", 100_000.0, &[fav("A", "b", 120_000.0)]), 30);
        assert_eq!(score_potential_buyer("X", "y", 100_000.0, &[fav("A", "b", 120_001.0)]), 0);
    }

    #[test]
    fn potential_buyer_criteria_accumulate() {
        let favorites = vec![fav("Tunis", "villa", 500_000.0), fav("Tunis", "apartment", 95_000.0)];
        let score = score_potential_buyer("Tunis", "apartment", 100_000.0, &favorites);
        assert_eq!(score, 100);
    }

    #[test]
    fn buyers_without_favorites_are_excluded() {
        let target = property("Tunis", "apartment", 100_000.0, 3, 1);
        let engaged = PublicUser {
            id: Uuid::new_v4(),
            email: "a@example.com".into(),
            name: "A".into(),
            phone: None,
            avatar: None,
            role: "buyer".into(),
            created_at: Utc::now(),
        };
        let idle = PublicUser {
            id: Uuid::new_v4(),
            email: "b@example.com".into(),
            name: "B".into(),
            phone: None,
            avatar: None,
            role: "buyer".into(),
            created_at: Utc::now(),
        };

        let ranked = rank_potential_buyers(
            &target,
            vec![
                (engaged.clone(), vec![fav("Tunis", "apartment", 100_000.0)]),
                (idle, vec![]),
            ],
        );

        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].user.id, engaged.id);
    }

    #[test]
    fn potential_buyer_ties_break_by_favorite_count() {
        let target = property("Tunis", "apartment", 100_000.0, 3, 1);
        let one_fav = PublicUser {
            id: Uuid::new_v4(),
            email: "one@example.com".into(),
            name: "One".into(),
            phone: None,
            avatar: None,
            role: "buyer".into(),
            created_at: Utc::now(),
        };
        let two_favs = PublicUser {
            id: Uuid::new_v4(),
            email: "two@example.com".into(),
            name: "Two".into(),
            phone: None,
            avatar: None,
            role: "buyer".into(),
            created_at: Utc::now(),
        };

        let ranked = rank_potential_buyers(
            &target,
            vec![
                (one_fav.clone(), vec![fav("Tunis", "villa", 1.0)]),
                (
                    two_favs.clone(),
                    vec![fav("Tunis", "villa", 1.0), fav("Tunis", "house", 2.0)],
                ),
            ],
        );

        assert_eq!(ranked[0].user.id, two_favs.id);
        assert_eq!(ranked[1].user.id, one_fav.id);
    }

    #[test]
    fn empty_activity_sample_yields_unfiltered_recency_list() {
        let insights = analyze_activity(&[], &[]);
        assert!(insights.preferred_city.is_none());
        assert!(insights.preferred_type.is_none());
        assert!(insights.price_range.is_none());

        let newer = property("Tunis", "apartment", 100_000.0, 3, 1);
        let older = property("Sfax", "villa", 900_000.0, 7, 5);
        let ranked = rank_suggestions(&insights, vec![older.clone(), newer.clone()]);

        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].id, newer.id);
    }

    #[test]
    fn activity_mode_uses_first_occurrence_on_ties() {
        let favorites = vec![
            property("Sousse", "house", 200_000.0, 4, 1),
            property("Tunis", "apartment", 100_000.0, 3, 2),
        ];
        let insights = analyze_activity(&favorites, &[]);
        assert_eq!(insights.preferred_city.as_deref(), Some("Sousse"));
        assert_eq!(insights.preferred_type.as_deref(), Some("house"));
        let range = insights.price_range.unwrap();
        assert_eq!(range.min, 100_000.0);
        assert_eq!(range.max, 200_000.0);
    }

    #[test]
    fn suggestions_put_city_and_type_double_matches_first() {
        let favorites = vec![property("Tunis", "apartment", 100_000.0, 3, 1)];
        let insights = analyze_activity(&favorites, &[]);

        // Recent but only a price-band match vs older double match
        let partial = property("Sfax", "villa", 100_000.0, 3, 1);
        let double = property("Tunis", "apartment", 500_000.0, 3, 10);
        let unrelated = property("Bizerte", "studio", 999_999_999.0, 1, 0);

        let ranked = rank_suggestions(
            &insights,
            vec![partial.clone(), double.clone(), unrelated.clone()],
        );

        assert_eq!(ranked[0].id, double.id);
        assert_eq!(ranked[1].id, partial.id);
        assert!(ranked.iter().all(|p| p.id != unrelated.id));
    }
}
