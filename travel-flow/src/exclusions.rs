//! Exclusion bookkeeping across conversational turns.

use std::collections::HashSet;

use crate::models::{Place, TravelRequest};

/// How many previous turns are folded into the context of a new one
pub const HISTORY_WINDOW: usize = 5;

/// Deduplicate, keeping the first occurrence of every name
pub fn dedup_preserving_order<I>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();
    names
        .into_iter()
        .filter(|name| seen.insert(name.clone()))
        .collect()
}

/// Exclusions of `history` (in the order given, newest first) followed by
/// `new_exclusions`, without duplicates.
pub fn accumulate_exclusions<I>(history: &[TravelRequest], new_exclusions: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    dedup_preserving_order(
        history
            .iter()
            .flat_map(|request| request.exclude.iter().cloned())
            .chain(new_exclusions),
    )
}

/// Conversation context handed to the model for a new turn
pub fn build_context(history: &[TravelRequest], current_text: &str) -> String {
    let mut parts = Vec::with_capacity(history.len() * 2 + 2);

    for (i, request) in history.iter().enumerate() {
        let n = i + 1;
        parts.push(format!("Message {n}: {}", request.text));
        if !request.exclude.is_empty() {
            parts.push(format!("Excluded in message {n}: {}", request.exclude.join(", ")));
        }
    }

    parts.push(format!("Current message: {current_text}"));

    if !history.is_empty() {
        parts.push(
            "IMPORTANT: Maintain the original travel preferences while applying any new exclusions."
                .to_string(),
        );
    }

    parts.join("\n")
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

pub fn is_excluded(place: &Place, exclusions: &[String]) -> bool {
    let name = normalize(&place.name);
    exclusions.iter().any(|excluded| normalize(excluded) == name)
}

/// Drop every place the user has excluded; returns how many were removed
pub fn remove_excluded(places: &mut Vec<Place>, exclusions: &[String]) -> usize {
    let before = places.len();
    places.retain(|place| !is_excluded(place, exclusions));
    before - places.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn turn(id: i64, text: &str, exclude: &[&str]) -> TravelRequest {
        TravelRequest {
            id,
            text: text.to_string(),
            exclude: exclude.iter().map(|s| s.to_string()).collect(),
            num_places: 3,
            response_json: vec![],
            created_at: Utc::now(),
        }
    }

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_dedup_keeps_first_occurrence() {
        let result = dedup_preserving_order(names(&["Vatican", "Colosseum", "Vatican", "Forum"]));
        assert_eq!(result, names(&["Vatican", "Colosseum", "Forum"]));
    }

    #[test]
    fn test_applying_same_exclusion_twice_is_idempotent() {
        let history = vec![turn(2, "not the Colosseum", &["Colosseum"])];
        let once = accumulate_exclusions(&history, names(&["Colosseum"]));
        let twice = accumulate_exclusions(&history, once.clone());
        assert_eq!(once, names(&["Colosseum"]));
        assert_eq!(twice, once);
    }

    #[test]
    fn test_history_exclusions_come_before_new_ones() {
        let history = vec![
            turn(3, "and not the Vatican", &["Colosseum", "Vatican"]),
            turn(2, "not the Colosseum", &["Colosseum"]),
            turn(1, "Rome please", &[]),
        ];
        let result = accumulate_exclusions(&history, names(&["Pantheon", "Vatican"]));
        assert_eq!(result, names(&["Colosseum", "Vatican", "Pantheon"]));
    }

    #[test]
    fn test_context_lists_turns_and_exclusions() {
        let history = vec![
            turn(2, "не хочу в Колізей", &["Колізей"]),
            turn(1, "Хочу в Рим", &[]),
        ];
        let context = build_context(&history, "і ще не хочу в Ватикан");
        let expected = "Message 1: не хочу в Колізей\n\
                        Excluded in message 1: Колізей\n\
                        Message 2: Хочу в Рим\n\
                        Current message: і ще не хочу в Ватикан\n\
                        IMPORTANT: Maintain the original travel preferences while applying any new exclusions.";
        assert_eq!(context, expected);
    }

    #[test]
    fn test_context_without_history_is_just_the_message() {
        assert_eq!(build_context(&[], "Rome"), "Current message: Rome");
    }

    #[test]
    fn test_remove_excluded_ignores_case_and_whitespace() {
        let mut places = vec![
            Place::new("Colosseum", "", 41.89, 12.49),
            Place::new("Pantheon", "", 41.89, 12.47),
        ];
        let removed = remove_excluded(&mut places, &names(&[" colosseum "]));
        assert_eq!(removed, 1);
        assert_eq!(places.len(), 1);
        assert_eq!(places[0].name, "Pantheon");
    }
}
