//! Prompt text sent to the model. Pure formatting, no state.

/// The two messages of a completion call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptPair {
    pub system: String,
    pub user: String,
}

pub fn system_prompt() -> &'static str {
    "You are a travel expert specializing in specific local recommendations. \
     Always respond with valid JSON objects only. \
     Always answer in the same language as the user's request. \
     Recommend SPECIFIC PLACES within cities, not cities themselves. \
     Focus on restaurants, attractions, neighborhoods, and local spots. \
     Understand and respect user preferences and exclusions mentioned in their request. \
     When processing refinements, maintain the original context and preferences. \
     Extract exclusions from user text and return them separately from recommendations."
}

/// Build the user prompt asking for exactly `num_places` places.
///
/// `exclusions` are the names already known to be unwanted; the model is
/// additionally asked to pull any new ones out of `request`.
pub fn recommendation_prompt(request: &str, num_places: u32, exclusions: &[String]) -> String {
    let excluded_block = if exclusions.is_empty() {
        String::new()
    } else {
        format!(
            "\nDo NOT recommend any of these places (the user excluded them): {}.\n\
             Never return a place with one of these names, and list them again in \"exclusions\".\n",
            exclusions.join(", ")
        )
    };

    format!(
        r#"Generate EXACTLY {num_places} specific travel recommendations based on this request: "{request}"

CRITICAL: You must recommend SPECIFIC PLACES within the mentioned city/region, NOT cities themselves.
Examples of what to recommend:
- Restaurants, cafes, trattorias (for food lovers)
- Tourist attractions, monuments, museums
- Neighborhoods, districts, piazzas
- Parks, gardens, viewpoints
- Shopping areas, markets
- Cultural venues, theaters, galleries

If user mentions a city (like "Rome", "Paris", "Tokyo"), recommend specific places within that city.
If user mentions food preferences, focus on restaurants and food-related places.
If user mentions interests (history, art, nature), recommend relevant specific locations.

IMPORTANT: This request may contain conversation history. Pay attention to:
1. The original user preferences (where they want to go, what they like)
2. Any places they want to exclude from previous messages

If the user is making a refinement, maintain the original context and preferences while applying the new exclusions.
If they mention places they don't want to visit (phrases like "не хочу", "don't want", "no quiero", "je ne veux pas"), extract those places as exclusions.
{excluded_block}
Return a JSON object with TWO fields:
1. "places": array with EXACTLY {num_places} objects, each with:
   - "name": specific place name (restaurant, attraction, neighborhood, etc.)
   - "description": brief description of why this place is recommended
   - "coords": {{"lat": number, "lng": number}} (realistic coordinates within the city)
2. "exclusions": array of places to exclude (can be empty if no exclusions mentioned)

Ensure coordinates are realistic for the specific place within the mentioned city.
Return ONLY the JSON object, no additional text.
Answer in the same language as the user's request."#
    )
}

pub fn build_prompts(request: &str, num_places: u32, exclusions: &[String]) -> PromptPair {
    PromptPair {
        system: system_prompt().to_string(),
        user: recommendation_prompt(request, num_places, exclusions),
    }
}
