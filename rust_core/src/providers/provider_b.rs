//! Provider B payload adapter.
//!
//! Responses look like
//! `{"errors": [], "paging": {"current": 1, "total": 3}, "response": [...]}`.
//! `errors` is an empty list on success and an object keyed by error kind
//! otherwise (`{"rateLimit": "..."}`, `{"token": "..."}`).

use super::{field_str, Page, ParseResult};
use crate::error::{MappingError, Result};
use crate::types::{Entity, Provider};
use serde_json::Value;

/// Records plus paging info from one response.
#[derive(Debug)]
pub struct Envelope<'a> {
    pub items: &'a [Value],
    pub current: u32,
    pub total: u32,
}

fn classify_errors(errors: &Value) -> Option<MappingError> {
    let entries: Vec<(String, String)> = match errors {
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| (k.clone(), v.as_str().unwrap_or_default().to_string()))
            .collect(),
        Value::Array(list) => list
            .iter()
            .map(|v| (String::new(), v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string())))
            .collect(),
        _ => Vec::new(),
    };
    let (key, message) = entries.into_iter().next()?;

    let lowered = format!("{} {}", key, message).to_lowercase();
    if lowered.contains("ratelimit") || lowered.contains("requests") || lowered.contains("limit") {
        return Some(MappingError::RateLimited {
            provider: Provider::B,
            retry_after: None,
        });
    }
    if key == "token" || key == "access" {
        return Some(MappingError::Config(format!("provider_b rejected credentials: {}", message)));
    }
    Some(MappingError::malformed(
        Provider::B,
        format!("{}: {}", key, message),
    ))
}

pub fn parse_envelope(body: &Value) -> Result<Envelope<'_>> {
    if let Some(err) = classify_errors(&body["errors"]) {
        return Err(err);
    }

    let Some(items) = body["response"].as_array() else {
        return Err(MappingError::malformed(Provider::B, "missing 'response' list"));
    };

    let paging = &body["paging"];
    let current = paging["current"].as_u64().unwrap_or(1).max(1) as u32;
    let total = paging["total"].as_u64().unwrap_or(1).max(1) as u32;

    Ok(Envelope {
        items: items.as_slice(),
        current,
        total,
    })
}

/// `/leagues` item: `{"league": {"id", "name"}, "country": {"name"}}`
pub fn parse_league(item: &Value) -> ParseResult<Entity> {
    let league = &item["league"];
    let Some(id) = field_str(league, &["id"]) else {
        return ParseResult::Invalid("league without id".to_string());
    };
    let Some(name) = field_str(league, &["name"]) else {
        return ParseResult::Invalid(format!("league {} without name", id));
    };
    let country = field_str(&item["country"], &["name"]).or_else(|| field_str(item, &["country"]));
    ParseResult::Ok(Entity::league(Provider::B, id, name, country.as_deref()))
}

/// `/teams` item: `{"team": {"id", "name", "country"}, "venue": {...}}`.
/// A bare team object is accepted as well.
pub fn parse_team(item: &Value, league_id: Option<&str>) -> ParseResult<Entity> {
    let team = if item["team"].is_object() { &item["team"] } else { item };
    let Some(id) = field_str(team, &["id"]) else {
        return ParseResult::Invalid("team without id".to_string());
    };
    let Some(name) = field_str(team, &["name"]) else {
        return ParseResult::Invalid(format!("team {} without name", id));
    };
    let country = field_str(team, &["country"]);
    let entity = Entity::team(Provider::B, id, name, country.as_deref());
    ParseResult::Ok(match league_id {
        Some(league_id) => entity.with_league(league_id),
        None => entity,
    })
}

pub fn parse_leagues(body: &Value) -> Result<Page<Entity>> {
    let envelope = parse_envelope(body)?;
    Ok(Page {
        items: envelope.items.iter().map(parse_league).collect(),
        current: envelope.current,
        total: envelope.total,
    })
}

pub fn parse_teams(body: &Value, league_id: Option<&str>) -> Result<Page<Entity>> {
    let envelope = parse_envelope(body)?;
    Ok(Page {
        items: envelope
            .items
            .iter()
            .map(|item| parse_team(item, league_id))
            .collect(),
        current: envelope.current,
        total: envelope.total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_teams_page() {
        let body = json!({
            "get": "teams",
            "errors": [],
            "results": 2,
            "paging": {"current": 1, "total": 2},
            "response": [
                {"team": {"id": 33, "name": "Manchester United", "country": "England"}, "venue": {}},
                {"team": {"id": 50, "name": "Manchester City", "country": "England"}, "venue": {}}
            ]
        });
        let page = parse_teams(&body, Some("39")).unwrap();
        assert!(page.has_more());
        let teams: Vec<Entity> = page.items.into_iter().filter_map(ParseResult::ok).collect();
        assert_eq!(teams.len(), 2);
        assert_eq!(teams[0].external_id, "33");
        assert_eq!(teams[0].league_id.as_deref(), Some("39"));
        assert_eq!(teams[1].country.as_deref(), Some("england"));
    }

    #[test]
    fn test_parse_leagues() {
        let body = json!({
            "errors": [],
            "paging": {"current": 1, "total": 1},
            "response": [
                {"league": {"id": 39, "name": "Premier League", "type": "League"},
                 "country": {"name": "England", "code": "GB"}},
                {"league": {"name": "Nameless id"}, "country": {"name": "Spain"}}
            ]
        });
        let page = parse_leagues(&body).unwrap();
        assert_eq!(page.items.len(), 2);
        assert!(page.items[0].is_ok());
        assert!(!page.items[1].is_ok());
    }

    #[test]
    fn test_rate_limit_error_object() {
        let body = json!({
            "errors": {"rateLimit": "Too many requests. Your rate limit is 10 requests per minute."},
            "response": []
        });
        assert!(matches!(
            parse_envelope(&body),
            Err(MappingError::RateLimited { .. })
        ));
    }

    #[test]
    fn test_token_error_is_config() {
        let body = json!({"errors": {"token": "Error/Missing application key."}, "response": []});
        assert!(matches!(parse_envelope(&body), Err(MappingError::Config(_))));
    }

    #[test]
    fn test_missing_response_is_malformed() {
        let body = json!({"errors": []});
        assert!(matches!(
            parse_envelope(&body),
            Err(MappingError::MalformedResponse { .. })
        ));
    }

    #[test]
    fn test_missing_paging_defaults_to_single_page() {
        let body = json!({"errors": [], "response": []});
        let env = parse_envelope(&body).unwrap();
        assert_eq!((env.current, env.total), (1, 1));
    }

    #[test]
    fn test_bare_team_object() {
        let item = json!({"id": 529, "name": "Barcelona", "country": "Spain"});
        let team = parse_team(&item, None).ok().expect("team");
        assert_eq!(team.normalized_name, "barcelona");
        assert!(team.league_id.is_none());
    }
}
