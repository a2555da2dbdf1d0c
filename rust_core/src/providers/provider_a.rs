//! Provider A payload adapter.
//!
//! Every response is wrapped as `{"success": 1, "result": [...]}`. Field names
//! differ between endpoints and API revisions, so ids and names are looked up
//! through a list of known aliases.

use super::{field_str, ParseResult};
use crate::error::{MappingError, Result};
use crate::types::{Entity, Provider};
use serde_json::Value;

const LEAGUE_ID: &[&str] = &["league_key", "league_id"];
const LEAGUE_NAME: &[&str] = &["league_name", "name"];
const COUNTRY: &[&str] = &["country_name", "country"];

const HOME_ID: &[&str] = &["home_team_key", "home_team_id", "match_hometeam_id"];
const HOME_NAME: &[&str] = &["event_home_team", "home_team_name", "match_hometeam_name"];
const AWAY_ID: &[&str] = &["away_team_key", "away_team_id", "match_awayteam_id"];
const AWAY_NAME: &[&str] = &["event_away_team", "away_team_name", "match_awayteam_name"];

/// Unwrap the response envelope into its record list.
///
/// A successful response without `result` means "nothing found" and yields an
/// empty slice; an error body is classified as rate limiting or malformed.
pub fn parse_envelope(body: &Value) -> Result<&[Value]> {
    let success = body["success"].as_i64().or_else(|| {
        body["success"]
            .as_str()
            .and_then(|s| s.trim().parse::<i64>().ok())
    });

    if success != Some(1) {
        let message = field_str(body, &["message", "msg", "error"])
            .or_else(|| body["error"].get(0).and_then(|e| field_str(e, &["msg", "message"])))
            .unwrap_or_else(|| "unsuccessful response".to_string());
        if message.to_lowercase().contains("limit") {
            return Err(MappingError::RateLimited {
                provider: Provider::A,
                retry_after: None,
            });
        }
        return Err(MappingError::malformed(Provider::A, message));
    }

    match &body["result"] {
        Value::Array(items) => Ok(items.as_slice()),
        Value::Null => Ok(&[]),
        other => Err(MappingError::malformed(
            Provider::A,
            format!("'result' is not a list: {}", other),
        )),
    }
}

pub fn parse_league(item: &Value) -> ParseResult<Entity> {
    let Some(id) = field_str(item, LEAGUE_ID) else {
        return ParseResult::Invalid("league without id".to_string());
    };
    let Some(name) = field_str(item, LEAGUE_NAME) else {
        return ParseResult::Invalid(format!("league {} without name", id));
    };
    let country = field_str(item, COUNTRY);
    ParseResult::Ok(Entity::league(Provider::A, id, name, country.as_deref()))
}

/// Both sides of one fixture, attributed to `league`.
///
/// The fixture's own country wins over the league's when both are present.
pub fn parse_fixture_teams(item: &Value, league: &Entity) -> Vec<ParseResult<Entity>> {
    let country = field_str(item, COUNTRY).or_else(|| league.country.clone());
    [("home", HOME_ID, HOME_NAME), ("away", AWAY_ID, AWAY_NAME)]
        .into_iter()
        .map(|(side, id_keys, name_keys)| {
            match (field_str(item, id_keys), field_str(item, name_keys)) {
                (Some(id), Some(name)) => ParseResult::Ok(
                    Entity::team(Provider::A, id, name, country.as_deref())
                        .with_league(league.external_id.clone()),
                ),
                (None, _) => ParseResult::Invalid(format!("{} team without id", side)),
                (Some(id), None) => {
                    ParseResult::Invalid(format!("{} team {} without name", side, id))
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EntityKind;
    use serde_json::json;

    fn premier_league() -> Entity {
        Entity::league(Provider::A, "152", "Premier League", Some("England"))
    }

    #[test]
    fn test_envelope_success() {
        let body = json!({"success": 1, "result": [{"league_key": 152}]});
        assert_eq!(parse_envelope(&body).unwrap().len(), 1);
    }

    #[test]
    fn test_envelope_without_result_is_empty() {
        let body = json!({"success": 1});
        assert!(parse_envelope(&body).unwrap().is_empty());
    }

    #[test]
    fn test_envelope_error_is_malformed() {
        let body = json!({"success": 0, "error": "Invalid league"});
        assert!(matches!(
            parse_envelope(&body),
            Err(MappingError::MalformedResponse { .. })
        ));
    }

    #[test]
    fn test_envelope_quota_error_is_rate_limited() {
        let body = json!({"error": "404", "message": "Daily request limit reached"});
        let err = parse_envelope(&body).unwrap_err();
        assert!(matches!(err, MappingError::RateLimited { .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_parse_league() {
        let item = json!({
            "league_key": 152,
            "league_name": "Premier League",
            "country_key": 44,
            "country_name": "England"
        });
        match parse_league(&item) {
            ParseResult::Ok(league) => {
                assert_eq!(league.external_id, "152");
                assert_eq!(league.kind, EntityKind::League);
                assert_eq!(league.country.as_deref(), Some("england"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_league_alias_fields() {
        let item = json!({"league_id": "302", "name": "La Liga", "country": "Spain"});
        let league = parse_league(&item).ok().expect("league");
        assert_eq!(league.external_id, "302");
        assert_eq!(league.raw_name, "La Liga");
    }

    #[test]
    fn test_parse_league_without_id_is_invalid() {
        let item = json!({"league_name": "Premier League"});
        assert!(!parse_league(&item).is_ok());
    }

    #[test]
    fn test_parse_fixture_teams() {
        let item = json!({
            "event_key": 1001,
            "home_team_key": 102,
            "event_home_team": "Manchester United",
            "away_team_key": 141,
            "event_away_team": "Arsenal",
            "country_name": "England"
        });
        let teams: Vec<Entity> = parse_fixture_teams(&item, &premier_league())
            .into_iter()
            .filter_map(ParseResult::ok)
            .collect();
        assert_eq!(teams.len(), 2);
        assert_eq!(teams[0].raw_name, "Manchester United");
        assert_eq!(teams[1].external_id, "141");
        assert!(teams.iter().all(|t| t.league_id.as_deref() == Some("152")));
    }

    #[test]
    fn test_fixture_falls_back_to_league_country() {
        let item = json!({
            "match_hometeam_id": "7",
            "match_hometeam_name": "Chelsea",
            "match_awayteam_id": "8"
        });
        let parsed = parse_fixture_teams(&item, &premier_league());
        match &parsed[0] {
            ParseResult::Ok(team) => assert_eq!(team.country.as_deref(), Some("england")),
            other => panic!("unexpected {:?}", other),
        }
        // Away side has an id but no name
        assert!(!parsed[1].is_ok());
    }
}
