//! Canned payloads served when the credential is `DEMO_MODE`.
//!
//! They go through the same parser and league filter as live responses, so
//! the e-soccer fixture below never reaches a caller.

use std::time::Duration;

pub const LIST_DELAY: Duration = Duration::from_millis(500);
pub const DETAIL_DELAY: Duration = Duration::from_millis(200);
pub const ODDS_DELAY: Duration = Duration::from_millis(100);

pub const LISTING: &str = r#"{
  "success": 1,
  "results": [
    {
      "id": "1",
      "league": { "name": "Premier League - Demo" },
      "home": { "name": "Manchester United" },
      "away": { "name": "Liverpool" },
      "ss": "1-1",
      "time": "65",
      "timer": { "tm": 65 },
      "stats": {
        "attacks": ["60", "75"],
        "dangerous_attacks": ["35", "50"],
        "on_target": ["5", "8"],
        "off_target": ["4", "6"],
        "corners": ["3", "5"],
        "yellowcards": ["1", "2"],
        "redcards": ["0", "0"]
      }
    },
    {
      "id": "2",
      "league": { "name": "La Liga - Demo" },
      "home": { "name": "Real Madrid" },
      "away": { "name": "Barcelona" },
      "ss": "2-0",
      "time": "78",
      "timer": { "tm": 78 },
      "stats": {
        "attacks": ["80", "50"],
        "dangerous_attacks": ["60", "25"],
        "on_target": ["10", "2"],
        "off_target": ["7", "3"],
        "corners": ["8", "1"],
        "yellowcards": ["0", "3"],
        "redcards": ["0", "0"]
      }
    },
    {
      "id": "3",
      "league": { "name": "Esoccer Battle - 8 mins play" },
      "home": { "name": "Arsenal (Bot)" },
      "away": { "name": "Chelsea (Bot)" },
      "ss": "4-3",
      "time": "6",
      "timer": { "tm": 6 }
    }
  ]
}"#;

pub const ODDS: &str = r#"{
  "success": 1,
  "results": {
    "odds": {
      "1_2": [
        { "id": "2", "home_od": "1.90", "away_od": "1.90", "handicap": "0.0,-0.5", "time_str": "0", "add_time": "0" }
      ],
      "1_3": [
        { "id": "1", "over_od": "1.85", "under_od": "1.95", "handicap": "2.5", "time_str": "0", "add_time": "0" }
      ]
    }
  }
}"#;
