use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Claims of an ID token that passed every check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidatedClaims {
    pub subject: String,
    pub issuer: String,
    pub audience: Vec<String>,
    pub expiry: DateTime<Utc>,
    pub issued_at: DateTime<Utc>,
    pub nonce: String,
    pub email: Option<String>,
    pub email_verified: Option<bool>,
    pub name: Option<String>,
    pub picture: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    /// Every claim not mapped to a field above.
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Wire shape of the ID token payload.
#[derive(Debug, Deserialize)]
pub(crate) struct RawClaims {
    pub iss: String,
    pub sub: String,
    #[serde(deserialize_with = "one_or_many")]
    pub aud: Vec<String>,
    pub exp: f64,
    pub iat: f64,
    #[serde(default)]
    pub nonce: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub email_verified: Option<bool>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub family_name: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

pub(crate) fn timestamp(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    DateTime::from_timestamp(secs.trunc() as i64, 0)
}

/// `aud` is either a single string or an array of strings.
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(aud) => vec![aud],
        OneOrMany::Many(auds) => auds,
    })
}

/// Some providers send `email_verified` as `"true"`/`"false"`.
fn lenient_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum BoolLike {
        Bool(bool),
        Text(String),
    }

    Ok(match Option::<BoolLike>::deserialize(deserializer)? {
        Some(BoolLike::Bool(b)) => Some(b),
        Some(BoolLike::Text(s)) => match s.as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        None => None,
    })
}

#[cfg(test)]
mod tests {
    use super::RawClaims;
    use serde_json::json;

    fn base() -> serde_json::Value {
        json!({"iss": "i", "sub": "s", "aud": "a", "exp": 10, "iat": 5})
    }

    #[test]
    fn single_audience_becomes_list() {
        let raw: RawClaims = serde_json::from_value(base()).unwrap();
        assert_eq!(raw.aud, vec!["a".to_string()]);
    }

    #[test]
    fn audience_array_is_kept() {
        let mut v = base();
        v["aud"] = json!(["a", "b"]);
        let raw: RawClaims = serde_json::from_value(v).unwrap();
        assert_eq!(raw.aud, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn unmapped_claims_land_in_extra() {
        let mut v = base();
        v["hd"] = json!("example.com");
        let raw: RawClaims = serde_json::from_value(v).unwrap();
        assert_eq!(raw.extra.get("hd"), Some(&json!("example.com")));
        assert!(!raw.extra.contains_key("sub"));
    }

    #[test]
    fn string_email_verified_is_accepted() {
        let mut v = base();
        v["email_verified"] = json!("true");
        let raw: RawClaims = serde_json::from_value(v).unwrap();
        assert_eq!(raw.email_verified, Some(true));
    }

    #[test]
    fn missing_exp_fails() {
        let mut v = base();
        v.as_object_mut().unwrap().remove("exp");
        assert!(serde_json::from_value::<RawClaims>(v).is_err());
    }
}
