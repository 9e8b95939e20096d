use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// Account role. Stored as free text; values other than the three the
/// application acts on are kept verbatim in `Other`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    #[default]
    Candidate,
    Employer,
    Admin,
    Other(String),
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Role::Candidate => "candidate",
            Role::Employer => "employer",
            Role::Admin => "admin",
            Role::Other(role) => role,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Role {
    fn from(s: &str) -> Self {
        match s {
            "candidate" => Role::Candidate,
            "employer" => Role::Employer,
            "admin" => Role::Admin,
            other => Role::Other(other.to_string()),
        }
    }
}

impl From<String> for Role {
    fn from(s: String) -> Self {
        Role::from(s.as_str())
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        match role {
            Role::Other(role) => role,
            known => known.as_str().to_string(),
        }
    }
}

impl FromStr for Role {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Role::from(s))
    }
}

impl ToSql for Role {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Role {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value.as_str().map(Role::from)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    /// Only populated by lookups that serve login (`get_user_by_email`).
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub role: Role,
    pub is_banned: bool,
    pub banned_until: Option<String>,
    pub created_at: Option<String>,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub verified: bool,
}

#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub verified: bool,
}

impl NewUser {
    pub fn new(email: impl Into<String>, password_hash: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password_hash: password_hash.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    pub employer_id: i64,
    pub title: String,
    pub description: String,
    pub location_text: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub salary: Option<String>, // free text, e.g. "$90k-110k"
    pub tags: Option<String>,   // free text, comma separated by convention
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NewJob {
    pub employer_id: i64,
    pub title: String,
    pub description: String,
    pub location_text: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub salary: Option<String>,
    pub tags: Option<String>,
}

impl NewJob {
    pub fn new(employer_id: i64, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            employer_id,
            title: title.into(),
            description: description.into(),
            salary: Some(String::new()),
            ..Default::default()
        }
    }
}

/// Sparse update: `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub location_text: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub salary: Option<String>,
    pub tags: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    pub id: i64,
    pub job_id: i64,
    pub user_id: i64,
    pub cover_letter: Option<String>,
    pub resume_text: Option<String>,
    pub cover_letter_path: Option<String>,
    pub resume_path: Option<String>,
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NewApplication {
    pub job_id: i64,
    pub user_id: i64,
    pub cover_letter: String,
    pub resume_text: String,
    pub cover_letter_path: Option<String>,
    pub resume_path: Option<String>,
}

impl NewApplication {
    pub fn new(job_id: i64, user_id: i64) -> Self {
        Self {
            job_id,
            user_id,
            ..Default::default()
        }
    }
}

/// An application joined with the applicant's email, for employer views.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobApplicant {
    #[serde(flatten)]
    pub application: Application,
    pub applicant_email: String,
}

/// What a rating is about. Stored untyped as (`target_type`, `target_id`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "target_type", content = "target_id", rename_all = "lowercase")]
pub enum RatingTarget {
    User(i64),
    Job(i64),
}

impl RatingTarget {
    pub fn from_parts(kind: &str, id: i64) -> Option<Self> {
        match kind {
            "user" => Some(RatingTarget::User(id)),
            "job" => Some(RatingTarget::Job(id)),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RatingTarget::User(_) => "user",
            RatingTarget::Job(_) => "job",
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            RatingTarget::User(id) | RatingTarget::Job(id) => *id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rating {
    pub id: i64,
    #[serde(flatten)]
    pub target: RatingTarget,
    pub rater_id: i64,
    pub rating: i64,
    pub comment: Option<String>,
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatedBy {
    #[serde(flatten)]
    pub rating: Rating,
    pub rater_email: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatingSummary {
    /// `None` when there are no ratings.
    pub average: Option<f64>,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenInfo {
    pub token: String,
    pub email: String,
    pub purpose: String,
    pub expires_at: Option<String>,
    pub created_at: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parse_and_display() {
        assert_eq!("employer".parse::<Role>().unwrap(), Role::Employer);
        assert_eq!(Role::Admin.to_string(), "admin");
        assert_eq!(Role::default(), Role::Candidate);
        assert_eq!(
            "moderator".parse::<Role>().unwrap(),
            Role::Other("moderator".to_string())
        );
        assert_eq!(Role::from("moderator").as_str(), "moderator");
    }

    #[test]
    fn test_role_serializes_as_plain_string() {
        assert_eq!(serde_json::to_value(Role::Employer).unwrap(), "employer");
        assert_eq!(
            serde_json::to_value(Role::Other("moderator".to_string())).unwrap(),
            "moderator"
        );
        let role: Role = serde_json::from_str(r#""admin""#).unwrap();
        assert_eq!(role, Role::Admin);
    }

    #[test]
    fn test_rating_target_parts() {
        assert_eq!(RatingTarget::from_parts("job", 7), Some(RatingTarget::Job(7)));
        assert_eq!(RatingTarget::from_parts("user", 3).unwrap().kind(), "user");
        assert_eq!(RatingTarget::Job(9).id(), 9);
        assert!(RatingTarget::from_parts("company", 1).is_none());
    }

    #[test]
    fn test_rating_serializes_flat_target() {
        let rating = Rating {
            id: 1,
            target: RatingTarget::Job(4),
            rater_id: 2,
            rating: 5,
            comment: None,
            created_at: None,
        };
        let value = serde_json::to_value(&rating).unwrap();
        assert_eq!(value["target_type"], "job");
        assert_eq!(value["target_id"], 4);
        assert_eq!(value["rating"], 5);
    }

    #[test]
    fn test_user_serialization_hides_password_hash() {
        let user = User {
            id: 1,
            email: "a@b.com".to_string(),
            password_hash: Some("secret".to_string()),
            role: Role::Candidate,
            is_banned: false,
            banned_until: None,
            created_at: None,
            username: None,
            first_name: None,
            last_name: None,
            verified: false,
        };
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("secret"));
        assert!(json.starts_with(r#"{"id":1,"email":"a@b.com""#));
    }
}
