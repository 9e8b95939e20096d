use chrono::NaiveDateTime;
use rusqlite::{OptionalExtension, params};
use tracing::debug;

use crate::db::{Store, format_timestamp, now_iso};
use crate::error::Result;
use crate::models::{NewUser, User};

const USER_COLUMNS: &str = "id, email, role, is_banned, banned_until, created_at, \
                            username, first_name, last_name, verified";

impl Store {
    /// Insert a user and return the stored row. A duplicate email fails with
    /// `StoreError::Constraint`.
    pub fn create_user(&self, user: &NewUser) -> Result<User> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO users
             (email, password_hash, role, username, first_name, last_name, verified, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                user.email,
                user.password_hash,
                user.role,
                user.username,
                user.first_name,
                user.last_name,
                user.verified,
                now_iso(),
            ],
        )?;
        let id = conn.last_insert_rowid();
        drop(conn);

        self.get_user_by_id(id)?
            .ok_or_else(|| rusqlite::Error::QueryReturnedNoRows.into())
    }

    /// Lookup for login flows; the only query that returns `password_hash`.
    pub fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let conn = self.connect()?;
        let user = conn
            .query_row(
                &format!("SELECT {USER_COLUMNS}, password_hash FROM users WHERE email = ?1"),
                [email],
                |row| {
                    let mut user = Self::row_to_user(row)?;
                    user.password_hash = row.get("password_hash")?;
                    Ok(user)
                },
            )
            .optional()?;
        Ok(user)
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let conn = self.connect()?;
        let user = conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"),
                [username],
                Self::row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<Option<User>> {
        let conn = self.connect()?;
        let user = conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                [id],
                Self::row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    pub fn set_user_verified(&self, email: &str) -> Result<bool> {
        let conn = self.connect()?;
        let updated = conn.execute("UPDATE users SET verified = 1 WHERE email = ?1", [email])?;
        Ok(updated > 0)
    }

    pub fn update_user_password(&self, email: &str, password_hash: &str) -> Result<bool> {
        let conn = self.connect()?;
        let updated = conn.execute(
            "UPDATE users SET password_hash = ?1 WHERE email = ?2",
            params![password_hash, email],
        )?;
        Ok(updated > 0)
    }

    /// All users, newest first.
    pub fn list_users(&self) -> Result<Vec<User>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC, id DESC"
        ))?;
        let users = stmt
            .query_map([], Self::row_to_user)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(users)
    }

    /// Ban a user, indefinitely when `until` is `None`.
    pub fn set_user_ban(&self, user_id: i64, until: Option<NaiveDateTime>) -> Result<bool> {
        let conn = self.connect()?;
        let updated = conn.execute(
            "UPDATE users SET is_banned = 1, banned_until = ?1 WHERE id = ?2",
            params![until.map(format_timestamp), user_id],
        )?;
        Ok(updated > 0)
    }

    pub fn unset_user_ban(&self, user_id: i64) -> Result<bool> {
        let conn = self.connect()?;
        let updated = conn.execute(
            "UPDATE users SET is_banned = 0, banned_until = NULL WHERE id = ?1",
            [user_id],
        )?;
        Ok(updated > 0)
    }

    /// Delete a user and everything hanging off it: their applications,
    /// ratings they wrote or received, and their jobs along with those jobs'
    /// applications and ratings. Runs in one transaction.
    pub fn delete_user(&self, user_id: i64) -> Result<bool> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;

        let applications = tx.execute("DELETE FROM applications WHERE user_id = ?1", [user_id])?;
        let ratings = tx.execute(
            "DELETE FROM ratings WHERE rater_id = ?1 OR (target_type = 'user' AND target_id = ?1)",
            [user_id],
        )?;

        let mut stmt = tx.prepare("SELECT id FROM jobs WHERE employer_id = ?1")?;
        let job_ids: Vec<i64> = stmt
            .query_map([user_id], |row| row.get("id"))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        drop(stmt);
        for job_id in &job_ids {
            tx.execute("DELETE FROM applications WHERE job_id = ?1", [job_id])?;
            tx.execute(
                "DELETE FROM ratings WHERE target_type = 'job' AND target_id = ?1",
                [job_id],
            )?;
        }
        tx.execute("DELETE FROM jobs WHERE employer_id = ?1", [user_id])?;
        let deleted = tx.execute("DELETE FROM users WHERE id = ?1", [user_id])?;
        tx.commit()?;

        debug!(
            user_id,
            applications,
            ratings,
            jobs = job_ids.len(),
            "deleted user"
        );
        Ok(deleted > 0)
    }

    fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
        Ok(User {
            id: row.get("id")?,
            email: row.get("email")?,
            password_hash: None,
            role: row.get("role")?,
            is_banned: row.get::<_, Option<bool>>("is_banned")?.unwrap_or(false),
            banned_until: row.get("banned_until")?,
            created_at: row.get("created_at")?,
            username: row.get("username")?,
            first_name: row.get("first_name")?,
            last_name: row.get("last_name")?,
            verified: row.get::<_, Option<bool>>("verified")?.unwrap_or(false),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::test_store;
    use crate::models::{NewApplication, NewJob, RatingTarget, Role};

    fn count(store: &Store, sql: &str, id: i64) -> i64 {
        let conn = store.connect().unwrap();
        conn.query_row(sql, [id], |row| row.get(0)).unwrap()
    }

    #[test]
    fn test_create_user_round_trip() {
        let (store, _dir) = test_store();
        let new_user = NewUser {
            email: "boss@acme.com".to_string(),
            password_hash: "pbkdf2$abc".to_string(),
            role: Role::Employer,
            username: Some("boss".to_string()),
            first_name: Some("Ada".to_string()),
            last_name: Some("Lovelace".to_string()),
            verified: false,
        };
        let created = store.create_user(&new_user).unwrap();
        assert!(created.password_hash.is_none());

        let fetched = store.get_user_by_id(created.id).unwrap().unwrap();
        assert_eq!(fetched.email, "boss@acme.com");
        assert_eq!(fetched.role, Role::Employer);
        assert_eq!(fetched.username.as_deref(), Some("boss"));
        assert_eq!(fetched.first_name.as_deref(), Some("Ada"));
        assert_eq!(fetched.last_name.as_deref(), Some("Lovelace"));
        assert!(!fetched.verified);
        assert!(!fetched.is_banned);
        assert!(fetched.created_at.is_some());
    }

    #[test]
    fn test_create_user_defaults_to_candidate() {
        let (store, _dir) = test_store();
        let user = store.create_user(&NewUser::new("c@d.com", "h")).unwrap();
        assert_eq!(user.role, Role::Candidate);
    }

    #[test]
    fn test_unknown_role_is_read_back_verbatim() {
        let (store, _dir) = test_store();
        store.create_user(&NewUser::new("c@d.com", "h")).unwrap();
        {
            let conn = store.connect().unwrap();
            conn.execute(
                "INSERT INTO users (email, password_hash, role)
                 VALUES ('mod@d.com', 'h', 'moderator')",
                [],
            )
            .unwrap();
        }

        let users = store.list_users().unwrap();
        assert_eq!(users.len(), 2);
        let moderator = users.iter().find(|u| u.email == "mod@d.com").unwrap();
        assert_eq!(moderator.role, Role::Other("moderator".to_string()));

        let fetched = store.get_user_by_id(moderator.id).unwrap().unwrap();
        assert_eq!(fetched.role.as_str(), "moderator");

        // Written back unchanged.
        let copy = NewUser {
            role: fetched.role.clone(),
            ..NewUser::new("mod2@d.com", "h")
        };
        assert_eq!(store.create_user(&copy).unwrap().role, fetched.role);
    }

    #[test]
    fn test_duplicate_email_is_constraint_error() {
        let (store, _dir) = test_store();
        store.create_user(&NewUser::new("dup@b.com", "h")).unwrap();
        let err = store.create_user(&NewUser::new("dup@b.com", "h2")).unwrap_err();
        assert!(err.is_constraint(), "unexpected error: {err}");
    }

    #[test]
    fn test_lookups_return_none_when_missing() {
        let (store, _dir) = test_store();
        assert!(store.get_user_by_id(42).unwrap().is_none());
        assert!(store.get_user_by_email("nobody@b.com").unwrap().is_none());
        assert!(store.get_user_by_username("nobody").unwrap().is_none());
    }

    #[test]
    fn test_get_by_email_includes_password_hash() {
        let (store, _dir) = test_store();
        let mut new_user = NewUser::new("login@b.com", "argon2$xyz");
        new_user.username = Some("login".to_string());
        store.create_user(&new_user).unwrap();

        let by_email = store.get_user_by_email("login@b.com").unwrap().unwrap();
        assert_eq!(by_email.password_hash.as_deref(), Some("argon2$xyz"));

        let by_username = store.get_user_by_username("login").unwrap().unwrap();
        assert_eq!(by_username.email, "login@b.com");
        assert!(by_username.password_hash.is_none());
    }

    #[test]
    fn test_verify_and_update_password() {
        let (store, _dir) = test_store();
        store.create_user(&NewUser::new("v@b.com", "old")).unwrap();

        assert!(store.set_user_verified("v@b.com").unwrap());
        assert!(!store.set_user_verified("missing@b.com").unwrap());
        assert!(store.update_user_password("v@b.com", "new").unwrap());
        assert!(!store.update_user_password("missing@b.com", "new").unwrap());

        let user = store.get_user_by_email("v@b.com").unwrap().unwrap();
        assert!(user.verified);
        assert_eq!(user.password_hash.as_deref(), Some("new"));
    }

    #[test]
    fn test_list_users_newest_first() {
        let (store, _dir) = test_store();
        let first = store.create_user(&NewUser::new("1@b.com", "h")).unwrap();
        let second = store.create_user(&NewUser::new("2@b.com", "h")).unwrap();

        let users = store.list_users().unwrap();
        let ids: Vec<i64> = users.iter().map(|u| u.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }

    #[test]
    fn test_ban_and_unban() {
        let (store, _dir) = test_store();
        let user = store.create_user(&NewUser::new("ban@b.com", "h")).unwrap();
        let until = crate::db::parse_timestamp("2030-01-01T00:00:00").unwrap();

        assert!(store.set_user_ban(user.id, Some(until)).unwrap());
        let banned = store.get_user_by_id(user.id).unwrap().unwrap();
        assert!(banned.is_banned);
        assert_eq!(banned.banned_until.as_deref(), Some("2030-01-01T00:00:00.000000"));

        assert!(store.set_user_ban(user.id, None).unwrap());
        let forever = store.get_user_by_id(user.id).unwrap().unwrap();
        assert!(forever.is_banned);
        assert!(forever.banned_until.is_none());

        assert!(store.unset_user_ban(user.id).unwrap());
        let cleared = store.get_user_by_id(user.id).unwrap().unwrap();
        assert!(!cleared.is_banned);
        assert!(!store.unset_user_ban(999).unwrap());
    }

    #[test]
    fn test_delete_user_cascades() {
        let (store, _dir) = test_store();
        let employer = store.create_user(&NewUser::new("emp@b.com", "h")).unwrap();
        let candidate = store.create_user(&NewUser::new("cand@b.com", "h")).unwrap();

        let job_a = store
            .create_job(&NewJob::new(employer.id, "Baker", "Bake bread"))
            .unwrap();
        let job_b = store
            .create_job(&NewJob::new(employer.id, "Cook", "Cook food"))
            .unwrap();
        for job in [&job_a, &job_b] {
            store
                .create_application(&NewApplication::new(job.id, candidate.id))
                .unwrap();
            store
                .create_rating(RatingTarget::Job(job.id), candidate.id, 4, "")
                .unwrap();
        }
        store
            .create_rating(RatingTarget::User(employer.id), candidate.id, 5, "great")
            .unwrap();
        // Targets the candidate, so it must survive the employer's deletion.
        let keeper = store
            .create_rating(RatingTarget::User(candidate.id), candidate.id, 3, "")
            .unwrap();

        assert!(store.delete_user(employer.id).unwrap());

        assert!(store.get_user_by_id(employer.id).unwrap().is_none());
        let jobs_left = count(
            &store,
            "SELECT COUNT(*) FROM jobs WHERE employer_id = ?1",
            employer.id,
        );
        assert_eq!(jobs_left, 0);
        for job in [&job_a, &job_b] {
            let apps_left = count(
                &store,
                "SELECT COUNT(*) FROM applications WHERE job_id = ?1",
                job.id,
            );
            assert_eq!(apps_left, 0);
            let job_ratings_left = count(
                &store,
                "SELECT COUNT(*) FROM ratings WHERE target_type = 'job' AND target_id = ?1",
                job.id,
            );
            assert_eq!(job_ratings_left, 0);
        }
        let user_ratings_left = count(
            &store,
            "SELECT COUNT(*) FROM ratings WHERE target_type = 'user' AND target_id = ?1",
            employer.id,
        );
        assert_eq!(user_ratings_left, 0);
        assert!(store.get_rating_by_id(keeper.id).unwrap().is_some());
        assert!(store.get_user_by_id(candidate.id).unwrap().is_some());
    }

    #[test]
    fn test_delete_user_removes_own_applications_and_ratings() {
        let (store, _dir) = test_store();
        let employer = store.create_user(&NewUser::new("emp@b.com", "h")).unwrap();
        let candidate = store.create_user(&NewUser::new("cand@b.com", "h")).unwrap();
        let job = store
            .create_job(&NewJob::new(employer.id, "Baker", "Bake bread"))
            .unwrap();
        store
            .create_application(&NewApplication::new(job.id, candidate.id))
            .unwrap();
        store
            .create_rating(RatingTarget::Job(job.id), candidate.id, 2, "")
            .unwrap();

        assert!(store.delete_user(candidate.id).unwrap());

        assert!(store.list_applications_by_job(job.id).unwrap().is_empty());
        assert!(store
            .list_ratings_for_target(RatingTarget::Job(job.id))
            .unwrap()
            .is_empty());
        assert!(store.get_job_by_id(job.id).unwrap().is_some());
        assert!(!store.delete_user(candidate.id).unwrap());
    }
}
