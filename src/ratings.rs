use rusqlite::{OptionalExtension, params};

use crate::db::{Store, now_iso};
use crate::error::Result;
use crate::models::{RatedBy, Rating, RatingSummary, RatingTarget};

impl Store {
    /// Store a 1-5 rating. Values outside that range are rejected by the
    /// table's CHECK constraint as `StoreError::Constraint`.
    pub fn create_rating(
        &self,
        target: RatingTarget,
        rater_id: i64,
        rating: i64,
        comment: &str,
    ) -> Result<Rating> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO ratings (target_type, target_id, rater_id, rating, comment, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![target.kind(), target.id(), rater_id, rating, comment, now_iso()],
        )?;
        let id = conn.last_insert_rowid();
        drop(conn);

        self.get_rating_by_id(id)?
            .ok_or_else(|| rusqlite::Error::QueryReturnedNoRows.into())
    }

    /// Ratings for a user or job with each rater's email, newest first.
    pub fn list_ratings_for_target(&self, target: RatingTarget) -> Result<Vec<RatedBy>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT r.id, r.target_type, r.target_id, r.rater_id, r.rating, r.comment,
                    r.created_at, u.email AS rater_email
             FROM ratings r
             JOIN users u ON u.id = r.rater_id
             WHERE r.target_type = ?1 AND r.target_id = ?2
             ORDER BY r.created_at DESC, r.id DESC",
        )?;
        let ratings = stmt
            .query_map(params![target.kind(), target.id()], |row| {
                Ok(RatedBy {
                    rating: Self::row_to_rating(row)?,
                    rater_email: row.get("rater_email")?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ratings)
    }

    pub fn average_rating_for_target(&self, target: RatingTarget) -> Result<RatingSummary> {
        let conn = self.connect()?;
        let summary = conn.query_row(
            "SELECT AVG(rating) AS avg_rating, COUNT(*) AS count
             FROM ratings WHERE target_type = ?1 AND target_id = ?2",
            params![target.kind(), target.id()],
            |row| {
                Ok(RatingSummary {
                    average: row.get("avg_rating")?,
                    count: row.get("count")?,
                })
            },
        )?;
        Ok(summary)
    }

    pub fn get_rating_by_id(&self, rating_id: i64) -> Result<Option<Rating>> {
        let conn = self.connect()?;
        let rating = conn
            .query_row(
                "SELECT id, target_type, target_id, rater_id, rating, comment, created_at
                 FROM ratings WHERE id = ?1",
                [rating_id],
                Self::row_to_rating,
            )
            .optional()?;
        Ok(rating)
    }

    pub fn delete_rating(&self, rating_id: i64) -> Result<bool> {
        let conn = self.connect()?;
        let deleted = conn.execute("DELETE FROM ratings WHERE id = ?1", [rating_id])?;
        Ok(deleted > 0)
    }

    fn row_to_rating(row: &rusqlite::Row) -> rusqlite::Result<Rating> {
        let kind: String = row.get("target_type")?;
        let target_id: i64 = row.get("target_id")?;
        let target = RatingTarget::from_parts(&kind, target_id).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                format!("unknown rating target type: {kind}").into(),
            )
        })?;

        Ok(Rating {
            id: row.get("id")?,
            target,
            rater_id: row.get("rater_id")?,
            rating: row.get("rating")?,
            comment: row.get("comment")?,
            created_at: row.get("created_at")?,
        })
    }
}
