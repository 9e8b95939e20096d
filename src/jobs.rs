use rusqlite::types::ToSql;
use rusqlite::{OptionalExtension, params, params_from_iter};
use tracing::debug;

use crate::db::{Store, now_iso};
use crate::error::Result;
use crate::models::{Job, JobUpdate, NewJob};

const JOB_COLUMNS: &str =
    "id, employer_id, title, description, location_text, lat, lng, salary, tags, created_at";

impl Store {
    pub fn create_job(&self, job: &NewJob) -> Result<Job> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO jobs
             (employer_id, title, description, location_text, lat, lng, salary, tags, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                job.employer_id,
                job.title,
                job.description,
                job.location_text,
                job.lat,
                job.lng,
                job.salary,
                job.tags,
                now_iso(),
            ],
        )?;
        let id = conn.last_insert_rowid();
        drop(conn);

        self.get_job_by_id(id)?
            .ok_or_else(|| rusqlite::Error::QueryReturnedNoRows.into())
    }

    /// Rewrite only the fields set in `update` and return the current row.
    /// An empty update runs no statement.
    pub fn update_job(&self, job_id: i64, update: &JobUpdate) -> Result<Option<Job>> {
        let mut sets: Vec<&str> = Vec::new();
        let mut values: Vec<&dyn ToSql> = Vec::new();

        if let Some(ref title) = update.title {
            sets.push("title = ?");
            values.push(title);
        }
        if let Some(ref description) = update.description {
            sets.push("description = ?");
            values.push(description);
        }
        if let Some(ref location_text) = update.location_text {
            sets.push("location_text = ?");
            values.push(location_text);
        }
        if let Some(ref lat) = update.lat {
            sets.push("lat = ?");
            values.push(lat);
        }
        if let Some(ref lng) = update.lng {
            sets.push("lng = ?");
            values.push(lng);
        }
        if let Some(ref salary) = update.salary {
            sets.push("salary = ?");
            values.push(salary);
        }
        if let Some(ref tags) = update.tags {
            sets.push("tags = ?");
            values.push(tags);
        }

        if !sets.is_empty() {
            values.push(&job_id);
            let sql = format!("UPDATE jobs SET {} WHERE id = ?", sets.join(", "));
            let conn = self.connect()?;
            conn.execute(&sql, params_from_iter(values))?;
        }

        self.get_job_by_id(job_id)
    }

    /// Delete a job with its applications and the ratings that target it.
    pub fn delete_job(&self, job_id: i64) -> Result<bool> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let applications = tx.execute("DELETE FROM applications WHERE job_id = ?1", [job_id])?;
        let ratings = tx.execute(
            "DELETE FROM ratings WHERE target_type = 'job' AND target_id = ?1",
            [job_id],
        )?;
        let deleted = tx.execute("DELETE FROM jobs WHERE id = ?1", [job_id])?;
        tx.commit()?;

        debug!(job_id, applications, ratings, "deleted job");
        Ok(deleted > 0)
    }

    pub fn get_job_by_id(&self, job_id: i64) -> Result<Option<Job>> {
        let conn = self.connect()?;
        let job = conn
            .query_row(
                &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"),
                [job_id],
                Self::row_to_job,
            )
            .optional()?;
        Ok(job)
    }

    /// Newest first. `None` or `Some(0)` returns every job.
    pub fn list_jobs(&self, limit: Option<u32>) -> Result<Vec<Job>> {
        let limit = limit.filter(|&n| n > 0);
        let mut sql = format!("SELECT {JOB_COLUMNS} FROM jobs ORDER BY created_at DESC, id DESC");
        if limit.is_some() {
            sql.push_str(" LIMIT ?1");
        }

        let conn = self.connect()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = match limit {
            Some(n) => stmt.query_map([n], Self::row_to_job)?,
            None => stmt.query_map([], Self::row_to_job)?,
        };
        let jobs = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(jobs)
    }

    pub fn list_jobs_by_employer(&self, employer_id: i64) -> Result<Vec<Job>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE employer_id = ?1
             ORDER BY created_at DESC, id DESC"
        ))?;
        let jobs = stmt
            .query_map([employer_id], Self::row_to_job)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(jobs)
    }

    fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<Job> {
        Ok(Job {
            id: row.get("id")?,
            employer_id: row.get("employer_id")?,
            title: row.get("title")?,
            description: row.get("description")?,
            location_text: row.get("location_text")?,
            lat: row.get("lat")?,
            lng: row.get("lng")?,
            salary: row.get("salary")?,
            tags: row.get("tags")?,
            created_at: row.get("created_at")?,
        })
    }
}
