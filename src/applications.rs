use rusqlite::{OptionalExtension, params};

use crate::db::{Store, now_iso};
use crate::error::Result;
use crate::models::{Application, JobApplicant, NewApplication};

impl Store {
    /// Record an application. The same candidate may apply to the same job
    /// more than once.
    pub fn create_application(&self, application: &NewApplication) -> Result<Application> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO applications
             (job_id, user_id, cover_letter, resume_text,
              cover_letter_path, resume_path, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                application.job_id,
                application.user_id,
                application.cover_letter,
                application.resume_text,
                application.cover_letter_path,
                application.resume_path,
                now_iso(),
            ],
        )?;
        let id = conn.last_insert_rowid();
        drop(conn);

        self.get_application_by_id(id)?
            .ok_or_else(|| rusqlite::Error::QueryReturnedNoRows.into())
    }

    pub fn get_application_by_id(&self, id: i64) -> Result<Option<Application>> {
        let conn = self.connect()?;
        let application = conn
            .query_row(
                "SELECT id, job_id, user_id, cover_letter, resume_text,
                        cover_letter_path, resume_path, created_at
                 FROM applications WHERE id = ?1",
                [id],
                Self::row_to_application,
            )
            .optional()?;
        Ok(application)
    }

    /// Applications for a job with each applicant's email, newest first.
    pub fn list_applications_by_job(&self, job_id: i64) -> Result<Vec<JobApplicant>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT a.id, a.job_id, a.user_id, a.cover_letter, a.resume_text,
                    a.cover_letter_path, a.resume_path, a.created_at,
                    u.email AS applicant_email
             FROM applications a
             JOIN users u ON u.id = a.user_id
             WHERE a.job_id = ?1
             ORDER BY a.created_at DESC, a.id DESC",
        )?;
        let applicants = stmt
            .query_map([job_id], |row| {
                Ok(JobApplicant {
                    application: Self::row_to_application(row)?,
                    applicant_email: row.get("applicant_email")?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(applicants)
    }

    /// A candidate's application history, newest first.
    pub fn list_applications_by_user(&self, user_id: i64) -> Result<Vec<Application>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT id, job_id, user_id, cover_letter, resume_text,
                    cover_letter_path, resume_path, created_at
             FROM applications
             WHERE user_id = ?1
             ORDER BY created_at DESC, id DESC",
        )?;
        let applications = stmt
            .query_map([user_id], Self::row_to_application)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(applications)
    }

    fn row_to_application(row: &rusqlite::Row) -> rusqlite::Result<Application> {
        Ok(Application {
            id: row.get("id")?,
            job_id: row.get("job_id")?,
            user_id: row.get("user_id")?,
            cover_letter: row.get("cover_letter")?,
            resume_text: row.get("resume_text")?,
            cover_letter_path: row.get("cover_letter_path")?,
            resume_path: row.get("resume_path")?,
            created_at: row.get("created_at")?,
        })
    }
}
