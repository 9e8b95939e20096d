//! Persistence layer for a job board: users, job postings, applications,
//! single-use tokens, and ratings in one SQLite file.
//!
//! Every accessor is a method on [`Store`] that opens its own connection, so
//! no state is shared between calls.

mod applications;
pub mod db;
pub mod error;
mod jobs;
pub mod models;
mod ratings;
pub mod tokens;
mod users;

pub use db::Store;
pub use error::{Result, StoreError};
pub use models::{
    Application, Job, JobApplicant, JobUpdate, NewApplication, NewJob, NewUser, RatedBy, Rating,
    RatingSummary, RatingTarget, Role, TokenInfo, User,
};
pub use tokens::DEFAULT_TOKEN_TTL_SECS;
