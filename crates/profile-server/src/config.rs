use std::env;

use anyhow::Context;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub session_secret: String,
    pub session_expires_in: i64,
    pub port: u16,
    pub firebase_api_key: String,
    pub firebase_project_id: String,
    pub run_migrations: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            session_secret: env::var("SESSION_SECRET").context("SESSION_SECRET must be set")?,
            session_expires_in: env::var("SESSION_EXPIRES_IN")
                .unwrap_or_else(|_| "3600".to_string()) // 1 hour
                .parse()
                .context("SESSION_EXPIRES_IN must be a number of seconds")?,
            port: env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .context("PORT must be a valid port number")?,
            firebase_api_key: env::var("FIREBASE_API_KEY")
                .context("FIREBASE_API_KEY must be set")?,
            firebase_project_id: env::var("FIREBASE_PROJECT_ID")
                .context("FIREBASE_PROJECT_ID must be set")?,
            run_migrations: env::var("RUN_MIGRATIONS")
                .map(|v| !matches!(v.as_str(), "0" | "false" | "no"))
                .unwrap_or(true),
        })
    }

    /// Configuration that only needs a database, for the `migrate` subcommand.
    pub fn database_url_from_env() -> anyhow::Result<String> {
        env::var("DATABASE_URL").context("DATABASE_URL must be set")
    }
}
