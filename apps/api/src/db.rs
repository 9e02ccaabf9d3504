use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

/// Creates and returns a PostgreSQL connection pool.
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    info!("Connecting to PostgreSQL...");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;

    info!("PostgreSQL connection pool established");
    Ok(pool)
}

/// Creates the job and document tables if they do not exist yet.
pub async fn init_schema(pool: &PgPool) -> Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS documents (
            id UUID PRIMARY KEY,
            kind TEXT NOT NULL,
            text_ref TEXT NOT NULL,
            extracted_text TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS evaluation_jobs (
            id UUID PRIMARY KEY,
            job_title TEXT NOT NULL,
            cv_document_id UUID NOT NULL REFERENCES documents(id),
            report_document_id UUID NOT NULL REFERENCES documents(id),
            status TEXT NOT NULL,
            result JSONB,
            error_detail TEXT,
            attempt_count INTEGER NOT NULL DEFAULT 0,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    info!("Database schema ready");
    Ok(())
}
