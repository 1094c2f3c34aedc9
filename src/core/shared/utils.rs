use anyhow::{anyhow, Context, Result};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use diesel::{
    r2d2::{ConnectionManager, Pool, PoolError},
    PgConnection,
};
use std::str::FromStr;

use crate::core::config::DatabaseConfig;
use crate::core::shared::error::ApiError;

pub type DbPool = Pool<ConnectionManager<PgConnection>>;

pub fn create_conn(config: &DatabaseConfig) -> Result<DbPool, PoolError> {
    let manager = ConnectionManager::<PgConnection>::new(config.url.clone());
    Pool::builder()
        .max_size(config.max_connections)
        .build(manager)
}

/// Builds a pool without opening a connection. The first checkout will fail
/// if the database is unreachable.
pub fn create_lazy_conn(config: &DatabaseConfig) -> DbPool {
    let manager = ConnectionManager::<PgConnection>::new(config.url.clone());
    Pool::builder()
        .max_size(config.max_connections)
        .build_unchecked(manager)
}

/// Run database migrations
pub fn run_migrations(pool: &DbPool) -> Result<()> {
    use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

    const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

    let mut conn = pool.get().context("Failed to get connection for migrations")?;
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| anyhow!("Migration error: {e}"))?;
    for version in applied {
        log::info!("Applied migration {version}");
    }
    Ok(())
}

/// Runs a blocking diesel closure on the blocking thread pool with a pooled
/// connection.
pub async fn with_conn<T, F>(pool: &DbPool, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&mut PgConnection) -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || {
        let mut conn = pool
            .get()
            .map_err(|e| ApiError::Database(format!("DB error: {e}")))?;
        f(&mut conn)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("Task join error: {e}")))?
}

/// Runs CPU-bound work such as password hashing off the async workers.
pub async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(format!("Task join error: {e}")))?
}

pub fn bd(val: f64) -> BigDecimal {
    BigDecimal::from_str(&val.to_string()).unwrap_or_else(|_| BigDecimal::from(0))
}

/// Largest magnitude a `NUMERIC(10,2)` column holds: 99999999.99.
pub fn max_numeric() -> BigDecimal {
    BigDecimal::from(9_999_999_999_i64) / BigDecimal::from(100)
}

pub fn fits_numeric(value: &BigDecimal) -> bool {
    value.abs() <= max_numeric()
}

pub fn check_numeric(value: &BigDecimal, field: &str) -> Result<(), ApiError> {
    if !fits_numeric(value) {
        return Err(ApiError::validation(format!(
            "El campo {field} excede el máximo permitido ({})",
            max_numeric()
        )));
    }
    Ok(())
}

/// Converts a request amount to a two-decimal `BigDecimal`, rejecting NaN,
/// infinities, negative values and amounts the columns cannot store.
pub fn money(val: f64, field: &str) -> Result<BigDecimal, ApiError> {
    if !val.is_finite() || val < 0.0 {
        return Err(ApiError::validation(format!(
            "El campo {field} debe ser un número no negativo"
        )));
    }
    let amount = bd(val).round(2);
    check_numeric(&amount, field)?;
    Ok(amount)
}

pub fn require_non_empty(value: &str, field: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::validation(format!("El campo {field} es obligatorio")));
    }
    Ok(())
}

/// Parses a range bound given as `YYYY-MM-DD` or RFC 3339. A plain end date
/// covers the whole day.
pub fn parse_range_bound(raw: &str, is_end: bool) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
    let start = date.and_hms_opt(0, 0, 0)?.and_utc();
    if is_end {
        Some(start + Duration::days(1) - Duration::microseconds(1))
    } else {
        Some(start)
    }
}

pub fn parse_date_range(
    inicio: Option<&str>,
    fin: Option<&str>,
) -> Result<(DateTime<Utc>, DateTime<Utc>), ApiError> {
    let (Some(inicio), Some(fin)) = (inicio, fin) else {
        return Err(ApiError::bad_request(
            "Se requieren los parámetros fechaInicio y fechaFin",
        ));
    };
    let desde = parse_range_bound(inicio, false)
        .ok_or_else(|| ApiError::bad_request(format!("Fecha inválida: {inicio}")))?;
    let hasta = parse_range_bound(fin, true)
        .ok_or_else(|| ApiError::bad_request(format!("Fecha inválida: {fin}")))?;
    if desde > hasta {
        return Err(ApiError::bad_request(
            "fechaInicio no puede ser posterior a fechaFin",
        ));
    }
    Ok((desde, hasta))
}

pub fn mask_database_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            let creds = &url[scheme_end + 3..at];
            match creds.split_once(':') {
                Some((user, _)) => format!("{}{}:****{}", &url[..scheme_end + 3], user, &url[at..]),
                None => url.to_string(),
            }
        }
        _ => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[tokio::test]
    async fn test_blocking_runs_off_the_calling_thread() {
        let caller = std::thread::current().id();
        let worker = blocking(move || Ok(std::thread::current().id())).await.unwrap();
        assert_ne!(worker, caller);

        let err = blocking(|| Err::<(), _>(ApiError::validation("corto"))).await;
        assert!(matches!(err, Err(ApiError::Validation(_))));
    }

    #[test]
    fn test_money_rounds_and_validates() {
        assert_eq!(money(12.346, "precio").unwrap(), BigDecimal::from_str("12.35").unwrap());
        assert!(money(-1.0, "precio").is_err());
        assert!(money(f64::NAN, "precio").is_err());
    }

    #[test]
    fn test_money_rejects_amounts_beyond_numeric_10_2() {
        assert_eq!(
            money(99_999_999.99, "precio_unitario").unwrap(),
            BigDecimal::from_str("99999999.99").unwrap()
        );
        assert!(matches!(
            money(1.0e9, "precio_unitario"),
            Err(ApiError::Validation(_))
        ));
        assert!(!fits_numeric(&BigDecimal::from_str("-100000000").unwrap()));
    }

    #[test]
    fn test_parse_range_plain_dates_cover_whole_day() {
        let (desde, hasta) = parse_date_range(Some("2024-03-01"), Some("2024-03-01")).unwrap();
        assert_eq!(desde.hour(), 0);
        assert_eq!(hasta.hour(), 23);
        assert_eq!(hasta.minute(), 59);
    }

    #[test]
    fn test_parse_range_accepts_rfc3339() {
        let (desde, _) =
            parse_date_range(Some("2024-03-01T10:30:00-06:00"), Some("2024-03-02")).unwrap();
        assert_eq!(desde.hour(), 16);
    }

    #[test]
    fn test_parse_range_rejects_missing_or_inverted() {
        assert!(parse_date_range(None, Some("2024-03-01")).is_err());
        assert!(parse_date_range(Some("ayer"), Some("2024-03-01")).is_err());
        assert!(parse_date_range(Some("2024-03-02"), Some("2024-03-01")).is_err());
    }

    #[test]
    fn test_mask_database_url() {
        assert_eq!(
            mask_database_url("postgres://app:secret@db:5432/baterias_db"),
            "postgres://app:****@db:5432/baterias_db"
        );
        assert_eq!(
            mask_database_url("postgres://localhost/baterias_db"),
            "postgres://localhost/baterias_db"
        );
    }
}
