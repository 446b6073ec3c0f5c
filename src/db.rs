use sqlx::PgPool;

/// Name of the exclusion constraint that keeps exclusive appointment date ranges apart.
pub const APPOINTMENT_DATERANGE_CONSTRAINT: &str = "mine_party_appt_daterange_excl";

/// Integrity rules the handlers translate into user-facing 400s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstraintKind {
    /// SQLSTATE 23P01; carries the constraint name when the driver reports it.
    Exclusion(Option<String>),
    /// SQLSTATE 23503
    ForeignKey(Option<String>),
    /// SQLSTATE 23505
    Unique(Option<String>),
}

impl ConstraintKind {
    /// Matches the overlapping-appointment rule by name or, failing that, by message text.
    pub fn is_daterange_exclusion(&self, message: &str) -> bool {
        match self {
            ConstraintKind::Exclusion(name) => {
                name.as_deref().map_or(false, |n| n.contains("daterange_excl")) || message.contains("daterange_excl")
            }
            _ => false,
        }
    }
}

pub fn classify_constraint(code: Option<&str>, constraint: Option<&str>) -> Option<ConstraintKind> {
    let name = constraint.map(str::to_string);
    match code? {
        "23P01" => Some(ConstraintKind::Exclusion(name)),
        "23503" => Some(ConstraintKind::ForeignKey(name)),
        "23505" => Some(ConstraintKind::Unique(name)),
        _ => None,
    }
}

/// Classifies a database error by SQLSTATE. Returns the kind together with the driver message.
pub fn constraint_kind(err: &sqlx::Error) -> Option<(ConstraintKind, String)> {
    match err {
        sqlx::Error::Database(db_err) => {
            let code = db_err.code();
            classify_constraint(code.as_deref(), db_err.constraint())
                .map(|kind| (kind, db_err.message().to_string()))
        }
        _ => None,
    }
}

/// Idempotent schema bootstrap for development and test databases.
pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    // Extensions are required: similarity() for search, gist equality on uuid/text for the exclusion rule.
    for ext in ["pg_trgm", "btree_gist"] {
        sqlx::query(&format!("CREATE EXTENSION IF NOT EXISTS {}", ext)).execute(pool).await?;
    }

    let tables: [(&str, &str); 11] = [
        (
            "mine",
            r#"CREATE TABLE IF NOT EXISTS mine (
                mine_guid UUID PRIMARY KEY,
                mine_no VARCHAR(10) NOT NULL UNIQUE,
                mine_name VARCHAR(60) NOT NULL,
                deleted_ind BOOLEAN NOT NULL DEFAULT FALSE,
                create_user VARCHAR(60) NOT NULL,
                create_timestamp TIMESTAMPTZ NOT NULL DEFAULT now(),
                update_user VARCHAR(60) NOT NULL,
                update_timestamp TIMESTAMPTZ NOT NULL DEFAULT now()
            )"#,
        ),
        (
            "permit",
            r#"CREATE TABLE IF NOT EXISTS permit (
                permit_id SERIAL PRIMARY KEY,
                permit_guid UUID NOT NULL UNIQUE,
                mine_guid UUID NOT NULL REFERENCES mine(mine_guid),
                permit_no VARCHAR(16) NOT NULL,
                permit_status_code VARCHAR(2),
                issue_date DATE,
                expiry_date DATE,
                create_user VARCHAR(60) NOT NULL,
                create_timestamp TIMESTAMPTZ NOT NULL DEFAULT now(),
                update_user VARCHAR(60) NOT NULL,
                update_timestamp TIMESTAMPTZ NOT NULL DEFAULT now()
            )"#,
        ),
        (
            "party",
            r#"CREATE TABLE IF NOT EXISTS party (
                party_guid UUID PRIMARY KEY,
                first_name VARCHAR(100),
                party_name VARCHAR(100) NOT NULL,
                party_type_code VARCHAR(3) NOT NULL CHECK (party_type_code IN ('PER', 'ORG')),
                email VARCHAR(254),
                phone_no VARCHAR(12),
                deleted_ind BOOLEAN NOT NULL DEFAULT FALSE,
                create_user VARCHAR(60) NOT NULL,
                create_timestamp TIMESTAMPTZ NOT NULL DEFAULT now(),
                update_user VARCHAR(60) NOT NULL,
                update_timestamp TIMESTAMPTZ NOT NULL DEFAULT now()
            )"#,
        ),
        (
            "mine_party_appt_type_code",
            r#"CREATE TABLE IF NOT EXISTS mine_party_appt_type_code (
                mine_party_appt_type_code VARCHAR(3) PRIMARY KEY,
                description VARCHAR(100) NOT NULL,
                active_ind BOOLEAN NOT NULL DEFAULT TRUE
            )"#,
        ),
        (
            "mine_tailings_storage_facility",
            r#"CREATE TABLE IF NOT EXISTS mine_tailings_storage_facility (
                mine_tailings_storage_facility_guid UUID PRIMARY KEY,
                mine_guid UUID NOT NULL REFERENCES mine(mine_guid),
                mine_tailings_storage_facility_name VARCHAR(60) NOT NULL,
                create_user VARCHAR(60) NOT NULL,
                create_timestamp TIMESTAMPTZ NOT NULL DEFAULT now(),
                update_user VARCHAR(60) NOT NULL,
                update_timestamp TIMESTAMPTZ NOT NULL DEFAULT now()
            )"#,
        ),
        (
            "mine_party_appt",
            // Exclusive roles (mine manager per mine, permittee per permit) must not overlap in time.
            r#"CREATE TABLE IF NOT EXISTS mine_party_appt (
                mine_party_appt_id SERIAL PRIMARY KEY,
                mine_party_appt_guid UUID NOT NULL UNIQUE,
                mine_guid UUID NOT NULL REFERENCES mine(mine_guid),
                party_guid UUID NOT NULL REFERENCES party(party_guid),
                mine_party_appt_type_code VARCHAR(3) NOT NULL REFERENCES mine_party_appt_type_code(mine_party_appt_type_code),
                permit_guid UUID REFERENCES permit(permit_guid),
                mine_tailings_storage_facility_guid UUID REFERENCES mine_tailings_storage_facility(mine_tailings_storage_facility_guid),
                start_date DATE,
                end_date DATE,
                processed_by VARCHAR(60),
                processed_on TIMESTAMPTZ DEFAULT now(),
                deleted_ind BOOLEAN NOT NULL DEFAULT FALSE,
                create_user VARCHAR(60) NOT NULL,
                create_timestamp TIMESTAMPTZ NOT NULL DEFAULT now(),
                update_user VARCHAR(60) NOT NULL,
                update_timestamp TIMESTAMPTZ NOT NULL DEFAULT now(),
                CONSTRAINT mine_party_appt_daterange_excl EXCLUDE USING gist (
                    mine_guid WITH =,
                    mine_party_appt_type_code WITH =,
                    (COALESCE(permit_guid, '00000000-0000-0000-0000-000000000000'::uuid)) WITH =,
                    daterange(start_date, end_date, '[]') WITH &&
                ) WHERE (deleted_ind = FALSE AND mine_party_appt_type_code IN ('MMG', 'PMT'))
            )"#,
        ),
        (
            "mine_report_definition",
            r#"CREATE TABLE IF NOT EXISTS mine_report_definition (
                mine_report_definition_id SERIAL PRIMARY KEY,
                mine_report_definition_guid UUID NOT NULL UNIQUE,
                report_name VARCHAR(100) NOT NULL UNIQUE,
                description TEXT,
                due_date_period_months INTEGER,
                active_ind BOOLEAN NOT NULL DEFAULT TRUE
            )"#,
        ),
        (
            "mine_report",
            r#"CREATE TABLE IF NOT EXISTS mine_report (
                mine_report_id SERIAL PRIMARY KEY,
                mine_report_guid UUID NOT NULL UNIQUE,
                mine_report_definition_id INTEGER NOT NULL REFERENCES mine_report_definition(mine_report_definition_id),
                mine_guid UUID NOT NULL REFERENCES mine(mine_guid),
                permit_id INTEGER REFERENCES permit(permit_id),
                received_date TIMESTAMPTZ,
                due_date TIMESTAMPTZ NOT NULL,
                submission_year INTEGER,
                deleted_ind BOOLEAN NOT NULL DEFAULT FALSE,
                create_user VARCHAR(60) NOT NULL,
                create_timestamp TIMESTAMPTZ NOT NULL DEFAULT now(),
                update_user VARCHAR(60) NOT NULL,
                update_timestamp TIMESTAMPTZ NOT NULL DEFAULT now()
            )"#,
        ),
        (
            "mine_incident",
            r#"CREATE TABLE IF NOT EXISTS mine_incident (
                mine_incident_id SERIAL PRIMARY KEY,
                mine_incident_guid UUID NOT NULL UNIQUE,
                mine_guid UUID NOT NULL REFERENCES mine(mine_guid),
                incident_timestamp TIMESTAMPTZ NOT NULL,
                incident_description TEXT,
                create_user VARCHAR(60) NOT NULL,
                create_timestamp TIMESTAMPTZ NOT NULL DEFAULT now(),
                update_user VARCHAR(60) NOT NULL,
                update_timestamp TIMESTAMPTZ NOT NULL DEFAULT now()
            )"#,
        ),
        (
            "mine_document",
            r#"CREATE TABLE IF NOT EXISTS mine_document (
                mine_document_guid UUID PRIMARY KEY,
                mine_guid UUID NOT NULL REFERENCES mine(mine_guid),
                document_name VARCHAR(255) NOT NULL,
                deleted_ind BOOLEAN NOT NULL DEFAULT FALSE,
                create_user VARCHAR(60) NOT NULL,
                create_timestamp TIMESTAMPTZ NOT NULL DEFAULT now(),
                update_user VARCHAR(60) NOT NULL,
                update_timestamp TIMESTAMPTZ NOT NULL DEFAULT now()
            )"#,
        ),
        (
            "permit_amendment_document",
            r#"CREATE TABLE IF NOT EXISTS permit_amendment_document (
                permit_amendment_document_guid UUID PRIMARY KEY,
                mine_guid UUID NOT NULL REFERENCES mine(mine_guid),
                permit_id INTEGER REFERENCES permit(permit_id),
                document_name VARCHAR(255) NOT NULL,
                create_user VARCHAR(60) NOT NULL,
                create_timestamp TIMESTAMPTZ NOT NULL DEFAULT now(),
                update_user VARCHAR(60) NOT NULL,
                update_timestamp TIMESTAMPTZ NOT NULL DEFAULT now()
            )"#,
        ),
    ];

    for (name, ddl) in tables {
        sqlx::query(ddl).execute(pool).await.map_err(|e| {
            tracing::error!("Failed to create table {}: {}", name, e);
            anyhow::anyhow!("schema bootstrap failed on {}: {}", name, e)
        })?;
    }

    seed_code_tables(pool).await?;

    let indexes = [
        ("idx_mine_name_trgm", "CREATE INDEX IF NOT EXISTS idx_mine_name_trgm ON mine USING gin (mine_name gin_trgm_ops)"),
        ("idx_mine_no_trgm", "CREATE INDEX IF NOT EXISTS idx_mine_no_trgm ON mine USING gin (mine_no gin_trgm_ops)"),
        ("idx_party_name_trgm", "CREATE INDEX IF NOT EXISTS idx_party_name_trgm ON party USING gin (party_name gin_trgm_ops)"),
        ("idx_party_first_name_trgm", "CREATE INDEX IF NOT EXISTS idx_party_first_name_trgm ON party USING gin (first_name gin_trgm_ops)"),
        ("idx_permit_no_trgm", "CREATE INDEX IF NOT EXISTS idx_permit_no_trgm ON permit USING gin (permit_no gin_trgm_ops)"),
        ("idx_mine_document_name_trgm", "CREATE INDEX IF NOT EXISTS idx_mine_document_name_trgm ON mine_document USING gin (document_name gin_trgm_ops)"),
        ("idx_permit_amendment_document_name_trgm", "CREATE INDEX IF NOT EXISTS idx_permit_amendment_document_name_trgm ON permit_amendment_document USING gin (document_name gin_trgm_ops)"),
        ("idx_permit_mine", "CREATE INDEX IF NOT EXISTS idx_permit_mine ON permit(mine_guid, update_timestamp DESC)"),
        ("idx_mine_incident_mine", "CREATE INDEX IF NOT EXISTS idx_mine_incident_mine ON mine_incident(mine_guid, update_timestamp DESC)"),
        ("idx_mine_report_mine", "CREATE INDEX IF NOT EXISTS idx_mine_report_mine ON mine_report(mine_guid, due_date)"),
        ("idx_mine_party_appt_mine", "CREATE INDEX IF NOT EXISTS idx_mine_party_appt_mine ON mine_party_appt(mine_guid)"),
        ("idx_mine_party_appt_party", "CREATE INDEX IF NOT EXISTS idx_mine_party_appt_party ON mine_party_appt(party_guid)"),
    ];

    for (name, query) in indexes {
        if let Err(e) = sqlx::query(query).execute(pool).await {
            match &e {
                sqlx::Error::Database(db_err) if db_err.message().to_lowercase().contains("already exists") => {
                    tracing::debug!("Index {} already exists, skipping", name);
                }
                _ => tracing::warn!("Failed to create index {}: {}", name, e),
            }
        }
    }

    Ok(())
}

async fn seed_code_tables(pool: &PgPool) -> anyhow::Result<()> {
    let appt_types = [
        ("MMG", "Mine Manager"),
        ("PMT", "Permittee"),
        ("EOR", "Engineer of Record"),
        ("SHB", "Shift Boss"),
        ("MOR", "Mine Operator"),
    ];
    for (code, description) in appt_types {
        sqlx::query(
            "INSERT INTO mine_party_appt_type_code (mine_party_appt_type_code, description)
             VALUES ($1, $2) ON CONFLICT (mine_party_appt_type_code) DO NOTHING",
        )
        .bind(code)
        .bind(description)
        .execute(pool)
        .await?;
    }

    let definitions = [
        ("Annual Reclamation", 12),
        ("Annual DSI", 12),
        ("Mine Emergency Response Plan", 12),
        ("Tailings Storage Facility Inspection", 12),
        ("Water Quality Monitoring Report", 3),
    ];
    for (report_name, months) in definitions {
        sqlx::query(
            "INSERT INTO mine_report_definition (mine_report_definition_guid, report_name, due_date_period_months)
             VALUES ($1, $2, $3) ON CONFLICT (report_name) DO NOTHING",
        )
        .bind(uuid::Uuid::new_v4())
        .bind(report_name)
        .bind(months)
        .execute(pool)
        .await?;
    }

    Ok(())
}
