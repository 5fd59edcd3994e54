// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use rusqlite::{Connection, OptionalExtension, params};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};
use verdant_app::{
    AppSetting, PlantId, PlantRecord, SettingKey, SettingValue, SettingValueKind, SyncState,
};

pub mod blob;
pub mod tiered;

pub use blob::BlobStore;
pub use tiered::{StorageTier, TieredStore};

pub const APP_NAME: &str = "verdant";

const REQUIRED_SCHEMA: &[(&str, &[&str])] = &[
    (
        "plants",
        &[
            "id",
            "common_name",
            "scientific_name",
            "info",
            "image",
            "image_sha256",
            "water_interval_days",
            "sunlight_hours",
            "added_at",
            "last_watered_at",
            "next_water_at",
        ],
    ),
    ("settings", &["key", "value", "updated_at"]),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RequiredIndex {
    name: &'static str,
    create_sql: &'static str,
}

const REQUIRED_INDEXES: &[RequiredIndex] = &[
    RequiredIndex {
        name: "idx_plants_next_water_at",
        create_sql: "CREATE INDEX IF NOT EXISTS idx_plants_next_water_at ON plants (next_water_at);",
    },
    RequiredIndex {
        name: "idx_plants_common_name",
        create_sql: "CREATE INDEX IF NOT EXISTS idx_plants_common_name ON plants (common_name);",
    },
];

/// SQLite tier of the local store. Whole-collection writes are transactional:
/// a failed save leaves the previous collection intact.
pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        let printable = path.to_string_lossy().to_string();
        validate_db_path(&printable)?;
        let conn = Connection::open(path)
            .with_context(|| format!("open database at {}", path.display()))?;
        configure_connection(&conn)?;
        if printable != ":memory:" {
            set_private_permissions(path)?;
        }
        Ok(Self { conn })
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory database")?;
        configure_connection(&conn)?;
        Ok(Self { conn })
    }

    pub fn raw_connection(&self) -> &Connection {
        &self.conn
    }

    pub fn bootstrap(&self) -> Result<()> {
        if has_user_tables(&self.conn)? {
            validate_schema(&self.conn)?;
        } else {
            self.conn
                .execute_batch(include_str!("sql/schema.sql"))
                .context("create schema")?;
        }

        ensure_required_indexes(&self.conn)?;
        Ok(())
    }

    /// Atomically replace the persisted collection with `records`.
    pub fn save_collection(&mut self, records: &[PlantRecord]) -> Result<()> {
        let tx = self.conn.transaction().context("begin collection save")?;
        tx.execute("DELETE FROM plants", [])
            .context("clear plants table")?;

        for record in records {
            tx.execute(
                "
                INSERT INTO plants (
                  id, common_name, scientific_name, info, image, image_sha256,
                  water_interval_days, sunlight_hours,
                  added_at, last_watered_at, next_water_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ",
                params![
                    record.id.as_str(),
                    record.common_name,
                    record.scientific_name,
                    record.info,
                    record.image,
                    record.image_sha256,
                    record.water_interval_days,
                    record.sunlight_hours,
                    format_datetime(record.added_at)?,
                    format_datetime(record.last_watered_at)?,
                    format_datetime(record.next_water_at)?,
                ],
            )
            .with_context(|| format!("insert plant {}", record.id))?;
        }

        tx.commit().context("commit collection save")
    }

    pub fn load_collection(&self) -> Result<Vec<PlantRecord>> {
        let mut stmt = self
            .conn
            .prepare(
                "
                SELECT
                  id, common_name, scientific_name, info, image, image_sha256,
                  water_interval_days, sunlight_hours,
                  added_at, last_watered_at, next_water_at
                FROM plants
                ORDER BY added_at ASC, id ASC
                ",
            )
            .context("prepare plants query")?;
        let rows = stmt
            .query_map([], |row| {
                let id: String = row.get(0)?;
                let added_at_raw: String = row.get(8)?;
                let last_watered_raw: String = row.get(9)?;
                let next_water_raw: String = row.get(10)?;

                Ok(PlantRecord {
                    id: PlantId::from_raw(id),
                    common_name: row.get(1)?,
                    scientific_name: row.get(2)?,
                    info: row.get(3)?,
                    image: row.get(4)?,
                    image_sha256: row.get(5)?,
                    water_interval_days: row.get(6)?,
                    sunlight_hours: row.get(7)?,
                    added_at: parse_datetime(&added_at_raw).map_err(to_sql_error)?,
                    last_watered_at: parse_datetime(&last_watered_raw).map_err(to_sql_error)?,
                    next_water_at: parse_datetime(&next_water_raw).map_err(to_sql_error)?,
                })
            })
            .context("query plants")?;

        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("collect plants")
    }

    pub fn get_setting_raw(&self, key: &str) -> Result<Option<String>> {
        self.conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("load setting `{key}`"))
    }

    pub fn put_setting_raw(&self, key: &str, value: &str) -> Result<()> {
        let now = now_rfc3339()?;
        self.conn
            .execute(
                "
                INSERT INTO settings (key, value, updated_at)
                VALUES (?, ?, ?)
                ON CONFLICT (key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
                ",
                params![key, value, now],
            )
            .with_context(|| format!("store setting `{key}`"))?;
        Ok(())
    }

    pub fn get_setting(&self, key: SettingKey) -> Result<Option<SettingValue>> {
        let raw = self.get_setting_raw(key.as_str())?;
        raw.map(|value| {
            SettingValue::parse_for_key(key, &value).ok_or_else(|| {
                anyhow!(
                    "setting `{}` has invalid value `{}`; run `verdant --check`, then store a valid value",
                    key.as_str(),
                    value
                )
            })
        })
        .transpose()
    }

    pub fn put_setting(&self, key: SettingKey, value: SettingValue) -> Result<()> {
        let raw = value.to_storage(key).ok_or_else(|| {
            anyhow!(
                "setting `{}` expected {:?} value",
                key.as_str(),
                key.expected_value_kind()
            )
        })?;
        self.put_setting_raw(key.as_str(), &raw)
    }

    pub fn list_settings(&self) -> Result<Vec<AppSetting>> {
        let mut settings = Vec::with_capacity(SettingKey::ALL.len());
        for key in SettingKey::ALL {
            let value = self
                .get_setting(key)?
                .unwrap_or_else(|| default_setting_value(key));
            settings.push(AppSetting { key, value });
        }
        Ok(settings)
    }

    pub fn sync_state(&self) -> Result<SyncState> {
        Ok(SyncState {
            last_local_update_at: self.get_setting_timestamp(SettingKey::SyncLastLocalUpdate)?,
            last_synced_at: self.get_setting_timestamp(SettingKey::SyncLastSynced)?,
        })
    }

    pub fn put_last_local_update(&self, at: OffsetDateTime) -> Result<()> {
        self.put_setting_timestamp(SettingKey::SyncLastLocalUpdate, at)
    }

    pub fn put_last_synced(&self, at: OffsetDateTime) -> Result<()> {
        self.put_setting_timestamp(SettingKey::SyncLastSynced, at)
    }

    fn get_setting_timestamp(&self, key: SettingKey) -> Result<Option<OffsetDateTime>> {
        match self.get_setting(key)? {
            Some(SettingValue::Text(raw)) if !raw.trim().is_empty() => parse_datetime(&raw)
                .map(Some)
                .with_context(|| format!("setting `{}` holds a malformed timestamp", key.as_str())),
            Some(_) | None => Ok(None),
        }
    }

    fn put_setting_timestamp(&self, key: SettingKey, at: OffsetDateTime) -> Result<()> {
        self.put_setting(key, SettingValue::Text(format_datetime(at)?))
    }
}

pub fn default_db_path() -> Result<PathBuf> {
    if let Some(override_path) = env::var_os("VERDANT_DB_PATH") {
        return Ok(PathBuf::from(override_path));
    }

    let data_root = dirs::data_local_dir().ok_or_else(|| {
        anyhow!("cannot resolve data directory; set VERDANT_DB_PATH to a writable database path")
    })?;

    let app_dir = data_root.join(APP_NAME);
    fs::create_dir_all(&app_dir)
        .with_context(|| format!("create data directory {}", app_dir.display()))?;
    Ok(app_dir.join("verdant.db"))
}

/// Sibling path used by the fallback tier for a given database path.
pub fn default_fallback_path(db_path: &Path) -> PathBuf {
    if db_path.to_string_lossy() == ":memory:" {
        return env::temp_dir().join("verdant.fallback.json");
    }
    db_path.with_extension("fallback.json")
}

pub fn validate_db_path(path: &str) -> Result<()> {
    if path.is_empty() {
        bail!("database path must not be empty");
    }
    if path == ":memory:" {
        return Ok(());
    }

    if let Some(index) = path.find("://")
        && index > 0
    {
        let scheme = &path[..index];
        if scheme.chars().all(char::is_alphabetic) {
            bail!(
                "database path {path:?} looks like a URI ({scheme}://); pass a filesystem path instead"
            );
        }
    }

    if path.starts_with("file:") {
        bail!("database path {path:?} uses file: URI syntax; pass a plain filesystem path");
    }

    if path.contains('?') {
        bail!(
            "database path {path:?} contains '?'; remove query parameters and use a plain file path"
        );
    }

    Ok(())
}

pub fn checksum_sha256(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    let mut output = String::with_capacity(64);
    for byte in digest {
        use std::fmt::Write as _;
        let _ = write!(&mut output, "{byte:02x}");
    }
    output
}

fn has_user_tables(conn: &Connection) -> Result<bool> {
    let count: i64 = conn
        .query_row(
            "
            SELECT COUNT(*)
            FROM sqlite_master
            WHERE type = 'table'
              AND name NOT LIKE 'sqlite_%'
            ",
            [],
            |row| row.get(0),
        )
        .context("count user tables")?;
    Ok(count > 0)
}

fn validate_schema(conn: &Connection) -> Result<()> {
    for (table, required_columns) in REQUIRED_SCHEMA {
        if !table_exists(conn, table)? {
            bail!(
                "database is missing required table `{table}`; use a verdant-compatible database or migrate first"
            );
        }

        let columns = table_columns(conn, table)?;
        let missing: Vec<&str> = required_columns
            .iter()
            .copied()
            .filter(|column| !columns.contains(*column))
            .collect();

        if !missing.is_empty() {
            bail!(
                "table `{table}` is missing required columns: {}; run migration before launching",
                missing.join(", ")
            );
        }
    }

    Ok(())
}

fn ensure_required_indexes(conn: &Connection) -> Result<()> {
    for index in REQUIRED_INDEXES {
        conn.execute_batch(index.create_sql)
            .with_context(|| format!("ensure required index `{}`", index.name))?;
    }

    let existing_indexes = index_names(conn)?;
    let missing = REQUIRED_INDEXES
        .iter()
        .filter(|index| !existing_indexes.contains(index.name))
        .map(|index| index.name)
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        bail!(
            "database is missing required indexes: {}; run migration before launching",
            missing.join(", ")
        );
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let exists = conn
        .query_row(
            "
            SELECT EXISTS(
              SELECT 1
              FROM sqlite_master
              WHERE type = 'table' AND name = ?
            )
            ",
            params![table],
            |row| row.get::<_, i64>(0),
        )
        .with_context(|| format!("check table existence for {table}"))?;
    Ok(exists == 1)
}

fn table_columns(conn: &Connection, table: &str) -> Result<BTreeSet<String>> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({table})"))
        .with_context(|| format!("inspect columns for {table}"))?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .with_context(|| format!("query column info for {table}"))?;

    let names = rows
        .collect::<rusqlite::Result<BTreeSet<_>>>()
        .with_context(|| format!("collect columns for {table}"))?;
    Ok(names)
}

fn index_names(conn: &Connection) -> Result<BTreeSet<String>> {
    let mut stmt = conn
        .prepare(
            "
            SELECT name
            FROM sqlite_master
            WHERE type = 'index'
              AND name NOT LIKE 'sqlite_%'
            ORDER BY name ASC
            ",
        )
        .context("prepare index names query")?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .context("query index names")?;
    rows.collect::<rusqlite::Result<BTreeSet<_>>>()
        .context("collect index names")
}

fn configure_connection(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        PRAGMA foreign_keys = ON;
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA busy_timeout = 5000;
        ",
    )
    .context("configure sqlite pragmas")
}

fn default_setting_value(key: SettingKey) -> SettingValue {
    match key.expected_value_kind() {
        SettingValueKind::Bool => SettingValue::Bool(true),
        SettingValueKind::Text => SettingValue::Text(String::new()),
    }
}

pub fn now_rfc3339() -> Result<String> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .context("format current timestamp")
}

pub fn format_datetime(value: OffsetDateTime) -> Result<String> {
    value.format(&Rfc3339).context("format timestamp")
}

pub fn parse_datetime(raw: &str) -> Result<OffsetDateTime> {
    if let Ok(value) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Ok(value);
    }

    if let Ok(value) = OffsetDateTime::parse(
        raw,
        &format_description!(
            "[year]-[month]-[day] [hour]:[minute]:[second][offset_hour sign:mandatory]:[offset_minute]"
        ),
    ) {
        return Ok(value);
    }

    if let Ok(value) = PrimitiveDateTime::parse(
        raw,
        &format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
    ) {
        return Ok(value.assume_utc());
    }

    if let Ok(value) = PrimitiveDateTime::parse(
        raw,
        &format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
    ) {
        return Ok(value.assume_utc());
    }

    bail!("unsupported datetime format {raw:?}")
}

fn to_sql_error(error: anyhow::Error) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            error.to_string(),
        )),
    )
}

fn set_private_permissions(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        if !path.exists() {
            return Ok(());
        }
        let mut permissions = fs::metadata(path)
            .with_context(|| format!("stat {}", path.display()))?
            .permissions();
        permissions.set_mode(0o600);
        fs::set_permissions(path, permissions)
            .with_context(|| format!("set permissions on {}", path.display()))?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}
