//! CRUD helpers for the `app_metadata` table.
//!
//! Reads go straight through [`Database`]; writes only exist on [`StoreTx`]
//! so that every mutation has an explicit commit or rollback point.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Transaction};

use appshelf_shared::ParsedPackage;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::AppMetadata;

const COLUMNS: &str = "id, app_name, package_name, version_code, version_name, \
                       min_api_level, max_api_level, apk_file_size, added_at, last_updated_at";

impl Database {
    /// All apps, ordered by name.
    pub fn list_apps(&self) -> Result<Vec<AppMetadata>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {COLUMNS} FROM app_metadata ORDER BY app_name ASC, id ASC"
        ))?;
        let rows = stmt.query_map([], row_to_app)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    pub fn get_app(&self, id: i64) -> Result<AppMetadata> {
        self.conn()
            .query_row(
                &format!("SELECT {COLUMNS} FROM app_metadata WHERE id = ?1"),
                params![id],
                row_to_app,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    pub fn find_app_by_package_name(&self, package_name: &str) -> Result<Option<AppMetadata>> {
        let app = self
            .conn()
            .query_row(
                &format!("SELECT {COLUMNS} FROM app_metadata WHERE package_name = ?1"),
                params![package_name],
                row_to_app,
            )
            .optional()?;
        Ok(app)
    }

    /// The id-set of the metadata store.
    pub fn app_ids(&self) -> Result<BTreeSet<i64>> {
        let mut stmt = self.conn().prepare("SELECT id FROM app_metadata")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        rows.collect::<std::result::Result<BTreeSet<i64>, _>>()
            .map_err(StoreError::Sqlite)
    }
}

/// An open metadata transaction.
pub struct StoreTx<'conn> {
    tx: Transaction<'conn>,
}

impl<'conn> StoreTx<'conn> {
    pub(crate) fn new(tx: Transaction<'conn>) -> Self {
        Self { tx }
    }

    /// Insert a new record and return its freshly assigned id.
    pub fn insert_app(&self, package: &ParsedPackage, now: DateTime<Utc>) -> Result<i64> {
        let now = now.to_rfc3339();
        self.tx.execute(
            "INSERT INTO app_metadata (app_name, package_name, version_code, version_name,
                                       min_api_level, max_api_level, apk_file_size,
                                       added_at, last_updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
            params![
                package.app_name,
                package.package_name,
                package.version_code,
                package.version_name,
                package.min_api_level,
                package.max_api_level,
                package.apk_file_size,
                now,
            ],
        )?;
        Ok(self.tx.last_insert_rowid())
    }

    /// Replace every metadata field of `id` except `added_at`.
    pub fn update_app(&self, id: i64, package: &ParsedPackage, now: DateTime<Utc>) -> Result<()> {
        let affected = self.tx.execute(
            "UPDATE app_metadata
                SET app_name = ?2, package_name = ?3, version_code = ?4, version_name = ?5,
                    min_api_level = ?6, max_api_level = ?7, apk_file_size = ?8,
                    last_updated_at = ?9
              WHERE id = ?1",
            params![
                id,
                package.app_name,
                package.package_name,
                package.version_code,
                package.version_name,
                package.min_api_level,
                package.max_api_level,
                package.apk_file_size,
                now.to_rfc3339(),
            ],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Returns whether a row was deleted.
    pub fn delete_app(&self, id: i64) -> Result<bool> {
        let affected = self
            .tx
            .execute("DELETE FROM app_metadata WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    }

    pub fn commit(self) -> Result<()> {
        self.tx.commit()?;
        Ok(())
    }

    pub fn rollback(self) -> Result<()> {
        self.tx.rollback()?;
        Ok(())
    }
}

fn row_to_app(row: &rusqlite::Row<'_>) -> rusqlite::Result<AppMetadata> {
    let added_str: String = row.get(8)?;
    let updated_str: String = row.get(9)?;

    Ok(AppMetadata {
        id: row.get(0)?,
        app_name: row.get(1)?,
        package_name: row.get(2)?,
        version_code: row.get(3)?,
        version_name: row.get(4)?,
        min_api_level: row.get(5)?,
        max_api_level: row.get(6)?,
        apk_file_size: row.get(7)?,
        added_at: parse_timestamp(8, &added_str)?,
        last_updated_at: parse_timestamp(9, &updated_str)?,
    })
}

fn parse_timestamp(column: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::package;

    fn open() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("database.sqlite")).unwrap();
        (dir, db)
    }

    #[test]
    fn insert_and_get() {
        let (_dir, mut db) = open();
        let now = Utc::now();

        let tx = db.begin().unwrap();
        let id = tx.insert_app(&package("Notes", "org.example.notes", 3), now).unwrap();
        tx.commit().unwrap();

        let app = db.get_app(id).unwrap();
        assert_eq!(app.app_name, "Notes");
        assert_eq!(app.version_code, 3);
        assert_eq!(app.added_at, app.last_updated_at);
        assert_eq!(app.added_at.timestamp(), now.timestamp());
        assert_eq!(
            db.find_app_by_package_name("org.example.notes").unwrap(),
            Some(app)
        );
        assert_eq!(db.find_app_by_package_name("org.example.other").unwrap(), None);
    }

    #[test]
    fn get_missing_is_not_found() {
        let (_dir, db) = open();
        assert!(matches!(db.get_app(42), Err(StoreError::NotFound)));
    }

    #[test]
    fn package_name_is_unique() {
        let (_dir, mut db) = open();
        let tx = db.begin().unwrap();
        tx.insert_app(&package("A", "com.x.a", 1), Utc::now()).unwrap();
        let second = tx.insert_app(&package("B", "com.x.a", 2), Utc::now());
        assert!(matches!(second, Err(StoreError::Sqlite(_))));
    }

    #[test]
    fn rollback_discards_insert() {
        let (_dir, mut db) = open();
        let tx = db.begin().unwrap();
        tx.insert_app(&package("A", "com.x.a", 1), Utc::now()).unwrap();
        tx.rollback().unwrap();

        let tx = db.begin().unwrap();
        tx.insert_app(&package("B", "com.x.b", 1), Utc::now()).unwrap();
        drop(tx);

        assert!(db.list_apps().unwrap().is_empty());
    }

    #[test]
    fn list_is_ordered_by_name() {
        let (_dir, mut db) = open();
        let tx = db.begin().unwrap();
        for (name, pkg) in [("Zebra", "com.z"), ("Alpha", "com.a"), ("Mango", "com.m")] {
            tx.insert_app(&package(name, pkg, 1), Utc::now()).unwrap();
        }
        tx.commit().unwrap();

        let names: Vec<_> = db.list_apps().unwrap().into_iter().map(|a| a.app_name).collect();
        assert_eq!(names, ["Alpha", "Mango", "Zebra"]);
        assert_eq!(db.app_ids().unwrap().into_iter().collect::<Vec<_>>(), [1, 2, 3]);
    }

    #[test]
    fn update_keeps_added_at() {
        let (_dir, mut db) = open();
        let added = DateTime::parse_from_rfc3339("2021-05-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);

        let tx = db.begin().unwrap();
        let id = tx.insert_app(&package("Notes", "com.n", 1), added).unwrap();
        tx.update_app(id, &package("Notes 2", "com.n", 2), Utc::now()).unwrap();
        tx.commit().unwrap();

        let app = db.get_app(id).unwrap();
        assert_eq!(app.app_name, "Notes 2");
        assert_eq!(app.version_code, 2);
        assert_eq!(app.added_at, added);
        assert!(app.last_updated_at > added);

        let tx = db.begin().unwrap();
        assert!(matches!(
            tx.update_app(id + 1, &package("X", "com.x", 1), Utc::now()),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn ids_are_not_reused() {
        let (_dir, mut db) = open();
        let tx = db.begin().unwrap();
        let first = tx.insert_app(&package("A", "com.a", 1), Utc::now()).unwrap();
        assert!(tx.delete_app(first).unwrap());
        assert!(!tx.delete_app(first).unwrap());
        let second = tx.insert_app(&package("A", "com.a", 1), Utc::now()).unwrap();
        tx.commit().unwrap();

        assert!(second > first);
    }
}
