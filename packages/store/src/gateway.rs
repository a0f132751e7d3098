//! Lazy-connecting handle to the document store.
//!
//! A [`StoreGateway`] owns the store configuration and opens the `DuckDB`
//! connection on first use. All collection access goes through it so that
//! connection lifetime is scoped to one top-level pipeline operation.

use std::rc::Rc;

use duckdb::Connection;

use crate::collection::Collection;
use crate::{StoreConfig, StoreError, validate_name};

/// Gateway to the named collections of the document store.
///
/// Connects lazily: [`StoreGateway::connect`] is idempotent, and
/// [`StoreGateway::collection`] connects implicitly. [`StoreGateway::close`]
/// releases the gateway's connection reference; handles obtained earlier
/// keep the underlying connection alive until they are dropped.
pub struct StoreGateway {
    config: StoreConfig,
    conn: Option<Rc<Connection>>,
}

impl StoreGateway {
    #[must_use]
    pub const fn new(config: StoreConfig) -> Self {
        Self { config, conn: None }
    }

    /// Establishes the connection if none exists; a no-op otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the data directory cannot be created or
    /// the database cannot be opened.
    pub fn connect(&mut self) -> Result<(), StoreError> {
        self.connection().map(|_| ())
    }

    /// Whether a live connection is currently held.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    fn connection(&mut self) -> Result<Rc<Connection>, StoreError> {
        if let Some(conn) = &self.conn {
            return Ok(Rc::clone(conn));
        }

        let conn = if self.config.in_memory {
            Connection::open_in_memory()?
        } else {
            std::fs::create_dir_all(&self.config.data_dir)?;
            Connection::open(self.config.database_path())?
        };

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS _collections (
                name TEXT PRIMARY KEY,
                key_field TEXT
            );",
        )?;

        log::debug!("Connected to store {:?}", self.config.database);
        let conn = Rc::new(conn);
        self.conn = Some(Rc::clone(&conn));
        Ok(conn)
    }

    /// Returns a handle to the named collection, connecting first if
    /// needed and creating the backing table on first access.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the connection cannot be established, the
    /// name is not a valid identifier, or table creation fails. Callers
    /// treat a failure here as fatal to the enclosing operation.
    pub fn collection(&mut self, name: &str) -> Result<Collection, StoreError> {
        validate_name(name)?;
        let conn = self.connection()?;

        let key_field = {
            let mut stmt = conn.prepare("SELECT key_field FROM _collections WHERE name = ?")?;
            match stmt.query_row([name], |row| row.get::<_, Option<String>>(0)) {
                Ok(key_field) => key_field,
                Err(duckdb::Error::QueryReturnedNoRows) => {
                    conn.execute(
                        "INSERT INTO _collections (name, key_field) VALUES (?, NULL)",
                        [name],
                    )?;
                    None
                }
                Err(e) => return Err(e.into()),
            }
        };

        let key_decl = if key_field.is_some() {
            "key TEXT PRIMARY KEY"
        } else {
            "key TEXT"
        };
        conn.execute_batch(&format!(
            "CREATE SEQUENCE IF NOT EXISTS \"seq_{name}\";
             CREATE TABLE IF NOT EXISTS \"c_{name}\" (
                seq BIGINT DEFAULT nextval('seq_{name}'),
                {key_decl},
                doc TEXT NOT NULL
             );"
        ))?;

        Ok(Collection::new(conn, name, key_field))
    }

    /// Drops the named collection if present.
    ///
    /// Underlying errors are logged, not propagated; the return value says
    /// whether the drop succeeded.
    pub fn drop_collection(&mut self, name: &str) -> bool {
        match self.drop_collection_inner(name) {
            Ok(()) => {
                log::info!("Dropped collection: {name}");
                true
            }
            Err(e) => {
                log::error!("Error dropping collection {name}: {e}");
                false
            }
        }
    }

    fn drop_collection_inner(&mut self, name: &str) -> Result<(), StoreError> {
        validate_name(name)?;
        let conn = self.connection()?;
        conn.execute_batch(&format!(
            "DROP TABLE IF EXISTS \"c_{name}\";
             DROP SEQUENCE IF EXISTS \"seq_{name}\";
             DELETE FROM _collections WHERE name = '{name}';"
        ))?;
        Ok(())
    }

    /// Lists all collection names, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the connection or query fails.
    pub fn list_collections(&mut self) -> Result<Vec<String>, StoreError> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare("SELECT name FROM _collections ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }

    /// Drops every collection, then re-lists to confirm emptiness.
    ///
    /// Returns `true` when no collections remain. Individual drop failures
    /// are logged by [`StoreGateway::drop_collection`] and do not abort the
    /// reset.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the connection or the listing queries fail.
    pub fn reset_all(&mut self) -> Result<bool, StoreError> {
        for name in self.list_collections()? {
            self.drop_collection(&name);
        }

        let remaining = self.list_collections()?;
        if remaining.is_empty() {
            log::info!("Store reset successful - all collections deleted");
            Ok(true)
        } else {
            log::warn!("Store reset incomplete - collections remain: {remaining:?}");
            Ok(false)
        }
    }

    /// Releases the connection. Safe to call when not connected.
    ///
    /// Collection handles created before the close keep the underlying
    /// connection alive until they are dropped.
    pub fn close(&mut self) {
        if self.conn.take().is_some() {
            log::debug!("Closed store connection");
        }
    }
}
