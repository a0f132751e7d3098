//! Per-collection document operations.
//!
//! A [`Collection`] is the narrow interface the pipeline sees: count,
//! paged find in insertion order, and unordered bulk insert. Documents
//! are JSON objects stored as text; a collection may declare one unique
//! key field, in which case duplicate-key inserts are skipped and counted
//! rather than raised.

use std::collections::BTreeSet;
use std::rc::Rc;

use duckdb::Connection;
use serde_json::Value;

use crate::StoreError;

/// Rows per INSERT statement (`DuckDB` handles large batches well).
const CHUNK_SIZE: usize = 5_000;

/// Tally of one unordered bulk insert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertOutcome {
    /// Documents handed to the insert call.
    pub attempted: u64,
    /// Documents actually written.
    pub inserted: u64,
    /// Documents skipped because their unique key already existed, either
    /// within the batch or in the collection.
    pub duplicates: u64,
    /// Documents skipped because they lack the declared unique key field.
    pub rejected: u64,
}

/// Handle to one named collection.
pub struct Collection {
    conn: Rc<Connection>,
    name: String,
    key_field: Option<String>,
}

impl Collection {
    pub(crate) fn new(conn: Rc<Connection>, name: &str, key_field: Option<String>) -> Self {
        Self {
            conn,
            name: name.to_string(),
            key_field,
        }
    }

    /// The collection's logical name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of documents in the collection.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails.
    pub fn count(&self) -> Result<u64, StoreError> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT COUNT(*) FROM \"c_{}\"", self.name))?;
        let count: i64 = stmt.query_row([], |row| row.get(0))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Fetches a contiguous slice of documents in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails or a stored document is
    /// not valid JSON.
    pub fn find(&self, skip: u64, limit: u64) -> Result<Vec<Value>, StoreError> {
        self.select_docs(&format!(
            "SELECT doc FROM \"c_{}\" ORDER BY seq LIMIT {limit} OFFSET {skip}",
            self.name
        ))
    }

    /// Fetches every document in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails or a stored document is
    /// not valid JSON.
    pub fn find_all(&self) -> Result<Vec<Value>, StoreError> {
        self.select_docs(&format!(
            "SELECT doc FROM \"c_{}\" ORDER BY seq",
            self.name
        ))
    }

    /// Fetches the first document, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails or the stored document is
    /// not valid JSON.
    pub fn find_one(&self) -> Result<Option<Value>, StoreError> {
        Ok(self.find(0, 1)?.into_iter().next())
    }

    fn select_docs(&self, sql: &str) -> Result<Vec<Value>, StoreError> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut docs = Vec::new();
        for text in rows {
            docs.push(serde_json::from_str(&text?)?);
        }
        Ok(docs)
    }

    /// Declares a unique key on `field` by recreating the backing table
    /// with a primary-key column. Intended to be called on a freshly
    /// created (or just dropped) collection before any insert; existing
    /// documents are discarded.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the table recreation fails.
    pub fn create_unique_index(&mut self, field: &str) -> Result<(), StoreError> {
        let name = &self.name;
        self.conn.execute_batch(&format!(
            "DROP TABLE IF EXISTS \"c_{name}\";
             DROP SEQUENCE IF EXISTS \"seq_{name}\";
             CREATE SEQUENCE \"seq_{name}\";
             CREATE TABLE \"c_{name}\" (
                seq BIGINT DEFAULT nextval('seq_{name}'),
                key TEXT PRIMARY KEY,
                doc TEXT NOT NULL
             );"
        ))?;
        self.conn.execute(
            "UPDATE _collections SET key_field = ? WHERE name = ?",
            [field, name.as_str()],
        )?;

        self.key_field = Some(field.to_string());
        log::debug!("Declared unique key {field:?} on collection {name}");
        Ok(())
    }

    /// Inserts documents with unordered semantics: one document's
    /// duplicate key or missing key field never prevents insertion of the
    /// rest. Duplicates within the batch keep the first occurrence.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if a document cannot be serialized or the
    /// insert statement itself fails.
    pub fn insert_many(&self, docs: &[Value]) -> Result<InsertOutcome, StoreError> {
        let mut outcome = InsertOutcome {
            attempted: docs.len() as u64,
            ..InsertOutcome::default()
        };
        if docs.is_empty() {
            return Ok(outcome);
        }

        let mut rows: Vec<(Option<String>, String)> = Vec::with_capacity(docs.len());
        if let Some(field) = &self.key_field {
            let mut seen = BTreeSet::new();
            for doc in docs {
                let Some(key) = key_of(doc, field) else {
                    log::warn!(
                        "Skipping document without key field {field:?} in {}",
                        self.name
                    );
                    outcome.rejected += 1;
                    continue;
                };
                if seen.insert(key.clone()) {
                    rows.push((Some(key), serde_json::to_string(doc)?));
                } else {
                    outcome.duplicates += 1;
                }
            }
        } else {
            for doc in docs {
                rows.push((None, serde_json::to_string(doc)?));
            }
        }

        for chunk in rows.chunks(CHUNK_SIZE) {
            let mut sql = format!("INSERT INTO \"c_{}\" (key, doc) VALUES ", self.name);
            for i in 0..chunk.len() {
                if i > 0 {
                    sql.push_str(", ");
                }
                sql.push_str("(?, ?)");
            }
            if self.key_field.is_some() {
                sql.push_str(" ON CONFLICT (key) DO NOTHING");
            }

            let mut stmt = self.conn.prepare(&sql)?;
            let mut idx = 1usize;
            for (key, doc) in chunk {
                stmt.raw_bind_parameter(idx, key.as_deref())?;
                stmt.raw_bind_parameter(idx + 1, doc.as_str())?;
                idx += 2;
            }

            let inserted = stmt.raw_execute()?;
            outcome.inserted += inserted as u64;
        }

        // Whatever the statement did not write was a key conflict against
        // documents already in the collection.
        outcome.duplicates +=
            (rows.len() as u64).saturating_sub(outcome.inserted);
        Ok(outcome)
    }
}

/// Extracts the unique key value from a document; strings are used as-is,
/// numbers by their canonical text form.
fn key_of(doc: &Value, field: &str) -> Option<String> {
    match doc.get(field) {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{StoreConfig, StoreGateway};
    use serde_json::json;

    fn keyed_collection(gateway: &mut StoreGateway) -> Collection {
        let mut coll = gateway.collection("clean").unwrap();
        coll.create_unique_index("collision_id").unwrap();
        coll
    }

    #[test]
    fn unkeyed_insert_keeps_duplicates() {
        let mut gateway = StoreGateway::new(StoreConfig::memory());
        let coll = gateway.collection("raw").unwrap();

        let doc = json!({"collision_id": "1", "borough": "QUEENS"});
        let outcome = coll.insert_many(&[doc.clone(), doc]).unwrap();

        assert_eq!(outcome.inserted, 2);
        assert_eq!(outcome.duplicates, 0);
        assert_eq!(coll.count().unwrap(), 2);
    }

    #[test]
    fn find_pages_in_insertion_order() {
        let mut gateway = StoreGateway::new(StoreConfig::memory());
        let coll = gateway.collection("raw").unwrap();

        let docs: Vec<_> = (0..10).map(|i| json!({"n": i})).collect();
        coll.insert_many(&docs).unwrap();

        let page = coll.find(3, 4).unwrap();
        let ns: Vec<i64> = page.iter().map(|d| d["n"].as_i64().unwrap()).collect();
        assert_eq!(ns, vec![3, 4, 5, 6]);

        let rest = coll.find(8, 100).unwrap();
        assert_eq!(rest.len(), 2);
    }

    #[test]
    fn keyed_insert_skips_duplicates_within_batch() {
        let mut gateway = StoreGateway::new(StoreConfig::memory());
        let coll = keyed_collection(&mut gateway);

        let outcome = coll
            .insert_many(&[
                json!({"collision_id": "1", "v": "first"}),
                json!({"collision_id": "2"}),
                json!({"collision_id": "1", "v": "second"}),
            ])
            .unwrap();

        assert_eq!(outcome.inserted, 2);
        assert_eq!(outcome.duplicates, 1);
        assert_eq!(coll.count().unwrap(), 2);

        // First occurrence wins.
        let docs = coll.find_all().unwrap();
        assert_eq!(docs[0]["v"], "first");
    }

    #[test]
    fn keyed_insert_skips_duplicates_across_calls() {
        let mut gateway = StoreGateway::new(StoreConfig::memory());
        let coll = keyed_collection(&mut gateway);

        coll.insert_many(&[json!({"collision_id": "1"})]).unwrap();
        let outcome = coll
            .insert_many(&[json!({"collision_id": "1"}), json!({"collision_id": "2"})])
            .unwrap();

        assert_eq!(outcome.inserted, 1);
        assert_eq!(outcome.duplicates, 1);
        assert_eq!(coll.count().unwrap(), 2);
    }

    #[test]
    fn keyed_insert_rejects_documents_without_key() {
        let mut gateway = StoreGateway::new(StoreConfig::memory());
        let coll = keyed_collection(&mut gateway);

        let outcome = coll
            .insert_many(&[json!({"no_id": true}), json!({"collision_id": "7"})])
            .unwrap();

        assert_eq!(outcome.rejected, 1);
        assert_eq!(outcome.inserted, 1);
        assert_eq!(coll.count().unwrap(), 1);
    }

    #[test]
    fn numeric_keys_are_stored_by_text_form() {
        let mut gateway = StoreGateway::new(StoreConfig::memory());
        let coll = keyed_collection(&mut gateway);

        let outcome = coll
            .insert_many(&[json!({"collision_id": 42}), json!({"collision_id": "42"})])
            .unwrap();

        assert_eq!(outcome.inserted, 1);
        assert_eq!(outcome.duplicates, 1);
    }

    #[test]
    fn find_one_returns_none_on_empty_collection() {
        let mut gateway = StoreGateway::new(StoreConfig::memory());
        let coll = gateway.collection("raw").unwrap();
        assert!(coll.find_one().unwrap().is_none());
    }

    #[test]
    fn empty_insert_is_a_no_op() {
        let mut gateway = StoreGateway::new(StoreConfig::memory());
        let coll = gateway.collection("raw").unwrap();
        let outcome = coll.insert_many(&[]).unwrap();
        assert_eq!(outcome, InsertOutcome::default());
    }
}
