/*

SPDX-License-Identifier: AGPL-3.0-only
Copyright (c) 2025 Augustus Rizza

*/

use std::collections::HashSet;

use diesel::prelude::*;
use diesel::upsert::excluded;
use log::debug;

use super::{Conn, KEY_LOOKUP_BATCH, checkout};
use crate::DbPool;
use crate::errors::StoreError;
use crate::models::Entity;
use crate::schema::entities;

/// Rows per upsert statement (14 bound columns each).
const UPSERT_BATCH: usize = 1_000;

/// Entity rows keyed by CIK. Writes are upserts: the last record seen wins.
#[derive(Clone)]
pub struct CompanyStore {
    pool: DbPool,
}

impl CompanyStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> Result<Conn, StoreError> {
        checkout(&self.pool)
    }

    /// Insert new entities and overwrite every non-key column of existing ones.
    /// All sub-batches commit together or not at all.
    pub fn upsert(&self, records: &[Entity]) -> Result<usize, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn()?;
        let affected = conn.transaction::<usize, StoreError, _>(|conn| {
            let mut n = 0;
            for batch in records.chunks(UPSERT_BATCH) {
                n += diesel::insert_into(entities::table)
                    .values(batch)
                    .on_conflict(entities::id)
                    .do_update()
                    .set((
                        entities::name.eq(excluded(entities::name)),
                        entities::sic.eq(excluded(entities::sic)),
                        entities::sic_description.eq(excluded(entities::sic_description)),
                        entities::entity_type.eq(excluded(entities::entity_type)),
                        entities::insider_transaction_for_owner_exists
                            .eq(excluded(entities::insider_transaction_for_owner_exists)),
                        entities::insider_transaction_for_issuer_exists
                            .eq(excluded(entities::insider_transaction_for_issuer_exists)),
                        entities::street1.eq(excluded(entities::street1)),
                        entities::street2.eq(excluded(entities::street2)),
                        entities::city.eq(excluded(entities::city)),
                        entities::state_or_country.eq(excluded(entities::state_or_country)),
                        entities::state_or_country_description
                            .eq(excluded(entities::state_or_country_description)),
                        entities::zip_code.eq(excluded(entities::zip_code)),
                        entities::phone.eq(excluded(entities::phone)),
                    ))
                    .execute(conn)?;
            }
            Ok(n)
        })?;
        debug!("upserted {affected} entities");
        Ok(affected)
    }

    /// Insert entities that do not exist yet; existing rows are left untouched.
    pub fn ensure_exist(&self, records: &[Entity]) -> Result<usize, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn()?;
        conn.transaction::<usize, StoreError, _>(|conn| {
            let mut n = 0;
            for batch in records.chunks(UPSERT_BATCH) {
                n += diesel::insert_or_ignore_into(entities::table)
                    .values(batch)
                    .execute(conn)?;
            }
            Ok(n)
        })
    }

    pub fn existing_keys(&self, ids: &[String]) -> Result<HashSet<String>, StoreError> {
        let mut conn = self.conn()?;
        let mut out = HashSet::new();
        for batch in ids.chunks(KEY_LOOKUP_BATCH) {
            let found: Vec<String> = entities::table
                .select(entities::id)
                .filter(entities::id.eq_any(batch))
                .load(&mut conn)?;
            out.extend(found);
        }
        Ok(out)
    }

    pub fn get(&self, id: &str) -> Result<Option<Entity>, StoreError> {
        let mut conn = self.conn()?;
        Ok(entities::table
            .find(id)
            .select(Entity::as_select())
            .first(&mut conn)
            .optional()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::open_pool;

    fn entity(id: &str, name: &str, city: Option<&str>) -> Entity {
        Entity {
            city: city.map(str::to_string),
            ..Entity::stub(id, name)
        }
    }

    #[test]
    fn upsert_inserts_then_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let pool = open_pool(dir.path().join("t.sqlite").to_str().unwrap()).unwrap();
        let store = CompanyStore::new(pool);

        let n = store
            .upsert(&[
                entity("0000000001", "One", Some("Boston")),
                entity("0000000002", "Two", None),
            ])
            .unwrap();
        assert_eq!(n, 2);

        store
            .upsert(&[entity("0000000001", "One Renamed", None)])
            .unwrap();
        let one = store.get("0000000001").unwrap().unwrap();
        assert_eq!(one.name, "One Renamed");
        // every non-key column is overwritten, including with NULL
        assert_eq!(one.city, None);
    }

    #[test]
    fn ensure_exist_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let pool = open_pool(dir.path().join("t.sqlite").to_str().unwrap()).unwrap();
        let store = CompanyStore::new(pool);

        store
            .upsert(&[entity("0000000001", "Full Record", Some("Boston"))])
            .unwrap();
        let inserted = store
            .ensure_exist(&[
                Entity::stub("0000000001", "STUB"),
                Entity::stub("0000000003", "THREE"),
            ])
            .unwrap();
        assert_eq!(inserted, 1);
        assert_eq!(store.get("0000000001").unwrap().unwrap().name, "Full Record");
    }

    #[test]
    fn large_batches_and_key_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let pool = open_pool(dir.path().join("t.sqlite").to_str().unwrap()).unwrap();
        let store = CompanyStore::new(pool);

        let rows: Vec<Entity> = (0..2_500)
            .map(|i| Entity::stub(format!("{i:010}"), format!("Co {i}")))
            .collect();
        assert_eq!(store.upsert(&rows).unwrap(), 2_500);

        let probe: Vec<String> = vec!["0000000007".into(), "0000002499".into(), "9999999999".into()];
        let found = store.existing_keys(&probe).unwrap();
        assert_eq!(found.len(), 2);
        assert!(!found.contains("9999999999"));
    }
}
