/// Row type for reads from the `kv_store` table. Used by sqlx for typed queries.
#[derive(Debug, sqlx::FromRow)]
pub struct KvRow {
    pub value: Vec<u8>,
}
