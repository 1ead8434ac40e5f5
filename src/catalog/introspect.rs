use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::sql_types::{Array, Bool, Text};
use tracing::debug;

use crate::catalog::{Column, ForeignKey, Relation, SchemaCatalog};
use crate::error::CatalogError;

const COLUMNS_SQL: &str = "
SELECT cols.table_name::text AS table_name,
       cols.column_name::text AS column_name,
       cols.data_type::text AS data_type,
       (cols.is_nullable = 'YES') AS is_nullable
FROM information_schema.columns AS cols
JOIN information_schema.tables AS t
  ON t.table_schema = cols.table_schema AND t.table_name = cols.table_name
WHERE cols.table_schema = $1 AND t.table_type = 'BASE TABLE'
ORDER BY cols.table_name, cols.ordinal_position";

const KEYS_SQL: &str = "
SELECT cl.relname::text AS table_name,
       (con.contype = 'p') AS is_primary,
       ARRAY(SELECT a.attname::text
             FROM unnest(con.conkey) WITH ORDINALITY AS k(attnum, ord)
             JOIN pg_attribute a ON a.attrelid = con.conrelid AND a.attnum = k.attnum
             ORDER BY k.ord) AS columns
FROM pg_constraint con
JOIN pg_class cl ON cl.oid = con.conrelid
JOIN pg_namespace ns ON ns.oid = cl.relnamespace
WHERE con.contype IN ('p', 'u') AND ns.nspname = $1
ORDER BY cl.relname, con.conname";

const FOREIGN_KEYS_SQL: &str = "
SELECT cl.relname::text AS table_name,
       ref.relname::text AS foreign_table,
       ARRAY(SELECT a.attname::text
             FROM unnest(con.conkey) WITH ORDINALITY AS k(attnum, ord)
             JOIN pg_attribute a ON a.attrelid = con.conrelid AND a.attnum = k.attnum
             ORDER BY k.ord) AS columns,
       ARRAY(SELECT a.attname::text
             FROM unnest(con.confkey) WITH ORDINALITY AS k(attnum, ord)
             JOIN pg_attribute a ON a.attrelid = con.confrelid AND a.attnum = k.attnum
             ORDER BY k.ord) AS referenced_columns
FROM pg_constraint con
JOIN pg_class cl ON cl.oid = con.conrelid
JOIN pg_class ref ON ref.oid = con.confrelid
JOIN pg_namespace ns ON ns.oid = cl.relnamespace
WHERE con.contype = 'f' AND ns.nspname = $1
ORDER BY cl.relname, con.conname";

const FUNCTIONS_SQL: &str = "
SELECT DISTINCT routine_name::text AS routine_name
FROM information_schema.routines
WHERE routine_schema = $1
ORDER BY 1";

#[derive(QueryableByName)]
struct ColumnRow {
    #[diesel(sql_type = Text)]
    table_name: String,
    #[diesel(sql_type = Text)]
    column_name: String,
    #[diesel(sql_type = Text)]
    data_type: String,
    #[diesel(sql_type = Bool)]
    is_nullable: bool,
}

#[derive(QueryableByName)]
struct KeyRow {
    #[diesel(sql_type = Text)]
    table_name: String,
    #[diesel(sql_type = Bool)]
    is_primary: bool,
    #[diesel(sql_type = Array<Text>)]
    columns: Vec<String>,
}

#[derive(QueryableByName)]
struct ForeignKeyRow {
    #[diesel(sql_type = Text)]
    table_name: String,
    #[diesel(sql_type = Text)]
    foreign_table: String,
    #[diesel(sql_type = Array<Text>)]
    columns: Vec<String>,
    #[diesel(sql_type = Array<Text>)]
    referenced_columns: Vec<String>,
}

#[derive(QueryableByName)]
struct FunctionRow {
    #[diesel(sql_type = Text)]
    routine_name: String,
}

fn introspection_error(error: diesel::result::Error) -> CatalogError {
    CatalogError::Introspection(error.to_string())
}

/// Read tables, keys, foreign keys and functions of `schema` from a live database.
///
/// Names come back exactly as stored by `PostgreSQL`, which already matches the
/// folded form the catalog uses.
pub fn introspect(conn: &mut PgConnection, schema: &str) -> Result<SchemaCatalog, CatalogError> {
    let columns: Vec<ColumnRow> = diesel::sql_query(COLUMNS_SQL)
        .bind::<Text, _>(schema)
        .load(conn)
        .map_err(introspection_error)?;
    let keys: Vec<KeyRow> = diesel::sql_query(KEYS_SQL)
        .bind::<Text, _>(schema)
        .load(conn)
        .map_err(introspection_error)?;
    let foreign_keys: Vec<ForeignKeyRow> = diesel::sql_query(FOREIGN_KEYS_SQL)
        .bind::<Text, _>(schema)
        .load(conn)
        .map_err(introspection_error)?;
    let functions: Vec<FunctionRow> = diesel::sql_query(FUNCTIONS_SQL)
        .bind::<Text, _>(schema)
        .load(conn)
        .map_err(introspection_error)?;

    let mut relations: Vec<Relation> = Vec::new();
    for row in columns {
        let index = match relations.iter().position(|r| r.name == row.table_name) {
            Some(index) => index,
            None => {
                let mut relation = Relation::new("");
                relation.name = row.table_name.clone();
                relation.schema = Some(schema.to_string());
                relations.push(relation);
                relations.len() - 1
            }
        };
        relations[index].columns.push(Column {
            name: row.column_name,
            data_type: row.data_type,
            nullable: row.is_nullable,
        });
    }

    for row in keys {
        let Some(relation) = relations.iter_mut().find(|r| r.name == row.table_name) else {
            continue;
        };
        if row.is_primary {
            relation.primary_key = row.columns;
        } else {
            relation.unique_keys.push(row.columns);
        }
    }

    for row in foreign_keys {
        let Some(relation) = relations.iter_mut().find(|r| r.name == row.table_name) else {
            continue;
        };
        relation.foreign_keys.push(ForeignKey {
            columns: row.columns,
            references: row.foreign_table,
            referenced_columns: row.referenced_columns,
        });
    }

    let mut catalog = SchemaCatalog {
        search_path: schema.to_string(),
        relations: Vec::new(),
        functions: functions.into_iter().map(|f| f.routine_name).collect(),
    };
    for relation in relations {
        catalog.add_relation(relation)?;
    }
    debug!(
        schema,
        relations = catalog.relations.len(),
        "introspected schema catalog"
    );
    Ok(catalog)
}

/// Connect to `database_url` and introspect `schema`.
pub fn introspect_url(database_url: &str, schema: &str) -> Result<SchemaCatalog, CatalogError> {
    let mut conn = PgConnection::establish(database_url)
        .map_err(|e| CatalogError::Introspection(e.to_string()))?;
    introspect(&mut conn, schema)
}
