//! Schema catalog consumed by the engine.
//!
//! The catalog is read-only during analysis. It can be built from DDL
//! ([`ddl::parse_schema`]), from JSON ([`SchemaCatalog::from_json`]) or, with
//! the `db` feature, by introspecting a live `PostgreSQL` database.

/// Catalog construction from `CREATE TABLE` statements.
pub mod ddl;
/// Catalog construction from a live `PostgreSQL` database.
#[cfg(feature = "db")]
pub mod introspect;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CatalogError;
use crate::parser::names::{fold_identifier, relation_lookup_candidates};

/// Coarse domain of a declared column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeClass {
    /// Integral numbers (discrete domain).
    Integer,
    /// Non-integral numbers.
    Numeric,
    /// Character data.
    Text,
    /// Dates, times and timestamps.
    Temporal,
    /// Booleans.
    Boolean,
    /// Anything else.
    Other,
}

impl TypeClass {
    /// Classify a declared SQL type name such as `VARCHAR(20)` or `numeric(7,2)`.
    pub fn from_sql_type(data_type: &str) -> Self {
        let lower = data_type.trim().to_ascii_lowercase();
        let base = lower.split(['(', '[']).next().unwrap_or("").trim();
        match base {
            "int" | "integer" | "int2" | "int4" | "int8" | "smallint" | "bigint" | "serial"
            | "bigserial" | "smallserial" | "tinyint" => TypeClass::Integer,
            "numeric" | "decimal" | "real" | "float" | "float4" | "float8" | "double"
            | "double precision" | "money" | "number" => TypeClass::Numeric,
            "text" | "varchar" | "char" | "character" | "character varying" | "bpchar"
            | "string" | "citext" | "name" | "nvarchar" | "nchar" | "clob" => TypeClass::Text,
            "boolean" | "bool" => TypeClass::Boolean,
            _ if base.starts_with("date")
                || base.starts_with("time")
                || base.starts_with("interval") =>
            {
                TypeClass::Temporal
            }
            _ => TypeClass::Other,
        }
    }

    /// True when values of both classes can be compared without a cast.
    pub fn is_compatible_with(self, other: TypeClass) -> bool {
        use TypeClass::*;
        match (self, other) {
            (Other, _) | (_, Other) => true,
            (Integer | Numeric, Integer | Numeric) => true,
            (a, b) => a == b,
        }
    }
}

impl fmt::Display for TypeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeClass::Integer => write!(f, "integer"),
            TypeClass::Numeric => write!(f, "numeric"),
            TypeClass::Text => write!(f, "text"),
            TypeClass::Temporal => write!(f, "temporal"),
            TypeClass::Boolean => write!(f, "boolean"),
            TypeClass::Other => write!(f, "other"),
        }
    }
}

/// A declared column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Declared type as written.
    pub data_type: String,
    /// Whether NULL is allowed.
    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

fn default_nullable() -> bool {
    true
}

impl Column {
    /// Build a column.
    pub fn new(name: &str, data_type: &str, nullable: bool) -> Self {
        Self {
            name: fold_identifier(name),
            data_type: data_type.to_string(),
            nullable,
        }
    }

    /// Domain of the declared type.
    pub fn type_class(&self) -> TypeClass {
        TypeClass::from_sql_type(&self.data_type)
    }
}

/// A foreign key: `columns` reference `referenced_columns` of `references`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    /// Referencing columns, in key order.
    pub columns: Vec<String>,
    /// Referenced relation name.
    pub references: String,
    /// Referenced columns, parallel to `columns`.
    pub referenced_columns: Vec<String>,
}

/// A base relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    /// Relation name.
    pub name: String,
    /// Schema the relation lives in.
    #[serde(default)]
    pub schema: Option<String>,
    /// Columns in declaration order.
    pub columns: Vec<Column>,
    /// Primary key columns; empty when none is declared.
    #[serde(default)]
    pub primary_key: Vec<String>,
    /// Additional unique keys.
    #[serde(default)]
    pub unique_keys: Vec<Vec<String>>,
    /// Outgoing foreign keys.
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKey>,
    /// The relation is known to hold at most one row.
    #[serde(default)]
    pub single_row: bool,
}

impl Relation {
    /// Start a relation with no columns.
    pub fn new(name: &str) -> Self {
        Self {
            name: fold_identifier(name),
            schema: None,
            columns: Vec::new(),
            primary_key: Vec::new(),
            unique_keys: Vec::new(),
            foreign_keys: Vec::new(),
            single_row: false,
        }
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Primary key followed by unique keys.
    pub fn keys(&self) -> impl Iterator<Item = &[String]> {
        std::iter::once(self.primary_key.as_slice())
            .filter(|key| !key.is_empty())
            .chain(self.unique_keys.iter().map(Vec::as_slice))
    }

    /// True when `columns` contains every column of some key.
    pub fn is_key(&self, columns: &[&str]) -> bool {
        self.keys()
            .any(|key| key.iter().all(|k| columns.contains(&k.as_str())))
    }

    /// Foreign keys of this relation that reference `target`.
    pub fn foreign_keys_to<'a>(&'a self, target: &'a str) -> impl Iterator<Item = &'a ForeignKey> {
        self.foreign_keys
            .iter()
            .filter(move |fk| fk.references == target)
    }

    fn normalize(&mut self) {
        self.name = fold_identifier(&self.name);
        self.schema = self.schema.as_deref().map(fold_identifier);
        for column in &mut self.columns {
            column.name = fold_identifier(&column.name);
        }
        normalize_names(&mut self.primary_key);
        for key in &mut self.unique_keys {
            normalize_names(key);
        }
        for fk in &mut self.foreign_keys {
            normalize_names(&mut fk.columns);
            normalize_names(&mut fk.referenced_columns);
            fk.references = fold_identifier(&fk.references);
        }
    }

    fn enforce_primary_key_not_null(&mut self) {
        for column in &mut self.columns {
            if self.primary_key.contains(&column.name) {
                column.nullable = false;
            }
        }
    }

    fn validate(&self) -> Result<(), CatalogError> {
        let declared = self
            .primary_key
            .iter()
            .chain(self.unique_keys.iter().flatten())
            .chain(self.foreign_keys.iter().flat_map(|fk| fk.columns.iter()));
        for column in declared {
            if self.column(column).is_none() {
                return Err(CatalogError::UnknownColumn {
                    relation: self.name.clone(),
                    column: column.clone(),
                });
            }
        }
        Ok(())
    }
}

fn normalize_names(names: &mut [String]) {
    for name in names {
        *name = fold_identifier(name);
    }
}

fn default_search_path() -> String {
    "public".to_string()
}

/// Relations, keys and known functions of one database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaCatalog {
    /// Schema used for unqualified relation names.
    #[serde(default = "default_search_path")]
    pub search_path: String,
    /// Declared relations.
    #[serde(default)]
    pub relations: Vec<Relation>,
    /// User-defined function names, in addition to the built-in ones.
    #[serde(default)]
    pub functions: Vec<String>,
}

impl Default for SchemaCatalog {
    fn default() -> Self {
        Self {
            search_path: default_search_path(),
            relations: Vec::new(),
            functions: Vec::new(),
        }
    }
}

impl SchemaCatalog {
    /// Empty catalog with the `public` search path.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a catalog from its JSON form.
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let raw: SchemaCatalog = serde_json::from_str(json)?;
        let mut catalog = SchemaCatalog {
            search_path: fold_identifier(&raw.search_path),
            relations: Vec::new(),
            functions: raw.functions.iter().map(|f| fold_identifier(f)).collect(),
        };
        for mut relation in raw.relations {
            relation.normalize();
            catalog.add_relation(relation)?;
        }
        Ok(catalog)
    }

    /// Serialize the catalog to pretty JSON.
    pub fn to_json(&self) -> Result<String, CatalogError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Add a relation whose identifiers are already folded, validating key columns.
    ///
    /// Primary key columns are forced to NOT NULL.
    pub fn add_relation(&mut self, mut relation: Relation) -> Result<(), CatalogError> {
        relation.enforce_primary_key_not_null();
        relation.validate()?;
        let duplicate = self
            .relations
            .iter()
            .any(|r| r.name == relation.name && r.schema == relation.schema);
        if duplicate {
            return Err(CatalogError::DuplicateRelation(relation.name));
        }
        self.relations.push(relation);
        Ok(())
    }

    /// Flag a relation as holding at most one row. Returns false when unknown.
    pub fn mark_single_row(&mut self, name: &str) -> bool {
        let key = fold_identifier(name);
        match self.relations.iter_mut().find(|r| r.name == key) {
            Some(relation) => {
                relation.single_row = true;
                true
            }
            None => false,
        }
    }

    /// Resolve a relation by optional schema and name, both given as folded
    /// lookup keys (see [`crate::parser::names::ident_key`]).
    ///
    /// Unqualified names try the search path first, then any schema when the
    /// name is unique across schemas.
    pub fn relation(&self, schema: Option<&str>, name: &str) -> Option<&Relation> {
        relation_lookup_candidates(schema, name, &self.search_path)
            .into_iter()
            .find_map(|(schema, name)| match schema {
                Some(schema) => self.relations.iter().find(|r| {
                    r.name == name
                        && r.schema.as_deref().unwrap_or(self.search_path.as_str()) == schema
                }),
                None => {
                    let mut matches = self.relations.iter().filter(|r| r.name == name);
                    let first = matches.next()?;
                    matches.next().is_none().then_some(first)
                }
            })
    }

    /// Resolve an unqualified relation name.
    pub fn lookup(&self, name: &str) -> Option<&Relation> {
        self.relation(None, name)
    }

    /// True when some relation lives in `schema`.
    pub fn has_schema(&self, schema: &str) -> bool {
        schema == self.search_path
            || self
                .relations
                .iter()
                .any(|r| r.schema.as_deref() == Some(schema))
    }

    /// Names of all relations.
    pub fn relation_names(&self) -> impl Iterator<Item = &str> {
        self.relations.iter().map(|r| r.name.as_str())
    }

    /// Names of all schemas mentioned by the catalog.
    pub fn schema_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = std::iter::once(self.search_path.as_str())
            .chain(self.relations.iter().filter_map(|r| r.schema.as_deref()))
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    /// True for user-defined functions registered in the catalog.
    pub fn has_function(&self, name: &str) -> bool {
        self.functions.iter().any(|f| f == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emp() -> Relation {
        let mut relation = Relation::new("Emp");
        relation.columns = vec![
            Column::new("EMPNO", "integer", true),
            Column::new("ename", "varchar(10)", true),
            Column::new("mgr", "integer", true),
        ];
        relation.primary_key = vec!["empno".to_string()];
        relation.foreign_keys = vec![ForeignKey {
            columns: vec!["mgr".to_string()],
            references: "emp".to_string(),
            referenced_columns: vec!["empno".to_string()],
        }];
        relation
    }

    #[test]
    fn add_relation_keeps_folded_names_and_forces_pk_not_null() {
        assert_eq!(Relation::new("\"Emp\"").name, "Emp");
        let mut catalog = SchemaCatalog::new();
        catalog.add_relation(emp()).expect("emp should be valid");
        let relation = catalog.lookup("emp").expect("emp should resolve");
        assert_eq!(relation.name, "emp");
        assert!(catalog.lookup("Emp").is_none());
        assert!(!relation.column("empno").expect("empno").nullable);
        assert!(relation.column("mgr").expect("mgr").nullable);
        assert!(relation.is_key(&["empno", "ename"]));
        assert!(!relation.is_key(&["ename"]));
        assert_eq!(relation.foreign_keys_to("emp").count(), 1);

        assert!(catalog.mark_single_row("Emp"));
        assert!(catalog.lookup("emp").expect("emp").single_row);
        assert!(!catalog.mark_single_row("dept"));
    }

    #[test]
    fn add_relation_rejects_duplicates_and_unknown_key_columns() {
        let mut catalog = SchemaCatalog::new();
        catalog.add_relation(emp()).expect("first emp");
        assert!(matches!(
            catalog.add_relation(emp()),
            Err(CatalogError::DuplicateRelation(name)) if name == "emp"
        ));

        let mut broken = Relation::new("dept");
        broken.primary_key = vec!["deptno".to_string()];
        assert!(matches!(
            catalog.add_relation(broken),
            Err(CatalogError::UnknownColumn { column, .. }) if column == "deptno"
        ));
    }

    #[test]
    fn relation_lookup_respects_search_path_and_schemas() {
        let mut catalog = SchemaCatalog::new();
        let mut hr_emp = emp();
        hr_emp.schema = Some("hr".to_string());
        catalog.add_relation(hr_emp).expect("hr.emp");
        assert!(catalog.relation(Some("hr"), "emp").is_some());
        assert!(catalog.relation(Some("public"), "emp").is_none());
        assert!(catalog.lookup("emp").is_some());
        assert!(catalog.has_schema("hr"));
        assert!(!catalog.has_schema("sales"));
    }

    #[test]
    fn json_round_trip_keeps_single_row_flag() {
        let json = r#"{
            "relations": [
                {"name": "Config", "columns": [{"name": "k", "data_type": "text", "nullable": false}],
                 "single_row": true}
            ]
        }"#;
        let catalog = SchemaCatalog::from_json(json).expect("catalog JSON should load");
        assert_eq!(catalog.search_path, "public");
        assert!(catalog.lookup("config").expect("config").single_row);
        let reloaded =
            SchemaCatalog::from_json(&catalog.to_json().expect("serialize")).expect("reload");
        assert_eq!(reloaded, catalog);
    }

    #[test]
    fn type_classes_group_compatible_domains() {
        assert_eq!(TypeClass::from_sql_type("NUMERIC(7,2)"), TypeClass::Numeric);
        assert_eq!(TypeClass::from_sql_type("character varying(20)"), TypeClass::Text);
        assert_eq!(TypeClass::from_sql_type("timestamp with time zone"), TypeClass::Temporal);
        assert!(TypeClass::Integer.is_compatible_with(TypeClass::Numeric));
        assert!(!TypeClass::Text.is_compatible_with(TypeClass::Integer));
    }
}
