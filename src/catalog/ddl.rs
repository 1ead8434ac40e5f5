use sqlparser::ast::{
    AlterTableOperation, ColumnDef, ColumnOption, CreateFunction, CreateTable, Ident, ObjectName,
    Statement, TableConstraint,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use tracing::debug;

use crate::catalog::{Column, ForeignKey, Relation, SchemaCatalog};
use crate::error::CatalogError;
use crate::parser::names::{ident_key, object_name_keys};

/// A foreign key whose referenced columns are resolved once every table is known.
struct PendingForeignKey {
    relation: usize,
    columns: Vec<String>,
    references: String,
    referenced_columns: Vec<String>,
}

/// Build a catalog from `CREATE TABLE`, `ALTER TABLE ... ADD CONSTRAINT` and
/// `CREATE FUNCTION` statements. Other statements are ignored.
pub fn parse_schema(ddl: &str) -> Result<SchemaCatalog, CatalogError> {
    parse_schema_with_search_path(ddl, "public")
}

/// Like [`parse_schema`], resolving unqualified names against `search_path`.
pub fn parse_schema_with_search_path(
    ddl: &str,
    search_path: &str,
) -> Result<SchemaCatalog, CatalogError> {
    let statements = Parser::parse_sql(&PostgreSqlDialect {}, ddl)?;
    let mut relations: Vec<Relation> = Vec::new();
    let mut pending: Vec<PendingForeignKey> = Vec::new();
    let mut functions: Vec<String> = Vec::new();

    for statement in &statements {
        match statement {
            Statement::CreateTable(CreateTable {
                name,
                columns,
                constraints,
                ..
            }) => {
                let index = relations.len();
                relations.push(relation_from_create(name, columns));
                for column in columns {
                    collect_column_constraints(
                        &mut relations[index],
                        index,
                        column,
                        &mut pending,
                    );
                }
                for constraint in constraints {
                    apply_table_constraint(&mut relations[index], index, constraint, &mut pending);
                }
            }
            Statement::AlterTable {
                name, operations, ..
            } => {
                let (_, relation_name) = object_name_keys(name);
                let Some(index) = relations.iter().position(|r| r.name == relation_name) else {
                    debug!(relation = %relation_name, "ALTER TABLE on undeclared relation ignored");
                    continue;
                };
                for operation in operations {
                    if let AlterTableOperation::AddConstraint(constraint) = operation {
                        apply_table_constraint(
                            &mut relations[index],
                            index,
                            constraint,
                            &mut pending,
                        );
                    }
                }
            }
            Statement::CreateFunction(CreateFunction { name, .. }) => {
                functions.push(object_name_keys(name).1);
            }
            other => {
                debug!(statement = %statement_head(other), "skipping non-schema statement");
            }
        }
    }

    for fk in pending {
        let referenced_columns = if fk.referenced_columns.is_empty() {
            relations
                .iter()
                .find(|r| r.name == fk.references)
                .map(|r| r.primary_key.clone())
                .unwrap_or_default()
        } else {
            fk.referenced_columns
        };
        relations[fk.relation].foreign_keys.push(ForeignKey {
            columns: fk.columns,
            references: fk.references,
            referenced_columns,
        });
    }

    let mut catalog = SchemaCatalog {
        search_path: search_path.to_string(),
        relations: Vec::new(),
        functions,
    };
    for relation in relations {
        catalog.add_relation(relation)?;
    }
    debug!(
        relations = catalog.relations.len(),
        functions = catalog.functions.len(),
        "parsed schema catalog"
    );
    Ok(catalog)
}

fn relation_from_create(name: &ObjectName, columns: &[ColumnDef]) -> Relation {
    let (schema, relation_name) = object_name_keys(name);
    let mut relation = Relation::new("");
    relation.name = relation_name;
    relation.schema = schema;
    relation.columns = columns
        .iter()
        .map(|column| {
            let not_null = column.options.iter().any(|def| {
                matches!(
                    def.option,
                    ColumnOption::NotNull | ColumnOption::Unique { is_primary: true, .. }
                )
            });
            // Folded form: quoted spelling kept, unquoted lowercased.
            Column {
                name: ident_key(&column.name),
                data_type: column.data_type.to_string(),
                nullable: !not_null,
            }
        })
        .collect();
    relation
}

fn collect_column_constraints(
    relation: &mut Relation,
    index: usize,
    column: &ColumnDef,
    pending: &mut Vec<PendingForeignKey>,
) {
    let column_name = ident_key(&column.name);
    for def in &column.options {
        match &def.option {
            ColumnOption::Unique { is_primary, .. } => {
                if *is_primary {
                    relation.primary_key = vec![column_name.clone()];
                } else {
                    relation.unique_keys.push(vec![column_name.clone()]);
                }
            }
            ColumnOption::ForeignKey {
                foreign_table,
                referred_columns,
                ..
            } => pending.push(PendingForeignKey {
                relation: index,
                columns: vec![column_name.clone()],
                references: object_name_keys(foreign_table).1,
                referenced_columns: keys(referred_columns),
            }),
            _ => {}
        }
    }
}

fn apply_table_constraint(
    relation: &mut Relation,
    index: usize,
    constraint: &TableConstraint,
    pending: &mut Vec<PendingForeignKey>,
) {
    match constraint {
        TableConstraint::PrimaryKey { columns, .. } => {
            relation.primary_key = keys(columns);
        }
        TableConstraint::Unique { columns, .. } => {
            relation.unique_keys.push(keys(columns));
        }
        TableConstraint::ForeignKey {
            columns,
            foreign_table,
            referred_columns,
            ..
        } => pending.push(PendingForeignKey {
            relation: index,
            columns: keys(columns),
            references: object_name_keys(foreign_table).1,
            referenced_columns: keys(referred_columns),
        }),
        _ => {}
    }
}

fn keys(idents: &[Ident]) -> Vec<String> {
    idents.iter().map(ident_key).collect()
}

fn statement_head(statement: &Statement) -> String {
    statement
        .to_string()
        .split_whitespace()
        .take(2)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &str = r#"
        CREATE TABLE dept (
            deptno INTEGER PRIMARY KEY,
            dname VARCHAR(14) NOT NULL UNIQUE,
            loc VARCHAR(13)
        );
        CREATE TABLE emp (
            empno INTEGER,
            ename VARCHAR(10),
            mgr INTEGER REFERENCES emp,
            sal NUMERIC(7,2),
            deptno INTEGER NOT NULL,
            CONSTRAINT emp_pk PRIMARY KEY (empno)
        );
        ALTER TABLE emp ADD CONSTRAINT emp_dept_fk FOREIGN KEY (deptno) REFERENCES dept (deptno);
        CREATE INDEX emp_sal ON emp (sal);
    "#;

    #[test]
    fn parse_schema_collects_keys_and_nullability() {
        let catalog = parse_schema(SCHEMA).expect("schema should parse");
        let dept = catalog.lookup("dept").expect("dept");
        assert_eq!(dept.primary_key, vec!["deptno"]);
        assert_eq!(dept.unique_keys, vec![vec!["dname".to_string()]]);
        assert!(!dept.column("dname").expect("dname").nullable);

        let emp = catalog.lookup("emp").expect("emp");
        assert_eq!(emp.primary_key, vec!["empno"]);
        assert!(!emp.column("empno").expect("empno").nullable);
        assert!(emp.column("mgr").expect("mgr").nullable);
        assert!(!emp.column("deptno").expect("deptno").nullable);
    }

    #[test]
    fn parse_schema_resolves_implicit_fk_targets() {
        let catalog = parse_schema(SCHEMA).expect("schema should parse");
        let emp = catalog.lookup("emp").expect("emp");
        let self_fk = emp.foreign_keys_to("emp").next().expect("mgr fk");
        assert_eq!(self_fk.columns, vec!["mgr"]);
        assert_eq!(self_fk.referenced_columns, vec!["empno"]);
        let dept_fk = emp.foreign_keys_to("dept").next().expect("deptno fk");
        assert_eq!(dept_fk.referenced_columns, vec!["deptno"]);
    }

    #[test]
    fn parse_schema_keeps_schema_qualifiers() {
        let catalog = parse_schema("CREATE TABLE hr.staff (id INT PRIMARY KEY);")
            .expect("schema should parse");
        assert!(catalog.relation(Some("hr"), "staff").is_some());
        assert!(catalog.has_schema("hr"));
    }

    #[test]
    fn parse_schema_reports_ddl_errors() {
        assert!(matches!(
            parse_schema("CREATE TABLE (;"),
            Err(CatalogError::Ddl(_))
        ));
    }
}
