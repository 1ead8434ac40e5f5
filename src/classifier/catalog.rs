use serde::{Deserialize, Serialize};
use std::fmt;

/// Misconception family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Category {
    /// Syntax errors: the DBMS rejects the query.
    #[serde(rename = "SYN")]
    Syntax,
    /// Semantic errors: the query is wrong whatever the intended task.
    #[serde(rename = "SEM")]
    Semantic,
    /// Logical errors: the query does not solve the given task.
    #[serde(rename = "LOG")]
    Logical,
    /// Complications: correct but needlessly complex.
    #[serde(rename = "COM")]
    Complication,
}

impl Category {
    /// Three-letter code.
    pub fn code(self) -> &'static str {
        match self {
            Category::Syntax => "SYN",
            Category::Semantic => "SEM",
            Category::Logical => "LOG",
            Category::Complication => "COM",
        }
    }

    /// Default severity of findings in this category.
    pub fn severity(self) -> Severity {
        match self {
            Category::Syntax => Severity::Error,
            Category::Semantic | Category::Logical => Severity::Warning,
            Category::Complication => Severity::Info,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl std::str::FromStr for Category {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "SYN" => Ok(Category::Syntax),
            "SEM" => Ok(Category::Semantic),
            "LOG" => Ok(Category::Logical),
            "COM" => Ok(Category::Complication),
            _ => Err(format!("Invalid misconception category: {s}")),
        }
    }
}

/// How bad a finding is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Style or efficiency remark.
    Info,
    /// The query runs but likely returns the wrong answer.
    Warning,
    /// The query does not run.
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// One cataloged misconception.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Misconception {
    /// Identifier, 1 to 106.
    pub id: u16,
    /// Family.
    pub category: Category,
    /// Short title.
    pub title: &'static str,
    /// Message template; `{name}` is replaced by the finding parameter `name`.
    pub template: &'static str,
}

const fn m(
    id: u16,
    category: Category,
    title: &'static str,
    template: &'static str,
) -> Misconception {
    Misconception {
        id,
        category,
        title,
        template,
    }
}

use Category::{Complication as COM, Logical as LOG, Semantic as SEM, Syntax as SYN};

/// The fixed catalog, ordered by ID.
pub static CATALOG: [Misconception; 106] = [
    m(1, SYN, "Omitting correlation names", "relation `{relation}` occurs more than once without distinguishing correlation names"),
    m(2, SYN, "Ambiguous column", "column `{column}` is ambiguous: it exists in {candidates}"),
    m(3, SYN, "Ambiguous function", "function `{function}` is ambiguous"),
    m(4, SYN, "Undefined column", "column `{column}` does not exist"),
    m(5, SYN, "Undefined function", "function `{function}` is not known"),
    m(6, SYN, "Undefined parameter", "parameter `{parameter}` is not bound"),
    m(7, SYN, "Undefined object", "relation `{relation}` does not exist"),
    m(8, SYN, "Invalid schema name", "schema `{schema}` does not exist"),
    m(9, SYN, "Misspellings", "`{name}` does not exist; did you mean `{suggestion}`?"),
    m(10, SYN, "Synonyms", "`{name}` is a synonym of `{suggestion}`"),
    m(11, SYN, "Omitting quotes around character data", "`{name}` is used as a value; character data needs single quotes"),
    m(12, SYN, "Failure to specify column name twice", "`{expression}` repeats an operator without repeating the column"),
    m(13, SYN, "Data type mismatch", "`{left}` ({left_type}) is compared with `{right}` ({right_type})"),
    m(14, SYN, "Using aggregate function outside SELECT or HAVING", "aggregate `{function}` is not allowed in {clause}"),
    m(15, SYN, "Grouping error: aggregate functions cannot be nested", "aggregate `{inner}` is nested inside `{outer}`"),
    m(16, SYN, "Grouping error: extraneous or omitted grouping column", "`{column}` must appear in GROUP BY or be used in an aggregate function"),
    m(17, SYN, "Strange HAVING: HAVING without GROUP BY", "HAVING is used without GROUP BY"),
    m(18, SYN, "Confusing function with function parameter", "`{expression}` confuses a function with its parameter"),
    m(19, SYN, "Using WHERE twice", "WHERE appears more than once in the same SELECT"),
    m(20, SYN, "Omitting the FROM clause", "columns are referenced but the SELECT has no FROM clause"),
    m(21, SYN, "Comparison with NULL", "`{expression}` compares with NULL; use IS NULL or IS NOT NULL"),
    m(22, SYN, "Omitting the semicolon", "the statement is not terminated by a semicolon"),
    m(23, SYN, "Date time field overflow", "`{literal}` has {field} out of range"),
    m(24, SYN, "Duplicate clause", "{clause} appears more than once in the same SELECT"),
    m(25, SYN, "Using an undefined correlation name", "correlation name `{qualifier}` is not defined"),
    m(26, SYN, "Too many columns in subquery", "subquery returns {count} columns where one is expected"),
    m(27, SYN, "Confusing table names with column names", "`{name}` is a relation, not a column"),
    m(28, SYN, "Restriction in SELECT clause", "condition `{expression}` is written in the SELECT clause"),
    m(29, SYN, "Projection in WHERE clause", "column list `{expression}` is written in the WHERE clause"),
    m(30, SYN, "Confusing the order of keywords", "{clause} is written after {previous}"),
    m(31, SYN, "Confusing the logic of keywords", "`{keyword}` is used with the wrong meaning"),
    m(32, SYN, "Confusing the syntax of keywords", "`{keyword}` is written like {form}"),
    m(33, SYN, "Omitting commas", "a comma is missing near `{text}`"),
    m(34, SYN, "Curly, square or unmatched brackets", "{problem}"),
    m(35, SYN, "IS where not applicable", "IS is followed by `{text}`; IS only applies to NULL, TRUE, FALSE and UNKNOWN"),
    m(36, SYN, "Nonstandard keywords or standard keywords in wrong context", "`{keyword}` is not standard SQL{suggestion}"),
    m(37, SYN, "Nonstandard operators", "operator `{operator}` is not standard SQL{suggestion}"),
    m(38, SYN, "Additional semicolon", "an additional semicolon ends an empty statement"),
    m(39, SEM, "AND instead of OR", "`{expression}` can never hold; OR may have been intended"),
    m(40, SEM, "Tautological or inconsistent expression", "{detail}"),
    m(41, SEM, "DISTINCT in SUM or AVG", "`{expression}` ignores repeated values"),
    m(42, SEM, "DISTINCT that might remove important duplicates", "DISTINCT may remove rows that differ only in columns not selected"),
    m(43, SEM, "Wildcards without LIKE", "`{expression}` contains a wildcard but does not use LIKE"),
    m(44, SEM, "Incorrect wildcard", "`{pattern}` uses `{wildcard}`; LIKE wildcards are % and _"),
    m(45, SEM, "Mixing a '> 0' with 'IS NOT NULL'", "`{redundant}` is implied by `{implied_by}`"),
    m(46, SEM, "NULL in IN/ANY/ALL subquery", "`{expression}` yields no rows when the subquery returns NULL"),
    m(47, SEM, "Join on incorrect column", "`{expression}` joins columns that are not related by a foreign key"),
    m(48, SEM, "Omitting a join", "`{variable}` is not joined with the other tuple variables"),
    m(49, SEM, "Many duplicates", "the result contains {duplicates} duplicate rows"),
    m(50, SEM, "Constant column output", "output column `{column}` always equals {value}"),
    m(51, SEM, "Duplicate column output", "`{expression}` is selected more than once"),
    m(52, LOG, "OR instead of AND", "`{expression}` uses OR where the solution uses AND"),
    m(53, LOG, "Extraneous NOT operator", "`{expression}` is negated but the solution's condition is not"),
    m(54, LOG, "Missing NOT operator", "`{expression}` should be negated"),
    m(55, LOG, "Substituting existence negation with <>", "`{expression}` uses <> where the solution uses NOT EXISTS or NOT IN"),
    m(56, LOG, "Putting NOT in front of incorrect IN/EXISTS", "NOT is applied to the wrong subquery condition"),
    m(57, LOG, "Incorrect comparison operator or incorrect value compared", "`{expression}` differs from the solution's `{expected}`"),
    m(58, LOG, "Join on incorrect table", "`{relation}` is joined where the solution joins `{expected}`"),
    m(59, LOG, "Join when join needs to be omitted", "`{relation}` is joined but the solution does not use it"),
    m(60, LOG, "Join on incorrect column", "join condition `{expression}` differs from the solution's"),
    m(61, LOG, "Join with incorrect comparison operator", "join condition `{expression}` uses {operator} where the solution uses {expected}"),
    m(62, LOG, "Missing join", "the solution also joins `{relation}`"),
    m(63, LOG, "Improper nesting of expressions", "the conditions are combined in a different structure than in the solution"),
    m(64, LOG, "Improper nesting of subqueries", "subqueries are nested differently than in the solution"),
    m(65, LOG, "Extraneous quotes", "`{expression}` quotes a value the solution does not quote"),
    m(66, LOG, "Missing expression", "the condition `{expected}` of the solution is missing"),
    m(67, LOG, "Expression on incorrect column", "`{expression}` tests a different column than the solution's `{expected}`"),
    m(68, LOG, "Extraneous expression", "`{expression}` does not occur in the solution"),
    m(69, LOG, "Expression in incorrect clause", "`{expression}` belongs in {expected} rather than {clause}"),
    m(70, LOG, "Extraneous column in SELECT", "output `{expression}` does not occur in the solution"),
    m(71, LOG, "Missing column from SELECT", "the solution also outputs `{expected}`"),
    m(72, LOG, "Missing DISTINCT from SELECT", "the solution removes duplicates with DISTINCT"),
    m(73, LOG, "Missing AS from SELECT", "the solution names output `{expression}` as `{expected}`"),
    m(74, LOG, "Missing column from ORDER BY clause", "the solution also orders by `{expected}`"),
    m(75, LOG, "Incorrect column in ORDER BY clause", "ORDER BY `{expression}` differs from the solution's `{expected}`"),
    m(76, LOG, "Extraneous ORDER BY clause", "the solution does not order the result"),
    m(77, LOG, "Incorrect ordering of rows", "`{expression}` is sorted {direction} but the solution sorts {expected}"),
    m(78, LOG, "DISTINCT as function parameter where not applicable", "`{expression}` uses DISTINCT but the solution does not"),
    m(79, LOG, "Missing DISTINCT from function parameter", "the solution uses `{expected}`"),
    m(80, LOG, "Incorrect function", "`{expression}` uses {function} where the solution uses {expected}"),
    m(81, LOG, "Incorrect column as function parameter", "`{expression}` aggregates a different column than the solution's `{expected}`"),
    m(82, COM, "Unnecessary complication", "{detail}"),
    m(83, COM, "Unnecessary DISTINCT in SELECT clause", "the result has no duplicates even without DISTINCT"),
    m(84, COM, "Unnecessary join", "`{variable}` is only used to join on its key and can be removed"),
    m(85, COM, "Unused correlation name", "correlation name `{name}` is never used"),
    m(86, COM, "Correlation names are always identical", "`{first}` and `{second}` always denote the same row"),
    m(87, COM, "Unnecessarily general comparison operator", "`{expression}` admits only {value}; use ="),
    m(88, COM, "LIKE without wildcards", "`{expression}` has no wildcard; use ="),
    m(89, COM, "Unnecessarily complicated SELECT in EXISTS subquery", "the SELECT list of an EXISTS subquery is ignored; use SELECT *"),
    m(90, COM, "IN/EXISTS condition can be replaced by comparison", "the subquery can be replaced by a comparison"),
    m(91, COM, "Unnecessary aggregate function", "`{expression}` aggregates a single value per group"),
    m(92, COM, "Unnecessary DISTINCT in aggregate function", "DISTINCT in `{expression}` has no effect"),
    m(93, COM, "Unnecessary argument of COUNT", "`{expression}` counts a column that is never NULL; use COUNT(*)"),
    m(94, COM, "Unnecessary GROUP BY in EXISTS subquery", "GROUP BY in an EXISTS subquery without HAVING has no effect"),
    m(95, COM, "GROUP BY with singleton groups", "every group holds a single row because the grouping includes a key"),
    m(96, COM, "GROUP BY with only a single group", "every grouping column is fixed to a constant, so there is only one group"),
    m(97, COM, "GROUP BY can be replaced with DISTINCT", "GROUP BY without aggregates can be written as SELECT DISTINCT"),
    m(98, COM, "UNION can be replaced by OR", "both UNION operands read the same relations and can be combined with OR"),
    m(99, COM, "Unnecessary column in ORDER BY clause", "ORDER BY `{expression}` never affects the order"),
    m(100, COM, "ORDER BY in subquery", "ORDER BY in a {role} subquery has no effect"),
    m(101, COM, "Inefficient HAVING", "`{expression}` does not depend on the groups and can move to WHERE"),
    m(102, COM, "Inefficient UNION", "the UNION operands are disjoint; UNION ALL avoids a duplicate check"),
    m(103, COM, "Condition in the subquery can be moved up", "`{expression}` only refers to the outer query"),
    m(104, COM, "Condition on left table in LEFT OUTER JOIN", "`{expression}` tests the preserved side of the LEFT JOIN; move it to WHERE"),
    m(105, COM, "OUTER JOIN can be replaced by INNER JOIN", "`{expression}` rejects the NULL rows of the outer join on `{variable}`"),
    m(106, COM, "Unnecessary derived table", "derived table `{variable}` can be merged into the outer query"),
];

/// Catalog entry by ID.
pub fn lookup(id: u16) -> Option<&'static Misconception> {
    let index = usize::from(id).checked_sub(1)?;
    CATALOG.get(index)
}

/// Render `template`, substituting `{name}` with the parameter of that name.
/// Unknown placeholders are kept verbatim.
pub fn render(template: &str, params: &[(String, String)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start + 1..];
        match tail.find('}') {
            Some(end) => {
                let name = &tail[..end];
                match params.iter().find(|(key, _)| key == name) {
                    Some((_, value)) => out.push_str(value),
                    None => {
                        out.push('{');
                        out.push_str(name);
                        out.push('}');
                    }
                }
                rest = &tail[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_ids_are_dense_and_categorized_by_range() {
        for (index, entry) in CATALOG.iter().enumerate() {
            assert_eq!(usize::from(entry.id), index + 1);
            let expected = match entry.id {
                1..=38 => Category::Syntax,
                39..=51 => Category::Semantic,
                52..=81 => Category::Logical,
                _ => Category::Complication,
            };
            assert_eq!(entry.category, expected, "id {}", entry.id);
        }
        assert!(lookup(0).is_none());
        assert!(lookup(107).is_none());
        assert_eq!(lookup(88).map(|m| m.title), Some("LIKE without wildcards"));
    }

    #[test]
    fn categories_order_and_parse() {
        assert!(Category::Syntax < Category::Semantic);
        assert!(Category::Logical < Category::Complication);
        assert_eq!("com".parse::<Category>(), Ok(Category::Complication));
        assert!("xyz".parse::<Category>().is_err());
        assert_eq!(Category::Semantic.to_string(), "SEM");
    }

    #[test]
    fn render_substitutes_known_parameters() {
        let params = vec![("column".to_string(), "enam".to_string())];
        assert_eq!(render("column `{column}` does not exist", &params), "column `enam` does not exist");
        assert_eq!(render("{missing} stays", &params), "{missing} stays");
    }
}
