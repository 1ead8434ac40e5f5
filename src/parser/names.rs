use sqlparser::ast::{Ident, ObjectName};

/// Return the identifier without surrounding double quotes.
pub fn unquote_identifier(ident: &str) -> &str {
    ident
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(ident)
}

/// Normalize an identifier for case-insensitive matching.
///
/// Trims whitespace, removes surrounding double quotes on a single identifier,
/// and lowercases the result.
pub fn normalize_identifier(ident: &str) -> String {
    unquote_identifier(ident.trim()).to_ascii_lowercase()
}

/// Fold an identifier as written in a catalog: quoted names keep their
/// spelling, unquoted names are lowercased.
pub fn fold_identifier(ident: &str) -> String {
    let trimmed = ident.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        trimmed[1..trimmed.len() - 1].to_string()
    } else {
        trimmed.to_ascii_lowercase()
    }
}

/// Lookup key for a parsed identifier.
///
/// Unquoted identifiers fold to lower case; quoted identifiers keep their
/// spelling, matching `PostgreSQL` semantics.
pub fn ident_key(ident: &Ident) -> String {
    if ident.quote_style.is_some() {
        ident.value.clone()
    } else {
        ident.value.to_ascii_lowercase()
    }
}

/// Split a potentially schema-qualified name into `(schema, relation)`.
///
/// Handles dots inside quoted identifiers, e.g. `"my.schema"."table.name"`.
pub fn split_schema_and_relation(name: &str) -> Option<(String, String)> {
    let mut in_quotes = false;
    let mut start = 0usize;
    let mut parts: Vec<&str> = Vec::new();

    for (idx, ch) in name.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            '.' if !in_quotes => {
                parts.push(name[start..idx].trim());
                start = idx + 1;
            }
            _ => {}
        }
    }
    parts.push(name[start..].trim());

    if parts.len() < 2 {
        return None;
    }

    let schema = unquote_identifier(parts[parts.len() - 2]).to_string();
    let relation = unquote_identifier(parts[parts.len() - 1]).to_string();
    Some((schema, relation))
}

/// Normalize a relation name to its terminal identifier.
///
/// Examples:
/// - `"public.emp"` -> `"emp"`
/// - `"\"hr\".\"EMP\""` -> `"emp"`
pub fn normalize_relation_name(name: &str) -> String {
    if let Some((_, relation)) = split_schema_and_relation(name.trim()) {
        return normalize_identifier(&relation);
    }
    normalize_identifier(name)
}

/// Split a parsed object name into an optional schema key and a relation key.
///
/// Catalog-qualified names (`db.schema.rel`) keep only the last two parts.
pub fn object_name_keys(name: &ObjectName) -> (Option<String>, String) {
    let parts = &name.0;
    match parts.len() {
        0 => (None, String::new()),
        1 => (None, ident_key(&parts[0])),
        n => (Some(ident_key(&parts[n - 2])), ident_key(&parts[n - 1])),
    }
}

/// Build lookup candidates for schema-aware relation resolution.
///
/// Ordered from most specific to least specific. Unqualified names are tried
/// against the search-path schema first.
pub fn relation_lookup_candidates(
    schema: Option<&str>,
    relation: &str,
    search_path: &str,
) -> Vec<(Option<String>, String)> {
    let mut candidates = Vec::new();
    match schema {
        Some(schema) => candidates.push((Some(schema.to_string()), relation.to_string())),
        None => {
            candidates.push((Some(search_path.to_string()), relation.to_string()));
            candidates.push((None, relation.to_string()));
        }
    }

    let mut deduped = Vec::new();
    for candidate in candidates {
        if !deduped.contains(&candidate) {
            deduped.push(candidate);
        }
    }
    deduped
}

/// Levenshtein distance between two identifiers, compared case-insensitively.
pub fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.to_lowercase().chars().collect();
    let b: Vec<char> = b.to_lowercase().chars().collect();
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}

/// Closest candidate within `max_distance` edits, ties broken alphabetically.
pub fn closest_match<'a, I>(name: &str, candidates: I, max_distance: usize) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    candidates
        .into_iter()
        .filter(|candidate| !candidate.eq_ignore_ascii_case(name))
        .map(|candidate| (edit_distance(name, candidate), candidate))
        .filter(|(distance, _)| *distance <= max_distance)
        .min()
        .map(|(_, candidate)| candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_schema_and_relation_handles_quoted_dots() {
        assert_eq!(
            split_schema_and_relation(r#""my.schema"."table.name""#),
            Some(("my.schema".to_string(), "table.name".to_string()))
        );
    }

    #[test]
    fn relation_lookup_candidates_prefer_search_path_for_unqualified_names() {
        assert_eq!(
            relation_lookup_candidates(None, "emp", "public"),
            vec![
                (Some("public".to_string()), "emp".to_string()),
                (None, "emp".to_string()),
            ]
        );
        assert_eq!(
            relation_lookup_candidates(Some("hr"), "emp", "public"),
            vec![(Some("hr".to_string()), "emp".to_string())]
        );
    }

    #[test]
    fn normalize_relation_name_handles_schema_quotes_and_case() {
        assert_eq!(normalize_relation_name("hr.emp"), "emp");
        assert_eq!(normalize_relation_name(r#""hr"."emp""#), "emp");
        assert_eq!(normalize_relation_name(r#""EMP""#), "emp");
    }

    #[test]
    fn ident_key_preserves_quoted_case() {
        assert_eq!(ident_key(&Ident::new("EmpNo")), "empno");
        assert_eq!(ident_key(&Ident::with_quote('"', "EmpNo")), "EmpNo");
        assert_eq!(fold_identifier(r#""EmpNo""#), "EmpNo");
        assert_eq!(fold_identifier("EmpNo"), "empno");
    }

    #[test]
    fn closest_match_finds_single_typos() {
        assert_eq!(edit_distance("ename", "enmae"), 2);
        assert_eq!(
            closest_match("salary", ["sal", "salery", "comm"], 2),
            Some("salery")
        );
        assert_eq!(closest_match("deptno", ["empno", "mgr"], 1), None);
    }
}
