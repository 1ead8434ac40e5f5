use crate::classifier::finding::{Finding, Location};
use crate::parser::lexical::{Clause, LexicalFacts, LexicalMark};

fn at_mark(mark: &LexicalMark) -> Location {
    Location::new(None, mark.span, mark.text.clone())
}

fn suggestion(mark: &LexicalMark) -> String {
    mark.suggestion
        .as_deref()
        .map(|s| format!("; use `{s}`"))
        .unwrap_or_default()
}

/// Missing final semicolon after earlier terminated statements (22) and
/// semicolons that end an empty statement (38).
pub fn semicolons(facts: &LexicalFacts) -> Vec<Finding> {
    let mut findings = Vec::new();
    if facts.statement_count > 1 && !facts.ends_with_semicolon {
        if let Some(end) = facts.end {
            findings.push(Finding::syntax(22, Location::new(None, end, "")));
        }
    }
    for span in &facts.extra_semicolons {
        findings.push(Finding::syntax(38, Location::new(None, *span, ";")));
    }
    findings
}

/// Curly, square or unmatched brackets (34).
pub fn brackets(facts: &LexicalFacts) -> Vec<Finding> {
    let mut findings = Vec::new();
    for (count, text, name) in [
        (&facts.square, "[", "square brackets"),
        (&facts.curly, "{", "curly brackets"),
    ] {
        if let (true, Some(first)) = (count.is_used(), count.first) {
            findings.push(
                Finding::syntax(34, Location::new(None, first, text))
                    .param("problem", format!("{name} are not used to group SQL expressions")),
            );
        }
    }
    if facts.round.is_unbalanced() {
        let span = facts.round.first.unwrap_or_default();
        findings.push(
            Finding::syntax(34, Location::new(None, span, "(")).param(
                "problem",
                format!(
                    "{} opening and {} closing parentheses",
                    facts.round.open, facts.round.close
                ),
            ),
        );
    }
    findings
}

/// Operators borrowed from programming languages (37).
pub fn nonstandard_operators(facts: &LexicalFacts) -> Vec<Finding> {
    facts
        .nonstandard_operators
        .iter()
        .map(|mark| {
            Finding::syntax(37, at_mark(mark))
                .param("operator", &mark.text)
                .param("suggestion", suggestion(mark))
        })
        .collect()
}

/// Vendor keywords (36).
pub fn nonstandard_keywords(facts: &LexicalFacts) -> Vec<Finding> {
    facts
        .nonstandard_keywords
        .iter()
        .map(|mark| {
            Finding::syntax(36, at_mark(mark))
                .param("keyword", &mark.text)
                .param("suggestion", suggestion(mark))
        })
        .collect()
}

/// Keywords written like function calls or glued together (32).
pub fn keyword_syntax(facts: &LexicalFacts) -> Vec<Finding> {
    let calls = facts.keyword_calls.iter().map(|mark| {
        Finding::syntax(32, at_mark(mark))
            .param("keyword", &mark.text)
            .param("form", "a function call")
    });
    let glued = facts.glued_keywords.iter().map(|mark| {
        let form = match &mark.suggestion {
            Some(s) => format!("one word instead of `{s}`"),
            None => "one word".to_string(),
        };
        Finding::syntax(32, at_mark(mark))
            .param("keyword", &mark.text)
            .param("form", form)
    });
    calls.chain(glued).collect()
}

/// GROUP BY or ORDER BY items with no comma between them (33).
pub fn list_commas(facts: &LexicalFacts) -> Vec<Finding> {
    facts
        .missing_commas
        .iter()
        .map(|mark| Finding::syntax(33, at_mark(mark)).param("text", &mark.text))
        .collect()
}

/// `IS` before something other than NULL, TRUE, FALSE or UNKNOWN (35).
pub fn misapplied_is(facts: &LexicalFacts) -> Vec<Finding> {
    facts
        .misapplied_is
        .iter()
        .map(|mark| Finding::syntax(35, at_mark(mark)).param("text", &mark.text))
        .collect()
}

/// WHERE twice (19), other repeated clauses (24) and clauses out of order (30).
pub fn clause_sequence(facts: &LexicalFacts) -> Vec<Finding> {
    let mut findings = Vec::new();
    for block in &facts.clause_blocks {
        let mut seen: Vec<Clause> = Vec::new();
        let mut latest: Option<Clause> = None;
        for (clause, span) in &block.clauses {
            let location = Location::new(Some(*clause), *span, clause.to_string());
            if seen.contains(clause) {
                findings.push(if *clause == Clause::Where {
                    Finding::syntax(19, location)
                } else {
                    Finding::syntax(24, location).param("clause", clause)
                });
            } else if let Some(previous) = latest.filter(|previous| previous > clause) {
                findings.push(
                    Finding::syntax(30, location)
                        .param("clause", clause)
                        .param("previous", previous),
                );
            }
            seen.push(*clause);
            latest = latest.max(Some(*clause));
        }
    }
    findings
}
