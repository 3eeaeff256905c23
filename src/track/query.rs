//! Minimal SQL-like selection over track columns.
//!
//! ```text
//! SELECT * [WHERE <cond> [(AND | OR) <cond>]...]
//! SELECT col1, col2 [WHERE ...]
//! <cond> := <column> <op> <number>      <op> ∈ { <, >, <=, >=, =, ==, != }
//! ```
//!
//! Keywords are case-insensitive. There are no parentheses: `AND` binds tighter than `OR`,
//! so `a < 1 OR b > 2 AND c = 0` reads `a < 1 OR (b > 2 AND c = 0)`.
//! Comparisons against `NaN` cells are false (except `!=`).
use std::sync::LazyLock;

use regex::Regex;

use super::Track;
use crate::track_errors::TrackError;

static TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        \s*(
            <= | >= | == | != | < | > | = | , | \*
          | [-+]?(?:\d+\.?\d*|\.\d+)(?:[eE][-+]?\d+)?
          | [A-Za-z_@][A-Za-z0-9_@.]*
          | \S
        )",
    )
    .expect("valid query token regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
}

impl CompareOp {
    fn parse(token: &str) -> Option<Self> {
        match token {
            "<" => Some(CompareOp::Lt),
            ">" => Some(CompareOp::Gt),
            "<=" => Some(CompareOp::Le),
            ">=" => Some(CompareOp::Ge),
            "=" | "==" => Some(CompareOp::Eq),
            "!=" => Some(CompareOp::Ne),
            _ => None,
        }
    }

    pub fn apply(&self, lhs: f64, rhs: f64) -> bool {
        match self {
            CompareOp::Lt => lhs < rhs,
            CompareOp::Gt => lhs > rhs,
            CompareOp::Le => lhs <= rhs,
            CompareOp::Ge => lhs >= rhs,
            CompareOp::Eq => lhs == rhs,
            CompareOp::Ne => lhs != rhs,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub column: String,
    pub op: CompareOp,
    pub value: f64,
}

/// A parsed query: projection and a predicate in disjunctive normal form.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// `None` for `SELECT *`.
    pub columns: Option<Vec<String>>,
    /// OR of AND-groups. Empty means "every observation".
    pub predicate: Vec<Vec<Condition>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    /// `SELECT *`: the matching observations with all their features.
    Track(Track),
    /// `SELECT a, b`: the requested columns restricted to the matching observations.
    Columns(Vec<(String, Vec<f64>)>),
}

fn invalid(query: &str, what: impl std::fmt::Display) -> TrackError {
    TrackError::InvalidQuery(format!("{what} in \"{query}\""))
}

impl Query {
    pub fn parse(text: &str) -> Result<Self, TrackError> {
        let tokens: Vec<&str> = TOKEN
            .captures_iter(text)
            .filter_map(|c| c.get(1).map(|m| m.as_str()))
            .collect();
        let mut it = tokens.iter().copied().peekable();

        match it.next() {
            Some(kw) if kw.eq_ignore_ascii_case("SELECT") => {}
            _ => return Err(invalid(text, "expected SELECT")),
        }

        let columns = if it.peek() == Some(&"*") {
            it.next();
            None
        } else {
            let mut cols = Vec::new();
            loop {
                match it.next() {
                    Some(name) if is_identifier(name) => cols.push(name.to_string()),
                    Some(other) => return Err(invalid(text, format!("unexpected '{other}'"))),
                    None => return Err(invalid(text, "missing column list")),
                }
                if it.peek() == Some(&",") {
                    it.next();
                } else {
                    break;
                }
            }
            Some(cols)
        };

        let mut predicate: Vec<Vec<Condition>> = Vec::new();
        match it.next() {
            None => {}
            Some(kw) if kw.eq_ignore_ascii_case("WHERE") => {
                let mut group = Vec::new();
                loop {
                    let column = match it.next() {
                        Some(name) if is_identifier(name) => name.to_string(),
                        _ => return Err(invalid(text, "expected a column name")),
                    };
                    let op = it
                        .next()
                        .and_then(CompareOp::parse)
                        .ok_or_else(|| invalid(text, format!("bad operator after '{column}'")))?;
                    let value = it
                        .next()
                        .and_then(|v| v.parse::<f64>().ok())
                        .ok_or_else(|| invalid(text, format!("expected a number after '{column}'")))?;
                    group.push(Condition { column, op, value });

                    match it.next() {
                        None => break,
                        Some(kw) if kw.eq_ignore_ascii_case("AND") => {}
                        Some(kw) if kw.eq_ignore_ascii_case("OR") => {
                            predicate.push(std::mem::take(&mut group));
                        }
                        Some(other) => return Err(invalid(text, format!("unexpected '{other}'"))),
                    }
                }
                predicate.push(group);
            }
            Some(other) => return Err(invalid(text, format!("unexpected '{other}'"))),
        }

        Ok(Query { columns, predicate })
    }

    /// Indices of the observations of `track` satisfying the predicate.
    pub fn matching(&self, track: &Track) -> Result<Vec<usize>, TrackError> {
        let mut keep = vec![self.predicate.is_empty(); track.size()];
        for group in &self.predicate {
            let mut group_ok = vec![true; track.size()];
            for cond in group {
                let values = track.column(&cond.column)?;
                for (ok, v) in group_ok.iter_mut().zip(values) {
                    *ok = *ok && cond.op.apply(v, cond.value);
                }
            }
            keep.iter_mut().zip(group_ok).for_each(|(k, g)| *k = *k || g);
        }
        Ok(keep
            .into_iter()
            .enumerate()
            .filter_map(|(i, k)| k.then_some(i))
            .collect())
    }
}

fn is_identifier(token: &str) -> bool {
    token
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '@')
        && !["SELECT", "WHERE", "AND", "OR"]
            .iter()
            .any(|kw| kw.eq_ignore_ascii_case(token))
}

impl Track {
    /// Run a `SELECT` query against this track.
    pub fn query(&self, text: &str) -> Result<QueryResult, TrackError> {
        let query = Query::parse(text)?;
        let indices = query.matching(self)?;
        match query.columns {
            None => Ok(QueryResult::Track(self.select(&indices)?)),
            Some(names) => names
                .into_iter()
                .map(|name| {
                    let col = self.column(&name)?;
                    Ok((name, indices.iter().map(|&i| col[i]).collect()))
                })
                .collect::<Result<Vec<_>, TrackError>>()
                .map(QueryResult::Columns),
        }
    }
}

#[cfg(test)]
mod query_test {
    use super::*;
    use crate::coords::Srid;

    fn sample() -> Track {
        let x: Vec<f64> = (0..6).map(|i| i as f64).collect();
        let y = vec![0.0, 10.0, 20.0, 30.0, 40.0, 50.0];
        let mut t = Track::from_xyz(Srid::Enu, &x, &y, None, None).unwrap();
        t.add_feature_values("speed", vec![1.0, 5.0, 2.0, 8.0, 3.0, 9.0])
            .unwrap();
        t
    }

    #[test]
    fn test_select_star() {
        let t = sample();
        match t.query("SELECT * WHERE speed > 2.5").unwrap() {
            QueryResult::Track(sub) => {
                assert_eq!(sub.size(), 4);
                assert_eq!(sub.column("x").unwrap(), vec![1.0, 3.0, 4.0, 5.0]);
                assert_eq!(sub.feature_names(), &["speed"]);
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        let t = sample();
        let q = "select x where x < 1 or speed >= 5 and y != 30";
        match t.query(q).unwrap() {
            QueryResult::Columns(cols) => {
                assert_eq!(cols.len(), 1);
                assert_eq!(cols[0].0, "x");
                assert_eq!(cols[0].1, vec![0.0, 1.0, 5.0]);
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_no_where_returns_all() {
        let t = sample();
        match t.query("SELECT y, speed").unwrap() {
            QueryResult::Columns(cols) => {
                assert_eq!(cols[1].1.len(), 6);
            }
            other => panic!("unexpected result {other:?}"),
        }
        let parsed = Query::parse("SELECT * WHERE speed == -1e3").unwrap();
        assert_eq!(parsed.predicate[0][0].value, -1000.0);
    }

    #[test]
    fn test_errors() {
        let t = sample();
        assert!(matches!(t.query("DELETE *"), Err(TrackError::InvalidQuery(_))));
        assert!(matches!(
            t.query("SELECT * WHERE speed ~ 3"),
            Err(TrackError::InvalidQuery(_))
        ));
        assert!(matches!(
            t.query("SELECT * WHERE speed > fast"),
            Err(TrackError::InvalidQuery(_))
        ));
        assert_eq!(
            t.query("SELECT * WHERE heading > 3"),
            Err(TrackError::MissingFeature("heading".into()))
        );
    }
}
