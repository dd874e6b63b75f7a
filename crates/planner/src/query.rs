//! Query canonicalization and shape recognition
//!
//! The SQL front-end lives above the engine; the planner works on
//! canonicalized text (case-folded outside string literals, whitespace
//! collapsed) and recognizes the conjunctive subset
//!
//! ```text
//! select <cols|*> from <table>
//!     [join <table2> on <t.col> <op> <t2.col>]
//!     [where <col> <op> <literal> [and ...]]
//! ```
//!
//! Anything the recognizer cannot shape is reported as an error; the
//! planner degrades to a full table scan rather than failing the query.

use serde::{Deserialize, Serialize};
use terrace_core::{Error, Result, Value};

/// Case-fold outside single-quoted literals and collapse whitespace.
///
/// The canonical form is the cache key and the materialized-view match
/// key, so two spellings of the same query share both.
pub fn canonicalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_quote = false;
    let mut last_space = true;
    for c in text.trim().chars() {
        if c == '\'' {
            in_quote = !in_quote;
            out.push(c);
            last_space = false;
        } else if in_quote {
            out.push(c);
            last_space = false;
        } else if c.is_whitespace() {
            if !last_space {
                out.push(' ');
                last_space = true;
            }
        } else {
            for lower in c.to_lowercase() {
                out.push(lower);
            }
            last_space = false;
        }
    }
    if out.ends_with(' ') {
        out.pop();
    }
    out
}

/// Output columns of a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Projection {
    /// All columns.
    Star,
    /// Named columns, in order.
    Columns(Vec<String>),
}

/// Predicate comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PredicateOp {
    /// Equality.
    Eq,
    /// Inequality.
    Ne,
    /// Less than.
    Lt,
    /// Less than or equal.
    Le,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Ge,
    /// SQL LIKE with `%` wildcards.
    Like,
    /// Membership in a literal list.
    In,
}

impl PredicateOp {
    /// Whether this operator constrains a range of the value order.
    pub fn is_range(&self) -> bool {
        matches!(
            self,
            PredicateOp::Lt | PredicateOp::Le | PredicateOp::Gt | PredicateOp::Ge
        )
    }
}

/// One conjunct of a WHERE clause: `column op literal(s)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    /// Column the predicate constrains.
    pub column: String,
    /// Operator.
    pub op: PredicateOp,
    /// Literal operands (one, except for `In`).
    pub values: Vec<Value>,
}

impl Predicate {
    /// Evaluate against a row value (`None` = column absent).
    pub fn matches(&self, value: Option<&Value>) -> bool {
        let Some(value) = value else {
            return false;
        };
        match self.op {
            PredicateOp::Eq => self.values.first().is_some_and(|v| {
                value.total_cmp(v) == std::cmp::Ordering::Equal
            }),
            PredicateOp::Ne => self.values.first().is_some_and(|v| {
                value.total_cmp(v) != std::cmp::Ordering::Equal
            }),
            PredicateOp::Lt => self
                .values
                .first()
                .is_some_and(|v| value.total_cmp(v) == std::cmp::Ordering::Less),
            PredicateOp::Le => self
                .values
                .first()
                .is_some_and(|v| value.total_cmp(v) != std::cmp::Ordering::Greater),
            PredicateOp::Gt => self
                .values
                .first()
                .is_some_and(|v| value.total_cmp(v) == std::cmp::Ordering::Greater),
            PredicateOp::Ge => self
                .values
                .first()
                .is_some_and(|v| value.total_cmp(v) != std::cmp::Ordering::Less),
            PredicateOp::Like => match (value, self.values.first()) {
                (Value::String(s), Some(Value::String(pattern))) => like_match(s, pattern),
                _ => false,
            },
            PredicateOp::In => self
                .values
                .iter()
                .any(|v| value.total_cmp(v) == std::cmp::Ordering::Equal),
        }
    }
}

// Simple LIKE: `%` matches any run, other characters match themselves.
fn like_match(s: &str, pattern: &str) -> bool {
    let parts: Vec<&str> = pattern.split('%').collect();
    if parts.len() == 1 {
        return s == pattern;
    }
    let mut rest = s;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            match rest.strip_prefix(part) {
                Some(r) => rest = r,
                None => return false,
            }
        } else if i == parts.len() - 1 {
            return rest.ends_with(part);
        } else {
            match rest.find(part) {
                Some(pos) => rest = &rest[pos + part.len()..],
                None => return false,
            }
        }
    }
    true
}

/// The join clause of a two-table query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinShape {
    /// Left (FROM) table.
    pub left_table: String,
    /// Right (JOIN) table.
    pub right_table: String,
    /// Join column on the left table.
    pub left_column: String,
    /// Join column on the right table.
    pub right_column: String,
    /// Join comparison; `Eq` makes it an equi-join.
    pub op: PredicateOp,
}

impl JoinShape {
    /// Whether this is an equality join.
    pub fn is_equi(&self) -> bool {
        self.op == PredicateOp::Eq
    }
}

/// The recognized shape of a query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryShape {
    /// Canonical text the shape was parsed from.
    pub canonical: String,
    /// Projected columns.
    pub projection: Projection,
    /// Base (FROM) table.
    pub table: String,
    /// Optional single join.
    pub join: Option<JoinShape>,
    /// WHERE conjuncts.
    pub predicates: Vec<Predicate>,
}

/// Parse a query into its shape.
///
/// # Errors
///
/// `InvalidOperation` when the text is outside the conjunctive subset;
/// the planner treats that as "fall back to a table scan", never as a
/// user-facing failure.
pub fn parse_query(text: &str) -> Result<QueryShape> {
    let canonical = canonicalize(text);
    let rest = canonical
        .strip_prefix("select ")
        .ok_or_else(|| unshaped("missing select"))?;
    let (proj_text, rest) = rest
        .split_once(" from ")
        .ok_or_else(|| unshaped("missing from"))?;

    let projection = if proj_text.trim() == "*" {
        Projection::Star
    } else {
        Projection::Columns(
            proj_text
                .split(',')
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect(),
        )
    };

    let (from_part, where_part) = match rest.split_once(" where ") {
        Some((f, w)) => (f.trim(), Some(w.trim())),
        None => (rest.trim(), None),
    };

    let (table, join) = match from_part.split_once(" join ") {
        None => (from_part.to_string(), None),
        Some((left, join_rest)) => {
            let (right, on) = join_rest
                .split_once(" on ")
                .ok_or_else(|| unshaped("join without on"))?;
            let join = parse_join(left.trim(), right.trim(), on.trim())?;
            (left.trim().to_string(), Some(join))
        }
    };
    if table.is_empty() || table.contains(' ') {
        return Err(unshaped("bad table name"));
    }

    let mut predicates = Vec::new();
    if let Some(where_text) = where_part {
        for conjunct in where_text.split(" and ") {
            predicates.push(parse_predicate(conjunct.trim(), &table)?);
        }
    }

    Ok(QueryShape {
        canonical,
        projection,
        table,
        join,
        predicates,
    })
}

fn unshaped(reason: &str) -> Error {
    Error::InvalidOperation(format!("unrecognized query shape: {}", reason))
}

fn parse_join(left: &str, right: &str, on: &str) -> Result<JoinShape> {
    let (lhs, op, rhs) = split_comparison(on).ok_or_else(|| unshaped("bad join condition"))?;
    let (lt, lc) = lhs
        .split_once('.')
        .ok_or_else(|| unshaped("unqualified join column"))?;
    let (rt, rc) = rhs
        .split_once('.')
        .ok_or_else(|| unshaped("unqualified join column"))?;

    // Accept either side order in the ON clause.
    let (left_column, right_column) = if lt == left && rt == right {
        (lc.to_string(), rc.to_string())
    } else if lt == right && rt == left {
        (rc.to_string(), lc.to_string())
    } else {
        return Err(unshaped("join condition references unknown table"));
    };

    Ok(JoinShape {
        left_table: left.to_string(),
        right_table: right.to_string(),
        left_column,
        right_column,
        op,
    })
}

fn parse_predicate(text: &str, table: &str) -> Result<Predicate> {
    if let Some((col, list)) = text.split_once(" in ") {
        let list = list.trim();
        let inner = list
            .strip_prefix('(')
            .and_then(|l| l.strip_suffix(')'))
            .ok_or_else(|| unshaped("bad in-list"))?;
        let values = inner
            .split(',')
            .map(|v| parse_literal(v.trim()))
            .collect::<Result<Vec<Value>>>()?;
        return Ok(Predicate {
            column: strip_qualifier(col.trim(), table),
            op: PredicateOp::In,
            values,
        });
    }

    let (lhs, op, rhs) = split_comparison(text).ok_or_else(|| unshaped("bad predicate"))?;
    if op == PredicateOp::Like && !matches!(parse_literal(rhs)?, Value::String(_)) {
        return Err(unshaped("like needs a string pattern"));
    }
    Ok(Predicate {
        column: strip_qualifier(lhs, table),
        op,
        values: vec![parse_literal(rhs)?],
    })
}

fn strip_qualifier(column: &str, table: &str) -> String {
    column
        .strip_prefix(&format!("{}.", table))
        .unwrap_or(column)
        .to_string()
}

// Longest operators first so `<=` is not read as `<`.
fn split_comparison(text: &str) -> Option<(&str, PredicateOp, &str)> {
    const OPS: [(&str, PredicateOp); 8] = [
        ("<=", PredicateOp::Le),
        (">=", PredicateOp::Ge),
        ("!=", PredicateOp::Ne),
        ("<>", PredicateOp::Ne),
        ("=", PredicateOp::Eq),
        ("<", PredicateOp::Lt),
        (">", PredicateOp::Gt),
        (" like ", PredicateOp::Like),
    ];
    for (symbol, op) in OPS {
        if let Some(pos) = text.find(symbol) {
            let lhs = text[..pos].trim();
            let rhs = text[pos + symbol.len()..].trim();
            if !lhs.is_empty() && !rhs.is_empty() {
                return Some((lhs, op, rhs));
            }
        }
    }
    None
}

fn parse_literal(text: &str) -> Result<Value> {
    let text = text.trim();
    if let Some(inner) = text.strip_prefix('\'').and_then(|t| t.strip_suffix('\'')) {
        return Ok(Value::String(inner.to_string()));
    }
    if text == "null" {
        return Ok(Value::Null);
    }
    if text == "true" {
        return Ok(Value::Bool(true));
    }
    if text == "false" {
        return Ok(Value::Bool(false));
    }
    if let Ok(i) = text.parse::<i64>() {
        return Ok(Value::Int(i));
    }
    if let Ok(f) = text.parse::<f64>() {
        return Ok(Value::Float(f));
    }
    Err(unshaped("bad literal"))
}
