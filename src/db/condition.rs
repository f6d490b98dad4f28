//! Parameterized filter expressions.
//!
//! A [`ConditionBuilder`] accumulates a `?`-placeholder predicate string and
//! the matching positional arguments. Every `add_*` method keeps the number
//! of placeholders equal to the number of arguments, including the no-op
//! paths taken when a field name is empty.

use crate::db::params::SqlValue;
use crate::db::sql::{quote_column, quote_literal};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Boolean connective placed between predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JoinLogic {
    And,
    Or,
}

impl JoinLogic {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
        }
    }
}

impl fmt::Display for JoinLogic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Comparison operator for a single predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// Case-insensitive substring match.
    Like,
}

impl Operator {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Like => "LIKE",
        }
    }

    /// Parse an operator token such as `"="`, `"!="` or `"like"`.
    pub fn parse(token: &str) -> Option<Self> {
        match token.trim().to_ascii_uppercase().as_str() {
            "=" | "==" => Some(Self::Eq),
            "<>" | "!=" => Some(Self::Ne),
            "<" => Some(Self::Lt),
            "<=" => Some(Self::Le),
            ">" => Some(Self::Gt),
            ">=" => Some(Self::Ge),
            "LIKE" => Some(Self::Like),
            _ => None,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Join kind used by [`Query::add_join`](crate::db::Query::add_join).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
}

impl JoinType {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Inner => "INNER JOIN",
            Self::Left => "LEFT JOIN",
            Self::Right => "RIGHT JOIN",
            Self::Full => "FULL JOIN",
        }
    }
}

/// Accumulated predicate string plus its positional arguments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConditionExpression {
    expression: String,
    args: Vec<SqlValue>,
}

impl ConditionExpression {
    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn args(&self) -> &[SqlValue] {
        &self.args
    }

    pub fn is_empty(&self) -> bool {
        self.expression.is_empty()
    }

    pub fn into_parts(self) -> (String, Vec<SqlValue>) {
        (self.expression, self.args)
    }
}

/// A single rendered predicate before it is cascaded onto the expression.
struct Predicate {
    sql: String,
    args: Vec<SqlValue>,
}

impl Predicate {
    /// `<column> <op> ?`, or `lower(<column>) LIKE ?` with a lower-cased,
    /// `%`-wrapped argument for [`Operator::Like`].
    fn new(column: String, op: Operator, value: SqlValue) -> Self {
        match op {
            Operator::Like => Self {
                sql: format!("lower({}) LIKE ?", column),
                args: vec![value.to_like_pattern()],
            },
            _ => Self {
                sql: format!("{} {} ?", column, op.as_sql()),
                args: vec![value],
            },
        }
    }

    fn combine(self, logic: JoinLogic, other: Predicate) -> Self {
        let mut args = self.args;
        args.extend(other.args);
        Self {
            sql: format!("({} {} {})", self.sql, logic.as_sql(), other.sql),
            args,
        }
    }
}

/// Builds a [`ConditionExpression`] from typed predicates.
#[derive(Debug, Clone, Default)]
pub struct ConditionBuilder {
    condition: ConditionExpression,
}

impl ConditionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `field <op> value`. An empty `field` leaves the builder unchanged.
    pub fn add_text_condition(
        &mut self,
        join: JoinLogic,
        field: &str,
        op: Operator,
        value: impl Into<SqlValue>,
    ) -> &mut Self {
        if field.is_empty() {
            return self;
        }
        let predicate = Predicate::new(quote_column(field), op, value.into());
        self.push(join, predicate);
        self
    }

    /// Add `(field1 <op1> value1 <combine> field2 <op2> value2)`. Both fields
    /// are required; if either is empty the builder is unchanged.
    ///
    /// The pair is always parenthesized and joined onto the expression as one
    /// predicate, so `a = ? AND` followed by an `Or` pair renders
    /// `a = ? AND (b = ? OR c = ?)`. It never renders the ungrouped
    /// `a = ? AND b = ? OR c = ?`.
    #[allow(clippy::too_many_arguments)]
    pub fn add_two_text_conditions(
        &mut self,
        join: JoinLogic,
        field1: &str,
        op1: Operator,
        value1: impl Into<SqlValue>,
        combine: JoinLogic,
        field2: &str,
        op2: Operator,
        value2: impl Into<SqlValue>,
    ) -> &mut Self {
        if field1.is_empty() || field2.is_empty() {
            return self;
        }
        let first = Predicate::new(quote_column(field1), op1, value1.into());
        let second = Predicate::new(quote_column(field2), op2, value2.into());
        self.push(join, first.combine(combine, second));
        self
    }

    /// Add `field ->> 'key' <op> value` against a JSON column. An empty
    /// `field` or `key` leaves the builder unchanged.
    pub fn add_json_field_condition(
        &mut self,
        join: JoinLogic,
        field: &str,
        key: &str,
        op: Operator,
        value: impl Into<SqlValue>,
    ) -> &mut Self {
        if field.is_empty() || key.is_empty() {
            return self;
        }
        let path = format!("{} ->> {}", quote_column(field), quote_literal(key));
        self.push(join, Predicate::new(path, op, value.into()));
        self
    }

    /// The expression built so far.
    pub fn condition(&self) -> &ConditionExpression {
        &self.condition
    }

    pub fn build(self) -> ConditionExpression {
        self.condition
    }

    fn push(&mut self, join: JoinLogic, predicate: Predicate) {
        let condition = &mut self.condition;
        if condition.expression.is_empty() {
            condition.expression = predicate.sql;
        } else {
            condition.expression = format!(
                "{} {} {}",
                condition.expression,
                join.as_sql(),
                predicate.sql
            );
        }
        condition.args.extend(predicate.args);
    }
}
