/// Relational query plans
///
/// A `SelectPlan` is the query-builder abstraction the compiler targets: one
/// root table, joins with their own ON predicates, WHERE predicates (including
/// IN-subqueries), DISTINCT, cumulative ORDER BY, LIMIT/OFFSET and COUNT. Plans
/// render to SQL in DataFusion's dialect.

use std::fmt::{self, Display, Formatter, Write};

/// A literal bound into a predicate
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// Decimal literal, already checked to be numeric
    Decimal(String),
    Date(String),
    Timestamp(String),
}

impl Display for SqlValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => f.write_str("NULL"),
            SqlValue::Bool(true) => f.write_str("TRUE"),
            SqlValue::Bool(false) => f.write_str("FALSE"),
            SqlValue::Int(value) => write!(f, "{}", value),
            SqlValue::Float(value) => write!(f, "{:?}", value),
            SqlValue::Text(value) => write_string_literal(f, value),
            SqlValue::Decimal(value) => f.write_str(value),
            SqlValue::Date(value) => {
                f.write_str("DATE ")?;
                write_string_literal(f, value)
            }
            SqlValue::Timestamp(value) => {
                f.write_str("TIMESTAMP ")?;
                write_string_literal(f, value)
            }
        }
    }
}

fn write_string_literal(f: &mut Formatter<'_>, value: &str) -> fmt::Result {
    f.write_char('\'')?;
    f.write_str(&value.replace('\'', "''"))?;
    f.write_char('\'')
}

/// Quote an identifier, splitting qualified table names into their parts
pub fn quote_identifier(name: &str) -> String {
    name.split('.')
        .map(|part| format!("\"{}\"", part.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(".")
}

/// A column of one table alias in the plan
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnRef {
    pub alias: String,
    pub column: String,
}

impl ColumnRef {
    pub fn new(alias: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            column: column.into(),
        }
    }

    /// Name of the column in the result set
    pub fn output_name(&self) -> String {
        format!("{}__{}", self.alias, self.column)
    }
}

impl Display for ColumnRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", quote_identifier(&self.alias), quote_identifier(&self.column))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Eq(ColumnRef, SqlValue),
    In(ColumnRef, Vec<SqlValue>),
    IsNull(ColumnRef),
    ColumnEq(ColumnRef, ColumnRef),
    InSubquery(ColumnRef, Box<SelectPlan>),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    False,
}

impl Predicate {
    /// Predicate for "column matches any of the values", NULL included
    pub fn any_of(column: ColumnRef, values: Vec<SqlValue>) -> Predicate {
        let matches_null = values.iter().any(|value| *value == SqlValue::Null);
        let mut values: Vec<SqlValue> = values.into_iter().filter(|v| *v != SqlValue::Null).collect();

        let value_predicate = match values.len() {
            0 => None,
            1 => values.pop().map(|value| Predicate::Eq(column.clone(), value)),
            _ => Some(Predicate::In(column.clone(), values)),
        };

        match (value_predicate, matches_null) {
            (None, false) => Predicate::False,
            (None, true) => Predicate::IsNull(column),
            (Some(predicate), false) => predicate,
            (Some(predicate), true) => Predicate::Or(vec![predicate, Predicate::IsNull(column)]),
        }
    }
}

impl Display for Predicate {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Eq(column, value) => write!(f, "{} = {}", column, value),
            Predicate::In(column, values) => {
                write!(f, "{} IN (", column)?;
                write_separated(f, values, ", ")?;
                f.write_char(')')
            }
            Predicate::IsNull(column) => write!(f, "{} IS NULL", column),
            Predicate::ColumnEq(left, right) => write!(f, "{} = {}", left, right),
            Predicate::InSubquery(column, subquery) => write!(f, "{} IN ({})", column, subquery),
            Predicate::And(predicates) if predicates.is_empty() => f.write_str("TRUE"),
            Predicate::Or(predicates) if predicates.is_empty() => f.write_str("FALSE"),
            Predicate::And(predicates) => write_grouped(f, predicates, " AND "),
            Predicate::Or(predicates) => write_grouped(f, predicates, " OR "),
            Predicate::False => f.write_str("FALSE"),
        }
    }
}

fn write_separated<T: Display>(f: &mut Formatter<'_>, items: &[T], separator: &str) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(separator)?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

fn write_grouped(f: &mut Formatter<'_>, predicates: &[Predicate], separator: &str) -> fmt::Result {
    f.write_char('(')?;
    write_separated(f, predicates, separator)?;
    f.write_char(')')
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinKind {
    Inner,
    #[default]
    Left,
    Right,
}

impl JoinKind {
    pub fn from_name(name: &str) -> Option<JoinKind> {
        match name {
            "INNER" => Some(JoinKind::Inner),
            "LEFT" => Some(JoinKind::Left),
            "RIGHT" => Some(JoinKind::Right),
            _ => None,
        }
    }
}

impl Display for JoinKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Right => "RIGHT JOIN",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub kind: JoinKind,
    pub table: String,
    pub alias: String,
    /// Conditions of this join only, rendered into its ON clause
    pub on: Vec<Predicate>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    Column(ColumnRef),
    CountDistinct { column: ColumnRef, output: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub fn from_name(name: &str) -> Option<Direction> {
        match name {
            "ASC" => Some(Direction::Asc),
            "DESC" => Some(Direction::Desc),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderTerm {
    pub column: ColumnRef,
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectPlan {
    pub distinct: bool,
    pub projection: Vec<Projection>,
    pub table: String,
    pub alias: String,
    pub joins: Vec<Join>,
    pub filters: Vec<Predicate>,
    pub order_by: Vec<OrderTerm>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl SelectPlan {
    pub fn new(table: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            distinct: false,
            projection: Vec::new(),
            table: table.into(),
            alias: alias.into(),
            joins: Vec::new(),
            filters: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    /// Project a column once, returning its output name
    pub fn project(&mut self, column: ColumnRef) -> String {
        let output = column.output_name();
        let projected = self
            .projection
            .iter()
            .any(|p| matches!(p, Projection::Column(c) if *c == column));
        if !projected {
            self.projection.push(Projection::Column(column));
        }
        output
    }

    /// Append an ORDER BY term; terms already present keep their position and direction
    pub fn order(&mut self, column: ColumnRef, direction: Direction) {
        if self.order_by.iter().any(|term| term.column == column) {
            return;
        }
        self.project(column.clone());
        self.order_by.push(OrderTerm { column, direction });
    }

    /// `COUNT(DISTINCT column)` over the same joins and filters, unordered and unbounded
    pub fn count_distinct(&self, column: ColumnRef) -> SelectPlan {
        SelectPlan {
            distinct: false,
            projection: vec![Projection::CountDistinct {
                column,
                output: "total".to_string(),
            }],
            order_by: Vec::new(),
            limit: None,
            offset: None,
            ..self.clone()
        }
    }

    pub fn to_sql(&self) -> String {
        self.to_string()
    }
}

impl Display for SelectPlan {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("SELECT ")?;
        if self.distinct {
            f.write_str("DISTINCT ")?;
        }
        for (i, projection) in self.projection.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match projection {
                Projection::Column(column) => {
                    write!(f, "{} AS {}", column, quote_identifier(&column.output_name()))?
                }
                Projection::CountDistinct { column, output } => {
                    write!(f, "COUNT(DISTINCT {}) AS {}", column, quote_identifier(output))?
                }
            }
        }
        if self.projection.is_empty() {
            f.write_char('*')?;
        }

        write!(
            f,
            " FROM {} {}",
            quote_identifier(&self.table),
            quote_identifier(&self.alias)
        )?;

        for join in &self.joins {
            write!(
                f,
                " {} {} {} ON ",
                join.kind,
                quote_identifier(&join.table),
                quote_identifier(&join.alias)
            )?;
            write_conjunction(f, &join.on)?;
        }

        if !self.filters.is_empty() {
            f.write_str(" WHERE ")?;
            write_conjunction(f, &self.filters)?;
        }

        if !self.order_by.is_empty() {
            f.write_str(" ORDER BY ")?;
            for (i, term) in self.order_by.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                f.write_str(&quote_identifier(&term.column.output_name()))?;
                f.write_str(match term.direction {
                    Direction::Asc => " ASC",
                    Direction::Desc => " DESC",
                })?;
            }
        }

        if let Some(limit) = self.limit {
            write!(f, " LIMIT {}", limit)?;
        }
        if let Some(offset) = self.offset {
            write!(f, " OFFSET {}", offset)?;
        }
        Ok(())
    }
}

fn write_conjunction(f: &mut Formatter<'_>, predicates: &[Predicate]) -> fmt::Result {
    if predicates.is_empty() {
        return f.write_str("TRUE");
    }
    write_separated(f, predicates, " AND ")
}
