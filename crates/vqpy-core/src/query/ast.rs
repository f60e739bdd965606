/// Abstract Syntax Tree (AST) node types for VQL programs
///
/// Defines the structure of parsed programs: abstract MODEL declarations,
/// CLASS definitions with (historical) properties, and QUERY statements.
use std::fmt;

/// A complete VQL program
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    /// Abstract functions, in source order
    pub models: Vec<ModelDecl>,
    /// Class definitions, in source order
    pub classes: Vec<ClassDecl>,
    /// Queries, in source order
    pub queries: Vec<QueryDecl>,
}

/// MODEL name(types) -> type
#[derive(Debug, Clone, PartialEq)]
pub struct ModelDecl {
    /// Declared name
    pub name: String,
    /// Parameter types
    pub params: Vec<DataType>,
    /// Result type
    pub returns: DataType,
}

/// CLASS name EXTENDS parent WHERE predicate { properties }
#[derive(Debug, Clone, PartialEq)]
pub struct ClassDecl {
    /// Declared name
    pub name: String,
    /// `None` extends the root class
    pub parent: Option<String>,
    /// Membership test, evaluated in the parent's scope
    pub predicate: Option<Expression>,
    /// Declared properties
    pub properties: Vec<PropertyDecl>,
}

/// [HISTORY(n)] PROPERTY name = expr
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDecl {
    /// Declared name
    pub name: String,
    /// Number of observations kept, `None` for plain properties
    pub history: Option<usize>,
    /// Value computed for each object and frame
    pub expr: Expression,
}

/// QUERY name SELECT ... FROM class ...
#[derive(Debug, Clone, PartialEq)]
pub struct QueryDecl {
    /// Declared name
    pub name: String,
    /// Output columns
    pub select: SelectClause,
    /// Class the query ranges over
    pub from: String,
    /// Row filter
    pub where_clause: Option<WhereClause>,
    /// Sort order
    pub order_by: Option<OrderByClause>,
    /// Row window
    pub limit: Option<LimitClause>,
}

/// Declared types of model parameters and results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    /// BOOL
    Bool,
    /// INT, 64-bit signed
    Int,
    /// FLOAT, 64-bit
    Float,
    /// STRING
    String,
    /// BBOX
    BBox,
    /// VOBJ, a tracked object
    VObj,
    /// ANY, unchecked
    Any,
}

impl DataType {
    /// Whether a value of type `other` may be used where `self` is expected
    pub fn accepts(&self, other: DataType) -> bool {
        *self == DataType::Any
            || other == DataType::Any
            || *self == other
            || (*self == DataType::Float && other == DataType::Int)
    }
}

/// SELECT clause specifying output columns
#[derive(Debug, Clone, PartialEq)]
pub struct SelectClause {
    /// Columns in order
    pub columns: Vec<SelectColumn>,
}

/// A column in the SELECT clause
#[derive(Debug, Clone, PartialEq)]
pub enum SelectColumn {
    /// SELECT * - every intrinsic attribute and property
    Wildcard,
    /// SELECT expr or SELECT expr AS alias
    Expr {
        /// Selected value
        expr: Expression,
        /// Output name, if given
        alias: Option<String>,
    },
    /// SELECT COUNT(*), SUM(expr), etc.
    Aggregate {
        /// Aggregate applied
        function: AggregateFunction,
        /// `None` means `*`
        arg: Option<Expression>,
        /// Output name, if given
        alias: Option<String>,
    },
}

/// Aggregate functions
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AggregateFunction {
    /// Number of rows, or of non-null values
    Count,
    /// Sum of non-null values
    Sum,
    /// Mean of non-null values, always FLOAT
    Avg,
    /// Smallest non-null value
    Min,
    /// Largest non-null value
    Max,
}

/// WHERE clause for filtering
#[derive(Debug, Clone, PartialEq)]
pub struct WhereClause {
    /// Predicate rows must satisfy
    pub condition: Expression,
}

/// Expressions in predicates, properties and select lists
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Identifier: attribute or property (optionally `self.` qualified)
    Identifier(String),
    /// The current object
    SelfRef,
    /// Literal value
    Literal(Literal),
    /// Function call: model or builtin
    Call {
        /// Function name
        name: String,
        /// Call arguments
        args: Vec<Expression>,
    },
    /// Past observation of a historical property: name[-k]
    HistoryIndex {
        /// Property name
        name: String,
        /// `k`, at least 1
        offset: usize,
    },
    /// Comparison: a = b, a > b, etc.
    BinaryOp {
        /// Left operand
        left: Box<Expression>,
        /// Operator
        op: BinaryOperator,
        /// Right operand
        right: Box<Expression>,
    },
    /// a + b, a * b, etc.
    Arithmetic {
        /// Left operand
        left: Box<Expression>,
        /// Operator
        op: ArithmeticOperator,
        /// Right operand
        right: Box<Expression>,
    },
    /// Unary minus
    Negate(Box<Expression>),
    /// Logical AND/OR
    LogicalOp {
        /// Left operand
        left: Box<Expression>,
        /// Operator
        op: LogicalOperator,
        /// Right operand
        right: Box<Expression>,
    },
    /// NOT expression
    Not(Box<Expression>),
    /// LIKE pattern matching
    Like {
        /// Tested value
        expr: Box<Expression>,
        /// `%` and `_` wildcards
        pattern: String,
    },
    /// IN (value1, value2, ...)
    In {
        /// Tested value
        expr: Box<Expression>,
        /// Candidate values
        values: Vec<Literal>,
    },
    /// BETWEEN min AND max
    Between {
        /// Tested value
        expr: Box<Expression>,
        /// Lower bound, inclusive
        min: Box<Expression>,
        /// Upper bound, inclusive
        max: Box<Expression>,
    },
    /// IS NULL / IS NOT NULL
    IsNull {
        /// Tested value
        expr: Box<Expression>,
        /// IS NOT NULL
        negated: bool,
    },
}

/// Binary comparison operators
#[derive(Debug, Clone, PartialEq)]
pub enum BinaryOperator {
    /// =
    Eq,
    /// !=
    Ne,
    /// <
    Lt,
    /// <=
    Le,
    /// >
    Gt,
    /// >=
    Ge,
}

/// Arithmetic operators
#[derive(Debug, Clone, PartialEq)]
pub enum ArithmeticOperator {
    /// +
    Add,
    /// -
    Sub,
    /// *
    Mul,
    /// /
    Div,
    /// %
    Mod,
}

/// Logical operators
#[derive(Debug, Clone, PartialEq)]
pub enum LogicalOperator {
    /// AND
    And,
    /// OR
    Or,
}

/// Literal values in programs
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// Integer literal
    Integer(i64),
    /// Float literal
    Float(f64),
    /// Quoted string
    String(String),
    /// TRUE or FALSE
    Boolean(bool),
    /// NULL
    Null,
}

/// ORDER BY clause for sorting
#[derive(Debug, Clone, PartialEq)]
pub struct OrderByClause {
    /// Columns in order
    pub columns: Vec<OrderByColumn>,
}

/// A column in ORDER BY
#[derive(Debug, Clone, PartialEq)]
pub struct OrderByColumn {
    /// Output column name or alias
    pub column: String,
    /// Sort direction
    pub direction: OrderDirection,
}

/// Sort direction
#[derive(Debug, Clone, PartialEq)]
pub enum OrderDirection {
    /// ASC, the default
    Asc,
    /// DESC
    Desc,
}

/// LIMIT clause for result limiting
#[derive(Debug, Clone, PartialEq)]
pub struct LimitClause {
    /// Maximum rows returned
    pub count: usize,
    /// Rows skipped first
    pub offset: Option<usize>,
}

// Display implementations for debugging, plans and error messages

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Bool => write!(f, "BOOL"),
            DataType::Int => write!(f, "INT"),
            DataType::Float => write!(f, "FLOAT"),
            DataType::String => write!(f, "STRING"),
            DataType::BBox => write!(f, "BBOX"),
            DataType::VObj => write!(f, "VOBJ"),
            DataType::Any => write!(f, "ANY"),
        }
    }
}

impl fmt::Display for ModelDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MODEL {}(", self.name)?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", p)?;
        }
        write!(f, ") -> {}", self.returns)
    }
}

impl fmt::Display for SelectClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SELECT ")?;
        for (i, col) in self.columns.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", col)?;
        }
        Ok(())
    }
}

impl fmt::Display for SelectColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectColumn::Wildcard => write!(f, "*"),
            SelectColumn::Expr { expr, alias } => {
                write!(f, "{}", expr)?;
                if let Some(ref alias) = alias {
                    write!(f, " AS {}", alias)?;
                }
                Ok(())
            }
            SelectColumn::Aggregate {
                function,
                arg,
                alias,
            } => {
                match arg {
                    Some(expr) => write!(f, "{}({})", function, expr)?,
                    None => write!(f, "{}(*)", function)?,
                }
                if let Some(ref alias) = alias {
                    write!(f, " AS {}", alias)?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregateFunction::Count => write!(f, "COUNT"),
            AggregateFunction::Sum => write!(f, "SUM"),
            AggregateFunction::Avg => write!(f, "AVG"),
            AggregateFunction::Min => write!(f, "MIN"),
            AggregateFunction::Max => write!(f, "MAX"),
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Identifier(name) => write!(f, "{}", name),
            Expression::SelfRef => write!(f, "self"),
            Expression::Literal(lit) => write!(f, "{}", lit),
            Expression::Call { name, args } => {
                write!(f, "{}(", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            Expression::HistoryIndex { name, offset } => write!(f, "{}[-{}]", name, offset),
            Expression::BinaryOp { left, op, right } => {
                write!(f, "({} {} {})", left, op, right)
            }
            Expression::Arithmetic { left, op, right } => {
                write!(f, "({} {} {})", left, op, right)
            }
            Expression::Negate(expr) => write!(f, "-{}", expr),
            Expression::LogicalOp { left, op, right } => {
                write!(f, "({} {} {})", left, op, right)
            }
            Expression::Not(expr) => write!(f, "NOT ({})", expr),
            Expression::Like { expr, pattern } => write!(f, "{} LIKE '{}'", expr, pattern),
            Expression::In { expr, values } => {
                write!(f, "{} IN (", expr)?;
                for (i, val) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", val)?;
                }
                write!(f, ")")
            }
            Expression::Between { expr, min, max } => {
                write!(f, "{} BETWEEN {} AND {}", expr, min, max)
            }
            Expression::IsNull { expr, negated } => {
                if *negated {
                    write!(f, "{} IS NOT NULL", expr)
                } else {
                    write!(f, "{} IS NULL", expr)
                }
            }
        }
    }
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BinaryOperator::Eq => write!(f, "="),
            BinaryOperator::Ne => write!(f, "!="),
            BinaryOperator::Lt => write!(f, "<"),
            BinaryOperator::Le => write!(f, "<="),
            BinaryOperator::Gt => write!(f, ">"),
            BinaryOperator::Ge => write!(f, ">="),
        }
    }
}

impl fmt::Display for ArithmeticOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArithmeticOperator::Add => write!(f, "+"),
            ArithmeticOperator::Sub => write!(f, "-"),
            ArithmeticOperator::Mul => write!(f, "*"),
            ArithmeticOperator::Div => write!(f, "/"),
            ArithmeticOperator::Mod => write!(f, "%"),
        }
    }
}

impl fmt::Display for LogicalOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalOperator::And => write!(f, "AND"),
            LogicalOperator::Or => write!(f, "OR"),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Integer(i) => write!(f, "{}", i),
            Literal::Float(fl) => write!(f, "{}", fl),
            Literal::String(s) => write!(f, "'{}'", s),
            Literal::Boolean(b) => write!(f, "{}", b),
            Literal::Null => write!(f, "NULL"),
        }
    }
}

impl fmt::Display for OrderByColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.column, self.direction)
    }
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderDirection::Asc => write!(f, "ASC"),
            OrderDirection::Desc => write!(f, "DESC"),
        }
    }
}
