/// Parser for VQL programs
///
/// Converts a stream of tokens into an Abstract Syntax Tree (AST).
use super::ast::*;
use super::lexer::{Lexer, LexerError, Token};
use std::fmt;

/// Parser for VQL programs
pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    /// Create a new parser from program text
    pub fn new(input: &str) -> Result<Self, ParseError> {
        let mut lexer = Lexer::new(input);
        let tokens = lexer.tokenize().map_err(ParseError::LexerError)?;
        Ok(Self {
            tokens,
            position: 0,
        })
    }

    /// Parse the whole program into an AST
    pub fn parse(&mut self) -> Result<Program, ParseError> {
        let mut program = Program::default();

        loop {
            match self.current_token() {
                Token::Model => program.models.push(self.parse_model()?),
                Token::Class => program.classes.push(self.parse_class()?),
                Token::Query => program.queries.push(self.parse_query()?),
                Token::Semicolon => self.advance(),
                Token::Eof => break,
                token => {
                    return Err(ParseError::UnexpectedToken {
                        expected: "MODEL, CLASS or QUERY".to_string(),
                        found: token.clone(),
                    })
                }
            }
        }

        Ok(program)
    }

    fn parse_model(&mut self) -> Result<ModelDecl, ParseError> {
        self.expect_token(Token::Model)?;
        let name = self.expect_identifier("model name")?;

        self.expect_token(Token::LeftParen)?;
        let mut params = Vec::new();
        if self.current_token() != &Token::RightParen {
            loop {
                params.push(self.parse_type()?);
                if self.current_token() == &Token::Comma {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect_token(Token::RightParen)?;

        self.expect_token(Token::Arrow)?;
        let returns = self.parse_type()?;
        self.expect_token(Token::Semicolon)?;

        Ok(ModelDecl {
            name,
            params,
            returns,
        })
    }

    fn parse_type(&mut self) -> Result<DataType, ParseError> {
        let name = self.expect_identifier("type name")?;
        match name.to_uppercase().as_str() {
            "BOOL" | "BOOLEAN" => Ok(DataType::Bool),
            "INT" | "INTEGER" => Ok(DataType::Int),
            "FLOAT" => Ok(DataType::Float),
            "STRING" => Ok(DataType::String),
            "BBOX" => Ok(DataType::BBox),
            "VOBJ" => Ok(DataType::VObj),
            "ANY" => Ok(DataType::Any),
            _ => Err(ParseError::UnknownType(name)),
        }
    }

    fn parse_class(&mut self) -> Result<ClassDecl, ParseError> {
        self.expect_token(Token::Class)?;
        let name = self.expect_identifier("class name")?;

        let parent = if self.current_token() == &Token::Extends {
            self.advance();
            Some(self.expect_identifier("parent class name")?)
        } else {
            None
        };

        let predicate = if self.current_token() == &Token::Where {
            self.advance();
            Some(self.parse_expression()?)
        } else {
            None
        };

        self.expect_token(Token::LeftBrace)?;
        let mut properties = Vec::new();
        while self.current_token() != &Token::RightBrace {
            properties.push(self.parse_property()?);
        }
        self.expect_token(Token::RightBrace)?;

        // Trailing semicolon after a class body is optional
        if self.current_token() == &Token::Semicolon {
            self.advance();
        }

        Ok(ClassDecl {
            name,
            parent,
            predicate,
            properties,
        })
    }

    fn parse_property(&mut self) -> Result<PropertyDecl, ParseError> {
        let history = if self.current_token() == &Token::History {
            self.advance();
            self.expect_token(Token::LeftParen)?;
            let length = match self.current_token().clone() {
                Token::Integer(n) if n > 0 => n as usize,
                Token::Integer(n) => return Err(ParseError::InvalidHistoryLength(n)),
                token => {
                    return Err(ParseError::UnexpectedToken {
                        expected: "history length".to_string(),
                        found: token,
                    })
                }
            };
            self.advance();
            self.expect_token(Token::RightParen)?;
            Some(length)
        } else {
            None
        };

        self.expect_token(Token::Property)?;
        let name = self.expect_identifier("property name")?;
        self.expect_token(Token::Eq)?;
        let expr = self.parse_expression()?;
        self.expect_token(Token::Semicolon)?;

        Ok(PropertyDecl {
            name,
            history,
            expr,
        })
    }

    fn parse_query(&mut self) -> Result<QueryDecl, ParseError> {
        self.expect_token(Token::Query)?;
        let name = self.expect_identifier("query name")?;
        let select = self.parse_select()?;

        self.expect_token(Token::From)?;
        let from = self.expect_identifier("class name")?;

        let where_clause = self.parse_where()?;
        let order_by = self.parse_order_by()?;
        let limit = self.parse_limit()?;
        self.expect_token(Token::Semicolon)?;

        Ok(QueryDecl {
            name,
            select,
            from,
            where_clause,
            order_by,
            limit,
        })
    }

    fn parse_select(&mut self) -> Result<SelectClause, ParseError> {
        self.expect_token(Token::Select)?;

        let mut columns = Vec::new();

        loop {
            if self.current_token() == &Token::Asterisk {
                self.advance();
                columns.push(SelectColumn::Wildcard);
            } else if let Some(function) = self.aggregate_function() {
                columns.push(self.parse_aggregate(function)?);
            } else {
                let expr = self.parse_expression()?;
                let alias = self.parse_alias()?;
                columns.push(SelectColumn::Expr { expr, alias });
            }

            if self.current_token() == &Token::Comma {
                self.advance();
            } else {
                break;
            }
        }

        if columns.is_empty() {
            return Err(ParseError::EmptySelectList);
        }

        Ok(SelectClause { columns })
    }

    fn aggregate_function(&self) -> Option<AggregateFunction> {
        match self.current_token() {
            Token::Count => Some(AggregateFunction::Count),
            Token::Sum => Some(AggregateFunction::Sum),
            Token::Avg => Some(AggregateFunction::Avg),
            Token::Min => Some(AggregateFunction::Min),
            Token::Max => Some(AggregateFunction::Max),
            _ => None,
        }
    }

    /// Parses `FN(*)` or `FN(expr)`. Two-argument MIN/MAX is the scalar
    /// builtin instead of an aggregate.
    fn parse_aggregate(&mut self, function: AggregateFunction) -> Result<SelectColumn, ParseError> {
        self.advance();
        self.expect_token(Token::LeftParen)?;

        let arg = if self.current_token() == &Token::Asterisk {
            self.advance();
            None
        } else {
            Some(self.parse_expression()?)
        };

        if self.current_token() == &Token::Comma
            && matches!(function, AggregateFunction::Min | AggregateFunction::Max)
        {
            let mut args: Vec<Expression> = arg.into_iter().collect();
            while self.current_token() == &Token::Comma {
                self.advance();
                args.push(self.parse_expression()?);
            }
            self.expect_token(Token::RightParen)?;
            let name = function.to_string().to_lowercase();
            let expr = self.parse_postfix_comparison(Expression::Call { name, args })?;
            let alias = self.parse_alias()?;
            return Ok(SelectColumn::Expr { expr, alias });
        }

        self.expect_token(Token::RightParen)?;
        let alias = self.parse_alias()?;

        Ok(SelectColumn::Aggregate {
            function,
            arg,
            alias,
        })
    }

    /// Continue a comparison whose left operand was already consumed
    fn parse_postfix_comparison(&mut self, left: Expression) -> Result<Expression, ParseError> {
        let op = match self.comparison_operator() {
            Some(op) => op,
            None => return Ok(left),
        };
        self.advance();
        let right = self.parse_additive()?;
        Ok(Expression::BinaryOp {
            left: Box::new(left),
            op,
            right: Box::new(right),
        })
    }

    fn parse_alias(&mut self) -> Result<Option<String>, ParseError> {
        if self.current_token() != &Token::As {
            return Ok(None);
        }
        self.advance();
        Ok(Some(self.expect_identifier("alias")?))
    }

    fn parse_where(&mut self) -> Result<Option<WhereClause>, ParseError> {
        if self.current_token() != &Token::Where {
            return Ok(None);
        }

        self.advance();
        let condition = self.parse_expression()?;

        Ok(Some(WhereClause { condition }))
    }

    fn parse_expression(&mut self) -> Result<Expression, ParseError> {
        self.parse_logical_or()
    }

    fn parse_logical_or(&mut self) -> Result<Expression, ParseError> {
        let mut left = self.parse_logical_and()?;

        while self.current_token() == &Token::Or {
            self.advance();
            let right = self.parse_logical_and()?;
            left = Expression::LogicalOp {
                left: Box::new(left),
                op: LogicalOperator::Or,
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn parse_logical_and(&mut self) -> Result<Expression, ParseError> {
        let mut left = self.parse_not()?;

        while self.current_token() == &Token::And {
            self.advance();
            let right = self.parse_not()?;
            left = Expression::LogicalOp {
                left: Box::new(left),
                op: LogicalOperator::And,
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expression, ParseError> {
        if self.current_token() == &Token::Not {
            self.advance();
            let expr = self.parse_not()?;
            return Ok(Expression::Not(Box::new(expr)));
        }

        self.parse_comparison()
    }

    fn comparison_operator(&self) -> Option<BinaryOperator> {
        match self.current_token() {
            Token::Eq => Some(BinaryOperator::Eq),
            Token::Ne => Some(BinaryOperator::Ne),
            Token::Lt => Some(BinaryOperator::Lt),
            Token::Le => Some(BinaryOperator::Le),
            Token::Gt => Some(BinaryOperator::Gt),
            Token::Ge => Some(BinaryOperator::Ge),
            _ => None,
        }
    }

    fn parse_comparison(&mut self) -> Result<Expression, ParseError> {
        let left = self.parse_additive()?;

        // Handle LIKE
        if self.current_token() == &Token::Like {
            self.advance();
            if let Token::String(pattern) = self.current_token().clone() {
                self.advance();
                return Ok(Expression::Like {
                    expr: Box::new(left),
                    pattern,
                });
            } else {
                return Err(ParseError::UnexpectedToken {
                    expected: "string pattern".to_string(),
                    found: self.current_token().clone(),
                });
            }
        }

        // Handle IN
        if self.current_token() == &Token::In {
            self.advance();
            self.expect_token(Token::LeftParen)?;

            let mut values = Vec::new();
            loop {
                let value = self.parse_literal()?;
                values.push(value);

                if self.current_token() == &Token::Comma {
                    self.advance();
                } else {
                    break;
                }
            }

            self.expect_token(Token::RightParen)?;

            return Ok(Expression::In {
                expr: Box::new(left),
                values,
            });
        }

        // Handle BETWEEN
        if self.current_token() == &Token::Between {
            self.advance();
            let min = self.parse_additive()?;
            self.expect_token(Token::And)?;
            let max = self.parse_additive()?;

            return Ok(Expression::Between {
                expr: Box::new(left),
                min: Box::new(min),
                max: Box::new(max),
            });
        }

        // Handle IS [NOT] NULL
        if self.current_token() == &Token::Is {
            self.advance();
            let negated = if self.current_token() == &Token::Not {
                self.advance();
                true
            } else {
                false
            };
            self.expect_token(Token::Null)?;
            return Ok(Expression::IsNull {
                expr: Box::new(left),
                negated,
            });
        }

        self.parse_postfix_comparison(left)
    }

    fn parse_additive(&mut self) -> Result<Expression, ParseError> {
        let mut left = self.parse_multiplicative()?;

        loop {
            let op = match self.current_token() {
                Token::Plus => ArithmeticOperator::Add,
                Token::Minus => ArithmeticOperator::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Expression::Arithmetic {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expression, ParseError> {
        let mut left = self.parse_unary()?;

        loop {
            let op = match self.current_token() {
                Token::Asterisk => ArithmeticOperator::Mul,
                Token::Slash => ArithmeticOperator::Div,
                Token::Percent => ArithmeticOperator::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Expression::Arithmetic {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expression, ParseError> {
        if self.current_token() == &Token::Minus {
            self.advance();
            // Fold negative numeric literals
            return match self.current_token().clone() {
                Token::Integer(i) => {
                    self.advance();
                    Ok(Expression::Literal(Literal::Integer(-i)))
                }
                Token::Float(f) => {
                    self.advance();
                    Ok(Expression::Literal(Literal::Float(-f)))
                }
                _ => {
                    let expr = self.parse_unary()?;
                    Ok(Expression::Negate(Box::new(expr)))
                }
            };
        }

        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expression, ParseError> {
        match self.current_token().clone() {
            Token::Identifier(name) => {
                self.advance();
                match self.current_token() {
                    Token::LeftParen => self.parse_call(name),
                    Token::LeftBracket => self.parse_history_index(name),
                    _ => Ok(Expression::Identifier(name)),
                }
            }
            // Scalar min/max share their keyword with the aggregates
            Token::Min | Token::Max => {
                let name = self.current_token().to_string().to_lowercase();
                self.advance();
                self.parse_call(name)
            }
            Token::SelfRef => {
                self.advance();
                Ok(Expression::SelfRef)
            }
            Token::Integer(i) => {
                self.advance();
                Ok(Expression::Literal(Literal::Integer(i)))
            }
            Token::Float(f) => {
                self.advance();
                Ok(Expression::Literal(Literal::Float(f)))
            }
            Token::String(s) => {
                self.advance();
                Ok(Expression::Literal(Literal::String(s)))
            }
            Token::Boolean(b) => {
                self.advance();
                Ok(Expression::Literal(Literal::Boolean(b)))
            }
            Token::Null => {
                self.advance();
                Ok(Expression::Literal(Literal::Null))
            }
            Token::LeftParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect_token(Token::RightParen)?;
                Ok(expr)
            }
            token => Err(ParseError::UnexpectedToken {
                expected: "expression".to_string(),
                found: token,
            }),
        }
    }

    fn parse_call(&mut self, name: String) -> Result<Expression, ParseError> {
        self.expect_token(Token::LeftParen)?;
        let mut args = Vec::new();
        if self.current_token() != &Token::RightParen {
            loop {
                args.push(self.parse_expression()?);
                if self.current_token() == &Token::Comma {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect_token(Token::RightParen)?;
        Ok(Expression::Call { name, args })
    }

    /// name[-k]: only negative offsets address history
    fn parse_history_index(&mut self, name: String) -> Result<Expression, ParseError> {
        self.expect_token(Token::LeftBracket)?;
        self.expect_token(Token::Minus)?;
        let offset = match self.current_token().clone() {
            Token::Integer(n) if n > 0 => n as usize,
            Token::Integer(n) => return Err(ParseError::InvalidHistoryOffset(-n)),
            token => {
                return Err(ParseError::UnexpectedToken {
                    expected: "history offset".to_string(),
                    found: token,
                })
            }
        };
        self.advance();
        self.expect_token(Token::RightBracket)?;
        Ok(Expression::HistoryIndex { name, offset })
    }

    fn parse_literal(&mut self) -> Result<Literal, ParseError> {
        let negative = if self.current_token() == &Token::Minus {
            self.advance();
            true
        } else {
            false
        };

        match self.current_token().clone() {
            Token::Integer(i) => {
                self.advance();
                Ok(Literal::Integer(if negative { -i } else { i }))
            }
            Token::Float(f) => {
                self.advance();
                Ok(Literal::Float(if negative { -f } else { f }))
            }
            Token::String(s) if !negative => {
                self.advance();
                Ok(Literal::String(s))
            }
            Token::Boolean(b) if !negative => {
                self.advance();
                Ok(Literal::Boolean(b))
            }
            Token::Null if !negative => {
                self.advance();
                Ok(Literal::Null)
            }
            token => Err(ParseError::UnexpectedToken {
                expected: "literal value".to_string(),
                found: token,
            }),
        }
    }

    fn parse_order_by(&mut self) -> Result<Option<OrderByClause>, ParseError> {
        if self.current_token() != &Token::OrderBy {
            return Ok(None);
        }

        self.advance();

        let mut columns = Vec::new();

        loop {
            let column = self.expect_identifier("column name")?;

            let direction = if self.current_token() == &Token::Desc {
                self.advance();
                OrderDirection::Desc
            } else {
                if self.current_token() == &Token::Asc {
                    self.advance();
                }
                OrderDirection::Asc
            };

            columns.push(OrderByColumn { column, direction });

            if self.current_token() == &Token::Comma {
                self.advance();
            } else {
                break;
            }
        }

        Ok(Some(OrderByClause { columns }))
    }

    fn parse_limit(&mut self) -> Result<Option<LimitClause>, ParseError> {
        if self.current_token() != &Token::Limit {
            return Ok(None);
        }

        self.advance();

        let count = if let Token::Integer(n) = self.current_token() {
            if *n < 0 {
                return Err(ParseError::InvalidLimitValue(*n));
            }
            let count = *n as usize;
            self.advance();
            count
        } else if self.current_token() == &Token::Minus {
            self.advance();
            let n = match self.current_token() {
                Token::Integer(n) => -*n,
                _ => -1,
            };
            return Err(ParseError::InvalidLimitValue(n));
        } else {
            return Err(ParseError::UnexpectedToken {
                expected: "integer".to_string(),
                found: self.current_token().clone(),
            });
        };

        let offset = if self.current_token() == &Token::Offset {
            self.advance();
            if let Token::Integer(n) = self.current_token() {
                let offset = *n as usize;
                self.advance();
                Some(offset)
            } else if self.current_token() == &Token::Minus {
                self.advance();
                let n = match self.current_token() {
                    Token::Integer(n) => -*n,
                    _ => -1,
                };
                return Err(ParseError::InvalidOffsetValue(n));
            } else {
                return Err(ParseError::UnexpectedToken {
                    expected: "integer".to_string(),
                    found: self.current_token().clone(),
                });
            }
        } else {
            None
        };

        Ok(Some(LimitClause { count, offset }))
    }

    fn current_token(&self) -> &Token {
        &self.tokens[self.position]
    }

    fn advance(&mut self) {
        if self.position < self.tokens.len() - 1 {
            self.position += 1;
        }
    }

    fn expect_token(&mut self, expected: Token) -> Result<(), ParseError> {
        if self.current_token() == &expected {
            self.advance();
            Ok(())
        } else {
            Err(ParseError::UnexpectedToken {
                expected: format!("{}", expected),
                found: self.current_token().clone(),
            })
        }
    }

    fn expect_identifier(&mut self, what: &str) -> Result<String, ParseError> {
        if let Token::Identifier(name) = self.current_token().clone() {
            self.advance();
            Ok(name)
        } else {
            Err(ParseError::UnexpectedToken {
                expected: what.to_string(),
                found: self.current_token().clone(),
            })
        }
    }
}

/// Parser errors
#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    /// The text does not tokenize
    LexerError(LexerError),
    /// A token other than the grammar allows
    UnexpectedToken {
        /// What the grammar allows here
        expected: String,
        /// What was found
        found: Token,
    },
    /// A type name outside BOOL, INT, FLOAT, STRING, BBOX, VOBJ and ANY
    UnknownType(String),
    /// SELECT followed directly by FROM
    EmptySelectList,
    /// HISTORY(n) with `n < 1`
    InvalidHistoryLength(i64),
    /// `p[-k]` with `k < 1`
    InvalidHistoryOffset(i64),
    /// Negative LIMIT
    InvalidLimitValue(i64),
    /// Negative OFFSET
    InvalidOffsetValue(i64),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::LexerError(e) => write!(f, "Lexer error: {}", e),
            ParseError::UnexpectedToken { expected, found } => {
                write!(f, "Expected {}, found {}", expected, found)
            }
            ParseError::UnknownType(name) => write!(f, "Unknown type: {}", name),
            ParseError::EmptySelectList => write!(f, "SELECT list cannot be empty"),
            ParseError::InvalidHistoryLength(n) => {
                write!(f, "Invalid HISTORY length: {} (must be positive)", n)
            }
            ParseError::InvalidHistoryOffset(n) => {
                write!(f, "Invalid history offset: [{}] (must be -1 or lower)", n)
            }
            ParseError::InvalidLimitValue(n) => {
                write!(f, "Invalid LIMIT value: {} (must be non-negative)", n)
            }
            ParseError::InvalidOffsetValue(n) => {
                write!(f, "Invalid OFFSET value: {} (must be non-negative)", n)
            }
        }
    }
}

impl std::error::Error for ParseError {}

impl From<ParseError> for crate::Error {
    fn from(err: ParseError) -> Self {
        crate::Error::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> Program {
        Parser::new(input).unwrap().parse().unwrap()
    }

    #[test]
    fn test_model_declaration() {
        let program = parse("MODEL is_car(VOBJ) -> BOOL; MODEL color(VOBJ, INT) -> string;");

        assert_eq!(program.models.len(), 2);
        assert_eq!(program.models[0].name, "is_car");
        assert_eq!(program.models[0].params, vec![DataType::VObj]);
        assert_eq!(program.models[0].returns, DataType::Bool);
        assert_eq!(program.models[1].params, vec![DataType::VObj, DataType::Int]);
        assert_eq!(program.models[1].returns, DataType::String);
    }

    #[test]
    fn test_model_without_params() {
        let program = parse("MODEL scene() -> STRING;");
        assert!(program.models[0].params.is_empty());
    }

    #[test]
    fn test_class_with_properties() {
        let program = parse(
            "CLASS Car EXTENDS VObj WHERE is_car(self) {
                HISTORY(2) PROPERTY cx = center_x(bbox);
                PROPERTY velocity = cx[-1] - cx[-2];
            }",
        );

        let class = &program.classes[0];
        assert_eq!(class.name, "Car");
        assert_eq!(class.parent.as_deref(), Some("VObj"));
        assert!(matches!(
            class.predicate,
            Some(Expression::Call { ref name, .. }) if name == "is_car"
        ));
        assert_eq!(class.properties.len(), 2);
        assert_eq!(class.properties[0].history, Some(2));
        assert_eq!(class.properties[1].history, None);
        assert_eq!(
            class.properties[1].expr.to_string(),
            "(cx[-1] - cx[-2])"
        );
    }

    #[test]
    fn test_query() {
        let program = parse(
            "QUERY fast SELECT track_id, velocity AS v FROM Car
             WHERE velocity > 5 AND label = 'car'
             ORDER BY v DESC LIMIT 3 OFFSET 1;",
        );

        let query = &program.queries[0];
        assert_eq!(query.name, "fast");
        assert_eq!(query.from, "Car");
        assert_eq!(query.select.columns.len(), 2);
        assert!(query.where_clause.is_some());
        let order_by = query.order_by.as_ref().unwrap();
        assert_eq!(order_by.columns[0].column, "v");
        assert_eq!(order_by.columns[0].direction, OrderDirection::Desc);
        assert_eq!(
            query.limit,
            Some(LimitClause {
                count: 3,
                offset: Some(1)
            })
        );
    }

    #[test]
    fn test_aggregates_and_scalar_min() {
        let program = parse("QUERY c SELECT COUNT(*) AS n, AVG(score), min(score, 0.5) FROM VObj;");

        let columns = &program.queries[0].select.columns;
        assert!(matches!(
            columns[0],
            SelectColumn::Aggregate {
                function: AggregateFunction::Count,
                arg: None,
                ..
            }
        ));
        assert!(matches!(
            columns[1],
            SelectColumn::Aggregate {
                function: AggregateFunction::Avg,
                arg: Some(_),
                ..
            }
        ));
        assert!(matches!(
            columns[2],
            SelectColumn::Expr {
                expr: Expression::Call { ref name, .. },
                ..
            } if name == "min"
        ));
    }

    #[test]
    fn test_operator_precedence() {
        let program = parse("QUERY q SELECT * FROM VObj WHERE 1 + 2 * 3 > 6 OR NOT score < 0.5;");
        let condition = &program.queries[0].where_clause.as_ref().unwrap().condition;

        assert_eq!(
            condition.to_string(),
            "(((1 + (2 * 3)) > 6) OR NOT ((score < 0.5)))"
        );
    }

    #[test]
    fn test_is_null_and_in() {
        let program = parse(
            "QUERY q SELECT * FROM VObj WHERE plate IS NOT NULL AND label IN ('car', 'truck');",
        );
        let condition = &program.queries[0].where_clause.as_ref().unwrap().condition;
        assert_eq!(
            condition.to_string(),
            "(plate IS NOT NULL AND label IN ('car', 'truck'))"
        );
    }

    #[test]
    fn test_negative_numbers() {
        let program = parse("QUERY q SELECT * FROM VObj WHERE dx BETWEEN -1.5 AND -x;");
        let condition = &program.queries[0].where_clause.as_ref().unwrap().condition;
        assert_eq!(condition.to_string(), "dx BETWEEN -1.5 AND -x");
    }

    #[test]
    fn test_errors() {
        let err = Parser::new("QUERY q SELECT FROM VObj;").unwrap().parse();
        assert!(matches!(err, Err(ParseError::UnexpectedToken { .. })));

        let err = Parser::new("MODEL m() -> TENSOR;").unwrap().parse();
        assert_eq!(err, Err(ParseError::UnknownType("TENSOR".to_string())));

        let err = Parser::new("CLASS C { HISTORY(0) PROPERTY p = 1; }")
            .unwrap()
            .parse();
        assert_eq!(err, Err(ParseError::InvalidHistoryLength(0)));

        let err = Parser::new("QUERY q SELECT p[-0] FROM VObj;").unwrap().parse();
        assert_eq!(err, Err(ParseError::InvalidHistoryOffset(0)));

        let err = Parser::new("QUERY q SELECT * FROM VObj LIMIT -1;").unwrap().parse();
        assert_eq!(err, Err(ParseError::InvalidLimitValue(-1)));

        assert!(matches!(
            Parser::new("QUERY q SELECT 'x FROM VObj;"),
            Err(ParseError::LexerError(LexerError::UnterminatedString))
        ));
    }

    #[test]
    fn test_missing_semicolon() {
        let err = Parser::new("QUERY q SELECT * FROM VObj").unwrap().parse();
        assert_eq!(
            err,
            Err(ParseError::UnexpectedToken {
                expected: ";".to_string(),
                found: Token::Eof,
            })
        );
    }
}
