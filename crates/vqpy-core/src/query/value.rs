/// Runtime values and result rows
///
/// Values flow through expressions, model calls and query outputs.
use super::ast::{ArithmeticOperator, BinaryOperator, DataType, Literal};
use crate::frame::{BBox, VObj};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Value types produced while evaluating a query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// INT
    Integer(i64),
    /// FLOAT
    Float(f64),
    /// STRING
    String(String),
    /// BOOL
    Boolean(bool),
    /// BBOX
    BBox(BBox),
    /// VOBJ
    Object(VObj),
    /// Missing or undefined
    Null,
}

impl Value {
    /// Encode value to bytes, used as a memoization key
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.write_bytes(&mut out);
        out
    }

    fn write_bytes(&self, out: &mut Vec<u8>) {
        match self {
            Value::Integer(i) => {
                out.push(1);
                out.extend_from_slice(&i.to_le_bytes());
            }
            Value::Float(f) => {
                out.push(2);
                out.extend_from_slice(&f.to_le_bytes());
            }
            Value::String(s) => {
                out.push(3);
                out.extend_from_slice(&(s.len() as u32).to_le_bytes());
                out.extend_from_slice(s.as_bytes());
            }
            Value::Boolean(b) => out.extend_from_slice(&[4, *b as u8]),
            Value::BBox(b) => {
                out.push(5);
                for v in [b.x1, b.y1, b.x2, b.y2] {
                    out.extend_from_slice(&v.to_le_bytes());
                }
            }
            Value::Object(obj) => {
                out.push(6);
                out.extend_from_slice(&obj.track_id.to_le_bytes());
            }
            Value::Null => out.push(0),
        }
    }

    /// Encode an argument list as a single key
    pub fn key_of(values: &[Value]) -> Vec<u8> {
        let mut out = Vec::new();
        for v in values {
            v.write_bytes(&mut out);
        }
        out
    }

    /// Whether this is NULL
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Truthiness used by WHERE clauses: only `TRUE` passes
    pub fn is_true(&self) -> bool {
        matches!(self, Value::Boolean(true))
    }

    /// Numeric value, widening integers
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Box of a BBOX value, or of an object
    pub fn as_bbox(&self) -> Option<BBox> {
        match self {
            Value::BBox(b) => Some(*b),
            Value::Object(obj) => Some(obj.bbox),
            _ => None,
        }
    }

    /// Runtime type of this value, `None` for NULL
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Value::Integer(_) => Some(DataType::Int),
            Value::Float(_) => Some(DataType::Float),
            Value::String(_) => Some(DataType::String),
            Value::Boolean(_) => Some(DataType::Bool),
            Value::BBox(_) => Some(DataType::BBox),
            Value::Object(_) => Some(DataType::VObj),
            Value::Null => None,
        }
    }

    /// Name of the runtime type, for error messages
    pub fn type_name(&self) -> String {
        self.data_type()
            .map(|t| t.to_string())
            .unwrap_or_else(|| "NULL".to_string())
    }

    /// Order two values when they are comparable
    pub fn partial_order(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a.partial_cmp(&b),
                _ => None,
            },
        }
    }

    /// Compare values. Any comparison involving NULL is false.
    pub fn compare(&self, other: &Value, op: &BinaryOperator) -> bool {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => false,
            (Value::Boolean(a), Value::Boolean(b)) => match op {
                BinaryOperator::Eq => a == b,
                BinaryOperator::Ne => a != b,
                _ => false,
            },
            (Value::BBox(a), Value::BBox(b)) => match op {
                BinaryOperator::Eq => a == b,
                BinaryOperator::Ne => a != b,
                _ => false,
            },
            (Value::Object(a), Value::Object(b)) => match op {
                BinaryOperator::Eq => a == b,
                BinaryOperator::Ne => a != b,
                _ => false,
            },
            _ => match self.partial_order(other) {
                Some(ordering) => match op {
                    BinaryOperator::Eq => ordering == Ordering::Equal,
                    BinaryOperator::Ne => ordering != Ordering::Equal,
                    BinaryOperator::Lt => ordering == Ordering::Less,
                    BinaryOperator::Le => ordering != Ordering::Greater,
                    BinaryOperator::Gt => ordering == Ordering::Greater,
                    BinaryOperator::Ge => ordering != Ordering::Less,
                },
                None => false,
            },
        }
    }

    /// Apply an arithmetic operator.
    ///
    /// NULL operands, division by zero and integer overflow all yield NULL.
    /// Integer division produces a float.
    pub fn arithmetic(&self, other: &Value, op: &ArithmeticOperator) -> Value {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => {
                let result = match op {
                    ArithmeticOperator::Add => a.checked_add(*b),
                    ArithmeticOperator::Sub => a.checked_sub(*b),
                    ArithmeticOperator::Mul => a.checked_mul(*b),
                    ArithmeticOperator::Mod => a.checked_rem(*b),
                    ArithmeticOperator::Div => {
                        return if *b == 0 {
                            Value::Null
                        } else {
                            Value::Float(*a as f64 / *b as f64)
                        };
                    }
                };
                result.map(Value::Integer).unwrap_or(Value::Null)
            }
            (Value::String(a), Value::String(b)) if *op == ArithmeticOperator::Add => {
                Value::String(format!("{}{}", a, b))
            }
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => {
                    let result = match op {
                        ArithmeticOperator::Add => a + b,
                        ArithmeticOperator::Sub => a - b,
                        ArithmeticOperator::Mul => a * b,
                        ArithmeticOperator::Div if b == 0.0 => return Value::Null,
                        ArithmeticOperator::Div => a / b,
                        ArithmeticOperator::Mod if b == 0.0 => return Value::Null,
                        ArithmeticOperator::Mod => a % b,
                    };
                    Value::Float(result)
                }
                _ => Value::Null,
            },
        }
    }
}

impl From<&Literal> for Value {
    fn from(lit: &Literal) -> Self {
        match lit {
            Literal::Integer(i) => Value::Integer(*i),
            Literal::Float(f) => Value::Float(*f),
            Literal::String(s) => Value::String(s.clone()),
            Literal::Boolean(b) => Value::Boolean(*b),
            Literal::Null => Value::Null,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(fl) => write!(f, "{}", fl),
            Value::String(s) => write!(f, "{}", s),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::BBox(b) => write!(f, "[{}, {}, {}, {}]", b.x1, b.y1, b.x2, b.y2),
            Value::Object(obj) => write!(f, "{}#{}", obj.label, obj.track_id),
            Value::Null => write!(f, "NULL"),
        }
    }
}

/// Column metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Source text of the selected expression
    pub name: String,
    /// `AS` name
    pub alias: Option<String>,
}

impl Column {
    /// Name shown to callers: the alias when present
    pub fn display_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

/// Query result row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    /// Column metadata, parallel to `values`
    pub columns: Vec<Column>,
    /// Values in SELECT order
    pub values: Vec<Value>,
}

impl Row {
    /// Look up a value by alias or column name
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c.alias.as_deref() == Some(name))
            .or_else(|| self.columns.iter().position(|c| c.name == name))
            .and_then(|idx| self.values.get(idx))
    }
}
