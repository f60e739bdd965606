/// Built-in scalar functions available to every program
use super::ast::DataType;
use super::value::Value;
use std::fmt;

/// Scalar builtins. Any NULL (or mistyped) argument yields NULL, except
/// for `coalesce`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    /// `center_x(BBOX) -> FLOAT`
    CenterX,
    /// `center_y(BBOX) -> FLOAT`
    CenterY,
    /// `width(BBOX) -> FLOAT`
    Width,
    /// `height(BBOX) -> FLOAT`
    Height,
    /// `area(BBOX) -> FLOAT`
    Area,
    /// `iou(BBOX, BBOX) -> FLOAT`
    Iou,
    /// `distance(BBOX, BBOX) -> FLOAT`, between centers
    Distance,
    /// `abs(n)`, keeps the argument type
    Abs,
    /// `sqrt(n) -> FLOAT`, NULL for negative input
    Sqrt,
    /// `min(a, b)`
    Min,
    /// `max(a, b)`
    Max,
    /// `coalesce(a, b)`, `a` unless it is NULL
    Coalesce,
}

impl Builtin {
    /// Resolve a function name (case-insensitive)
    pub fn lookup(name: &str) -> Option<Builtin> {
        let builtin = match name.to_lowercase().as_str() {
            "center_x" => Builtin::CenterX,
            "center_y" => Builtin::CenterY,
            "width" => Builtin::Width,
            "height" => Builtin::Height,
            "area" => Builtin::Area,
            "iou" => Builtin::Iou,
            "distance" => Builtin::Distance,
            "abs" => Builtin::Abs,
            "sqrt" => Builtin::Sqrt,
            "min" => Builtin::Min,
            "max" => Builtin::Max,
            "coalesce" => Builtin::Coalesce,
            _ => return None,
        };
        Some(builtin)
    }

    /// Name as written in programs
    pub fn name(&self) -> &'static str {
        match self {
            Builtin::CenterX => "center_x",
            Builtin::CenterY => "center_y",
            Builtin::Width => "width",
            Builtin::Height => "height",
            Builtin::Area => "area",
            Builtin::Iou => "iou",
            Builtin::Distance => "distance",
            Builtin::Abs => "abs",
            Builtin::Sqrt => "sqrt",
            Builtin::Min => "min",
            Builtin::Max => "max",
            Builtin::Coalesce => "coalesce",
        }
    }

    fn params(&self) -> &'static [DataType] {
        match self {
            Builtin::CenterX | Builtin::CenterY | Builtin::Width | Builtin::Height | Builtin::Area => {
                &[DataType::BBox]
            }
            Builtin::Iou | Builtin::Distance => &[DataType::BBox, DataType::BBox],
            Builtin::Abs | Builtin::Sqrt => &[DataType::Float],
            Builtin::Min | Builtin::Max | Builtin::Coalesce => &[DataType::Any, DataType::Any],
        }
    }

    /// Statically known result type
    pub fn return_type(&self, args: &[DataType]) -> DataType {
        match self {
            Builtin::Abs => match args.first() {
                Some(DataType::Int) => DataType::Int,
                _ => DataType::Float,
            },
            Builtin::Min | Builtin::Max | Builtin::Coalesce => match args {
                [a, b] if a == b => *a,
                _ => DataType::Any,
            },
            _ => DataType::Float,
        }
    }

    /// Validate argument count and statically known argument types
    pub fn check_args(&self, args: &[DataType]) -> Result<(), String> {
        let params = self.params();
        if args.len() != params.len() {
            return Err(format!(
                "{}() takes {} argument(s), {} given",
                self.name(),
                params.len(),
                args.len()
            ));
        }
        for (i, (param, arg)) in params.iter().zip(args).enumerate() {
            // Objects stand in for their bounding box
            let ok = param.accepts(*arg) || (*param == DataType::BBox && *arg == DataType::VObj);
            if !ok {
                return Err(format!(
                    "argument {} of {}() must be {}, found {}",
                    i + 1,
                    self.name(),
                    param,
                    arg
                ));
            }
        }
        Ok(())
    }

    /// Evaluate the builtin
    pub fn call(&self, args: &[Value]) -> Value {
        match self {
            Builtin::CenterX => bbox_arg(args, 0)
                .map(|b| Value::Float(b.center().0 as f64))
                .unwrap_or(Value::Null),
            Builtin::CenterY => bbox_arg(args, 0)
                .map(|b| Value::Float(b.center().1 as f64))
                .unwrap_or(Value::Null),
            Builtin::Width => bbox_arg(args, 0)
                .map(|b| Value::Float(b.width() as f64))
                .unwrap_or(Value::Null),
            Builtin::Height => bbox_arg(args, 0)
                .map(|b| Value::Float(b.height() as f64))
                .unwrap_or(Value::Null),
            Builtin::Area => bbox_arg(args, 0)
                .map(|b| Value::Float(b.area() as f64))
                .unwrap_or(Value::Null),
            Builtin::Iou => match (bbox_arg(args, 0), bbox_arg(args, 1)) {
                (Some(a), Some(b)) => Value::Float(a.iou(&b) as f64),
                _ => Value::Null,
            },
            Builtin::Distance => match (bbox_arg(args, 0), bbox_arg(args, 1)) {
                (Some(a), Some(b)) => Value::Float(a.center_distance(&b) as f64),
                _ => Value::Null,
            },
            Builtin::Abs => match args.first() {
                Some(Value::Integer(i)) => i.checked_abs().map(Value::Integer).unwrap_or(Value::Null),
                Some(Value::Float(f)) => Value::Float(f.abs()),
                _ => Value::Null,
            },
            Builtin::Sqrt => match args.first().and_then(Value::as_f64) {
                Some(f) if f >= 0.0 => Value::Float(f.sqrt()),
                _ => Value::Null,
            },
            Builtin::Min | Builtin::Max => match (args.first(), args.get(1)) {
                (Some(a), Some(b)) => match a.partial_order(b) {
                    Some(ordering) => {
                        let take_first = if *self == Builtin::Min {
                            ordering.is_le()
                        } else {
                            ordering.is_ge()
                        };
                        if take_first {
                            a.clone()
                        } else {
                            b.clone()
                        }
                    }
                    None => Value::Null,
                },
                _ => Value::Null,
            },
            Builtin::Coalesce => args
                .iter()
                .find(|v| !v.is_null())
                .cloned()
                .unwrap_or(Value::Null),
        }
    }
}

fn bbox_arg(args: &[Value], idx: usize) -> Option<crate::frame::BBox> {
    args.get(idx).and_then(Value::as_bbox)
}

impl fmt::Display for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::BBox;

    #[test]
    fn test_lookup_is_case_insensitive() {
        assert_eq!(Builtin::lookup("CENTER_X"), Some(Builtin::CenterX));
        assert_eq!(Builtin::lookup("is_car"), None);
    }

    #[test]
    fn test_geometry() {
        let b = Value::BBox(BBox::new(0.0, 0.0, 4.0, 2.0));
        assert_eq!(Builtin::CenterX.call(&[b.clone()]), Value::Float(2.0));
        assert_eq!(Builtin::CenterY.call(&[b.clone()]), Value::Float(1.0));
        assert_eq!(Builtin::Area.call(&[b.clone()]), Value::Float(8.0));
        assert_eq!(Builtin::Iou.call(&[b.clone(), b]), Value::Float(1.0));
        assert_eq!(Builtin::Area.call(&[Value::Null]), Value::Null);
    }

    #[test]
    fn test_numeric() {
        assert_eq!(Builtin::Abs.call(&[Value::Integer(-3)]), Value::Integer(3));
        assert_eq!(Builtin::Sqrt.call(&[Value::Integer(9)]), Value::Float(3.0));
        assert_eq!(Builtin::Sqrt.call(&[Value::Float(-1.0)]), Value::Null);
        assert_eq!(
            Builtin::Max.call(&[Value::Integer(2), Value::Float(2.5)]),
            Value::Float(2.5)
        );
        assert_eq!(
            Builtin::Min.call(&[Value::Integer(2), Value::Null]),
            Value::Null
        );
        assert_eq!(
            Builtin::Coalesce.call(&[Value::Null, Value::Integer(0)]),
            Value::Integer(0)
        );
    }

    #[test]
    fn test_check_args() {
        assert!(Builtin::Area.check_args(&[DataType::BBox]).is_ok());
        assert!(Builtin::Area.check_args(&[DataType::VObj]).is_ok());
        assert!(Builtin::Area.check_args(&[DataType::String]).is_err());
        assert!(Builtin::Iou.check_args(&[DataType::BBox]).is_err());
        assert!(Builtin::Abs.check_args(&[DataType::Int]).is_ok());
    }
}
