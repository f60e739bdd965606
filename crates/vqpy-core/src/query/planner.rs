/// Query planner
///
/// Lowers compiled queries into trees of physical operators over the objects
/// of one frame.
use super::ast::LimitClause;
use super::compiler::{
    BoundExpr, ClassId, CompiledProgram, CompiledQuery, OutputColumn, PropId, SortKey, ROOT_CLASS,
};
use std::fmt;

/// Physical query plan
#[derive(Debug, Clone, PartialEq)]
pub struct PhysicalPlan {
    /// Query the plan computes
    pub query: String,
    /// Last operator; inputs hang below it
    pub root: PhysicalOperator,
}

/// Physical operators for query execution
#[derive(Debug, Clone, PartialEq)]
pub enum PhysicalOperator {
    /// Every tracked object of the frame
    ObjectScan,
    /// Keep members of each class in turn, root first
    ClassFilter {
        /// Input
        input: Box<PhysicalOperator>,
        /// Chain below the root class, with names for display
        classes: Vec<(ClassId, String)>,
    },
    /// Evaluate (and record) historical properties of every member
    Materialize {
        /// Input
        input: Box<PhysicalOperator>,
        /// Historical properties of the chain
        properties: Vec<(PropId, String)>,
    },
    /// Filter objects based on predicate
    Filter {
        /// Input
        input: Box<PhysicalOperator>,
        /// Only TRUE passes
        condition: BoundExpr,
        /// Source text of the condition
        text: String,
    },
    /// Sort objects
    Sort {
        /// Input
        input: Box<PhysicalOperator>,
        /// Stable multi-key sort, NULLs last ascending
        keys: Vec<SortKey>,
    },
    /// Limit number of results
    Limit {
        /// Input
        input: Box<PhysicalOperator>,
        /// Rows kept
        count: usize,
        /// Rows skipped first
        offset: usize,
    },
    /// One row per object
    Project {
        /// Input
        input: Box<PhysicalOperator>,
        /// SELECT list
        columns: Vec<OutputColumn>,
    },
    /// One row for all objects
    Aggregate {
        /// Input
        input: Box<PhysicalOperator>,
        /// Aggregate SELECT list
        columns: Vec<OutputColumn>,
    },
}

impl PhysicalOperator {
    /// The operator feeding this one
    pub fn input(&self) -> Option<&PhysicalOperator> {
        match self {
            PhysicalOperator::ObjectScan => None,
            PhysicalOperator::ClassFilter { input, .. }
            | PhysicalOperator::Materialize { input, .. }
            | PhysicalOperator::Filter { input, .. }
            | PhysicalOperator::Sort { input, .. }
            | PhysicalOperator::Limit { input, .. }
            | PhysicalOperator::Project { input, .. }
            | PhysicalOperator::Aggregate { input, .. } => Some(input),
        }
    }
}

impl PhysicalPlan {
    /// The `Materialize` subtree, if the class chain has historical properties
    pub fn materialization(&self) -> Option<&PhysicalOperator> {
        let mut node = Some(&self.root);
        while let Some(op) = node {
            if matches!(op, PhysicalOperator::Materialize { .. }) {
                return Some(op);
            }
            node = op.input();
        }
        None
    }
}

/// Query planner
pub struct Planner<'a> {
    program: &'a CompiledProgram,
}

impl<'a> Planner<'a> {
    /// Planner over a compiled program
    pub fn new(program: &'a CompiledProgram) -> Self {
        Self { program }
    }

    /// Plan every query, in declaration order
    pub fn plan_all(&self) -> Vec<PhysicalPlan> {
        self.program.queries.iter().map(|q| self.plan(q)).collect()
    }

    /// Plan a query
    pub fn plan(&self, query: &CompiledQuery) -> PhysicalPlan {
        let mut plan = PhysicalOperator::ObjectScan;

        let classes: Vec<(ClassId, String)> = self.program.classes[query.class]
            .chain
            .iter()
            .filter(|c| **c != ROOT_CLASS)
            .map(|c| (*c, self.program.classes[*c].name.clone()))
            .collect();
        if !classes.is_empty() {
            plan = PhysicalOperator::ClassFilter {
                input: Box::new(plan),
                classes,
            };
        }

        let properties: Vec<(PropId, String)> = self
            .program
            .historical_properties(query.class)
            .into_iter()
            .map(|p| (p, self.program.properties[p].name.clone()))
            .collect();
        if !properties.is_empty() {
            plan = PhysicalOperator::Materialize {
                input: Box::new(plan),
                properties,
            };
        }

        if let Some((condition, text)) = &query.condition {
            plan = PhysicalOperator::Filter {
                input: Box::new(plan),
                condition: condition.clone(),
                text: text.clone(),
            };
        }

        if query.is_aggregate() {
            plan = PhysicalOperator::Aggregate {
                input: Box::new(plan),
                columns: query.columns.clone(),
            };
            plan = apply_limit(plan, query.limit.as_ref());
        } else {
            if !query.order_by.is_empty() {
                plan = PhysicalOperator::Sort {
                    input: Box::new(plan),
                    keys: query.order_by.clone(),
                };
            }
            plan = apply_limit(plan, query.limit.as_ref());
            plan = PhysicalOperator::Project {
                input: Box::new(plan),
                columns: query.columns.clone(),
            };
        }

        PhysicalPlan {
            query: query.name.clone(),
            root: plan,
        }
    }
}

fn apply_limit(plan: PhysicalOperator, limit: Option<&LimitClause>) -> PhysicalOperator {
    match limit {
        Some(limit) => PhysicalOperator::Limit {
            input: Box::new(plan),
            count: limit.count,
            offset: limit.offset.unwrap_or(0),
        },
        None => plan,
    }
}

impl fmt::Display for PhysicalPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.query, self.root)
    }
}

fn write_list<I, T>(f: &mut fmt::Formatter<'_>, items: I) -> fmt::Result
where
    I: IntoIterator<Item = T>,
    T: fmt::Display,
{
    for (i, item) in items.into_iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

impl fmt::Display for PhysicalOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhysicalOperator::ObjectScan => write!(f, "ObjectScan"),
            PhysicalOperator::ClassFilter { input, classes } => {
                write!(f, "ClassFilter(")?;
                write_list(f, classes.iter().map(|(_, name)| name))?;
                write!(f, ") -> {}", input)
            }
            PhysicalOperator::Materialize { input, properties } => {
                write!(f, "Materialize(")?;
                write_list(f, properties.iter().map(|(_, name)| name))?;
                write!(f, ") -> {}", input)
            }
            PhysicalOperator::Filter { input, text, .. } => {
                write!(f, "Filter({}) -> {}", text, input)
            }
            PhysicalOperator::Sort { input, keys } => {
                write!(f, "Sort(")?;
                write_list(f, keys.iter().map(|k| format!("{} {}", k.label, k.direction)))?;
                write!(f, ") -> {}", input)
            }
            PhysicalOperator::Limit {
                input,
                count,
                offset,
            } => {
                write!(f, "Limit({}, {}) -> {}", count, offset, input)
            }
            PhysicalOperator::Project { input, columns } => {
                write!(f, "Project(")?;
                write_list(f, columns.iter().map(|c| c.column.display_name()))?;
                write!(f, ") -> {}", input)
            }
            PhysicalOperator::Aggregate { input, columns } => {
                write!(f, "Aggregate(")?;
                write_list(f, columns.iter().map(|c| c.column.display_name()))?;
                write!(f, ") -> {}", input)
            }
        }
    }
}
