/// Semantic analysis of VQL programs
///
/// Binds names in a parsed [`Program`] to classes, properties, models and
/// builtins, checks types and history accesses, orders property dependencies
/// and finally resolves abstract functions against a [`ModelRegistry`].
use super::ast::*;
use super::builtins::Builtin;
use super::value::{Column, Value};
use crate::config::DEFAULT_MAX_HISTORY_LENGTH;
use crate::detector::Detector;
use crate::frame::VObj;
use crate::registry::{Model, ModelRegistry};
use crate::EngineConfig;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Index into [`CompiledProgram::classes`]
pub type ClassId = usize;
/// Index into [`CompiledProgram::properties`]
pub type PropId = usize;
/// Index into [`CompiledProgram::models`]
pub type ModelId = usize;

/// The implicit root class every object belongs to
pub const ROOT_CLASS: ClassId = 0;
/// Name of the root class
pub const ROOT_CLASS_NAME: &str = "VObj";
/// Name of the abstract operation producing the objects of a frame
pub const OBJECTS_IN_FRAME: &str = "objects_in_frame";

/// Intrinsic attributes of every video object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
    /// `bbox`
    BBox,
    /// `label`
    Label,
    /// `score`
    Score,
    /// `track_id`
    TrackId,
    /// `frame_index`
    FrameIndex,
    /// `timestamp`
    Timestamp,
}

impl Attribute {
    /// All attributes, in wildcard expansion order
    pub const ALL: [Attribute; 6] = [
        Attribute::TrackId,
        Attribute::Label,
        Attribute::Score,
        Attribute::BBox,
        Attribute::FrameIndex,
        Attribute::Timestamp,
    ];

    /// Attribute called `name`, ignoring case
    pub fn lookup(name: &str) -> Option<Attribute> {
        Attribute::ALL
            .into_iter()
            .find(|a| a.name().eq_ignore_ascii_case(name))
    }

    /// Name as written in programs
    pub fn name(&self) -> &'static str {
        match self {
            Attribute::BBox => "bbox",
            Attribute::Label => "label",
            Attribute::Score => "score",
            Attribute::TrackId => "track_id",
            Attribute::FrameIndex => "frame_index",
            Attribute::Timestamp => "timestamp",
        }
    }

    /// Static type of the attribute
    pub fn data_type(&self) -> DataType {
        match self {
            Attribute::BBox => DataType::BBox,
            Attribute::Label => DataType::String,
            Attribute::Score | Attribute::Timestamp => DataType::Float,
            Attribute::TrackId | Attribute::FrameIndex => DataType::Int,
        }
    }

    /// Read the attribute from an object
    pub fn read(&self, obj: &VObj) -> Value {
        match self {
            Attribute::BBox => Value::BBox(obj.bbox),
            Attribute::Label => Value::String(obj.label.clone()),
            Attribute::Score => Value::Float(obj.score as f64),
            Attribute::TrackId => i64::try_from(obj.track_id)
                .map(Value::Integer)
                .unwrap_or(Value::Null),
            Attribute::FrameIndex => i64::try_from(obj.frame_index)
                .map(Value::Integer)
                .unwrap_or(Value::Null),
            Attribute::Timestamp => Value::Float(obj.timestamp),
        }
    }
}

/// Expression with every name resolved
#[derive(Debug, Clone, PartialEq)]
pub enum BoundExpr {
    /// Constant
    Literal(Value),
    /// Intrinsic attribute of the current object
    Attribute(Attribute),
    /// The current object
    SelfObject,
    /// Current value of a property
    Property(PropId),
    /// `prop[-offset]`
    History {
        /// Historical property
        prop: PropId,
        /// Steps back, 1 is the current frame
        offset: usize,
    },
    /// Call of an abstract function
    Model {
        /// Callee
        model: ModelId,
        /// Arguments in declaration order
        args: Vec<BoundExpr>,
    },
    /// Call of a builtin
    Builtin {
        /// Callee
        func: Builtin,
        /// Arguments
        args: Vec<BoundExpr>,
    },
    /// Comparison, NULL if either side is NULL
    Compare {
        /// Left operand
        left: Box<BoundExpr>,
        /// Operator
        op: BinaryOperator,
        /// Right operand
        right: Box<BoundExpr>,
    },
    /// Arithmetic, NULL on NULL input
    Arithmetic {
        /// Left operand
        left: Box<BoundExpr>,
        /// Operator
        op: ArithmeticOperator,
        /// Right operand
        right: Box<BoundExpr>,
    },
    /// Unary minus
    Negate(Box<BoundExpr>),
    /// Three-valued AND/OR
    Logical {
        /// Left operand
        left: Box<BoundExpr>,
        /// Operator
        op: LogicalOperator,
        /// Right operand
        right: Box<BoundExpr>,
    },
    /// Three-valued NOT
    Not(Box<BoundExpr>),
    /// LIKE with `%` and `_` wildcards
    Like {
        /// Tested value
        expr: Box<BoundExpr>,
        /// Pattern text
        pattern: String,
    },
    /// Membership in a literal list
    In {
        /// Tested value
        expr: Box<BoundExpr>,
        /// Candidates
        values: Vec<Value>,
    },
    /// Inclusive range test
    Between {
        /// Tested value
        expr: Box<BoundExpr>,
        /// Lower bound
        min: Box<BoundExpr>,
        /// Upper bound
        max: Box<BoundExpr>,
    },
    /// IS [NOT] NULL
    IsNull {
        /// Tested value
        expr: Box<BoundExpr>,
        /// IS NOT NULL
        negated: bool,
    },
}

impl BoundExpr {
    /// Visit this expression and all sub-expressions
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a BoundExpr)) {
        visit(self);
        match self {
            BoundExpr::Literal(_)
            | BoundExpr::Attribute(_)
            | BoundExpr::SelfObject
            | BoundExpr::Property(_)
            | BoundExpr::History { .. } => {}
            BoundExpr::Model { args, .. } | BoundExpr::Builtin { args, .. } => {
                for arg in args {
                    arg.walk(visit);
                }
            }
            BoundExpr::Compare { left, right, .. }
            | BoundExpr::Arithmetic { left, right, .. }
            | BoundExpr::Logical { left, right, .. } => {
                left.walk(visit);
                right.walk(visit);
            }
            BoundExpr::Negate(expr)
            | BoundExpr::Not(expr)
            | BoundExpr::Like { expr, .. }
            | BoundExpr::In { expr, .. }
            | BoundExpr::IsNull { expr, .. } => expr.walk(visit),
            BoundExpr::Between { expr, min, max } => {
                expr.walk(visit);
                min.walk(visit);
                max.walk(visit);
            }
        }
    }
}

/// Signature of an abstract function
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSig {
    /// Declared name
    pub name: String,
    /// Parameter types
    pub params: Vec<DataType>,
    /// Declared result type
    pub returns: DataType,
}

/// A class after hierarchy resolution
#[derive(Debug, Clone, PartialEq)]
pub struct ClassInfo {
    /// Index in [`CompiledProgram::classes`]
    pub id: ClassId,
    /// Declared name
    pub name: String,
    /// `None` only for the root class
    pub parent: Option<ClassId>,
    /// Membership test, bound in the parent's scope
    pub predicate: Option<BoundExpr>,
    /// Properties declared by this class
    pub properties: Vec<PropId>,
    /// Root first, this class last
    pub chain: Vec<ClassId>,
    /// Name -> property visible in this class (nearest declaration wins)
    pub scope: BTreeMap<String, PropId>,
}

/// A bound property
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyInfo {
    /// Index in [`CompiledProgram::properties`]
    pub id: PropId,
    /// Declared name
    pub name: String,
    /// Declaring class
    pub class: ClassId,
    /// Retained observations, when historical
    pub history: Option<usize>,
    /// Defining expression
    pub expr: BoundExpr,
    /// Source text of the defining expression
    pub text: String,
}

/// What a SELECT column computes
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    /// One value per row
    Expr(BoundExpr),
    /// One value over all rows
    Aggregate {
        /// Reduction applied
        function: AggregateFunction,
        /// `None` for `COUNT(*)`
        arg: Option<BoundExpr>,
    },
}

/// One SELECT column
#[derive(Debug, Clone, PartialEq)]
pub struct OutputColumn {
    /// Name and alias
    pub column: Column,
    /// How its value is computed
    pub projection: Projection,
}

/// One ORDER BY key
#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    /// Output column the key was named by
    pub label: String,
    /// Value sorted on
    pub expr: BoundExpr,
    /// Sort direction
    pub direction: OrderDirection,
}

/// A bound query
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    /// Declared name
    pub name: String,
    /// Class the query ranges over
    pub class: ClassId,
    /// SELECT list
    pub columns: Vec<OutputColumn>,
    /// Bound condition and its source text
    pub condition: Option<(BoundExpr, String)>,
    /// ORDER BY keys, most significant first
    pub order_by: Vec<SortKey>,
    /// LIMIT and OFFSET
    pub limit: Option<LimitClause>,
}

impl CompiledQuery {
    /// Whether the query reduces all members to a single row
    pub fn is_aggregate(&self) -> bool {
        self.columns
            .iter()
            .any(|c| matches!(c.projection, Projection::Aggregate { .. }))
    }
}

/// A type-checked program whose abstract functions are not yet bound
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledProgram {
    /// Abstract functions, indexed by [`ModelId`]
    pub models: Vec<ModelSig>,
    /// Classes, indexed by [`ClassId`]; the root class comes first
    pub classes: Vec<ClassInfo>,
    /// Properties, indexed by [`PropId`]
    pub properties: Vec<PropertyInfo>,
    /// Queries in declaration order
    pub queries: Vec<CompiledQuery>,
    reachable: BTreeSet<ModelId>,
}

impl CompiledProgram {
    /// Class called `name`
    pub fn class(&self, name: &str) -> Option<&ClassInfo> {
        self.classes.iter().find(|c| c.name == name)
    }

    /// Query called `name`
    pub fn query(&self, name: &str) -> Option<&CompiledQuery> {
        self.queries.iter().find(|q| q.name == name)
    }

    /// Signature of the abstract function called `name`
    pub fn model(&self, name: &str) -> Option<&ModelSig> {
        self.models.iter().find(|m| m.name == name)
    }

    /// Historical properties declared along a class chain
    pub fn historical_properties(&self, class: ClassId) -> Vec<PropId> {
        self.classes[class]
            .chain
            .iter()
            .flat_map(|c| self.classes[*c].properties.iter().copied())
            .filter(|p| self.properties[*p].history.is_some())
            .collect()
    }

    /// Names of the abstract functions some query can reach
    pub fn reachable_models(&self) -> Vec<&str> {
        self.reachable
            .iter()
            .map(|id| self.models[*id].name.as_str())
            .collect()
    }

    /// Bind every abstract function to a registered model.
    ///
    /// Reachable functions without a binding are an error; unreachable ones
    /// only produce a warning.
    pub fn resolve(&self, registry: &ModelRegistry) -> crate::Result<ResolvedProgram> {
        let mut models = Vec::with_capacity(self.models.len());
        for (id, sig) in self.models.iter().enumerate() {
            match registry.get(&sig.name) {
                Some(model) => models.push(Some(model)),
                None if self.reachable.contains(&id) => {
                    return Err(crate::Error::UnboundModel(sig.name.clone()));
                }
                None => {
                    warn!(model = %sig.name, "Abstract function is never called by a query and has no binding");
                    models.push(None);
                }
            }
        }

        let detector = registry
            .detector()
            .ok_or_else(|| crate::Error::UnboundModel(OBJECTS_IN_FRAME.to_string()))?;

        debug!(
            models = self.models.len(),
            queries = self.queries.len(),
            "Resolved program"
        );
        Ok(ResolvedProgram {
            program: self.clone(),
            models,
            detector,
        })
    }
}

/// A compiled program with concrete models attached
#[derive(Clone)]
pub struct ResolvedProgram {
    program: CompiledProgram,
    models: Vec<Option<Arc<dyn Model>>>,
    detector: Arc<dyn Detector>,
}

impl ResolvedProgram {
    /// The underlying compiled program
    pub fn program(&self) -> &CompiledProgram {
        &self.program
    }

    /// Model bound to `id`. `None` only for unreachable functions.
    pub fn model(&self, id: ModelId) -> Option<&Arc<dyn Model>> {
        self.models.get(id).and_then(Option::as_ref)
    }

    /// Detector implementing `objects_in_frame`
    pub fn detector(&self) -> &Arc<dyn Detector> {
        &self.detector
    }
}

impl fmt::Debug for ResolvedProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedProgram")
            .field("program", &self.program)
            .field(
                "bound",
                &self.models.iter().filter(|m| m.is_some()).count(),
            )
            .finish()
    }
}

/// Semantic errors
#[derive(Debug, Clone, PartialEq)]
pub enum CompileError {
    /// Two MODEL declarations share a name
    DuplicateModel(String),
    /// Two CLASS declarations share a name
    DuplicateClass(String),
    /// A class declares the same property twice
    DuplicateProperty {
        /// Declaring class
        class: String,
        /// Repeated name
        property: String,
    },
    /// Two QUERY declarations share a name
    DuplicateQuery(String),
    /// A declaration uses a name reserved for a builtin, attribute or the root class
    ReservedName(String),
    /// EXTENDS or FROM names an undeclared class
    UnknownClass(String),
    /// A class is its own ancestor
    InheritanceCycle(String),
    /// A name resolves to no attribute or property in scope
    UnknownIdentifier {
        /// Unresolved name
        name: String,
        /// Where it was used
        context: String,
    },
    /// A call names neither a model nor a builtin
    UnknownFunction(String),
    /// Wrong number of call arguments
    ArityMismatch {
        /// Callee
        function: String,
        /// Declared parameter count
        expected: usize,
        /// Arguments given
        found: usize,
    },
    /// A call argument has the wrong static type
    ArgumentType {
        /// Callee
        function: String,
        /// 1-based argument position
        position: usize,
        /// Declared parameter type
        expected: DataType,
        /// Argument type
        found: DataType,
    },
    /// Builtin called with unusable arguments
    InvalidBuiltinCall(String),
    /// `p[-k]` on a property without HISTORY
    NotHistorical(String),
    /// `p[-k]` with `k` beyond the declared history length
    HistoryOffsetOutOfRange {
        /// Indexed property
        property: String,
        /// Requested `k`
        offset: usize,
        /// Declared history length
        length: usize,
    },
    /// HISTORY(n) above the configured maximum
    HistoryTooLong {
        /// Declaring property
        property: String,
        /// Declared length
        length: usize,
        /// Configured maximum
        max: usize,
    },
    /// Properties whose current values depend on each other
    DependencyCycle(Vec<String>),
    /// A WHERE condition is not BOOL
    ConditionType {
        /// Class or query owning the condition
        context: String,
        /// Static type found
        found: DataType,
    },
    /// Aggregate and per-row columns in one SELECT
    MixedAggregate(String),
    /// ORDER BY on an aggregate query
    AggregateOrderBy(String),
    /// ORDER BY names no output column
    UnknownOrderByColumn {
        /// Query name
        query: String,
        /// Unknown column
        column: String,
    },
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::DuplicateModel(name) => write!(f, "Model '{}' declared twice", name),
            CompileError::DuplicateClass(name) => write!(f, "Class '{}' declared twice", name),
            CompileError::DuplicateProperty { class, property } => {
                write!(f, "Property '{}' declared twice in class '{}'", property, class)
            }
            CompileError::DuplicateQuery(name) => write!(f, "Query '{}' declared twice", name),
            CompileError::ReservedName(name) => write!(f, "'{}' is a reserved name", name),
            CompileError::UnknownClass(name) => write!(f, "Unknown class '{}'", name),
            CompileError::InheritanceCycle(name) => {
                write!(f, "Class '{}' inherits from itself", name)
            }
            CompileError::UnknownIdentifier { name, context } => {
                write!(f, "Unknown identifier '{}' in {}", name, context)
            }
            CompileError::UnknownFunction(name) => write!(f, "Unknown function '{}'", name),
            CompileError::ArityMismatch {
                function,
                expected,
                found,
            } => write!(
                f,
                "{}() takes {} argument(s), {} given",
                function, expected, found
            ),
            CompileError::ArgumentType {
                function,
                position,
                expected,
                found,
            } => write!(
                f,
                "Argument {} of {}() must be {}, found {}",
                position, function, expected, found
            ),
            CompileError::InvalidBuiltinCall(msg) => write!(f, "{}", msg),
            CompileError::NotHistorical(name) => {
                write!(f, "Property '{}' is indexed but has no HISTORY", name)
            }
            CompileError::HistoryOffsetOutOfRange {
                property,
                offset,
                length,
            } => write!(
                f,
                "{}[-{}] is out of range: HISTORY({}) keeps {} observation(s)",
                property, offset, length, length
            ),
            CompileError::HistoryTooLong {
                property,
                length,
                max,
            } => write!(
                f,
                "HISTORY({}) of '{}' exceeds the maximum of {}",
                length, property, max
            ),
            CompileError::DependencyCycle(names) => {
                write!(f, "Property dependency cycle: {}", names.join(" -> "))
            }
            CompileError::ConditionType { context, found } => {
                write!(f, "Condition of {} must be BOOL, found {}", context, found)
            }
            CompileError::MixedAggregate(query) => write!(
                f,
                "Query '{}' mixes aggregate and non-aggregate columns",
                query
            ),
            CompileError::AggregateOrderBy(query) => {
                write!(f, "Query '{}' cannot ORDER BY an aggregate result", query)
            }
            CompileError::UnknownOrderByColumn { query, column } => {
                write!(f, "Unknown ORDER BY column '{}' in query '{}'", column, query)
            }
        }
    }
}

impl std::error::Error for CompileError {}

impl From<CompileError> for crate::Error {
    fn from(err: CompileError) -> Self {
        crate::Error::Compile(err.to_string())
    }
}

/// Program compiler
pub struct Compiler {
    max_history_length: usize,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

/// Property metadata available while bodies are being bound
struct PropSlot<'p> {
    name: String,
    class: ClassId,
    history: Option<usize>,
    decl: &'p PropertyDecl,
}

impl Compiler {
    /// Compiler with the default history limit
    pub fn new() -> Self {
        Self {
            max_history_length: DEFAULT_MAX_HISTORY_LENGTH,
        }
    }

    /// Compiler enforcing `config`'s history limit
    pub fn with_config(config: &EngineConfig) -> Self {
        Self {
            max_history_length: config.max_history_length,
        }
    }

    /// Compile a parsed program
    pub fn compile(&self, program: &Program) -> Result<CompiledProgram, CompileError> {
        let models = collect_models(program)?;
        let model_ids: HashMap<&str, ModelId> = models
            .iter()
            .enumerate()
            .map(|(id, m)| (m.name.as_str(), id))
            .collect();

        // Classes: id 0 is the root
        let mut class_ids: HashMap<&str, ClassId> = HashMap::new();
        class_ids.insert(ROOT_CLASS_NAME, ROOT_CLASS);
        for (i, class) in program.classes.iter().enumerate() {
            if class.name.eq_ignore_ascii_case(ROOT_CLASS_NAME) {
                return Err(CompileError::ReservedName(class.name.clone()));
            }
            if class_ids.insert(&class.name, i + 1).is_some() {
                return Err(CompileError::DuplicateClass(class.name.clone()));
            }
        }

        let mut parents = vec![None];
        for class in &program.classes {
            let parent = match class.parent.as_deref() {
                None => ROOT_CLASS,
                Some(name) if name.eq_ignore_ascii_case(ROOT_CLASS_NAME) => ROOT_CLASS,
                Some(name) => *class_ids
                    .get(name)
                    .ok_or_else(|| CompileError::UnknownClass(name.to_string()))?,
            };
            parents.push(Some(parent));
        }
        let chains = build_chains(&parents, program)?;

        // Property slots, in declaration order
        let mut slots: Vec<PropSlot<'_>> = Vec::new();
        let mut own: Vec<Vec<PropId>> = vec![Vec::new(); parents.len()];
        for (i, class) in program.classes.iter().enumerate() {
            let class_id = i + 1;
            for decl in &class.properties {
                if Attribute::lookup(&decl.name).is_some() || decl.name.eq_ignore_ascii_case("self") {
                    return Err(CompileError::ReservedName(decl.name.clone()));
                }
                if own[class_id]
                    .iter()
                    .any(|p| slots[*p].name == decl.name)
                {
                    return Err(CompileError::DuplicateProperty {
                        class: class.name.clone(),
                        property: decl.name.clone(),
                    });
                }
                if let Some(n) = decl.history {
                    if n == 0 || n > self.max_history_length {
                        return Err(CompileError::HistoryTooLong {
                            property: decl.name.clone(),
                            length: n,
                            max: self.max_history_length,
                        });
                    }
                }
                own[class_id].push(slots.len());
                slots.push(PropSlot {
                    name: decl.name.clone(),
                    class: class_id,
                    history: decl.history,
                    decl,
                });
            }
        }

        let scopes: Vec<BTreeMap<String, PropId>> = chains
            .iter()
            .map(|chain| {
                let mut scope = BTreeMap::new();
                for class in chain {
                    for prop in &own[*class] {
                        scope.insert(slots[*prop].name.clone(), *prop);
                    }
                }
                scope
            })
            .collect();

        let binder = Binder {
            models: &models,
            model_ids: &model_ids,
            slots: &slots,
        };

        // Class predicates are bound in the parent's scope
        let mut classes = vec![ClassInfo {
            id: ROOT_CLASS,
            name: ROOT_CLASS_NAME.to_string(),
            parent: None,
            predicate: None,
            properties: Vec::new(),
            chain: vec![ROOT_CLASS],
            scope: BTreeMap::new(),
        }];
        for (i, class) in program.classes.iter().enumerate() {
            let id = i + 1;
            let parent = parents[id].unwrap_or(ROOT_CLASS);
            let predicate = match &class.predicate {
                Some(expr) => {
                    let context = format!("the predicate of class '{}'", class.name);
                    let bound = binder.bind(expr, &scopes[parent], &context)?;
                    binder.expect_condition(&bound, &context)?;
                    Some(bound)
                }
                None => None,
            };
            classes.push(ClassInfo {
                id,
                name: class.name.clone(),
                parent: Some(parent),
                predicate,
                properties: own[id].clone(),
                chain: chains[id].clone(),
                scope: scopes[id].clone(),
            });
        }

        let mut properties = Vec::with_capacity(slots.len());
        for (id, slot) in slots.iter().enumerate() {
            let context = format!(
                "property '{}' of class '{}'",
                slot.name, program.classes[slot.class - 1].name
            );
            let expr = binder.bind(&slot.decl.expr, &scopes[slot.class], &context)?;
            properties.push(PropertyInfo {
                id,
                name: slot.name.clone(),
                class: slot.class,
                history: slot.history,
                expr,
                text: slot.decl.expr.to_string(),
            });
        }
        check_dependencies(&properties)?;

        let mut queries = Vec::with_capacity(program.queries.len());
        for query in &program.queries {
            if queries.iter().any(|q: &CompiledQuery| q.name == query.name) {
                return Err(CompileError::DuplicateQuery(query.name.clone()));
            }
            let class = if query.from.eq_ignore_ascii_case(ROOT_CLASS_NAME) {
                ROOT_CLASS
            } else {
                *class_ids
                    .get(query.from.as_str())
                    .ok_or_else(|| CompileError::UnknownClass(query.from.clone()))?
            };
            queries.push(binder.bind_query(query, class, &scopes[class], &properties)?);
        }

        let reachable = reachable_models(&classes, &properties, &queries);
        debug!(
            classes = classes.len() - 1,
            properties = properties.len(),
            queries = queries.len(),
            "Compiled program"
        );

        Ok(CompiledProgram {
            models,
            classes,
            properties,
            queries,
            reachable,
        })
    }
}

fn collect_models(program: &Program) -> Result<Vec<ModelSig>, CompileError> {
    let mut models: Vec<ModelSig> = Vec::with_capacity(program.models.len());
    for decl in &program.models {
        if Builtin::lookup(&decl.name).is_some() || decl.name == OBJECTS_IN_FRAME {
            return Err(CompileError::ReservedName(decl.name.clone()));
        }
        if models.iter().any(|m| m.name == decl.name) {
            return Err(CompileError::DuplicateModel(decl.name.clone()));
        }
        models.push(ModelSig {
            name: decl.name.clone(),
            params: decl.params.clone(),
            returns: decl.returns,
        });
    }
    Ok(models)
}

/// Root-to-leaf chain of every class
fn build_chains(
    parents: &[Option<ClassId>],
    program: &Program,
) -> Result<Vec<Vec<ClassId>>, CompileError> {
    let mut chains = Vec::with_capacity(parents.len());
    for start in 0..parents.len() {
        let mut chain = vec![start];
        let mut current = start;
        while let Some(parent) = parents[current] {
            if chain.contains(&parent) {
                return Err(CompileError::InheritanceCycle(
                    program.classes[start - 1].name.clone(),
                ));
            }
            chain.push(parent);
            current = parent;
        }
        chain.reverse();
        chains.push(chain);
    }
    Ok(chains)
}

/// Properties whose current value `expr` needs
fn dependencies(expr: &BoundExpr) -> BTreeSet<PropId> {
    let mut deps = BTreeSet::new();
    expr.walk(&mut |e| match e {
        BoundExpr::Property(p) | BoundExpr::History { prop: p, offset: 1 } => {
            deps.insert(*p);
        }
        _ => {}
    });
    deps
}

/// Reject property cycles. Reading a past observation (`p[-k]`, `k >= 2`)
/// is not a dependency, so accumulators may refer to themselves.
fn check_dependencies(properties: &[PropertyInfo]) -> Result<(), CompileError> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        New,
        Active,
        Done,
    }

    fn visit(
        id: PropId,
        properties: &[PropertyInfo],
        marks: &mut [Mark],
        stack: &mut Vec<PropId>,
    ) -> Result<(), CompileError> {
        match marks[id] {
            Mark::Done => return Ok(()),
            Mark::Active => {
                let start = stack.iter().position(|p| *p == id).unwrap_or(0);
                let mut names: Vec<String> = stack[start..]
                    .iter()
                    .map(|p| properties[*p].name.clone())
                    .collect();
                names.push(properties[id].name.clone());
                return Err(CompileError::DependencyCycle(names));
            }
            Mark::New => {}
        }
        marks[id] = Mark::Active;
        stack.push(id);
        for dep in dependencies(&properties[id].expr) {
            visit(dep, properties, marks, stack)?;
        }
        stack.pop();
        marks[id] = Mark::Done;
        Ok(())
    }

    let mut marks = vec![Mark::New; properties.len()];
    let mut stack = Vec::new();
    for id in 0..properties.len() {
        visit(id, properties, &mut marks, &mut stack)?;
    }
    Ok(())
}

/// Models called, directly or through properties, by the expressions a
/// query evaluates: its own columns and condition, the predicates of its
/// class chain and the historical properties materialized along it.
fn reachable_models(
    classes: &[ClassInfo],
    properties: &[PropertyInfo],
    queries: &[CompiledQuery],
) -> BTreeSet<ModelId> {
    let mut roots: Vec<&BoundExpr> = Vec::new();
    for query in queries {
        for column in &query.columns {
            match &column.projection {
                Projection::Expr(expr) => roots.push(expr),
                Projection::Aggregate { arg: Some(expr), .. } => roots.push(expr),
                Projection::Aggregate { arg: None, .. } => {}
            }
        }
        if let Some((expr, _)) = &query.condition {
            roots.push(expr);
        }
        roots.extend(query.order_by.iter().map(|k| &k.expr));
        for class in &classes[query.class].chain {
            roots.extend(classes[*class].predicate.iter());
            for prop in &classes[*class].properties {
                if properties[*prop].history.is_some() {
                    roots.push(&properties[*prop].expr);
                }
            }
        }
    }

    let mut models = BTreeSet::new();
    let mut seen = BTreeSet::new();
    while let Some(expr) = roots.pop() {
        expr.walk(&mut |e| match e {
            BoundExpr::Model { model, .. } => {
                models.insert(*model);
            }
            BoundExpr::Property(p) | BoundExpr::History { prop: p, .. } => {
                if seen.insert(*p) {
                    roots.push(&properties[*p].expr);
                }
            }
            _ => {}
        });
    }
    models
}

/// Strip an optional `self.` qualifier
fn unqualified(name: &str) -> &str {
    match name.get(..5) {
        Some(prefix) if prefix.eq_ignore_ascii_case("self.") && name.len() > 5 => &name[5..],
        _ => name,
    }
}

struct Binder<'a, 'p> {
    models: &'a [ModelSig],
    model_ids: &'a HashMap<&'a str, ModelId>,
    slots: &'a [PropSlot<'p>],
}

impl Binder<'_, '_> {
    fn bind(
        &self,
        expr: &Expression,
        scope: &BTreeMap<String, PropId>,
        context: &str,
    ) -> Result<BoundExpr, CompileError> {
        let bind = |e: &Expression| self.bind(e, scope, context);
        let boxed = |e: &Expression| bind(e).map(Box::new);

        let bound = match expr {
            Expression::Identifier(name) => self.bind_name(name, scope, context)?,
            Expression::SelfRef => BoundExpr::SelfObject,
            Expression::Literal(lit) => BoundExpr::Literal(Value::from(lit)),
            Expression::HistoryIndex { name, offset } => {
                let name = unqualified(name);
                let prop = *scope
                    .get(name)
                    .ok_or_else(|| CompileError::UnknownIdentifier {
                        name: name.to_string(),
                        context: context.to_string(),
                    })?;
                let length = self.slots[prop]
                    .history
                    .ok_or_else(|| CompileError::NotHistorical(name.to_string()))?;
                if *offset == 0 || *offset > length {
                    return Err(CompileError::HistoryOffsetOutOfRange {
                        property: name.to_string(),
                        offset: *offset,
                        length,
                    });
                }
                BoundExpr::History {
                    prop,
                    offset: *offset,
                }
            }
            Expression::Call { name, args } => {
                let args = args.iter().map(bind).collect::<Result<Vec<_>, _>>()?;
                self.bind_call(name, args)?
            }
            Expression::BinaryOp { left, op, right } => BoundExpr::Compare {
                left: boxed(left)?,
                op: op.clone(),
                right: boxed(right)?,
            },
            Expression::Arithmetic { left, op, right } => BoundExpr::Arithmetic {
                left: boxed(left)?,
                op: op.clone(),
                right: boxed(right)?,
            },
            Expression::Negate(inner) => BoundExpr::Negate(boxed(inner)?),
            Expression::LogicalOp { left, op, right } => BoundExpr::Logical {
                left: boxed(left)?,
                op: op.clone(),
                right: boxed(right)?,
            },
            Expression::Not(inner) => BoundExpr::Not(boxed(inner)?),
            Expression::Like { expr, pattern } => BoundExpr::Like {
                expr: boxed(expr)?,
                pattern: pattern.clone(),
            },
            Expression::In { expr, values } => BoundExpr::In {
                expr: boxed(expr)?,
                values: values.iter().map(Value::from).collect(),
            },
            Expression::Between { expr, min, max } => BoundExpr::Between {
                expr: boxed(expr)?,
                min: boxed(min)?,
                max: boxed(max)?,
            },
            Expression::IsNull { expr, negated } => BoundExpr::IsNull {
                expr: boxed(expr)?,
                negated: *negated,
            },
        };
        Ok(bound)
    }

    fn bind_name(
        &self,
        name: &str,
        scope: &BTreeMap<String, PropId>,
        context: &str,
    ) -> Result<BoundExpr, CompileError> {
        let name = unqualified(name);
        if let Some(attr) = Attribute::lookup(name) {
            return Ok(BoundExpr::Attribute(attr));
        }
        scope
            .get(name)
            .map(|p| BoundExpr::Property(*p))
            .ok_or_else(|| CompileError::UnknownIdentifier {
                name: name.to_string(),
                context: context.to_string(),
            })
    }

    fn bind_call(&self, name: &str, args: Vec<BoundExpr>) -> Result<BoundExpr, CompileError> {
        let types: Vec<DataType> = args.iter().map(|a| self.infer_type(a)).collect();

        if let Some(&model) = self.model_ids.get(name) {
            let sig = &self.models[model];
            if sig.params.len() != args.len() {
                return Err(CompileError::ArityMismatch {
                    function: name.to_string(),
                    expected: sig.params.len(),
                    found: args.len(),
                });
            }
            for (i, (param, found)) in sig.params.iter().zip(&types).enumerate() {
                if !param.accepts(*found) {
                    return Err(CompileError::ArgumentType {
                        function: name.to_string(),
                        position: i + 1,
                        expected: *param,
                        found: *found,
                    });
                }
            }
            return Ok(BoundExpr::Model { model, args });
        }

        match Builtin::lookup(name) {
            Some(func) => {
                func.check_args(&types)
                    .map_err(CompileError::InvalidBuiltinCall)?;
                Ok(BoundExpr::Builtin { func, args })
            }
            None => Err(CompileError::UnknownFunction(name.to_string())),
        }
    }

    /// Statically known type; properties are dynamically typed
    fn infer_type(&self, expr: &BoundExpr) -> DataType {
        match expr {
            BoundExpr::Literal(v) => v.data_type().unwrap_or(DataType::Any),
            BoundExpr::Attribute(attr) => attr.data_type(),
            BoundExpr::SelfObject => DataType::VObj,
            BoundExpr::Property(_) | BoundExpr::History { .. } => DataType::Any,
            BoundExpr::Model { model, .. } => self.models[*model].returns,
            BoundExpr::Builtin { func, args } => {
                let types: Vec<DataType> = args.iter().map(|a| self.infer_type(a)).collect();
                func.return_type(&types)
            }
            BoundExpr::Arithmetic { left, op, right } => {
                match (self.infer_type(left), self.infer_type(right)) {
                    (DataType::Int, DataType::Int) if *op != ArithmeticOperator::Div => {
                        DataType::Int
                    }
                    (DataType::Int | DataType::Float, DataType::Int | DataType::Float) => {
                        DataType::Float
                    }
                    (DataType::String, DataType::String) if *op == ArithmeticOperator::Add => {
                        DataType::String
                    }
                    _ => DataType::Any,
                }
            }
            BoundExpr::Negate(inner) => self.infer_type(inner),
            BoundExpr::Compare { .. }
            | BoundExpr::Logical { .. }
            | BoundExpr::Not(_)
            | BoundExpr::Like { .. }
            | BoundExpr::In { .. }
            | BoundExpr::Between { .. }
            | BoundExpr::IsNull { .. } => DataType::Bool,
        }
    }

    fn expect_condition(&self, expr: &BoundExpr, context: &str) -> Result<(), CompileError> {
        let found = self.infer_type(expr);
        if DataType::Bool.accepts(found) {
            Ok(())
        } else {
            Err(CompileError::ConditionType {
                context: context.to_string(),
                found,
            })
        }
    }

    fn bind_query(
        &self,
        query: &QueryDecl,
        class: ClassId,
        scope: &BTreeMap<String, PropId>,
        properties: &[PropertyInfo],
    ) -> Result<CompiledQuery, CompileError> {
        let context = format!("query '{}'", query.name);

        let mut columns = Vec::new();
        for item in &query.select.columns {
            match item {
                SelectColumn::Wildcard => {
                    for attr in Attribute::ALL {
                        columns.push(OutputColumn {
                            column: Column {
                                name: attr.name().to_string(),
                                alias: None,
                            },
                            projection: Projection::Expr(BoundExpr::Attribute(attr)),
                        });
                    }
                    let mut visible: Vec<PropId> = scope.values().copied().collect();
                    visible.sort_unstable();
                    for prop in visible {
                        columns.push(OutputColumn {
                            column: Column {
                                name: properties[prop].name.clone(),
                                alias: None,
                            },
                            projection: Projection::Expr(BoundExpr::Property(prop)),
                        });
                    }
                }
                SelectColumn::Expr { expr, alias } => {
                    let name = match expr {
                        Expression::Identifier(name) => unqualified(name).to_string(),
                        other => other.to_string(),
                    };
                    columns.push(OutputColumn {
                        column: Column {
                            name,
                            alias: alias.clone(),
                        },
                        projection: Projection::Expr(self.bind(expr, scope, &context)?),
                    });
                }
                SelectColumn::Aggregate {
                    function,
                    arg,
                    alias,
                } => {
                    let (name, bound) = match arg {
                        Some(expr) => {
                            let shown = match expr {
                                Expression::Identifier(name) => unqualified(name).to_string(),
                                other => other.to_string(),
                            };
                            (
                                format!("{}({})", function, shown),
                                Some(self.bind(expr, scope, &context)?),
                            )
                        }
                        None => (format!("{}(*)", function), None),
                    };
                    columns.push(OutputColumn {
                        column: Column {
                            name,
                            alias: alias.clone(),
                        },
                        projection: Projection::Aggregate {
                            function: *function,
                            arg: bound,
                        },
                    });
                }
            }
        }

        let aggregates = columns
            .iter()
            .filter(|c| matches!(c.projection, Projection::Aggregate { .. }))
            .count();
        if aggregates > 0 && aggregates < columns.len() {
            return Err(CompileError::MixedAggregate(query.name.clone()));
        }

        let condition = match &query.where_clause {
            Some(clause) => {
                let bound = self.bind(&clause.condition, scope, &context)?;
                self.expect_condition(&bound, &context)?;
                Some((bound, clause.condition.to_string()))
            }
            None => None,
        };

        let mut order_by = Vec::new();
        if let Some(clause) = &query.order_by {
            if aggregates > 0 {
                return Err(CompileError::AggregateOrderBy(query.name.clone()));
            }
            for col in &clause.columns {
                let wanted = unqualified(&col.column);
                let from_select = columns
                    .iter()
                    .find(|c| c.column.alias.as_deref() == Some(wanted))
                    .or_else(|| columns.iter().find(|c| c.column.name == wanted));
                let expr = match from_select.map(|c| &c.projection) {
                    Some(Projection::Expr(expr)) => expr.clone(),
                    _ => self.bind_name(wanted, scope, &context).map_err(|_| {
                        CompileError::UnknownOrderByColumn {
                            query: query.name.clone(),
                            column: col.column.clone(),
                        }
                    })?,
                };
                order_by.push(SortKey {
                    label: wanted.to_string(),
                    expr,
                    direction: col.direction.clone(),
                });
            }
        }

        Ok(CompiledQuery {
            name: query.name.clone(),
            class,
            columns,
            condition,
            order_by,
            limit: query.limit.clone(),
        })
    }
}
