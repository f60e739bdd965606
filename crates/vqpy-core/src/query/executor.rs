/// Query executor
///
/// Runs physical plans against the objects of each frame: detect, track,
/// evaluate class tests and properties, advance histories, emit rows.
use super::ast::{AggregateFunction, BinaryOperator, DataType, LogicalOperator, OrderDirection};
use super::compiler::{
    BoundExpr, ClassId, ModelId, OutputColumn, Projection, PropId, ResolvedProgram, SortKey,
    ROOT_CLASS,
};
use super::planner::{PhysicalOperator, PhysicalPlan, Planner};
use super::value::{Column, Row, Value};
use crate::frame::{Frame, VObj};
use crate::history::HistoryStore;
use crate::tracker::{IouTracker, Tracker};
use crate::{EngineConfig, Error, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use tracing::{debug, trace};

/// Rows produced by one query for one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryOutput {
    /// Query name
    pub query: String,
    /// Result rows in output order
    pub rows: Vec<Row>,
}

/// Everything the program produced for one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameResult {
    /// Index of the processed frame
    pub frame_index: u64,
    /// Its timestamp
    pub timestamp: f64,
    /// One entry per query, in declaration order
    pub outputs: Vec<QueryOutput>,
}

impl FrameResult {
    /// Output of the named query
    pub fn output(&self, query: &str) -> Option<&QueryOutput> {
        self.outputs.iter().find(|o| o.query == query)
    }

    /// Rows of the named query, empty when the query does not exist
    pub fn rows(&self, query: &str) -> &[Row] {
        self.output(query).map(|o| o.rows.as_slice()).unwrap_or(&[])
    }
}

/// Executes a resolved program over an ordered stream of frames
pub struct Executor {
    program: ResolvedProgram,
    plans: Vec<PhysicalPlan>,
    history: HistoryStore,
    tracker: Box<dyn Tracker>,
    config: EngineConfig,
    last_frame: Option<u64>,
    frames_processed: u64,
}

impl Executor {
    /// Create an executor using the built-in IoU tracker
    pub fn new(program: ResolvedProgram, config: EngineConfig) -> Self {
        let tracker = IouTracker::new(config.iou_threshold, config.max_track_idle_frames);
        Self::with_tracker(program, config, Box::new(tracker))
    }

    /// Create an executor using a caller-supplied tracker
    pub fn with_tracker(
        program: ResolvedProgram,
        config: EngineConfig,
        tracker: Box<dyn Tracker>,
    ) -> Self {
        let plans = Planner::new(program.program()).plan_all();
        for plan in &plans {
            debug!(plan = %plan, "Planned query");
        }
        Self {
            program,
            plans,
            history: HistoryStore::new(),
            tracker,
            config,
            last_frame: None,
            frames_processed: 0,
        }
    }

    /// One plan per query, in declaration order
    pub fn plans(&self) -> &[PhysicalPlan] {
        &self.plans
    }

    /// Property histories kept so far
    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    /// Frames processed successfully
    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    /// Run every query on one frame
    pub fn process(&mut self, frame: &Frame) -> Result<FrameResult> {
        if let Some(last) = self.last_frame {
            if frame.index <= last {
                return Err(Error::InvalidOperation(format!(
                    "Frame {} arrived after frame {}; frame indices must increase",
                    frame.index, last
                )));
            }
        }

        let detections = self
            .program
            .detector()
            .detect(frame)
            .map_err(|e| Error::model(super::compiler::OBJECTS_IN_FRAME, e))?;
        let objects = self.tracker.assign(frame, detections);
        debug!(frame = frame.index, objects = objects.len(), "Processing frame");

        let outputs = {
            let mut ctx = FrameContext::new(
                frame,
                &self.program,
                &self.config,
                &mut self.history,
                objects,
            );

            // Histories advance for every member, whatever the queries select
            for plan in &self.plans {
                if let Some(node) = plan.materialization() {
                    ctx.run(node)?;
                }
            }

            let mut outputs = Vec::with_capacity(self.plans.len());
            for plan in &self.plans {
                let rows = ctx.run(&plan.root)?.into_rows(&plan.query)?;
                trace!(query = %plan.query, rows = rows.len(), "Query finished");
                outputs.push(QueryOutput {
                    query: plan.query.clone(),
                    rows,
                });
            }
            outputs
        };

        self.history
            .evict_idle(frame.index, self.config.max_track_idle_frames);
        self.last_frame = Some(frame.index);
        self.frames_processed += 1;

        Ok(FrameResult {
            frame_index: frame.index,
            timestamp: frame.timestamp,
            outputs,
        })
    }
}

/// Intermediate results between operators
enum Stream {
    /// Indices into the frame's objects
    Objects(Vec<usize>),
    Rows(Vec<Row>),
}

impl Stream {
    fn into_rows(self, query: &str) -> Result<Vec<Row>> {
        match self {
            Stream::Rows(rows) => Ok(rows),
            Stream::Objects(_) => Err(Error::InvalidOperation(format!(
                "Plan for query '{}' does not produce rows",
                query
            ))),
        }
    }
}

/// Per-frame evaluation state
struct FrameContext<'a> {
    frame: &'a Frame,
    program: &'a ResolvedProgram,
    config: &'a EngineConfig,
    history: &'a mut HistoryStore,
    objects: Vec<VObj>,
    properties: Vec<HashMap<PropId, Value>>,
    membership: Vec<HashMap<ClassId, bool>>,
    in_progress: HashSet<(usize, PropId)>,
    model_cache: HashMap<(ModelId, Vec<u8>), Value>,
}

impl<'a> FrameContext<'a> {
    fn new(
        frame: &'a Frame,
        program: &'a ResolvedProgram,
        config: &'a EngineConfig,
        history: &'a mut HistoryStore,
        objects: Vec<VObj>,
    ) -> Self {
        let n = objects.len();
        Self {
            frame,
            program,
            config,
            history,
            objects,
            properties: vec![HashMap::new(); n],
            membership: vec![HashMap::new(); n],
            in_progress: HashSet::new(),
            model_cache: HashMap::new(),
        }
    }

    fn run(&mut self, op: &PhysicalOperator) -> Result<Stream> {
        match op {
            PhysicalOperator::ObjectScan => Ok(Stream::Objects((0..self.objects.len()).collect())),
            PhysicalOperator::ClassFilter { input, classes } => {
                let mut objects = self.objects_of(input)?;
                for (class, _) in classes {
                    let mut kept = Vec::with_capacity(objects.len());
                    for obj in objects {
                        if self.is_member(obj, *class)? {
                            kept.push(obj);
                        }
                    }
                    objects = kept;
                }
                Ok(Stream::Objects(objects))
            }
            PhysicalOperator::Materialize { input, properties } => {
                let objects = self.objects_of(input)?;
                for obj in &objects {
                    for (prop, _) in properties {
                        self.property(*obj, *prop)?;
                    }
                }
                Ok(Stream::Objects(objects))
            }
            PhysicalOperator::Filter {
                input, condition, ..
            } => {
                let objects = self.objects_of(input)?;
                let mut kept = Vec::with_capacity(objects.len());
                for obj in objects {
                    if self.eval(obj, condition)?.is_true() {
                        kept.push(obj);
                    }
                }
                Ok(Stream::Objects(kept))
            }
            PhysicalOperator::Sort { input, keys } => {
                let objects = self.objects_of(input)?;
                self.sort(objects, keys).map(Stream::Objects)
            }
            PhysicalOperator::Limit {
                input,
                count,
                offset,
            } => Ok(match self.run(input)? {
                Stream::Objects(objects) => {
                    Stream::Objects(objects.into_iter().skip(*offset).take(*count).collect())
                }
                Stream::Rows(rows) => {
                    Stream::Rows(rows.into_iter().skip(*offset).take(*count).collect())
                }
            }),
            PhysicalOperator::Project { input, columns } => {
                let objects = self.objects_of(input)?;
                let header: Vec<Column> = columns.iter().map(|c| c.column.clone()).collect();
                let mut rows = Vec::with_capacity(objects.len());
                for obj in objects {
                    let mut values = Vec::with_capacity(columns.len());
                    for column in columns {
                        match &column.projection {
                            Projection::Expr(expr) => values.push(self.eval(obj, expr)?),
                            Projection::Aggregate { .. } => values.push(Value::Null),
                        }
                    }
                    rows.push(Row {
                        columns: header.clone(),
                        values,
                    });
                }
                Ok(Stream::Rows(rows))
            }
            PhysicalOperator::Aggregate { input, columns } => {
                let objects = self.objects_of(input)?;
                self.aggregate(&objects, columns)
                    .map(|row| Stream::Rows(vec![row]))
            }
        }
    }

    fn objects_of(&mut self, op: &PhysicalOperator) -> Result<Vec<usize>> {
        match self.run(op)? {
            Stream::Objects(objects) => Ok(objects),
            Stream::Rows(_) => Err(Error::InvalidOperation(
                "Operator expects objects but received rows".to_string(),
            )),
        }
    }

    /// Class membership, memoized per frame. NULL tests count as false.
    fn is_member(&mut self, obj: usize, class: ClassId) -> Result<bool> {
        if class == ROOT_CLASS {
            return Ok(true);
        }
        if let Some(member) = self.membership[obj].get(&class) {
            return Ok(*member);
        }

        let program = self.program;
        let info = &program.program().classes[class];
        let parent = info.parent.unwrap_or(ROOT_CLASS);
        let member = self.is_member(obj, parent)?
            && match &info.predicate {
                Some(predicate) => self.eval(obj, predicate)?.is_true(),
                None => true,
            };

        self.membership[obj].insert(class, member);
        Ok(member)
    }

    /// Evaluate a property once per object and frame, recording historical ones
    fn property(&mut self, obj: usize, prop: PropId) -> Result<Value> {
        if let Some(value) = self.properties[obj].get(&prop) {
            return Ok(value.clone());
        }
        if !self.in_progress.insert((obj, prop)) {
            return Ok(Value::Null);
        }

        let program = self.program;
        let info = &program.program().properties[prop];
        let result = self.eval(obj, &info.expr);
        self.in_progress.remove(&(obj, prop));
        let value = result?;

        if let Some(length) = info.history {
            let track = self.objects[obj].track_id;
            self.history
                .record((prop, track), length, self.frame.index, value.clone());
        }
        self.properties[obj].insert(prop, value.clone());
        Ok(value)
    }

    fn eval(&mut self, obj: usize, expr: &BoundExpr) -> Result<Value> {
        let value = match expr {
            BoundExpr::Literal(value) => value.clone(),
            BoundExpr::Attribute(attr) => attr.read(&self.objects[obj]),
            BoundExpr::SelfObject => Value::Object(self.objects[obj].clone()),
            BoundExpr::Property(prop) => self.property(obj, *prop)?,
            BoundExpr::History { prop, offset } => {
                if *offset == 1 {
                    self.property(obj, *prop)?
                } else {
                    let track = self.objects[obj].track_id;
                    self.history
                        .lookup((*prop, track), *offset, self.frame.index)
                }
            }
            BoundExpr::Model { model, args } => {
                let args = self.eval_all(obj, args)?;
                self.call_model(*model, args)?
            }
            BoundExpr::Builtin { func, args } => {
                let args = self.eval_all(obj, args)?;
                func.call(&args)
            }
            BoundExpr::Compare { left, op, right } => {
                let left = self.eval(obj, left)?;
                let right = self.eval(obj, right)?;
                if left.is_null() || right.is_null() {
                    Value::Null
                } else {
                    Value::Boolean(left.compare(&right, op))
                }
            }
            BoundExpr::Arithmetic { left, op, right } => {
                let left = self.eval(obj, left)?;
                let right = self.eval(obj, right)?;
                left.arithmetic(&right, op)
            }
            BoundExpr::Negate(inner) => match self.eval(obj, inner)? {
                Value::Integer(i) => i.checked_neg().map(Value::Integer).unwrap_or(Value::Null),
                Value::Float(f) => Value::Float(-f),
                _ => Value::Null,
            },
            BoundExpr::Logical { left, op, right } => self.eval_logical(obj, left, op, right)?,
            BoundExpr::Not(inner) => match self.eval(obj, inner)? {
                Value::Boolean(b) => Value::Boolean(!b),
                _ => Value::Null,
            },
            BoundExpr::Like { expr, pattern } => match self.eval(obj, expr)? {
                Value::String(s) => Value::Boolean(like_match(&s, pattern)),
                _ => Value::Null,
            },
            BoundExpr::In { expr, values } => {
                let value = self.eval(obj, expr)?;
                if value.is_null() {
                    Value::Null
                } else {
                    Value::Boolean(
                        values
                            .iter()
                            .any(|v| value.compare(v, &BinaryOperator::Eq)),
                    )
                }
            }
            BoundExpr::Between { expr, min, max } => {
                let value = self.eval(obj, expr)?;
                let min = self.eval(obj, min)?;
                let max = self.eval(obj, max)?;
                if value.is_null() || min.is_null() || max.is_null() {
                    Value::Null
                } else {
                    Value::Boolean(
                        value.compare(&min, &BinaryOperator::Ge)
                            && value.compare(&max, &BinaryOperator::Le),
                    )
                }
            }
            BoundExpr::IsNull { expr, negated } => {
                let value = self.eval(obj, expr)?;
                Value::Boolean(value.is_null() != *negated)
            }
        };
        Ok(value)
    }

    fn eval_all(&mut self, obj: usize, exprs: &[BoundExpr]) -> Result<Vec<Value>> {
        exprs.iter().map(|e| self.eval(obj, e)).collect()
    }

    /// Three-valued AND/OR; the right side is skipped once the left decides
    fn eval_logical(
        &mut self,
        obj: usize,
        left: &BoundExpr,
        op: &LogicalOperator,
        right: &BoundExpr,
    ) -> Result<Value> {
        let decisive = matches!(op, LogicalOperator::Or);
        let left = self.eval(obj, left)?;
        if left == Value::Boolean(decisive) {
            return Ok(left);
        }
        let right = self.eval(obj, right)?;
        if right == Value::Boolean(decisive) {
            return Ok(right);
        }
        match (left, right) {
            (Value::Boolean(_), Value::Boolean(_)) => Ok(Value::Boolean(!decisive)),
            _ => Ok(Value::Null),
        }
    }

    fn call_model(&mut self, id: ModelId, args: Vec<Value>) -> Result<Value> {
        let key = if self.config.memoize_models {
            let key = (id, Value::key_of(&args));
            if let Some(value) = self.model_cache.get(&key) {
                return Ok(value.clone());
            }
            Some(key)
        } else {
            None
        };

        let sig = &self.program.program().models[id];
        let model = self
            .program
            .model(id)
            .ok_or_else(|| Error::UnboundModel(sig.name.clone()))?;
        let value = model
            .infer(self.frame, &args)
            .map_err(|e| Error::model(&sig.name, e))?;
        let value = self.check_result(id, value)?;

        if let Some(key) = key {
            self.model_cache.insert(key, value.clone());
        }
        Ok(value)
    }

    /// Match a model result against the declared return type
    fn check_result(&self, id: ModelId, value: Value) -> Result<Value> {
        if !self.config.strict_model_types || value.is_null() {
            return Ok(value);
        }
        let sig = &self.program.program().models[id];
        match (sig.returns, value) {
            (DataType::Float, Value::Integer(i)) => Ok(Value::Float(i as f64)),
            (expected, value) => {
                if expected == DataType::Any || value.data_type() == Some(expected) {
                    Ok(value)
                } else {
                    Err(Error::TypeMismatch {
                        name: sig.name.clone(),
                        expected: expected.to_string(),
                        found: value.type_name(),
                    })
                }
            }
        }
    }

    /// Stable sort. NULL and incomparable values sort after everything else
    /// in ascending order.
    fn sort(&mut self, objects: Vec<usize>, keys: &[SortKey]) -> Result<Vec<usize>> {
        let mut keyed = Vec::with_capacity(objects.len());
        for obj in objects {
            let mut values = Vec::with_capacity(keys.len());
            for key in keys {
                values.push(self.eval(obj, &key.expr)?);
            }
            keyed.push((obj, values));
        }

        keyed.sort_by(|(_, a), (_, b)| {
            for (key, (a, b)) in keys.iter().zip(a.iter().zip(b)) {
                let ordering = match (a.is_null(), b.is_null()) {
                    (true, true) => Ordering::Equal,
                    (true, false) => Ordering::Greater,
                    (false, true) => Ordering::Less,
                    (false, false) => a.partial_order(b).unwrap_or(Ordering::Equal),
                };
                let ordering = match key.direction {
                    OrderDirection::Asc => ordering,
                    OrderDirection::Desc => ordering.reverse(),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });

        Ok(keyed.into_iter().map(|(obj, _)| obj).collect())
    }

    fn aggregate(&mut self, objects: &[usize], columns: &[OutputColumn]) -> Result<Row> {
        let mut values = Vec::with_capacity(columns.len());
        for column in columns {
            let value = match &column.projection {
                Projection::Aggregate { function, arg: None } => match function {
                    AggregateFunction::Count => Value::Integer(objects.len() as i64),
                    _ => Value::Null,
                },
                Projection::Aggregate {
                    function,
                    arg: Some(expr),
                } => {
                    let mut inputs = Vec::with_capacity(objects.len());
                    for obj in objects {
                        let value = self.eval(*obj, expr)?;
                        if !value.is_null() {
                            inputs.push(value);
                        }
                    }
                    fold_aggregate(*function, &inputs)
                }
                Projection::Expr(_) => Value::Null,
            };
            values.push(value);
        }

        Ok(Row {
            columns: columns.iter().map(|c| c.column.clone()).collect(),
            values,
        })
    }
}

/// Reduce non-NULL inputs
fn fold_aggregate(function: AggregateFunction, inputs: &[Value]) -> Value {
    match function {
        AggregateFunction::Count => Value::Integer(inputs.len() as i64),
        AggregateFunction::Sum => {
            if inputs.is_empty() {
                return Value::Null;
            }
            if inputs.iter().all(|v| matches!(v, Value::Integer(_))) {
                let mut sum = 0i64;
                for v in inputs {
                    if let Value::Integer(i) = v {
                        match sum.checked_add(*i) {
                            Some(s) => sum = s,
                            None => return Value::Null,
                        }
                    }
                }
                Value::Integer(sum)
            } else {
                let numbers: Vec<f64> = inputs.iter().filter_map(Value::as_f64).collect();
                if numbers.is_empty() {
                    Value::Null
                } else {
                    Value::Float(numbers.iter().sum())
                }
            }
        }
        AggregateFunction::Avg => {
            let numbers: Vec<f64> = inputs.iter().filter_map(Value::as_f64).collect();
            if numbers.is_empty() {
                Value::Null
            } else {
                Value::Float(numbers.iter().sum::<f64>() / numbers.len() as f64)
            }
        }
        AggregateFunction::Min | AggregateFunction::Max => {
            let want = if function == AggregateFunction::Min {
                Ordering::Less
            } else {
                Ordering::Greater
            };
            let mut best: Option<&Value> = None;
            for v in inputs {
                best = match best {
                    None => Some(v),
                    Some(current) if v.partial_order(current) == Some(want) => Some(v),
                    Some(current) => Some(current),
                };
            }
            best.cloned().unwrap_or(Value::Null)
        }
    }
}

/// SQL LIKE: `%` matches any run of characters, `_` exactly one
fn like_match(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();

    let (mut t, mut p) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;
    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '_' || pattern[p] == text[t]) {
            t += 1;
            p += 1;
        } else if p < pattern.len() && pattern[p] == '%' {
            backtrack = Some((p, t));
            p += 1;
        } else if let Some((bp, bt)) = backtrack {
            p = bp + 1;
            t = bt + 1;
            backtrack = Some((bp, bt + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|c| *c == '%')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::ReplayDetector;
    use crate::frame::{BBox, Detection};
    use crate::query::{Compiler, Parser};
    use crate::registry::ModelRegistry;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use std::sync::Arc;

    fn car(x: f32) -> Detection {
        Detection::new(BBox::new(x, 0.0, x + 10.0, 10.0), "car", 0.9)
    }

    fn wide_car(x: f32) -> Detection {
        Detection::new(BBox::new(x, 0.0, x + 100.0, 40.0), "car", 0.9)
    }

    fn person(x: f32) -> Detection {
        Detection::new(BBox::new(x, 50.0, x + 4.0, 60.0), "person", 0.7)
    }

    fn executor(source: &str, registry: ModelRegistry) -> Executor {
        executor_with(source, registry, EngineConfig::default())
    }

    fn executor_with(source: &str, registry: ModelRegistry, config: EngineConfig) -> Executor {
        let parsed = Parser::new(source).unwrap().parse().unwrap();
        let compiled = Compiler::with_config(&config).compile(&parsed).unwrap();
        Executor::new(compiled.resolve(&registry).unwrap(), config)
    }

    fn label_is_car() -> Arc<dyn crate::registry::Model> {
        Arc::new(|_: &Frame, args: &[Value]| -> Result<Value> {
            match args.first() {
                Some(Value::Object(obj)) => Ok(Value::Boolean(obj.label == "car")),
                _ => Ok(Value::Null),
            }
        })
    }

    #[test]
    fn test_speeding_cars_over_frames() {
        // One car moves 20px per frame, the other 2px
        let mut detector = ReplayDetector::new();
        for i in 0..4u64 {
            detector.insert(
                i,
                vec![
                    wide_car(i as f32 * 20.0),
                    wide_car(500.0 + i as f32 * 2.0),
                    person(300.0),
                ],
            );
        }
        let mut registry = ModelRegistry::new();
        registry.set_detector(Arc::new(detector));
        registry.register("is_car", label_is_car());

        let mut exec = executor(
            "MODEL is_car(VOBJ) -> BOOL;
             CLASS Car WHERE is_car(self) {
                 HISTORY(2) PROPERTY cx = center_x(bbox);
                 PROPERTY velocity = cx[-1] - cx[-2];
             }
             QUERY speeding SELECT track_id, velocity FROM Car WHERE velocity > 5;
             QUERY cars SELECT COUNT(*) AS n FROM Car;",
            registry,
        );

        let first = exec.process(&Frame::new(0, 0.0)).unwrap();
        // No previous observation yet: velocity is NULL
        assert!(first.rows("speeding").is_empty());
        assert_eq!(first.rows("cars")[0].get("n"), Some(&Value::Integer(2)));

        for i in 1..4 {
            let result = exec.process(&Frame::new(i, i as f64 / 30.0)).unwrap();
            let rows = result.rows("speeding");
            assert_eq!(rows.len(), 1, "frame {}", i);
            assert_eq!(rows[0].get("track_id"), Some(&Value::Integer(1)));
            assert_eq!(rows[0].get("velocity"), Some(&Value::Float(20.0)));
        }
        assert_eq!(exec.frames_processed(), 4);
    }

    #[test]
    fn test_history_advances_regardless_of_where() {
        let detector = ReplayDetector::new()
            .with_frame(1, vec![car(0.0)])
            .with_frame(2, vec![car(1.0)])
            .with_frame(3, vec![car(2.0)]);
        let mut registry = ModelRegistry::new();
        registry.set_detector(Arc::new(detector));

        let mut exec = executor(
            "CLASS Counted {
                 HISTORY(2) PROPERTY seen = coalesce(seen[-2], 0) + 1;
             }
             QUERY late SELECT seen FROM Counted WHERE frame_index >= 3;",
            registry,
        );

        assert!(exec.process(&Frame::new(1, 0.0)).unwrap().rows("late").is_empty());
        assert!(exec.process(&Frame::new(2, 0.0)).unwrap().rows("late").is_empty());
        let result = exec.process(&Frame::new(3, 0.0)).unwrap();
        assert_eq!(result.rows("late")[0].get("seen"), Some(&Value::Integer(3)));
    }

    #[test]
    fn test_inheritance_and_ordering() {
        let detector = ReplayDetector::new().with_frame(
            0,
            vec![
                Detection::new(BBox::new(0.0, 0.0, 10.0, 10.0), "car", 0.95),
                Detection::new(BBox::new(20.0, 0.0, 40.0, 20.0), "car", 0.6),
                Detection::new(BBox::new(50.0, 0.0, 80.0, 30.0), "car", 0.8),
                Detection::new(BBox::new(90.0, 0.0, 95.0, 5.0), "bike", 0.99),
            ],
        );
        let mut registry = ModelRegistry::new();
        registry.set_detector(Arc::new(detector));

        let mut exec = executor(
            "CLASS Car WHERE label = 'car' { PROPERTY size = area(bbox); }
             CLASS Confident EXTENDS Car WHERE score > 0.7 { }
             QUERY big SELECT track_id, size FROM Confident ORDER BY size DESC;
             QUERY smallest SELECT size FROM Car ORDER BY size LIMIT 1 OFFSET 1;",
            registry,
        );

        let result = exec.process(&Frame::new(0, 0.0)).unwrap();
        let sizes: Vec<&Value> = result
            .rows("big")
            .iter()
            .filter_map(|r| r.get("size"))
            .collect();
        assert_eq!(sizes, vec![&Value::Float(900.0), &Value::Float(100.0)]);

        assert_eq!(result.rows("smallest").len(), 1);
        assert_eq!(result.rows("smallest")[0].values, vec![Value::Float(400.0)]);
    }

    #[test]
    fn test_models_are_memoized_per_frame() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let mut registry = ModelRegistry::new();
        registry.set_detector(Arc::new(
            ReplayDetector::new()
                .with_frame(0, vec![car(0.0)])
                .with_frame(1, vec![car(0.0)]),
        ));
        registry.register(
            "slow",
            Arc::new(move |_: &Frame, _: &[Value]| -> Result<Value> {
                counter.fetch_add(1, AtomicOrdering::SeqCst);
                Ok(Value::Float(1.0))
            }),
        );

        let source = "MODEL slow(VOBJ) -> FLOAT;
             QUERY a SELECT slow(self) AS x FROM VObj;
             QUERY b SELECT slow(self) AS y FROM VObj WHERE slow(self) > 0;";

        let mut exec = executor(source, registry.clone());
        exec.process(&Frame::new(0, 0.0)).unwrap();
        assert_eq!(calls.load(AtomicOrdering::SeqCst), 1);
        exec.process(&Frame::new(1, 0.0)).unwrap();
        assert_eq!(calls.load(AtomicOrdering::SeqCst), 2);

        calls.store(0, AtomicOrdering::SeqCst);
        let mut exec = executor_with(
            source,
            registry,
            EngineConfig::default().with_memoize_models(false),
        );
        exec.process(&Frame::new(0, 0.0)).unwrap();
        assert_eq!(calls.load(AtomicOrdering::SeqCst), 3);
    }

    #[test]
    fn test_model_result_types() {
        let mut registry = ModelRegistry::new();
        registry.set_detector(Arc::new(ReplayDetector::new().with_frame(0, vec![car(0.0)])));
        registry.register(
            "speed",
            Arc::new(|_: &Frame, _: &[Value]| -> Result<Value> { Ok(Value::Integer(3)) }),
        );
        registry.register(
            "plate",
            Arc::new(|_: &Frame, _: &[Value]| -> Result<Value> { Ok(Value::Integer(3)) }),
        );

        let mut exec = executor(
            "MODEL speed(VOBJ) -> FLOAT; QUERY q SELECT speed(self) AS s FROM VObj;",
            registry.clone(),
        );
        let result = exec.process(&Frame::new(0, 0.0)).unwrap();
        assert_eq!(result.rows("q")[0].get("s"), Some(&Value::Float(3.0)));

        let mut exec = executor(
            "MODEL plate(VOBJ) -> STRING; QUERY q SELECT plate(self) FROM VObj;",
            registry.clone(),
        );
        let err = exec.process(&Frame::new(0, 0.0)).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { ref name, .. } if name == "plate"));

        let mut exec = executor_with(
            "MODEL plate(VOBJ) -> STRING; QUERY q SELECT plate(self) AS p FROM VObj;",
            registry,
            EngineConfig::default().with_strict_model_types(false),
        );
        let result = exec.process(&Frame::new(0, 0.0)).unwrap();
        assert_eq!(result.rows("q")[0].get("p"), Some(&Value::Integer(3)));
    }

    #[test]
    fn test_model_failure_is_reported() {
        let mut registry = ModelRegistry::new();
        registry.set_detector(Arc::new(ReplayDetector::new().with_frame(0, vec![car(0.0)])));
        registry.register(
            "broken",
            Arc::new(|_: &Frame, _: &[Value]| -> Result<Value> {
                Err(Error::InvalidOperation("weights missing".to_string()))
            }),
        );

        let mut exec = executor(
            "MODEL broken(VOBJ) -> BOOL; CLASS B WHERE broken(self) { } QUERY q SELECT label FROM B;",
            registry,
        );
        let err = exec.process(&Frame::new(0, 0.0)).unwrap_err();
        match err {
            Error::Model { name, message } => {
                assert_eq!(name, "broken");
                assert!(message.contains("weights missing"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_frames_must_increase() {
        let mut registry = ModelRegistry::new();
        registry.set_detector(Arc::new(ReplayDetector::new()));
        let mut exec = executor("QUERY q SELECT label FROM VObj;", registry);

        exec.process(&Frame::new(5, 0.0)).unwrap();
        assert!(matches!(
            exec.process(&Frame::new(5, 0.0)),
            Err(Error::InvalidOperation(_))
        ));
        assert!(exec.process(&Frame::new(4, 0.0)).is_err());
        assert!(exec.process(&Frame::new(9, 0.0)).is_ok());
    }

    #[test]
    fn test_aggregates() {
        let mut registry = ModelRegistry::new();
        registry.set_detector(Arc::new(
            ReplayDetector::new().with_frame(0, vec![car(0.0), car(100.0), person(300.0)]),
        ));
        let mut exec = executor(
            "QUERY stats SELECT COUNT(*) AS n, SUM(track_id) AS ids, AVG(score) AS s,
                 MIN(label) AS lo, MAX(center_x(bbox)) AS far FROM VObj;
             QUERY empty SELECT COUNT(*) AS n, SUM(score) AS total FROM VObj WHERE score > 1;",
            registry,
        );

        let result = exec.process(&Frame::new(0, 0.0)).unwrap();
        let stats = &result.rows("stats")[0];
        assert_eq!(stats.get("n"), Some(&Value::Integer(3)));
        assert_eq!(stats.get("ids"), Some(&Value::Integer(6)));
        assert_eq!(stats.get("lo"), Some(&Value::String("car".into())));
        assert_eq!(stats.get("far"), Some(&Value::Float(302.0)));
        match stats.get("s") {
            Some(Value::Float(avg)) => assert!((avg - (0.9 + 0.9 + 0.7) / 3.0).abs() < 1e-6),
            other => panic!("unexpected AVG: {:?}", other),
        }

        let empty = result.rows("empty");
        assert_eq!(empty.len(), 1);
        assert_eq!(empty[0].get("n"), Some(&Value::Integer(0)));
        assert_eq!(empty[0].get("total"), Some(&Value::Null));
    }

    #[test]
    fn test_histories_are_evicted() {
        let mut registry = ModelRegistry::new();
        registry.set_detector(Arc::new(ReplayDetector::new().with_frame(0, vec![car(0.0)])));
        let mut exec = executor_with(
            "CLASS C { HISTORY(3) PROPERTY x = center_x(bbox); } QUERY q SELECT x FROM C;",
            registry,
            EngineConfig::default().with_max_track_idle_frames(2),
        );

        exec.process(&Frame::new(0, 0.0)).unwrap();
        assert_eq!(exec.history().len(), 1);
        exec.process(&Frame::new(1, 0.0)).unwrap();
        assert_eq!(exec.history().len(), 1);
        exec.process(&Frame::new(5, 0.0)).unwrap();
        assert!(exec.history().is_empty());
    }

    #[test]
    fn test_null_semantics() {
        let mut registry = ModelRegistry::new();
        registry.set_detector(Arc::new(ReplayDetector::new().with_frame(0, vec![car(0.0)])));
        let mut exec = executor(
            "CLASS C { HISTORY(2) PROPERTY x = score; PROPERTY prev = x[-2]; }
             QUERY nulls SELECT prev IS NULL AS missing, prev > 1 AS cmp,
                 NOT (prev > 1) AS negated, prev > 1 OR TRUE AS either,
                 prev > 1 AND FALSE AS both FROM C;",
            registry,
        );
        let result = exec.process(&Frame::new(0, 0.0)).unwrap();
        let row = &result.rows("nulls")[0];
        assert_eq!(row.get("missing"), Some(&Value::Boolean(true)));
        assert_eq!(row.get("cmp"), Some(&Value::Null));
        assert_eq!(row.get("negated"), Some(&Value::Null));
        assert_eq!(row.get("either"), Some(&Value::Boolean(true)));
        assert_eq!(row.get("both"), Some(&Value::Boolean(false)));
    }

    #[test]
    fn test_like_patterns() {
        assert!(like_match("truck", "tr%"));
        assert!(like_match("truck", "%uck"));
        assert!(like_match("truck", "t_u%k"));
        assert!(like_match("", "%"));
        assert!(!like_match("car", "c_"));
        assert!(!like_match("bus", "%car%"));
    }

    #[test]
    fn test_like_and_in() {
        let mut registry = ModelRegistry::new();
        registry.set_detector(Arc::new(
            ReplayDetector::new().with_frame(0, vec![car(0.0), person(100.0)]),
        ));
        let mut exec = executor(
            "QUERY a SELECT label FROM VObj WHERE label LIKE 'c%';
             QUERY b SELECT label FROM VObj WHERE label IN ('person', 'bike');
             QUERY c SELECT label FROM VObj WHERE score BETWEEN 0.8 AND 1.0;",
            registry,
        );
        let result = exec.process(&Frame::new(0, 0.0)).unwrap();
        assert_eq!(result.rows("a")[0].values, vec![Value::String("car".into())]);
        assert_eq!(result.rows("b")[0].values, vec![Value::String("person".into())]);
        assert_eq!(result.rows("c").len(), 1);
    }

    #[test]
    fn test_detector_failure() {
        let mut registry = ModelRegistry::new();
        registry.set_detector(Arc::new(|_: &Frame| -> Result<Vec<Detection>> {
            Err(Error::InvalidOperation("camera offline".to_string()))
        }));
        let mut exec = executor("QUERY q SELECT label FROM VObj;", registry);
        let err = exec.process(&Frame::new(0, 0.0)).unwrap_err();
        assert!(matches!(err, Error::Model { ref name, .. } if name == "objects_in_frame"));
    }
}
