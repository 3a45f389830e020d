use linked_hash_map::LinkedHashMap;

use crate::common::types::Rid;
use crate::query::executor::{ExecutionError, Executor};
use crate::storage::tuple::{Tuple, Value};

/// An aggregate over one input column (or the whole row for `CountStar`).
#[derive(Debug, Clone, Copy)]
pub enum Aggregate {
    CountStar,
    Count(usize),
    Sum(usize),
    Min(usize),
    Max(usize),
}

impl Aggregate {
    fn initial(&self) -> Value {
        match self {
            Aggregate::CountStar | Aggregate::Count(_) | Aggregate::Sum(_) => Value::Integer(0),
            Aggregate::Min(_) | Aggregate::Max(_) => Value::Null,
        }
    }

    fn combine(&self, accumulator: &mut Value, tuple: &Tuple) {
        match self {
            Aggregate::CountStar => {
                if let Value::Integer(count) = accumulator {
                    *count += 1;
                }
            }
            Aggregate::Count(column) => {
                if !tuple.value(*column).is_null() {
                    if let Value::Integer(count) = accumulator {
                        *count += 1;
                    }
                }
            }
            Aggregate::Sum(column) => {
                if let (Value::Integer(sum), Value::Integer(v)) =
                    (&mut *accumulator, tuple.value(*column))
                {
                    *sum += v;
                }
            }
            Aggregate::Min(column) => {
                let value = tuple.value(*column);
                if !value.is_null() && (accumulator.is_null() || value < &*accumulator) {
                    *accumulator = value.clone();
                }
            }
            Aggregate::Max(column) => {
                let value = tuple.value(*column);
                if !value.is_null() && (accumulator.is_null() || value > &*accumulator) {
                    *accumulator = value.clone();
                }
            }
        }
    }
}

/// Filter applied to `(group values, aggregate values)` before emitting.
pub type HavingPredicate = Box<dyn Fn(&[Value], &[Value]) -> bool + Send + Sync>;

/// Hash aggregation: drains the child at init, groups rows by the given
/// columns, and emits one row per group (`group values ++ aggregates`) in
/// first-seen group order.
pub struct AggregationExecutor {
    child: Box<dyn Executor>,
    group_by: Vec<usize>,
    aggregates: Vec<Aggregate>,
    having: Option<HavingPredicate>,
    groups: Vec<(Vec<Value>, Vec<Value>)>,
    position: usize,
}

impl AggregationExecutor {
    pub fn new(
        child: Box<dyn Executor>,
        group_by: Vec<usize>,
        aggregates: Vec<Aggregate>,
        having: Option<HavingPredicate>,
    ) -> Self {
        Self {
            child,
            group_by,
            aggregates,
            having,
            groups: Vec::new(),
            position: 0,
        }
    }
}

impl Executor for AggregationExecutor {
    fn init(&mut self) -> Result<(), ExecutionError> {
        self.child.init()?;

        let mut table: LinkedHashMap<Vec<Value>, Vec<Value>> = LinkedHashMap::new();
        while let Some((tuple, _)) = self.child.next()? {
            let key: Vec<Value> = self
                .group_by
                .iter()
                .map(|column| tuple.value(*column).clone())
                .collect();

            let accumulators = table
                .entry(key)
                .or_insert_with(|| self.aggregates.iter().map(|a| a.initial()).collect());
            for (aggregate, accumulator) in self.aggregates.iter().zip(accumulators.iter_mut()) {
                aggregate.combine(accumulator, &tuple);
            }
        }

        self.groups = table.into_iter().collect();
        self.position = 0;
        Ok(())
    }

    fn next(&mut self) -> Result<Option<(Tuple, Rid)>, ExecutionError> {
        while self.position < self.groups.len() {
            let (group, aggregates) = &self.groups[self.position];
            self.position += 1;

            let keep = self
                .having
                .as_ref()
                .map_or(true, |having| having(group, aggregates));
            if keep {
                let mut values = group.clone();
                values.extend(aggregates.iter().cloned());
                return Ok(Some((Tuple::new(values), Rid::INVALID)));
            }
        }
        Ok(None)
    }
}
