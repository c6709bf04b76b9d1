//! Result tables and the post-processing applied to them.
//!
//! A [Table] is a polars [DataFrame] plus the name of the column that
//! identifies its rows. Row count and order always come from whoever
//! built the table; `derive`, `filter` and `left_join` never reorder.

use crate::SlideruleError;
use polars::prelude::{
    col, lit, AnyValue, DataFrame, DataType, Expr, IntoColumn, IntoLazy, JoinArgs, JoinType,
    NamedFrom, Series, SortMultipleOptions,
};
use records::{Record, Value};
use std::{collections::HashSet, fmt};

/// Row position carried through joins.
const ROW: &str = "__row";

/// A single defined value.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Float(f64),
    Int(i64),
    Text(String),
}

impl Scalar {
    fn to_expr(&self) -> Expr {
        match self {
            Self::Float(v) => lit(*v),
            Self::Int(v) => lit(*v),
            Self::Text(v) => lit(v.clone()),
        }
    }

    fn from_any(value: AnyValue<'_>) -> Option<Self> {
        match value {
            AnyValue::Float64(v) => Some(Self::Float(v)),
            AnyValue::Float32(v) => Some(Self::Float(f64::from(v))),
            AnyValue::Int64(v) => Some(Self::Int(v)),
            AnyValue::Int32(v) => Some(Self::Int(i64::from(v))),
            AnyValue::Int16(v) => Some(Self::Int(i64::from(v))),
            AnyValue::Int8(v) => Some(Self::Int(i64::from(v))),
            AnyValue::UInt32(v) => Some(Self::Int(i64::from(v))),
            AnyValue::UInt16(v) => Some(Self::Int(i64::from(v))),
            AnyValue::UInt8(v) => Some(Self::Int(i64::from(v))),
            AnyValue::String(v) => Some(Self::Text(v.to_owned())),
            AnyValue::StringOwned(v) => Some(Self::Text(v.to_string())),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Float(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
        }
    }
}

macro_rules! scalar_from {
    ($variant:ident, $cast:ty, $($t:ty),+) => {
        $(impl From<$t> for Scalar {
            fn from(v: $t) -> Self {
                Self::$variant(<$cast>::from(v))
            }
        })+
    };
}

scalar_from!(Int, i64, i64, i32, i16, i8, u32, u16, u8);
scalar_from!(Float, f64, f64, f32);

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// `column == value`.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub column: String,
    pub value: Scalar,
}

impl Predicate {
    pub fn eq(column: impl Into<String>, value: impl Into<Scalar>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }

    fn to_expr(&self) -> Expr {
        col(self.column.as_str()).eq(self.value.to_expr())
    }
}

/// Column values gathered from records before they become a [Series].
enum Values {
    Float(Vec<Option<f64>>),
    Int(Vec<Option<i64>>),
    Text(Vec<Option<String>>),
}

impl Values {
    fn for_value(value: &Value, rows: usize) -> Option<Self> {
        match value {
            Value::Int(_) | Value::UInt(_) | Value::Time(_) => Some(Self::Int(vec![None; rows])),
            Value::Float(_) => Some(Self::Float(vec![None; rows])),
            Value::Str(_) => Some(Self::Text(vec![None; rows])),
            Value::Array(_) | Value::Record(_) => None,
        }
    }

    fn push(&mut self, value: Option<&Value>) {
        match self {
            Self::Float(v) => v.push(value.and_then(Value::as_f64)),
            Self::Int(v) => v.push(value.and_then(Value::as_i64)),
            Self::Text(v) => v.push(value.and_then(Value::as_str).map(str::to_owned)),
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn widen(&mut self) {
        if let Self::Int(v) = self {
            let widened = v.iter().map(|i| i.map(|i| i as f64)).collect();
            *self = Self::Float(widened);
        }
    }

    fn into_series(self, name: &str) -> Series {
        match self {
            Self::Float(v) => Series::new(name.into(), v),
            Self::Int(v) => Series::new(name.into(), v),
            Self::Text(v) => Series::new(name.into(), v),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Table {
    frame: DataFrame,
    index: Option<String>,
}

impl Default for Table {
    fn default() -> Self {
        Self {
            frame: DataFrame::empty(),
            index: None,
        }
    }
}

impl PartialEq for Table {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.frame.equals_missing(&other.frame)
    }
}

impl From<DataFrame> for Table {
    fn from(frame: DataFrame) -> Self {
        Self { frame, index: None }
    }
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a table with one row per record.
    ///
    /// Every scalar field becomes a column. A column first seen as
    /// integer is widened to float if a later record holds a float.
    /// Unsigned 64-bit values are kept bit for bit as `i64`.
    pub fn from_records<'a, I>(records: I) -> Result<Self, SlideruleError>
    where
        I: IntoIterator<Item = &'a Record>,
    {
        let mut columns: Vec<(String, Values)> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut rows = 0;
        for rec in records {
            for (name, value) in &rec.fields {
                if !value.is_scalar() || seen.contains(name) {
                    continue;
                }
                if let Some(values) = Values::for_value(value, rows) {
                    seen.insert(name.clone());
                    columns.push((name.clone(), values));
                }
            }
            for (name, values) in &mut columns {
                let value = rec.get(name);
                if let (Values::Int(_), Some(Value::Float(_))) = (&*values, value) {
                    values.widen();
                }
                values.push(value);
            }
            rows += 1;
        }
        let frame = DataFrame::new(
            columns
                .into_iter()
                .map(|(name, values)| values.into_series(&name).into_column())
                .collect(),
        )?;
        Ok(Self::from(frame))
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn into_frame(self) -> DataFrame {
        self.frame
    }

    pub fn len(&self) -> usize {
        self.frame.height()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.frame.get_columns().iter().map(|c| c.name().as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.frame.get_column_index(name).is_some()
    }

    pub fn column(&self, name: &str) -> Result<&Series, SlideruleError> {
        self.frame
            .column(name)
            .map(|c| c.as_materialized_series())
            .map_err(|_| SlideruleError::MissingColumn(name.to_owned()))
    }

    /// Adds `series` as `name`, replacing any existing column of the
    /// same name.
    pub fn push_column(
        &mut self,
        name: impl Into<String>,
        mut series: Series,
    ) -> Result<(), SlideruleError> {
        let name = name.into();
        if self.frame.width() == 0 {
            series.rename(name.as_str().into());
            self.frame = DataFrame::new(vec![series.into_column()])?;
            return Ok(());
        }
        if series.len() != self.len() {
            return Err(SlideruleError::Length {
                name,
                expected: self.len(),
                actual: series.len(),
            });
        }
        series.rename(name.as_str().into());
        self.frame.with_column(series)?;
        Ok(())
    }

    pub fn rename(&mut self, from: &str, to: impl Into<String>) -> Result<(), SlideruleError> {
        if !self.contains(from) {
            return Err(SlideruleError::MissingColumn(from.to_owned()));
        }
        let to = to.into();
        self.frame.rename(from, to.as_str().into())?;
        if self.index.as_deref() == Some(from) {
            self.index = Some(to);
        }
        Ok(())
    }

    /// Names the column that identifies rows.
    pub fn set_index(&mut self, name: &str) -> Result<(), SlideruleError> {
        self.column(name)?;
        self.index = Some(name.to_owned());
        Ok(())
    }

    pub fn index_name(&self) -> Option<&str> {
        self.index.as_deref()
    }

    pub fn index(&self) -> Option<&Series> {
        self.index.as_deref().and_then(|name| self.column(name).ok())
    }

    /// Reorders rows by ascending index.
    pub fn sort_by_index(&mut self) -> Result<(), SlideruleError> {
        if let Some(index) = &self.index {
            self.frame = self
                .frame
                .clone()
                .lazy()
                .sort_by_exprs(
                    vec![col(index.as_str())],
                    SortMultipleOptions::default().with_maintain_order(true),
                )
                .collect()?;
        }
        Ok(())
    }

    /// Values of a numeric column as floats.
    pub fn f64_values(&self, name: &str) -> Result<Vec<Option<f64>>, SlideruleError> {
        let floats = self.numeric(name)?.cast(&DataType::Float64)?;
        let values = floats.f64()?.into_iter().collect();
        Ok(values)
    }

    /// Values of an integer column.
    pub fn i64_values(&self, name: &str) -> Result<Vec<Option<i64>>, SlideruleError> {
        let ints = self.numeric(name)?.cast(&DataType::Int64)?;
        let values = ints.i64()?.into_iter().collect();
        Ok(values)
    }

    /// Values of a text column.
    pub fn str_values(&self, name: &str) -> Result<Vec<Option<String>>, SlideruleError> {
        let values = self
            .column(name)?
            .str()?
            .into_iter()
            .map(|v| v.map(str::to_owned))
            .collect();
        Ok(values)
    }

    /// Adds float column `name = a - b`.
    ///
    /// A row is undefined wherever either operand is undefined.
    pub fn derive(&mut self, name: &str, a: &str, b: &str) -> Result<(), SlideruleError> {
        self.numeric(a)?;
        self.numeric(b)?;
        let delta = col(a).cast(DataType::Float64) - col(b).cast(DataType::Float64);
        self.frame = self
            .frame
            .clone()
            .lazy()
            .with_column(delta.alias(name))
            .collect()?;
        Ok(())
    }

    /// Returns the rows matching every predicate, in their original
    /// order.
    pub fn filter(&self, predicates: &[Predicate]) -> Result<Table, SlideruleError> {
        for p in predicates {
            self.column(&p.column)?;
        }
        let Some(conjunction) = predicates.iter().map(Predicate::to_expr).reduce(|a, b| a.and(b)) else {
            return Ok(self.clone());
        };
        let frame = self.frame.clone().lazy().filter(conjunction).collect()?;
        Ok(Table {
            frame,
            index: self.index.clone(),
        })
    }

    /// Left join on `key`.
    ///
    /// Every row of `self` appears once, in order. Columns of `right`
    /// are appended from its first row with an equal key, or left
    /// undefined. Names present in both tables get `lsuffix` on the
    /// left and `rsuffix` on the right; the join fails if the result
    /// would still hold two columns of the same name.
    pub fn left_join(
        &self,
        right: &Table,
        key: &str,
        lsuffix: &str,
        rsuffix: &str,
    ) -> Result<Table, SlideruleError> {
        self.column(key)?;
        right.column(key)?;

        let collides = |name: &str| name != key && self.contains(name) && right.contains(name);
        let left_names: Vec<String> = self
            .names()
            .map(|name| {
                if collides(name) {
                    format!("{name}{lsuffix}")
                } else {
                    name.to_owned()
                }
            })
            .collect();
        let right_names: Vec<String> = right
            .names()
            .map(|name| {
                if collides(name) {
                    format!("{name}{rsuffix}")
                } else {
                    name.to_owned()
                }
            })
            .collect();

        let mut out_names: HashSet<&str> = HashSet::new();
        let right_values = right_names.iter().filter(|&name| name != key);
        for name in left_names.iter().chain(right_values) {
            if !out_names.insert(name.as_str()) {
                return Err(SlideruleError::Collision(name.clone()));
            }
        }

        let index = self.index.as_deref().and_then(|index| {
            self.names()
                .zip(&left_names)
                .find(|&(name, _)| name == index)
                .map(|(_, out)| out.clone())
        });
        let mut left_frame = self.frame.clone();
        left_frame.set_column_names(left_names.iter().map(String::as_str))?;
        let mut right_frame = right.frame.clone();
        right_frame.set_column_names(right_names.iter().map(String::as_str))?;

        let firsts = right_frame.lazy().filter(col(key).is_first_distinct());
        let mut frame = left_frame
            .lazy()
            .with_row_index(ROW, None)
            .join(
                firsts,
                [col(key)],
                [col(key)],
                JoinArgs::new(JoinType::Left),
            )
            .sort_by_exprs(vec![col(ROW)], SortMultipleOptions::default())
            .collect()?;
        frame = frame.drop(ROW)?;
        Ok(Table { frame, index })
    }

    /// Distinct defined values of `name` in first-seen order.
    pub fn unique(&self, name: &str) -> Result<Vec<Scalar>, SlideruleError> {
        let unique = self.column(name)?.unique_stable()?;
        Ok(unique.iter().filter_map(Scalar::from_any).collect())
    }
}

impl Table {
    fn numeric(&self, name: &str) -> Result<&Series, SlideruleError> {
        let series = self.column(name)?;
        let dtype = series.dtype();
        if dtype.is_float() || dtype.is_integer() {
            Ok(series)
        } else {
            Err(SlideruleError::NotNumeric(name.to_owned()))
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.frame)
    }
}
