// Copyright 2025 ScriptGate Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Column-major table of named, equal-length columns.
//!
//! This is what `pd::DataFrame(...)` and `table(...)` build, and what bar
//! and tick history from the terminal is usually turned into.
//!
//! # Script API
//!
//! - `t.head()`, `t.head(n)`, `t.tail()`, `t.tail(n)`
//! - `t.sort_values(column)`, `t.sort_values(column, ascending)`
//! - `t.select([columns...])`, `t.row(i)`, `t.to_records()`, `t.to_map()`
//! - `t.columns`, `t.shape`, `t.empty`, `t.len()`
//! - `t["close"]` or `t.close` reads a column; `t["range"] = [...]` adds one

use rhai::{Array, Dynamic, Engine, ImmutableString, Map, INT};
use scriptgate_common::ExceptionKind;

use super::conversions::{count_arg, is_numeric, sort_by_value, type_name};
use super::errors::{exception, type_error, value_error, ScriptResult};
use super::format::text;
use super::types::Record;

/// Rows shown by `head()` and `tail()` without an argument.
const PREVIEW_ROWS: usize = 5;

#[derive(Debug, Clone, Default)]
pub struct Table {
    columns: Vec<String>,
    data: Vec<Vec<Dynamic>>,
    rows: usize,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a table from `(name, values)` pairs. Every column must have the same length.
    pub fn from_columns(columns: Vec<(String, Vec<Dynamic>)>) -> ScriptResult<Self> {
        let mut table = Table::new();
        for (name, values) in columns {
            table.set_column(&name, values)?;
        }
        Ok(table)
    }

    /// Builds a table from maps or records.
    ///
    /// Columns appear in first-seen order; rows missing a column get `()`.
    pub fn from_rows(rows: &[Dynamic]) -> ScriptResult<Self> {
        let mut columns: Vec<String> = Vec::new();
        let mut cells: Vec<Vec<(String, Dynamic)>> = Vec::with_capacity(rows.len());

        for row in rows {
            let fields = row_fields(row)?;
            for (name, _) in &fields {
                if !columns.contains(name) {
                    columns.push(name.clone());
                }
            }
            cells.push(fields);
        }

        let data = columns
            .iter()
            .map(|name| {
                cells
                    .iter()
                    .map(|fields| {
                        fields
                            .iter()
                            .find(|(k, _)| k == name)
                            .map_or(Dynamic::UNIT, |(_, v)| v.clone())
                    })
                    .collect()
            })
            .collect();

        Ok(Self {
            columns,
            data,
            rows: rows.len(),
        })
    }

    /// Builds a table from whatever a script hands to `table(...)`: a
    /// table, a map of columns, or an array of maps or records.
    pub fn from_value(value: &Dynamic) -> ScriptResult<Self> {
        if let Some(table) = value.read_lock::<Table>() {
            return Ok(table.clone());
        }
        if let Some(rows) = value.read_lock::<Array>() {
            return Table::from_rows(&rows);
        }
        if let Some(map) = value.read_lock::<Map>() {
            let columns = map
                .iter()
                .map(|(name, values)| match values.read_lock::<Array>() {
                    Some(values) => Ok((name.to_string(), values.to_vec())),
                    None => Err(type_error(format!(
                        "column '{}' must be an array, not {}",
                        name,
                        type_name(values)
                    ))),
                })
                .collect::<ScriptResult<Vec<_>>>()?;
            return Table::from_columns(columns);
        }
        Err(type_error(format!(
            "cannot build a table from {}",
            type_name(value)
        )))
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0 || self.columns.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<&[Dynamic]> {
        self.columns
            .iter()
            .position(|c| c == name)
            .map(|i| self.data[i].as_slice())
    }

    pub fn require_column(&self, name: &str) -> ScriptResult<&[Dynamic]> {
        self.column(name)
            .ok_or_else(|| exception(ExceptionKind::KeyError, format!("'{}'", name)))
    }

    /// Adds or replaces a column.
    pub fn set_column(&mut self, name: &str, values: Vec<Dynamic>) -> ScriptResult<()> {
        if !self.columns.is_empty() && values.len() != self.rows {
            return Err(value_error(format!(
                "Length of values ({}) does not match length of index ({})",
                values.len(),
                self.rows
            )));
        }
        self.rows = values.len();
        match self.columns.iter().position(|c| c == name) {
            Some(i) => self.data[i] = values,
            None => {
                self.columns.push(name.to_string());
                self.data.push(values);
            }
        }
        Ok(())
    }

    pub fn select(&self, names: &[String]) -> ScriptResult<Table> {
        let mut table = Table::new();
        for name in names {
            table.set_column(name, self.require_column(name)?.to_vec())?;
        }
        table.rows = self.rows;
        Ok(table)
    }

    /// Rows `start..end`, clamped to the table.
    pub fn slice_rows(&self, start: usize, end: usize) -> Table {
        let end = end.min(self.rows);
        let start = start.min(end);
        Table {
            columns: self.columns.clone(),
            data: self.data.iter().map(|c| c[start..end].to_vec()).collect(),
            rows: end - start,
        }
    }

    pub fn head(&self, n: usize) -> Table {
        self.slice_rows(0, n)
    }

    pub fn tail(&self, n: usize) -> Table {
        self.slice_rows(self.rows.saturating_sub(n), self.rows)
    }

    /// Stable sort on one column; `()` cells always sort last.
    pub fn sort_by(&self, column: &str, ascending: bool) -> ScriptResult<Table> {
        let mut keyed: Vec<(Dynamic, usize)> = self
            .require_column(column)?
            .iter()
            .cloned()
            .zip(0..)
            .collect();
        sort_by_value(&mut keyed, |(key, _)| key, !ascending)?;
        let order: Vec<usize> = keyed.into_iter().map(|(_, i)| i).collect();

        Ok(Table {
            columns: self.columns.clone(),
            data: self
                .data
                .iter()
                .map(|c| order.iter().map(|&i| c[i].clone()).collect())
                .collect(),
            rows: self.rows,
        })
    }

    pub fn row(&self, index: usize) -> Record {
        Record::new(
            "row",
            self.columns
                .iter()
                .zip(self.data.iter())
                .map(|(name, column)| (name.clone(), column[index].clone()))
                .collect(),
        )
    }

    pub fn to_records(&self) -> Array {
        (0..self.rows)
            .map(|i| Dynamic::from_map(self.row(i).to_map()))
            .collect()
    }

    /// `#{column: [values...]}`.
    pub fn to_map(&self) -> Map {
        self.columns
            .iter()
            .zip(self.data.iter())
            .map(|(name, column)| (name.as_str().into(), Dynamic::from_array(column.clone())))
            .collect()
    }

    pub fn to_markdown(&self, index: bool) -> String {
        if self.is_empty() {
            return "Empty table".to_string();
        }
        let rows = (0..self.rows)
            .map(|i| self.data.iter().map(|c| c[i].clone()).collect())
            .collect::<Vec<Vec<Dynamic>>>();
        markdown(&self.columns, &rows, index)
    }
}

fn row_fields(row: &Dynamic) -> ScriptResult<Vec<(String, Dynamic)>> {
    if let Some(map) = row.read_lock::<Map>() {
        return Ok(map
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect());
    }
    if let Some(record) = row.read_lock::<Record>() {
        return Ok(record.fields().to_vec());
    }
    Err(type_error(format!(
        "table rows must be maps or records, not {}",
        type_name(row)
    )))
}

/// Renders rows as a pipe table. Numeric columns are right aligned.
pub fn markdown(headers: &[String], rows: &[Vec<Dynamic>], index: bool) -> String {
    let mut header_cells: Vec<String> = Vec::new();
    let mut numeric: Vec<bool> = Vec::new();
    if index {
        header_cells.push(String::new());
        numeric.push(true);
    }
    for (i, name) in headers.iter().enumerate() {
        header_cells.push(name.clone());
        numeric.push(
            rows.iter()
                .all(|r| r.get(i).map_or(true, |v| is_numeric(v) || v.is_unit())),
        );
    }

    let body: Vec<Vec<String>> = rows
        .iter()
        .enumerate()
        .map(|(n, row)| {
            let mut cells = Vec::with_capacity(header_cells.len());
            if index {
                cells.push(n.to_string());
            }
            for i in 0..headers.len() {
                cells.push(row.get(i).map(cell).unwrap_or_default());
            }
            cells
        })
        .collect();

    let widths: Vec<usize> = (0..header_cells.len())
        .map(|i| {
            body.iter()
                .map(|r| r[i].chars().count())
                .chain(std::iter::once(header_cells[i].chars().count()))
                .max()
                .unwrap_or(0)
                .max(3)
        })
        .collect();

    let line = |cells: &[String]| {
        let padded: Vec<String> = cells
            .iter()
            .enumerate()
            .map(|(i, text)| {
                if numeric[i] {
                    format!("{:>width$}", text, width = widths[i])
                } else {
                    format!("{:<width$}", text, width = widths[i])
                }
            })
            .collect();
        format!("| {} |", padded.join(" | "))
    };

    let separator: Vec<String> = widths
        .iter()
        .zip(numeric.iter())
        .map(|(&w, &num)| {
            if num {
                format!("{}:", "-".repeat(w - 1))
            } else {
                format!(":{}", "-".repeat(w - 1))
            }
        })
        .collect();

    let mut out = Vec::with_capacity(body.len() + 2);
    out.push(line(&header_cells));
    out.push(format!("| {} |", separator.join(" | ")));
    for row in &body {
        out.push(line(row));
    }
    out.join("\n")
}

fn cell(value: &Dynamic) -> String {
    text(value).replace('|', "\\|").replace('\n', " ")
}

fn preview_len(function: &str, n: INT) -> ScriptResult<usize> {
    count_arg(function, "n", n)
}

fn column_names(function: &str, names: Array) -> ScriptResult<Vec<String>> {
    names
        .into_iter()
        .map(|name| {
            name.into_immutable_string()
                .map(|s| s.to_string())
                .map_err(|found| type_error(format!("{}() expects column names, found {}", function, found)))
        })
        .collect()
}

pub fn register(engine: &mut Engine) {
    engine
        .register_type_with_name::<Table>("Table")
        .register_fn("head", |t: &mut Table| t.head(PREVIEW_ROWS))
        .register_fn("head", |t: &mut Table, n: INT| -> ScriptResult<Table> {
            Ok(t.head(preview_len("head", n)?))
        })
        .register_fn("tail", |t: &mut Table| t.tail(PREVIEW_ROWS))
        .register_fn("tail", |t: &mut Table, n: INT| -> ScriptResult<Table> {
            Ok(t.tail(preview_len("tail", n)?))
        })
        .register_fn("sort_values", |t: &mut Table, column: ImmutableString| {
            t.sort_by(&column, true)
        })
        .register_fn(
            "sort_values",
            |t: &mut Table, column: ImmutableString, ascending: bool| t.sort_by(&column, ascending),
        )
        .register_fn("select", |t: &mut Table, names: Array| -> ScriptResult<Table> {
            t.select(&column_names("select", names)?)
        })
        .register_fn("row", |t: &mut Table, i: INT| -> ScriptResult<Record> {
            let index = usize::try_from(i).ok().filter(|&i| i < t.len()).ok_or_else(|| {
                exception(
                    ExceptionKind::IndexError,
                    format!("row {} out of range for {} rows", i, t.len()),
                )
            })?;
            Ok(t.row(index))
        })
        .register_fn("to_records", |t: &mut Table| t.to_records())
        .register_fn("to_map", |t: &mut Table| t.to_map())
        .register_fn("len", |t: &mut Table| t.len() as INT)
        .register_get("columns", |t: &mut Table| -> Array {
            t.columns.iter().map(|c| c.as_str().into()).collect()
        })
        .register_get("shape", |t: &mut Table| -> Array {
            vec![Dynamic::from(t.len() as INT), Dynamic::from(t.columns.len() as INT)]
        })
        .register_get("empty", |t: &mut Table| t.is_empty())
        .register_indexer_get(|t: &mut Table, name: ImmutableString| -> ScriptResult<Array> {
            Ok(t.require_column(&name)?.to_vec())
        })
        .register_indexer_set(
            |t: &mut Table, name: ImmutableString, values: Array| -> ScriptResult<()> {
                t.set_column(&name, values)
            },
        )
        .register_fn("to_string", |t: &mut Table| t.to_markdown(true))
        .register_fn("to_debug", |t: &mut Table| t.to_markdown(true));
}

/// Method and property names registered on [`Table`].
pub const METHODS: &[&str] = &[
    "head", "tail", "sort_values", "select", "row", "to_records", "to_map", "len", "columns",
    "shape", "empty",
];
