//! Evaluates parsed read queries against a `MemoryGraph` snapshot.

use std::cmp::Ordering;
use std::collections::HashMap;

use regex::Regex;
use smallvec::SmallVec;

use crate::cypher::ast::*;
use crate::model::*;
use crate::storage::{QueryResult, ResultRow};
use crate::Result;
use super::{store_error, MemoryGraph};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bound {
    Node(NodeId),
    Rel(RelId),
}

/// One partial match.
#[derive(Debug, Clone, Default)]
struct Row {
    vars: HashMap<String, Bound>,
    /// Relationships already traversed; a match never reuses one.
    used: SmallVec<[RelId; 4]>,
}

struct Eval<'g> {
    graph: &'g MemoryGraph,
    params: &'g PropertyMap,
}

pub(super) fn run(graph: &MemoryGraph, query: &ReadQuery, params: &PropertyMap) -> Result<QueryResult> {
    let ev = Eval { graph, params };

    let mut rows = vec![Row::default()];
    for item in &query.start {
        rows = ev.bind_start(rows, item)?;
    }
    for pattern in &query.patterns {
        let mut next = Vec::new();
        for row in rows {
            ev.expand(row, pattern, &mut next);
        }
        rows = next;
    }
    if let Some(pred) = &query.where_clause {
        let mut kept = Vec::with_capacity(rows.len());
        for row in rows {
            if ev.eval(pred, &row)?.is_truthy() {
                kept.push(row);
            }
        }
        rows = kept;
    }

    let columns: Vec<String> = query.returns.iter().map(ReturnItem::column).collect();
    let out = if query.returns.iter().any(|r| r.expr.is_aggregate()) {
        let mut out = ev.aggregate(&rows, &query.returns)?;
        sort_projected(&mut out, &query.returns, &query.order_by)?;
        out
    } else {
        if !query.order_by.is_empty() {
            let mut keyed = Vec::with_capacity(rows.len());
            for row in rows {
                let keys = query
                    .order_by
                    .iter()
                    .map(|o| ev.eval(&o.expr, &row))
                    .collect::<Result<Vec<_>>>()?;
                keyed.push((keys, row));
            }
            keyed.sort_by(|(a, _), (b, _)| compare_keys(a, b, &query.order_by));
            rows = keyed.into_iter().map(|(_, row)| row).collect();
        }
        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let values = query
                .returns
                .iter()
                .map(|r| ev.eval(&r.expr, row))
                .collect::<Result<Vec<_>>>()?;
            out.push(values);
        }
        out
    };

    let skip = ev.count_arg(query.skip.as_ref(), "SKIP")?.unwrap_or(0);
    let limit = ev.count_arg(query.limit.as_ref(), "LIMIT")?.unwrap_or(usize::MAX);
    let rows = out
        .into_iter()
        .skip(skip)
        .take(limit)
        .map(|values| ResultRow { values: columns.iter().cloned().zip(values).collect() })
        .collect();

    Ok(QueryResult { columns, rows })
}

impl Eval<'_> {
    // ========================================================================
    // Matching
    // ========================================================================

    fn bind_start(&self, rows: Vec<Row>, item: &StartItem) -> Result<Vec<Row>> {
        let ids = match self.eval(&item.ids, &Row::default())? {
            Value::List(items) => items,
            single => vec![single],
        };
        let mut nodes = Vec::with_capacity(ids.len());
        for id in ids {
            let id = id
                .as_int()
                .and_then(|i| u64::try_from(i).ok())
                .map(NodeId)
                .ok_or_else(|| store_error(format!("START {}: not a node id: {id}", item.variable)))?;
            if !self.graph.nodes.contains_key(&id) {
                return Err(store_error(format!("Node[{id}] not found")));
            }
            nodes.push(id);
        }
        let mut out = Vec::with_capacity(rows.len() * nodes.len());
        for row in rows {
            for id in &nodes {
                let mut next = row.clone();
                next.vars.insert(item.variable.clone(), Bound::Node(*id));
                out.push(next);
            }
        }
        Ok(out)
    }

    fn expand(&self, row: Row, pattern: &Pattern, out: &mut Vec<Row>) {
        let starts: Vec<NodeId> = match pattern.start.variable.as_ref().and_then(|v| row.vars.get(v)) {
            Some(Bound::Node(id)) => vec![*id],
            Some(Bound::Rel(_)) => return,
            None => self.graph.nodes.keys().copied().collect(),
        };
        for id in starts {
            if let Some(bound) = self.bind_node(row.clone(), &pattern.start, id) {
                self.walk(bound, id, &pattern.steps, out);
            }
        }
    }

    fn walk(&self, row: Row, at: NodeId, steps: &[(RelPattern, NodePattern)], out: &mut Vec<Row>) {
        let Some(((rel_pat, node_pat), rest)) = steps.split_first() else {
            out.push(row);
            return;
        };
        let Some(adjacent) = self.graph.adjacency.get(&at) else {
            return;
        };
        for rel_id in adjacent {
            let Some(rel) = self.graph.rels.get(rel_id) else { continue };
            if row.used.contains(rel_id)
                || !rel_pat.direction.matches(rel, at)
                || (!rel_pat.types.is_empty() && !rel_pat.types.contains(&rel.rel_type))
            {
                continue;
            }
            if let Some(var) = &rel_pat.variable {
                match row.vars.get(var) {
                    Some(Bound::Rel(bound)) if bound != rel_id => continue,
                    Some(Bound::Node(_)) => continue,
                    _ => {}
                }
            }
            let Some(other) = rel.other_node(at) else { continue };
            let mut next = row.clone();
            next.used.push(*rel_id);
            if let Some(var) = &rel_pat.variable {
                next.vars.insert(var.clone(), Bound::Rel(*rel_id));
            }
            if let Some(next) = self.bind_node(next, node_pat, other) {
                self.walk(next, other, rest, out);
            }
        }
    }

    fn bind_node(&self, mut row: Row, pat: &NodePattern, id: NodeId) -> Option<Row> {
        let node = self.graph.nodes.get(&id)?;
        if !pat.labels.iter().all(|l| node.has_label(l)) {
            return None;
        }
        if let Some(var) = &pat.variable {
            match row.vars.get(var) {
                Some(Bound::Node(bound)) if *bound == id => {}
                Some(_) => return None,
                None => {
                    row.vars.insert(var.clone(), Bound::Node(id));
                }
            }
        }
        Some(row)
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    fn eval(&self, expr: &Expr, row: &Row) -> Result<Value> {
        match expr {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Parameter(name) => self
                .params
                .get(name)
                .cloned()
                .ok_or_else(|| store_error(format!("Expected parameter(s): {name}"))),
            Expr::Variable(name) => match row.vars.get(name) {
                Some(Bound::Node(id)) => Ok(self
                    .graph
                    .nodes
                    .get(id)
                    .map(|n| Value::Node(Box::new(n.clone())))
                    .unwrap_or(Value::Null)),
                Some(Bound::Rel(id)) => Ok(self
                    .graph
                    .rels
                    .get(id)
                    .map(|r| Value::Relationship(Box::new(r.clone())))
                    .unwrap_or(Value::Null)),
                None => Err(store_error(format!("Variable `{name}` not defined"))),
            },
            Expr::Property { expr, key } => {
                if let Expr::Variable(name) = expr.as_ref() {
                    let props = match row.vars.get(name) {
                        Some(Bound::Node(id)) => self.graph.nodes.get(id).map(|n| &n.properties),
                        Some(Bound::Rel(id)) => self.graph.rels.get(id).map(|r| &r.properties),
                        None => return Err(store_error(format!("Variable `{name}` not defined"))),
                    };
                    return Ok(props.and_then(|p| p.get(key)).cloned().unwrap_or(Value::Null));
                }
                match self.eval(expr, row)? {
                    Value::Map(m) => Ok(m.get(key).cloned().unwrap_or(Value::Null)),
                    Value::Null => Ok(Value::Null),
                    other => Err(store_error(format!("Type mismatch: expected a map but was {}", other.type_name()))),
                }
            }
            Expr::Compare { left, op, right } => {
                let l = self.eval(left, row)?;
                let r = self.eval(right, row)?;
                compare(&l, *op, &r)
            }
            Expr::And(a, b) => {
                let a = truth(&self.eval(a, row)?);
                let b = truth(&self.eval(b, row)?);
                Ok(match (a, b) {
                    (Some(false), _) | (_, Some(false)) => Value::Bool(false),
                    (Some(true), Some(true)) => Value::Bool(true),
                    _ => Value::Null,
                })
            }
            Expr::Or(a, b) => {
                let a = truth(&self.eval(a, row)?);
                let b = truth(&self.eval(b, row)?);
                Ok(match (a, b) {
                    (Some(true), _) | (_, Some(true)) => Value::Bool(true),
                    (Some(false), Some(false)) => Value::Bool(false),
                    _ => Value::Null,
                })
            }
            Expr::Not(e) => Ok(truth(&self.eval(e, row)?).map(|b| Value::Bool(!b)).unwrap_or(Value::Null)),
            Expr::Count(_) => Err(store_error("count() is only allowed in RETURN".into())),
        }
    }

    fn count_arg(&self, expr: Option<&Expr>, clause: &str) -> Result<Option<usize>> {
        let Some(expr) = expr else { return Ok(None) };
        match self.eval(expr, &Row::default())? {
            Value::Int(n) if n >= 0 => Ok(Some(n as usize)),
            other => Err(store_error(format!("{clause} expects a non-negative integer, got {other}"))),
        }
    }

    // ========================================================================
    // Aggregation
    // ========================================================================

    /// Group by the non-aggregate return items and count the rest.
    fn aggregate(&self, rows: &[Row], items: &[ReturnItem]) -> Result<Vec<Vec<Value>>> {
        let mut groups: Vec<(Vec<Value>, Vec<i64>)> = Vec::new();
        let aggregates = items.iter().filter(|i| i.expr.is_aggregate()).count();
        if rows.is_empty() && aggregates == items.len() {
            groups.push((Vec::new(), vec![0; aggregates]));
        }
        for row in rows {
            let mut key = Vec::new();
            let mut hits = Vec::with_capacity(aggregates);
            for item in items {
                match &item.expr {
                    Expr::Count(e) => hits.push(i64::from(!self.eval(e, row)?.is_null())),
                    e => key.push(self.eval(e, row)?),
                }
            }
            match groups.iter_mut().find(|(k, _)| *k == key) {
                Some((_, counts)) => counts.iter_mut().zip(hits).for_each(|(c, h)| *c += h),
                None => groups.push((key, hits)),
            }
        }

        Ok(groups
            .into_iter()
            .map(|(key, counts)| {
                let (mut key, mut counts) = (key.into_iter(), counts.into_iter());
                items
                    .iter()
                    .map(|item| {
                        let next = if item.expr.is_aggregate() {
                            counts.next().map(Value::Int)
                        } else {
                            key.next()
                        };
                        next.unwrap_or(Value::Null)
                    })
                    .collect()
            })
            .collect())
    }
}

/// ORDER BY after aggregation; every key must name a returned column.
fn sort_projected(out: &mut [Vec<Value>], items: &[ReturnItem], order: &[OrderExpr]) -> Result<()> {
    if order.is_empty() {
        return Ok(());
    }
    let mut positions = Vec::with_capacity(order.len());
    for o in order {
        let text = o.expr.to_string();
        let pos = items
            .iter()
            .position(|i| i.expr == o.expr || i.column() == text)
            .ok_or_else(|| store_error(format!("ORDER BY {text} is not a returned column")))?;
        positions.push(pos);
    }
    out.sort_by(|a, b| {
        let ka: Vec<Value> = positions.iter().map(|&p| a[p].clone()).collect();
        let kb: Vec<Value> = positions.iter().map(|&p| b[p].clone()).collect();
        compare_keys(&ka, &kb, order)
    });
    Ok(())
}

fn compare_keys(a: &[Value], b: &[Value], order: &[OrderExpr]) -> Ordering {
    for ((x, y), o) in a.iter().zip(b).zip(order) {
        let ord = order_values(x, y);
        let ord = if o.descending { ord.reverse() } else { ord };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Total order for sorting: comparable values by value, nulls last,
/// otherwise by type name.
fn order_values(a: &Value, b: &Value) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        _ => a
            .neo4j_cmp(b)
            .unwrap_or_else(|| a.type_name().cmp(b.type_name())),
    }
}

fn truth(v: &Value) -> Option<bool> {
    match v {
        Value::Bool(b) => Some(*b),
        _ => None,
    }
}

fn compare(l: &Value, op: CompareOp, r: &Value) -> Result<Value> {
    let out = match op {
        CompareOp::Eq => l.neo4j_eq(r),
        CompareOp::Neq => l.neo4j_eq(r).map(|b| !b),
        CompareOp::Lt => l.neo4j_cmp(r).map(|o| o == Ordering::Less),
        CompareOp::Lte => l.neo4j_cmp(r).map(|o| o != Ordering::Greater),
        CompareOp::Gt => l.neo4j_cmp(r).map(|o| o == Ordering::Greater),
        CompareOp::Gte => l.neo4j_cmp(r).map(|o| o != Ordering::Less),
        CompareOp::Regex => match (l, r) {
            (Value::String(text), Value::String(pattern)) => {
                let re = Regex::new(&format!("^(?:{pattern})$"))
                    .map_err(|e| store_error(format!("Invalid regular expression '{pattern}': {e}")))?;
                Some(re.is_match(text))
            }
            _ => None,
        },
    };
    Ok(out.map(Value::Bool).unwrap_or(Value::Null))
}
