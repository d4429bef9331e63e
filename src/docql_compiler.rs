//! DocQL AST-to-plan compiler.
//!
//! Resolves every collection and field reference against the schema
//! store and lowers the AST to a relational plan: an ordered projection
//! (each output column carrying the field type that decodes it), a FROM
//! set accumulated idempotently from every referenced collection, and a
//! SQL filter predicate. All resolution errors are raised here, never at
//! execution time.
//!
//! The compiler is an explicit context threaded through the recursive
//! traversal; it owns the projection list, the FROM set, and the
//! implicit current collection used to resolve unqualified fields.

use crate::collection::Collection;
use crate::database::Database;
use crate::docql_ast::*;
use crate::error::{Error, Result};
use crate::field_type::FieldType;
use std::collections::HashMap;

/// One projected column of a compiled plan.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputColumn {
    /// Output name: `collection.field`, or the `as` alias.
    pub name: String,
    /// Source column expression, `table.field`.
    pub expr: String,
    /// Declared type of the source field; drives result decoding.
    pub field_type: FieldType,
}

/// A compiled, executable query plan. The plan is declarative; running
/// its SQL and decoding the rows is the database's concern.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub columns: Vec<OutputColumn>,
    /// Source tables, in first-reference order.
    pub from: Vec<String>,
    /// SQL filter predicate, if the query had a `where` clause.
    pub filter: Option<String>,
}

impl Plan {
    /// Assemble the SQL statement this plan describes.
    pub fn sql(&self) -> String {
        let mut sql = String::from("SELECT ");
        if self.columns.is_empty() {
            sql.push('*');
        } else {
            let exprs = self
                .columns
                .iter()
                .map(|c| c.expr.as_str())
                .collect::<Vec<_>>();
            sql.push_str(&exprs.join(", "));
        }
        if !self.from.is_empty() {
            sql.push_str(" FROM ");
            sql.push_str(&self.from.join(", "));
        }
        if let Some(filter) = &self.filter {
            sql.push_str(" WHERE ");
            sql.push_str(filter);
        }
        sql
    }
}

/// Compile a parsed query against the database's schema.
pub fn compile(db: &Database, query: &Query) -> Result<Plan> {
    Compiler::new(db).compile(query)
}

struct Compiler<'a> {
    db: &'a Database,
    cache: HashMap<String, Collection>,
    columns: Vec<OutputColumn>,
    /// (table, collection) pairs, in first-reference order.
    from: Vec<(String, String)>,
    current: Option<String>,
    /// Whether the traversal is inside the `where` clause. Only there
    /// may a collection reference establish the implicit current
    /// collection.
    in_where: bool,
}

impl<'a> Compiler<'a> {
    fn new(db: &'a Database) -> Self {
        Compiler {
            db,
            cache: HashMap::new(),
            columns: Vec::new(),
            from: Vec::new(),
            current: None,
            in_where: false,
        }
    }

    fn compile(mut self, query: &Query) -> Result<Plan> {
        if let Some(items) = &query.select {
            // A select of only bare collections, all naming the same
            // collection, establishes the implicit current collection.
            if items
                .iter()
                .all(|item| matches!(item, SelectItem::Collection(_)))
            {
                let mut names = items.iter().filter_map(|item| match item {
                    SelectItem::Collection(name) => Some(name),
                    _ => None,
                });
                if let Some(first) = names.next() {
                    if names.all(|name| name == first) {
                        self.current = Some(first.clone());
                    }
                }
            }
            for item in items {
                self.select_item(item)?;
            }
        }
        let filter = match &query.where_clause {
            Some(expr) => {
                self.in_where = true;
                Some(self.bool_expr(expr)?)
            }
            None => None,
        };
        if query.select.is_none() {
            // No projection was written; project every field of every
            // collection the filter referenced.
            for (_, collection) in self.from.clone() {
                self.expand_collection(&collection)?;
            }
        }
        if self.from.is_empty() {
            return Err(Error::InvalidOperand(
                "query references no collection".to_string(),
            ));
        }
        Ok(Plan {
            columns: self.columns,
            from: self.from.into_iter().map(|(table, _)| table).collect(),
            filter,
        })
    }

    fn lookup(&mut self, collection: &str) -> Result<Collection> {
        if let Some(handle) = self.cache.get(collection) {
            return Ok(handle.clone());
        }
        let handle = self.db.require_collection(collection)?;
        self.cache.insert(collection.to_string(), handle.clone());
        Ok(handle)
    }

    /// Resolve an optionally-qualified field reference to its collection
    /// handle. Inside `where`, the first explicitly named collection
    /// becomes the implicit current collection; a qualified field in
    /// `select` never does.
    fn resolve(&mut self, collection: &Option<String>, field: &str) -> Result<Collection> {
        let name = match collection {
            Some(name) => name.clone(),
            None => self
                .current
                .clone()
                .ok_or_else(|| Error::AmbiguousField(field.to_string()))?,
        };
        let handle = self.lookup(&name)?;
        if self.in_where && self.current.is_none() {
            self.current = Some(name);
        }
        Ok(handle)
    }

    fn add_from(&mut self, handle: &Collection) {
        if !self.from.iter().any(|(table, _)| table == handle.table()) {
            self.from
                .push((handle.table().to_string(), handle.name().to_string()));
        }
    }

    fn push_column(&mut self, name: String, expr: String, field_type: FieldType) {
        if !self
            .columns
            .iter()
            .any(|c| c.expr == expr && c.name == name)
        {
            self.columns.push(OutputColumn {
                name,
                expr,
                field_type,
            });
        }
    }

    fn select_item(&mut self, item: &SelectItem) -> Result<()> {
        match item {
            SelectItem::Collection(name) => self.expand_collection(name),
            SelectItem::Field {
                collection,
                field,
                alias,
            } => {
                let handle = self.resolve(collection, field)?;
                let field_type = self.field_type(&handle, field)?;
                self.add_from(&handle);
                let name = match alias {
                    Some(alias) => alias.clone(),
                    None => format!("{}.{}", handle.name(), field),
                };
                self.push_column(name, format!("{}.{}", handle.table(), field), field_type);
                Ok(())
            }
        }
    }

    /// A bare collection in `select` expands to all of its fields.
    fn expand_collection(&mut self, collection: &str) -> Result<()> {
        let handle = self.lookup(collection)?;
        self.add_from(&handle);
        for def in handle.fields() {
            self.push_column(
                format!("{}.{}", handle.name(), def.name),
                format!("{}.{}", handle.table(), def.name),
                def.field_type,
            );
        }
        Ok(())
    }

    fn field_type(&self, handle: &Collection, field: &str) -> Result<FieldType> {
        handle
            .field_type(field)
            .ok_or_else(|| Error::UnknownField {
                collection: handle.name().to_string(),
                field: field.to_string(),
            })
    }

    fn bool_expr(&mut self, expr: &BoolExpr) -> Result<String> {
        match expr {
            BoolExpr::Condition(condition) => self.condition(condition),
            BoolExpr::And(left, right) => {
                Ok(format!("{} AND {}", self.group(left)?, self.group(right)?))
            }
            BoolExpr::Or(left, right) => {
                Ok(format!("{} OR {}", self.group(left)?, self.group(right)?))
            }
        }
    }

    /// Parenthesize compound subexpressions so the emitted SQL keeps the
    /// AST's grouping instead of SQL's own and/or precedence.
    fn group(&mut self, expr: &BoolExpr) -> Result<String> {
        let sql = self.bool_expr(expr)?;
        Ok(match expr {
            BoolExpr::Condition(_) => sql,
            _ => format!("({})", sql),
        })
    }

    fn condition(&mut self, condition: &Condition) -> Result<String> {
        match condition {
            Condition::Compare { left, op, right } => {
                let left = self.operand(left)?;
                let right = self.operand(right)?;
                Ok(format!("{} {} {}", left, op.as_sql(), right))
            }
            Condition::In { left, right } => {
                let left = self.operand(left)?;
                match right {
                    Operand::Field { collection, field } => {
                        let handle = self.resolve(collection, field)?;
                        let field_type = self.field_type(&handle, field)?;
                        if !field_type.is_list() {
                            return Err(Error::InOperandNotList {
                                collection: handle.name().to_string(),
                                field: field.clone(),
                            });
                        }
                        self.add_from(&handle);
                        let side = Collection::list_table(handle.table(), field);
                        Ok(format!(
                            "{} IN (SELECT value FROM {} WHERE {}.list = {}.rowid)",
                            left,
                            side,
                            side,
                            handle.table()
                        ))
                    }
                    Operand::Collection(name) => {
                        // Membership only: the collection stays out of
                        // the outer FROM, or every row of it would
                        // multiply the result.
                        let handle = self.lookup(name)?;
                        if self.current.is_none() {
                            self.current = Some(name.clone());
                        }
                        Ok(format!("{} IN (SELECT _ref FROM {})", left, handle.table()))
                    }
                    other => Err(Error::InvalidOperand(other.describe())),
                }
            }
        }
    }

    fn operand(&mut self, operand: &Operand) -> Result<String> {
        match operand {
            Operand::Field { collection, field } => {
                let handle = self.resolve(collection, field)?;
                self.field_type(&handle, field)?;
                self.add_from(&handle);
                Ok(format!("{}.{}", handle.table(), field))
            }
            Operand::Collection(name) => {
                let handle = self.lookup(name)?;
                if self.current.is_none() {
                    self.current = Some(name.clone());
                }
                self.add_from(&handle);
                Ok(format!("{}._ref", handle.table()))
            }
            Operand::Str(s) => Ok(format!("'{}'", s.replace('\'', "''"))),
            Operand::Int(n) => Ok(n.to_string()),
            Operand::Placeholder => Ok("?".to_string()),
        }
    }
}
