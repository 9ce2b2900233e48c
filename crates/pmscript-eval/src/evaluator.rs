//! Core expression and statement evaluator.

use std::rc::Rc;

use pmscript_types::ast::*;

use crate::builtins::{
    call_global, call_number_method, call_string_method, code_unit_at, code_unit_count,
    code_units, construct_error, own_entries, push_capped, string_too_long, ARRAY_METHODS,
    MAX_COLLECTION_LENGTH, NUMBER_METHODS, STRING_METHODS,
};
use crate::config::RunnerConfig;
use crate::env::Scope;
use crate::error::{EvalError, EvalResult};
use crate::exchange::Exchange;
use crate::test_runner::{LogEntry, RunOutcome, TestResult};
use crate::value::{
    array_index, Closure, ErrorKind, Function, GlobalFn, HostObject, ObjectMap, Value,
};
use crate::variables::VariableStore;

/// The tree-walking evaluator for one script run.
///
/// Owns the run's copy of the variables and the results recorded so far;
/// borrows the exchange for the lifetime of the run.
pub struct Evaluator<'run> {
    /// Innermost scope of the code currently executing.
    scope: Scope,
    config: RunnerConfig,
    /// Steps consumed so far, checked against `config.step_budget`.
    steps: u64,
    call_depth: usize,
    exchange: &'run Exchange,
    pub(crate) variables: VariableStore,
    pub(crate) results: Vec<TestResult>,
    pub(crate) logs: Vec<LogEntry>,
    /// `pm.response.json()`, decoded on first use.
    pub(crate) json_body: Option<Value>,
}

/// An assignable location.
enum Place {
    Binding(String),
    Property(Value, String),
}

impl<'run> Evaluator<'run> {
    pub fn new(exchange: &'run Exchange, variables: VariableStore, config: RunnerConfig) -> Self {
        let scope = Scope::global();
        install_globals(&scope);
        Self {
            scope,
            config,
            steps: 0,
            call_depth: 0,
            exchange,
            variables,
            results: Vec::new(),
            logs: Vec::new(),
            json_body: None,
        }
    }

    pub(crate) fn exchange(&self) -> &'run Exchange {
        self.exchange
    }

    pub(crate) fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn results(&self) -> &[TestResult] {
        &self.results
    }

    pub fn variables(&self) -> &VariableStore {
        &self.variables
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Hand back everything the run produced.
    pub fn into_outcome(self) -> RunOutcome {
        RunOutcome {
            test_results: self.results,
            updated_variables: self.variables,
            logs: self.logs,
        }
    }

    /// Consume one step. Returns error if the budget is exhausted.
    fn tick(&mut self) -> EvalResult<()> {
        self.charge(1)
    }

    /// Consume `n` steps at once, for work proportional to a size.
    pub(crate) fn charge(&mut self, n: u64) -> EvalResult<()> {
        self.steps = self.steps.saturating_add(n);
        if self.steps > self.config.step_budget {
            Err(EvalError::StepBudgetExhausted(self.config.step_budget))
        } else {
            Ok(())
        }
    }

    /// Run `f` with `scope` as the current scope, restoring the previous
    /// scope afterwards whether or not `f` fails.
    fn with_scope<T>(
        &mut self,
        scope: Scope,
        f: impl FnOnce(&mut Self) -> EvalResult<T>,
    ) -> EvalResult<T> {
        let saved = std::mem::replace(&mut self.scope, scope);
        let result = f(self);
        self.scope = saved;
        result
    }

    // ══════════════════════════════════════════════════════════════════════
    // Program & statements
    // ══════════════════════════════════════════════════════════════════════

    /// Execute a whole script. A top-level `return` ends it early.
    pub fn run(&mut self, program: &Program) -> EvalResult<()> {
        self.hoist_vars(&program.body);
        match self.exec_stmts(&program.body) {
            Ok(()) | Err(EvalError::Return(_)) => Ok(()),
            Err(e) => Err(illegal_jump(e)),
        }
    }

    /// Declare every `var` in a function (or script) body up front.
    fn hoist_vars(&self, stmts: &[Stmt]) {
        let mut names = Vec::new();
        collect_var_names(stmts, &mut names);
        for name in names {
            self.scope.define_var(&name, None);
        }
    }

    /// Execute statements in the current scope, function declarations first.
    fn exec_stmts(&mut self, stmts: &[Stmt]) -> EvalResult<()> {
        for stmt in stmts {
            if let Stmt::Function(def) = stmt {
                if let Some(name) = &def.name {
                    let closure = self.make_closure(def, self.scope.clone());
                    self.scope.define(&name.name, closure, true, false)?;
                }
            }
        }
        for stmt in stmts {
            self.exec_stmt(stmt)?;
        }
        Ok(())
    }

    fn exec_block(&mut self, block: &Block) -> EvalResult<()> {
        let scope = self.scope.child(false);
        self.with_scope(scope, |ev| ev.exec_stmts(&block.stmts))
    }

    fn exec_stmt(&mut self, stmt: &Stmt) -> EvalResult<()> {
        self.tick()?;
        match stmt {
            Stmt::Expr(s) => {
                self.eval_expr(&s.expr)?;
                Ok(())
            }
            Stmt::Var(decl) => self.exec_var_decl(decl),
            Stmt::Function(_) | Stmt::Empty(_) => Ok(()),
            Stmt::If(s) => {
                if self.eval_expr(&s.condition)?.is_truthy() {
                    self.exec_stmt(&s.then_branch)
                } else if let Some(else_branch) = &s.else_branch {
                    self.exec_stmt(else_branch)
                } else {
                    Ok(())
                }
            }
            Stmt::For(s) => self.exec_for(s),
            Stmt::ForOf(s) => self.exec_for_each(s, true),
            Stmt::ForIn(s) => self.exec_for_each(s, false),
            Stmt::While(s) => {
                while self.eval_expr(&s.condition)?.is_truthy() {
                    if !self.loop_body(&s.body)? {
                        break;
                    }
                }
                Ok(())
            }
            Stmt::DoWhile(s) => {
                loop {
                    if !self.loop_body(&s.body)? {
                        break;
                    }
                    if !self.eval_expr(&s.condition)?.is_truthy() {
                        break;
                    }
                }
                Ok(())
            }
            Stmt::Block(block) => self.exec_block(block),
            Stmt::Return(s) => {
                let value = match &s.value {
                    Some(expr) => self.eval_expr(expr)?,
                    None => Value::Undefined,
                };
                Err(EvalError::Return(value))
            }
            Stmt::Break(_) => Err(EvalError::Break),
            Stmt::Continue(_) => Err(EvalError::Continue),
            Stmt::Throw(s) => {
                let value = self.eval_expr(&s.value)?;
                Err(EvalError::Thrown(value))
            }
            Stmt::Try(s) => self.exec_try(s),
        }
    }

    fn exec_var_decl(&mut self, decl: &VarDecl) -> EvalResult<()> {
        for declarator in &decl.declarators {
            let value = match &declarator.init {
                Some(init) => Some(self.eval_expr(init)?),
                None => None,
            };
            let name = &declarator.name.name;
            match decl.kind {
                VarKind::Var => self.scope.define_var(name, value),
                kind => self.scope.define(
                    name,
                    value.unwrap_or(Value::Undefined),
                    kind == VarKind::Let,
                    true,
                )?,
            }
        }
        Ok(())
    }

    /// Run one loop iteration. Returns `false` on `break`.
    fn loop_body(&mut self, body: &Stmt) -> EvalResult<bool> {
        match self.exec_stmt(body) {
            Ok(()) | Err(EvalError::Continue) => Ok(true),
            Err(EvalError::Break) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn exec_for(&mut self, s: &ForStmt) -> EvalResult<()> {
        let outer = self.scope.clone();
        let loop_scope = outer.child(false);
        self.with_scope(loop_scope, |ev| {
            // `let` loop variables get a fresh binding per iteration.
            let mut per_iteration: Vec<String> = Vec::new();
            let mut mutable = true;
            match &s.init {
                Some(ForInit::Var(decl)) => {
                    ev.exec_var_decl(decl)?;
                    if decl.kind != VarKind::Var {
                        per_iteration = decl
                            .declarators
                            .iter()
                            .map(|d| d.name.name.clone())
                            .collect();
                        mutable = decl.kind == VarKind::Let;
                    }
                }
                Some(ForInit::Expr(expr)) => {
                    ev.eval_expr(expr)?;
                }
                None => {}
            }
            loop {
                if let Some(test) = &s.test {
                    if !ev.eval_expr(test)?.is_truthy() {
                        break;
                    }
                }
                if !ev.loop_body(&s.body)? {
                    break;
                }
                if !per_iteration.is_empty() {
                    let next = outer.child(false);
                    for name in &per_iteration {
                        let current = ev.scope.get(name).unwrap_or(Value::Undefined);
                        next.define(name, current, mutable, true)?;
                    }
                    ev.scope = next;
                }
                if let Some(update) = &s.update {
                    ev.eval_expr(update)?;
                }
            }
            Ok(())
        })
    }

    fn exec_for_each(&mut self, s: &ForEachStmt, of: bool) -> EvalResult<()> {
        let iterable = self.eval_expr(&s.iterable)?;
        let values: Vec<Value> = if of {
            match &iterable {
                Value::Array(items) => items.borrow().clone(),
                Value::String(text) => text.chars().map(|c| Value::String(c.to_string())).collect(),
                _ => {
                    return Err(EvalError::Type(format!(
                        "{} is not iterable",
                        s.iterable.describe()
                    )))
                }
            }
        } else {
            iterable.own_keys().into_iter().map(Value::String).collect()
        };
        for value in values {
            let scope = self.scope.child(false);
            let proceed = self.with_scope(scope, |ev| {
                ev.bind_loop_variable(s, value)?;
                ev.loop_body(&s.body)
            })?;
            if !proceed {
                break;
            }
        }
        Ok(())
    }

    fn bind_loop_variable(&mut self, s: &ForEachStmt, value: Value) -> EvalResult<()> {
        let name = &s.binding.name;
        match s.kind {
            Some(VarKind::Var) => {
                self.scope.define_var(name, Some(value));
                Ok(())
            }
            Some(kind) => self.scope.define(name, value, kind == VarKind::Let, true),
            None => self.scope.assign(name, value),
        }
    }

    fn exec_try(&mut self, s: &TryStmt) -> EvalResult<()> {
        let result = match (self.exec_block(&s.block), &s.handler) {
            (Err(e), Some(handler)) if e.is_catchable() => {
                let scope = self.scope.child(false);
                self.with_scope(scope, |ev| {
                    if let Some(param) = &handler.param {
                        ev.scope.define(&param.name, e.into_value(), true, true)?;
                    }
                    ev.exec_stmts(&handler.body.stmts)
                })
            }
            (result, _) => result,
        };
        if let Some(finalizer) = &s.finalizer {
            if !matches!(result, Err(EvalError::StepBudgetExhausted(_))) {
                self.exec_block(finalizer)?;
            }
        }
        result
    }

    // ══════════════════════════════════════════════════════════════════════
    // Expressions
    // ══════════════════════════════════════════════════════════════════════

    /// Evaluate an expression to a Value.
    pub fn eval_expr(&mut self, expr: &Expr) -> EvalResult<Value> {
        self.tick()?;
        match &expr.kind {
            ExprKind::Number(n) => Ok(Value::Number(*n)),
            ExprKind::String(s) => Ok(Value::String(s.clone())),
            ExprKind::Bool(b) => Ok(Value::Bool(*b)),
            ExprKind::Null => Ok(Value::Null),
            ExprKind::Template(parts) => self.eval_template(parts),
            ExprKind::Array(items) => Ok(Value::array(self.eval_list(items)?)),
            ExprKind::Object(entries) => self.eval_object(entries),

            ExprKind::Identifier(name) => self.lookup(name),
            ExprKind::Member { .. } | ExprKind::Call { .. } => {
                Ok(self.eval_chain(expr)?.unwrap_or(Value::Undefined))
            }
            ExprKind::New { callee, args } => {
                let ctor = self.eval_expr(callee)?;
                let args = self.eval_list(args)?;
                self.construct(&ctor, args, callee)
            }

            ExprKind::Unary { op, operand } => self.eval_unary(*op, operand),
            ExprKind::Update { op, prefix, target } => self.eval_update(*op, *prefix, target),
            ExprKind::Binary { left, op, right } => {
                let left = self.eval_expr(left)?;
                let right = self.eval_expr(right)?;
                self.binary(*op, &left, &right)
            }
            ExprKind::Logical { left, op, right } => {
                let left = self.eval_expr(left)?;
                let short_circuit = match op {
                    LogicalOp::And => !left.is_truthy(),
                    LogicalOp::Or => left.is_truthy(),
                    LogicalOp::Nullish => !left.is_nullish(),
                };
                if short_circuit {
                    Ok(left)
                } else {
                    self.eval_expr(right)
                }
            }
            ExprKind::Conditional {
                test,
                consequent,
                alternate,
            } => {
                if self.eval_expr(test)?.is_truthy() {
                    self.eval_expr(consequent)
                } else {
                    self.eval_expr(alternate)
                }
            }
            ExprKind::Assign { op, target, value } => self.eval_assign(*op, target, value),
            ExprKind::Function(def) => Ok(self.eval_function_expr(def)),
            ExprKind::Paren(inner) => self.eval_expr(inner),
        }
    }

    fn lookup(&self, name: &str) -> EvalResult<Value> {
        self.scope
            .get(name)
            .ok_or_else(|| EvalError::Reference(format!("{name} is not defined")))
    }

    // ── Literals ──────────────────────────────────────────────────────────

    fn eval_template(&mut self, parts: &[TemplatePart]) -> EvalResult<Value> {
        let mut result = String::new();
        for part in parts {
            match part {
                TemplatePart::Literal(s) => push_capped(&mut result, s)?,
                TemplatePart::Expr(expr) => {
                    let value = self.eval_expr(expr)?;
                    push_capped(&mut result, &value.to_js_string())?;
                }
            }
        }
        self.charge(result.len() as u64 / 64)?;
        Ok(Value::String(result))
    }

    /// Evaluate array elements or call arguments, expanding spreads.
    fn eval_list(&mut self, items: &[ListItem]) -> EvalResult<Vec<Value>> {
        let mut values = Vec::with_capacity(items.len());
        for item in items {
            match item {
                ListItem::Item(expr) => values.push(self.eval_expr(expr)?),
                ListItem::Spread(expr) => match self.eval_expr(expr)? {
                    Value::Array(more) => values.extend(more.borrow().iter().cloned()),
                    Value::String(s) => {
                        values.extend(s.chars().map(|c| Value::String(c.to_string())))
                    }
                    _ => {
                        return Err(EvalError::Type(format!(
                            "{} is not iterable",
                            expr.describe()
                        )))
                    }
                },
            }
        }
        Ok(values)
    }

    fn eval_object(&mut self, entries: &[PropertyEntry]) -> EvalResult<Value> {
        let mut map = ObjectMap::new();
        for entry in entries {
            match entry {
                PropertyEntry::Field { key, value } => {
                    let key = match key {
                        PropertyKey::Named(name) => name.clone(),
                        PropertyKey::Computed(expr) => self.eval_expr(expr)?.to_js_string(),
                    };
                    let value = self.eval_expr(value)?;
                    map.insert(key, value);
                }
                PropertyEntry::Shorthand(ident) => {
                    let value = self.lookup(&ident.name)?;
                    map.insert(ident.name.clone(), value);
                }
                PropertyEntry::Spread(expr) => {
                    let source = self.eval_expr(expr)?;
                    map.extend(own_entries(&source));
                }
            }
        }
        Ok(Value::object(map))
    }

    // ── Member access & calls ─────────────────────────────────────────────

    /// Evaluate a member/call chain. `None` means an optional link (`?.`)
    /// short-circuited the rest of the chain.
    fn eval_chain(&mut self, expr: &Expr) -> EvalResult<Option<Value>> {
        match &expr.kind {
            ExprKind::Member {
                object,
                property,
                optional,
            } => {
                let Some(target) = self.eval_chain(object)? else {
                    return Ok(None);
                };
                if *optional && target.is_nullish() {
                    return Ok(None);
                }
                let key = self.member_key(property)?;
                self.get_property(&target, &key).map(Some)
            }
            ExprKind::Call {
                callee,
                args,
                optional,
            } => {
                let Some(function) = self.eval_chain(callee)? else {
                    return Ok(None);
                };
                if *optional && function.is_nullish() {
                    return Ok(None);
                }
                let args = self.eval_list(args)?;
                match &function {
                    Value::Function(f) => self.call_function(f, args).map(Some),
                    _ => Err(EvalError::Type(format!(
                        "{} is not a function",
                        callee.describe()
                    ))),
                }
            }
            _ => self.eval_expr(expr).map(Some),
        }
    }

    fn member_key(&mut self, property: &MemberProperty) -> EvalResult<String> {
        match property {
            MemberProperty::Named(ident) => Ok(ident.name.clone()),
            MemberProperty::Computed(expr) => Ok(self.eval_expr(expr)?.to_js_string()),
        }
    }

    /// Read `object[key]`. Methods come back bound to `object`.
    pub(crate) fn get_property(&mut self, object: &Value, key: &str) -> EvalResult<Value> {
        let value = match object {
            Value::Undefined | Value::Null => {
                return Err(EvalError::Type(format!(
                    "Cannot read properties of {} (reading '{key}')",
                    object.to_js_string()
                )))
            }
            Value::String(s) => {
                if key == "length" {
                    Value::Number(code_unit_count(s) as f64)
                } else if let Some(i) = array_index(key) {
                    code_unit_at(&code_units(s), i).unwrap_or(Value::Undefined)
                } else if STRING_METHODS.contains(&key) {
                    Value::method(object, key)
                } else {
                    Value::Undefined
                }
            }
            Value::Number(_) if NUMBER_METHODS.contains(&key) => Value::method(object, key),
            Value::Bool(_) if key == "toString" => Value::method(object, key),
            Value::Number(_) | Value::Bool(_) => Value::Undefined,
            Value::Array(items) => {
                if key == "length" {
                    Value::Number(items.borrow().len() as f64)
                } else if let Some(i) = array_index(key) {
                    items.borrow().get(i).cloned().unwrap_or(Value::Undefined)
                } else if ARRAY_METHODS.contains(&key) {
                    Value::method(object, key)
                } else {
                    Value::Undefined
                }
            }
            Value::Object(map) => {
                let own = map.borrow().get(key).cloned();
                match own {
                    Some(value) => value,
                    None if matches!(key, "hasOwnProperty" | "toString") => {
                        Value::method(object, key)
                    }
                    None => Value::Undefined,
                }
            }
            Value::Function(f) => match (&**f, key) {
                (_, "name") => Value::String(f.name()),
                // `expect(x).to.be.a.string`-style chains read through `a`/`an`.
                (Function::Method(m), _) if matches!(m.name.as_str(), "a" | "an") => {
                    match &m.this {
                        Value::Expectation(target) => target.property(key)?,
                        _ => Value::Undefined,
                    }
                }
                _ => Value::Undefined,
            },
            Value::Error(err) => match key {
                "name" => Value::from(err.kind.name()),
                "message" => Value::String(err.message.clone()),
                "stack" => Value::String(err.to_js_string()),
                "toString" => Value::method(object, key),
                _ => Value::Undefined,
            },
            Value::Host(host) if host.is_pm() => self.pm_property(*host, key)?,
            Value::Host(host) => self.builtin_property(*host, key),
            Value::Expectation(target) => target.property(key)?,
        };
        Ok(value)
    }

    /// Write `object[key] = value`.
    pub(crate) fn set_property(&mut self, object: &Value, key: &str, value: Value) -> EvalResult<()> {
        match object {
            Value::Undefined | Value::Null => Err(EvalError::Type(format!(
                "Cannot set properties of {} (setting '{key}')",
                object.to_js_string()
            ))),
            Value::Object(map) => {
                map.borrow_mut().insert(key.to_string(), value);
                Ok(())
            }
            Value::Array(items) => {
                if key == "length" {
                    let len = value.to_number();
                    if len < 0.0 || len.fract() != 0.0 || len > MAX_COLLECTION_LENGTH as f64 {
                        return Err(EvalError::Range("Invalid array length".to_string()));
                    }
                    let grown = (len as usize).saturating_sub(items.borrow().len());
                    self.charge(grown as u64)?;
                    items.borrow_mut().resize(len as usize, Value::Undefined);
                } else if let Some(i) = array_index(key) {
                    if i >= MAX_COLLECTION_LENGTH {
                        return Err(EvalError::Range("Invalid array length".to_string()));
                    }
                    let grown = (i + 1).saturating_sub(items.borrow().len());
                    self.charge(grown as u64)?;
                    let mut items = items.borrow_mut();
                    if i >= items.len() {
                        items.resize(i + 1, Value::Undefined);
                    }
                    items[i] = value;
                }
                Ok(())
            }
            Value::Host(host) => Err(EvalError::Type(format!(
                "Cannot assign to read only property '{key}' of {}",
                host.path()
            ))),
            _ => Ok(()),
        }
    }

    /// Call any function value.
    pub(crate) fn call_function(&mut self, f: &Rc<Function>, args: Vec<Value>) -> EvalResult<Value> {
        match &**f {
            Function::Script(closure) => self.call_closure(closure, args),
            Function::Global(global) => call_global(*global, &args),
            Function::Method(method) => self.call_method(&method.this, &method.name, args),
        }
    }

    fn call_closure(&mut self, closure: &Closure, args: Vec<Value>) -> EvalResult<Value> {
        if self.call_depth >= self.config.max_call_depth {
            return Err(EvalError::Range(
                "Maximum call stack size exceeded".to_string(),
            ));
        }
        self.call_depth += 1;
        let scope = closure.scope.child(true);
        let result = self.with_scope(scope, |ev| ev.invoke(&closure.def, args));
        self.call_depth -= 1;
        result
    }

    /// Bind parameters and run a function body in the current scope.
    fn invoke(&mut self, def: &FunctionDef, args: Vec<Value>) -> EvalResult<Value> {
        let mut args = args.into_iter();
        for param in &def.params {
            let value = if param.rest {
                Value::array(args.by_ref().collect())
            } else {
                args.next().unwrap_or(Value::Undefined)
            };
            let value = match &param.default {
                Some(default) if matches!(value, Value::Undefined) => self.eval_expr(default)?,
                _ => value,
            };
            self.scope.define(&param.name.name, value, true, false)?;
        }
        match &def.body {
            FunctionBody::Expr(expr) => self.eval_expr(expr),
            FunctionBody::Block(block) => {
                self.hoist_vars(&block.stmts);
                match self.exec_stmts(&block.stmts) {
                    Ok(()) => Ok(Value::Undefined),
                    Err(EvalError::Return(value)) => Ok(value),
                    Err(e) => Err(illegal_jump(e)),
                }
            }
        }
    }

    /// Dispatch a bound method on its receiver.
    fn call_method(&mut self, this: &Value, name: &str, args: Vec<Value>) -> EvalResult<Value> {
        match this {
            Value::String(s) => {
                let value = call_string_method(s, name, &args)?;
                match &value {
                    Value::String(out) => self.charge(out.len() as u64 / 64)?,
                    Value::Array(parts) => self.charge(parts.borrow().len() as u64 / 64)?,
                    _ => {}
                }
                Ok(value)
            }
            Value::Number(n) => call_number_method(*n, name, &args),
            Value::Bool(b) => Ok(Value::String(b.to_string())),
            Value::Array(items) => self.call_array_method(this, items, name, args),
            Value::Object(map) => match name {
                "hasOwnProperty" => {
                    let key = args.first().map(Value::to_js_string).unwrap_or_default();
                    Ok(Value::Bool(map.borrow().contains_key(&key)))
                }
                _ => Ok(Value::String(this.to_js_string())),
            },
            Value::Error(err) => Ok(Value::String(err.to_js_string())),
            Value::Host(host) if host.is_pm() => self.call_pm(*host, name, args),
            Value::Host(host) => self.call_builtin(*host, name, args),
            Value::Expectation(target) => target.call(name, &args),
            _ => Err(EvalError::Type(format!("{name} is not a function"))),
        }
    }

    /// `new Callee(args)`: only the Error family, `Object` and `Array`.
    fn construct(&mut self, ctor: &Value, args: Vec<Value>, callee: &Expr) -> EvalResult<Value> {
        match ctor {
            Value::Function(f) => match &**f {
                Function::Global(GlobalFn::Error(kind)) => Ok(construct_error(*kind, &args)),
                _ => Err(EvalError::Type(format!(
                    "{} is not a constructor",
                    callee.describe()
                ))),
            },
            Value::Host(HostObject::Object) => Ok(Value::object(ObjectMap::new())),
            Value::Host(HostObject::Array) => match args.as_slice() {
                [Value::Number(len)] => {
                    if *len < 0.0 || len.fract() != 0.0 || *len > MAX_COLLECTION_LENGTH as f64 {
                        return Err(EvalError::Range("Invalid array length".to_string()));
                    }
                    self.charge(*len as u64)?;
                    Ok(Value::array(vec![Value::Undefined; *len as usize]))
                }
                _ => Ok(Value::array(args)),
            },
            _ => Err(EvalError::Type(format!(
                "{} is not a constructor",
                callee.describe()
            ))),
        }
    }

    // ── Functions ─────────────────────────────────────────────────────────

    fn make_closure(&self, def: &Rc<FunctionDef>, scope: Scope) -> Value {
        Value::function(Function::Script(Closure {
            def: Rc::clone(def),
            scope,
        }))
    }

    /// A named function expression can refer to itself by name.
    fn eval_function_expr(&mut self, def: &Rc<FunctionDef>) -> Value {
        match &def.name {
            Some(name) if !def.is_arrow => {
                let scope = self.scope.child(true);
                let closure = self.make_closure(def, scope.clone());
                scope.define_var(&name.name, Some(closure.clone()));
                closure
            }
            _ => self.make_closure(def, self.scope.clone()),
        }
    }

    // ── Operators ─────────────────────────────────────────────────────────

    fn eval_unary(&mut self, op: UnaryOp, operand: &Expr) -> EvalResult<Value> {
        if op == UnaryOp::TypeOf {
            if let ExprKind::Identifier(name) = &operand.kind {
                let type_name = self.scope.get(name).map_or("undefined", |v| v.type_of());
                return Ok(Value::from(type_name));
            }
        }
        let value = self.eval_expr(operand)?;
        Ok(match op {
            UnaryOp::Not => Value::Bool(!value.is_truthy()),
            UnaryOp::Neg => Value::Number(-value.to_number()),
            UnaryOp::Plus => Value::Number(value.to_number()),
            UnaryOp::TypeOf => Value::from(value.type_of()),
            UnaryOp::Void => Value::Undefined,
        })
    }

    fn resolve_place(&mut self, target: &Expr) -> EvalResult<Place> {
        match &target.kind {
            ExprKind::Identifier(name) => Ok(Place::Binding(name.clone())),
            ExprKind::Member {
                object, property, ..
            } => {
                let object = self.eval_expr(object)?;
                let key = self.member_key(property)?;
                Ok(Place::Property(object, key))
            }
            ExprKind::Paren(inner) => self.resolve_place(inner),
            _ => Err(EvalError::Syntax(
                "Invalid left-hand side in assignment".to_string(),
            )),
        }
    }

    fn read_place(&mut self, place: &Place) -> EvalResult<Value> {
        match place {
            Place::Binding(name) => self.lookup(name),
            Place::Property(object, key) => self.get_property(object, key),
        }
    }

    fn write_place(&mut self, place: &Place, value: Value) -> EvalResult<()> {
        match place {
            Place::Binding(name) => self.scope.assign(name, value),
            Place::Property(object, key) => self.set_property(object, key, value),
        }
    }

    fn eval_assign(&mut self, op: AssignOp, target: &Expr, value: &Expr) -> EvalResult<Value> {
        let place = self.resolve_place(target)?;
        let value = match op.binary_op() {
            None => self.eval_expr(value)?,
            Some(bin) => {
                let current = self.read_place(&place)?;
                let rhs = self.eval_expr(value)?;
                self.binary(bin, &current, &rhs)?
            }
        };
        self.write_place(&place, value.clone())?;
        Ok(value)
    }

    fn eval_update(&mut self, op: UpdateOp, prefix: bool, target: &Expr) -> EvalResult<Value> {
        let place = self.resolve_place(target)?;
        let old = self.read_place(&place)?.to_number();
        let new = match op {
            UpdateOp::Increment => old + 1.0,
            UpdateOp::Decrement => old - 1.0,
        };
        self.write_place(&place, Value::Number(new))?;
        Ok(Value::Number(if prefix { new } else { old }))
    }

    /// Apply a binary operator to two evaluated operands.
    pub(crate) fn binary(&mut self, op: BinOp, left: &Value, right: &Value) -> EvalResult<Value> {
        let number = |f: fn(f64, f64) -> f64| Value::Number(f(left.to_number(), right.to_number()));
        let value = match op {
            BinOp::Add => {
                if concatenates(left) || concatenates(right) {
                    let joined = left.to_js_string() + &right.to_js_string();
                    if joined.len() > MAX_COLLECTION_LENGTH {
                        return Err(string_too_long());
                    }
                    self.charge(joined.len() as u64 / 64)?;
                    Value::String(joined)
                } else {
                    Value::Number(left.to_number() + right.to_number())
                }
            }
            BinOp::Sub => number(|a, b| a - b),
            BinOp::Mul => number(|a, b| a * b),
            BinOp::Div => number(|a, b| a / b),
            BinOp::Mod => number(|a, b| a % b),
            BinOp::Pow => number(|a, b| {
                if b.is_nan() || (a.abs() == 1.0 && b.is_infinite()) {
                    f64::NAN
                } else {
                    a.powf(b)
                }
            }),
            BinOp::Eq => Value::Bool(left.loose_equals(right)),
            BinOp::NotEq => Value::Bool(!left.loose_equals(right)),
            BinOp::StrictEq => Value::Bool(left.strict_equals(right)),
            BinOp::StrictNotEq => Value::Bool(!left.strict_equals(right)),
            BinOp::Less => Value::Bool(compare(left, right).is_some_and(|o| o.is_lt())),
            BinOp::Greater => Value::Bool(compare(left, right).is_some_and(|o| o.is_gt())),
            BinOp::LessEq => Value::Bool(compare(left, right).is_some_and(|o| o.is_le())),
            BinOp::GreaterEq => Value::Bool(compare(left, right).is_some_and(|o| o.is_ge())),
            BinOp::In => match right {
                Value::Array(_)
                | Value::Object(_)
                | Value::Error(_)
                | Value::Host(_)
                | Value::Function(_)
                | Value::Expectation(_) => Value::Bool(right.has_property(&left.to_js_string())),
                _ => {
                    return Err(EvalError::Type(format!(
                        "Cannot use 'in' operator to search for '{}' in {}",
                        left.to_js_string(),
                        right.to_js_string()
                    )))
                }
            },
            BinOp::InstanceOf => Value::Bool(instance_of(left, right)?),
        };
        Ok(value)
    }
}

// ══════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════

/// Global bindings every script starts with. `pm` is the only capability.
fn install_globals(scope: &Scope) {
    let hosts = [
        ("pm", HostObject::Pm),
        ("console", HostObject::Console),
        ("JSON", HostObject::Json),
        ("Math", HostObject::Math),
        ("Object", HostObject::Object),
        ("Array", HostObject::Array),
    ];
    for (name, host) in hosts {
        scope.define_var(name, Some(Value::Host(host)));
    }
    let functions = [
        GlobalFn::String,
        GlobalFn::Number,
        GlobalFn::Boolean,
        GlobalFn::ParseInt,
        GlobalFn::ParseFloat,
        GlobalFn::IsNaN,
        GlobalFn::IsFinite,
        GlobalFn::Error(ErrorKind::Error),
        GlobalFn::Error(ErrorKind::TypeError),
        GlobalFn::Error(ErrorKind::RangeError),
        GlobalFn::Error(ErrorKind::ReferenceError),
        GlobalFn::Error(ErrorKind::SyntaxError),
    ];
    for global in functions {
        scope.define_var(global.name(), Some(Value::function(Function::Global(global))));
    }
    scope.define_var("undefined", Some(Value::Undefined));
    scope.define_var("NaN", Some(Value::Number(f64::NAN)));
    scope.define_var("Infinity", Some(Value::Number(f64::INFINITY)));
}

/// `break`/`continue` that escaped every loop.
fn illegal_jump(e: EvalError) -> EvalError {
    match e {
        EvalError::Break | EvalError::Continue => EvalError::Syntax(e.to_string()),
        other => other,
    }
}

fn collect_var_names(stmts: &[Stmt], names: &mut Vec<String>) {
    for stmt in stmts {
        collect_stmt_var_names(stmt, names);
    }
}

fn push_var_names(decl: &VarDecl, names: &mut Vec<String>) {
    if decl.kind == VarKind::Var {
        names.extend(decl.declarators.iter().map(|d| d.name.name.clone()));
    }
}

fn collect_stmt_var_names(stmt: &Stmt, names: &mut Vec<String>) {
    match stmt {
        Stmt::Var(decl) => push_var_names(decl, names),
        Stmt::If(s) => {
            collect_stmt_var_names(&s.then_branch, names);
            if let Some(else_branch) = &s.else_branch {
                collect_stmt_var_names(else_branch, names);
            }
        }
        Stmt::For(s) => {
            if let Some(ForInit::Var(decl)) = &s.init {
                push_var_names(decl, names);
            }
            collect_stmt_var_names(&s.body, names);
        }
        Stmt::ForOf(s) | Stmt::ForIn(s) => {
            if s.kind == Some(VarKind::Var) {
                names.push(s.binding.name.clone());
            }
            collect_stmt_var_names(&s.body, names);
        }
        Stmt::While(s) | Stmt::DoWhile(s) => collect_stmt_var_names(&s.body, names),
        Stmt::Block(block) => collect_var_names(&block.stmts, names),
        Stmt::Try(s) => {
            collect_var_names(&s.block.stmts, names);
            if let Some(handler) = &s.handler {
                collect_var_names(&handler.body.stmts, names);
            }
            if let Some(finalizer) = &s.finalizer {
                collect_var_names(&finalizer.stmts, names);
            }
        }
        _ => {}
    }
}

/// Operands that turn `+` into string concatenation.
fn concatenates(value: &Value) -> bool {
    !matches!(
        value,
        Value::Undefined | Value::Null | Value::Bool(_) | Value::Number(_)
    )
}

/// Relational comparison: strings lexicographically, anything else numerically.
fn compare(left: &Value, right: &Value) -> Option<std::cmp::Ordering> {
    match (left, right) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => left.to_number().partial_cmp(&right.to_number()),
    }
}

fn instance_of(left: &Value, right: &Value) -> EvalResult<bool> {
    match right {
        Value::Function(f) => Ok(match &**f {
            Function::Global(GlobalFn::Error(kind)) => {
                matches!(left, Value::Error(err) if err.kind.is_instance_of(*kind))
            }
            _ => false,
        }),
        Value::Host(HostObject::Array) => Ok(matches!(left, Value::Array(_))),
        Value::Host(HostObject::Object) => Ok(matches!(
            left,
            Value::Array(_)
                | Value::Object(_)
                | Value::Error(_)
                | Value::Function(_)
                | Value::Host(_)
                | Value::Expectation(_)
        )),
        _ => Err(EvalError::Type(
            "Right-hand side of 'instanceof' is not callable".to_string(),
        )),
    }
}
