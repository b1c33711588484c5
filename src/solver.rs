//! the capability the constraint builder talks to. the core never names a
//! particular ILP library directly; it calls `add_var`/`add_linear_eq`/
//! `add_linear_le`/`set_objective`/`solve` against this trait, so swapping
//! the backend (a native CBC/HiGHS link, say) never touches `constraints.rs`
//! or `optimize.rs`.

use std::collections::HashMap;

use good_lp::{Expression, ProblemVariables, Solution, SolverModel, Variable, variable};

/// an opaque handle to a decision variable, scoped to one optimization run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VarId(pub usize);

pub enum VarKind {
    Binary,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SolveStatus {
    Optimal,
    Infeasible,
    /// covers timeout, unbounded, or any other non-optimal termination;
    /// the solver's own code/message, reported verbatim.
    Failure(String),
}

pub struct SolveOutcome {
    pub status: SolveStatus,
    /// variable assignments, only meaningful when `status == Optimal`.
    pub values: HashMap<VarId, f64>,
}

pub trait Solver {
    fn add_var(&mut self, kind: VarKind) -> VarId;
    fn add_linear_eq(&mut self, terms: &[(VarId, f64)], rhs: f64);
    fn add_linear_le(&mut self, terms: &[(VarId, f64)], rhs: f64);
    fn set_objective(&mut self, maximize: bool, terms: &[(VarId, f64)]);
    fn solve(self: Box<Self>) -> SolveOutcome;
}

/// default backend: a pure-Rust branch-and-bound solver via `good_lp`'s
/// `microlp` feature, so the core never links a system solver.
pub struct GoodLpSolver {
    vars: ProblemVariables,
    handles: Vec<Variable>,
    eq_constraints: Vec<(Vec<(VarId, f64)>, f64)>,
    le_constraints: Vec<(Vec<(VarId, f64)>, f64)>,
    objective_terms: Vec<(VarId, f64)>,
    maximize: bool,
}

impl Default for GoodLpSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl GoodLpSolver {
    pub fn new() -> Self {
        Self {
            vars: ProblemVariables::new(),
            handles: Vec::new(),
            eq_constraints: Vec::new(),
            le_constraints: Vec::new(),
            objective_terms: Vec::new(),
            maximize: true,
        }
    }

    fn expression(&self, terms: &[(VarId, f64)]) -> Expression {
        let mut expr = Expression::from(0.0);
        for (id, coeff) in terms {
            expr += self.handles[id.0] * *coeff;
        }
        expr
    }
}

impl Solver for GoodLpSolver {
    fn add_var(&mut self, kind: VarKind) -> VarId {
        let handle = match kind {
            VarKind::Binary => self.vars.add(variable().binary()),
        };
        self.handles.push(handle);
        VarId(self.handles.len() - 1)
    }

    fn add_linear_eq(&mut self, terms: &[(VarId, f64)], rhs: f64) {
        self.eq_constraints.push((terms.to_vec(), rhs));
    }

    fn add_linear_le(&mut self, terms: &[(VarId, f64)], rhs: f64) {
        self.le_constraints.push((terms.to_vec(), rhs));
    }

    fn set_objective(&mut self, maximize: bool, terms: &[(VarId, f64)]) {
        self.maximize = maximize;
        self.objective_terms = terms.to_vec();
    }

    fn solve(self: Box<Self>) -> SolveOutcome {
        let objective = self.expression(&self.objective_terms);
        let eq_exprs: Vec<_> = self
            .eq_constraints
            .iter()
            .map(|(terms, rhs)| (self.expression(terms), *rhs))
            .collect();
        let le_exprs: Vec<_> = self
            .le_constraints
            .iter()
            .map(|(terms, rhs)| (self.expression(terms), *rhs))
            .collect();

        let mut model = if self.maximize {
            self.vars.maximise(objective)
        } else {
            self.vars.minimise(objective)
        }
        .using(good_lp::default_solver);

        for (expr, rhs) in eq_exprs {
            model = model.with(expr.eq(rhs));
        }
        for (expr, rhs) in le_exprs {
            model = model.with(expr.leq(rhs));
        }

        match model.solve() {
            Ok(solution) => {
                let values = self
                    .handles
                    .iter()
                    .enumerate()
                    .map(|(i, handle)| (VarId(i), solution.value(*handle)))
                    .collect();
                SolveOutcome {
                    status: SolveStatus::Optimal,
                    values,
                }
            }
            Err(good_lp::ResolutionError::Infeasible) => SolveOutcome {
                status: SolveStatus::Infeasible,
                values: HashMap::new(),
            },
            Err(other) => SolveOutcome {
                status: SolveStatus::Failure(other.to_string()),
                values: HashMap::new(),
            },
        }
    }
}

/// a variable's value is considered "set" above this threshold; guards
/// against floating point noise from the relaxation.
pub const BINARY_TRUE_THRESHOLD: f64 = 0.5;
