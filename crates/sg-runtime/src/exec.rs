//! Running compiled programs.
//!
//! One [`Executor`] lives for one call. Each nesting depth owns a slot in an
//! arena of variable tables; a sub-graph iteration takes the table of its
//! depth, runs, and hands it back cleared so the next iteration reuses its
//! allocation. Enclosing tables are only ever read.

use std::cell::RefCell;
use std::collections::HashMap;

use sg_kernels::{KernelContext, KernelError, SubgraphRunner};
use sg_onnx::Node;
use sg_tensor::{ComputeBackend, Value};
use tracing::trace;

use crate::error::{Result, RuntimeError};
use crate::program::{Program, Step};

pub(crate) type Table = HashMap<String, Value>;

/// Name resolution for one step: local table, then this graph's
/// initializers, then the enclosing scopes.
struct Scope<'a> {
    program: &'a Program,
    table: &'a Table,
    parent: Option<&'a Scope<'a>>,
}

impl<'a> Scope<'a> {
    fn lookup(&self, name: &str) -> Option<&'a Value> {
        self.table
            .get(name)
            .or_else(|| self.program.graph.initializer_value(name))
            .or_else(|| self.parent.and_then(|p| p.lookup(name)))
    }

    fn gather(&self, node: &Node, names: &[String], skip: Option<usize>) -> Result<Vec<&'a Value>> {
        names
            .iter()
            .enumerate()
            .filter(|(i, _)| Some(*i) != skip)
            .map(|(_, name)| {
                self.lookup(name).ok_or_else(|| RuntimeError::MissingValue {
                    node: node.name.clone(),
                    name: name.clone(),
                })
            })
            .collect()
    }
}

/// Runs a node's sub-graphs on behalf of its kernel.
struct BodyRunner<'a> {
    executor: &'a Executor<'a>,
    step: &'a Step,
    scope: &'a Scope<'a>,
}

impl SubgraphRunner for BodyRunner<'_> {
    fn run_subgraph(&self, attribute: &str, inputs: Vec<Value>) -> sg_kernels::Result<Vec<Value>> {
        let body = self.step.bodies.get(attribute).ok_or_else(|| {
            KernelError::Unimplemented(format!("no compiled sub-graph for attribute '{}'", attribute))
        })?;
        self.executor
            .run_body(body, inputs, self.scope)
            .map_err(|e| KernelError::Subgraph {
                attribute: attribute.to_string(),
                source: Box::new(e),
            })
    }
}

pub(crate) struct Executor<'a> {
    backend: &'a dyn ComputeBackend,
    frames: RefCell<Vec<Table>>,
    inplaced: RefCell<Vec<String>>,
    /// Top-level values in the order they were bound or produced.
    snapshots: Option<RefCell<Vec<(String, Value)>>>,
}

impl<'a> Executor<'a> {
    pub(crate) fn new(backend: &'a dyn ComputeBackend, record: bool) -> Self {
        Executor {
            backend,
            frames: RefCell::new(Vec::new()),
            inplaced: RefCell::new(Vec::new()),
            snapshots: record.then(|| RefCell::new(Vec::new())),
        }
    }

    fn take_frame(&self, depth: usize) -> Table {
        let mut frames = self.frames.borrow_mut();
        if frames.len() <= depth {
            frames.resize_with(depth + 1, Table::new);
        }
        std::mem::take(&mut frames[depth])
    }

    fn return_frame(&self, depth: usize, mut table: Table) {
        table.clear();
        if let Some(slot) = self.frames.borrow_mut().get_mut(depth) {
            *slot = table;
        }
    }

    fn snapshot(&self, program: &Program, name: &str, value: &Value) {
        if program.depth == 0 {
            if let Some(snapshots) = &self.snapshots {
                snapshots.borrow_mut().push((name.to_string(), value.clone()));
            }
        }
    }

    /// Run the top-level program over already validated inputs and return
    /// the declared outputs.
    pub(crate) fn run(&self, program: &Program, inputs: Vec<(String, Value)>) -> Result<Table> {
        let mut table = self.take_frame(program.depth);
        for (name, value) in inputs {
            self.snapshot(program, &name, &value);
            table.insert(name, value);
        }
        self.execute(program, &mut table, None)?;
        let outputs = self.collect_outputs(program, &mut table, None)?;
        Ok(program
            .graph
            .outputs()
            .iter()
            .map(|o| o.name.clone())
            .zip(outputs)
            .collect())
    }

    /// Run a sub-graph with positional inputs inside `parent`.
    fn run_body(&self, program: &Program, inputs: Vec<Value>, parent: &Scope<'_>) -> Result<Vec<Value>> {
        let declared = program.graph.inputs();
        if inputs.len() != declared.len() {
            return Err(RuntimeError::InputCount {
                expected: declared.len(),
                got: inputs.len(),
            });
        }
        let mut table = self.take_frame(program.depth);
        for (info, value) in declared.iter().zip(inputs) {
            table.insert(info.name.clone(), value);
        }
        self.execute(program, &mut table, Some(parent))?;
        let outputs = self.collect_outputs(program, &mut table, Some(parent))?;
        self.return_frame(program.depth, table);
        Ok(outputs)
    }

    fn collect_outputs(
        &self,
        program: &Program,
        table: &mut Table,
        parent: Option<&Scope<'_>>,
    ) -> Result<Vec<Value>> {
        let declared = program.graph.outputs();
        let mut outputs = Vec::with_capacity(declared.len());
        for (i, info) in declared.iter().enumerate() {
            let repeated = declared[i + 1..].iter().any(|o| o.name == info.name);
            let local = if repeated {
                table.get(&info.name).cloned()
            } else {
                table.remove(&info.name)
            };
            let value = match local {
                Some(v) => v,
                None => {
                    let scope = Scope {
                        program,
                        table,
                        parent,
                    };
                    scope
                        .lookup(&info.name)
                        .cloned()
                        .ok_or_else(|| RuntimeError::MissingValue {
                            node: program.graph.name().to_string(),
                            name: info.name.clone(),
                        })?
                }
            };
            outputs.push(value);
        }
        Ok(outputs)
    }

    fn execute(&self, program: &Program, table: &mut Table, parent: Option<&Scope<'_>>) -> Result<()> {
        for step in &program.steps {
            let node = program.node(step);
            trace!(node = %node.name, op_type = %node.op_type, depth = program.depth, "dispatch");
            let names = &node.inputs[..step.arity];
            let owned = step
                .inplace
                .and_then(|slot| table.remove(&names[slot]).map(|value| (slot, value)));

            let outputs = {
                let scope = Scope {
                    program,
                    table: &*table,
                    parent,
                };
                let runner = BodyRunner {
                    executor: self,
                    step,
                    scope: &scope,
                };
                let ctx = KernelContext::new(self.backend).with_subgraphs(&runner);
                match owned {
                    Some((slot, value)) => {
                        let others = scope.gather(node, names, Some(slot))?;
                        let (outputs, reused) = step
                            .kernel
                            .compute_inplace(value, &others, &ctx)
                            .map_err(|e| RuntimeError::node(node, e))?;
                        if reused && program.depth == 0 {
                            self.inplaced.borrow_mut().extend(node.outputs.first().cloned());
                        }
                        outputs
                    }
                    None => {
                        let inputs = scope.gather(node, names, None)?;
                        step.kernel
                            .compute(&inputs, &ctx)
                            .map_err(|e| RuntimeError::node(node, e))?
                    }
                }
            };

            if outputs.len() != node.outputs.len() {
                return Err(RuntimeError::OutputCount {
                    node: node.name.clone(),
                    expected: node.outputs.len(),
                    got: outputs.len(),
                });
            }
            for (name, value) in node.outputs.iter().zip(outputs) {
                if name.is_empty() {
                    continue;
                }
                self.snapshot(program, name, &value);
                table.insert(name.clone(), value);
            }
            for name in &step.release {
                table.remove(name);
            }
        }
        Ok(())
    }

    pub(crate) fn into_trace(self) -> (Vec<String>, Vec<(String, Value)>) {
        let snapshots = self.snapshots.map(RefCell::into_inner).unwrap_or_default();
        (self.inplaced.into_inner(), snapshots)
    }
}
