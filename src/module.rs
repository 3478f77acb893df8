//! The module table: one entry per loaded document, keyed by canonical path.
//!
//! Loading a document reads and validates it and then loads its imports,
//! so a cycle anywhere in the import graph is reported as soon as the
//! document that closes it is reached. Evaluating a document's namespace is
//! a separate, later step driven by the interpreter on first reference.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    rc::Rc,
};

use indexmap::IndexMap;

use crate::{
    document::Document,
    error::{Location, YamletError, YamletResult},
    interpreter::Interpreter,
    reader::DocumentReader,
    tree::Node,
    value::{Namespace, Value},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleState {
    /// Imports are still being loaded.
    Loading,
    NotStarted,
    InProgress,
    Done,
}

#[derive(Debug, Clone)]
pub enum BindingState {
    Pending,
    InProgress,
    Done(Value),
}

pub struct Module {
    pub document: Rc<Document>,
    pub imports: IndexMap<String, ModuleId>,
    pub state: ModuleState,
    bindings: HashMap<String, BindingState>,
    namespace: Option<Rc<Namespace>>,
}

#[derive(Default)]
pub struct ModuleTable {
    modules: Vec<Module>,
    by_path: HashMap<PathBuf, ModuleId>,
    load_stack: Vec<ModuleId>,
    eval_stack: Vec<ModuleId>,
}

impl ModuleTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn get(&self, id: ModuleId) -> &Module {
        &self.modules[id.0]
    }

    pub fn id_of(&self, path: &Path) -> Option<ModuleId> {
        self.by_path.get(path).copied()
    }

    pub fn path(&self, id: ModuleId) -> &Path {
        &self.modules[id.0].document.path
    }

    pub fn document(&self, id: ModuleId) -> Rc<Document> {
        Rc::clone(&self.modules[id.0].document)
    }

    pub fn alias(&self, id: ModuleId, alias: &str) -> Option<ModuleId> {
        self.modules[id.0].imports.get(alias).copied()
    }

    pub fn has_binding(&self, id: ModuleId, name: &str) -> bool {
        self.modules[id.0].bindings.contains_key(name)
    }

    pub fn binding_state(&self, id: ModuleId, name: &str) -> Option<&BindingState> {
        self.modules[id.0].bindings.get(name)
    }

    pub fn set_binding_state(&mut self, id: ModuleId, name: &str, state: BindingState) {
        if let Some(slot) = self.modules[id.0].bindings.get_mut(name) {
            *slot = state;
        }
    }

    /// Reads, validates and registers the document at canonical `path`,
    /// unless it is already known.
    pub fn load(&mut self, reader: &dyn DocumentReader, path: &Path) -> YamletResult<ModuleId> {
        if let Some(id) = self.id_of(path) {
            if self.modules[id.0].state == ModuleState::Loading {
                return Err(self.cycle_error(id, &self.load_stack));
            }
            tracing::trace!(path = %path.display(), "document already loaded");
            return Ok(id);
        }

        tracing::debug!(path = %path.display(), "loading document");
        let root = reader.read(path)?;
        self.register(reader, path.to_path_buf(), root)
    }

    /// Registers `root` as the document at `path` and loads its imports.
    pub fn register(
        &mut self,
        reader: &dyn DocumentReader,
        path: PathBuf,
        root: Node,
    ) -> YamletResult<ModuleId> {
        let document = Rc::new(Document::from_node(&path, root)?);
        let bindings = document
            .binding_names()
            .map(|name| (name.to_string(), BindingState::Pending))
            .collect();

        let id = ModuleId(self.modules.len());
        self.modules.push(Module {
            document: Rc::clone(&document),
            imports: IndexMap::new(),
            state: ModuleState::Loading,
            bindings,
            namespace: None,
        });
        self.by_path.insert(path, id);

        self.load_stack.push(id);
        let loaded = self.load_imports(reader, id, &document);
        self.load_stack.pop();
        loaded?;

        self.modules[id.0].state = ModuleState::NotStarted;
        Ok(id)
    }

    fn load_imports(
        &mut self,
        reader: &dyn DocumentReader,
        id: ModuleId,
        document: &Document,
    ) -> YamletResult<()> {
        for (alias, target) in &document.imports {
            let target_path = reader
                .resolve(&document.path, target)
                .map_err(|err| match err {
                    YamletError::ImportNotFound(message) => YamletError::ImportNotFound(format!(
                        "cannot resolve import `{}`: {}",
                        alias, message
                    )),
                    other => other,
                })
                .map_err(|err| err.located(Location::new(&document.path)))?;
            let target_id = self.load(reader, &target_path)?;
            tracing::trace!(alias = %alias, target = %target_path.display(), "import resolved");
            self.modules[id.0].imports.insert(alias.clone(), target_id);
        }
        Ok(())
    }

    /// Marks `id` as being evaluated. Returns the cached namespace when the
    /// module is already done.
    pub fn begin_evaluation(&mut self, id: ModuleId) -> YamletResult<Option<Rc<Namespace>>> {
        match self.modules[id.0].state {
            ModuleState::Done => Ok(self.modules[id.0].namespace.clone()),
            ModuleState::InProgress => Err(self.cycle_error(id, &self.eval_stack)),
            ModuleState::Loading => Err(self.cycle_error(id, &self.load_stack)),
            ModuleState::NotStarted => {
                self.modules[id.0].state = ModuleState::InProgress;
                self.eval_stack.push(id);
                Ok(None)
            }
        }
    }

    pub fn finish_evaluation(&mut self, id: ModuleId, namespace: Rc<Namespace>) {
        let module = &mut self.modules[id.0];
        module.state = ModuleState::Done;
        module.namespace = Some(namespace);
        self.eval_stack.retain(|entry| *entry != id);
    }

    /// Rolls `id` back to `NotStarted` after a failed evaluation.
    pub fn abandon_evaluation(&mut self, id: ModuleId) {
        let module = &mut self.modules[id.0];
        module.state = ModuleState::NotStarted;
        for state in module.bindings.values_mut() {
            if matches!(state, BindingState::InProgress) {
                *state = BindingState::Pending;
            }
        }
        self.eval_stack.retain(|entry| *entry != id);
    }

    fn cycle_error(&self, id: ModuleId, stack: &[ModuleId]) -> YamletError {
        let start = stack.iter().position(|entry| *entry == id).unwrap_or(0);
        let mut chain: Vec<PathBuf> = stack[start..]
            .iter()
            .map(|entry| self.path(*entry).to_path_buf())
            .collect();
        chain.push(self.path(id).to_path_buf());
        YamletError::CyclicImport {
            path: self.path(id).to_path_buf(),
            chain,
        }
    }
}

impl Interpreter<'_> {
    /// Export namespace of the module that `importer` imports as `alias`,
    /// evaluating it on first use.
    pub fn resolve(&mut self, importer: ModuleId, alias: &str) -> YamletResult<Rc<Namespace>> {
        let target = self.modules.alias(importer, alias).ok_or_else(|| {
            YamletError::ImportNotFound(format!(
                "`{}` is not imported by {}",
                alias,
                self.modules.path(importer).display()
            ))
        })?;
        self.evaluate_namespace(target)
    }
}
