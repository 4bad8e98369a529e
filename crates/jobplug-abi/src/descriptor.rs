use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::job::Job;
use crate::key::{KeyError, TypeKey};

/// Caller-supplied construction context (database session, clock, client...).
/// Constructors downcast to the concrete type they expect.
pub type Context = Arc<dyn Any + Send + Sync>;

pub type ConstructError = Box<dyn std::error::Error + Send + Sync>;

/// Persistence side of a job.
pub trait Repository: Send + Sync {
    fn as_any(&self) -> &dyn Any;
}

/// Orchestration side of a job, wired to a repository.
pub trait Manager: Send + Sync {
    fn repository(&self) -> &RepositoryHandle;

    fn as_any(&self) -> &dyn Any;
}

pub type RepositoryHandle = Arc<dyn Repository>;
pub type ManagerHandle = Box<dyn Manager>;

pub type JobConstructor = Arc<dyn Fn() -> Result<Job, ConstructError> + Send + Sync>;
pub type RepositoryConstructor =
    Arc<dyn Fn(Context) -> Result<RepositoryHandle, ConstructError> + Send + Sync>;
pub type RepositoryWithSecondaryConstructor =
    Arc<dyn Fn(Context, Context) -> Result<RepositoryHandle, ConstructError> + Send + Sync>;
pub type ManagerConstructor =
    Arc<dyn Fn(RepositoryHandle) -> Result<ManagerHandle, ConstructError> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeRole {
    Job,
    Repository,
    Manager,
}

impl fmt::Display for TypeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TypeRole::Job => "job",
            TypeRole::Repository => "repository",
            TypeRole::Manager => "manager",
        };
        f.write_str(s)
    }
}

/// Constructors a type offers, grouped by role.
#[derive(Clone)]
pub enum Constructors {
    Job(JobConstructor),
    Repository {
        primary: Option<RepositoryConstructor>,
        with_secondary: Option<RepositoryWithSecondaryConstructor>,
    },
    Manager(ManagerConstructor),
}

impl Constructors {
    pub fn role(&self) -> TypeRole {
        match self {
            Constructors::Job(_) => TypeRole::Job,
            Constructors::Repository { .. } => TypeRole::Repository,
            Constructors::Manager(_) => TypeRole::Manager,
        }
    }
}

/// A concrete type exported by a module.
#[derive(Clone)]
pub struct TypeDescriptor {
    pub key: TypeKey,
    pub constructors: Constructors,
}

impl TypeDescriptor {
    pub fn role(&self) -> TypeRole {
        self.constructors.role()
    }

    pub fn full_name(&self) -> &str {
        self.key.as_str()
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("TypeDescriptor");
        s.field("key", &self.key).field("role", &self.role());
        if let Constructors::Repository {
            primary,
            with_secondary,
        } = &self.constructors
        {
            s.field("primary", &primary.is_some())
                .field("with_secondary", &with_secondary.is_some());
        }
        s.finish()
    }
}

#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("invalid type name: {0}")]
    InvalidName(#[from] KeyError),
    #[error("type {0} is registered twice")]
    DuplicateType(String),
    #[error("repository type {0} declares no constructor")]
    NoConstructor(String),
}

/// Collects the types a module exports. Handed to the module's register
/// function at load time.
pub struct ModuleBuilder {
    name: String,
    types: Vec<TypeDescriptor>,
    errors: Vec<DescriptorError>,
}

impl ModuleBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            types: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn job<F>(&mut self, name: &str, ctor: F) -> &mut Self
    where
        F: Fn() -> Result<Job, ConstructError> + Send + Sync + 'static,
    {
        self.push(name, Constructors::Job(Arc::new(ctor)))
    }

    pub fn repository<F>(&mut self, name: &str, ctor: F) -> &mut Self
    where
        F: Fn(Context) -> Result<RepositoryHandle, ConstructError> + Send + Sync + 'static,
    {
        self.push(
            name,
            Constructors::Repository {
                primary: Some(Arc::new(ctor)),
                with_secondary: None,
            },
        )
    }

    pub fn repository_with_secondary<F>(&mut self, name: &str, ctor: F) -> &mut Self
    where
        F: Fn(Context, Context) -> Result<RepositoryHandle, ConstructError>
            + Send
            + Sync
            + 'static,
    {
        self.push(
            name,
            Constructors::Repository {
                primary: None,
                with_secondary: Some(Arc::new(ctor)),
            },
        )
    }

    pub fn manager<F>(&mut self, name: &str, ctor: F) -> &mut Self
    where
        F: Fn(RepositoryHandle) -> Result<ManagerHandle, ConstructError> + Send + Sync + 'static,
    {
        self.push(name, Constructors::Manager(Arc::new(ctor)))
    }

    /// Register a type with an explicit constructor set. A repository may
    /// carry both constructor shapes.
    pub fn export(&mut self, name: &str, constructors: Constructors) -> &mut Self {
        self.push(name, constructors)
    }

    fn push(&mut self, name: &str, constructors: Constructors) -> &mut Self {
        let key = match TypeKey::parse(name) {
            Ok(key) => key,
            Err(e) => {
                self.errors.push(e.into());
                return self;
            }
        };

        if let Constructors::Repository {
            primary: None,
            with_secondary: None,
        } = constructors
        {
            self.errors
                .push(DescriptorError::NoConstructor(key.to_string()));
            return self;
        }

        if self.types.iter().any(|t| t.key == key) {
            self.errors
                .push(DescriptorError::DuplicateType(key.to_string()));
            return self;
        }

        self.types.push(TypeDescriptor { key, constructors });
        self
    }

    pub fn build(self) -> Result<ModuleDescriptor, DescriptorError> {
        if let Some(err) = self.errors.into_iter().next() {
            return Err(err);
        }
        Ok(ModuleDescriptor::new(self.name, self.types))
    }
}

/// Registration table of one loaded module, indexed by role and type key.
pub struct ModuleDescriptor {
    name: String,
    types: Vec<Arc<TypeDescriptor>>,
    index: HashMap<(TypeRole, TypeKey), usize>,
    names: HashMap<TypeKey, usize>,
}

impl ModuleDescriptor {
    fn new(name: String, types: Vec<TypeDescriptor>) -> Self {
        let types: Vec<Arc<TypeDescriptor>> = types.into_iter().map(Arc::new).collect();
        let mut index = HashMap::with_capacity(types.len());
        let mut names = HashMap::with_capacity(types.len());
        for (i, t) in types.iter().enumerate() {
            index.insert((t.role(), t.key.clone()), i);
            names.insert(t.key.clone(), i);
        }
        Self {
            name,
            types,
            index,
            names,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn types(&self) -> &[Arc<TypeDescriptor>] {
        &self.types
    }

    pub fn find(&self, role: TypeRole, key: &TypeKey) -> Option<&Arc<TypeDescriptor>> {
        self.index
            .get(&(role, key.clone()))
            .map(|i| &self.types[*i])
    }

    /// Look up a type by name regardless of role.
    pub fn find_any(&self, key: &TypeKey) -> Option<&Arc<TypeDescriptor>> {
        self.names.get(key).map(|i| &self.types[*i])
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl fmt::Debug for ModuleDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleDescriptor")
            .field("name", &self.name)
            .field("types", &self.types)
            .finish()
    }
}
