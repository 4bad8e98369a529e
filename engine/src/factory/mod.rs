//! Instance Factory
//!
//! Builds job prototypes, repositories and managers from resolved type
//! descriptors, picking the constructor that matches the supplied arguments.

use std::sync::Arc;

use jobplug_abi::{
    Constructors, Context, Job, ManagerHandle, RepositoryHandle, TypeDescriptor,
};
use tracing::debug;

use crate::common::{EngineError, EngineResult};
use crate::mapping::MappingResolver;

pub struct InstanceFactory {
    mappings: Arc<MappingResolver>,
}

impl InstanceFactory {
    pub fn new(mappings: Arc<MappingResolver>) -> Self {
        Self { mappings }
    }

    pub fn mappings(&self) -> &MappingResolver {
        &self.mappings
    }

    /// Run a job type's constructor. Used while the registry is populated.
    pub fn create_job_prototype(descriptor: &TypeDescriptor) -> EngineResult<Job> {
        let Constructors::Job(ctor) = &descriptor.constructors else {
            return Err(EngineError::instantiation(
                &descriptor.key,
                format!("exported as a {} type, not a job", descriptor.role()),
            ));
        };

        let job = ctor().map_err(|e| EngineError::construction(&descriptor.key, e))?;
        if job.type_identity != descriptor.key {
            return Err(EngineError::construction(
                &descriptor.key,
                format!("prototype reports identity {}", job.type_identity).into(),
            ));
        }
        Ok(job)
    }

    /// Construct a repository from its descriptor: primary-only arguments use
    /// the primary constructor, primary + secondary the two-context one.
    pub fn construct_repository(
        descriptor: &TypeDescriptor,
        primary: Context,
        secondary: Option<Context>,
    ) -> EngineResult<RepositoryHandle> {
        let Constructors::Repository {
            primary: primary_ctor,
            with_secondary,
        } = &descriptor.constructors
        else {
            return Err(EngineError::instantiation(
                &descriptor.key,
                format!("exported as a {} type, not a repository", descriptor.role()),
            ));
        };

        let result = match (secondary, primary_ctor, with_secondary) {
            (None, Some(ctor), _) => ctor(primary),
            (Some(secondary), _, Some(ctor)) => ctor(primary, secondary),
            (None, None, _) => {
                return Err(EngineError::instantiation(
                    &descriptor.key,
                    "no constructor taking a single context",
                ))
            }
            (Some(_), _, None) => {
                return Err(EngineError::instantiation(
                    &descriptor.key,
                    "no constructor taking a primary and a secondary context",
                ))
            }
        };

        result.map_err(|e| EngineError::construction(&descriptor.key, e))
    }

    pub fn construct_manager(
        descriptor: &TypeDescriptor,
        repository: RepositoryHandle,
    ) -> EngineResult<ManagerHandle> {
        let Constructors::Manager(ctor) = &descriptor.constructors else {
            return Err(EngineError::instantiation(
                &descriptor.key,
                format!("exported as a {} type, not a manager", descriptor.role()),
            ));
        };
        ctor(repository).map_err(|e| EngineError::construction(&descriptor.key, e))
    }

    /// Repository for a job type, or `None` when the job has no repository mapping
    pub fn create_repository(
        &self,
        job_type: &str,
        primary: Context,
        secondary: Option<Context>,
    ) -> EngineResult<Option<RepositoryHandle>> {
        let Some(entry) = self.mappings.resolve_repository_mapping(job_type) else {
            debug!("No repository mapping for {}", job_type);
            return Ok(None);
        };
        Self::construct_repository(&entry.target, primary, secondary).map(Some)
    }

    /// Manager for a job type, or `None` when the job has no manager mapping
    pub fn create_manager(
        &self,
        job_type: &str,
        repository: RepositoryHandle,
    ) -> EngineResult<Option<ManagerHandle>> {
        let Some(entry) = self.mappings.resolve_manager_mapping(job_type) else {
            debug!("No manager mapping for {}", job_type);
            return Ok(None);
        };
        Self::construct_manager(&entry.target, repository).map(Some)
    }
}
