//! Job Registry
//!
//! Category tree and jobs-by-category index. Built once while the engine
//! loads, read-only afterwards.

use std::collections::{BTreeMap, HashMap};

use jobplug_abi::{CategoryId, Job, TypeKey};
use serde::Serialize;
use tracing::{debug, info};

use crate::common::{EngineError, EngineResult};

pub const ROOT_CATEGORY_NAME: &str = "Root";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub parent_id: Option<CategoryId>,
}

/// Jobs of one category, keyed (and thus deduplicated) by type identity
pub type JobSet = BTreeMap<TypeKey, Job>;

#[derive(Debug)]
pub struct Registry {
    categories: Vec<Category>,
    category_index: HashMap<CategoryId, usize>,
    jobs: BTreeMap<CategoryId, JobSet>,
    job_categories: HashMap<TypeKey, CategoryId>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Root first, then declaration order; parents precede their children
    pub fn available_categories(&self) -> &[Category] {
        &self.categories
    }

    /// Every category that has jobs, with its job set
    pub fn available_jobs(&self) -> &BTreeMap<CategoryId, JobSet> {
        &self.jobs
    }

    pub fn category(&self, id: &CategoryId) -> Option<&Category> {
        self.category_index.get(id).map(|i| &self.categories[*i])
    }

    pub fn children(&self, id: &CategoryId) -> impl Iterator<Item = &Category> + '_ {
        let id = id.clone();
        self.categories
            .iter()
            .filter(move |c| c.parent_id.as_ref() == Some(&id))
    }

    pub fn jobs_in(&self, id: &CategoryId) -> Option<&JobSet> {
        self.jobs.get(id)
    }

    /// Shared prototype; callers wanting their own copy clone it
    pub fn job(&self, type_identity: &TypeKey) -> Option<&Job> {
        let category = self.job_categories.get(type_identity)?;
        self.jobs.get(category)?.get(type_identity)
    }

    pub fn contains_job(&self, type_identity: &TypeKey) -> bool {
        self.job_categories.contains_key(type_identity)
    }

    pub fn job_count(&self) -> usize {
        self.job_categories.len()
    }
}

#[derive(Debug)]
pub struct RegistryBuilder {
    categories: Vec<Category>,
    category_index: HashMap<CategoryId, usize>,
    jobs: Vec<Job>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        let root = Category {
            id: CategoryId::root(),
            name: ROOT_CATEGORY_NAME.to_string(),
            parent_id: None,
        };
        let mut category_index = HashMap::new();
        category_index.insert(root.id.clone(), 0);
        Self {
            categories: vec![root],
            category_index,
            jobs: Vec::new(),
        }
    }

    /// Add a `/`-separated category path, creating missing ancestors.
    /// Re-declaring a category is a no-op.
    pub fn add_category(&mut self, path: &str) -> &mut Self {
        let mut parent = CategoryId::root();
        let mut walked = String::new();
        for segment in path.split('/').map(str::trim).filter(|s| !s.is_empty()) {
            if !walked.is_empty() {
                walked.push('/');
            }
            walked.push_str(segment);
            let id = CategoryId::new(&walked);

            if !self.category_index.contains_key(&id) {
                debug!("Registering category {}", id);
                self.category_index.insert(id.clone(), self.categories.len());
                self.categories.push(Category {
                    id: id.clone(),
                    name: segment.to_string(),
                    parent_id: Some(parent),
                });
            }
            parent = id;
        }
        self
    }

    pub fn add_job(&mut self, job: Job) -> EngineResult<&mut Self> {
        if let Some(existing) = self
            .jobs
            .iter()
            .find(|j| j.type_identity == job.type_identity)
        {
            return Err(EngineError::configuration(format!(
                "job {} is declared twice (already registered as {})",
                job.type_identity, existing.type_identity
            )));
        }
        self.jobs.push(job);
        Ok(self)
    }

    pub fn build(self) -> EngineResult<Registry> {
        let mut jobs: BTreeMap<CategoryId, JobSet> = BTreeMap::new();
        let mut job_categories = HashMap::with_capacity(self.jobs.len());

        for job in self.jobs {
            if !self.category_index.contains_key(&job.category_id) {
                return Err(EngineError::configuration(format!(
                    "job {} belongs to undeclared category {}",
                    job.type_identity, job.category_id
                )));
            }
            job_categories.insert(job.type_identity.clone(), job.category_id.clone());
            jobs.entry(job.category_id.clone())
                .or_default()
                .insert(job.type_identity.clone(), job);
        }

        info!(
            "Registry built: {} categories, {} jobs",
            self.categories.len(),
            job_categories.len()
        );

        Ok(Registry {
            categories: self.categories,
            category_index: self.category_index,
            jobs,
            job_categories,
        })
    }
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(name: &str, category: &str) -> Job {
        Job::new(TypeKey::parse(name).unwrap(), CategoryId::new(category))
    }

    #[test]
    fn test_billing_jobs_grouped() {
        let mut builder = Registry::builder();
        builder.add_category("Billing");
        builder.add_job(job("Jobs.Invoice", "Billing")).unwrap();
        builder.add_job(job("Jobs.Refund", "billing")).unwrap();
        let registry = builder.build().unwrap();

        let billing = registry.jobs_in(&CategoryId::new("Billing")).unwrap();
        let names: Vec<&str> = billing.keys().map(|k| k.as_str()).collect();
        assert_eq!(names, vec!["Jobs.Invoice", "Jobs.Refund"]);
        assert_eq!(registry.available_jobs().len(), 1);
        assert_eq!(registry.job_count(), 2);
    }

    #[test]
    fn test_category_tree() {
        let mut builder = Registry::builder();
        builder
            .add_category("Sales/Orders")
            .add_category("Sales")
            .add_category("Billing")
            .add_category("sales/orders/Export");
        let registry = builder.build().unwrap();

        let names: Vec<&str> = registry
            .available_categories()
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(names, vec!["Root", "Sales", "Orders", "Billing", "Export"]);

        let orders = registry.category(&CategoryId::new("sales/orders")).unwrap();
        assert_eq!(orders.parent_id, Some(CategoryId::new("Sales")));

        let top: Vec<&str> = registry
            .children(&CategoryId::root())
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(top, vec!["Sales", "Billing"]);
    }

    #[test]
    fn test_duplicate_job_rejected() {
        let mut builder = Registry::builder();
        builder.add_job(job("Jobs.Invoice", "")).unwrap();
        let err = builder.add_job(job("JOBS.INVOICE", "")).unwrap_err();
        assert!(err.to_string().contains("declared twice"));
    }

    #[test]
    fn test_undeclared_category_rejected() {
        let mut builder = Registry::builder();
        builder.add_category("Billing");
        builder.add_job(job("Jobs.Ship", "Shipping")).unwrap();
        let err = builder.build().unwrap_err();
        assert!(err.to_string().contains("undeclared category shipping"));
    }

    #[test]
    fn test_job_lookup_case_insensitive() {
        let mut builder = Registry::builder();
        builder.add_job(job("Jobs.Invoice", "")).unwrap();
        let registry = builder.build().unwrap();

        let key = TypeKey::parse("jobs.invoice").unwrap();
        assert!(registry.contains_job(&key));
        assert_eq!(registry.job(&key).unwrap().type_identity.as_str(), "Jobs.Invoice");
        assert_eq!(
            registry.jobs_in(&CategoryId::root()).map(|s| s.len()),
            Some(1)
        );
    }
}
