//! # Engine Context
//!
//! Everything a load or commit needs from its environment, passed
//! explicitly: storage backends, naming service, host communicator, fault
//! injector and configuration.
//!
//! A context is cheap to clone; clones share every collaborator.

use crate::comm::{CommBackend, LocalComm};
use crate::config::RdgConfig;
use crate::fault::FaultInjector;
use crate::naming::{MemNameServer, NameServer};
use crate::storage::FileStorageRegistry;
use crate::RdgError;
use std::sync::Arc;

/// Collaborators of the persistence engine.
#[derive(Debug, Clone)]
pub struct RdgContext {
    storage: FileStorageRegistry,
    name_server: Arc<dyn NameServer>,
    comm: Arc<dyn CommBackend>,
    faults: Arc<FaultInjector>,
    config: RdgConfig,
}

impl RdgContext {
    /// Start building a context.
    #[must_use]
    pub fn builder() -> RdgContextBuilder {
        RdgContextBuilder::default()
    }

    /// Blob storage backends.
    #[must_use]
    pub fn storage(&self) -> &FileStorageRegistry {
        &self.storage
    }

    /// Naming service.
    #[must_use]
    pub fn name_server(&self) -> &dyn NameServer {
        self.name_server.as_ref()
    }

    /// Host communicator.
    #[must_use]
    pub fn comm(&self) -> &dyn CommBackend {
        self.comm.as_ref()
    }

    /// Fault injector consulted by the commit pipeline.
    #[must_use]
    pub fn faults(&self) -> &Arc<FaultInjector> {
        &self.faults
    }

    /// Configuration.
    #[must_use]
    pub fn config(&self) -> &RdgConfig {
        &self.config
    }

    /// The same environment seen from another host: shares storage and
    /// naming, with its own communicator and a fresh fault injector.
    #[must_use]
    pub fn for_host(&self, comm: Arc<dyn CommBackend>) -> Self {
        Self {
            comm,
            faults: Arc::new(FaultInjector::new(self.config.fault_plan)),
            ..self.clone()
        }
    }
}

/// Builder for `RdgContext`. Unset collaborators get in-process defaults.
#[derive(Debug, Default)]
pub struct RdgContextBuilder {
    config: RdgConfig,
    storage: Option<FileStorageRegistry>,
    name_server: Option<Arc<dyn NameServer>>,
    comm: Option<Arc<dyn CommBackend>>,
    faults: Option<Arc<FaultInjector>>,
}

impl RdgContextBuilder {
    /// Engine configuration.
    #[must_use]
    pub fn config(mut self, config: RdgConfig) -> Self {
        self.config = config;
        self
    }

    /// Storage registry (default: `file://` and `mem://`).
    #[must_use]
    pub fn storage(mut self, storage: FileStorageRegistry) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Naming service (default: `MemNameServer`).
    #[must_use]
    pub fn name_server(mut self, name_server: Arc<dyn NameServer>) -> Self {
        self.name_server = Some(name_server);
        self
    }

    /// Communicator (default: a single host).
    #[must_use]
    pub fn comm(mut self, comm: Arc<dyn CommBackend>) -> Self {
        self.comm = Some(comm);
        self
    }

    /// Fault injector (default: armed with the configured plan).
    #[must_use]
    pub fn faults(mut self, faults: Arc<FaultInjector>) -> Self {
        self.faults = Some(faults);
        self
    }

    /// Validate the configuration and assemble the context.
    pub fn build(self) -> Result<RdgContext, RdgError> {
        self.config.validate()?;
        let config = self.config;
        Ok(RdgContext {
            storage: self
                .storage
                .unwrap_or_else(|| FileStorageRegistry::with_defaults(config.mmap_topology)),
            name_server: self
                .name_server
                .unwrap_or_else(|| Arc::new(MemNameServer::new())),
            comm: self.comm.unwrap_or_else(|| Arc::new(LocalComm::single())),
            faults: self
                .faults
                .unwrap_or_else(|| Arc::new(FaultInjector::new(config.fault_plan))),
            config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault::{FaultPlan, FaultPoint};

    #[test]
    fn defaults_are_single_host_in_memory() {
        let ctx = RdgContext::builder().build().expect("context");
        assert_eq!(ctx.comm().num(), 1);
        assert_eq!(ctx.comm().id(), 0);
        assert_eq!(ctx.config(), &RdgConfig::default());
    }

    #[test]
    fn configured_fault_plan_is_armed() {
        let config = RdgConfig {
            fault_plan: FaultPlan::AtPoint {
                point: FaultPoint::AfterFinish,
            },
            ..RdgConfig::default()
        };
        let ctx = RdgContext::builder().config(config).build().expect("context");
        assert!(ctx.faults().check(FaultPoint::AfterFinish).is_err());
    }

    #[test]
    fn invalid_config_rejected() {
        let config = RdgConfig {
            write_concurrency: 0,
            ..RdgConfig::default()
        };
        assert!(RdgContext::builder().config(config).build().is_err());
    }

    #[test]
    fn hosts_share_collaborators() {
        let ctx = RdgContext::builder().build().expect("context");
        let comms = LocalComm::group(2);
        let other = ctx.for_host(Arc::new(comms[1].clone()));
        assert_eq!(other.comm().id(), 1);
        assert!(!Arc::ptr_eq(ctx.faults(), other.faults()));
    }
}
