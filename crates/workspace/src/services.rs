//! Lifecycle registry for language-service style collaborators.
//!
//! Services are owned elsewhere; the registry only routes lifecycle calls by
//! name and language id. Routing is computed from the current registrations
//! on every call.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceState {
	Init,
	Starting,
	Running,
	Restarting,
	Stopped,
}

impl fmt::Display for ServiceState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			Self::Init => "init",
			Self::Starting => "starting",
			Self::Running => "running",
			Self::Restarting => "restarting",
			Self::Stopped => "stopped",
		};
		f.write_str(name)
	}
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
	#[error("service {0:?} is already registered")]
	AlreadyRegistered(String),
	#[error("service {0:?} not found")]
	NotFound(String),
	#[error("service {name:?} failed: {reason}")]
	Failed { name: String, reason: String },
}

#[async_trait]
pub trait Service: Send + Sync {
	fn name(&self) -> &str;
	/// Languages this service handles.
	fn language_ids(&self) -> &[String];
	fn state(&self) -> ServiceState;

	async fn init(&self) -> Result<(), ServiceError>;
	async fn restart(&self) -> Result<(), ServiceError>;
	async fn stop(&self) -> Result<(), ServiceError>;
}

/// Row returned by [`ServiceRegistry::stats`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceStat {
	pub name: String,
	pub language_ids: Vec<String>,
	pub state: ServiceState,
}

fn handles(service: &dyn Service, language_id: &str) -> bool {
	service.language_ids().iter().any(|id| id == language_id)
}

#[derive(Default)]
pub struct ServiceRegistry {
	services: RwLock<HashMap<String, Arc<dyn Service>>>,
}

impl ServiceRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds a service. A duplicate name is rejected and logged.
	pub fn register(&self, service: Arc<dyn Service>) -> Result<(), ServiceError> {
		let name = service.name().to_string();
		let mut services = self.services.write();
		if services.contains_key(&name) {
			warn!(service = %name, "services.duplicate_registration");
			return Err(ServiceError::AlreadyRegistered(name));
		}
		debug!(service = %name, "services.registered");
		services.insert(name, service);
		Ok(())
	}

	/// Removes a service, stopping it first when it is running.
	pub async fn unregister(&self, name: &str) -> Result<(), ServiceError> {
		let service = self.services.write().remove(name).ok_or_else(|| ServiceError::NotFound(name.to_string()))?;
		if matches!(service.state(), ServiceState::Running | ServiceState::Starting) {
			service.stop().await?;
		}
		Ok(())
	}

	pub fn get(&self, name: &str) -> Option<Arc<dyn Service>> {
		self.services.read().get(name).cloned()
	}

	/// Services handling `language_id`, sorted by name.
	pub fn services_for(&self, language_id: &str) -> Vec<Arc<dyn Service>> {
		let mut matched: Vec<Arc<dyn Service>> = self
			.services
			.read()
			.values()
			.filter(|service| handles(service.as_ref(), language_id))
			.cloned()
			.collect();
		matched.sort_by(|a, b| a.name().cmp(b.name()));
		matched
	}

	/// Starts every idle service handling `language_id`.
	///
	/// Returns the names of the services that were started. Failures are
	/// logged and do not prevent the remaining services from starting.
	pub async fn start(&self, language_id: &str) -> Vec<String> {
		let mut started = Vec::new();
		for service in self.services_for(language_id) {
			if !matches!(service.state(), ServiceState::Init | ServiceState::Stopped) {
				continue;
			}
			match service.init().await {
				Ok(()) => {
					info!(service = service.name(), language = %language_id, "services.started");
					started.push(service.name().to_string());
				}
				Err(e) => warn!(service = service.name(), error = %e, "services.start_failed"),
			}
		}
		started
	}

	pub async fn restart(&self, name: &str) -> Result<(), ServiceError> {
		let service = self.get(name).ok_or_else(|| ServiceError::NotFound(name.to_string()))?;
		info!(service = %name, "services.restart");
		service.restart().await
	}

	pub async fn stop(&self, name: &str) -> Result<(), ServiceError> {
		let service = self.get(name).ok_or_else(|| ServiceError::NotFound(name.to_string()))?;
		service.stop().await
	}

	/// Stops a running service, or starts an idle one.
	pub async fn toggle(&self, name: &str) -> Result<(), ServiceError> {
		let service = self.get(name).ok_or_else(|| ServiceError::NotFound(name.to_string()))?;
		match service.state() {
			ServiceState::Running => service.stop().await,
			ServiceState::Init | ServiceState::Stopped => service.init().await,
			ServiceState::Starting | ServiceState::Restarting => Ok(()),
		}
	}

	pub async fn stop_all(&self) {
		let services: Vec<Arc<dyn Service>> = self.services.read().values().cloned().collect();
		for service in services {
			if service.state() == ServiceState::Running
				&& let Err(e) = service.stop().await
			{
				warn!(service = service.name(), error = %e, "services.stop_failed");
			}
		}
	}

	/// Name, languages and state of every service, sorted by name.
	pub fn stats(&self) -> Vec<ServiceStat> {
		let mut stats: Vec<ServiceStat> = self
			.services
			.read()
			.values()
			.map(|service| ServiceStat {
				name: service.name().to_string(),
				language_ids: service.language_ids().to_vec(),
				state: service.state(),
			})
			.collect();
		stats.sort_by(|a, b| a.name.cmp(&b.name));
		stats
	}
}
