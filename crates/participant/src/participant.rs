//! The participant facade.
//!
//! Owns the registry connection, the dispatcher task, service discovery,
//! the router, orchestration and time sync. Controllers are created here;
//! each creation assigns a service descriptor and broadcasts a discovery
//! event.
//!
//! All inbound messages and the local loopback are processed by a single
//! dispatcher task, one item at a time: every handler invocation for one
//! message completes before the next message begins dispatch.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use vib_core::service::supplemental;
use vib_core::{
    ConfigError, ParticipantConfig, ParticipantState, ServiceDescriptor, ServiceType,
};
use vib_wire::{DiscoveryEventKind, Envelope, Message, ParticipantAnnouncement};

use crate::bus::{BusHandle, DispatchItem};
use crate::can::{CanController, CanCore};
use crate::connection::{Connection, ConnectionError};
use crate::discovery::ServiceDiscovery;
use crate::flexray::{FlexrayController, FlexrayCore};
use crate::lin::{LinController, LinCore};
use crate::logging;
use crate::orchestration::{
    LifecycleCore, LifecycleService, SystemController, SystemControllerCore, SystemMonitor,
    Watchdog,
};
use crate::pubsub::{
    labels_to_supplemental, DataPublisher, DataSubscriber, PubSubSpec, PublisherCore,
    SubscriberCore,
};
use crate::router::Router;
use crate::rpc::{RpcClient, RpcClientCore, RpcServer, RpcServerCore};
use crate::timesync::{TimeProvider, TimeSync};

/// A connected federation member.
///
/// Dropping the participant severs the registry connection; peers then
/// observe removal events for all of its services. [`Participant::disconnect`]
/// does the same but announces the removals explicitly first.
pub struct Participant {
    inner: Arc<Inner>,
    _log_guard: Option<logging::LoggingGuard>,
}

pub(crate) struct Inner {
    name: Arc<str>,
    config: ParticipantConfig,
    bus: BusHandle,
    router: Router,
    discovery: Arc<ServiceDiscovery>,
    monitor: Arc<SystemMonitor>,
    lifecycle: Arc<LifecycleCore>,
    time_sync: Arc<TimeSync>,
    system_controller: Mutex<Option<Arc<SystemControllerCore>>>,
    local_services: Mutex<Vec<ServiceDescriptor>>,
    shutdown: CancellationToken,
}

impl Participant {
    /// Connect to the registry and announce this participant.
    ///
    /// `name` wins over `ParticipantName` from the configuration; pass an
    /// empty string to use the configured one.
    pub async fn connect(
        config: ParticipantConfig,
        name: &str,
        registry_addr: impl tokio::net::ToSocketAddrs,
    ) -> Result<Self, ConnectionError> {
        let name = if name.is_empty() {
            config
                .participant_name
                .clone()
                .ok_or(ConnectionError::Config(ConfigError::MissingParticipantName))?
        } else {
            name.to_string()
        };
        for key in config.unknown_keys() {
            warn!(key, "unrecognized configuration key ignored");
        }

        let connection = Connection::establish(&name, registry_addr).await?;

        let (wire_tx, wire_rx) = mpsc::unbounded_channel();
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let time_provider = TimeProvider::new();
        let bus = BusHandle::new(&name, wire_tx, queue_tx.clone(), time_provider);

        let discovery = ServiceDiscovery::new(Arc::from(name.as_str()));
        let monitor = SystemMonitor::new();
        let time_sync = TimeSync::new(bus.clone());
        let lifecycle = LifecycleCore::new(
            bus.clone(),
            Arc::clone(&monitor),
            Arc::clone(&time_sync),
            Watchdog::new(&config.health_check),
        );

        // Synchronized peers are discovered through their time-sync
        // descriptors; removal may unblock a pending grant.
        {
            let time_sync = Arc::clone(&time_sync);
            let grant_bus = bus.clone();
            discovery.add_handler(move |kind, service| {
                if service.supplemental(supplemental::TIME_SYNC_ACTIVE) != Some("1") {
                    return;
                }
                match kind {
                    DiscoveryEventKind::ServiceCreated => {
                        time_sync.peer_added(&service.participant_name);
                    }
                    DiscoveryEventKind::ServiceRemoved => {
                        time_sync.peer_removed(&service.participant_name);
                        grant_bus.enqueue(DispatchItem::TimeGrantCheck);
                    }
                }
            });
        }

        let logger_descriptor = ServiceDescriptor::new(
            &name,
            "Logger",
            "default",
            ServiceType::InternalController,
            bus.next_service_id(),
        );
        let log_guard =
            logging::init(&config.logging, &name, bus.clone(), logger_descriptor);

        let inner = Arc::new(Inner {
            name: Arc::from(name.as_str()),
            config,
            bus: bus.clone(),
            router: Router::default(),
            discovery: Arc::clone(&discovery),
            monitor,
            lifecycle,
            time_sync,
            system_controller: Mutex::new(None),
            local_services: Mutex::new(Vec::new()),
            shutdown: CancellationToken::new(),
        });

        // Seed the discovery view from the welcome replay, then announce
        // ourselves and go live.
        for announcement in &connection.announcements {
            discovery.on_announcement(announcement);
        }

        let discovery_descriptor = ServiceDescriptor::new(
            &name,
            "ServiceDiscovery",
            "default",
            ServiceType::InternalController,
            bus.next_service_id(),
        );
        inner.local_services.lock().push(discovery_descriptor.clone());
        bus.send(
            &discovery_descriptor,
            Message::ParticipantAnnouncement(ParticipantAnnouncement {
                participant_name: name.clone(),
                services: vec![discovery_descriptor.clone()],
            }),
        );

        tokio::spawn(dispatch_loop(Arc::clone(&inner), queue_rx));
        connection.start(queue_tx, wire_rx, inner.shutdown.clone());

        info!(participant = %name, "connected to registry");
        Ok(Self { inner, _log_guard: log_guard })
    }

    pub fn name(&self) -> &str {
        self.inner.name.as_ref()
    }

    /// The simulation-time source controllers stamp messages with.
    pub fn time_provider(&self) -> Arc<TimeProvider> {
        Arc::clone(&self.inner.bus.time_provider)
    }

    pub fn service_discovery(&self) -> Arc<ServiceDiscovery> {
        Arc::clone(&self.inner.discovery)
    }

    pub fn system_monitor(&self) -> Arc<SystemMonitor> {
        Arc::clone(&self.inner.monitor)
    }

    pub fn lifecycle_service(&self) -> LifecycleService {
        LifecycleService::new(Arc::clone(&self.inner.lifecycle))
    }

    /// Designate this participant as the system controller.
    pub fn system_controller(&self) -> SystemController {
        let (core, created) = {
            let mut slot = self.inner.system_controller.lock();
            let created = slot.is_none();
            let core = slot
                .get_or_insert_with(|| SystemControllerCore::new(self.inner.bus.clone()));
            (Arc::clone(core), created)
        };
        if created {
            let descriptor = core.descriptor().clone();
            let _ = self.inner.register_service(descriptor.clone());
            self.inner.publish_created(&descriptor);
        }
        SystemController::new(core)
    }

    pub fn create_can_controller(
        &self,
        name: &str,
        network: Option<&str>,
    ) -> Result<CanController, ConfigError> {
        let network = ParticipantConfig::resolve_network(
            &self.inner.config.can_controllers,
            name,
            network,
        );
        let descriptor = self
            .inner
            .make_descriptor(name, &network, ServiceType::Controller)
            .with_supplemental(supplemental::CONTROLLER_TYPE, "can");
        self.inner.register_service(descriptor.clone())?;

        let core = CanCore::new(self.inner.bus.clone(), descriptor.clone());
        self.inner.router.register_can(Arc::clone(&core));
        self.inner.watch_network_simulator(Arc::clone(&core), |core, kind, service| {
            core.behavior.on_discovery_event(kind, service);
        });
        self.inner.publish_created(&descriptor);
        Ok(CanController::new(core))
    }

    pub fn create_lin_controller(
        &self,
        name: &str,
        network: Option<&str>,
    ) -> Result<LinController, ConfigError> {
        let network = ParticipantConfig::resolve_network(
            &self.inner.config.lin_controllers,
            name,
            network,
        );
        let descriptor = self
            .inner
            .make_descriptor(name, &network, ServiceType::Controller)
            .with_supplemental(supplemental::CONTROLLER_TYPE, "lin");
        self.inner.register_service(descriptor.clone())?;

        let core = LinCore::new(self.inner.bus.clone(), descriptor.clone());
        self.inner.router.register_lin(Arc::clone(&core));
        self.inner.watch_network_simulator(Arc::clone(&core), |core, kind, service| {
            core.behavior.on_discovery_event(kind, service);
        });
        self.inner.publish_created(&descriptor);
        Ok(LinController::new(core))
    }

    pub fn create_flexray_controller(
        &self,
        name: &str,
        network: Option<&str>,
    ) -> Result<FlexrayController, ConfigError> {
        let network = ParticipantConfig::resolve_network(
            &self.inner.config.flexray_controllers,
            name,
            network,
        );
        let descriptor = self
            .inner
            .make_descriptor(name, &network, ServiceType::Controller)
            .with_supplemental(supplemental::CONTROLLER_TYPE, "flexray");
        self.inner.register_service(descriptor.clone())?;

        let core = FlexrayCore::new(self.inner.bus.clone(), descriptor.clone());
        self.inner.router.register_flexray(Arc::clone(&core));
        self.inner.watch_network_simulator(Arc::clone(&core), |core, kind, service| {
            core.behavior.on_discovery_event(kind, service);
        });
        self.inner.publish_created(&descriptor);
        Ok(FlexrayController::new(core))
    }

    /// Ethernet controllers are recognized in the configuration but not
    /// simulated yet.
    pub fn create_ethernet_controller(
        &self,
        name: &str,
        _network: Option<&str>,
    ) -> Result<(), ConfigError> {
        Err(ConfigError::Misconfiguration(format!(
            "ethernet controller {name:?}: ethernet simulation is not supported yet"
        )))
    }

    pub fn create_data_publisher(
        &self,
        name: &str,
        spec: PubSubSpec,
    ) -> Result<DataPublisher, ConfigError> {
        let (topic, media_type, labels) =
            self.inner.resolve_pubsub(&self.inner.config.data_publishers, name, spec);
        let descriptor = self
            .inner
            .make_descriptor(name, &topic, ServiceType::Controller)
            .with_supplemental(supplemental::CONTROLLER_TYPE, "data-publisher")
            .with_supplemental(supplemental::TOPIC, topic.clone())
            .with_supplemental(supplemental::MEDIA_TYPE, media_type);
        let descriptor = labels_to_supplemental(descriptor, &labels);
        self.inner.register_service(descriptor.clone())?;

        let core = PublisherCore::new(self.inner.bus.clone(), descriptor.clone());
        self.inner.publish_created(&descriptor);
        Ok(DataPublisher::new(core))
    }

    pub fn create_data_subscriber(
        &self,
        name: &str,
        spec: PubSubSpec,
    ) -> Result<DataSubscriber, ConfigError> {
        let (topic, media_type, labels) =
            self.inner.resolve_pubsub(&self.inner.config.data_subscribers, name, spec);
        let descriptor = self
            .inner
            .make_descriptor(name, &topic, ServiceType::Controller)
            .with_supplemental(supplemental::CONTROLLER_TYPE, "data-subscriber")
            .with_supplemental(supplemental::TOPIC, topic.clone())
            .with_supplemental(supplemental::MEDIA_TYPE, media_type.clone());
        let descriptor = labels_to_supplemental(descriptor, &labels);
        self.inner.register_service(descriptor.clone())?;

        let core = SubscriberCore::new(descriptor.clone(), media_type, labels);
        self.inner.router.register_subscriber(Arc::clone(&core));
        self.inner.publish_created(&descriptor);
        Ok(DataSubscriber::new(core))
    }

    pub fn create_rpc_server(
        &self,
        name: &str,
        function_name: &str,
    ) -> Result<RpcServer, ConfigError> {
        let descriptor = self
            .inner
            .make_descriptor(name, function_name, ServiceType::Controller)
            .with_supplemental(supplemental::CONTROLLER_TYPE, "rpc-server")
            .with_supplemental(supplemental::FUNCTION_NAME, function_name);
        self.inner.register_service(descriptor.clone())?;

        let core = RpcServerCore::new(self.inner.bus.clone(), descriptor.clone());
        self.inner.router.register_rpc_server(Arc::clone(&core));
        self.inner.publish_created(&descriptor);
        Ok(RpcServer::new(core))
    }

    pub fn create_rpc_client(
        &self,
        name: &str,
        function_name: &str,
    ) -> Result<RpcClient, ConfigError> {
        let descriptor = self
            .inner
            .make_descriptor(name, function_name, ServiceType::Controller)
            .with_supplemental(supplemental::CONTROLLER_TYPE, "rpc-client")
            .with_supplemental(supplemental::FUNCTION_NAME, function_name);
        self.inner.register_service(descriptor.clone())?;

        let core = RpcClientCore::new(self.inner.bus.clone(), descriptor.clone());
        self.inner.router.register_rpc_client(Arc::clone(&core));
        self.inner.publish_created(&descriptor);
        Ok(RpcClient::new(core))
    }

    /// Announce the removal of all local services, flush the wire, and
    /// sever the connection.
    pub async fn disconnect(&self) {
        let services = self.inner.local_services.lock().clone();
        for descriptor in services {
            self.inner.bus.send(
                &descriptor,
                Message::ServiceDiscoveryEvent {
                    kind: DiscoveryEventKind::ServiceRemoved,
                    service: descriptor.clone(),
                },
            );
        }
        if let Some(flushed) = self.inner.bus.flush() {
            let _ = tokio::time::timeout(Duration::from_secs(5), flushed).await;
        }
        self.inner.shutdown.cancel();
        info!(participant = %self.inner.name, "disconnected");
    }
}

impl Drop for Participant {
    fn drop(&mut self) {
        self.inner.shutdown.cancel();
    }
}

impl Inner {
    fn make_descriptor(
        &self,
        name: &str,
        network: &str,
        service_type: ServiceType,
    ) -> ServiceDescriptor {
        ServiceDescriptor::new(
            self.name.as_ref(),
            name,
            network,
            service_type,
            self.bus.next_service_id(),
        )
    }

    /// Uniqueness: (service_name, network_name) per service type within
    /// this participant.
    fn register_service(&self, descriptor: ServiceDescriptor) -> Result<(), ConfigError> {
        let mut services = self.local_services.lock();
        if services.iter().any(|s| {
            s.service_type == descriptor.service_type
                && s.service_name == descriptor.service_name
                && s.network_name == descriptor.network_name
        }) {
            return Err(ConfigError::DuplicateController(descriptor.service_name));
        }
        services.push(descriptor);
        Ok(())
    }

    fn publish_created(&self, descriptor: &ServiceDescriptor) {
        self.bus.send(
            descriptor,
            Message::ServiceDiscoveryEvent {
                kind: DiscoveryEventKind::ServiceCreated,
                service: descriptor.clone(),
            },
        );
    }

    /// Register the trivial/detailed switch of a bus controller.
    fn watch_network_simulator<C: Send + Sync + 'static>(
        &self,
        core: Arc<C>,
        apply: impl Fn(&C, DiscoveryEventKind, &ServiceDescriptor) + Send + Sync + 'static,
    ) {
        self.discovery.add_handler(move |kind, service| apply(&core, kind, service));
    }

    fn resolve_pubsub(
        &self,
        entries: &[vib_core::config::DataEndpointConfig],
        name: &str,
        spec: PubSubSpec,
    ) -> (String, String, BTreeMap<String, String>) {
        let entry = entries.iter().find(|e| e.name == name);
        let topic = entry
            .and_then(|e| e.topic.clone())
            .unwrap_or_else(|| if spec.topic.is_empty() { name.to_string() } else { spec.topic });
        let media_type =
            entry.and_then(|e| e.media_type.clone()).unwrap_or(spec.media_type);
        let labels = match entry {
            Some(e) if !e.labels.is_empty() => e.labels.clone(),
            _ => spec.labels,
        };
        (topic, media_type, labels)
    }

    /// Everything inbound funnels through here, one item at a time.
    async fn dispatch(&self, item: DispatchItem) {
        match item {
            DispatchItem::Deliver(envelope) => self.dispatch_envelope(envelope).await,
            DispatchItem::StartLifecycle => {
                self.announce_time_sync_service();
                self.lifecycle.handle_start().await;
            }
            DispatchItem::TimeGrantCheck => self.check_time_grant().await,
            DispatchItem::PeerGone(participant_name) => self.on_peer_gone(&participant_name),
            DispatchItem::Disconnected => self.on_disconnected(),
        }
    }

    async fn dispatch_envelope(&self, envelope: Envelope) {
        // Targeted delivery: receivers filter by their own name.
        if let Some(to) = &envelope.to {
            if to.as_str() != self.name.as_ref() {
                return;
            }
        }
        match &envelope.msg {
            Message::ParticipantAnnouncement(announcement) => {
                self.discovery.on_announcement(announcement);
                if announcement.participant_name != *self.name {
                    let controller = self.system_controller.lock().clone();
                    if let Some(controller) = controller {
                        controller.republish_workflow();
                    }
                }
            }
            Message::ServiceDiscoveryEvent { kind, service } => {
                self.discovery.on_event(*kind, service);
            }
            Message::ParticipantStatus(status) => {
                self.monitor.on_status(status);
                self.lifecycle.maybe_ready_to_run();
            }
            Message::WorkflowConfiguration { required_participant_names } => {
                self.monitor.set_required(required_participant_names);
                self.lifecycle.maybe_ready_to_run();
            }
            Message::SystemCommand { kind } => {
                self.lifecycle.on_system_command(*kind);
            }
            Message::ParticipantCommand { participant } => {
                debug!(%participant, "participant command is superseded by the coordinated lifecycle; ignored");
            }
            Message::NextSimTask(task) => {
                if envelope.sender.participant_name != *self.name {
                    self.time_sync.on_next_sim_task(&envelope.sender, *task);
                    self.check_time_grant().await;
                }
            }
            _ => self.router.dispatch(&envelope),
        }
    }

    fn announce_time_sync_service(&self) {
        if let Some(descriptor) = self.time_sync.take_unannounced_descriptor() {
            let _ = self.register_service(descriptor.clone());
            self.publish_created(&descriptor);
        }
    }

    /// Evaluate the time-quantum grant; on success execute one step.
    async fn check_time_grant(&self) {
        let state = self.lifecycle.state();
        if !matches!(state, ParticipantState::Running | ParticipantState::Paused) {
            return;
        }
        let Some(task) = self.time_sync.try_grant() else {
            return;
        };
        self.lifecycle.execute_sim_task(task).await;
        self.time_sync.publish_next();
        // Re-check later instead of recursing, so a lone participant keeps
        // advancing without starving the queue.
        self.bus.enqueue(DispatchItem::TimeGrantCheck);
    }

    fn on_peer_gone(&self, participant_name: &str) {
        debug!(peer = %participant_name, "peer gone");
        self.discovery.on_peer_gone(participant_name);
        self.monitor.on_peer_gone(participant_name);
    }

    fn on_disconnected(&self) {
        if self.lifecycle.is_started() && !self.lifecycle.state().is_terminal() {
            self.lifecycle.report_error("lost connection to the registry");
        } else {
            warn!("lost connection to the registry");
        }
    }
}

async fn dispatch_loop(inner: Arc<Inner>, mut queue_rx: mpsc::UnboundedReceiver<DispatchItem>) {
    loop {
        let item = tokio::select! {
            _ = inner.shutdown.cancelled() => return,
            item = queue_rx.recv() => item,
        };
        let Some(item) = item else { return };
        inner.dispatch(item).await;
    }
}

#[cfg(test)]
#[path = "participant_tests.rs"]
mod tests;
