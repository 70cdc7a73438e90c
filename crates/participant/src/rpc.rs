//! RPC endpoints: a client calls a named function, the serving participant
//! answers with a targeted response correlated by call id.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use vib_core::{HandlerId, HandlerIdSource, HandlerRegistry, ServiceDescriptor};
use vib_wire::Message;

use crate::bus::BusHandle;

/// An incoming call on the server side.
#[derive(Debug, Clone)]
pub struct RpcCallEvent {
    pub timestamp: i64,
    pub call_id: u64,
    pub data: Vec<u8>,
}

/// The result of a call on the client side.
#[derive(Debug, Clone)]
pub struct RpcCallResultEvent {
    pub timestamp: i64,
    pub call_id: u64,
    pub data: Vec<u8>,
}

type CallHandler = Arc<dyn Fn(&RpcCallEvent) -> Vec<u8> + Send + Sync>;

pub(crate) struct RpcServerCore {
    pub descriptor: ServiceDescriptor,
    bus: BusHandle,
    call_handler: Mutex<Option<CallHandler>>,
}

impl RpcServerCore {
    pub fn new(bus: BusHandle, descriptor: ServiceDescriptor) -> Arc<Self> {
        Arc::new(Self { descriptor, bus, call_handler: Mutex::new(None) })
    }

    pub fn function_network(&self) -> &str {
        &self.descriptor.network_name
    }

    pub fn on_call(&self, sender: &ServiceDescriptor, timestamp: i64, call_id: u64, data: &[u8]) {
        let handler = self.call_handler.lock().clone();
        let Some(handler) = handler else {
            debug!(function = %self.function_network(), "call received without a call handler");
            return;
        };
        let result = handler(&RpcCallEvent { timestamp, call_id, data: data.to_vec() });
        self.bus.send_to(
            &self.descriptor,
            &sender.participant_name,
            Message::RpcFunctionCallResponse { timestamp: self.bus.now(), call_id, data: result },
        );
    }
}

/// Serves one named function.
#[derive(Clone)]
pub struct RpcServer {
    core: Arc<RpcServerCore>,
}

impl RpcServer {
    pub(crate) fn new(core: Arc<RpcServerCore>) -> Self {
        Self { core }
    }

    pub fn function_name(&self) -> &str {
        self.core.function_network()
    }

    /// Install the call handler. The handler returns the result payload,
    /// which is sent back to the caller.
    pub fn set_call_handler(
        &self,
        handler: impl Fn(&RpcCallEvent) -> Vec<u8> + Send + Sync + 'static,
    ) {
        *self.core.call_handler.lock() = Some(Arc::new(handler));
    }
}

pub(crate) struct RpcClientCore {
    pub descriptor: ServiceDescriptor,
    bus: BusHandle,
    next_call: AtomicU32,
    pending: Mutex<HashSet<u64>>,
    result_handlers: HandlerRegistry<RpcCallResultEvent>,
}

impl RpcClientCore {
    pub fn new(bus: BusHandle, descriptor: ServiceDescriptor) -> Arc<Self> {
        Arc::new(Self {
            descriptor,
            bus,
            next_call: AtomicU32::new(0),
            pending: Mutex::new(HashSet::new()),
            result_handlers: HandlerRegistry::new(HandlerIdSource::new()),
        })
    }

    pub fn function_network(&self) -> &str {
        &self.descriptor.network_name
    }

    pub fn call(&self, data: Vec<u8>) -> u64 {
        // Call ids embed the service id so concurrent clients of the same
        // function never collide.
        let seq = self.next_call.fetch_add(1, Ordering::Relaxed) as u64 + 1;
        let call_id = ((self.descriptor.service_id as u64) << 32) | seq;
        self.pending.lock().insert(call_id);
        self.bus.send(
            &self.descriptor,
            Message::RpcFunctionCall { timestamp: self.bus.now(), call_id, data },
        );
        call_id
    }

    pub fn on_result(&self, sender: &ServiceDescriptor, timestamp: i64, call_id: u64, data: &[u8]) {
        if !self.pending.lock().remove(&call_id) {
            debug!(sender = %sender, call_id, "ignoring result for a call of another client");
            return;
        }
        self.result_handlers.dispatch(&RpcCallResultEvent {
            timestamp,
            call_id,
            data: data.to_vec(),
        });
    }
}

/// Calls one named function.
#[derive(Clone)]
pub struct RpcClient {
    core: Arc<RpcClientCore>,
}

impl RpcClient {
    pub(crate) fn new(core: Arc<RpcClientCore>) -> Self {
        Self { core }
    }

    pub fn function_name(&self) -> &str {
        self.core.function_network()
    }

    /// Issue a call; the result arrives at the call-return handlers with
    /// the returned call id.
    pub fn call(&self, data: impl Into<Vec<u8>>) -> u64 {
        self.core.call(data.into())
    }

    pub fn add_call_result_handler(
        &self,
        handler: impl Fn(&RpcCallResultEvent) + Send + Sync + 'static,
    ) -> HandlerId {
        self.core.result_handlers.add(handler)
    }

    pub fn remove_call_result_handler(&self, id: HandlerId) {
        if !self.core.result_handlers.remove(id) {
            warn!(%id, "remove_call_result_handler: unknown handler id");
        }
    }
}
